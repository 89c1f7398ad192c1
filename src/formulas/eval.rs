//! Stack-machine evaluation of compiled formulas.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{NaiveDate, TimeDelta, Utc};

use super::rpn::{BinaryOp, CompiledFormula, Function, Instruction, UnaryOp};
use super::value::{FormulaValue, parse_date};
use super::{FormulaError, FormulaResultAs};

/// Named inputs of a formula. Missing names evaluate to null.
pub type Variables = BTreeMap<String, FormulaValue>;

/// Evaluates `formula` with today's UTC date for `TODAY()`.
pub fn evaluate(
    formula: &CompiledFormula,
    variables: &Variables,
) -> Result<FormulaValue, FormulaError> {
    evaluate_at(formula, variables, Utc::now().date_naive())
}

pub fn evaluate_at(
    formula: &CompiledFormula,
    variables: &Variables,
    today: NaiveDate,
) -> Result<FormulaValue, FormulaError> {
    let mut stack: Vec<FormulaValue> = Vec::new();

    for instruction in &formula.instructions {
        let result = match instruction {
            Instruction::Push(value) => value.clone(),
            Instruction::Load(name) => variables.get(name).cloned().unwrap_or(FormulaValue::Null),
            Instruction::Unary(op) => {
                let operand = stack.pop().ok_or(FormulaError::Malformed)?;
                apply_unary(*op, operand)?
            }
            Instruction::Binary(op) => {
                let right = stack.pop().ok_or(FormulaError::Malformed)?;
                let left = stack.pop().ok_or(FormulaError::Malformed)?;
                apply_binary(*op, left, right)?
            }
            Instruction::Call { function, argc } => {
                if stack.len() < *argc {
                    return Err(FormulaError::Malformed);
                }
                let args = stack.split_off(stack.len() - argc);
                call(*function, args, today)?
            }
        };
        stack.push(result);
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(value), true) => Ok(value),
        _ => Err(FormulaError::Malformed),
    }
}

fn apply_unary(op: UnaryOp, operand: FormulaValue) -> Result<FormulaValue, FormulaError> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(FormulaValue::Boolean(!value.truthy())),
        (UnaryOp::Neg, FormulaValue::Null) => Ok(FormulaValue::Null),
        (UnaryOp::Neg, FormulaValue::Number(n)) => Ok(FormulaValue::Number(-n)),
        (UnaryOp::Neg, other) => Err(mismatch("negation", &[&other])),
    }
}

fn apply_binary(
    op: BinaryOp,
    left: FormulaValue,
    right: FormulaValue,
) -> Result<FormulaValue, FormulaError> {
    use FormulaValue::*;

    match op {
        BinaryOp::Concat => Ok(Text(left.display_text() + &right.display_text())),
        BinaryOp::And => Ok(Boolean(left.truthy() && right.truthy())),
        BinaryOp::Or => Ok(Boolean(left.truthy() || right.truthy())),
        BinaryOp::Eq => Ok(Boolean(left == right)),
        BinaryOp::Ne => Ok(Boolean(left != right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            if left.is_null() || right.is_null() {
                return Ok(Null);
            }
            let ordering = left
                .compare(&right)
                .ok_or_else(|| mismatch(op.symbol(), &[&left, &right]))?;
            Ok(Boolean(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        _ if left.is_null() || right.is_null() => Ok(Null),
        BinaryOp::Add => match (&left, &right) {
            (Number(a), Number(b)) => Ok(Number(a + b)),
            (Text(_), _) | (_, Text(_)) => Ok(Text(left.display_text() + &right.display_text())),
            (Date(d), Number(days)) | (Number(days), Date(d)) => shift_date(*d, *days),
            _ => Err(mismatch("+", &[&left, &right])),
        },
        BinaryOp::Sub => match (&left, &right) {
            (Number(a), Number(b)) => Ok(Number(a - b)),
            (Date(d), Number(days)) => shift_date(*d, -days),
            (Date(a), Date(b)) => Ok(Number((*a - *b).num_days() as f64)),
            _ => Err(mismatch("-", &[&left, &right])),
        },
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Number(a), Number(b)) = (&left, &right) else {
                return Err(mismatch(op.symbol(), &[&left, &right]));
            };
            match op {
                BinaryOp::Mul => Ok(Number(a * b)),
                _ if *b == 0.0 => Err(FormulaError::DivisionByZero),
                BinaryOp::Div => Ok(Number(a / b)),
                _ => Ok(Number(a % b)),
            }
        }
    }
}

fn shift_date(date: NaiveDate, days: f64) -> Result<FormulaValue, FormulaError> {
    Some(days)
        .filter(|days| days.is_finite())
        .and_then(|days| TimeDelta::try_days(days.trunc() as i64))
        .and_then(|delta| date.checked_add_signed(delta))
        .map(FormulaValue::Date)
        .ok_or(FormulaError::TypeMismatch {
            operation: "date arithmetic",
            found: format!("{days} days"),
        })
}

fn call(
    function: Function,
    args: Vec<FormulaValue>,
    today: NaiveDate,
) -> Result<FormulaValue, FormulaError> {
    use FormulaValue::*;

    let arg = |index: usize| args.get(index).cloned().unwrap_or(Null);

    match function {
        Function::If => Ok(if arg(0).truthy() { arg(1) } else { arg(2) }),
        Function::Min | Function::Max => {
            let wanted = if function == Function::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<FormulaValue> = None;
            for value in args.iter().filter(|value| !value.is_null()) {
                best = match best {
                    None => Some(value.clone()),
                    Some(current) => {
                        let ordering = value
                            .compare(&current)
                            .ok_or_else(|| mismatch(function.name(), &[value, &current]))?;
                        Some(if ordering == wanted {
                            value.clone()
                        } else {
                            current
                        })
                    }
                };
            }
            Ok(best.unwrap_or(Null))
        }
        Function::Round => {
            let digits = match arg(1) {
                Null => 0,
                Number(d) if (0.0..=10.0).contains(&d) => d.trunc() as i32,
                other => return Err(mismatch("ROUND digits", &[&other])),
            };
            match arg(0) {
                Null => Ok(Null),
                Number(n) => {
                    let factor = 10f64.powi(digits);
                    Ok(Number((n * factor).round() / factor))
                }
                other => Err(mismatch("ROUND", &[&other])),
            }
        }
        Function::Abs => match arg(0) {
            Null => Ok(Null),
            Number(n) => Ok(Number(n.abs())),
            other => Err(mismatch("ABS", &[&other])),
        },
        Function::Len => Ok(Number(arg(0).display_text().chars().count() as f64)),
        Function::Upper => Ok(match arg(0) {
            Null => Null,
            value => Text(value.display_text().to_uppercase()),
        }),
        Function::Lower => Ok(match arg(0) {
            Null => Null,
            value => Text(value.display_text().to_lowercase()),
        }),
        Function::Concat => Ok(Text(args.iter().map(FormulaValue::display_text).collect())),
        Function::Today => Ok(Date(today)),
        Function::DaysBetween => match (as_date(arg(0))?, as_date(arg(1))?) {
            (Some(start), Some(end)) => Ok(Number((end - start).num_days() as f64)),
            _ => Ok(Null),
        },
        Function::IsSet => Ok(Boolean(match arg(0) {
            Null => false,
            Text(s) => !s.trim().is_empty(),
            _ => true,
        })),
        Function::Coalesce => Ok(args
            .into_iter()
            .find(|value| !value.is_null())
            .unwrap_or(Null)),
    }
}

fn as_date(value: FormulaValue) -> Result<Option<NaiveDate>, FormulaError> {
    match value {
        FormulaValue::Null => Ok(None),
        FormulaValue::Date(date) => Ok(Some(date)),
        FormulaValue::Text(ref text) => parse_date(text)
            .map(Some)
            .ok_or_else(|| mismatch("DAYS_BETWEEN", &[&value])),
        other => Err(mismatch("DAYS_BETWEEN", &[&other])),
    }
}

/// Converts a result to the formula's declared type.
pub fn coerce(value: FormulaValue, result_as: FormulaResultAs) -> Result<FormulaValue, FormulaError> {
    use FormulaValue::*;

    let conversion_error = |value: &FormulaValue| FormulaError::Conversion {
        value: value.to_string(),
        target: result_as,
    };

    match (result_as, value) {
        (_, Null) => Ok(Null),
        (FormulaResultAs::Number, Number(n)) => Ok(Number(n)),
        (FormulaResultAs::Number, Boolean(b)) => Ok(Number(if b { 1.0 } else { 0.0 })),
        (FormulaResultAs::Number, Text(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Number)
            .ok_or_else(|| conversion_error(&Text(text))),
        (FormulaResultAs::String, value) => Ok(Text(value.display_text())),
        (FormulaResultAs::Boolean, Boolean(b)) => Ok(Boolean(b)),
        (FormulaResultAs::Boolean, Number(n)) => Ok(Boolean(n != 0.0)),
        (FormulaResultAs::Boolean, Text(text)) => {
            let normalized = text.trim().to_lowercase();
            match normalized.as_str() {
                "true" | "yes" | "1" => Ok(Boolean(true)),
                "false" | "no" | "0" | "" => Ok(Boolean(false)),
                _ => Err(conversion_error(&Text(text))),
            }
        }
        (FormulaResultAs::Date, Date(d)) => Ok(Date(d)),
        (FormulaResultAs::Date, Text(text)) => parse_date(&text)
            .map(Date)
            .ok_or_else(|| conversion_error(&Text(text))),
        (_, other) => Err(conversion_error(&other)),
    }
}

fn mismatch(operation: &'static str, values: &[&FormulaValue]) -> FormulaError {
    let found = values
        .iter()
        .map(|value| value.type_name())
        .collect::<Vec<_>>()
        .join(" and ");
    FormulaError::TypeMismatch { operation, found }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulas::{compile, parse_expression};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    }

    fn eval(text: &str, variables: &[(&str, FormulaValue)]) -> Result<FormulaValue, FormulaError> {
        let compiled = compile(&parse_expression(text)?)?;
        let variables: Variables = variables
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        evaluate_at(&compiled, &variables, today())
    }

    fn num(n: f64) -> FormulaValue {
        FormulaValue::Number(n)
    }

    fn text(s: &str) -> FormulaValue {
        FormulaValue::Text(s.to_string())
    }

    fn date(y: i32, m: u32, d: u32) -> FormulaValue {
        FormulaValue::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("2 + 3 * 4", &[]), Ok(num(14.0)));
        assert_eq!(eval("(2 + 3) * 4", &[]), Ok(num(20.0)));
        assert_eq!(eval("-2 * 3 + 10 % 4", &[]), Ok(num(-4.0)));
        assert_eq!(
            eval("price * qty", &[("price", num(2.5)), ("qty", num(4.0))]),
            Ok(num(10.0))
        );
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        assert_eq!(eval("missing + 1", &[]), Ok(FormulaValue::Null));
        assert_eq!(eval("-missing", &[]), Ok(FormulaValue::Null));
        assert_eq!(eval("missing > 1", &[]), Ok(FormulaValue::Null));
        assert_eq!(eval("missing = null", &[]), Ok(FormulaValue::Boolean(true)));
    }

    #[test]
    fn text_concatenation() {
        assert_eq!(eval("'Order #' + 42", &[]), Ok(text("Order #42")));
        assert_eq!(
            eval("first & ' ' & last", &[("first", text("Ada"))]),
            Ok(text("Ada "))
        );
        assert_eq!(eval("CONCAT('a', 1, true)", &[]), Ok(text("a1true")));
    }

    #[test]
    fn date_arithmetic() {
        let start = date(2025, 1, 31);
        assert_eq!(eval("d + 1", &[("d", start.clone())]), Ok(date(2025, 2, 1)));
        assert_eq!(eval("d - 31", &[("d", start.clone())]), Ok(date(2024, 12, 31)));
        assert_eq!(eval("TODAY() - d", &[("d", start)]), Ok(num(43.0)));
        assert_eq!(
            eval("DAYS_BETWEEN('2025-03-01', '2025-03-15')", &[]),
            Ok(num(14.0))
        );
    }

    #[test]
    fn date_shift_out_of_range_is_an_error() {
        let start = date(2025, 1, 1);
        for text in ["d + 1000000000000000", "d - 1000000000000000", "d + 99999999"] {
            let result = eval(text, &[("d", start.clone())]);
            assert!(
                matches!(result, Err(FormulaError::TypeMismatch { .. })),
                "{text}: {result:?}"
            );
        }
        assert!(matches!(
            shift_date(NaiveDate::MIN, f64::NAN),
            Err(FormulaError::TypeMismatch { .. })
        ));
        assert!(matches!(
            shift_date(NaiveDate::MAX, f64::INFINITY),
            Err(FormulaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn division_by_zero_fails() {
        assert_eq!(eval("1 / 0", &[]), Err(FormulaError::DivisionByZero));
        assert_eq!(eval("1 % 0", &[]), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval("3 >= 2 AND 'a' < 'b'", &[]), Ok(FormulaValue::Boolean(true)));
        assert_eq!(eval("NOT 1 = 1 OR false", &[]), Ok(FormulaValue::Boolean(false)));
        assert_eq!(eval("1 = '1'", &[]), Ok(FormulaValue::Boolean(false)));
        assert!(matches!(
            eval("1 < 'a'", &[]),
            Err(FormulaError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn functions() {
        assert_eq!(eval("IF(total > 100, 'big', 'small')", &[("total", num(150.0))]), Ok(text("big")));
        assert_eq!(eval("MIN(3, missing, 1, 2)", &[]), Ok(num(1.0)));
        assert_eq!(eval("MAX(3, 7, 1)", &[]), Ok(num(7.0)));
        assert_eq!(eval("ROUND(3.14159, 2)", &[]), Ok(num(3.14)));
        assert_eq!(eval("ROUND(2.5)", &[]), Ok(num(3.0)));
        assert_eq!(eval("ABS(-4)", &[]), Ok(num(4.0)));
        assert_eq!(eval("LEN('héllo')", &[]), Ok(num(5.0)));
        assert_eq!(eval("UPPER('abc') & LOWER('DEF')", &[]), Ok(text("ABCdef")));
        assert_eq!(eval("IS_SET(x)", &[("x", text("  "))]), Ok(FormulaValue::Boolean(false)));
        assert_eq!(eval("COALESCE(a, b, 9)", &[("b", num(2.0))]), Ok(num(2.0)));
        assert_eq!(eval("TODAY()", &[]), Ok(date(2025, 3, 15)));
    }

    #[test]
    fn coerce_to_declared_type() {
        assert_eq!(coerce(text("12.5"), FormulaResultAs::Number), Ok(num(12.5)));
        assert_eq!(coerce(num(3.0), FormulaResultAs::String), Ok(text("3")));
        assert_eq!(
            coerce(num(0.0), FormulaResultAs::Boolean),
            Ok(FormulaValue::Boolean(false))
        );
        assert_eq!(coerce(text("2025-03-01"), FormulaResultAs::Date), Ok(date(2025, 3, 1)));
        assert_eq!(coerce(FormulaValue::Null, FormulaResultAs::Number), Ok(FormulaValue::Null));
        assert!(matches!(
            coerce(text("soon"), FormulaResultAs::Date),
            Err(FormulaError::Conversion { .. })
        ));
    }
}
