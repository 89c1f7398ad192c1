//! Compiles formula components to reverse Polish notation (shunting-yard).

use super::value::{FormulaValue, parse_date};
use super::{ComponentType, FormulaComponent, FormulaError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "!=" | "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "AND" => BinaryOp::And,
            "OR" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 5,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Concat => 4,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Ge => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }

    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

const UNARY_PRECEDENCE: u8 = 6;

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    If,
    Min,
    Max,
    Round,
    Abs,
    Len,
    Upper,
    Lower,
    Concat,
    Today,
    DaysBetween,
    IsSet,
    Coalesce,
}

impl Function {
    pub const ALL: [Function; 13] = [
        Function::If,
        Function::Min,
        Function::Max,
        Function::Round,
        Function::Abs,
        Function::Len,
        Function::Upper,
        Function::Lower,
        Function::Concat,
        Function::Today,
        Function::DaysBetween,
        Function::IsSet,
        Function::Coalesce,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Function::If => "IF",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Round => "ROUND",
            Function::Abs => "ABS",
            Function::Len => "LEN",
            Function::Upper => "UPPER",
            Function::Lower => "LOWER",
            Function::Concat => "CONCAT",
            Function::Today => "TODAY",
            Function::DaysBetween => "DAYS_BETWEEN",
            Function::IsSet => "IS_SET",
            Function::Coalesce => "COALESCE",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        Function::ALL.into_iter().find(|f| f.name() == upper)
    }

    /// Accepted argument counts as `(min, max, description)`; a `None` max is unbounded.
    fn arity(&self) -> (usize, Option<usize>, &'static str) {
        match self {
            Function::If => (3, Some(3), "3"),
            Function::Min | Function::Max | Function::Concat | Function::Coalesce => {
                (1, None, "at least 1")
            }
            Function::Round => (1, Some(2), "1 or 2"),
            Function::Abs | Function::Len | Function::Upper | Function::Lower | Function::IsSet => {
                (1, Some(1), "1")
            }
            Function::Today => (0, Some(0), "0"),
            Function::DaysBetween => (2, Some(2), "2"),
        }
    }
}

/// One step of the compiled program.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Push(FormulaValue),
    Load(String),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Call { function: Function, argc: usize },
}

/// A formula ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    pub(crate) instructions: Vec<Instruction>,
}

impl CompiledFormula {
    /// Variable names referenced by the formula, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for instruction in &self.instructions {
            if let Instruction::Load(name) = instruction
                && !names.contains(&name.as_str())
            {
                names.push(name);
            }
        }
        names
    }
}

enum Pending {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Paren,
    Call(Function),
}

#[derive(Default)]
struct ArgFrame {
    separators: usize,
    has_value: bool,
}

/// Orders components by `order` and compiles them.
pub fn compile(components: &[FormulaComponent]) -> Result<CompiledFormula, FormulaError> {
    if components.is_empty() {
        return Err(FormulaError::EmptyFormula);
    }

    let mut sorted: Vec<&FormulaComponent> = components.iter().collect();
    sorted.sort_by_key(|component| component.order);

    let mut output = Vec::with_capacity(sorted.len());
    let mut stack: Vec<Pending> = Vec::new();
    let mut frames: Vec<ArgFrame> = Vec::new();
    let mut expect_operand = true;

    let unexpected = |component: &FormulaComponent| FormulaError::UnexpectedToken {
        order: component.order,
        token: component.value.clone(),
    };

    let mut index = 0;
    while index < sorted.len() {
        let component = sorted[index];
        let value = component.value.trim();

        match component.component_type {
            ComponentType::Value | ComponentType::Variable => {
                if !expect_operand {
                    return Err(unexpected(component));
                }
                if component.component_type == ComponentType::Value {
                    output.push(Instruction::Push(parse_literal(component)?));
                } else {
                    if value.is_empty() {
                        return Err(FormulaError::InvalidComponent {
                            order: component.order,
                            reason: "variable name cannot be empty".to_string(),
                        });
                    }
                    output.push(Instruction::Load(value.to_string()));
                }
                mark_value(&mut frames);
                expect_operand = false;
            }

            ComponentType::Function => {
                if !expect_operand {
                    return Err(unexpected(component));
                }
                let function = Function::parse(value)
                    .ok_or_else(|| FormulaError::UnknownFunction(value.to_string()))?;
                match sorted.get(index + 1) {
                    Some(next)
                        if next.component_type == ComponentType::Parenthesis
                            && next.value.trim() == "(" =>
                    {
                        index += 1;
                    }
                    _ => return Err(unexpected(component)),
                }
                stack.push(Pending::Call(function));
                frames.push(ArgFrame::default());
                expect_operand = true;
            }

            ComponentType::Parenthesis if value == "(" => {
                if !expect_operand {
                    return Err(unexpected(component));
                }
                stack.push(Pending::Paren);
            }

            ComponentType::Parenthesis if value == ")" => {
                if expect_operand {
                    let empty_call = matches!(stack.last(), Some(Pending::Call(_)))
                        && frames
                            .last()
                            .is_some_and(|f| f.separators == 0 && !f.has_value);
                    if !empty_call {
                        return Err(unexpected(component));
                    }
                }
                loop {
                    match stack.pop() {
                        Some(Pending::Paren) => break,
                        Some(Pending::Call(function)) => {
                            let frame = frames.pop().unwrap_or_default();
                            let argc = frame.separators + usize::from(frame.has_value);
                            check_arity(function, argc)?;
                            output.push(Instruction::Call { function, argc });
                            mark_value(&mut frames);
                            break;
                        }
                        Some(pending) => output.push(to_instruction(pending)),
                        None => return Err(FormulaError::UnbalancedParentheses),
                    }
                }
                expect_operand = false;
            }

            ComponentType::Parenthesis => {
                return Err(FormulaError::InvalidComponent {
                    order: component.order,
                    reason: format!("'{value}' is not a parenthesis"),
                });
            }

            ComponentType::Separator => {
                if expect_operand {
                    return Err(unexpected(component));
                }
                loop {
                    match stack.last() {
                        Some(Pending::Call(_)) => break,
                        Some(Pending::Paren) | None => return Err(unexpected(component)),
                        Some(_) => {}
                    }
                    if let Some(pending) = stack.pop() {
                        output.push(to_instruction(pending));
                    }
                }
                if let Some(frame) = frames.last_mut() {
                    frame.separators += 1;
                    frame.has_value = false;
                }
                expect_operand = true;
            }

            ComponentType::Operator => {
                let symbol = value.to_uppercase();
                if expect_operand {
                    match symbol.as_str() {
                        "-" => stack.push(Pending::Unary(UnaryOp::Neg)),
                        "NOT" => stack.push(Pending::Unary(UnaryOp::Not)),
                        "+" => {}
                        _ => return Err(unexpected(component)),
                    }
                } else {
                    let op = BinaryOp::parse(&symbol).ok_or_else(|| {
                        if symbol == "NOT" {
                            unexpected(component)
                        } else {
                            FormulaError::UnknownOperator(symbol.clone())
                        }
                    })?;
                    while let Some(top) = stack.last() {
                        let top_precedence = match top {
                            Pending::Unary(_) => UNARY_PRECEDENCE,
                            Pending::Binary(b) => b.precedence(),
                            Pending::Paren | Pending::Call(_) => break,
                        };
                        if top_precedence < op.precedence() {
                            break;
                        }
                        if let Some(pending) = stack.pop() {
                            output.push(to_instruction(pending));
                        }
                    }
                    stack.push(Pending::Binary(op));
                    expect_operand = true;
                }
            }
        }

        index += 1;
    }

    if expect_operand {
        return Err(FormulaError::TrailingOperator);
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Paren | Pending::Call(_) => return Err(FormulaError::UnbalancedParentheses),
            other => output.push(to_instruction(other)),
        }
    }

    Ok(CompiledFormula {
        instructions: output,
    })
}

fn mark_value(frames: &mut [ArgFrame]) {
    if let Some(frame) = frames.last_mut() {
        frame.has_value = true;
    }
}

fn to_instruction(pending: Pending) -> Instruction {
    match pending {
        Pending::Unary(op) => Instruction::Unary(op),
        Pending::Binary(op) => Instruction::Binary(op),
        // Parentheses and calls are resolved before reaching here.
        Pending::Paren | Pending::Call(_) => Instruction::Push(FormulaValue::Null),
    }
}

fn check_arity(function: Function, argc: usize) -> Result<(), FormulaError> {
    let (min, max, expected) = function.arity();
    if argc < min || max.is_some_and(|max| argc > max) {
        return Err(FormulaError::Arity {
            function: function.name(),
            expected,
            actual: argc,
        });
    }
    Ok(())
}

/// Interprets a `Value` component: numbers, quoted text, booleans, null or dates.
fn parse_literal(component: &FormulaComponent) -> Result<FormulaValue, FormulaError> {
    let raw = component.value.trim();

    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Ok(FormulaValue::Text(unescape(&raw[1..raw.len() - 1])));
    }

    match raw.to_lowercase().as_str() {
        "true" => return Ok(FormulaValue::Boolean(true)),
        "false" => return Ok(FormulaValue::Boolean(false)),
        "null" | "" => return Ok(FormulaValue::Null),
        _ => {}
    }

    if let Ok(number) = raw.parse::<f64>()
        && number.is_finite()
    {
        return Ok(FormulaValue::Number(number));
    }
    if let Some(date) = parse_date(raw) {
        return Ok(FormulaValue::Date(date));
    }

    Err(FormulaError::InvalidComponent {
        order: component.order,
        reason: format!("'{raw}' is not a valid literal"),
    })
}

fn unescape(inner: &str) -> String {
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(escaped) = chars.next() {
                result.push(escaped);
            }
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulas::parse_expression;

    fn compile_text(text: &str) -> Result<CompiledFormula, FormulaError> {
        compile(&parse_expression(text)?)
    }

    #[test]
    fn respects_precedence() {
        let compiled = compile_text("a + b * c").unwrap();
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::Load("a".to_string()),
                Instruction::Load("b".to_string()),
                Instruction::Load("c".to_string()),
                Instruction::Binary(BinaryOp::Mul),
                Instruction::Binary(BinaryOp::Add),
            ]
        );
    }

    #[test]
    fn unary_minus_binds_tightest() {
        let compiled = compile_text("-a * 2").unwrap();
        assert_eq!(
            compiled.instructions,
            vec![
                Instruction::Load("a".to_string()),
                Instruction::Unary(UnaryOp::Neg),
                Instruction::Push(FormulaValue::Number(2.0)),
                Instruction::Binary(BinaryOp::Mul),
            ]
        );
    }

    #[test]
    fn function_calls_count_arguments() {
        let compiled = compile_text("MAX(a, MIN(b, 1), 3)").unwrap();
        assert_eq!(
            compiled.instructions.last(),
            Some(&Instruction::Call {
                function: Function::Max,
                argc: 3
            })
        );
        assert!(compile_text("TODAY()").is_ok());
    }

    #[test]
    fn components_are_sorted_by_order() {
        let components = vec![
            FormulaComponent::new(3, ComponentType::Value, "2"),
            FormulaComponent::new(1, ComponentType::Variable, "price"),
            FormulaComponent::new(2, ComponentType::Operator, "*"),
        ];
        let compiled = compile(&components).unwrap();
        assert_eq!(compiled.variables(), vec!["price"]);
        assert_eq!(
            compiled.instructions[2],
            Instruction::Binary(BinaryOp::Mul)
        );
    }

    #[test]
    fn structural_errors() {
        assert_eq!(compile(&[]), Err(FormulaError::EmptyFormula));
        assert_eq!(compile_text("(a + b"), Err(FormulaError::UnbalancedParentheses));
        assert!(matches!(
            compile_text("a + b)"),
            Err(FormulaError::UnbalancedParentheses)
        ));
        assert_eq!(compile_text("a +"), Err(FormulaError::TrailingOperator));
        assert!(matches!(
            compile_text("a b"),
            Err(FormulaError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            compile_text("IF(a, b)"),
            Err(FormulaError::Arity {
                function: "IF",
                actual: 2,
                ..
            })
        ));
        assert_eq!(
            compile_text("FOO(1)"),
            Err(FormulaError::UnknownFunction("FOO".to_string()))
        );
        assert!(matches!(
            compile_text("a, b"),
            Err(FormulaError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn literals() {
        let literal = |raw: &str| parse_literal(&FormulaComponent::new(1, ComponentType::Value, raw));
        assert_eq!(literal("'it\\'s'"), Ok(FormulaValue::Text("it's".to_string())));
        assert_eq!(literal("false"), Ok(FormulaValue::Boolean(false)));
        assert_eq!(literal("1e3"), Ok(FormulaValue::Number(1000.0)));
        assert!(matches!(literal("2025-01-01"), Ok(FormulaValue::Date(_))));
        assert!(literal("abc").is_err());
    }
}
