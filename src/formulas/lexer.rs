//! Splits formula text into components.

use super::{ComponentType, FormulaComponent, FormulaError};

const TWO_CHAR_OPERATORS: [&str; 4] = ["<=", ">=", "!=", "<>"];
const ONE_CHAR_OPERATORS: &str = "+-*/%=<>&";

/// Parses formula text such as `ROUND(price * quantity, 2)` into ordered components.
pub fn parse_expression(text: &str) -> Result<Vec<FormulaComponent>, FormulaError> {
    let chars: Vec<char> = text.chars().collect();
    let mut components = Vec::new();
    let mut i = 0;

    let mut push = |component_type: ComponentType, value: String| {
        let order = components.len() as i32 + 1;
        components.push(FormulaComponent::new(order, component_type, value));
    };

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit))
        {
            let start = i;
            let mut seen_dot = false;
            while i < chars.len() && (chars[i].is_ascii_digit() || (chars[i] == '.' && !seen_dot))
            {
                seen_dot |= chars[i] == '.';
                i += 1;
            }
            push(ComponentType::Value, chars[start..i].iter().collect());
            continue;
        }

        if ch == '"' || ch == '\'' {
            let start = i;
            i += 1;
            let mut closed = false;
            while i < chars.len() {
                match chars[i] {
                    '\\' => i += 2,
                    c if c == ch => {
                        closed = true;
                        i += 1;
                        break;
                    }
                    _ => i += 1,
                }
            }
            if !closed {
                return Err(FormulaError::UnterminatedString { position: start });
            }
            push(ComponentType::Value, chars[start..i].iter().collect());
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let upper = word.to_uppercase();

            let mut lookahead = i;
            while lookahead < chars.len() && chars[lookahead].is_whitespace() {
                lookahead += 1;
            }
            let is_call = chars.get(lookahead) == Some(&'(');

            match upper.as_str() {
                "AND" | "OR" | "NOT" => push(ComponentType::Operator, upper),
                "TRUE" | "FALSE" | "NULL" => push(ComponentType::Value, word.to_lowercase()),
                _ if is_call => push(ComponentType::Function, upper),
                _ => push(ComponentType::Variable, word),
            }
            continue;
        }

        match ch {
            '(' | ')' => {
                push(ComponentType::Parenthesis, ch.to_string());
                i += 1;
            }
            ',' => {
                push(ComponentType::Separator, ch.to_string());
                i += 1;
            }
            _ => {
                let pair: String = chars[i..chars.len().min(i + 2)].iter().collect();
                if TWO_CHAR_OPERATORS.contains(&pair.as_str()) {
                    push(ComponentType::Operator, pair);
                    i += 2;
                } else if ONE_CHAR_OPERATORS.contains(ch) {
                    push(ComponentType::Operator, ch.to_string());
                    i += 1;
                } else {
                    return Err(FormulaError::UnexpectedCharacter { position: i, ch });
                }
            }
        }
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(ComponentType, String)> {
        parse_expression(text)
            .unwrap()
            .into_iter()
            .map(|c| (c.component_type, c.value))
            .collect()
    }

    #[test]
    fn tokenizes_function_call() {
        use ComponentType::*;
        assert_eq!(
            kinds("round(order.total * 1.16, 2)"),
            vec![
                (Function, "ROUND".to_string()),
                (Parenthesis, "(".to_string()),
                (Variable, "order.total".to_string()),
                (Operator, "*".to_string()),
                (Value, "1.16".to_string()),
                (Separator, ",".to_string()),
                (Value, "2".to_string()),
                (Parenthesis, ")".to_string()),
            ]
        );
    }

    #[test]
    fn tokenizes_keywords_strings_and_comparisons() {
        use ComponentType::*;
        assert_eq!(
            kinds("status <> 'won' and NOT archived or True"),
            vec![
                (Variable, "status".to_string()),
                (Operator, "<>".to_string()),
                (Value, "'won'".to_string()),
                (Operator, "AND".to_string()),
                (Operator, "NOT".to_string()),
                (Variable, "archived".to_string()),
                (Operator, "OR".to_string()),
                (Value, "true".to_string()),
            ]
        );
    }

    #[test]
    fn orders_are_sequential() {
        let orders: Vec<i32> = parse_expression("a + b")
            .unwrap()
            .iter()
            .map(|c| c.order)
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        assert_eq!(
            kinds(r#""say \"hi\"" & x"#)[0].1,
            r#""say \"hi\"""#.to_string()
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            parse_expression("'open"),
            Err(FormulaError::UnterminatedString { position: 0 })
        );
        assert_eq!(
            parse_expression("a # b"),
            Err(FormulaError::UnexpectedCharacter { position: 2, ch: '#' })
        );
    }
}
