//! # Formulas
//!
//! A small expression engine for calculated fields. Formulas are stored as an
//! ordered list of components (variables, operators, literals, functions),
//! compiled to reverse Polish notation and evaluated against a set of named
//! variables.

mod eval;
mod lexer;
mod rpn;
pub mod service;
mod value;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

pub use eval::{Variables, coerce, evaluate, evaluate_at};
pub use lexer::parse_expression;
pub use rpn::{CompiledFormula, Function, compile};
pub use service::{FormulaCalculation, FormulaService, FormulaServiceError};
pub use value::FormulaValue;

/// Kind of a formula component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Variable,
    Operator,
    Parenthesis,
    Value,
    Function,
    Separator,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Variable => "variable",
            ComponentType::Operator => "operator",
            ComponentType::Parenthesis => "parenthesis",
            ComponentType::Value => "value",
            ComponentType::Function => "function",
            ComponentType::Separator => "separator",
        }
    }
}

impl FromStr for ComponentType {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variable" => Ok(ComponentType::Variable),
            "operator" => Ok(ComponentType::Operator),
            "parenthesis" => Ok(ComponentType::Parenthesis),
            "value" => Ok(ComponentType::Value),
            "function" => Ok(ComponentType::Function),
            "separator" => Ok(ComponentType::Separator),
            other => Err(FormulaError::InvalidComponent {
                order: -1,
                reason: format!("unknown component type '{other}'"),
            }),
        }
    }
}

/// One token of a stored formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormulaComponent {
    pub order: i32,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub value: String,
}

impl FormulaComponent {
    pub fn new(order: i32, component_type: ComponentType, value: impl Into<String>) -> Self {
        Self {
            order,
            component_type,
            value: value.into(),
        }
    }
}

/// Declared type of a formula result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormulaResultAs {
    Number,
    String,
    Boolean,
    Date,
}

impl FormulaResultAs {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormulaResultAs::Number => "number",
            FormulaResultAs::String => "string",
            FormulaResultAs::Boolean => "boolean",
            FormulaResultAs::Date => "date",
        }
    }
}

impl fmt::Display for FormulaResultAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaResultAs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(FormulaResultAs::Number),
            "string" => Ok(FormulaResultAs::String),
            "boolean" => Ok(FormulaResultAs::Boolean),
            "date" => Ok(FormulaResultAs::Date),
            other => Err(format!("unknown result type '{other}'")),
        }
    }
}

/// When a calculated field is (re)computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CalculationTrigger {
    Never,
    IfUnset,
    Always,
    OnCreate,
    OnUpdate,
}

impl CalculationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationTrigger::Never => "never",
            CalculationTrigger::IfUnset => "if_unset",
            CalculationTrigger::Always => "always",
            CalculationTrigger::OnCreate => "on_create",
            CalculationTrigger::OnUpdate => "on_update",
        }
    }
}

impl FromStr for CalculationTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(CalculationTrigger::Never),
            "if_unset" => Ok(CalculationTrigger::IfUnset),
            "always" => Ok(CalculationTrigger::Always),
            "on_create" => Ok(CalculationTrigger::OnCreate),
            "on_update" => Ok(CalculationTrigger::OnUpdate),
            other => Err(format!("unknown calculation trigger '{other}'")),
        }
    }
}

/// Lifecycle moment of the record owning the calculated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CalculationEvent {
    Create,
    Update,
    Read,
}

/// Whether a calculated field must be computed for `event`.
pub fn should_calculate(
    trigger: CalculationTrigger,
    event: CalculationEvent,
    has_value: bool,
) -> bool {
    match trigger {
        CalculationTrigger::Never => false,
        CalculationTrigger::Always => true,
        CalculationTrigger::IfUnset => !has_value,
        CalculationTrigger::OnCreate => event == CalculationEvent::Create,
        CalculationTrigger::OnUpdate => event == CalculationEvent::Update,
    }
}

/// A stored formula with its components in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FormulaDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub result_as: FormulaResultAs,
    pub calculation_trigger: CalculationTrigger,
    pub with_logs: bool,
    pub components: Vec<FormulaComponent>,
}

/// Errors raised while parsing, compiling or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    EmptyFormula,
    #[error("formula has {actual} components, the limit is {max}")]
    TooManyComponents { max: usize, actual: usize },
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { position: usize, ch: char },
    #[error("unterminated string starting at position {position}")]
    UnterminatedString { position: usize },
    #[error("invalid component #{order}: {reason}")]
    InvalidComponent { order: i32, reason: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("unexpected '{token}' at component #{order}")]
    UnexpectedToken { order: i32, token: String },
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    #[error("expression ends with an operator")]
    TrailingOperator,
    #[error("function {function} expects {expected} arguments, got {actual}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        actual: usize,
    },
    #[error("malformed expression")]
    Malformed,
    #[error("division by zero")]
    DivisionByZero,
    #[error("cannot apply {operation} to {found}")]
    TypeMismatch {
        operation: &'static str,
        found: String,
    },
    #[error("cannot convert {value} to {target}")]
    Conversion {
        value: String,
        target: FormulaResultAs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_decisions() {
        use CalculationEvent::*;
        use CalculationTrigger::*;

        assert!(!should_calculate(Never, Create, false));
        assert!(should_calculate(Always, Read, true));
        assert!(should_calculate(IfUnset, Read, false));
        assert!(!should_calculate(IfUnset, Update, true));
        assert!(should_calculate(OnCreate, Create, true));
        assert!(!should_calculate(OnCreate, Update, false));
        assert!(should_calculate(OnUpdate, Update, true));
        assert!(!should_calculate(OnUpdate, Read, false));
    }

    #[test]
    fn component_wire_format() {
        let component = FormulaComponent::new(3, ComponentType::Function, "ROUND");
        assert_eq!(
            serde_json::to_value(&component).unwrap(),
            serde_json::json!({ "order": 3, "type": "function", "value": "ROUND" })
        );
        assert_eq!("separator".parse(), Ok(ComponentType::Separator));
    }
}
