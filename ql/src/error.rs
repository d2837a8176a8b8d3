use crate::jsonpath::grammar::Rule;
use thiserror::Error;

/// Errors raised while parsing JSON sub-path expressions and `json(field, path)` keys
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    SyntaxError(String),
    #[error("Empty expression")]
    EmptyExpression,
    #[error("Expected {expected}, got {got:?}")]
    UnexpectedRule { expected: &'static str, got: Rule },
    #[error("Invalid string literal {0}")]
    InvalidString(String),
    #[error("Invalid number literal {0}")]
    InvalidNumber(String),
    #[error("Invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("Unsupported regex flag '{0}'")]
    UnsupportedFlag(char),
    #[error("Invalid json function {0:?}, expected json(field, path)")]
    InvalidJsonFunction(String),
}

/// Errors for filter trees that are rejected up front, before any walk
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("filter nesting exceeds the maximum depth of {0}")]
    TooDeep(usize),
    #[error("filter must be a JSON object")]
    NotAnObject,
    #[error("logical operator {0} expects a list of filter objects")]
    InvalidLogical(&'static str),
    #[error(transparent)]
    Parse(#[from] ParseError),
}
