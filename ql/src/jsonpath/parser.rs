use pest::iterators::Pair;
use pest::Parser;
use serde_json::Value;
use tracing::debug;

use super::grammar::{JsonPathParser, Rule};
use super::{CompareOp, FilterExpr, JsonPath, Operand, Pattern, Segment};
use crate::error::ParseError;

/// Parse a JSON sub-path. Paths without a leading `$` are read relative to the root, so
/// `tags[0].name` and `$.tags[0].name` are the same path.
pub fn parse_path(input: &str) -> Result<JsonPath, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyExpression);
    }
    let normalized = normalize(trimmed);

    let mut pairs = JsonPathParser::parse(Rule::JsonPath, &normalized).map_err(|e| ParseError::SyntaxError(e.to_string()))?;
    let root = pairs.next().ok_or(ParseError::EmptyExpression)?;
    if root.as_rule() != Rule::JsonPath {
        return Err(ParseError::UnexpectedRule { expected: "JsonPath", got: root.as_rule() });
    }

    let mut segments = Vec::new();
    for pair in root.into_inner() {
        match pair.as_rule() {
            Rule::Root | Rule::EOI => {}
            _ => segments.push(parse_segment(pair)?),
        }
    }

    debug!("parsed json path {} into {} segments", normalized, segments.len());
    Ok(JsonPath { segments })
}

fn normalize(path: &str) -> String {
    if path.starts_with('$') {
        path.to_owned()
    } else if path.starts_with('.') || path.starts_with('[') {
        format!("${}", path)
    } else {
        format!("$.{}", path)
    }
}

fn parse_segment(pair: Pair<Rule>) -> Result<Segment, ParseError> {
    match pair.as_rule() {
        Rule::AnyMember => Ok(Segment::AnyMember),
        Rule::AnyIndex => Ok(Segment::AnyIndex),
        Rule::Member => Ok(Segment::Member(first_inner(pair, "Name")?.as_str().to_owned())),
        Rule::IndexSelector => Ok(Segment::Index(parse_integer(first_inner(pair, "Integer")?)?)),
        Rule::NameSelector => Ok(Segment::Member(parse_string(first_inner(pair, "QuotedString")?)?)),
        Rule::FilterSelector => Ok(Segment::Filter(parse_or(first_inner(pair, "Or")?)?)),
        other => Err(ParseError::UnexpectedRule { expected: "path segment", got: other }),
    }
}

fn first_inner<'i>(pair: Pair<'i, Rule>, expected: &'static str) -> Result<Pair<'i, Rule>, ParseError> {
    let rule = pair.as_rule();
    pair.into_inner().next().ok_or(ParseError::UnexpectedRule { expected, got: rule })
}

fn parse_integer(pair: Pair<Rule>) -> Result<i64, ParseError> {
    pair.as_str().parse().map_err(|_| ParseError::InvalidNumber(pair.as_str().to_owned()))
}

/// Quoted strings use JSON escapes, so serde_json does the decoding.
fn parse_string(pair: Pair<Rule>) -> Result<String, ParseError> {
    serde_json::from_str(pair.as_str()).map_err(|_| ParseError::InvalidString(pair.as_str().to_owned()))
}

fn parse_or(pair: Pair<Rule>) -> Result<FilterExpr, ParseError> {
    let mut items = pair.into_inner().map(parse_and).collect::<Result<Vec<_>, _>>()?;
    if items.len() == 1 {
        return items.pop().ok_or(ParseError::EmptyExpression);
    }
    Ok(FilterExpr::Or(items))
}

fn parse_and(pair: Pair<Rule>) -> Result<FilterExpr, ParseError> {
    if pair.as_rule() != Rule::And {
        return Err(ParseError::UnexpectedRule { expected: "And", got: pair.as_rule() });
    }
    let mut items = pair.into_inner().map(parse_unary).collect::<Result<Vec<_>, _>>()?;
    if items.len() == 1 {
        return items.pop().ok_or(ParseError::EmptyExpression);
    }
    Ok(FilterExpr::And(items))
}

fn parse_unary(pair: Pair<Rule>) -> Result<FilterExpr, ParseError> {
    match pair.as_rule() {
        Rule::Group => parse_or(first_inner(pair, "Or")?),
        Rule::Not => Ok(FilterExpr::Not(Box::new(parse_or(first_inner(pair, "Or")?)?))),
        Rule::LikeRegex => {
            let mut inner = pair.into_inner();
            let path = relative_path(inner.next())?;
            let source = parse_string(inner.next().ok_or(ParseError::EmptyExpression)?)?;
            let flags = inner.next().map(parse_string).transpose()?;
            Ok(FilterExpr::LikeRegex { path, pattern: Pattern::new(&source, flags.as_deref())? })
        }
        Rule::StartsWith => {
            let mut inner = pair.into_inner();
            let path = relative_path(inner.next())?;
            let prefix = parse_string(inner.next().ok_or(ParseError::EmptyExpression)?)?;
            Ok(FilterExpr::StartsWith { path, prefix })
        }
        Rule::Comparison => {
            let mut inner = pair.into_inner();
            let left = parse_operand(inner.next().ok_or(ParseError::EmptyExpression)?)?;
            let op = parse_compare_op(inner.next().ok_or(ParseError::EmptyExpression)?)?;
            let right = parse_operand(inner.next().ok_or(ParseError::EmptyExpression)?)?;
            Ok(FilterExpr::Compare { left, op, right })
        }
        other => Err(ParseError::UnexpectedRule { expected: "filter expression", got: other }),
    }
}

fn relative_path(pair: Option<Pair<Rule>>) -> Result<Vec<Segment>, ParseError> {
    let pair = pair.ok_or(ParseError::EmptyExpression)?;
    if pair.as_rule() != Rule::RelativePath {
        return Err(ParseError::UnexpectedRule { expected: "RelativePath", got: pair.as_rule() });
    }
    pair.into_inner().map(parse_segment).collect()
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand, ParseError> {
    match pair.as_rule() {
        Rule::RelativePath => Ok(Operand::Path(relative_path(Some(pair))?)),
        Rule::QuotedString => Ok(Operand::Value(Value::String(parse_string(pair)?))),
        Rule::NumberLiteral => {
            let number: Value = serde_json::from_str(pair.as_str()).map_err(|_| ParseError::InvalidNumber(pair.as_str().to_owned()))?;
            Ok(Operand::Value(number))
        }
        Rule::TrueLiteral => Ok(Operand::Value(Value::Bool(true))),
        Rule::FalseLiteral => Ok(Operand::Value(Value::Bool(false))),
        Rule::NullLiteral => Ok(Operand::Value(Value::Null)),
        other => Err(ParseError::UnexpectedRule { expected: "operand", got: other }),
    }
}

fn parse_compare_op(pair: Pair<Rule>) -> Result<CompareOp, ParseError> {
    match pair.as_str() {
        "==" => Ok(CompareOp::Eq),
        "!=" => Ok(CompareOp::Ne),
        ">" => Ok(CompareOp::Gt),
        ">=" => Ok(CompareOp::Ge),
        "<" => Ok(CompareOp::Lt),
        "<=" => Ok(CompareOp::Le),
        _ => Err(ParseError::UnexpectedRule { expected: "comparison operator", got: pair.as_rule() }),
    }
}

/// A `json(field, path)` field or filter key, split into its column and sub-path.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonFunction {
    /// Column holding the document, possibly dotted through relations (`author.profile`).
    pub field: String,
    pub path: JsonPath,
}

impl JsonFunction {
    /// Parse `json(field, path)`. The single-argument form `json(field.path)` splits at the first
    /// dot, which means it cannot address a document behind a relation.
    pub fn parse(key: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidJsonFunction(key.to_owned());
        let body = key.trim().strip_prefix("json(").and_then(|rest| rest.strip_suffix(')')).ok_or_else(invalid)?;

        let (field, path) = match body.split_once(',') {
            Some((field, path)) => (field.trim(), path.trim()),
            None => {
                let body = body.trim();
                let split = body.find(['.', '[']).ok_or_else(invalid)?;
                (&body[..split], &body[split..])
            }
        };
        if field.is_empty() || path.is_empty() {
            return Err(invalid());
        }

        Ok(Self { field: field.to_owned(), path: parse_path(path)? })
    }

    /// Does this look like a json function call at all?
    pub fn is_json_function(key: &str) -> bool { key.trim_start().starts_with("json(") && key.trim_end().ends_with(')') }
}
