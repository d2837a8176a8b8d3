use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FilterError;

/// Reserved prefix shared by every operator and logical key.
pub const OPERATOR_PREFIX: char = '_';

/// Default bound on filter nesting, see [`FilterNode::check_depth`].
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Caller-facing filter tree.
///
/// Keys are either field names (descending into the next level), operator tokens such as `_eq`
/// (a leaf) or the logical combinators `_and` / `_or`, whose value is a list of nested filters.
/// Key order is significant and preserved from the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterNode(pub Map<String, Value>);

impl FilterNode {
    pub fn new() -> Self { Self(Map::new()) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> { self.0.iter() }

    /// Build a filter from a JSON value, returning `None` if the value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> { value.as_object().map(|map| Self(map.clone())) }

    /// Deepest object nesting found anywhere in the tree, counting this node as 1.
    pub fn depth(&self) -> usize { 1 + self.0.values().map(value_depth).max().unwrap_or(0) }

    /// Reject trees nested beyond `limit` before any walker touches them.
    pub fn check_depth(&self, limit: usize) -> Result<(), FilterError> {
        if self.depth() > limit {
            return Err(FilterError::TooDeep(limit));
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for FilterNode {
    fn from(map: Map<String, Value>) -> Self { Self(map) }
}

impl TryFrom<Value> for FilterNode {
    type Error = FilterError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(FilterError::NotAnObject),
        }
    }
}

fn value_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        Value::Array(items) => items.iter().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logical {
    And,
    Or,
}

impl Logical {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_and" => Some(Logical::And),
            "_or" => Some(Logical::Or),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Logical::And => "_and",
            Logical::Or => "_or",
        }
    }
}

/// How a filter below a one-to-many relation quantifies over the related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// At least one related row matches.
    Some,
    /// No related row matches.
    None,
}

impl Quantifier {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_some" => Some(Quantifier::Some),
            "_none" => Some(Quantifier::None),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Quantifier::Some => "_some",
            Quantifier::None => "_none",
        }
    }
}

/// The closed set of leaf comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Ieq,
    Nieq,
    Contains,
    Ncontains,
    Icontains,
    Nicontains,
    StartsWith,
    NstartsWith,
    IstartsWith,
    NistartsWith,
    EndsWith,
    NendsWith,
    IendsWith,
    NiendsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Null,
    Nnull,
    Empty,
    Nempty,
    Between,
    Nbetween,
}

impl Operator {
    pub const ALL: [Operator; 28] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Ieq,
        Operator::Nieq,
        Operator::Contains,
        Operator::Ncontains,
        Operator::Icontains,
        Operator::Nicontains,
        Operator::StartsWith,
        Operator::NstartsWith,
        Operator::IstartsWith,
        Operator::NistartsWith,
        Operator::EndsWith,
        Operator::NendsWith,
        Operator::IendsWith,
        Operator::NiendsWith,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
        Operator::Null,
        Operator::Nnull,
        Operator::Empty,
        Operator::Nempty,
        Operator::Between,
        Operator::Nbetween,
    ];

    /// Look up a key in the known operator set. Keys that merely start with `_` are not operators.
    pub fn from_token(token: &str) -> Option<Self> { Self::ALL.iter().copied().find(|op| op.token() == token) }

    pub fn token(&self) -> &'static str {
        match self {
            Operator::Eq => "_eq",
            Operator::Neq => "_neq",
            Operator::Ieq => "_ieq",
            Operator::Nieq => "_nieq",
            Operator::Contains => "_contains",
            Operator::Ncontains => "_ncontains",
            Operator::Icontains => "_icontains",
            Operator::Nicontains => "_nicontains",
            Operator::StartsWith => "_starts_with",
            Operator::NstartsWith => "_nstarts_with",
            Operator::IstartsWith => "_istarts_with",
            Operator::NistartsWith => "_nistarts_with",
            Operator::EndsWith => "_ends_with",
            Operator::NendsWith => "_nends_with",
            Operator::IendsWith => "_iends_with",
            Operator::NiendsWith => "_niends_with",
            Operator::Gt => "_gt",
            Operator::Gte => "_gte",
            Operator::Lt => "_lt",
            Operator::Lte => "_lte",
            Operator::In => "_in",
            Operator::Nin => "_nin",
            Operator::Null => "_null",
            Operator::Nnull => "_nnull",
            Operator::Empty => "_empty",
            Operator::Nempty => "_nempty",
            Operator::Between => "_between",
            Operator::Nbetween => "_nbetween",
        }
    }

    /// Operators that are meaningful without a compare value (`?filter[field][_null]`).
    pub fn is_valueless(&self) -> bool { matches!(self, Operator::Null | Operator::Nnull | Operator::Empty | Operator::Nempty) }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.token()) }
}

/// Is `key` a known operator, logical combinator or quantifier, i.e. something that ends a field path?
pub fn is_reserved_key(key: &str) -> bool { Operator::from_token(key).is_some() || Logical::from_key(key).is_some() || Quantifier::from_key(key).is_some() }

/// A leaf comparison: operator plus the caller's compare value.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation<'a> {
    pub operator: Operator,
    pub value: &'a Value,
}

/// Split a list-ish compare value: arrays are taken as-is, strings are comma-split.
pub fn value_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => s.split(',').map(|part| Value::String(part.to_owned())).collect(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Treat `false` (and the string `"false"`) as the negation flag used by `_null` / `_empty`.
pub fn is_false_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !*b,
        Value::String(s) => s == "false",
        _ => false,
    }
}
