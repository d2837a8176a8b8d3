//! Predicate emission: filter leaves to WHERE conditions.
//!
//! [`walk_filter`] visits every leaf of a filter tree, threading the field path and combining the
//! results with AND / OR as the logical keys dictate; [`Emitter`] turns one resolved leaf into a
//! [`Predicate`].

use serde_json::Value;
use skein_ql::ast::{is_false_flag, value_list, FilterNode, Logical, Operator};
use skein_ql::error::FilterError;
use skein_ql::resolve::resolve_field_path_within;
use tracing::debug;

use crate::error::CompileError;
use crate::schema::FieldType;
use crate::sql::{Expr, Predicate, SqlOp};
use crate::value::{cast_numeric, SqlValue};

/// How `_between` / `_nbetween` bounds are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    /// `BETWEEN low AND high`
    Inclusive,
    /// `> low AND < high`, matching the JSON path translation.
    Exclusive,
}

/// A leaf's resolved left-hand side.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub expr: Expr,
    pub field_type: Option<FieldType>,
    /// The expression yields `true` / `false` as text, so boolean compare values are bound as text.
    pub bool_as_text: bool,
}

impl Target {
    pub fn new(expr: Expr) -> Self { Self { expr, field_type: None, bool_as_text: false } }

    pub fn typed(expr: Expr, field_type: Option<FieldType>) -> Self { Self { expr, field_type, bool_as_text: false } }
}

#[derive(Debug, Clone, Copy)]
pub struct Emitter {
    pub range: RangeMode,
}

impl Emitter {
    pub fn new(range: RangeMode) -> Self { Self { range } }

    /// Split list operands first so every element is cast on its own.
    fn prepare(&self, target: &Target, operator: Operator, value: &Value) -> Value {
        let value = match operator {
            Operator::In | Operator::Nin | Operator::Between | Operator::Nbetween if !value.is_null() => Value::Array(value_list(value)),
            _ => value.clone(),
        };
        let value = if target.field_type.is_some_and(|t| t.is_numeric()) { cast_numeric(&value) } else { value };
        if target.bool_as_text { bools_as_text(value) } else { value }
    }

    /// Emit the condition for one leaf. `None` means the leaf places no restriction.
    pub fn emit(&self, target: &Target, operator: Operator, value: &Value) -> Option<Predicate> {
        if value.is_null() && !operator.is_valueless() && !matches!(operator, Operator::Eq | Operator::Neq) {
            debug!("skipping {} with a null compare value", operator);
            return None;
        }

        let value = self.prepare(target, operator, value);
        let column = || target.expr.clone();
        let bind = |value: &Value| Expr::Bind(SqlValue::from(value));
        let compare = |op: SqlOp, value: &Value| Predicate::compare(column(), op, bind(value));
        let like = |op: SqlOp, pattern: String| Predicate::compare(column(), op, Expr::Bind(SqlValue::Text(pattern)));
        let ilike = |op: SqlOp, pattern: String| Predicate::compare(column().lower(), op, Expr::Bind(SqlValue::Text(pattern.to_lowercase())));
        let text = text(&value);

        Some(match operator {
            Operator::Eq if value.is_null() => Predicate::is_null(column(), false),
            Operator::Neq if value.is_null() => Predicate::is_null(column(), true),
            Operator::Eq => compare(SqlOp::Eq, &value),
            Operator::Neq => compare(SqlOp::Ne, &value),
            Operator::Ieq => ilike(SqlOp::Eq, text),
            Operator::Nieq => ilike(SqlOp::Ne, text),
            Operator::Gt => compare(SqlOp::Gt, &value),
            Operator::Gte => compare(SqlOp::Ge, &value),
            Operator::Lt => compare(SqlOp::Lt, &value),
            Operator::Lte => compare(SqlOp::Le, &value),

            Operator::Contains => like(SqlOp::Like, format!("%{}%", text)),
            Operator::Ncontains => like(SqlOp::NotLike, format!("%{}%", text)),
            Operator::Icontains => ilike(SqlOp::Like, format!("%{}%", text)),
            Operator::Nicontains => ilike(SqlOp::NotLike, format!("%{}%", text)),
            Operator::StartsWith => like(SqlOp::Like, format!("{}%", text)),
            Operator::NstartsWith => like(SqlOp::NotLike, format!("{}%", text)),
            Operator::IstartsWith => ilike(SqlOp::Like, format!("{}%", text)),
            Operator::NistartsWith => ilike(SqlOp::NotLike, format!("{}%", text)),
            Operator::EndsWith => like(SqlOp::Like, format!("%{}", text)),
            Operator::NendsWith => like(SqlOp::NotLike, format!("%{}", text)),
            Operator::IendsWith => ilike(SqlOp::Like, format!("%{}", text)),
            Operator::NiendsWith => ilike(SqlOp::NotLike, format!("%{}", text)),

            Operator::In | Operator::Nin => {
                let negated = operator == Operator::Nin;
                let values = value_list(&value);
                if values.is_empty() {
                    // nothing is in the empty set
                    return Some(Predicate::Constant(negated));
                }
                Predicate::In { expr: column(), values: values.iter().map(bind).collect(), negated }
            }

            Operator::Null | Operator::Nnull => {
                let is_null = (operator == Operator::Null) != is_false_flag(&value);
                Predicate::is_null(column(), !is_null)
            }
            Operator::Empty | Operator::Nempty => {
                let is_empty = (operator == Operator::Empty) != is_false_flag(&value);
                if is_empty {
                    Predicate::Or(vec![Predicate::is_null(column(), false), Predicate::eq(column(), Expr::literal(""))])
                } else {
                    Predicate::And(vec![Predicate::is_null(column(), true), Predicate::compare(column(), SqlOp::Ne, Expr::literal(""))])
                }
            }

            Operator::Between | Operator::Nbetween => {
                let Ok([low, high]) = <[Value; 2]>::try_from(value_list(&value)) else {
                    debug!("skipping {} with a value that is not a pair", operator);
                    return None;
                };
                let negated = operator == Operator::Nbetween;
                match self.range {
                    RangeMode::Inclusive => Predicate::Between { expr: column(), low: bind(&low), high: bind(&high), negated },
                    RangeMode::Exclusive if negated => Predicate::Or(vec![compare(SqlOp::Lt, &low), compare(SqlOp::Gt, &high)]),
                    RangeMode::Exclusive => Predicate::And(vec![compare(SqlOp::Gt, &low), compare(SqlOp::Lt, &high)]),
                }
            }
        })
    }
}

fn bools_as_text(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(bools_as_text).collect()),
        other => other,
    }
}

/// Pattern text of a compare value; non-strings are used in their JSON spelling.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Visitor invoked for every leaf: the full field path, the operator and its compare value.
pub type LeafVisitor<'v> = dyn FnMut(&[String], Operator, &Value) -> Result<Option<Predicate>, CompileError> + 'v;

/// Receives the parts of a filter tree as the walk reaches them.
pub trait FilterVisitor {
    fn leaf(&mut self, path: &[String], operator: Operator, value: &Value) -> Result<Option<Predicate>, CompileError>;

    /// A field entry: `path` is the field path and `body` what sits below it. Overriding this takes
    /// over the whole entry; the default walks `body`.
    fn field(&mut self, path: &[String], body: &Value, max_depth: usize) -> Result<Option<Predicate>, CompileError> { walk_body(path, body, max_depth, self) }
}

impl FilterVisitor for LeafVisitor<'_> {
    fn leaf(&mut self, path: &[String], operator: Operator, value: &Value) -> Result<Option<Predicate>, CompileError> { self(path, operator, value) }
}

/// Walk a filter tree, AND-ing the entries of each level.
///
/// `_and` / `_or` switch the combinator for their children, at the top level or below a field
/// (`{ "author": { "_or": [...] } }` applies both branches to `author`). An `_or` list holding an
/// empty object matches everything, so the whole `_or` entry is dropped.
pub fn walk_filter(filter: &FilterNode, max_depth: usize, visit: &mut LeafVisitor<'_>) -> Result<Option<Predicate>, CompileError> { walk_with(filter, max_depth, visit) }

/// [`walk_filter`] with a visitor that may take over whole field entries.
pub fn walk_with<V: FilterVisitor + ?Sized>(filter: &FilterNode, max_depth: usize, visitor: &mut V) -> Result<Option<Predicate>, CompileError> {
    filter.check_depth(max_depth)?;
    walk_level(filter, &[], max_depth, visitor)
}

/// Walk one level of a filter tree whose field paths continue `prefix`.
pub fn walk_level<V: FilterVisitor + ?Sized>(filter: &FilterNode, prefix: &[String], max_depth: usize, visitor: &mut V) -> Result<Option<Predicate>, CompileError> {
    let mut conditions = Vec::new();

    for (key, value) in filter.iter() {
        if let Some(condition) = walk_entry(key, value, prefix, max_depth, visitor)? {
            conditions.push(condition);
        }
    }

    Ok(Predicate::all(conditions))
}

fn walk_entry<V: FilterVisitor + ?Sized>(key: &str, value: &Value, prefix: &[String], max_depth: usize, visitor: &mut V) -> Result<Option<Predicate>, CompileError> {
    if let Some(logical) = Logical::from_key(key) {
        let children = value.as_array().ok_or(FilterError::InvalidLogical(logical.key()))?;
        if logical == Logical::Or && children.iter().any(|child| child.as_object().is_some_and(|map| map.is_empty())) {
            debug!("_or with an empty branch matches everything");
            return Ok(None);
        }

        let mut compiled = Vec::new();
        for child in children {
            let child = FilterNode::from_value(child).ok_or(FilterError::InvalidLogical(logical.key()))?;
            if let Some(condition) = walk_level(&child, prefix, max_depth, visitor)? {
                compiled.push(condition);
            }
        }
        return Ok(match logical {
            Logical::And => Predicate::all(compiled),
            Logical::Or => Predicate::any(compiled),
        });
    }

    if let Some(operator) = Operator::from_token(key) {
        if prefix.is_empty() {
            debug!("ignoring operator {} outside of a field", operator);
            return Ok(None);
        }
        return visitor.leaf(prefix, operator, value);
    }

    let segments = resolve_field_path_within(key, value, max_depth);
    let mut body = value;
    for segment in &segments[1..] {
        match body.get(segment) {
            Some(next) => body = next,
            None => break,
        }
    }

    let mut path = prefix.to_vec();
    path.extend(segments);
    visitor.field(&path, body, max_depth)
}

/// Walk the body of a field entry: operators and logical lists below `path`, or a bare value as
/// shorthand for `_eq`.
pub fn walk_body<V: FilterVisitor + ?Sized>(path: &[String], body: &Value, max_depth: usize, visitor: &mut V) -> Result<Option<Predicate>, CompileError> {
    match body {
        Value::Object(entries) => {
            let mut conditions = Vec::new();
            for (child_key, child_value) in entries {
                if Operator::from_token(child_key).is_none() && Logical::from_key(child_key).is_none() {
                    debug!("ignoring {} next to an operator", child_key);
                    continue;
                }
                if let Some(condition) = walk_entry(child_key, child_value, path, max_depth, visitor)? {
                    conditions.push(condition);
                }
            }
            Ok(Predicate::all(conditions))
        }
        other => visitor.leaf(path, Operator::Eq, other),
    }
}
