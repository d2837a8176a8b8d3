//! In-memory evaluation of [`JsonPath`] expressions against parsed JSON documents.
//!
//! Used to post-process rows for databases that cannot run a path natively: the SQL side fetches
//! the whole document and the path is applied here.

use std::cmp::Ordering;

use serde_json::Value;

use super::{CompareOp, FilterExpr, JsonPath, Operand, Segment};

impl JsonPath {
    /// Every node the path selects, in document order.
    pub fn select<'v>(&self, document: &'v Value) -> Vec<&'v Value> {
        let mut nodes = vec![document];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in nodes {
                step(segment, node, &mut next);
            }
            if next.is_empty() {
                return next;
            }
            nodes = next;
        }
        nodes
    }

    /// Apply the path to a document.
    ///
    /// A definite path yields the addressed value, or `null` when it is missing. Any path with a
    /// wildcard or filter yields an array of every match, which is empty when nothing matched.
    pub fn evaluate(&self, document: &Value) -> Value {
        let nodes = self.select(document);
        if self.is_definite() {
            nodes.into_iter().next().cloned().unwrap_or(Value::Null)
        } else {
            Value::Array(nodes.into_iter().cloned().collect())
        }
    }
}

fn step<'v>(segment: &Segment, node: &'v Value, out: &mut Vec<&'v Value>) {
    match segment {
        Segment::Member(name) => {
            if let Some(child) = node.as_object().and_then(|map| map.get(name)) {
                out.push(child);
            }
        }
        Segment::Index(index) => {
            if let Some(child) = index_into(node, *index) {
                out.push(child);
            }
        }
        Segment::AnyIndex => {
            if let Value::Array(items) = node {
                out.extend(items.iter());
            }
        }
        Segment::AnyMember => {
            if let Value::Object(map) = node {
                out.extend(map.values());
            }
        }
        Segment::Filter(expr) => {
            let children: Box<dyn Iterator<Item = &'v Value>> = match node {
                Value::Array(items) => Box::new(items.iter()),
                Value::Object(map) => Box::new(map.values()),
                _ => return,
            };
            out.extend(children.filter(|child| test(expr, child) == Some(true)));
        }
    }
}

fn index_into(node: &Value, index: i64) -> Option<&Value> {
    let items = node.as_array()?;
    let position = if index < 0 { items.len().checked_sub(index.unsigned_abs() as usize)? } else { index as usize };
    items.get(position)
}

/// Follow member and index steps from the current node (`@`).
fn relative<'v>(steps: &[Segment], node: &'v Value) -> Option<&'v Value> {
    steps.iter().try_fold(node, |current, segment| match segment {
        Segment::Member(name) => current.as_object()?.get(name),
        Segment::Index(index) => index_into(current, *index),
        _ => None,
    })
}

/// Three-valued predicate test: `None` is SQL/JSON's "unknown".
fn test(expr: &FilterExpr, node: &Value) -> Option<bool> {
    match expr {
        FilterExpr::Or(items) => {
            let mut result = Some(false);
            for item in items {
                match test(item, node) {
                    Some(true) => return Some(true),
                    None => result = None,
                    Some(false) => {}
                }
            }
            result
        }
        FilterExpr::And(items) => {
            let mut result = Some(true);
            for item in items {
                match test(item, node) {
                    Some(false) => return Some(false),
                    None => result = None,
                    Some(true) => {}
                }
            }
            result
        }
        FilterExpr::Not(inner) => test(inner, node).map(|b| !b),
        FilterExpr::Compare { left, op, right } => {
            let (Some(left), Some(right)) = (operand(left, node), operand(right, node)) else {
                return Some(false);
            };
            compare(left, *op, right)
        }
        FilterExpr::LikeRegex { path, pattern } => match relative(path, node)? {
            Value::String(s) => Some(pattern.is_match(s)),
            _ => None,
        },
        FilterExpr::StartsWith { path, prefix } => match relative(path, node)? {
            Value::String(s) => Some(s.starts_with(prefix.as_str())),
            _ => None,
        },
    }
}

fn operand<'v>(operand: &'v Operand, node: &'v Value) -> Option<&'v Value> {
    match operand {
        Operand::Path(steps) => relative(steps, node),
        Operand::Value(value) => Some(value),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Option<bool> {
    let ordering = match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        // null is only ever equal to null
        (Value::Null, _) | (_, Value::Null) => {
            return match op {
                CompareOp::Eq => Some(false),
                CompareOp::Ne => Some(true),
                _ => None,
            };
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => {
            return match op {
                CompareOp::Eq => Some(a == b),
                CompareOp::Ne => Some(a != b),
                _ => None,
            };
        }
        _ => return None,
    };

    Some(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
    })
}
