//! Translation of filter trees into JSONPath filter predicates.
//!
//! A JSON field request may carry a filter restricting the array elements it returns, e.g.
//! `{ "name": { "_icontains": "red" } }` on `$.tags[*]`. Databases with a SQL/JSON path engine run
//! the predicate natively (`$.tags[*] ? (@.name like_regex "red" flag "i")`); everything else
//! evaluates the in-memory rendering (`$.tags[?(@.name like_regex "red" flag "i")]`).

use serde_json::Value;
use tracing::debug;

use crate::ast::{is_false_flag, value_list, FilterNode, Logical, Operator};
use crate::error::FilterError;
use crate::jsonpath::{CompareOp, FilterExpr, JsonPath, Operand, PathLanguage, Pattern, Segment};
use crate::resolve::resolve_leaf;

/// Compile one leaf comparison on the element field `field` (relative to `@`).
///
/// Returns `Ok(None)` when the leaf places no restriction: a value-requiring operator with a null
/// value, or a range that does not have exactly two bounds.
pub fn compile_predicate(field: &[String], operator: Operator, value: &Value, language: PathLanguage) -> Result<Option<FilterExpr>, FilterError> {
    let path: Vec<Segment> = field.iter().map(|name| Segment::Member(name.clone())).collect();
    let compare = |op: CompareOp, value: Value| FilterExpr::Compare { left: Operand::Path(path.clone()), op, right: Operand::Value(value) };
    let regex = |source: String, flags: Option<&str>| -> Result<FilterExpr, FilterError> {
        Ok(FilterExpr::LikeRegex { path: path.clone(), pattern: Pattern::new(&source, flags)? })
    };
    let not = |expr: FilterExpr| FilterExpr::Not(Box::new(expr));

    if value.is_null() && !operator.is_valueless() && !matches!(operator, Operator::Eq | Operator::Neq) {
        return Ok(None);
    }

    let expr = match operator {
        Operator::Eq => compare(CompareOp::Eq, value.clone()),
        Operator::Neq => compare(CompareOp::Ne, value.clone()),
        Operator::Gt => compare(CompareOp::Gt, value.clone()),
        Operator::Gte => compare(CompareOp::Ge, value.clone()),
        Operator::Lt => compare(CompareOp::Lt, value.clone()),
        Operator::Lte => compare(CompareOp::Le, value.clone()),

        Operator::Contains => regex(literal(value), None)?,
        Operator::Ncontains => not(regex(literal(value), None)?),
        Operator::Icontains => regex(literal(value), Some("i"))?,
        Operator::Nicontains => not(regex(literal(value), Some("i"))?),

        Operator::StartsWith if language.supports_starts_with() => FilterExpr::StartsWith { path: path.clone(), prefix: text(value) },
        Operator::NstartsWith if language.supports_starts_with() => not(FilterExpr::StartsWith { path: path.clone(), prefix: text(value) }),
        Operator::StartsWith => regex(format!("^{}", literal(value)), None)?,
        Operator::NstartsWith => not(regex(format!("^{}", literal(value)), None)?),
        Operator::IstartsWith => regex(format!("^{}", literal(value)), Some("i"))?,
        Operator::NistartsWith => not(regex(format!("^{}", literal(value)), Some("i"))?),

        Operator::EndsWith => regex(format!("{}$", literal(value)), None)?,
        Operator::NendsWith => not(regex(format!("{}$", literal(value)), None)?),
        Operator::IendsWith => regex(format!("{}$", literal(value)), Some("i"))?,
        Operator::NiendsWith => not(regex(format!("{}$", literal(value)), Some("i"))?),

        Operator::Ieq => regex(format!("^{}$", literal(value)), Some("i"))?,
        Operator::Nieq => not(regex(format!("^{}$", literal(value)), Some("i"))?),

        Operator::In | Operator::Nin => {
            let any_of = operator == Operator::In;
            let op = if any_of { CompareOp::Eq } else { CompareOp::Ne };
            let mut items: Vec<FilterExpr> = value_list(value).into_iter().map(|item| compare(op, item)).collect();
            match items.len() {
                // `1 == 0` never holds, `1 == 1` always does
                0 => FilterExpr::Compare {
                    left: Operand::Value(Value::from(1)),
                    op: CompareOp::Eq,
                    right: Operand::Value(Value::from(if any_of { 0 } else { 1 })),
                },
                1 => items.remove(0),
                _ if any_of => FilterExpr::Or(items),
                _ => FilterExpr::And(items),
            }
        }

        Operator::Null | Operator::Nnull => {
            let is_null = (operator == Operator::Null) != is_false_flag(value);
            compare(if is_null { CompareOp::Eq } else { CompareOp::Ne }, Value::Null)
        }
        Operator::Empty | Operator::Nempty => {
            let is_empty = (operator == Operator::Empty) != is_false_flag(value);
            if is_empty {
                FilterExpr::Or(vec![compare(CompareOp::Eq, Value::Null), compare(CompareOp::Eq, Value::String(String::new()))])
            } else {
                FilterExpr::And(vec![compare(CompareOp::Ne, Value::Null), compare(CompareOp::Ne, Value::String(String::new()))])
            }
        }

        Operator::Between | Operator::Nbetween => {
            let bounds: Vec<Value> = value_list(value).into_iter().map(numeric_bound).collect();
            let Ok([low, high]) = <[Value; 2]>::try_from(bounds) else {
                debug!("skipping {} with a value that is not a pair", operator);
                return Ok(None);
            };
            // exclusive bounds on both ends
            if operator == Operator::Between {
                FilterExpr::And(vec![compare(CompareOp::Gt, low), compare(CompareOp::Lt, high)])
            } else {
                FilterExpr::Or(vec![compare(CompareOp::Lt, low), compare(CompareOp::Gt, high)])
            }
        }
    };

    Ok(Some(expr))
}

/// Compile a whole filter tree. Entries at one level are AND-ed; `_and` / `_or` lists switch the
/// mode for their children. `Ok(None)` means the filter does not restrict anything.
pub fn compile_filter(filter: &FilterNode, language: PathLanguage) -> Result<Option<FilterExpr>, FilterError> {
    filter.check_depth(crate::ast::DEFAULT_MAX_DEPTH)?;
    compile_level(filter, language)
}

fn compile_level(filter: &FilterNode, language: PathLanguage) -> Result<Option<FilterExpr>, FilterError> {
    let mut conditions = Vec::new();

    for (key, value) in filter.iter() {
        if let Some(logical) = Logical::from_key(key) {
            let children = value.as_array().ok_or(FilterError::InvalidLogical(logical.key()))?;
            // an empty object inside `_or` matches everything
            if logical == Logical::Or && children.iter().any(|child| child.as_object().is_some_and(|map| map.is_empty())) {
                continue;
            }

            let mut compiled = Vec::new();
            for child in children {
                let child = FilterNode::from_value(child).ok_or(FilterError::InvalidLogical(logical.key()))?;
                if let Some(expr) = compile_level(&child, language)? {
                    compiled.push(expr);
                }
            }
            match (logical, compiled.len()) {
                (_, 0) => {}
                (_, 1) => conditions.extend(compiled),
                (Logical::And, _) => conditions.push(FilterExpr::And(compiled)),
                (Logical::Or, _) => conditions.push(FilterExpr::Or(compiled)),
            }
            continue;
        }

        let Some((field, operation)) = resolve_leaf(key, value) else { continue };
        if let Some(expr) = compile_predicate(&field, operation.operator, operation.value, language)? {
            conditions.push(expr);
        }
    }

    Ok(match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(FilterExpr::And(conditions)),
    })
}

/// Embed a filter into a path. The filter takes the place of the last wildcard; a path without
/// one is treated as ending in `[*]`, so the filter applies to the elements of the addressed array.
pub fn embed_filter(path: &JsonPath, filter: &FilterNode, language: PathLanguage) -> Result<JsonPath, FilterError> {
    let Some(expr) = compile_filter(filter, language)? else {
        return Ok(path.clone());
    };

    let mut segments = path.segments.clone();
    match path.last_wildcard() {
        Some(position) => {
            segments[position] = match segments[position].clone() {
                Segment::Filter(existing) => Segment::Filter(FilterExpr::And(vec![existing, expr])),
                _ => Segment::Filter(expr),
            };
        }
        None => segments.push(Segment::Filter(expr)),
    }

    let embedded = JsonPath::from_segments(segments);
    debug!("embedded filter into {}: {}", path, embedded);
    Ok(embedded)
}

/// Pattern text of a compare value; non-strings are used in their JSON spelling.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Compare text as a regex matching it literally.
fn literal(value: &Value) -> String { regex::escape(&text(value)) }

/// Range bounds given as `"1,5"` compare as numbers when they look like numbers.
fn numeric_bound(value: Value) -> Value {
    match &value {
        Value::String(s) => serde_json::from_str::<serde_json::Number>(s.trim()).map(Value::Number).unwrap_or(value),
        _ => value,
    }
}
