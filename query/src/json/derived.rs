//! Join-based extraction: one row expansion per wildcard level, re-aggregated per primary key.
//!
//! For `$.orders[*].items[*].sku` on SQLite:
//!
//! ```sql
//! WITH "j1" AS (
//!   SELECT "j2"."id" AS "pk", json_group_array(json_extract("j2"."doc", "j4"."fullkey" || '.sku')) AS "value"
//!   FROM "t" AS "j2", json_each("j2"."doc", '$.orders') AS "j3", json_each("j2"."doc", "j3"."fullkey" || '.items') AS "j4"
//!   GROUP BY "j2"."id")
//! SELECT ..., COALESCE("j1"."value", '[]') AS "skus" FROM "t" LEFT JOIN "j1" ON "t"."id" = "j1"."pk"
//! ```
//!
//! MySQL 8, MariaDB and Oracle chain `JSON_TABLE` calls in a derived table instead, each level
//! exposing the current element as a `node` column for the next one. Element filters become WHERE
//! conditions on the innermost level.

use std::collections::HashMap;

use serde_json::Value;
use skein_ql::ast::Operator;
use skein_ql::jsonpath::{JsonPath, Segment};

use super::{JsonFieldNode, ValueKind};
use crate::alias::ResolvedPath;
use crate::compile::Compilation;
use crate::correction::Correction;
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::predicate::{walk_filter, Emitter, RangeMode, Target};
use crate::sql::{Cte, Expr, Join, Predicate, Select, SelectItem, Source};

/// Row-expansion primitive of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    /// SQLite `json_each`, addressing everything through `fullkey` paths on the root document.
    JsonEach,
    /// `JSON_TABLE` with declared, typed columns.
    JsonTable,
}

/// A typed column declared on the innermost `JSON_TABLE` level for an element filter.
struct FilterColumn {
    name: String,
    path: String,
    kind: ValueKind,
}

/// `JsonPath` rendered without its leading `$`, for appending to a `fullkey`.
fn relative(path: &JsonPath) -> String {
    let rendered = path.sql_json();
    rendered.strip_prefix('$').unwrap_or(&rendered).to_owned()
}

fn element_path(field: &[String]) -> JsonPath { JsonPath::from_segments(field.iter().map(|name| Segment::Member(name.clone())).collect()) }

pub(super) fn extract(cx: &mut Compilation<'_>, node: &JsonFieldNode, resolved: &ResolvedPath) -> Result<(), CompileError> {
    let dialect = cx.dialect;
    let expansion = match dialect {
        Dialect::Sqlite => Expansion::JsonEach,
        Dialect::MySql8 | Dialect::MariaDb | Dialect::Oracle => Expansion::JsonTable,
        _ => return Err(CompileError::unsupported(dialect, "expanding JSON arrays into rows")),
    };
    let Some(primary) = cx.primary.clone() else {
        return Err(CompileError::InvalidQuery(format!("{} has no primary key to aggregate {} by", cx.root, node.key)));
    };

    let path = node.effective_path();
    let positions = path.wildcard_positions();
    let derived = cx.aliases.fresh();
    let row = cx.aliases.fresh();
    let levels: Vec<String> = positions.iter().map(|_| cx.aliases.fresh()).collect();
    let Some(innermost) = levels.last().cloned() else {
        return Err(CompileError::InvalidQuery(format!("{} has no wildcard to expand", path)));
    };
    let document = Expr::column(&row, &resolved.column);
    let trailing = path.slice(positions.last().map_or(0, |p| p + 1)..path.segments.len());

    // element filter conditions, on the innermost level
    let mut columns: Vec<FilterColumn> = Vec::new();
    let mut declared: HashMap<(Vec<String>, ValueKind), String> = HashMap::new();
    let filter = match &node.filter {
        None => None,
        Some(filter) => {
            let emitter = Emitter::new(RangeMode::Exclusive);
            let mut visit = |field: &[String], operator: Operator, value: &Value| -> Result<Option<Predicate>, CompileError> {
                let kind = ValueKind::of(operator, value);
                let target = match expansion {
                    Expansion::JsonEach => {
                        let at = Expr::column(&innermost, "fullkey").infix("||", Expr::literal(relative(&element_path(field))));
                        Target::new(Expr::func("json_extract", vec![document.clone(), at]))
                    }
                    Expansion::JsonTable => {
                        let next = columns.len() + 1;
                        let name = declared.entry((field.to_vec(), kind)).or_insert_with(|| format!("f{}", next)).clone();
                        if columns.len() < declared.len() {
                            columns.push(FilterColumn { name: name.clone(), path: element_path(field).sql_json(), kind });
                        }
                        Target { expr: Expr::column(&innermost, name), field_type: None, bool_as_text: kind == ValueKind::Bool }
                    }
                };
                Ok(emitter.emit(&target, operator, value))
            };
            walk_filter(filter, cx.options.max_filter_depth, &mut visit)?
        }
    };

    let mut select = Select::from(Source::aliased(&cx.root, &row));
    let mut start = 0;
    for (level, (&position, alias)) in positions.iter().zip(&levels).enumerate() {
        let step = path.slice(start..position);
        let call = match expansion {
            Expansion::JsonEach => {
                let at = match level {
                    0 => Expr::literal(step.sql_json()),
                    _ => Expr::column(&levels[level - 1], "fullkey").infix("||", Expr::literal(relative(&step))),
                };
                Expr::func("json_each", vec![document.clone(), at])
            }
            Expansion::JsonTable => {
                let source = match level {
                    0 => document.clone(),
                    _ => Expr::column(&levels[level - 1], "node"),
                };
                // the level's own path includes its wildcard
                let level_path = path.slice(start..position + 1);
                let is_innermost = level + 1 == levels.len();
                json_table(dialect, source, &level_path, is_innermost, &trailing, &columns)
            }
        };
        select.joins.push(Join::Lateral(Source::Function { call, alias: alias.clone() }));
        start = position + 1;
    }

    let element = match expansion {
        Expansion::JsonEach => {
            let fullkey = Expr::column(&innermost, "fullkey");
            let at = if trailing.segments.is_empty() { fullkey } else { fullkey.infix("||", Expr::literal(relative(&trailing))) };
            Expr::func("json_group_array", vec![Expr::func("json_extract", vec![document.clone(), at])])
        }
        Expansion::JsonTable if dialect == Dialect::Oracle => {
            Expr::func("JSON_ARRAYAGG", vec![Expr::Seq(vec![Expr::column(&innermost, "value"), Expr::raw(" FORMAT JSON")])])
        }
        Expansion::JsonTable => Expr::func("JSON_ARRAYAGG", vec![Expr::column(&innermost, "value")]),
    };

    select.columns.push(SelectItem::aliased(Expr::column(&row, &primary), "pk"));
    select.columns.push(SelectItem::aliased(element, "value"));
    select.filter = filter;
    select.group_by.push(Expr::column(&row, &primary));

    let source = match expansion {
        Expansion::JsonEach => {
            cx.ctes.push(Cte { name: derived.clone(), select });
            Source::table(&derived)
        }
        Expansion::JsonTable => Source::Derived { select: Box::new(select), alias: derived.clone() },
    };
    let on = Predicate::eq(Expr::column(&cx.root, &primary), Expr::column(&derived, "pk"));
    cx.select.joins.push(Join::Left { source, on });

    let value = Expr::func("COALESCE", vec![Expr::column(&derived, "value"), Expr::literal("[]")]);
    cx.select.columns.push(SelectItem::aliased(value, node.key.clone()));
    cx.corrections.push(Correction::ParseJson { key: node.key.clone(), default_array: true });
    Ok(())
}

/// `JSON_TABLE(source, 'path' COLUMNS (...))` for one level.
fn json_table(dialect: Dialect, source: Expr, path: &JsonPath, innermost: bool, trailing: &JsonPath, filters: &[FilterColumn]) -> Expr {
    let json_type = match dialect {
        Dialect::Oracle => format!("{} FORMAT JSON", dialect.text_type()),
        _ => "JSON".to_string(),
    };

    let mut definitions: Vec<(String, String, String)> = Vec::new();
    if innermost {
        definitions.push(("value".to_string(), json_type, trailing.sql_json()));
        for column in filters {
            let ty = match column.kind {
                ValueKind::Number => dialect.numeric_type(),
                ValueKind::Bool | ValueKind::Text => dialect.text_type(),
            };
            definitions.push((column.name.clone(), ty.to_string(), column.path.clone()));
        }
    } else {
        definitions.push(("node".to_string(), json_type, "$".to_string()));
    }

    let mut parts = vec![Expr::literal(path.sql_json()), Expr::raw(" COLUMNS (")];
    for (i, (name, ty, column_path)) in definitions.into_iter().enumerate() {
        if i > 0 {
            parts.push(Expr::raw(", "));
        }
        parts.push(Expr::raw(format!("{} {} PATH ", dialect.quote_ident(&name), ty)));
        parts.push(Expr::literal(column_path));
    }
    parts.push(Expr::raw(")"));

    Expr::func("JSON_TABLE", vec![source, Expr::Seq(parts)])
}
