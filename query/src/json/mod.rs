//! JSON sub-field extraction and filtering, per dialect.
//!
//! Every [`JsonFieldNode`] is classified on its own into one [`ExtractionMode`]:
//!
//! * `Direct`: a definite path, read with the dialect's single-value extraction function.
//! * `Native`: a wildcard or filtered path the database can evaluate itself (SQL/JSON path
//!   queries on PostgreSQL 14, wildcard `JSON_EXTRACT` on MySQL, `JSON_QUERY ... WITH WRAPPER`
//!   on Oracle).
//! * `Derived`: the array is expanded into rows at every wildcard level (`json_each`,
//!   `JSON_TABLE`), filtered, re-aggregated per primary key and joined back, see [`derived`].
//! * `Fallback`: the raw document is selected and the path evaluated in memory after the fetch.
//!
//! Extraction may register a [`Correction`] to finish the job on the fetched rows. The same
//! per-dialect knowledge backs [`filter_query`], used for `json(field, path)` keys in filters.

mod derived;

use serde_json::Value;
use skein_ql::ast::{value_list, FilterNode, Operator};
use skein_ql::jsonpath::{JsonFunction, JsonPath, Segment};
use skein_ql::{embed_filter, PathLanguage};
use tracing::debug;

use crate::alias::ResolvedPath;
use crate::compile::Compilation;
use crate::correction::Correction;
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::predicate::Target;
use crate::schema::Field;
use crate::sql::{Expr, SelectItem};

/// One requested JSON sub-extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonFieldNode {
    /// Path to the column holding the document; more than one segment goes through relations.
    pub field: Vec<String>,
    pub path: JsonPath,
    /// Restricts the elements of the addressed array.
    pub filter: Option<FilterNode>,
    /// Output key of the extracted value.
    pub key: String,
}

impl JsonFieldNode {
    pub fn new(field: &str, path: JsonPath, key: impl Into<String>) -> Self {
        Self { field: field.split('.').map(String::from).collect(), path, filter: None, key: key.into() }
    }

    pub fn from_function(function: JsonFunction, key: impl Into<String>) -> Self { Self::new(&function.field, function.path, key) }

    pub fn with_filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter).filter(|f| !f.is_empty());
        self
    }

    pub fn is_relational(&self) -> bool { self.field.len() > 1 }

    /// The caller wrote a `[?( ... )]` selector into the path itself.
    pub fn has_path_filter(&self) -> bool { self.path.segments.iter().any(|s| matches!(s, Segment::Filter(_))) }

    pub fn is_filtered(&self) -> bool { self.filter.is_some() || self.has_path_filter() }

    /// The path the node actually addresses: a filter on a path without a wildcard applies to the
    /// elements of the addressed array.
    pub fn effective_path(&self) -> JsonPath {
        let mut path = self.path.clone();
        if self.filter.is_some() && path.is_definite() {
            path.segments.push(Segment::AnyIndex);
        }
        path
    }

    /// The effective path with the node's filter merged in, rendered for `language`.
    pub fn embedded_path(&self, language: PathLanguage) -> Result<JsonPath, CompileError> {
        let path = self.effective_path();
        Ok(match &self.filter {
            Some(filter) => embed_filter(&path, filter, language)?,
            None => path,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    Direct,
    Native,
    Derived,
    Fallback,
}

/// Static type a JSON scalar is compared as, derived from the caller's compare value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Bool,
    Text,
}

impl ValueKind {
    pub fn of(operator: Operator, value: &Value) -> Self {
        if operator.is_valueless() {
            return ValueKind::Text;
        }
        match value_list(value).first() {
            Some(Value::Number(_)) => ValueKind::Number,
            Some(Value::Bool(_)) => ValueKind::Bool,
            _ => ValueKind::Text,
        }
    }
}

fn has_negative_index(path: &JsonPath) -> bool { path.segments.iter().any(|s| matches!(s, Segment::Index(i) if *i < 0)) }

impl Dialect {
    /// Pick the extraction mode for a node. `derivable` tells whether a derived table can be built
    /// at all: the document lives on the root collection, which has a primary key, and the path
    /// carries no hand-written filter selector.
    pub fn extraction_mode(&self, node: &JsonFieldNode, derivable: bool) -> ExtractionMode {
        let path = node.effective_path();
        let wildcard = path.has_wildcard();
        let filtered = node.is_filtered();
        let derived = if derivable && !node.has_path_filter() { ExtractionMode::Derived } else { ExtractionMode::Fallback };

        match self {
            Dialect::Postgres14 if wildcard => ExtractionMode::Native,
            Dialect::Postgres14 => ExtractionMode::Direct,
            Dialect::Postgres10 | Dialect::CockroachDb | Dialect::MsSql if wildcard => ExtractionMode::Fallback,
            Dialect::Postgres10 | Dialect::CockroachDb => ExtractionMode::Direct,
            Dialect::Redshift if !wildcard && path.is_members_only() => ExtractionMode::Direct,
            Dialect::Redshift => ExtractionMode::Fallback,
            Dialect::MySql5 | Dialect::MariaDb | Dialect::Sqlite | Dialect::MsSql | Dialect::Oracle if has_negative_index(&path) => ExtractionMode::Fallback,
            Dialect::MsSql => ExtractionMode::Direct,
            _ if !wildcard && *self != Dialect::Fallback => ExtractionMode::Direct,
            Dialect::MySql5 if filtered => ExtractionMode::Fallback,
            Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb | Dialect::Oracle if !filtered => ExtractionMode::Native,
            Dialect::MySql8 | Dialect::MariaDb | Dialect::Oracle | Dialect::Sqlite => derived,
            _ => ExtractionMode::Fallback,
        }
    }

    /// The column as a document the dialect's JSON functions accept.
    fn document(&self, column: Expr, field: Option<&Field>) -> Expr {
        let data_type = field.and_then(|f| f.data_type.as_deref()).map(str::to_ascii_lowercase);
        match self {
            Dialect::Postgres14 if data_type.as_deref() != Some("jsonb") => column.cast("jsonb"),
            Dialect::Postgres10 | Dialect::CockroachDb if !matches!(data_type.as_deref(), Some("json" | "jsonb")) => column.cast("jsonb"),
            _ => column,
        }
    }
}

/// `{"a","0","b"}`: a PostgreSQL text array of path keys.
fn key_array(keys: &[String]) -> String {
    let quoted: Vec<String> = keys.iter().map(|k| format!("\"{}\"", k.replace('\\', "\\\\").replace('"', "\\\""))).collect();
    format!("{{{}}}", quoted.join(","))
}

/// Add the select-time extraction for `node` to the compilation.
pub(crate) fn extract(cx: &mut Compilation<'_>, node: &JsonFieldNode) -> Result<(), CompileError> {
    let resolved = cx.resolve(&node.field);
    if resolved.crosses_one_to_many() {
        return Err(CompileError::InvalidQuery(format!("json field {} cannot be read through a one-to-many relation", node.key)));
    }

    let derivable = !node.is_relational() && cx.primary.is_some();
    let mode = cx.dialect.extraction_mode(node, derivable);
    debug!("extracting {} from {}.{} as {:?}", node.key, resolved.table, resolved.column, mode);

    match mode {
        ExtractionMode::Direct => direct(cx, node, &resolved),
        ExtractionMode::Native => native(cx, node, &resolved),
        ExtractionMode::Derived => derived::extract(cx, node, &resolved),
        ExtractionMode::Fallback => fallback(cx, node, &resolved),
    }
}

fn direct(cx: &mut Compilation<'_>, node: &JsonFieldNode, resolved: &ResolvedPath) -> Result<(), CompileError> {
    let field = cx.schema.field(&resolved.collection, &resolved.column).cloned();
    let dialect = cx.dialect;
    let document = dialect.document(resolved.expr(), field.as_ref());
    let path = &node.path;
    let sql_path = || Expr::literal(path.sql_json());
    let key = node.key.clone();

    let (expr, correction) = match dialect {
        Dialect::Postgres14 => (Expr::func("jsonb_path_query_first", vec![document, sql_path()]), None),
        Dialect::Postgres10 | Dialect::CockroachDb => {
            let keys = path.keys().unwrap_or_default();
            (document.infix("#>", Expr::literal(key_array(&keys))), None)
        }
        Dialect::Redshift => {
            let mut args = vec![document];
            args.extend(path.keys().unwrap_or_default().into_iter().map(Expr::literal));
            (Expr::func("json_extract_path_text", args), Some(Correction::ParseJsonLenient { key: key.clone() }))
        }
        Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => {
            (Expr::func("JSON_EXTRACT", vec![document, sql_path()]), Some(Correction::ParseJson { key: key.clone(), default_array: false }))
        }
        Dialect::Sqlite => (document.infix("->", sql_path()), Some(Correction::ParseJson { key: key.clone(), default_array: false })),
        Dialect::MsSql | Dialect::Oracle => {
            let query = Expr::func("JSON_QUERY", vec![document.clone(), sql_path()]);
            let value = Expr::func("JSON_VALUE", vec![document, sql_path()]);
            (Expr::func("COALESCE", vec![query, value]), Some(Correction::ParseJsonLenient { key: key.clone() }))
        }
        Dialect::Fallback => return fallback(cx, node, resolved),
    };

    cx.select.columns.push(SelectItem::aliased(expr, key));
    cx.corrections.extend(correction);
    Ok(())
}

fn native(cx: &mut Compilation<'_>, node: &JsonFieldNode, resolved: &ResolvedPath) -> Result<(), CompileError> {
    let field = cx.schema.field(&resolved.collection, &resolved.column).cloned();
    let dialect = cx.dialect;
    let document = dialect.document(resolved.expr(), field.as_ref());
    let path = node.embedded_path(PathLanguage::SqlJson)?;
    let key = node.key.clone();

    let expr = match dialect {
        Dialect::Postgres14 => Expr::func("jsonb_path_query_array", vec![document, Expr::literal(path.sql_json())]),
        Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => Expr::func("JSON_EXTRACT", vec![document, Expr::literal(path.sql_json())]),
        Dialect::Oracle => Expr::func("JSON_QUERY", vec![document, Expr::Seq(vec![Expr::literal(path.sql_json()), Expr::raw(" WITH WRAPPER")])]),
        _ => return fallback(cx, node, resolved),
    };

    cx.select.columns.push(SelectItem::aliased(expr, key.clone()));
    if dialect != Dialect::Postgres14 {
        cx.corrections.push(Correction::ParseJson { key, default_array: true });
    }
    Ok(())
}

fn fallback(cx: &mut Compilation<'_>, node: &JsonFieldNode, resolved: &ResolvedPath) -> Result<(), CompileError> {
    let path = node.embedded_path(PathLanguage::InMemory)?;
    cx.select.columns.push(SelectItem::aliased(resolved.expr(), node.key.clone()));
    cx.corrections.push(Correction::Evaluate { key: node.key.clone(), path });
    Ok(())
}

/// Typed expression for a `json(field, path)` filter key below the relational `prefix`.
pub(crate) fn filter_query(cx: &mut Compilation<'_>, prefix: &[String], function: &JsonFunction, kind: ValueKind) -> Result<Target, CompileError> {
    let dialect = cx.dialect;
    let path = &function.path;
    if dialect == Dialect::Fallback {
        return Err(CompileError::unsupported(dialect, "filtering on JSON sub-fields"));
    }
    if path.has_wildcard() {
        return Err(CompileError::unsupported(dialect, format!("filtering on the JSON path {} with wildcards", path)));
    }
    if has_negative_index(path) && !(dialect.is_postgres_family() || dialect == Dialect::MySql8) {
        return Err(CompileError::unsupported(dialect, "negative array indexes in JSON filters"));
    }

    let mut field_path = prefix.to_vec();
    field_path.extend(function.field.split('.').map(String::from));
    let resolved = cx.resolve(&field_path);
    let field = cx.schema.field(&resolved.collection, &resolved.column).cloned();
    let document = dialect.document(resolved.expr(), field.as_ref());
    let sql_path = || Expr::literal(path.sql_json());

    let typed = |expr: Expr, number: &str, boolean: Option<&str>| match kind {
        ValueKind::Number => expr.cast(number),
        ValueKind::Bool => match boolean {
            Some(ty) => expr.cast(ty),
            None => expr,
        },
        ValueKind::Text => expr,
    };

    let mut bool_as_text = false;
    let expr = match dialect {
        Dialect::Postgres14 | Dialect::Postgres10 | Dialect::CockroachDb => {
            let keys = path.keys().unwrap_or_default();
            typed(document.infix("#>>", Expr::literal(key_array(&keys))), "numeric", Some("boolean"))
        }
        Dialect::Redshift => {
            if !path.is_members_only() {
                return Err(CompileError::unsupported(dialect, format!("filtering on the JSON path {} with array indexes", path)));
            }
            let mut args = vec![document];
            args.extend(path.keys().unwrap_or_default().into_iter().map(Expr::literal));
            typed(Expr::func("json_extract_path_text", args), "float8", Some("boolean"))
        }
        Dialect::MySql5 | Dialect::MySql8 | Dialect::MariaDb => {
            let extracted = Expr::func("JSON_EXTRACT", vec![document, sql_path()]);
            match kind {
                ValueKind::Number => extracted,
                _ => {
                    bool_as_text = true;
                    Expr::func("JSON_UNQUOTE", vec![extracted])
                }
            }
        }
        Dialect::Sqlite => document.infix("->>", sql_path()),
        Dialect::MsSql => {
            bool_as_text = true;
            typed(Expr::func("JSON_VALUE", vec![document, sql_path()]), "float", None)
        }
        Dialect::Oracle => {
            bool_as_text = true;
            match kind {
                ValueKind::Number => Expr::func("JSON_VALUE", vec![document, Expr::Seq(vec![sql_path(), Expr::raw(" RETURNING NUMBER")])]),
                _ => Expr::func("JSON_VALUE", vec![document, sql_path()]),
            }
        }
        Dialect::Fallback => return Err(CompileError::unsupported(dialect, "filtering on JSON sub-fields")),
    };

    debug!("filtering on {} of {}.{} as {:?}", path, resolved.table, resolved.column, kind);
    Ok(Target { expr, field_type: None, bool_as_text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(path: &str) -> JsonFieldNode { JsonFieldNode::new("metadata", JsonPath::parse(path).unwrap(), path) }

    fn filtered(path: &str) -> JsonFieldNode { node(path).with_filter(FilterNode::try_from(json!({ "name": { "_eq": "a" } })).unwrap()) }

    #[test]
    fn test_modes() {
        let plain = node("$.a.b");
        let wildcard = node("$.tags[*].name");
        let with_filter = filtered("$.tags");
        let negative = node("$.tags[-1]");

        assert_eq!(Dialect::Postgres14.extraction_mode(&plain, true), ExtractionMode::Direct);
        assert_eq!(Dialect::Postgres14.extraction_mode(&with_filter, true), ExtractionMode::Native);
        assert_eq!(Dialect::Postgres10.extraction_mode(&wildcard, true), ExtractionMode::Fallback);
        assert_eq!(Dialect::Postgres10.extraction_mode(&negative, true), ExtractionMode::Direct);
        assert_eq!(Dialect::Redshift.extraction_mode(&node("$.a[0]"), true), ExtractionMode::Fallback);
        assert_eq!(Dialect::MySql5.extraction_mode(&wildcard, true), ExtractionMode::Native);
        assert_eq!(Dialect::MySql5.extraction_mode(&with_filter, true), ExtractionMode::Fallback);
        assert_eq!(Dialect::MySql5.extraction_mode(&negative, true), ExtractionMode::Fallback);
        assert_eq!(Dialect::MySql8.extraction_mode(&negative, true), ExtractionMode::Direct);
        assert_eq!(Dialect::MySql8.extraction_mode(&with_filter, true), ExtractionMode::Derived);
        assert_eq!(Dialect::MySql8.extraction_mode(&with_filter, false), ExtractionMode::Fallback);
        assert_eq!(Dialect::Sqlite.extraction_mode(&wildcard, true), ExtractionMode::Derived);
        assert_eq!(Dialect::Sqlite.extraction_mode(&node("$.tags[?(@.a == 1)]"), true), ExtractionMode::Fallback);
        assert_eq!(Dialect::MsSql.extraction_mode(&plain, true), ExtractionMode::Direct);
        assert_eq!(Dialect::MsSql.extraction_mode(&wildcard, true), ExtractionMode::Fallback);
        assert_eq!(Dialect::Oracle.extraction_mode(&wildcard, true), ExtractionMode::Native);
        assert_eq!(Dialect::Oracle.extraction_mode(&with_filter, true), ExtractionMode::Derived);
        assert_eq!(Dialect::Fallback.extraction_mode(&plain, true), ExtractionMode::Fallback);
    }

    #[test]
    fn test_filter_implies_element_wildcard() {
        assert_eq!(filtered("$.tags").effective_path(), JsonPath::parse("$.tags[*]").unwrap());
        assert_eq!(filtered("$.tags[*].x").effective_path(), JsonPath::parse("$.tags[*].x").unwrap());
    }

    #[test]
    fn test_embedded_path() -> anyhow::Result<()> {
        let node = node("$.tags").with_filter(FilterNode::try_from(json!({ "name": { "_icontains": "RED" } }))?);
        assert_eq!(node.embedded_path(PathLanguage::SqlJson)?.sql_json(), r#"$.tags[*] ? (@.name like_regex "RED" flag "i")"#);
        Ok(())
    }

    #[test]
    fn test_value_kind() {
        assert_eq!(ValueKind::of(Operator::Eq, &json!(3)), ValueKind::Number);
        assert_eq!(ValueKind::of(Operator::In, &json!([true])), ValueKind::Bool);
        assert_eq!(ValueKind::of(Operator::In, &json!("1,2")), ValueKind::Text);
        assert_eq!(ValueKind::of(Operator::Null, &json!(true)), ValueKind::Text);
    }

    #[test]
    fn test_key_array() {
        assert_eq!(key_array(&["a".into(), "0".into(), r#"we"ird"#.into()]), r#"{"a","0","we\"ird"}"#);
    }
}
