use serde_json::Value;
use skein_ql::ast::{FilterNode, Operator};
use skein_ql::jsonpath::{JsonFunction, JsonPath};
use tracing::debug;

use crate::alias::{first_one_to_many, plan_joins_from, AliasMap, ResolvedPath};
use crate::correction::{apply_all, Correction, Row};
use crate::dialect::Dialect;
use crate::error::CompileError;
use crate::json::{self, JsonFieldNode, ValueKind};
use crate::options::CompilerOptions;
use crate::predicate::{walk_filter, walk_with, Emitter, RangeMode, Target};
use crate::query::{Aggregate, Query};
use crate::schema::{FieldType, Schema};
use crate::scope::{FilterScope, Scope};
use crate::sql::{Cte, Direction, Expr, OrderBy, Predicate, Select, SelectItem, Source, SqlBuilder, SqlOp, Statement};
use crate::value::{cast_numeric, SqlValue};

/// Compiles [`Query`] envelopes against one schema and dialect.
///
/// The compiler holds no mutable state, so one instance may serve any number of concurrent
/// compilations.
#[derive(Debug, Clone)]
pub struct QueryCompiler<'s> {
    schema: &'s Schema,
    dialect: Dialect,
    options: CompilerOptions,
}

impl<'s> QueryCompiler<'s> {
    pub fn new(schema: &'s Schema, dialect: Dialect) -> Self { Self { schema, dialect, options: CompilerOptions::default() } }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dialect(&self) -> Dialect { self.dialect }

    pub fn compile(&self, collection: &str, query: &Query) -> Result<CompiledQuery, CompileError> {
        let root = self.schema.get(collection).ok_or_else(|| CompileError::UnknownCollection(collection.to_owned()))?;
        validate(query)?;

        let mut cx = Compilation {
            schema: self.schema,
            dialect: self.dialect,
            options: &self.options,
            root: collection.to_owned(),
            scope: Scope::root(collection),
            primary: Some(root.primary.clone()).filter(|p| !p.is_empty()),
            aliases: AliasMap::new(&self.options.alias_prefix),
            select: Select::from(Source::table(collection)),
            ctes: Vec::new(),
            corrections: Vec::new(),
        };

        if let Some(filter) = &query.filter {
            cx.apply_filter(filter)?;
        }
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            cx.apply_search(search);
        }
        cx.apply_sort(&query.sort);
        cx.apply_group(&query.group)?;
        match &query.aggregate {
            Some(aggregate) if !aggregate.is_empty() => cx.apply_aggregate(aggregate, &query.group),
            _ => cx.apply_fields(query)?,
        }

        let (limit, offset) = query.window();
        cx.select.limit = limit;
        cx.select.offset = offset;

        debug!("compiled {} for {} with {} joins and {} corrections", collection, self.dialect, cx.select.joins.len(), cx.corrections.len());
        Ok(CompiledQuery { dialect: self.dialect, statement: Statement { ctes: cx.ctes, select: cx.select }, corrections: cx.corrections })
    }
}

fn validate(query: &Query) -> Result<(), CompileError> {
    if query.limit.is_some_and(|l| l < -1) {
        return Err(CompileError::InvalidQuery("limit must be -1 or greater".into()));
    }
    if query.offset.is_some_and(|o| o < 0) {
        return Err(CompileError::InvalidQuery("offset must not be negative".into()));
    }
    if query.page.is_some_and(|p| p < 1) {
        return Err(CompileError::InvalidQuery("page numbers start at 1".into()));
    }
    if query.page_offset().is_none() {
        return Err(CompileError::InvalidQuery("page is out of range for the limit".into()));
    }
    Ok(())
}

/// The state of one compilation pass.
pub(crate) struct Compilation<'a> {
    pub schema: &'a Schema,
    pub dialect: Dialect,
    pub options: &'a CompilerOptions,
    pub root: String,
    /// Where paths resolve from; the root except inside a one-to-many sub-select.
    pub scope: Scope,
    pub primary: Option<String>,
    pub aliases: AliasMap,
    pub select: Select,
    pub ctes: Vec<Cte>,
    pub corrections: Vec<Correction>,
}

fn split_path(field: &str) -> Vec<String> { field.split('.').map(String::from).collect() }

impl Compilation<'_> {
    /// Resolve a field path from the current scope, joining whatever it crosses.
    pub fn resolve(&mut self, path: &[String]) -> ResolvedPath {
        plan_joins_from(self.schema, &self.scope.table, &self.scope.collection, path, &mut self.aliases, &mut self.select.joins)
    }

    /// Plan the joins the filter needs, then emit its conditions onto the WHERE tree. Paths crossing
    /// a one-to-many relation are left to their sub-select.
    fn apply_filter(&mut self, filter: &FilterNode) -> Result<(), CompileError> {
        let depth = self.options.max_filter_depth;
        let schema = self.schema;

        walk_filter(filter, depth, &mut |path: &[String], _: Operator, _: &Value| -> Result<Option<Predicate>, CompileError> {
            let field = match path.split_last() {
                Some((last, prefix)) if JsonFunction::is_json_function(last) => {
                    let mut field = prefix.to_vec();
                    field.extend(split_path(&JsonFunction::parse(last)?.field));
                    field
                }
                _ => path.to_vec(),
            };
            if first_one_to_many(schema, &self.root, &field).is_none() {
                self.resolve(&field);
            }
            Ok(None)
        })?;

        let condition = walk_with(filter, depth, &mut FilterScope::new(self, Emitter::new(RangeMode::Inclusive)))?;
        if let Some(condition) = condition {
            self.select.and_where(condition);
        }
        Ok(())
    }

    pub(crate) fn filter_target(&mut self, path: &[String], operator: Operator, value: &Value) -> Result<Target, CompileError> {
        if let Some((last, prefix)) = path.split_last() {
            if JsonFunction::is_json_function(last) {
                let function = JsonFunction::parse(last)?;
                return json::filter_query(self, prefix, &function, ValueKind::of(operator, value));
            }
        }
        let resolved = self.resolve(path);
        Ok(Target::typed(resolved.expr(), resolved.field_type(self.schema)))
    }

    /// Free-text search across the root collection's own fields.
    fn apply_search(&mut self, search: &str) {
        let schema = self.schema;
        let Some(collection) = schema.get(&self.root) else { return };
        let number = search.parse::<f64>().ok().filter(|n| n.is_finite() && n.to_string() == search);
        let is_uuid = uuid::Uuid::parse_str(search).is_ok();

        let mut conditions = Vec::new();
        for (name, field) in &collection.fields {
            let column = Expr::column(&self.root, name);
            if field.field_type.is_textual() {
                let pattern = SqlValue::Text(format!("%{}%", search.to_lowercase()));
                conditions.push(Predicate::compare(column.lower(), SqlOp::Like, Expr::Bind(pattern)));
            } else if field.field_type.is_numeric() && number.is_some() {
                let value = cast_numeric(&Value::String(search.to_owned()));
                conditions.push(Predicate::eq(column, Expr::Bind(SqlValue::from(&value))));
            } else if field.field_type == FieldType::Uuid && is_uuid {
                conditions.push(Predicate::eq(column, Expr::Bind(SqlValue::from(search))));
            }
        }

        // a search no field can match finds nothing
        self.select.and_where(Predicate::any(conditions).unwrap_or(Predicate::Constant(false)));
    }

    fn apply_sort(&mut self, sort: &[String]) {
        for entry in sort {
            let (field, direction) = match entry.strip_prefix('-') {
                Some(field) => (field, Direction::Desc),
                None => (entry.as_str(), Direction::Asc),
            };
            if field.is_empty() {
                continue;
            }
            let resolved = self.resolve(&split_path(field));
            self.select.order_by.push(OrderBy { expr: resolved.expr(), direction });
        }
    }

    fn apply_group(&mut self, group: &[String]) -> Result<(), CompileError> {
        for field in group {
            let resolved = self.resolve(&split_path(field));
            if resolved.crosses_one_to_many() {
                return Err(CompileError::InvalidQuery(format!("cannot group by {} through a one-to-many relation", field)));
            }
            self.select.group_by.push(resolved.expr());
        }
        Ok(())
    }

    /// Select the group columns and one aggregate per `(operation, field)`, named `operation->field`.
    fn apply_aggregate(&mut self, aggregate: &Aggregate, group: &[String]) {
        for field in group {
            let resolved = self.resolve(&split_path(field));
            self.select.columns.push(SelectItem::aliased(resolved.expr(), field.clone()));
        }

        let joined = !self.select.joins.is_empty();
        for (operation, fields) in aggregate.operations() {
            if operation == "countAll" {
                if !fields.is_empty() {
                    self.select.columns.push(SelectItem::aliased(Expr::func("COUNT", vec![Expr::raw("*")]), "countAll"));
                }
                continue;
            }

            for field in fields {
                if field == "*" {
                    if operation == "count" {
                        self.select.columns.push(SelectItem::aliased(Expr::func("COUNT", vec![Expr::raw("*")]), "count"));
                    }
                    continue;
                }

                let column = Expr::column(&self.root, field);
                let distinct = |column: Expr| Expr::Seq(vec![Expr::raw("DISTINCT "), column]);
                let expr = match operation {
                    // every key is distinct already unless a join multiplied the rows
                    "countDistinct" if !joined && self.primary.as_deref() == Some(field.as_str()) => Expr::func("COUNT", vec![column]),
                    "countDistinct" => Expr::func("COUNT", vec![distinct(column)]),
                    "sumDistinct" => Expr::func("SUM", vec![distinct(column)]),
                    "avgDistinct" => Expr::func("AVG", vec![distinct(column)]),
                    other => Expr::func(other.to_ascii_uppercase(), vec![column]),
                };
                self.select.columns.push(SelectItem::aliased(expr, format!("{}->{}", operation, field)));
            }
        }
    }

    fn apply_fields(&mut self, query: &Query) -> Result<(), CompileError> {
        if query.fields.is_empty() && query.json_fields.is_empty() {
            self.select.columns.push(SelectItem::new(Expr::Star(self.root.clone())));
            return Ok(());
        }

        for entry in &query.fields {
            let (field, key) = match query.alias.get(entry) {
                Some(target) => (target.as_str(), entry.as_str()),
                None => (entry.as_str(), entry.as_str()),
            };

            if field == "*" {
                self.select.columns.push(SelectItem::new(Expr::Star(self.root.clone())));
            } else if JsonFunction::is_json_function(field) {
                let node = JsonFieldNode::from_function(JsonFunction::parse(field)?, key);
                json::extract(self, &node)?;
            } else if field.contains('.') {
                let resolved = self.resolve(&split_path(field));
                if resolved.crosses_one_to_many() {
                    return Err(CompileError::InvalidQuery(format!("cannot select {} through a one-to-many relation", field)));
                }
                self.select.columns.push(SelectItem::aliased(resolved.expr(), key));
            } else if field == key {
                self.select.columns.push(SelectItem::new(Expr::column(&self.root, field)));
            } else {
                self.select.columns.push(SelectItem::aliased(Expr::column(&self.root, field), key));
            }
        }

        for request in &query.json_fields {
            let mut node = JsonFieldNode::new(&request.field, JsonPath::parse(&request.path)?, request.output_key());
            if let Some(filter) = &request.filter {
                node = node.with_filter(filter.clone());
            }
            json::extract(self, &node)?;
        }
        Ok(())
    }
}

/// A compiled statement, ready to render for its dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub dialect: Dialect,
    pub statement: Statement,
    /// Post-fetch corrections, in registration order.
    pub corrections: Vec<Correction>,
}

impl CompiledQuery {
    /// SQL text and the values to bind, in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut builder = SqlBuilder::new(self.dialect);
        builder.statement(&self.statement);
        builder.build()
    }

    /// Whether rows must go through [`CompiledQuery::correct`] before use.
    pub fn needs_correction(&self) -> bool { !self.corrections.is_empty() }

    /// Finish the fetched rows: parse JSON text and evaluate in-memory paths.
    pub fn correct(&self, rows: Vec<Row>) -> Vec<Row> { apply_all(&self.corrections, rows) }
}
