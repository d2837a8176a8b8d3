//! Filter scopes and one-to-many filters.
//!
//! Filter paths resolve from a [`Scope`]: the root collection of the query, or the rows on the far
//! side of a one-to-many relation. A filter entry crossing such a relation becomes a correlated
//! `EXISTS` sub-select over the related rows instead of a join, so a parent matching through several
//! children is still returned once and `LIMIT` counts parents. Many-to-one hops in front of the
//! relation are joined in the enclosing scope as usual.
//!
//! `{ "articles": { "_some": {...} } }` and `{ "articles": { "_none": {...} } }` quantify explicitly;
//! a plain `{ "articles": { "views": {...} } }` means `_some`.

use serde_json::{Map, Value};
use skein_ql::ast::{is_false_flag, FilterNode, Logical, Operator, Quantifier};
use tracing::debug;

use crate::alias::first_one_to_many;
use crate::compile::Compilation;
use crate::error::CompileError;
use crate::predicate::{walk_body, walk_level, Emitter, FilterVisitor};
use crate::schema::Relation;
use crate::sql::{Expr, Predicate, Select, SelectItem, Source};

/// The table filter paths start from, and the collection it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub table: String,
    pub collection: String,
}

impl Scope {
    pub fn root(collection: impl Into<String>) -> Self {
        let collection = collection.into();
        Self { table: collection.clone(), collection }
    }

    pub fn aliased(table: impl Into<String>, collection: impl Into<String>) -> Self { Self { table: table.into(), collection: collection.into() } }
}

/// Emits the WHERE conditions of a filter, opening a sub-select per one-to-many entry.
pub(crate) struct FilterScope<'c, 'a> {
    cx: &'c mut Compilation<'a>,
    emitter: Emitter,
}

impl<'c, 'a> FilterScope<'c, 'a> {
    pub fn new(cx: &'c mut Compilation<'a>, emitter: Emitter) -> Self { Self { cx, emitter } }

    /// Run `inner` with paths resolving from the rows `path[at]` relates to. Returns the correlated
    /// sub-select and whatever condition `inner` produced for it.
    fn correlated(
        &mut self,
        path: &[String],
        at: usize,
        relation: &Relation,
        inner: impl FnOnce(&mut Self) -> Result<Option<Predicate>, CompileError>,
    ) -> Result<(Select, Option<Predicate>), CompileError> {
        let mut parent_key = path[..at].to_vec();
        parent_key.push(relation.target_field.clone());
        let parent = self.cx.resolve(&parent_key).expr();

        let child = relation.owning_collection.clone();
        let alias = self.cx.aliases.fresh();
        debug!("filtering {} through {} as {} in a sub-select", path[..=at].join("."), child, alias);

        let mut select = Select::from(Source::aliased(&child, &alias));
        select.columns.push(SelectItem::new(Expr::raw("1")));
        select.and_where(Predicate::eq(Expr::column(&alias, &relation.owning_field), parent));

        let nested = self.cx.aliases.nested();
        let outer_aliases = std::mem::replace(&mut self.cx.aliases, nested);
        let outer_select = std::mem::replace(&mut self.cx.select, select);
        let outer_scope = std::mem::replace(&mut self.cx.scope, Scope::aliased(alias, child));

        let condition = inner(self);

        let select = std::mem::replace(&mut self.cx.select, outer_select);
        let nested = std::mem::replace(&mut self.cx.aliases, outer_aliases);
        self.cx.aliases.resume(&nested);
        self.cx.scope = outer_scope;

        Ok((select, condition?))
    }

    /// A leaf on a path crossing a one-to-many relation. On the relation itself the related keys are
    /// compared, and the null / empty flags ask whether there are related rows at all.
    fn related_leaf(&mut self, path: &[String], at: usize, relation: &Relation, operator: Operator, value: &Value) -> Result<Option<Predicate>, CompileError> {
        let rest = &path[at + 1..];
        if rest.is_empty() && matches!(operator, Operator::Null | Operator::Nnull | Operator::Empty | Operator::Nempty) {
            let none = matches!(operator, Operator::Null | Operator::Empty) != is_false_flag(value);
            let (select, _) = self.correlated(path, at, relation, |_| Ok(None))?;
            return Ok(Some(exists(select, None, none)));
        }

        let key = if rest.is_empty() { vec![self.cx.schema.primary_key(&relation.owning_collection).unwrap_or("id").to_owned()] } else { rest.to_vec() };
        let (select, condition) = self.correlated(path, at, relation, |scope| scope.leaf(&key, operator, value))?;
        Ok(condition.map(|condition| exists(select, Some(condition), false)))
    }
}

impl FilterVisitor for FilterScope<'_, '_> {
    fn leaf(&mut self, path: &[String], operator: Operator, value: &Value) -> Result<Option<Predicate>, CompileError> {
        let schema = self.cx.schema;
        if let Some((at, relation)) = first_one_to_many(schema, &self.cx.scope.collection, path) {
            return self.related_leaf(path, at, relation, operator, value);
        }
        let target = self.cx.filter_target(path, operator, value)?;
        Ok(self.emitter.emit(&target, operator, value))
    }

    fn field(&mut self, path: &[String], body: &Value, max_depth: usize) -> Result<Option<Predicate>, CompileError> {
        let schema = self.cx.schema;
        let quantified = body.as_object().and_then(|entries| entries.iter().find_map(|(key, value)| Quantifier::from_key(key).map(|q| (q, value))));

        let Some((at, relation)) = first_one_to_many(schema, &self.cx.scope.collection, path) else {
            if let Some((quantifier, _)) = quantified {
                return Err(CompileError::InvalidQuery(format!("{} can only follow a one-to-many relation, not {}", quantifier.key(), path.join("."))));
            }
            return walk_body(path, body, max_depth, self);
        };

        let rest = &path[at + 1..];
        match quantified {
            Some((quantifier, filter)) if rest.is_empty() => {
                let filter = FilterNode::from_value(filter).ok_or_else(|| CompileError::InvalidQuery(format!("{} takes a filter object", quantifier.key())))?;
                let (select, condition) = self.correlated(path, at, relation, |scope| walk_level(&filter, &[], max_depth, scope))?;
                Ok(Some(exists(select, condition, quantifier == Quantifier::None)))
            }
            // the relation itself: operators ask about the related keys one at a time, logical lists
            // hold conditions on one related row
            None if rest.is_empty() => {
                let Value::Object(entries) = body else { return walk_body(path, body, max_depth, self) };
                let (logical, operators): (Map<String, Value>, Map<String, Value>) =
                    entries.iter().map(|(key, value)| (key.clone(), value.clone())).partition(|(key, _)| Logical::from_key(key).is_some());

                let mut conditions = Vec::new();
                if !logical.is_empty() {
                    let filter = FilterNode::from(logical);
                    let (select, condition) = self.correlated(path, at, relation, |scope| walk_level(&filter, &[], max_depth, scope))?;
                    conditions.extend(condition.map(|condition| exists(select, Some(condition), false)));
                }
                conditions.extend(walk_body(path, &Value::Object(operators), max_depth, self)?);
                Ok(Predicate::all(conditions))
            }
            _ => {
                let (select, condition) = self.correlated(path, at, relation, |scope| scope.field(rest, body, max_depth))?;
                Ok(condition.map(|condition| exists(select, Some(condition), false)))
            }
        }
    }
}

fn exists(mut select: Select, condition: Option<Predicate>, negated: bool) -> Predicate {
    if let Some(condition) = condition {
        select.and_where(condition);
    }
    Predicate::Exists { select: Box::new(select), negated }
}
