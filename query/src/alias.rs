//! Relation graph walking and join aliasing.
//!
//! A dotted field path such as `author.country` is followed through the relation metadata, one
//! LEFT JOIN per relation boundary. Every join gets an alias from the compilation's [`AliasMap`],
//! keyed by the path walked so far, so that the same chain referenced twice (from two `_or`
//! branches, a filter and a sort, ...) resolves to the same join.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::schema::{FieldType, Relation, RelationKind, Schema};
use crate::sql::{Expr, Join, Predicate, Source};

/// Separator of path signatures; cannot occur in a field name.
const SIGNATURE_SEPARATOR: char = '\u{1f}';

pub fn signature(segments: &[String]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(SIGNATURE_SEPARATOR);
        }
        out.push_str(segment);
    }
    out
}

/// Deterministic alias allocation for one compilation: `j1`, `j2`, ... in order of first use.
#[derive(Debug, Clone)]
pub struct AliasMap {
    prefix: String,
    counter: usize,
    joins: HashMap<String, String>,
}

impl AliasMap {
    pub fn new(prefix: impl Into<String>) -> Self { Self { prefix: prefix.into(), counter: 0, joins: HashMap::new() } }

    /// A fresh alias not tied to any path (CTEs, derived tables).
    pub fn fresh(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, self.counter)
    }

    /// An empty map for a sub-select, continuing this map's numbering.
    pub fn nested(&self) -> Self { Self { prefix: self.prefix.clone(), counter: self.counter, joins: HashMap::new() } }

    /// Take back the numbering used up by a [`nested`](Self::nested) map.
    pub fn resume(&mut self, nested: &AliasMap) { self.counter = self.counter.max(nested.counter); }

    pub fn get(&self, segments: &[String]) -> Option<&str> { self.joins.get(&signature(segments)).map(String::as_str) }

    /// Alias for the join reached through `segments`, and whether it was just created.
    pub fn get_or_insert(&mut self, segments: &[String]) -> (String, bool) {
        let key = signature(segments);
        if let Some(alias) = self.joins.get(&key) {
            return (alias.clone(), false);
        }
        let alias = self.fresh();
        self.joins.insert(key, alias.clone());
        (alias, true)
    }

    pub fn len(&self) -> usize { self.joins.len() }

    pub fn is_empty(&self) -> bool { self.joins.is_empty() }
}

/// One relation boundary crossed by a [`ResolvedPath`].
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub field: String,
    pub alias: String,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// The segments that were actually resolved; shorter than the input when a relation was missing.
    pub segments: Vec<String>,
    pub hops: Vec<Hop>,
    /// Alias (or root table name) owning the terminal column.
    pub table: String,
    pub collection: String,
    pub column: String,
}

impl ResolvedPath {
    pub fn expr(&self) -> Expr { Expr::column(&self.table, &self.column) }

    pub fn crosses_one_to_many(&self) -> bool { self.hops.iter().any(|hop| hop.kind == RelationKind::OneToMany) }

    /// Catalog type of the terminal column, when known.
    pub fn field_type(&self, schema: &Schema) -> Option<FieldType> { schema.field(&self.collection, &self.column).map(|f| f.field_type) }
}

/// Walk `path` from `root`, adding a LEFT JOIN to `joins` for every relation boundary not already
/// joined. A terminal segment naming a one-to-many alias field is joined too, and resolves to the
/// related collection's key column.
///
/// A segment with no matching relation ends the walk: the path resolves to that segment on the
/// collection reached so far and the rest is dropped.
pub fn plan_joins(schema: &Schema, root: &str, path: &[String], aliases: &mut AliasMap, joins: &mut Vec<Join>) -> ResolvedPath {
    plan_joins_from(schema, root, root, path, aliases, joins)
}

/// [`plan_joins`] starting from `table`, an alias of `collection`.
pub fn plan_joins_from(schema: &Schema, table: &str, collection: &str, path: &[String], aliases: &mut AliasMap, joins: &mut Vec<Join>) -> ResolvedPath {
    let mut table = table.to_owned();
    let mut collection = collection.to_owned();
    let mut hops = Vec::new();

    for (i, segment) in path.iter().enumerate() {
        let is_last = i + 1 == path.len();
        let relation = schema.relation_for(&collection, segment);

        let (relation, kind) = match relation {
            Some((relation, RelationKind::OneToMany)) if is_last => (relation, RelationKind::OneToMany),
            Some(found) if !is_last => found,
            None if !is_last => {
                warn!("no relation for {}.{}, ignoring the rest of {:?}", collection, segment, path);
                return ResolvedPath { segments: path[..=i].to_vec(), hops, table, collection, column: segment.clone() };
            }
            _ => return ResolvedPath { segments: path.to_vec(), hops, table, collection, column: segment.clone() },
        };

        let (alias, created) = aliases.get_or_insert(&path[..=i]);
        let far_side = relation.far_side(kind).to_owned();
        if created {
            let on = match kind {
                RelationKind::ManyToOne => Predicate::eq(Expr::column(&table, &relation.owning_field), Expr::column(&alias, &relation.target_field)),
                RelationKind::OneToMany => Predicate::eq(Expr::column(&table, &relation.target_field), Expr::column(&alias, &relation.owning_field)),
            };
            debug!("joining {} as {} through {}.{} ({:?})", far_side, alias, collection, segment, kind);
            joins.push(Join::Left { source: Source::aliased(&far_side, &alias), on });
        }
        hops.push(Hop { field: segment.clone(), alias: alias.clone(), kind });

        if is_last {
            let column = schema.primary_key(&far_side).unwrap_or("id").to_owned();
            return ResolvedPath { segments: path.to_vec(), hops, table: alias, collection: far_side, column };
        }

        table = alias;
        collection = far_side;
    }

    // empty path
    ResolvedPath { segments: Vec::new(), hops, table, collection, column: String::new() }
}

/// The first segment of `path` that crosses a one-to-many relation, walking from `collection`
/// through many-to-one relations only, with that relation.
pub fn first_one_to_many<'s>(schema: &'s Schema, collection: &str, path: &[String]) -> Option<(usize, &'s Relation)> {
    let mut collection = collection;
    for (i, segment) in path.iter().enumerate() {
        match schema.relation_for(collection, segment)? {
            (relation, RelationKind::OneToMany) => return Some((i, relation)),
            (relation, RelationKind::ManyToOne) => collection = relation.far_side(RelationKind::ManyToOne),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Collection, Field, Relation};

    fn schema() -> Schema {
        Schema::new()
            .collection("articles", Collection::new("id").field("id", Field::new(FieldType::Integer)).field("author", Field::new(FieldType::Integer)))
            .collection("users", Collection::new("id").field("country", Field::new(FieldType::String)).field("articles", Field::new(FieldType::Alias)))
            .collection("countries", Collection::new("code").field("name", Field::new(FieldType::String)))
            .relation(Relation::many_to_one("articles", "author", "users", "id").with_reverse("articles"))
            .relation(Relation::many_to_one("users", "country", "countries", "code"))
    }

    fn path(s: &str) -> Vec<String> { s.split('.').map(String::from).collect() }

    #[test]
    fn test_single_join() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();

        let resolved = plan_joins(&schema, "articles", &path("author.country"), &mut aliases, &mut joins);
        assert_eq!(resolved.table, "j1");
        assert_eq!(resolved.column, "country");
        assert_eq!(resolved.collection, "users");
        assert_eq!(
            joins,
            vec![Join::Left {
                source: Source::aliased("users", "j1"),
                on: Predicate::eq(Expr::column("articles", "author"), Expr::column("j1", "id")),
            }]
        );
    }

    #[test]
    fn test_alias_reuse() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();

        let first = plan_joins(&schema, "articles", &path("author.country.name"), &mut aliases, &mut joins);
        let second = plan_joins(&schema, "articles", &path("author.country"), &mut aliases, &mut joins);
        assert_eq!(joins.len(), 2);
        assert_eq!(first.hops[0].alias, second.table);
        assert_eq!(first.table, "j2");
        assert_eq!(aliases.get(&path("author.country")), Some("j2"));
    }

    #[test]
    fn test_terminal_one_to_many_compares_key() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();

        let resolved = plan_joins(&schema, "users", &path("articles"), &mut aliases, &mut joins);
        assert_eq!(resolved.column, "id");
        assert_eq!(resolved.table, "j1");
        assert!(resolved.crosses_one_to_many());
        assert_eq!(
            joins[0],
            Join::Left { source: Source::aliased("articles", "j1"), on: Predicate::eq(Expr::column("users", "id"), Expr::column("j1", "author")) }
        );
    }

    #[test]
    fn test_first_one_to_many() {
        let schema = schema();
        assert_eq!(first_one_to_many(&schema, "users", &path("articles.id")).map(|(i, r)| (i, r.owning_field.as_str())), Some((0, "author")));
        assert_eq!(first_one_to_many(&schema, "articles", &path("author.articles")).map(|(i, _)| i), Some(1));
        assert!(first_one_to_many(&schema, "articles", &path("author.country.name")).is_none());
        assert!(first_one_to_many(&schema, "users", &path("name.articles")).is_none());
    }

    #[test]
    fn test_nested_scope_continues_numbering() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();
        plan_joins(&schema, "articles", &path("author.country"), &mut aliases, &mut joins);

        let mut nested = aliases.nested();
        let child = nested.fresh();
        let mut inner = Vec::new();
        let resolved = plan_joins_from(&schema, &child, "articles", &path("author.country"), &mut nested, &mut inner);
        assert_eq!(child, "j2");
        assert_eq!(resolved.table, "j3");
        assert_eq!(inner[0], Join::Left { source: Source::aliased("users", "j3"), on: Predicate::eq(Expr::column("j2", "author"), Expr::column("j3", "id")) });

        aliases.resume(&nested);
        assert_eq!(aliases.fresh(), "j4");
        assert_eq!(joins.len(), 1);
    }

    #[test]
    fn test_missing_relation_truncates() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();

        let resolved = plan_joins(&schema, "articles", &path("title.length.more"), &mut aliases, &mut joins);
        assert!(joins.is_empty());
        assert_eq!(resolved.table, "articles");
        assert_eq!(resolved.column, "title");
        assert_eq!(resolved.segments, path("title"));
    }

    #[test]
    fn test_terminal_many_to_one_is_the_foreign_key() {
        let schema = schema();
        let mut aliases = AliasMap::new("j");
        let mut joins = Vec::new();

        let resolved = plan_joins(&schema, "articles", &path("author"), &mut aliases, &mut joins);
        assert!(joins.is_empty());
        assert_eq!(resolved.expr(), Expr::column("articles", "author"));
    }
}
