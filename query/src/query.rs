//! The caller-facing query envelope.

use indexmap::IndexMap;
use serde::Deserialize;
use skein_ql::ast::FilterNode;

/// A database-agnostic retrieval request against one root collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Columns to select; empty means every root column. Dotted entries read through many-to-one
    /// relations, `json(field, path)` entries extract JSON sub-fields.
    pub fields: Vec<String>,
    /// Output name to field expression, for entries of `fields` that are aliases.
    pub alias: IndexMap<String, String>,
    pub filter: Option<FilterNode>,
    /// Field paths, `-` prefixed for descending order.
    pub sort: Vec<String>,
    /// `-1` (or none) means unlimited.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// 1-based page, in units of `limit`.
    pub page: Option<i64>,
    pub search: Option<String>,
    pub group: Vec<String>,
    pub aggregate: Option<Aggregate>,
    /// JSON sub-field requests that need more than the `json(field, path)` shorthand (a filter or
    /// an explicit output key).
    pub json_fields: Vec<JsonFieldRequest>,
}

impl Query {
    pub fn new() -> Self { Self::default() }

    pub fn fields<T: Into<String>>(mut self, fields: impl IntoIterator<Item = T>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>, field: impl Into<String>) -> Self {
        self.alias.insert(alias.into(), field.into());
        self
    }

    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort<T: Into<String>>(mut self, sort: impl IntoIterator<Item = T>) -> Self {
        self.sort = sort.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn group<T: Into<String>>(mut self, group: impl IntoIterator<Item = T>) -> Self {
        self.group = group.into_iter().map(Into::into).collect();
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn json_field(mut self, request: JsonFieldRequest) -> Self {
        self.json_fields.push(request);
        self
    }

    /// The offset `page` stands for, or `None` when it does not fit in an `i64`.
    pub fn page_offset(&self) -> Option<i64> {
        match (self.page, self.limit.filter(|l| *l != -1)) {
            (Some(page), Some(limit)) => page.checked_sub(1).and_then(|skipped| limit.checked_mul(skipped)),
            _ => Some(0),
        }
    }

    /// The effective row window: `(limit, offset)`, with `page` folded into the offset.
    pub fn window(&self) -> (Option<i64>, Option<i64>) {
        let limit = self.limit.filter(|l| *l != -1);
        let offset = match (self.page, limit) {
            (Some(_), Some(_)) => Some(self.page_offset().unwrap_or(i64::MAX)),
            _ => self.offset,
        };
        (limit, offset.filter(|o| *o > 0))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonFieldRequest {
    /// Column holding the document; dotted for a document behind many-to-one relations.
    pub field: String,
    pub path: String,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    /// Output key; defaults to `json(field, path)`.
    #[serde(default)]
    pub key: Option<String>,
}

impl JsonFieldRequest {
    pub fn new(field: impl Into<String>, path: impl Into<String>) -> Self { Self { field: field.into(), path: path.into(), filter: None, key: None } }

    pub fn filter(mut self, filter: FilterNode) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn output_key(&self) -> String { self.key.clone().unwrap_or_else(|| format!("json({}, {})", self.field, self.path)) }
}

/// Aggregate functions, each listing the fields it applies to.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Aggregate {
    pub count: Vec<String>,
    pub count_distinct: Vec<String>,
    pub count_all: Vec<String>,
    pub sum: Vec<String>,
    pub sum_distinct: Vec<String>,
    pub avg: Vec<String>,
    pub avg_distinct: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool { self.operations().all(|(_, fields)| fields.is_empty()) }

    /// `(operation, fields)` pairs in a fixed order.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        [
            ("count", self.count.as_slice()),
            ("countDistinct", self.count_distinct.as_slice()),
            ("countAll", self.count_all.as_slice()),
            ("sum", self.sum.as_slice()),
            ("sumDistinct", self.sum_distinct.as_slice()),
            ("avg", self.avg.as_slice()),
            ("avgDistinct", self.avg_distinct.as_slice()),
            ("min", self.min.as_slice()),
            ("max", self.max.as_slice()),
        ]
        .into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize() -> anyhow::Result<()> {
        let query: Query = serde_json::from_str(
            r#"{
                "fields": ["id", "json(metadata, $.color)"],
                "filter": { "author": { "country": { "_eq": "NL" } } },
                "sort": ["-published"],
                "limit": 10,
                "page": 3,
                "aggregate": { "countDistinct": ["author"] },
                "json_fields": [{ "field": "metadata", "path": "$.tags", "filter": { "name": { "_eq": "a" } }, "key": "tags" }]
            }"#,
        )?;
        assert_eq!(query.fields.len(), 2);
        assert_eq!(query.window(), (Some(10), Some(20)));
        assert_eq!(query.aggregate.as_ref().map(|a| a.count_distinct.clone()), Some(vec!["author".to_string()]));
        assert_eq!(query.json_fields[0].output_key(), "tags");
        Ok(())
    }

    #[test]
    fn test_window() {
        assert_eq!(Query::new().limit(-1).offset(5).window(), (None, Some(5)));
        assert_eq!(Query::new().limit(-1).page(2).window(), (None, None));
        assert_eq!(Query::new().limit(25).page(1).window(), (Some(25), None));
        assert_eq!(Query::new().window(), (None, None));
    }

    #[test]
    fn test_page_offset_overflow() {
        let query = Query::new().limit(10).page(i64::MAX);
        assert_eq!(query.page_offset(), None);
        assert_eq!(query.window(), (Some(10), Some(i64::MAX)));
        assert_eq!(Query::new().limit(i64::MAX).page(2).page_offset(), Some(i64::MAX));
        assert_eq!(Query::new().limit(-1).page(i64::MAX).page_offset(), Some(0));
    }
}
