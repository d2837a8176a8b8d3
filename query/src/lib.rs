//! Skein query compiler
//!
//! Turns a [`Query`] envelope (filter tree, field list, sort, paging, search, aggregates and JSON
//! sub-field requests) into one parameterized SQL statement for a chosen [`Dialect`], plus the
//! [`Correction`]s to run over the fetched rows.
//!
//! ```ignore
//! let compiled = QueryCompiler::new(&schema, Dialect::Postgres14).compile("articles", &query)?;
//! let (sql, args) = compiled.to_sql();
//! let rows = compiled.correct(fetch(&sql, &args)?);
//! ```

pub mod alias;
pub mod compile;
pub mod correction;
pub mod dialect;
pub mod error;
pub mod json;
pub mod options;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod scope;
pub mod sql;
pub mod value;

pub use compile::{CompiledQuery, QueryCompiler};
pub use correction::{Correction, Row};
pub use dialect::Dialect;
pub use error::CompileError;
pub use json::{ExtractionMode, JsonFieldNode};
pub use options::CompilerOptions;
pub use query::{Aggregate, JsonFieldRequest, Query};
pub use schema::{Collection, Field, FieldType, Relation, Schema};
pub use value::SqlValue;
