//! Skein query language
//!
//! The caller-facing half of skein: the nested filter tree (`{ "author": { "country": { "_eq": "NL" } } }`),
//! the closed operator vocabulary, operator resolution, and the `$`-rooted JSON sub-path language
//! together with its in-memory evaluator and the translation of filters into path predicates.
//!
//! Nothing here knows about SQL; see `skein-query` for compilation.

pub mod ast;
pub mod error;
pub mod jsonpath;
pub mod path_filter;
pub mod resolve;

pub use ast::{FilterNode, Logical, Operation, Operator, Quantifier};
pub use error::{FilterError, ParseError};
pub use jsonpath::{JsonFunction, JsonPath, PathLanguage};
pub use path_filter::{compile_filter, compile_predicate, embed_filter};
pub use resolve::{resolve_field_path, resolve_field_path_within, resolve_leaf, resolve_operator};
