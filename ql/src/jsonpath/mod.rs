//! JSON sub-path expressions.
//!
//! Paths are `$`-rooted (`$.tags[*].name`); a bare path such as `tags[0].name` is read as if it
//! started with `$.`. Besides members and indexes, two wildcard segments exist: `[*]` (array
//! elements) and `.*` (object members). The in-memory dialect additionally understands the filter
//! selector `[?( ... )]`, which keeps only the children of the current node matching a restricted
//! predicate language (comparisons, `like_regex`, `starts with`, `!`, `&&`, `||`). Nothing in a
//! path is ever evaluated as code.

mod eval;
pub mod grammar;
mod parser;

use std::fmt;

use regex::Regex;
use serde_json::Value;

pub use eval::*;
pub use parser::{parse_path, JsonFunction};

/// One step of a [`JsonPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `.name` or `["name"]`
    Member(String),
    /// `[3]`, negative indexes count from the end
    Index(i64),
    /// `.*`
    AnyMember,
    /// `[*]`
    AnyIndex,
    /// `[?( ... )]`
    Filter(FilterExpr),
}

impl Segment {
    pub fn is_wildcard(&self) -> bool { matches!(self, Segment::AnyMember | Segment::AnyIndex | Segment::Filter(_)) }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonPath {
    pub segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(input: &str) -> Result<Self, crate::error::ParseError> { parse_path(input) }

    pub fn root() -> Self { Self { segments: Vec::new() } }

    pub fn from_segments(segments: Vec<Segment>) -> Self { Self { segments } }

    /// A definite path addresses at most one value.
    pub fn is_definite(&self) -> bool { !self.segments.iter().any(Segment::is_wildcard) }

    pub fn has_wildcard(&self) -> bool { !self.is_definite() }

    /// Position of the last wildcard (or filter) segment.
    pub fn last_wildcard(&self) -> Option<usize> { self.segments.iter().rposition(Segment::is_wildcard) }

    /// Positions of every wildcard segment, outermost first.
    pub fn wildcard_positions(&self) -> Vec<usize> {
        self.segments.iter().enumerate().filter(|(_, s)| s.is_wildcard()).map(|(i, _)| i).collect()
    }

    /// True when the path is made of `.name` steps only.
    pub fn is_members_only(&self) -> bool { self.segments.iter().all(|s| matches!(s, Segment::Member(_))) }

    /// Member names and indexes as plain strings, `None` if the path has a wildcard.
    pub fn keys(&self) -> Option<Vec<String>> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Member(name) => Some(name.clone()),
                Segment::Index(i) => Some(i.to_string()),
                _ => None,
            })
            .collect()
    }

    /// Sub-path made of `segments[range]`, rooted again at `$`.
    pub fn slice(&self, range: std::ops::Range<usize>) -> JsonPath { JsonPath { segments: self.segments[range].to_vec() } }

    /// Render in SQL/JSON path syntax, understood by PostgreSQL, MySQL, MariaDB, SQLite, MSSQL and Oracle.
    pub fn sql_json(&self) -> String { render_segments("$", &self.segments, PathLanguage::SqlJson) }

    /// Render in the in-memory syntax accepted by [`JsonPath::parse`].
    pub fn in_memory(&self) -> String { render_segments("$", &self.segments, PathLanguage::InMemory) }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.in_memory()) }
}

impl std::str::FromStr for JsonPath {
    type Err = crate::error::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { parse_path(s) }
}

/// Target language of a rendered path or filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathLanguage {
    /// SQL/JSON path as implemented by the database (`? (...)` filters, `starts with`).
    SqlJson,
    /// The restricted language of the in-memory evaluator (`[?(...)]` filters, no `starts with`).
    InMemory,
}

impl PathLanguage {
    pub fn supports_starts_with(&self) -> bool { matches!(self, PathLanguage::SqlJson) }

    pub fn member(&self, name: &str) -> String {
        if is_plain_name(name) {
            format!(".{}", name)
        } else {
            match self {
                PathLanguage::SqlJson => format!(".{}", quote(name)),
                PathLanguage::InMemory => format!("[{}]", quote(name)),
            }
        }
    }
}

pub(crate) fn render_segments(head: &str, segments: &[Segment], language: PathLanguage) -> String {
    let mut out = String::from(head);
    for segment in segments {
        match segment {
            Segment::Member(name) => out.push_str(&language.member(name)),
            Segment::Index(i) => {
                // SQL/JSON spells "from the end" as `last`
                if *i < 0 && language == PathLanguage::SqlJson {
                    if *i == -1 {
                        out.push_str("[last]");
                    } else {
                        out.push_str(&format!("[last-{}]", -i - 1));
                    }
                } else {
                    out.push_str(&format!("[{}]", i));
                }
            }
            Segment::AnyMember => out.push_str(".*"),
            Segment::AnyIndex => out.push_str("[*]"),
            Segment::Filter(expr) => match language {
                // filters iterate the elements of the current array
                PathLanguage::SqlJson => out.push_str(&format!("[*] ? ({})", expr.render(language))),
                PathLanguage::InMemory => out.push_str(&format!("[?({})]", expr.render(language))),
            },
        }
    }
    out
}

/// Names that can be written as `.name` in every dialect.
pub fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// JSON string encoding, which is also the quoting used inside path expressions.
pub fn quote(s: &str) -> String { Value::String(s.to_owned()).to_string() }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `@` followed by member / index steps
    Path(Vec<Segment>),
    Value(Value),
}

impl Operand {
    fn render(&self, language: PathLanguage) -> String {
        match self {
            Operand::Path(steps) => render_segments("@", steps, language),
            Operand::Value(value) => value.to_string(),
        }
    }
}

/// A compiled `like_regex` pattern together with its XQuery-style flags.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub flags: Option<String>,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str, flags: Option<&str>) -> Result<Self, crate::error::ParseError> {
        let flag_chars = flags.unwrap_or_default();
        if let Some(other) = flag_chars.chars().find(|c| !matches!(c, 'i' | 's' | 'm' | 'x' | 'q')) {
            return Err(crate::error::ParseError::UnsupportedFlag(other));
        }
        // `q` quotes the whole pattern
        let effective = if flag_chars.contains('q') { regex::escape(source) } else { source.to_owned() };
        let regex = regex::RegexBuilder::new(&effective)
            .case_insensitive(flag_chars.contains('i'))
            .dot_matches_new_line(flag_chars.contains('s'))
            .multi_line(flag_chars.contains('m'))
            .ignore_whitespace(flag_chars.contains('x') && !flag_chars.contains('q'))
            .build()
            .map_err(|e| crate::error::ParseError::InvalidRegex { pattern: source.to_owned(), message: e.to_string() })?;
        Ok(Self { source: source.to_owned(), flags: flags.map(str::to_owned), regex })
    }

    pub fn is_match(&self, haystack: &str) -> bool { self.regex.is_match(haystack) }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool { self.source == other.source && self.flags == other.flags }
}

/// Predicate of a filter selector.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Or(Vec<FilterExpr>),
    And(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
    Compare { left: Operand, op: CompareOp, right: Operand },
    LikeRegex { path: Vec<Segment>, pattern: Pattern },
    StartsWith { path: Vec<Segment>, prefix: String },
}

impl FilterExpr {
    pub fn render(&self, language: PathLanguage) -> String {
        match self {
            FilterExpr::Or(items) => format!("({})", items.iter().map(|i| i.render(language)).collect::<Vec<_>>().join(" || ")),
            FilterExpr::And(items) => format!("({})", items.iter().map(|i| i.render(language)).collect::<Vec<_>>().join(" && ")),
            FilterExpr::Not(inner) => format!("!({})", inner.render(language)),
            FilterExpr::Compare { left, op, right } => format!("{} {} {}", left.render(language), op.as_str(), right.render(language)),
            FilterExpr::LikeRegex { path, pattern } => {
                let mut out = format!("{} like_regex {}", render_segments("@", path, language), quote(&pattern.source));
                if let Some(flags) = &pattern.flags {
                    out.push_str(&format!(" flag {}", quote(flags)));
                }
                out
            }
            FilterExpr::StartsWith { path, prefix } => format!("{} starts with {}", render_segments("@", path, language), quote(prefix)),
        }
    }
}
