use serde::Deserialize;

/// Knobs for a [`crate::QueryCompiler`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Filters nested deeper than this are rejected before any walk.
    pub max_filter_depth: usize,
    /// Prefix of generated join, CTE and derived-table aliases (`j1`, `j2`, ...).
    pub alias_prefix: String,
}

impl Default for CompilerOptions {
    fn default() -> Self { Self { max_filter_depth: skein_ql::ast::DEFAULT_MAX_DEPTH, alias_prefix: "j".to_string() } }
}

impl CompilerOptions {
    pub fn new() -> Self { Self::default() }

    pub fn max_filter_depth(mut self, depth: usize) -> Self {
        self.max_filter_depth = depth;
        self
    }

    pub fn alias_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.alias_prefix = prefix.into();
        self
    }
}
