//! Graph store configuration

use serde::{Deserialize, Serialize};

/// Default hint printed under value-divergence reports
pub const DEFAULT_TOLERANCE_HINT: &str = "Hint: relax the tolerance by setting tensor__cmp_sloppy=1\n  or even tensor__cmp_sloppy=2 for less-strict comparison";

/// fgraph configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FgraphConfig {
    /// Log every accepted replacement and every validation failure
    pub optimizer_verbose: bool,
    /// Tolerance hint appended to divergence reports
    pub tolerance_hint: String,
    /// Deepest producer chain an import will walk
    pub max_graph_depth: usize,
}

impl FgraphConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// With verbose optimizer logging
    #[inline]
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.optimizer_verbose = verbose;
        self
    }

    /// With a custom tolerance hint
    #[inline]
    #[must_use]
    pub fn with_tolerance_hint(mut self, hint: impl Into<String>) -> Self {
        self.tolerance_hint = hint.into();
        self
    }

    /// With a traversal depth limit
    #[inline]
    #[must_use]
    pub fn with_max_graph_depth(mut self, depth: usize) -> Self {
        self.max_graph_depth = depth;
        self
    }
}

impl Default for FgraphConfig {
    fn default() -> Self {
        Self {
            optimizer_verbose: false,
            tolerance_hint: DEFAULT_TOLERANCE_HINT.to_string(),
            max_graph_depth: 10_000,
        }
    }
}
