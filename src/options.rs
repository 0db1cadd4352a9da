use serde::{Deserialize, Serialize};

use crate::grammars::CompiledGrammar;

pub const DEFAULT_BREAKPOINT_SPACING: usize = 512;
pub const DEFAULT_APPROXIMATE_REPARSE_RANGE: usize = 1024;

/// Smallest number of bytes a search window covers.
const MIN_PROCESS_AMOUNT_UNIT: usize = 3000;

/// Tuning of the incremental highlighter and of the style cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub(crate) breakpoint_spacing: usize,
    pub(crate) approximate_reparse_range: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            breakpoint_spacing: DEFAULT_BREAKPOINT_SPACING,
            approximate_reparse_range: DEFAULT_APPROXIMATE_REPARSE_RANGE,
        }
    }
}

impl HighlightConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum distance in bytes between two checkpoints. Smaller values make
    /// edits cheaper to re-highlight at the cost of memory.
    pub fn breakpoint_spacing(mut self, value: usize) -> Self {
        self.breakpoint_spacing = value.max(1);
        self
    }

    /// How far back an approximate style query starts scanning when no
    /// checkpoint is close enough.
    pub fn approximate_reparse_range(mut self, value: usize) -> Self {
        self.approximate_reparse_range = value;
        self
    }

    pub fn spacing(&self) -> usize {
        self.breakpoint_spacing
    }

    pub fn reparse_range(&self) -> usize {
        self.approximate_reparse_range
    }

    /// How many bytes a single search window covers.
    pub fn process_amount_unit(&self) -> usize {
        MIN_PROCESS_AMOUNT_UNIT.max(4 * self.breakpoint_spacing)
    }

    /// Farthest a checkpoint can be from a style query for the cache to scan
    /// from it instead of giving up or approximating.
    pub fn max_distance(&self, grammar: &CompiledGrammar) -> usize {
        3 * self.breakpoint_spacing.max(grammar.max_extend)
    }
}
