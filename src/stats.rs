//! Per-session reasoning counters.
//!
//! Counters accumulate across queries until [`ReasoningStats::reset`] and are
//! exposed for observability as a serialisable snapshot.

use serde::{Deserialize, Serialize};

/// Counters for one session's reasoning work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStats {
    /// Linear scans over a fact-store operator bucket.
    pub kb_scans: u64,
    /// Pairwise vector similarity evaluations.
    pub similarity_checks: u64,
    /// Edges traversed by BFS over transitive relations.
    pub transitive_steps: u64,
    /// Vector-search invocations (exact scan or ANN probe).
    pub hdc_queries: u64,
    /// Vector-search invocations that produced at least one hit.
    pub hdc_successes: u64,
    /// Bindings emitted by the vector-search source.
    pub hdc_bindings: u64,
}

impl ReasoningStats {
    /// Zero all counters.
    pub fn reset(&mut self) {
        *self = ReasoningStats::default();
    }
}
