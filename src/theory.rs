//! Theory stack: snapshotted layers for hypothetical reasoning.
//!
//! A push captures the fact store and scope verbatim; facts asserted while
//! any layer is active land in the theory partition. A pop hands the
//! snapshot back to the session, which restores it (version stays
//! monotonic). `commit` keeps the hypothetical state; `reset` rolls all the
//! way back to the oldest snapshot.

use crate::fact_store::FactStore;
use crate::hdc::Hypervector;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One pushed layer.
#[derive(Debug, Clone)]
pub struct TheoryLayer {
    pub id: u64,
    pub priority: i32,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Named vectors shadowing scope entries for the life of the layer.
    pub dimension_overrides: HashMap<String, Hypervector>,
    pub(crate) fact_snapshot: FactStore,
    pub(crate) scope_snapshot: HashMap<String, Hypervector>,
}

impl TheoryLayer {
    /// The captured fact snapshot, for restoration.
    pub fn fact_snapshot(&self) -> &FactStore {
        &self.fact_snapshot
    }

    /// The captured scope, for restoration.
    pub fn scope_snapshot(&self) -> &HashMap<String, Hypervector> {
        &self.scope_snapshot
    }
}

/// Stack of theory layers. Owned by the session; the session performs the
/// actual store/scope swaps.
#[derive(Debug, Default)]
pub struct TheoryStack {
    layers: Vec<TheoryLayer>,
    next_id: u64,
}

impl TheoryStack {
    pub fn new() -> Self {
        TheoryStack::default()
    }

    /// Number of active layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Push a snapshot. Returns the new layer's id.
    pub fn push(
        &mut self,
        fact_snapshot: FactStore,
        scope_snapshot: HashMap<String, Hypervector>,
        dimension_overrides: HashMap<String, Hypervector>,
        priority: i32,
        metadata: HashMap<String, String>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.layers.push(TheoryLayer {
            id,
            priority,
            metadata,
            created_at: Utc::now(),
            dimension_overrides,
            fact_snapshot,
            scope_snapshot,
        });
        id
    }

    /// Pop the most recent layer for restoration.
    pub fn pop(&mut self) -> Option<TheoryLayer> {
        self.layers.pop()
    }

    /// Discard all layers without rolling back. Returns how many were kept
    /// as committed state (i.e. discarded snapshots).
    pub fn commit(&mut self) -> usize {
        let count = self.layers.len();
        self.layers.clear();
        count
    }

    /// Clear the stack, returning the oldest snapshot as the rollback target.
    pub fn reset(&mut self) -> Option<TheoryLayer> {
        if self.layers.is_empty() {
            return None;
        }
        let bottom = self.layers.remove(0);
        self.layers.clear();
        Some(bottom)
    }

    /// Active layers, oldest first.
    pub fn layers(&self) -> &[TheoryLayer] {
        &self.layers
    }
}
