//! Indexed fact storage. O(1) lookup by operator, by `(operator, args)`
//! identity, and by `(operator, position, argument)`, with truth/theory
//! partitions and a monotonically increasing `bundle_version` that downstream
//! caches key on.
//!
//! # Architecture
//!
//! ```text
//! FactStore
//!   |-- facts: BTreeMap<FactId, Fact>           (id order = insertion order)
//!   |-- by_operator: HashMap<op, Vec<FactId>>   (scan bucket, stable order)
//!   |-- by_key: HashMap<canonical, FactId>      (exact identity)
//!   |-- by_op_arg: HashMap<(op, pos, arg), Vec<FactId>>
//!   `-- bundle_version: u64                     (bumped on every mutation)
//! ```
//!
//! Iteration order is deterministic everywhere: operator buckets append in
//! insertion order and fact ids are never reused.

use crate::ast::{ArgTerm, Statement};
use crate::hdc::Hypervector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Stable fact identifier within one session.
pub type FactId = u64;

/// Truth polarity of a stored proposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Asserted,
    Negated,
}

/// Which layer a fact belongs to: base truth or the active theory overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Truth,
    Theory,
}

/// The atomic proposition.
#[derive(Debug, Clone)]
pub struct Fact {
    pub id: FactId,
    pub operator: String,
    pub args: Vec<ArgTerm>,
    pub polarity: Polarity,
    /// Hyperdimensional encoding, pure in `(operator, args, geometry)`.
    pub vector: Hypervector,
    /// For `Not`-wrapped facts: the inner statement being negated.
    pub inner: Option<Statement>,
    /// Optional stable handle for `@`-references.
    pub name: Option<String>,
    pub partition: Partition,
}

impl Fact {
    /// Canonical identity key over `(operator, args)`.
    pub fn key(&self) -> String {
        nary_key(&self.operator, &self.args)
    }

    /// The fact as a statement.
    pub fn statement(&self) -> Statement {
        Statement::new(self.operator.clone(), self.args.clone())
    }
}

/// Canonical identity key for an `(operator, args)` pair.
pub fn nary_key(operator: &str, args: &[ArgTerm]) -> String {
    if args.is_empty() {
        return operator.to_string();
    }
    let rendered: Vec<String> = args.iter().map(ArgTerm::canonical).collect();
    format!("{} {}", operator, rendered.join(" "))
}

/// Result of an add: either a fresh fact or an idempotent hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added(FactId),
    AlreadyPresent(FactId),
}

impl AddOutcome {
    /// The fact id regardless of outcome.
    pub fn id(self) -> FactId {
        match self {
            AddOutcome::Added(id) | AddOutcome::AlreadyPresent(id) => id,
        }
    }
}

/// Canonical owner of facts.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: BTreeMap<FactId, Fact>,
    next_id: FactId,
    by_operator: HashMap<String, Vec<FactId>>,
    by_key: HashMap<String, FactId>,
    by_op_arg: HashMap<(String, usize, String), Vec<FactId>>,
    by_name: HashMap<String, FactId>,
    bundle_version: u64,
}

impl FactStore {
    pub fn new() -> Self {
        FactStore::default()
    }

    /// Current invalidation token. Strictly increases on every mutation and
    /// never rewinds, including across theory pops.
    pub fn bundle_version(&self) -> u64 {
        self.bundle_version
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Add a fact. Re-asserting an existing `(operator, args)` identity is an
    /// idempotent no-op: the version is not bumped and the existing id is
    /// returned.
    pub fn add(&mut self, mut fact: Fact) -> AddOutcome {
        let key = fact.key();
        if let Some(&existing) = self.by_key.get(&key) {
            return AddOutcome::AlreadyPresent(existing);
        }
        let id = self.next_id;
        self.next_id += 1;
        fact.id = id;

        self.by_operator
            .entry(fact.operator.clone())
            .or_default()
            .push(id);
        self.by_key.insert(key, id);
        for (position, arg) in fact.args.iter().enumerate() {
            self.by_op_arg
                .entry((fact.operator.clone(), position, arg.canonical()))
                .or_default()
                .push(id);
        }
        if let Some(name) = &fact.name {
            self.by_name.insert(name.clone(), id);
        }
        self.facts.insert(id, fact);
        self.bundle_version += 1;
        AddOutcome::Added(id)
    }

    /// Remove a fact by id, unlinking every index. Bumps the version.
    pub fn remove(&mut self, id: FactId) -> Option<Fact> {
        let fact = self.facts.remove(&id)?;
        if let Some(bucket) = self.by_operator.get_mut(&fact.operator) {
            bucket.retain(|&other| other != id);
        }
        self.by_key.remove(&fact.key());
        for (position, arg) in fact.args.iter().enumerate() {
            if let Some(bucket) =
                self.by_op_arg
                    .get_mut(&(fact.operator.clone(), position, arg.canonical()))
            {
                bucket.retain(|&other| other != id);
            }
        }
        if let Some(name) = &fact.name {
            self.by_name.remove(name);
        }
        self.bundle_version += 1;
        Some(fact)
    }

    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    /// Fact registered under a stable handle name.
    pub fn get_named(&self, name: &str) -> Option<&Fact> {
        self.by_name.get(name).and_then(|id| self.facts.get(id))
    }

    /// All facts for an operator, in insertion order.
    pub fn get_by_operator<'a>(&'a self, operator: &str) -> impl Iterator<Item = &'a Fact> + 'a {
        self.by_operator
            .get(operator)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |id| self.facts.get(id))
    }

    /// Exact `(operator, args)` match.
    pub fn get_nary(&self, operator: &str, args: &[ArgTerm]) -> Option<&Fact> {
        self.get_by_key(&nary_key(operator, args))
    }

    /// Exact match by precomputed canonical key.
    pub fn get_by_key(&self, key: &str) -> Option<&Fact> {
        self.by_key.get(key).and_then(|id| self.facts.get(id))
    }

    /// Facts whose argument at `position` (0-based) has the given canonical
    /// form, in insertion order.
    pub fn get_with_arg<'a>(
        &'a self,
        operator: &str,
        position: usize,
        arg: &str,
    ) -> impl Iterator<Item = &'a Fact> + 'a {
        self.by_op_arg
            .get(&(operator.to_string(), position, arg.to_string()))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |id| self.facts.get(id))
    }

    /// Every fact in insertion order. For rare fallbacks only.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts.values()
    }

    /// Base-truth partition.
    pub fn truth_index(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts
            .values()
            .filter(|fact| fact.partition == Partition::Truth)
    }

    /// Theory-overlay partition.
    pub fn theory_index(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts
            .values()
            .filter(|fact| fact.partition == Partition::Theory)
    }

    /// Union of both partitions; alias of [`FactStore::iter`].
    pub fn all_index(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts.values()
    }

    /// All negated-polarity facts, for the soft-negation scan.
    pub fn negated_facts(&self) -> impl Iterator<Item = &Fact> + '_ {
        self.facts
            .values()
            .filter(|fact| fact.polarity == Polarity::Negated)
    }

    /// Bump the version without changing facts. Used by theory pushes so
    /// version-keyed caches rebuild against the new layer.
    pub fn touch(&mut self) {
        self.bundle_version += 1;
    }

    /// Move every theory-partition fact into the truth partition. Used when
    /// a theory stack is committed. Bumps the version.
    pub fn merge_theory_into_truth(&mut self) {
        for fact in self.facts.values_mut() {
            fact.partition = Partition::Truth;
        }
        self.bundle_version += 1;
    }

    /// Deep snapshot for theory layers.
    pub fn snapshot(&self) -> FactStore {
        self.clone()
    }

    /// Restore from a snapshot. The fact set becomes bitwise equal to the
    /// snapshot; the version continues monotonically so version-keyed caches
    /// can never alias a stale build.
    pub fn restore(&mut self, snapshot: FactStore) {
        let version = self.bundle_version.max(snapshot.bundle_version) + 1;
        *self = snapshot;
        self.bundle_version = version;
    }
}
