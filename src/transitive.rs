//! Transitive closure over cached relation graphs.
//!
//! For each transitive relation the reasoner lazily materialises a
//! `{version, forward, reverse}` edge cache from a single linear pass over
//! the operator's fact bucket. Caches are keyed on the store's
//! `bundle_version`: a mismatch on access triggers a full rebuild, never an
//! in-place patch, so cancellation can never leave a cache half-updated.
//!
//! Traversal is BFS with an explicit queue and visited set; every loop
//! iteration ticks the query deadline. Results are reported in BFS discovery
//! order, which is the canonical order for callers and tests.

use crate::ast::is_reserved;
use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{FactStore, Polarity};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

/// One reachable node, at its first-discovery depth, with the forward-order
/// edge steps that reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitiveHit {
    pub value: String,
    pub depth: usize,
    pub steps: Vec<String>,
}

/// One `(subject, target)` pair from an all-pairs enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitivePair {
    pub subject: String,
    pub target: String,
    pub depth: usize,
    pub steps: Vec<String>,
}

/// Depth-decayed score for chain matches: `max(0.1, base − 0.05·depth)`.
/// Plain transitive queries use base 0.9; all-pairs and the `implies`
/// pipeline use 0.85.
pub fn score_at_depth(base: f32, depth: usize) -> f32 {
    (base - 0.05 * depth as f32).max(0.1)
}

/// Cached adjacency for one relation.
#[derive(Debug, Clone, Default)]
pub struct EdgeCache {
    version: u64,
    pub forward: HashMap<String, Vec<String>>,
    pub reverse: HashMap<String, Vec<String>>,
    /// Sources in first-appearance order; drives all-pairs enumeration.
    pub subjects: Vec<String>,
}

impl EdgeCache {
    fn add_edge(&mut self, src: &str, dst: &str) {
        let dst_owned = dst.to_string();
        let bucket = self.forward.entry(src.to_string()).or_default();
        if bucket.contains(&dst_owned) {
            return;
        }
        bucket.push(dst_owned);
        if !self.subjects.iter().any(|existing| existing == src) {
            self.subjects.push(src.to_string());
        }
        self.reverse
            .entry(dst.to_string())
            .or_default()
            .push(src.to_string());
    }
}

/// BFS reasoner over per-relation edge caches.
#[derive(Debug, Default)]
pub struct TransitiveReasoner {
    caches: HashMap<String, EdgeCache>,
}

impl TransitiveReasoner {
    pub fn new() -> Self {
        TransitiveReasoner::default()
    }

    /// Drop all cached graphs. Rebuilds happen lazily on next access.
    pub fn clear(&mut self) {
        self.caches.clear();
    }

    /// The current edge cache for a relation, rebuilding if the store has
    /// moved past the cached version.
    pub fn edges(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
    ) -> &EdgeCache {
        let version = store.bundle_version();
        match self.caches.entry(relation.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().version != version {
                    *entry.get_mut() = Self::build(store, semantic, relation, version);
                }
                &*entry.into_mut()
            }
            Entry::Vacant(slot) => &*slot.insert(Self::build(store, semantic, relation, version)),
        }
    }

    fn build(
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        version: u64,
    ) -> EdgeCache {
        let mut cache = EdgeCache {
            version,
            ..EdgeCache::default()
        };
        let symmetric = semantic.is_symmetric(relation);

        let ingest = |cache: &mut EdgeCache, src: &str, dst: &str| {
            if is_reserved(src) || is_reserved(dst) {
                return;
            }
            // Edges negated in the current theory never enter the graph.
            if store
                .get_by_key(&format!("Not ({relation} {src} {dst})"))
                .is_some()
            {
                return;
            }
            cache.add_edge(src, dst);
            if symmetric && src != dst {
                cache.add_edge(dst, src);
            }
        };

        for fact in store.get_by_operator(relation) {
            if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
                continue;
            }
            if let (Some(src), Some(dst)) = (fact.args[0].as_ident(), fact.args[1].as_ident()) {
                ingest(&mut cache, src, dst);
            }
        }

        // Relations declaring `inverseOf=relation` contribute reversed edges.
        for fact in store.iter() {
            if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
                continue;
            }
            if semantic.inverse_of(&fact.operator) != Some(relation) {
                continue;
            }
            if let (Some(src), Some(dst)) = (fact.args[0].as_ident(), fact.args[1].as_ident()) {
                ingest(&mut cache, dst, src);
            }
        }

        tracing::debug!(
            relation,
            version,
            edges = cache.forward.values().map(Vec::len).sum::<usize>(),
            "rebuilt transitive edge cache"
        );
        cache
    }

    /// Whether `to` is reachable from `from`. Reflexive reachability holds
    /// only when an explicit `R from from` fact exists, never via cycles.
    pub fn reachable(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        from: &str,
        to: &str,
        deadline: &Deadline,
        stats: &mut ReasoningStats,
    ) -> Result<bool, EngineError> {
        Ok(self
            .find_path(store, semantic, relation, from, to, deadline, stats)?
            .is_some())
    }

    /// Shortest path from `from` to `to` as `(depth, steps)`, or `None`.
    pub fn find_path(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        from: &str,
        to: &str,
        deadline: &Deadline,
        stats: &mut ReasoningStats,
    ) -> Result<Option<(usize, Vec<String>)>, EngineError> {
        let cache = self.edges(store, semantic, relation);
        if from == to {
            // No phantom reflexivity: only an explicit self-edge counts.
            let has_self = cache
                .forward
                .get(from)
                .is_some_and(|bucket| bucket.iter().any(|dst| dst == from));
            return Ok(has_self.then(|| (1, vec![format!("{relation} {from} {from}")])));
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(from);
        let mut queue: VecDeque<(&str, usize, Vec<String>)> = VecDeque::new();
        queue.push_back((from, 0, Vec::new()));

        while let Some((node, depth, steps)) = queue.pop_front() {
            deadline.tick()?;
            let Some(neighbours) = cache.forward.get(node) else {
                continue;
            };
            for next in neighbours {
                stats.transitive_steps += 1;
                if !visited.insert(next) {
                    continue;
                }
                let mut next_steps = steps.clone();
                next_steps.push(format!("{relation} {node} {next}"));
                if next == to {
                    return Ok(Some((depth + 1, next_steps)));
                }
                queue.push_back((next, depth + 1, next_steps));
            }
        }
        Ok(None)
    }

    /// Every node reachable from `from`, each at its first-discovery depth,
    /// in BFS discovery order. The start node is never emitted.
    pub fn targets_from(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        from: &str,
        deadline: &Deadline,
        stats: &mut ReasoningStats,
    ) -> Result<Vec<TransitiveHit>, EngineError> {
        let cache = self.edges(store, semantic, relation);
        let mut hits = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(from);
        let mut queue: VecDeque<(&str, usize, Vec<String>)> = VecDeque::new();
        queue.push_back((from, 0, Vec::new()));

        while let Some((node, depth, steps)) = queue.pop_front() {
            deadline.tick()?;
            let Some(neighbours) = cache.forward.get(node) else {
                continue;
            };
            for next in neighbours {
                stats.transitive_steps += 1;
                if !visited.insert(next) {
                    continue;
                }
                let mut next_steps = steps.clone();
                next_steps.push(format!("{relation} {node} {next}"));
                hits.push(TransitiveHit {
                    value: next.clone(),
                    depth: depth + 1,
                    steps: next_steps.clone(),
                });
                queue.push_back((next, depth + 1, next_steps));
            }
        }
        Ok(hits)
    }

    /// Every node that reaches `to`, via BFS over the reverse adjacency.
    /// Step strings are constructed in forward textual order.
    pub fn sources_to(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        to: &str,
        deadline: &Deadline,
        stats: &mut ReasoningStats,
    ) -> Result<Vec<TransitiveHit>, EngineError> {
        let cache = self.edges(store, semantic, relation);
        let mut hits = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(to);
        let mut queue: VecDeque<(&str, usize, Vec<String>)> = VecDeque::new();
        queue.push_back((to, 0, Vec::new()));

        while let Some((node, depth, steps)) = queue.pop_front() {
            deadline.tick()?;
            let Some(sources) = cache.reverse.get(node) else {
                continue;
            };
            for src in sources {
                stats.transitive_steps += 1;
                if !visited.insert(src) {
                    continue;
                }
                let mut next_steps = vec![format!("{relation} {src} {node}")];
                next_steps.extend(steps.iter().cloned());
                hits.push(TransitiveHit {
                    value: src.clone(),
                    depth: depth + 1,
                    steps: next_steps.clone(),
                });
                queue.push_back((src, depth + 1, next_steps));
            }
        }
        Ok(hits)
    }

    /// Union of `targets_from` over every subject, subjects in
    /// first-appearance order. Each `(subject, target)` pair appears once,
    /// at its shortest depth.
    pub fn all_pairs(
        &mut self,
        store: &FactStore,
        semantic: &SemanticIndex,
        relation: &str,
        deadline: &Deadline,
        stats: &mut ReasoningStats,
    ) -> Result<Vec<TransitivePair>, EngineError> {
        let subjects = self
            .edges(store, semantic, relation)
            .subjects
            .clone();
        let mut pairs = Vec::new();
        for subject in subjects {
            let hits = self.targets_from(store, semantic, relation, &subject, deadline, stats)?;
            for hit in hits {
                pairs.push(TransitivePair {
                    subject: subject.clone(),
                    target: hit.value,
                    depth: hit.depth,
                    steps: hit.steps,
                });
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ident;
    use crate::fact_store::{Fact, Partition};
    use std::sync::Arc;

    fn add(store: &mut FactStore, relation: &str, src: &str, dst: &str) {
        store.add(Fact {
            id: 0,
            operator: relation.to_string(),
            args: vec![ident(src), ident(dst)],
            polarity: Polarity::Asserted,
            vector: Arc::new(vec![0.0]),
            inner: None,
            name: None,
            partition: Partition::Truth,
        });
    }

    fn chain_store() -> FactStore {
        let mut store = FactStore::new();
        add(&mut store, "isA", "Rex", "GermanShepherd");
        add(&mut store, "isA", "GermanShepherd", "Shepherd");
        add(&mut store, "isA", "Shepherd", "Dog");
        store
    }

    #[test]
    fn targets_emerge_in_discovery_order_with_depths() {
        let store = chain_store();
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        let hits = reasoner
            .targets_from(&store, &semantic, "isA", "Rex", &Deadline::unlimited(), &mut stats)
            .unwrap();
        let values: Vec<(&str, usize)> =
            hits.iter().map(|h| (h.value.as_str(), h.depth)).collect();
        assert_eq!(
            values,
            vec![("GermanShepherd", 1), ("Shepherd", 2), ("Dog", 3)]
        );
        assert_eq!(
            hits[2].steps,
            vec![
                "isA Rex GermanShepherd",
                "isA GermanShepherd Shepherd",
                "isA Shepherd Dog"
            ]
        );
        assert!(stats.transitive_steps >= 3);
    }

    #[test]
    fn cycles_terminate_and_emit_each_node_once() {
        let mut store = FactStore::new();
        add(&mut store, "isA", "A", "B");
        add(&mut store, "isA", "B", "C");
        add(&mut store, "isA", "C", "A");
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        let hits = reasoner
            .targets_from(&store, &semantic, "isA", "A", &Deadline::unlimited(), &mut stats)
            .unwrap();
        let values: Vec<&str> = hits.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, vec!["B", "C"]);
    }

    #[test]
    fn no_phantom_reflexivity() {
        let store = chain_store();
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        assert!(!reasoner
            .reachable(
                &store,
                &semantic,
                "isA",
                "Rex",
                "Rex",
                &Deadline::unlimited(),
                &mut stats
            )
            .unwrap());
    }

    #[test]
    fn explicit_self_loop_is_reachable_but_never_a_target() {
        let mut store = FactStore::new();
        add(&mut store, "isA", "X", "X");
        add(&mut store, "isA", "X", "Y");
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        assert!(reasoner
            .reachable(&store, &semantic, "isA", "X", "X", &Deadline::unlimited(), &mut stats)
            .unwrap());
        let hits = reasoner
            .targets_from(&store, &semantic, "isA", "X", &Deadline::unlimited(), &mut stats)
            .unwrap();
        assert!(hits.iter().all(|h| h.value != "X"));
    }

    #[test]
    fn sources_to_builds_forward_order_steps() {
        let store = chain_store();
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        let hits = reasoner
            .sources_to(&store, &semantic, "isA", "Dog", &Deadline::unlimited(), &mut stats)
            .unwrap();
        let rex = hits.iter().find(|h| h.value == "Rex").unwrap();
        assert_eq!(rex.depth, 3);
        assert_eq!(
            rex.steps,
            vec![
                "isA Rex GermanShepherd",
                "isA GermanShepherd Shepherd",
                "isA Shepherd Dog"
            ]
        );
    }

    #[test]
    fn symmetric_relations_traverse_both_ways() {
        let mut store = FactStore::new();
        add(&mut store, "near", "Paris", "Versailles");
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        // `near` is symmetric but not transitive in the defaults; the graph
        // still carries both directions.
        let cache = reasoner.edges(&store, &semantic, "near");
        assert!(cache.forward.contains_key("Paris"));
        assert!(cache.forward.contains_key("Versailles"));
    }

    #[test]
    fn inverse_declared_relations_contribute_reversed_edges() {
        let mut store = FactStore::new();
        add(&mut store, "causedBy", "Flood", "Rain");
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        assert!(reasoner
            .reachable(
                &store,
                &semantic,
                "causes",
                "Rain",
                "Flood",
                &Deadline::unlimited(),
                &mut stats
            )
            .unwrap());
    }

    #[test]
    fn negated_edges_never_enter_the_graph() {
        let mut store = chain_store();
        store.add(Fact {
            id: 0,
            operator: "Not".to_string(),
            args: vec![crate::ast::builders::comp(crate::ast::builders::fact2(
                "isA",
                "Shepherd",
                "Dog",
            ))],
            polarity: Polarity::Negated,
            vector: Arc::new(vec![0.0]),
            inner: Some(crate::ast::builders::fact2("isA", "Shepherd", "Dog")),
            name: None,
            partition: Partition::Theory,
        });
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        assert!(!reasoner
            .reachable(
                &store,
                &semantic,
                "isA",
                "Rex",
                "Dog",
                &Deadline::unlimited(),
                &mut stats
            )
            .unwrap());
    }

    #[test]
    fn all_pairs_uses_first_appearance_subject_order() {
        let store = chain_store();
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        let pairs = reasoner
            .all_pairs(&store, &semantic, "isA", &Deadline::unlimited(), &mut stats)
            .unwrap();
        assert_eq!(pairs[0].subject, "Rex");
        assert_eq!(pairs[0].target, "GermanShepherd");
        // 3 + 2 + 1 pairs for a three-edge chain.
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn step_budget_aborts_traversal() {
        let mut store = FactStore::new();
        for i in 0..50 {
            add(&mut store, "isA", &format!("N{i}"), &format!("N{}", i + 1));
        }
        let semantic = SemanticIndex::new();
        let mut reasoner = TransitiveReasoner::new();
        let mut stats = ReasoningStats::default();
        let deadline = Deadline::new(None, Some(5));
        let result =
            reasoner.targets_from(&store, &semantic, "isA", "N0", &deadline, &mut stats);
        assert_eq!(result, Err(EngineError::StepLimit));
    }
}
