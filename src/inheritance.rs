//! Property inheritance over the `isA` hierarchy.
//!
//! Two deliberately distinct code paths:
//!
//! * **By subject** (`R Subject ?x`): BFS upward from the subject over the
//!   transitive `isA` edge cache, collecting `R N v` facts at every visited
//!   ancestor.
//! * **By value** (`R ?x Value`): a direct index scan for holders of the
//!   value, followed by a downward walk over the reverse `isA` adjacency to
//!   reach the holders' instances.
//!
//! Negation overrides are applied by the orchestrator's result filter, which
//! checks the subject and all of its transitive parents.

use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{FactStore, Polarity};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use crate::transitive::TransitiveReasoner;

/// One inherited property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritedValue {
    pub answer: String,
    pub depth: usize,
    pub steps: Vec<String>,
    /// The ancestor (or the subject itself, at depth 0) holding the fact.
    pub inherited_from: String,
}

/// `R Subject ?x`: walk the `isA` chain upward, collecting property values.
pub fn values_for_subject(
    store: &FactStore,
    semantic: &SemanticIndex,
    transitive: &mut TransitiveReasoner,
    stats: &mut ReasoningStats,
    deadline: &Deadline,
    relation: &str,
    subject: &str,
) -> Result<Vec<InheritedValue>, EngineError> {
    let mut frontier: Vec<(String, usize, Vec<String>)> =
        vec![(subject.to_string(), 0, Vec::new())];
    for hit in transitive.targets_from(store, semantic, "isA", subject, deadline, stats)? {
        frontier.push((hit.value, hit.depth, hit.steps));
    }

    let mut out = Vec::new();
    for (node, depth, chain) in frontier {
        deadline.tick()?;
        stats.kb_scans += 1;
        for fact in store.get_with_arg(relation, 0, &node) {
            if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
                continue;
            }
            let value = fact.args[1].canonical();
            let mut steps = chain.clone();
            steps.push(format!("{relation} {node} {value}"));
            out.push(InheritedValue {
                answer: value,
                depth,
                steps,
                inherited_from: node.clone(),
            });
        }
    }
    Ok(out)
}

/// `R ?x Value`: find holders by direct scan on the value column, then walk
/// the `isA` hierarchy downward to the holders' instances.
pub fn subjects_for_value(
    store: &FactStore,
    semantic: &SemanticIndex,
    transitive: &mut TransitiveReasoner,
    stats: &mut ReasoningStats,
    deadline: &Deadline,
    relation: &str,
    value: &str,
) -> Result<Vec<InheritedValue>, EngineError> {
    stats.kb_scans += 1;
    let holders: Vec<String> = store
        .get_with_arg(relation, 1, value)
        .filter(|fact| fact.polarity == Polarity::Asserted && fact.args.len() == 2)
        .filter_map(|fact| fact.args[0].as_ident().map(str::to_string))
        .collect();

    let mut out = Vec::new();
    for holder in holders {
        deadline.tick()?;
        let fact_step = format!("{relation} {holder} {value}");
        for hit in transitive.sources_to(store, semantic, "isA", &holder, deadline, stats)? {
            let mut steps = hit.steps.clone();
            steps.push(fact_step.clone());
            out.push(InheritedValue {
                answer: hit.value,
                depth: hit.depth,
                steps,
                inherited_from: holder.clone(),
            });
        }
    }
    Ok(out)
}
