//! Backward prover over facts, transitive closure, and rules.
//!
//! Goal proving tries, in order: the negation gate, an exact fact, a
//! transitive path, then rule decomposition. Rule conditions are first
//! enumerated as a full fact-join (complete over stored facts); only when
//! that fails does the prover recurse into condition leaves as sub-goals,
//! bounded by `max_depth`. Within a recursive `And` the first proof of each
//! child is committed without cross-child backtracking, which keeps proof
//! search deterministic and bounded.
//!
//! Every iteration ticks the shared deadline; exhaustion surfaces as
//! `valid: false` with reason `Timeout` or `StepLimit`, never a panic.

use crate::ast::Statement;
use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{FactStore, Polarity};
use crate::rule_engine::{ConditionNode, RuleEngine, VarBindings};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use crate::transitive::TransitiveReasoner;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits for one prove call.
#[derive(Debug, Clone)]
pub struct ProveOptions {
    pub timeout: Option<Duration>,
    pub max_depth: usize,
}

impl Default for ProveOptions {
    fn default() -> Self {
        ProveOptions {
            timeout: None,
            max_depth: 8,
        }
    }
}

/// Outcome of a prove call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofResult {
    pub valid: bool,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Borrowed reasoning state for one prove call.
pub(crate) struct Prover<'a> {
    pub store: &'a FactStore,
    pub semantic: &'a SemanticIndex,
    pub rules: &'a RuleEngine,
    pub transitive: &'a mut TransitiveReasoner,
    pub stats: &'a mut ReasoningStats,
    pub deadline: &'a Deadline,
    pub max_depth: usize,
}

impl Prover<'_> {
    /// Prove a ground goal. Limit errors become structured failures.
    pub fn prove(&mut self, goal: &Statement) -> ProofResult {
        if !goal.is_ground() {
            return ProofResult {
                valid: false,
                steps: Vec::new(),
                reason: Some("Goal must be ground".to_string()),
            };
        }
        match self.prove_goal(goal, 0) {
            Ok(Some(steps)) => {
                tracing::debug!(goal = %goal.canonical_key(), steps = ?steps, "goal proved");
                ProofResult {
                    valid: true,
                    steps,
                    reason: None,
                }
            }
            Ok(None) => ProofResult {
                valid: false,
                steps: Vec::new(),
                reason: Some("Unprovable".to_string()),
            },
            Err(err) if err.is_limit() => ProofResult {
                valid: false,
                steps: Vec::new(),
                reason: Some(err.to_string()),
            },
            Err(err) => ProofResult {
                valid: false,
                steps: Vec::new(),
                reason: Some(err.to_string()),
            },
        }
    }

    fn prove_goal(
        &mut self,
        goal: &Statement,
        depth: usize,
    ) -> Result<Option<Vec<String>>, EngineError> {
        self.deadline.tick()?;
        if depth > self.max_depth {
            return Ok(None);
        }

        let key = goal.canonical_key();
        // A negated goal is unprovable in the current theory.
        if self.store.get_by_key(&format!("Not ({key})")).is_some() {
            return Ok(None);
        }

        if let Some(fact) = self.store.get_by_key(&key) {
            if fact.polarity == Polarity::Asserted {
                return Ok(Some(vec![format!("Fact: {key}")]));
            }
        }

        if self.semantic.is_transitive(&goal.operator) && goal.args.len() == 2 {
            if let (Some(from), Some(to)) = (goal.args[0].as_ident(), goal.args[1].as_ident()) {
                if let Some((_, steps)) = self.transitive.find_path(
                    self.store,
                    self.semantic,
                    &goal.operator,
                    from,
                    to,
                    self.deadline,
                    self.stats,
                )? {
                    return Ok(Some(steps));
                }
            }
        }

        for rule_index in 0..self.rules.rules().len() {
            let rule = &self.rules.rules()[rule_index];
            if rule.conclusion.operator != goal.operator
                || rule.conclusion.arity() != goal.arity()
            {
                continue;
            }
            let mut base = VarBindings::default();
            let mut unified = true;
            for (pattern_arg, goal_arg) in rule.conclusion.args.iter().zip(goal.args.iter()) {
                match pattern_arg {
                    crate::ast::ArgTerm::Variable(variable) => {
                        if !base.try_bind(variable, &goal_arg.canonical()) {
                            unified = false;
                            break;
                        }
                    }
                    other => {
                        if other.canonical() != goal_arg.canonical() {
                            unified = false;
                            break;
                        }
                    }
                }
            }
            if !unified {
                continue;
            }

            let label = rule.label().to_string();
            let condition = rule.condition.clone();

            // Complete fact-join first.
            let matches = self.rules.match_condition(
                self.store,
                self.semantic,
                self.transitive,
                self.stats,
                self.deadline,
                &condition,
                base.clone(),
            )?;
            if let Some(matched) = matches.into_iter().next() {
                let mut steps: Vec<String> = matched
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                steps.push(format!("Applied rule: {label}"));
                return Ok(Some(steps));
            }

            // Fall back to recursive decomposition for rule-derived subgoals.
            if let Some((_, mut steps)) = self.prove_condition(&condition, base, depth + 1)? {
                steps.push(format!("Applied rule: {label}"));
                return Ok(Some(steps));
            }
        }
        Ok(None)
    }

    fn prove_condition(
        &mut self,
        node: &ConditionNode,
        bindings: VarBindings,
        depth: usize,
    ) -> Result<Option<(VarBindings, Vec<String>)>, EngineError> {
        self.deadline.tick()?;
        if depth > self.max_depth {
            return Ok(None);
        }
        match node {
            ConditionNode::Leaf(pattern) => {
                // Facts first, via the engine's leaf matcher.
                let matches = self.rules.match_condition(
                    self.store,
                    self.semantic,
                    self.transitive,
                    self.stats,
                    self.deadline,
                    node,
                    bindings.clone(),
                )?;
                if let Some(matched) = matches.into_iter().next() {
                    let grounded = RuleEngine::substitute(pattern, &matched);
                    return Ok(Some((matched, vec![format!("Fact: {}", grounded.canonical_key())])));
                }
                let grounded = RuleEngine::substitute(pattern, &bindings);
                if grounded.is_ground() {
                    if let Some(steps) = self.prove_goal(&grounded, depth + 1)? {
                        return Ok(Some((bindings, steps)));
                    }
                }
                Ok(None)
            }
            ConditionNode::And(children) => {
                let mut current = bindings;
                let mut steps = Vec::new();
                for child in children {
                    match self.prove_condition(child, current, depth)? {
                        Some((next, mut child_steps)) => {
                            current = next;
                            steps.append(&mut child_steps);
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((current, steps)))
            }
            ConditionNode::Or(children) => {
                for child in children {
                    if let Some(found) =
                        self.prove_condition(child, bindings.clone(), depth)?
                    {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
        }
    }
}
