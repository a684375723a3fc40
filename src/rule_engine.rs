//! Rule storage and pattern-matching derivation.
//!
//! A rule pairs a conclusion pattern with a compound condition tree of
//! `And` / `Or` / leaf patterns. Derivation unifies a query's knowns against
//! the conclusion, enumerates condition matches against the fact store
//! (sequential join for `And`, deduplicated union for `Or`), then fills the
//! query's holes from the resulting variable bindings.
//!
//! Leaf constants type-widen: a pattern constant that names a type-class
//! also accepts any fact argument that transitively `isA`-reaches it.

use crate::ast::{ArgTerm, Pattern, Statement};
use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{FactStore, Polarity};
use crate::query::results::{Method, ScoredResult};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use crate::transitive::TransitiveReasoner;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Condition tree of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionNode {
    Leaf(Pattern),
    And(Vec<ConditionNode>),
    Or(Vec<ConditionNode>),
}

impl ConditionNode {
    /// All leaf patterns, left to right.
    pub fn leaves(&self) -> Vec<&Pattern> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Pattern>) {
        match self {
            ConditionNode::Leaf(pattern) => out.push(pattern),
            ConditionNode::And(children) | ConditionNode::Or(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    fn render(&self) -> String {
        match self {
            ConditionNode::Leaf(pattern) => pattern.canonical_key(),
            ConditionNode::And(children) => {
                let parts: Vec<String> = children.iter().map(ConditionNode::render).collect();
                format!("({})", parts.join(" and "))
            }
            ConditionNode::Or(children) => {
                let parts: Vec<String> = children.iter().map(ConditionNode::render).collect();
                format!("({})", parts.join(" or "))
            }
        }
    }
}

/// A stored rule: `conclusion ⇐ condition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: Option<String>,
    pub conclusion: Pattern,
    pub condition: ConditionNode,
    pub has_variables: bool,
    /// Textual excerpt used in proof steps when the rule is unnamed.
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Build a rule, deriving `has_variables` and the source excerpt.
    pub fn new(name: Option<&str>, conclusion: Pattern, condition: ConditionNode) -> Self {
        let source = format!("{} :- {}", conclusion.canonical_key(), condition.render());
        let has_variables = !conclusion.variables().is_empty()
            || condition.leaves().iter().any(|leaf| !leaf.variables().is_empty());
        Rule {
            name: name.map(str::to_string),
            conclusion,
            condition,
            has_variables,
            source,
            created_at: Utc::now(),
        }
    }

    /// Label used in `Applied rule:` proof steps.
    pub fn label(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => &self.source,
        }
    }
}

/// Known argument of a query, 1-based position.
#[derive(Debug, Clone)]
pub struct QueryKnown {
    pub position: usize,
    pub value: String,
}

/// Hole of a query, 1-based position.
#[derive(Debug, Clone)]
pub struct QueryHole {
    pub position: usize,
    pub name: String,
}

/// Insertion-ordered variable bindings. Lookup is linear; binding maps stay
/// small (bounded by rule width).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarBindings(Vec<(String, String)>);

impl VarBindings {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Bind or check-agree. Returns false on conflict.
    pub fn try_bind(&mut self, name: &str, value: &str) -> bool {
        match self.get(name) {
            Some(existing) => existing == value,
            None => {
                self.0.push((name.to_string(), value.to_string()));
                true
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Canonical serialisation for dedup: sorted `name=value` pairs.
    pub fn serialised(&self) -> String {
        let mut pairs: Vec<String> = self
            .0
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        pairs.sort();
        pairs.join("&")
    }
}

/// Rule registry plus the derivation pipeline.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        RuleEngine::default()
    }

    /// Register a rule. Rejects rules whose conclusion uses a variable no
    /// condition leaf binds.
    pub fn register(&mut self, rule: Rule) -> Result<(), EngineError> {
        let bound: HashSet<String> = rule
            .condition
            .leaves()
            .iter()
            .flat_map(|leaf| leaf.variables())
            .collect();
        for variable in rule.conclusion.variables() {
            if !bound.contains(&variable) {
                return Err(EngineError::MalformedRule {
                    rule: rule.label().to_string(),
                    variable,
                });
            }
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Drop a rule by name. Returns whether anything was removed.
    pub fn drop_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.name.as_deref() != Some(name));
        before != self.rules.len()
    }

    /// Derive hole answers for a query from every matching rule.
    pub fn derive(
        &self,
        store: &FactStore,
        semantic: &SemanticIndex,
        transitive: &mut TransitiveReasoner,
        stats: &mut ReasoningStats,
        deadline: &Deadline,
        operator: &str,
        knowns: &[QueryKnown],
        holes: &[QueryHole],
    ) -> Result<Vec<ScoredResult>, EngineError> {
        let arity = knowns.len() + holes.len();
        let mut out = Vec::new();

        for rule in &self.rules {
            if rule.conclusion.operator != operator || rule.conclusion.arity() != arity {
                continue;
            }
            let Some(base) = Self::unify_knowns(rule, knowns) else {
                continue;
            };

            let matches = self.match_condition(
                store,
                semantic,
                transitive,
                stats,
                deadline,
                &rule.condition,
                base,
            )?;

            let conclusion_vars = rule.conclusion.variables();
            let mut seen = HashSet::new();
            for matched in matches {
                if !seen.insert(matched.serialised()) {
                    continue;
                }
                let Some(bindings) = Self::fill_holes(rule, holes, &matched) else {
                    continue;
                };
                let mut steps: Vec<String> = matched
                    .iter()
                    .filter(|(name, _)| !conclusion_vars.contains(*name))
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                steps.push(format!("Applied rule: {}", rule.label()));
                out.push(ScoredResult {
                    bindings,
                    score: 0.85,
                    method: Method::RuleDerived,
                    steps,
                    depth: None,
                    inherited_from: None,
                });
            }
        }
        Ok(out)
    }

    fn unify_knowns(rule: &Rule, knowns: &[QueryKnown]) -> Option<VarBindings> {
        let mut bindings = VarBindings::default();
        for known in knowns {
            let pattern_arg = rule.conclusion.args.get(known.position - 1)?;
            match pattern_arg {
                ArgTerm::Variable(variable) => {
                    if !bindings.try_bind(variable, &known.value) {
                        return None;
                    }
                }
                ArgTerm::Ident(constant) => {
                    if constant != &known.value {
                        return None;
                    }
                }
                _ => return None,
            }
        }
        Some(bindings)
    }

    fn fill_holes(
        rule: &Rule,
        holes: &[QueryHole],
        matched: &VarBindings,
    ) -> Option<BTreeMap<String, String>> {
        let mut bindings = BTreeMap::new();
        for hole in holes {
            let pattern_arg = rule.conclusion.args.get(hole.position - 1)?;
            let answer = match pattern_arg {
                ArgTerm::Variable(variable) => matched.get(variable)?.to_string(),
                ArgTerm::Ident(constant) => constant.clone(),
                _ => return None,
            };
            bindings.insert(hole.name.clone(), answer);
        }
        Some(bindings)
    }

    /// Enumerate all binding maps satisfying a condition tree, starting from
    /// `base`. `And` joins children sequentially; `Or` unions them.
    pub fn match_condition(
        &self,
        store: &FactStore,
        semantic: &SemanticIndex,
        transitive: &mut TransitiveReasoner,
        stats: &mut ReasoningStats,
        deadline: &Deadline,
        node: &ConditionNode,
        base: VarBindings,
    ) -> Result<Vec<VarBindings>, EngineError> {
        match node {
            ConditionNode::Leaf(pattern) => {
                self.match_leaf(store, semantic, transitive, stats, deadline, pattern, &base)
            }
            ConditionNode::And(children) => {
                let mut current = vec![base];
                for child in children {
                    let mut next = Vec::new();
                    let mut seen = HashSet::new();
                    for bindings in current {
                        let extended = self.match_condition(
                            store, semantic, transitive, stats, deadline, child, bindings,
                        )?;
                        for candidate in extended {
                            if seen.insert(candidate.serialised()) {
                                next.push(candidate);
                            }
                        }
                    }
                    if next.is_empty() {
                        return Ok(Vec::new());
                    }
                    current = next;
                }
                Ok(current)
            }
            ConditionNode::Or(children) => {
                let mut out = Vec::new();
                let mut seen = HashSet::new();
                for child in children {
                    let matches = self.match_condition(
                        store,
                        semantic,
                        transitive,
                        stats,
                        deadline,
                        child,
                        base.clone(),
                    )?;
                    for candidate in matches {
                        if seen.insert(candidate.serialised()) {
                            out.push(candidate);
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    fn match_leaf(
        &self,
        store: &FactStore,
        semantic: &SemanticIndex,
        transitive: &mut TransitiveReasoner,
        stats: &mut ReasoningStats,
        deadline: &Deadline,
        pattern: &Pattern,
        base: &VarBindings,
    ) -> Result<Vec<VarBindings>, EngineError> {
        stats.kb_scans += 1;
        let mut out = Vec::new();
        let fact_ids: Vec<_> = store
            .get_by_operator(&pattern.operator)
            .map(|fact| fact.id)
            .collect();
        for id in fact_ids {
            deadline.tick()?;
            let Some(fact) = store.get(id) else { continue };
            if fact.polarity != Polarity::Asserted || fact.args.len() != pattern.args.len() {
                continue;
            }
            let mut bindings = base.clone();
            let mut matched = true;
            for (pattern_arg, fact_arg) in pattern.args.iter().zip(fact.args.iter()) {
                if !self.match_term(
                    store, semantic, transitive, stats, deadline, pattern_arg, fact_arg,
                    &mut bindings,
                )? {
                    matched = false;
                    break;
                }
            }
            if matched {
                out.push(bindings);
            }
        }
        Ok(out)
    }

    /// Match one pattern term against one ground fact term, extending the
    /// bindings. Constants type-widen through the `isA` hierarchy.
    fn match_term(
        &self,
        store: &FactStore,
        semantic: &SemanticIndex,
        transitive: &mut TransitiveReasoner,
        stats: &mut ReasoningStats,
        deadline: &Deadline,
        pattern_arg: &ArgTerm,
        fact_arg: &ArgTerm,
        bindings: &mut VarBindings,
    ) -> Result<bool, EngineError> {
        match pattern_arg {
            ArgTerm::Variable(variable) => Ok(bindings.try_bind(variable, &fact_arg.canonical())),
            ArgTerm::Hole(_) => Ok(false),
            ArgTerm::Ident(constant) => match fact_arg {
                ArgTerm::Ident(value) => {
                    if value == constant {
                        return Ok(true);
                    }
                    if semantic.is_type_class(constant, store) {
                        return transitive.reachable(
                            store, semantic, "isA", value, constant, deadline, stats,
                        );
                    }
                    Ok(false)
                }
                _ => Ok(fact_arg.canonical() == *constant),
            },
            ArgTerm::Compound(inner_pattern) => match fact_arg {
                ArgTerm::Compound(inner_fact) => {
                    if inner_pattern.operator != inner_fact.operator
                        || inner_pattern.args.len() != inner_fact.args.len()
                    {
                        return Ok(false);
                    }
                    for (p, f) in inner_pattern.args.iter().zip(inner_fact.args.iter()) {
                        if !self.match_term(
                            store, semantic, transitive, stats, deadline, p, f, bindings,
                        )? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                _ => Ok(false),
            },
            ArgTerm::Reference(_) => Ok(pattern_arg.canonical() == fact_arg.canonical()),
        }
    }

    /// Substitute bound variables in a pattern, leaving unbound ones as-is.
    pub fn substitute(pattern: &Pattern, bindings: &VarBindings) -> Statement {
        let args = pattern
            .args
            .iter()
            .map(|arg| match arg {
                ArgTerm::Variable(variable) => match bindings.get(variable) {
                    Some(value) => ArgTerm::Ident(value.to_string()),
                    None => arg.clone(),
                },
                other => other.clone(),
            })
            .collect();
        Statement::new(pattern.operator.clone(), args)
    }

    /// Instantiate a rule's conclusion under a binding map; `None` when a
    /// conclusion variable is unbound.
    pub fn instantiate_conclusion(rule: &Rule, bindings: &VarBindings) -> Option<Statement> {
        let mut args = Vec::with_capacity(rule.conclusion.args.len());
        for arg in &rule.conclusion.args {
            match arg {
                ArgTerm::Variable(variable) => {
                    args.push(ArgTerm::Ident(bindings.get(variable)?.to_string()));
                }
                other => args.push(other.clone()),
            }
        }
        Some(Statement::new(rule.conclusion.operator.clone(), args))
    }
}
