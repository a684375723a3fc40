//! Query orchestrator.
//!
//! Public entry point for queries. Classifies a statement into knowns and
//! holes, dispatches meta-operators, then runs the multi-source pipeline in
//! a fixed order, merging results with priority-aware replacement:
//!
//! | # | Source               | Method tag             | Priority |
//! |---|----------------------|------------------------|----------|
//! | 1 | Direct KB (exact)    | `direct`               | 7        |
//! | 2 | Transitive           | `transitive`           | 6        |
//! | 3 | Rule-derived         | `rule_derived`         | 2        |
//! | 4 | Property inheritance | `property_inheritance` | 5        |
//! | 5 | Element-propagation  | `rule_derived`         | 2        |
//! | 6 | Transitive `implies` | `transitive`           | 6        |
//! | 7 | Compound-CSP         | `compound_csp`         | 3        |
//! | 8 | Bundle/induce        | `bundle_common`        | 4        |
//! | 9 | Vector similarity    | `hdc`                  | 1        |
//!
//! The vector source runs only when the symbolic pipeline produced nothing,
//! or always under the `approximate` strategy. After collection the result
//! pool is filtered (modal type-class exclusion, negation), stably sorted by
//! `(−priority, −score)`, and folded into per-hole bindings.

pub mod results;

use crate::ast::{ArgTerm, Statement};
use crate::config::{HdcStrategy, QueryConfig};
use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{nary_key, FactStore, Polarity};
use crate::hdc::{statement_vector, AnnIndex, VectorOracle};
use crate::inheritance;
use crate::query::results::{
    assemble, rank, Method, QueryResult, ResultCollector, ScoredResult,
};
use crate::rule_engine::{QueryHole, QueryKnown, RuleEngine};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use crate::transitive::{score_at_depth, TransitiveReasoner};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Similarity above which a negated vector suppresses a fact.
const NEGATION_SIMILARITY: f32 = 0.85;

/// Options accepted by `execute`.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Cap on returned results, applied after ranking.
    pub max_results: Option<usize>,
    /// Stop collecting from lower-priority sources once `max_results`
    /// results are already pooled.
    pub use_level_optimization: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            max_results: None,
            use_level_optimization: true,
        }
    }
}

/// A resolved known argument (1-based position).
#[derive(Debug, Clone)]
pub struct KnownSlot {
    pub position: usize,
    pub name: String,
    pub term: ArgTerm,
}

/// A query hole (1-based position).
#[derive(Debug, Clone)]
pub struct HoleSlot {
    pub position: usize,
    pub name: String,
}

/// Borrowed view over all session state a query needs. The session splits
/// its fields into this context so sources can read the store while the
/// transitive cache and statistics mutate.
pub(crate) struct EngineCtx<'a> {
    pub store: &'a FactStore,
    pub semantic: &'a SemanticIndex,
    pub rules: &'a RuleEngine,
    pub references: &'a HashMap<String, Statement>,
    pub oracle: &'a dyn VectorOracle,
    pub transitive: &'a mut TransitiveReasoner,
    pub stats: &'a mut ReasoningStats,
    pub deadline: &'a Deadline,
    pub settings: &'a QueryConfig,
    pub ann: Option<&'a AnnIndex>,
    /// Proof and forward-chaining recursion bound.
    pub max_depth: usize,
}

impl EngineCtx<'_> {
    /// Negation model: an exact `Not`-wrapped fact, a `Not` reference whose
    /// resolved inner statement matches, or (under the approximate strategy)
    /// a negated fact whose vector is similar above the negation threshold.
    pub fn is_negated(&mut self, operator: &str, args: &[ArgTerm]) -> Result<bool, EngineError> {
        let key = nary_key(operator, args);
        if self.store.get_by_key(&format!("Not ({key})")).is_some() {
            return Ok(true);
        }
        // `Not @ref` facts carry their resolved inner statement.
        for fact in self.store.negated_facts() {
            if let Some(inner) = &fact.inner {
                if inner.canonical_key() == key {
                    return Ok(true);
                }
            }
        }
        if self.settings.hdc_strategy == HdcStrategy::Approximate {
            let target = statement_vector(
                self.oracle,
                &Statement::new(operator, args.to_vec()),
                self.references,
            );
            for fact in self.store.negated_facts() {
                self.deadline.tick()?;
                self.stats.similarity_checks += 1;
                if self.oracle.similarity(&fact.vector, &target) > NEGATION_SIMILARITY {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Property-inheritance negation: applies to the subject or any of its
    /// transitive `isA` parents.
    pub fn is_property_negated(
        &mut self,
        relation: &str,
        subject: &str,
        value: &ArgTerm,
    ) -> Result<bool, EngineError> {
        if self.is_negated(relation, &[ArgTerm::Ident(subject.to_string()), value.clone()])? {
            return Ok(true);
        }
        let parents = self.transitive.targets_from(
            self.store,
            self.semantic,
            "isA",
            subject,
            self.deadline,
            self.stats,
        )?;
        for parent in parents {
            if self.is_negated(
                relation,
                &[ArgTerm::Ident(parent.value), value.clone()],
            )? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Partition a statement's args into knowns and holes. Top-level variables
/// behave as holes (the name loses its sigil).
pub fn classify(statement: &Statement) -> (Vec<KnownSlot>, Vec<HoleSlot>) {
    let mut knowns = Vec::new();
    let mut holes = Vec::new();
    for (index, arg) in statement.args.iter().enumerate() {
        let position = index + 1;
        match arg {
            ArgTerm::Hole(name) => holes.push(HoleSlot {
                position,
                name: name.clone(),
            }),
            ArgTerm::Variable(name) => holes.push(HoleSlot {
                position,
                name: name.trim_start_matches('$').to_string(),
            }),
            other => knowns.push(KnownSlot {
                position,
                name: other.canonical(),
                term: other.clone(),
            }),
        }
    }
    (knowns, holes)
}

/// Execute a query statement against the session state.
pub(crate) fn execute(
    ctx: &mut EngineCtx,
    statement: &Statement,
    options: &QueryOptions,
) -> QueryResult {
    if let Err(reason) = statement.validate() {
        tracing::warn!(source = %statement.canonical_key(), "rejected malformed statement");
        return QueryResult::failure(format!("Invalid input: {reason}"));
    }
    for arg in &statement.args {
        if let ArgTerm::Reference(name) = arg {
            if !ctx.references.contains_key(name) && ctx.store.get_named(name).is_none() {
                return QueryResult::failure(format!("Unresolved reference '@{name}'"));
            }
        }
    }

    let (knowns, holes) = classify(statement);
    if holes.is_empty() {
        return direct_match(ctx, statement);
    }
    if holes.len() > ctx.settings.max_holes {
        return QueryResult::failure(format!("Too many holes (max {})", ctx.settings.max_holes));
    }

    if let Some(result) = crate::meta_ops::dispatch(ctx, statement, &knowns, &holes, options) {
        return result;
    }

    let mut collector = ResultCollector::new();
    let outcome = collect_sources(ctx, statement, &knowns, &holes, options, &mut collector);
    let limit_reason = match outcome {
        Ok(()) => None,
        Err(err) if err.is_limit() => Some(err.to_string()),
        Err(err) => return QueryResult::failure(err.to_string()),
    };

    let mut pool = collector.into_results();

    // Modal operators never answer with type-classes.
    if SemanticIndex::is_modal(&statement.operator) {
        pool.retain(|result| {
            result
                .bindings
                .values()
                .all(|answer| !ctx.semantic.is_type_class(answer, ctx.store))
        });
    }

    // Negation filter over reified answers.
    let mut kept = Vec::with_capacity(pool.len());
    for result in pool {
        match negation_blocks(ctx, statement, &holes, &result) {
            Ok(true) => {}
            // Missing information is a non-match, not a block.
            Ok(false) | Err(_) => kept.push(result),
        }
    }

    rank(&mut kept, options.max_results);

    // Induction fallback for property queries that found nothing.
    if kept.is_empty()
        && statement.operator == "hasProperty"
        && knowns.len() == 1
        && knowns[0].position == 1
        && holes.len() == 1
    {
        if let Ok(candidates) = induction_fallback(ctx, &knowns[0].name, &holes[0].name) {
            kept = candidates;
        }
    }

    let hole_names: Vec<String> = holes.iter().map(|hole| hole.name.clone()).collect();
    let mut result = assemble(&hole_names, kept);
    if result.all_results.is_empty() {
        if let Some(reason) = limit_reason {
            return QueryResult::failure(reason);
        }
    } else if limit_reason.is_some() {
        result.reason = limit_reason;
    }
    result
}

/// Existence check for hole-free statements: exact partitions first, then
/// transitive reachability, then (approximate strategy only) a vector scan.
pub(crate) fn direct_match(ctx: &mut EngineCtx, statement: &Statement) -> QueryResult {
    let operator = &statement.operator;
    match ctx.is_negated(operator, &statement.args) {
        Ok(true) => return QueryResult::failure("Negated in current theory"),
        Ok(false) => {}
        Err(err) => return QueryResult::failure(err.to_string()),
    }

    let key = statement.canonical_key();
    if let Some(fact) = ctx.store.get_by_key(&key) {
        if fact.polarity == Polarity::Asserted {
            return existence_hit(1.0, Method::Direct, vec![format!("Fact: {key}")], None);
        }
    }

    if ctx.semantic.is_transitive(operator) && statement.args.len() == 2 {
        if let (Some(from), Some(to)) =
            (statement.args[0].as_ident(), statement.args[1].as_ident())
        {
            match ctx.transitive.find_path(
                ctx.store,
                ctx.semantic,
                operator,
                from,
                to,
                ctx.deadline,
                ctx.stats,
            ) {
                Ok(Some((depth, steps))) => {
                    return existence_hit(
                        score_at_depth(0.9, depth),
                        Method::Transitive,
                        steps,
                        Some(depth),
                    );
                }
                Ok(None) => {}
                Err(err) => return QueryResult::failure(err.to_string()),
            }
        }
    }

    if ctx.settings.hdc_strategy == HdcStrategy::Approximate {
        ctx.stats.hdc_queries += 1;
        let target = statement_vector(ctx.oracle, statement, ctx.references);
        let mut best = 0.0f32;
        for fact in ctx.store.get_by_operator(operator) {
            if fact.polarity != Polarity::Asserted {
                continue;
            }
            ctx.stats.similarity_checks += 1;
            let similarity = ctx.oracle.similarity(&fact.vector, &target);
            if similarity > best {
                best = similarity;
            }
        }
        if best >= ctx.settings.similarity_threshold {
            ctx.stats.hdc_successes += 1;
            return existence_hit(best, Method::Hdc, Vec::new(), None);
        }
    }

    QueryResult::miss()
}

fn existence_hit(
    score: f32,
    method: Method,
    steps: Vec<String>,
    depth: Option<usize>,
) -> QueryResult {
    let result = ScoredResult {
        bindings: BTreeMap::new(),
        score,
        method,
        steps,
        depth,
        inherited_from: None,
    };
    QueryResult {
        success: true,
        bindings: BTreeMap::new(),
        confidence: score,
        ambiguous: false,
        all_results: vec![result],
        reason: None,
    }
}

fn collect_sources(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    options: &QueryOptions,
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    let enough = |collector: &ResultCollector| {
        options.use_level_optimization
            && options
                .max_results
                .is_some_and(|cap| collector.len() >= cap)
    };

    source_direct(ctx, statement, knowns, holes, collector)?;
    if enough(collector) {
        return Ok(());
    }
    source_transitive(ctx, statement, knowns, holes, collector)?;
    if enough(collector) {
        return Ok(());
    }
    source_rules(ctx, statement, knowns, holes, collector)?;
    if enough(collector) {
        return Ok(());
    }
    source_inheritance(ctx, statement, knowns, holes, collector)?;
    if enough(collector) {
        return Ok(());
    }
    source_element_propagation(ctx, statement, knowns, holes, collector)?;
    source_implies(ctx, statement, knowns, holes, collector)?;
    if enough(collector) {
        return Ok(());
    }
    source_compound_csp(ctx, statement, knowns, holes, collector)?;
    source_bundle_common(ctx, statement, knowns, holes, collector)?;

    if collector.is_empty() || ctx.settings.hdc_strategy == HdcStrategy::Approximate {
        source_hdc(ctx, statement, knowns, holes, collector)?;
    }
    Ok(())
}

/// Source 1: exact facts with hole positions read off the matching fact.
fn source_direct(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    ctx.stats.kb_scans += 1;
    let operator = &statement.operator;
    let candidate_ids: Vec<u64> = match knowns.first() {
        Some(first) => ctx
            .store
            .get_with_arg(operator, first.position - 1, &first.name)
            .map(|fact| fact.id)
            .collect(),
        None => ctx
            .store
            .get_by_operator(operator)
            .map(|fact| fact.id)
            .collect(),
    };

    for id in candidate_ids {
        ctx.deadline.tick()?;
        let Some(fact) = ctx.store.get(id) else { continue };
        if fact.polarity != Polarity::Asserted || fact.args.len() != statement.args.len() {
            continue;
        }
        if !knowns
            .iter()
            .all(|known| fact.args[known.position - 1].canonical() == known.name)
        {
            continue;
        }
        let mut bindings = BTreeMap::new();
        for hole in holes {
            bindings.insert(hole.name.clone(), fact.args[hole.position - 1].canonical());
        }
        collector.offer(ScoredResult {
            bindings,
            score: 1.0,
            method: Method::Direct,
            steps: vec![format!("Fact: {}", fact.key())],
            depth: None,
            inherited_from: None,
        });
    }
    Ok(())
}

/// Source 2: transitive closure for declared-transitive binary relations.
fn source_transitive(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    let operator = &statement.operator;
    if !ctx.semantic.is_transitive(operator) || statement.args.len() != 2 || holes.len() > 2 {
        return Ok(());
    }

    match (knowns, holes) {
        ([known], [hole]) if known.position == 1 && hole.position == 2 => {
            let hits = ctx.transitive.targets_from(
                ctx.store,
                ctx.semantic,
                operator,
                &known.name,
                ctx.deadline,
                ctx.stats,
            )?;
            for hit in hits {
                let mut bindings = BTreeMap::new();
                bindings.insert(hole.name.clone(), hit.value);
                collector.offer(ScoredResult {
                    bindings,
                    score: score_at_depth(0.9, hit.depth),
                    method: Method::Transitive,
                    steps: hit.steps,
                    depth: Some(hit.depth),
                    inherited_from: None,
                });
            }
        }
        ([known], [hole]) if known.position == 2 && hole.position == 1 => {
            let hits = ctx.transitive.sources_to(
                ctx.store,
                ctx.semantic,
                operator,
                &known.name,
                ctx.deadline,
                ctx.stats,
            )?;
            for hit in hits {
                let mut bindings = BTreeMap::new();
                bindings.insert(hole.name.clone(), hit.value);
                collector.offer(ScoredResult {
                    bindings,
                    score: score_at_depth(0.9, hit.depth),
                    method: Method::Transitive,
                    steps: hit.steps,
                    depth: Some(hit.depth),
                    inherited_from: None,
                });
            }
        }
        ([], [first, second]) => {
            let pairs = ctx.transitive.all_pairs(
                ctx.store,
                ctx.semantic,
                operator,
                ctx.deadline,
                ctx.stats,
            )?;
            for pair in pairs {
                let mut bindings = BTreeMap::new();
                bindings.insert(first.name.clone(), pair.subject);
                bindings.insert(second.name.clone(), pair.target);
                collector.offer(ScoredResult {
                    bindings,
                    score: score_at_depth(0.85, pair.depth),
                    method: Method::Transitive,
                    steps: pair.steps,
                    depth: Some(pair.depth),
                    inherited_from: None,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Source 3: rule derivation.
fn source_rules(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    let rule_knowns: Vec<QueryKnown> = knowns
        .iter()
        .map(|known| QueryKnown {
            position: known.position,
            value: known.name.clone(),
        })
        .collect();
    let rule_holes: Vec<QueryHole> = holes
        .iter()
        .map(|hole| QueryHole {
            position: hole.position,
            name: hole.name.clone(),
        })
        .collect();
    let derived = ctx.rules.derive(
        ctx.store,
        ctx.semantic,
        ctx.transitive,
        ctx.stats,
        ctx.deadline,
        &statement.operator,
        &rule_knowns,
        &rule_holes,
    )?;
    for result in derived {
        collector.offer(result);
    }
    Ok(())
}

/// Source 4: property inheritance, both directions.
fn source_inheritance(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    let operator = &statement.operator;
    if !ctx.semantic.is_inheritable_property(operator)
        || knowns.len() != 1
        || holes.len() != 1
        || statement.args.len() != 2
    {
        return Ok(());
    }
    let known = &knowns[0];
    let hole = &holes[0];

    let values = if known.position == 1 {
        inheritance::values_for_subject(
            ctx.store,
            ctx.semantic,
            ctx.transitive,
            ctx.stats,
            ctx.deadline,
            operator,
            &known.name,
        )?
    } else {
        inheritance::subjects_for_value(
            ctx.store,
            ctx.semantic,
            ctx.transitive,
            ctx.stats,
            ctx.deadline,
            operator,
            &known.name,
        )?
    };

    for value in values {
        let mut bindings = BTreeMap::new();
        bindings.insert(hole.name.clone(), value.answer);
        collector.offer(ScoredResult {
            bindings,
            score: score_at_depth(0.9, value.depth),
            method: Method::PropertyInheritance,
            steps: value.steps,
            depth: Some(value.depth),
            inherited_from: Some(value.inherited_from),
        });
    }
    Ok(())
}

/// Source 5: `elementOf` propagation through set-containment chains.
fn source_element_propagation(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    if statement.operator != "elementOf"
        || knowns.len() != 1
        || knowns[0].position != 1
        || holes.len() != 1
        || holes[0].position != 2
    {
        return Ok(());
    }
    let element = &knowns[0].name;
    let hole = &holes[0];

    ctx.stats.kb_scans += 1;
    let memberships: Vec<(String, String)> = ctx
        .store
        .get_with_arg("elementOf", 0, element)
        .filter(|fact| fact.polarity == Polarity::Asserted && fact.args.len() == 2)
        .filter_map(|fact| {
            fact.args[1]
                .as_ident()
                .map(|set| (fact.key(), set.to_string()))
        })
        .collect();

    for (membership_step, set) in memberships {
        for container_relation in ["subsetOf", "containedIn"] {
            let hits = ctx.transitive.targets_from(
                ctx.store,
                ctx.semantic,
                container_relation,
                &set,
                ctx.deadline,
                ctx.stats,
            )?;
            for hit in hits {
                let mut bindings = BTreeMap::new();
                bindings.insert(hole.name.clone(), hit.value);
                let mut steps = vec![membership_step.clone()];
                steps.extend(hit.steps);
                collector.offer(ScoredResult {
                    bindings,
                    score: score_at_depth(0.85, hit.depth),
                    method: Method::RuleDerived,
                    steps,
                    depth: Some(hit.depth),
                    inherited_from: None,
                });
            }
        }
    }
    Ok(())
}

/// Source 6: transitive `implies` chains at the 0.85 base.
fn source_implies(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    if statement.operator != "implies"
        || knowns.len() != 1
        || knowns[0].position != 1
        || holes.len() != 1
        || holes[0].position != 2
    {
        return Ok(());
    }
    let hits = ctx.transitive.targets_from(
        ctx.store,
        ctx.semantic,
        "implies",
        &knowns[0].name,
        ctx.deadline,
        ctx.stats,
    )?;
    for hit in hits {
        let mut bindings = BTreeMap::new();
        bindings.insert(holes[0].name.clone(), hit.value);
        collector.offer(ScoredResult {
            bindings,
            score: score_at_depth(0.85, hit.depth),
            method: Method::Transitive,
            steps: hit.steps,
            depth: Some(hit.depth),
            inherited_from: None,
        });
    }
    Ok(())
}

/// Source 7: multi-hole constraint solving. Holes become variables in a
/// single pattern; shared variables inside compound arguments constrain the
/// join through one binding map.
fn source_compound_csp(
    ctx: &mut EngineCtx,
    statement: &Statement,
    _knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    if holes.len() < 2 {
        return Ok(());
    }
    let pattern_args: Vec<ArgTerm> = statement
        .args
        .iter()
        .map(|arg| match arg {
            ArgTerm::Hole(name) => ArgTerm::Variable(format!("$__hole_{name}")),
            other => other.clone(),
        })
        .collect();
    let pattern = Statement::new(statement.operator.clone(), pattern_args);
    let matches = ctx.rules.match_condition(
        ctx.store,
        ctx.semantic,
        ctx.transitive,
        ctx.stats,
        ctx.deadline,
        &crate::rule_engine::ConditionNode::Leaf(pattern),
        crate::rule_engine::VarBindings::default(),
    )?;

    for matched in matches {
        let mut bindings = BTreeMap::new();
        let mut complete = true;
        for hole in holes {
            match matched.get(&format!("$__hole_{}", hole.name)) {
                Some(value) => {
                    bindings.insert(hole.name.clone(), value.to_string());
                }
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            collector.offer(ScoredResult {
                bindings,
                score: 0.75,
                method: Method::CompoundCsp,
                steps: Vec::new(),
                depth: None,
                inherited_from: None,
            });
        }
    }
    Ok(())
}

/// Source 8: values shared by every known subject. Candidates enumerate in
/// the first subject's fact scan order; that order is part of the contract.
fn source_bundle_common(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    if knowns.len() < 2 || holes.len() != 1 {
        return Ok(());
    }
    let hole = &holes[0];
    if hole.position != statement.args.len() {
        return Ok(());
    }
    let operator = &statement.operator;

    ctx.stats.kb_scans += 1;
    let mut seen = HashSet::new();
    let candidates: Vec<(String, String)> = ctx
        .store
        .get_with_arg(operator, 0, &knowns[0].name)
        .filter(|fact| fact.polarity == Polarity::Asserted && fact.args.len() == 2)
        .map(|fact| (fact.args[1].canonical(), fact.key()))
        .collect();

    for (candidate, first_step) in candidates {
        ctx.deadline.tick()?;
        if !seen.insert(candidate.clone()) {
            continue;
        }
        let mut steps = vec![first_step];
        let mut shared = true;
        for known in &knowns[1..] {
            let args = [
                ArgTerm::Ident(known.name.clone()),
                ArgTerm::Ident(candidate.clone()),
            ];
            match ctx.store.get_nary(operator, &args) {
                Some(fact) if fact.polarity == Polarity::Asserted => {
                    steps.push(fact.key());
                }
                _ => {
                    shared = false;
                    break;
                }
            }
        }
        if shared {
            let mut bindings = BTreeMap::new();
            bindings.insert(hole.name.clone(), candidate);
            collector.offer(ScoredResult {
                bindings,
                score: 0.8,
                method: Method::BundleCommon,
                steps,
                depth: None,
                inherited_from: None,
            });
        }
    }
    Ok(())
}

/// Source 9: vector similarity over same-operator facts (exact scan) or the
/// ANN index (approximate strategy).
fn source_hdc(
    ctx: &mut EngineCtx,
    statement: &Statement,
    _knowns: &[KnownSlot],
    holes: &[HoleSlot],
    collector: &mut ResultCollector,
) -> Result<(), EngineError> {
    if holes.len() != 1 {
        return Ok(());
    }
    let hole = &holes[0];
    let operator = &statement.operator;
    ctx.stats.hdc_queries += 1;
    let target = statement_vector(ctx.oracle, statement, ctx.references);
    let threshold = ctx.settings.similarity_threshold;
    let mut emitted = 0u64;

    let candidates: Vec<(u64, f32)> = match ctx.ann {
        Some(ann) if ctx.settings.hdc_strategy == HdcStrategy::Approximate => {
            ann.search(&target, 16)
        }
        _ => {
            let mut scored = Vec::new();
            for fact in ctx.store.get_by_operator(operator) {
                ctx.deadline.tick()?;
                if fact.polarity != Polarity::Asserted {
                    continue;
                }
                ctx.stats.similarity_checks += 1;
                scored.push((fact.id, ctx.oracle.similarity(&fact.vector, &target)));
            }
            scored
        }
    };

    for (fact_id, similarity) in candidates {
        if similarity < threshold {
            continue;
        }
        let Some(fact) = ctx.store.get(fact_id) else { continue };
        if fact.operator != *operator
            || fact.polarity != Polarity::Asserted
            || fact.args.len() != statement.args.len()
        {
            continue;
        }
        let answer = fact.args[hole.position - 1].canonical();
        let mut bindings = BTreeMap::new();
        bindings.insert(hole.name.clone(), answer);
        collector.offer(ScoredResult {
            bindings,
            score: similarity,
            method: Method::Hdc,
            steps: Vec::new(),
            depth: None,
            inherited_from: None,
        });
        emitted += 1;
    }
    if emitted > 0 {
        ctx.stats.hdc_successes += 1;
        ctx.stats.hdc_bindings += emitted;
    }
    Ok(())
}

/// Whether a pooled result's reified fact is negated in the current theory.
fn negation_blocks(
    ctx: &mut EngineCtx,
    statement: &Statement,
    holes: &[HoleSlot],
    result: &ScoredResult,
) -> Result<bool, EngineError> {
    let mut ground_args = statement.args.clone();
    for hole in holes {
        let Some(answer) = result.bindings.get(&hole.name) else {
            return Ok(false);
        };
        ground_args[hole.position - 1] = ArgTerm::Ident(answer.clone());
    }
    if ctx.is_negated(&statement.operator, &ground_args)? {
        return Ok(true);
    }
    // Inheritable properties also honour negations on parent types.
    if ctx.semantic.is_inheritable_property(&statement.operator) && ground_args.len() == 2 {
        if let Some(subject) = ground_args[0].as_ident() {
            let subject = subject.to_string();
            return ctx.is_property_negated(&statement.operator, &subject, &ground_args[1]);
        }
    }
    Ok(false)
}

/// Type-peer induction for `hasProperty` misses: collect property values of
/// entities sharing a type with the subject, as low-confidence candidates.
fn induction_fallback(
    ctx: &mut EngineCtx,
    subject: &str,
    hole_name: &str,
) -> Result<Vec<ScoredResult>, EngineError> {
    let types = ctx.transitive.targets_from(
        ctx.store,
        ctx.semantic,
        "isA",
        subject,
        ctx.deadline,
        ctx.stats,
    )?;
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for class in types {
        ctx.deadline.tick()?;
        ctx.stats.kb_scans += 1;
        let peers: Vec<String> = ctx
            .store
            .get_with_arg("isA", 1, &class.value)
            .filter_map(|fact| fact.args[0].as_ident().map(str::to_string))
            .filter(|peer| peer != subject)
            .collect();
        for peer in peers {
            for fact in ctx.store.get_with_arg("hasProperty", 0, &peer) {
                if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
                    continue;
                }
                let value = fact.args[1].canonical();
                if !seen.insert(value.clone()) {
                    continue;
                }
                let mut bindings = BTreeMap::new();
                bindings.insert(hole_name.to_string(), value.clone());
                out.push(ScoredResult {
                    bindings,
                    score: 0.4,
                    method: Method::Induced,
                    steps: vec![
                        format!("isA {subject} {}", class.value),
                        format!("isA {peer} {}", class.value),
                        format!("hasProperty {peer} {value}"),
                    ],
                    depth: None,
                    inherited_from: Some(peer.clone()),
                });
            }
        }
    }
    Ok(out)
}
