//! Meta-operator pipelines.
//!
//! Each meta-operator is a specialised pipeline over the substrate: property
//! set algebra (`similar`, `induce`, `bundle`, `difference`), vector
//! arithmetic (`analogy`), causal reasoning (`abduce`, `whatif`), proof
//! rendering (`explain`), bounded forward chaining (`deduce`), and plan
//! replay (`verifyPlan`).
//!
//! Dispatch requires both the operator name and the knowns/holes shape to
//! match; otherwise the query falls through to the ordinary pipeline.

use crate::ast::{is_reserved, ArgTerm, Statement};
use crate::error::EngineError;
use crate::fact_store::{Fact, FactStore, Partition, Polarity};
use crate::hdc::{statement_vector, Hypervector};
use crate::prove::Prover;
use crate::query::results::{assemble, rank, Method, QueryResult, ScoredResult};
use crate::query::{EngineCtx, HoleSlot, KnownSlot, QueryOptions};
use crate::rule_engine::{RuleEngine, VarBindings};
use crate::transitive::{score_at_depth, TransitiveReasoner};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Operators handled here.
const META_OPERATORS: [&str; 10] = [
    "similar",
    "induce",
    "bundle",
    "difference",
    "analogy",
    "abduce",
    "explain",
    "whatif",
    "deduce",
    "verifyPlan",
];

/// Route a query to its meta-operator pipeline when the name and shape
/// match. `None` falls through to the ordinary source pipeline.
pub(crate) fn dispatch(
    ctx: &mut EngineCtx,
    statement: &Statement,
    knowns: &[KnownSlot],
    holes: &[HoleSlot],
    options: &QueryOptions,
) -> Option<QueryResult> {
    if !META_OPERATORS.contains(&statement.operator.as_str()) {
        return None;
    }
    let outcome = match statement.operator.as_str() {
        "similar" if knowns.len() == 1 && holes.len() == 1 => {
            Some(similar(ctx, &knowns[0], &holes[0], options))
        }
        "induce" if knowns.len() == 2 && holes.len() == 1 => {
            Some(property_algebra(ctx, knowns, &holes[0], options, SetOp::Intersect))
        }
        "bundle" if knowns.len() == 2 && holes.len() == 1 => {
            Some(property_algebra(ctx, knowns, &holes[0], options, SetOp::Union))
        }
        "difference" if knowns.len() == 2 && holes.len() == 1 => {
            Some(property_algebra(ctx, knowns, &holes[0], options, SetOp::Difference))
        }
        "analogy" if knowns.len() == 3 && holes.len() == 1 => {
            Some(analogy(ctx, knowns, &holes[0], options))
        }
        "abduce" if knowns.len() == 1 && holes.len() == 1 => {
            Some(abduce_result(ctx, &knowns[0].term, &holes[0], options))
        }
        "explain" if knowns.len() == 1 && holes.len() == 1 => {
            Some(explain(ctx, &knowns[0], &holes[0], options))
        }
        "whatif" if knowns.len() == 2 && holes.len() == 1 => {
            Some(whatif(ctx, knowns, &holes[0], options))
        }
        "deduce" if (2..=4).contains(&knowns.len()) && holes.len() == 1 => {
            Some(deduce(ctx, knowns, &holes[0], options))
        }
        "verifyPlan" if knowns.len() == 1 && holes.len() == 1 => {
            Some(verify_plan(ctx, &knowns[0], &holes[0], options))
        }
        _ => None,
    };
    match outcome? {
        Ok(result) => Some(result),
        Err(err) => Some(QueryResult::failure(err.to_string())),
    }
}

fn finish(
    hole: &HoleSlot,
    mut results: Vec<ScoredResult>,
    options: &QueryOptions,
) -> QueryResult {
    rank(&mut results, options.max_results);
    assemble(&[hole.name.clone()], results)
}

fn scored(hole: &HoleSlot, answer: String, score: f32, method: Method, steps: Vec<String>) -> ScoredResult {
    let mut bindings = BTreeMap::new();
    bindings.insert(hole.name.clone(), answer);
    ScoredResult {
        bindings,
        score,
        method,
        steps,
        depth: None,
        inherited_from: None,
    }
}

/// `(relation, value)` property pairs of an entity, in fact scan order.
fn property_pairs(store: &FactStore, entity: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for fact in store.iter() {
        if fact.polarity != Polarity::Asserted
            || fact.args.len() != 2
            || is_reserved(&fact.operator)
        {
            continue;
        }
        if fact.args[0].as_ident() == Some(entity) {
            pairs.push((fact.operator.clone(), fact.args[1].canonical()));
        }
    }
    pairs
}

/// Every identifier occurring in any fact argument, in first-seen order.
fn known_entities(store: &FactStore) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for fact in store.iter() {
        for arg in &fact.args {
            if let Some(name) = arg.as_ident() {
                if !is_reserved(name) && seen.insert(name.to_string()) {
                    out.push(name.to_string());
                }
            }
        }
    }
    out
}

/// `similar S ?x`: Jaccard overlap on property sets.
fn similar(
    ctx: &mut EngineCtx,
    known: &KnownSlot,
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    ctx.stats.kb_scans += 1;
    let subject_pairs: HashSet<(String, String)> =
        property_pairs(ctx.store, &known.name).into_iter().collect();
    if subject_pairs.is_empty() {
        return Ok(QueryResult::miss());
    }

    let mut results = Vec::new();
    for entity in known_entities(ctx.store) {
        ctx.deadline.tick()?;
        if entity == known.name {
            continue;
        }
        let entity_pairs: HashSet<(String, String)> =
            property_pairs(ctx.store, &entity).into_iter().collect();
        if entity_pairs.is_empty() {
            continue;
        }
        let shared: Vec<&(String, String)> =
            subject_pairs.intersection(&entity_pairs).collect();
        if shared.is_empty() {
            continue;
        }
        let union_len = subject_pairs.union(&entity_pairs).count();
        let score = shared.len() as f32 / union_len as f32;
        let mut steps: Vec<String> = shared
            .iter()
            .map(|(relation, value)| format!("{relation} {value}"))
            .collect();
        steps.sort();
        results.push(scored(hole, entity, score, Method::Hdc, steps));
    }
    Ok(finish(hole, results, options))
}

enum SetOp {
    Intersect,
    Union,
    Difference,
}

/// `induce` / `bundle` / `difference`: property-set algebra over two
/// subjects. Answers are property values; enumeration follows the first
/// subject's fact scan order.
fn property_algebra(
    ctx: &mut EngineCtx,
    knowns: &[KnownSlot],
    hole: &HoleSlot,
    options: &QueryOptions,
    op: SetOp,
) -> Result<QueryResult, EngineError> {
    ctx.stats.kb_scans += 1;
    let left = &knowns[0].name;
    let right = &knowns[1].name;
    let left_pairs = property_pairs(ctx.store, left);
    let right_pairs = property_pairs(ctx.store, right);
    let right_set: HashSet<&(String, String)> = right_pairs.iter().collect();

    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut emit = |results: &mut Vec<ScoredResult>,
                    seen: &mut HashSet<(String, String)>,
                    pair: &(String, String),
                    score: f32,
                    steps: Vec<String>| {
        if seen.insert(pair.clone()) {
            results.push(scored(hole, pair.1.clone(), score, Method::BundleCommon, steps));
        }
    };

    match op {
        SetOp::Intersect => {
            for pair in &left_pairs {
                if right_set.contains(pair) {
                    let steps = vec![
                        format!("{} {} {}", pair.0, left, pair.1),
                        format!("{} {} {}", pair.0, right, pair.1),
                    ];
                    emit(&mut results, &mut seen, pair, 0.8, steps);
                }
            }
        }
        SetOp::Union => {
            for pair in &left_pairs {
                let steps = vec![format!("{} {} {}", pair.0, left, pair.1)];
                emit(&mut results, &mut seen, pair, 0.75, steps);
            }
            for pair in &right_pairs {
                let steps = vec![format!("{} {} {}", pair.0, right, pair.1)];
                emit(&mut results, &mut seen, pair, 0.75, steps);
            }
        }
        SetOp::Difference => {
            for pair in &left_pairs {
                if !right_set.contains(pair) {
                    let steps = vec![format!("{} {} {}", pair.0, left, pair.1)];
                    emit(&mut results, &mut seen, pair, 0.75, steps);
                }
            }
        }
    }
    Ok(finish(hole, results, options))
}

/// `analogy A B C ?x`: nearest known entity to `C + (B − A)`.
fn analogy(
    ctx: &mut EngineCtx,
    knowns: &[KnownSlot],
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    ctx.stats.hdc_queries += 1;
    let a = ctx.oracle.from_name(&knowns[0].name);
    let b = ctx.oracle.from_name(&knowns[1].name);
    let c = ctx.oracle.from_name(&knowns[2].name);
    let target: Hypervector = Arc::new(
        c.iter()
            .zip(b.iter())
            .zip(a.iter())
            .map(|((cv, bv), av)| cv + bv - av)
            .collect::<Vec<f32>>(),
    );

    let exclude: HashSet<&str> = knowns.iter().map(|known| known.name.as_str()).collect();
    let mut results = Vec::new();
    for entity in known_entities(ctx.store) {
        ctx.deadline.tick()?;
        if exclude.contains(entity.as_str()) {
            continue;
        }
        ctx.stats.similarity_checks += 1;
        let candidate = ctx.oracle.from_name(&entity);
        let similarity = ctx.oracle.similarity(&candidate, &target);
        if similarity >= ctx.settings.similarity_threshold {
            results.push(scored(hole, entity, similarity, Method::Hdc, Vec::new()));
        }
    }
    if !results.is_empty() {
        ctx.stats.hdc_successes += 1;
        ctx.stats.hdc_bindings += results.len() as u64;
    }
    Ok(finish(hole, results, options))
}

/// Causes of an observation: direct `causes` facts, declared-inverse
/// `causedBy` facts, and transitive causal ancestors, depth-scored.
fn abduce_candidates(
    ctx: &mut EngineCtx,
    observation: &ArgTerm,
    hole: &HoleSlot,
) -> Result<Vec<ScoredResult>, EngineError> {
    let obs_key = observation.canonical();
    let mut results = Vec::new();
    let mut seen = HashSet::new();

    ctx.stats.kb_scans += 1;
    for fact in ctx.store.get_with_arg("causes", 1, &obs_key) {
        if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
            continue;
        }
        let cause = fact.args[0].canonical();
        if seen.insert(cause.clone()) {
            results.push(scored(
                hole,
                cause,
                score_at_depth(0.85, 0),
                Method::RuleDerived,
                vec![fact.key()],
            ));
        }
    }
    for fact in ctx.store.get_with_arg("causedBy", 0, &obs_key) {
        if fact.polarity != Polarity::Asserted || fact.args.len() != 2 {
            continue;
        }
        let cause = fact.args[1].canonical();
        if seen.insert(cause.clone()) {
            results.push(scored(
                hole,
                cause,
                0.8,
                Method::RuleDerived,
                vec![fact.key()],
            ));
        }
    }

    if let ArgTerm::Ident(name) = observation {
        let hits = ctx.transitive.sources_to(
            ctx.store,
            ctx.semantic,
            "causes",
            name,
            ctx.deadline,
            ctx.stats,
        )?;
        for hit in hits {
            if seen.insert(hit.value.clone()) {
                results.push(scored(
                    hole,
                    hit.value,
                    score_at_depth(0.85, hit.depth - 1),
                    Method::RuleDerived,
                    hit.steps,
                ));
            }
        }
    }
    Ok(results)
}

fn abduce_result(
    ctx: &mut EngineCtx,
    observation: &ArgTerm,
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    let results = abduce_candidates(ctx, observation, hole)?;
    Ok(finish(hole, results, options))
}

/// `explain Goal ?text`: render a proof, or abduce when no proof exists.
fn explain(
    ctx: &mut EngineCtx,
    known: &KnownSlot,
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    if let ArgTerm::Compound(goal) = &known.term {
        let proof = {
            let mut prover = Prover {
                store: ctx.store,
                semantic: ctx.semantic,
                rules: ctx.rules,
                transitive: &mut *ctx.transitive,
                stats: &mut *ctx.stats,
                deadline: ctx.deadline,
                max_depth: ctx.max_depth,
            };
            prover.prove(goal)
        };
        if proof.valid {
            let text = proof.steps.join("; ");
            let result = scored(hole, text, 0.9, Method::RuleDerived, proof.steps);
            return Ok(finish(hole, vec![result], options));
        }
    }
    // No proof: fall back to causal abduction over the goal term.
    let results = abduce_candidates(ctx, &known.term, hole)?;
    if results.is_empty() {
        return Ok(QueryResult::failure("Unprovable"));
    }
    Ok(finish(hole, results, options))
}

/// `whatif Negated Affected ?outcome` over the `causes` DAG.
///
/// `unchanged`: the affected node is not downstream of the negated one.
/// `would_fail`: it is downstream and every causal route into it depends on
/// the negated node. `uncertain`: an independent alternative cause survives.
fn whatif(
    ctx: &mut EngineCtx,
    knowns: &[KnownSlot],
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    let negated = &knowns[0].name;
    let affected = &knowns[1].name;

    let downstream = ctx.transitive.targets_from(
        ctx.store,
        ctx.semantic,
        "causes",
        negated,
        ctx.deadline,
        ctx.stats,
    )?;
    let path = downstream.iter().find(|hit| &hit.value == affected);
    let Some(path) = path else {
        let result = scored(hole, "unchanged".to_string(), 0.8, Method::RuleDerived, Vec::new());
        return Ok(finish(hole, vec![result], options));
    };
    let path_steps = path.steps.clone();
    let downstream_set: HashSet<String> =
        downstream.into_iter().map(|hit| hit.value).collect();

    // Direct causes of the affected node that do not themselves depend on
    // the negated node are independent alternatives.
    let ancestors = ctx.transitive.sources_to(
        ctx.store,
        ctx.semantic,
        "causes",
        affected,
        ctx.deadline,
        ctx.stats,
    )?;
    let has_alternative = ancestors.iter().any(|hit| {
        hit.depth == 1 && hit.value != *negated && !downstream_set.contains(&hit.value)
    });

    let (outcome, score) = if has_alternative {
        ("uncertain", 0.5)
    } else {
        ("would_fail", 0.85)
    };
    let result = scored(hole, outcome.to_string(), score, Method::RuleDerived, path_steps);
    Ok(finish(hole, vec![result], options))
}

/// `deduce source filter ?result [depth] [limit]`: bounded forward chaining
/// over a scratch overlay of the store, anchored to the source entity.
fn deduce(
    ctx: &mut EngineCtx,
    knowns: &[KnownSlot],
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    let source = &knowns[0].name;
    let filter = &knowns[1].name;
    let depth = knowns
        .get(2)
        .and_then(|known| known.name.parse::<usize>().ok())
        .unwrap_or(3)
        .min(ctx.max_depth);
    let limit = knowns
        .get(3)
        .and_then(|known| known.name.parse::<usize>().ok())
        .unwrap_or(25);

    // The filter must name a known operator (stored, ruled, or declared).
    if filter != "any"
        && ctx.store.get_by_operator(filter).next().is_none()
        && !ctx
            .rules
            .rules()
            .iter()
            .any(|rule| rule.conclusion.operator == *filter)
        && !ctx.semantic.is_declared(filter)
    {
        return Err(EngineError::UnknownOperator(filter.clone()));
    }

    let mut scratch = ctx.store.snapshot();
    let mut scratch_transitive = TransitiveReasoner::new();
    let mut results = Vec::new();
    let mut derived_keys = HashSet::new();

    'rounds: for round in 1..=depth {
        let mut new_facts = Vec::new();
        for rule in ctx.rules.rules() {
            ctx.deadline.tick()?;
            let matches = ctx.rules.match_condition(
                &scratch,
                ctx.semantic,
                &mut scratch_transitive,
                ctx.stats,
                ctx.deadline,
                &rule.condition,
                VarBindings::default(),
            )?;
            for matched in matches {
                let Some(conclusion) = RuleEngine::instantiate_conclusion(rule, &matched) else {
                    continue;
                };
                if !conclusion.is_ground() {
                    continue;
                }
                let key = conclusion.canonical_key();
                if scratch.get_by_key(&key).is_some() || derived_keys.contains(&key) {
                    continue;
                }
                // Anchor: the derivation must touch the source entity.
                let anchored = conclusion
                    .args
                    .iter()
                    .any(|arg| arg.as_ident() == Some(source))
                    || matched.iter().any(|(_, value)| value == source);
                if !anchored {
                    continue;
                }
                derived_keys.insert(key.clone());
                if filter == "any" || conclusion.operator == *filter {
                    results.push(scored(
                        hole,
                        key.clone(),
                        (0.7 - 0.05 * (round - 1) as f32).max(0.1),
                        Method::RuleDerived,
                        vec![format!("Applied rule: {}", rule.label())],
                    ));
                    if results.len() >= limit {
                        break 'rounds;
                    }
                }
                new_facts.push(conclusion);
            }
        }
        if new_facts.is_empty() {
            break;
        }
        for stmt in new_facts {
            let vector = statement_vector(ctx.oracle, &stmt, ctx.references);
            scratch.add(Fact {
                id: 0,
                operator: stmt.operator.clone(),
                args: stmt.args,
                polarity: Polarity::Asserted,
                vector,
                inner: None,
                name: None,
                partition: Partition::Theory,
            });
        }
    }
    Ok(finish(hole, results, options))
}

/// `verifyPlan planName ?status`: replay the stored step sequence through
/// the STRIPS-style action model.
fn verify_plan(
    ctx: &mut EngineCtx,
    known: &KnownSlot,
    hole: &HoleSlot,
    options: &QueryOptions,
) -> Result<QueryResult, EngineError> {
    let plan = &known.name;
    ctx.stats.kb_scans += 1;

    let mut steps: Vec<(usize, String)> = ctx
        .store
        .get_with_arg("planStep", 0, plan)
        .filter(|fact| fact.polarity == Polarity::Asserted && fact.args.len() == 3)
        .filter_map(|fact| {
            let index = fact.args[1].as_ident()?.parse::<usize>().ok()?;
            let action = fact.args[2].as_ident()?.to_string();
            Some((index, action))
        })
        .collect();
    if steps.is_empty() {
        return Ok(QueryResult::failure(format!("Unknown plan '{plan}'")));
    }
    steps.sort_by_key(|(index, _)| *index);

    let mut state: HashSet<String> = ctx
        .store
        .get_by_operator("holds")
        .filter(|fact| fact.polarity == Polarity::Asserted && fact.args.len() == 1)
        .map(|fact| fact.args[0].canonical())
        .collect();

    let mut log = Vec::new();
    let mut valid = true;
    'replay: for (index, action) in &steps {
        ctx.deadline.tick()?;
        let requires: Vec<String> = ctx
            .store
            .get_with_arg("requires", 0, action)
            .filter(|fact| fact.args.len() == 2)
            .map(|fact| fact.args[1].canonical())
            .collect();
        for condition in &requires {
            if !state.contains(condition) {
                log.push(format!("Step {index}: {action} missing {condition}"));
                valid = false;
                break 'replay;
            }
        }
        for fact in ctx.store.get_with_arg("achieves", 0, action) {
            if fact.args.len() == 2 {
                state.insert(fact.args[1].canonical());
            }
        }
        for fact in ctx.store.get_with_arg("removes", 0, action) {
            if fact.args.len() == 2 {
                state.remove(&fact.args[1].canonical());
            }
        }
        log.push(format!("Step {index}: {action} ok"));
    }

    let (status, score) = if valid { ("valid", 0.9) } else { ("invalid", 0.85) };
    let result = scored(hole, status.to_string(), score, Method::RuleDerived, log);
    Ok(finish(hole, vec![result], options))
}
