//! Meta-operator pipeline tests: one scenario per operator plus shape
//! fall-through behaviour.

use noetic::ast::builders::{comp, fact2, hole, ident, st};
use noetic::{Method, QueryOptions, Session};

fn opts() -> QueryOptions {
    QueryOptions::default()
}

// ============================================================================
// Property-set algebra
// ============================================================================

fn pets_kb() -> Session {
    let mut session = Session::new();
    session.add_fact(&fact2("hasProperty", "Dog", "Loyal")).unwrap();
    session.add_fact(&fact2("hasProperty", "Dog", "Furry")).unwrap();
    session.add_fact(&fact2("hasProperty", "Cat", "Furry")).unwrap();
    session
        .add_fact(&fact2("hasProperty", "Cat", "Independent"))
        .unwrap();
    session.add_fact(&fact2("eats", "Dog", "Kibble")).unwrap();
    session.add_fact(&fact2("eats", "Cat", "Kibble")).unwrap();
    session
}

#[test]
fn similar_ranks_by_property_overlap() {
    let mut session = pets_kb();
    session.add_fact(&fact2("hasProperty", "Fox", "Furry")).unwrap();

    let result = session.execute(&st("similar", vec![ident("Dog"), hole("x")]), &opts());
    assert!(result.success);
    // Cat shares two of Dog's pairs (Furry + Kibble); Fox shares one.
    assert_eq!(result.bindings["x"].answer, "Cat");
    assert_eq!(result.bindings["x"].method, Method::Hdc);
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["x"].as_str())
        .collect();
    assert!(answers.contains(&"Fox"));
}

#[test]
fn induce_intersects_property_sets() {
    let mut session = pets_kb();
    let result = session.execute(
        &st("induce", vec![ident("Dog"), ident("Cat"), hole("x")]),
        &opts(),
    );
    assert!(result.success);
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["x"].as_str())
        .collect();
    assert_eq!(answers, vec!["Furry", "Kibble"]);
    assert!(result
        .all_results
        .iter()
        .all(|r| r.method == Method::BundleCommon));
}

#[test]
fn bundle_unions_property_sets() {
    let mut session = pets_kb();
    let result = session.execute(
        &st("bundle", vec![ident("Dog"), ident("Cat"), hole("x")]),
        &opts(),
    );
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["x"].as_str())
        .collect();
    for expected in ["Loyal", "Furry", "Independent", "Kibble"] {
        assert!(answers.contains(&expected), "missing {expected}");
    }
}

#[test]
fn difference_keeps_left_only_properties() {
    let mut session = pets_kb();
    let result = session.execute(
        &st("difference", vec![ident("Dog"), ident("Cat"), hole("x")]),
        &opts(),
    );
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["x"].as_str())
        .collect();
    assert_eq!(answers, vec!["Loyal"]);
}

// ============================================================================
// Vector analogy
// ============================================================================

#[test]
fn analogy_excludes_its_own_inputs() {
    let mut session = Session::new();
    session.add_fact(&fact2("capitalOf", "Paris", "France")).unwrap();
    session.add_fact(&fact2("capitalOf", "Rome", "Italy")).unwrap();

    let result = session.execute(
        &st(
            "analogy",
            vec![ident("Paris"), ident("France"), ident("Rome"), hole("x")],
        ),
        &opts(),
    );
    for scored in &result.all_results {
        let answer = scored.bindings["x"].as_str();
        assert!(!["Paris", "France", "Rome"].contains(&answer));
        assert_eq!(scored.method, Method::Hdc);
    }
}

// ============================================================================
// Causal reasoning
// ============================================================================

fn causal_kb() -> Session {
    let mut session = Session::new();
    session.add_fact(&fact2("causes", "Rain", "WetGrass")).unwrap();
    session
        .add_fact(&fact2("causes", "WetGrass", "SlipperyPath"))
        .unwrap();
    session
        .add_fact(&fact2("causes", "Sprinkler", "WetGrass"))
        .unwrap();
    session
}

#[test]
fn abduce_finds_direct_and_transitive_causes() {
    let mut session = causal_kb();
    let result = session.execute(
        &st("abduce", vec![ident("SlipperyPath"), hole("cause")]),
        &opts(),
    );
    assert!(result.success);
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["cause"].as_str())
        .collect();
    assert!(answers.contains(&"WetGrass"));
    assert!(answers.contains(&"Rain"));
    // Direct cause outranks the deeper one.
    assert_eq!(result.bindings["cause"].answer, "WetGrass");
}

#[test]
fn abduce_uses_declared_inverse_facts() {
    let mut session = Session::new();
    session.add_fact(&fact2("causedBy", "Flood", "Rain")).unwrap();
    let result = session.execute(&st("abduce", vec![ident("Flood"), hole("c")]), &opts());
    assert!(result.success);
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["c"].as_str())
        .collect();
    assert!(answers.contains(&"Rain"));
}

#[test]
fn whatif_reports_would_fail_without_alternatives() {
    let mut session = Session::new();
    session.add_fact(&fact2("causes", "Rain", "WetGrass")).unwrap();
    session
        .add_fact(&fact2("causes", "WetGrass", "SlipperyPath"))
        .unwrap();

    let result = session.execute(
        &st(
            "whatif",
            vec![ident("Rain"), ident("SlipperyPath"), hole("outcome")],
        ),
        &opts(),
    );
    assert_eq!(result.bindings["outcome"].answer, "would_fail");
}

#[test]
fn whatif_reports_uncertain_with_an_independent_cause() {
    let mut session = causal_kb();
    let result = session.execute(
        &st(
            "whatif",
            vec![ident("Rain"), ident("WetGrass"), hole("outcome")],
        ),
        &opts(),
    );
    // Sprinkler still waters the grass.
    assert_eq!(result.bindings["outcome"].answer, "uncertain");
}

#[test]
fn whatif_reports_unchanged_for_unrelated_nodes() {
    let mut session = causal_kb();
    session.add_fact(&fact2("causes", "Sun", "DryGrass")).unwrap();
    let result = session.execute(
        &st(
            "whatif",
            vec![ident("Rain"), ident("DryGrass"), hole("outcome")],
        ),
        &opts(),
    );
    assert_eq!(result.bindings["outcome"].answer, "unchanged");
}

// ============================================================================
// Explain
// ============================================================================

#[test]
fn explain_renders_a_proof_when_one_exists() {
    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Socrates", "Human")).unwrap();
    session.add_fact(&fact2("isA", "Human", "Mortal")).unwrap();

    let result = session.execute(
        &st(
            "explain",
            vec![comp(fact2("isA", "Socrates", "Mortal")), hole("text")],
        ),
        &opts(),
    );
    assert!(result.success);
    let binding = &result.bindings["text"];
    assert!(binding.answer.contains("isA Socrates Human"));
    assert!(binding.answer.contains("isA Human Mortal"));
}

#[test]
fn explain_falls_back_to_abduction() {
    let mut session = Session::new();
    session
        .add_fact(&st(
            "causes",
            vec![ident("Rain"), comp(st("wet", vec![ident("Grass")]))],
        ))
        .unwrap();

    let result = session.execute(
        &st(
            "explain",
            vec![comp(st("wet", vec![ident("Grass")])), hole("why")],
        ),
        &opts(),
    );
    assert!(result.success);
    assert_eq!(result.bindings["why"].answer, "Rain");
}

// ============================================================================
// Deduce
// ============================================================================

#[test]
fn deduce_forward_chains_from_the_anchor() {
    use noetic::ast::builders::var;
    use noetic::rule_engine::{ConditionNode, Rule};

    let mut session = Session::new();
    session.add_fact(&fact2("parentOf", "Alice", "Bob")).unwrap();
    session.add_fact(&fact2("parentOf", "Bob", "Carol")).unwrap();
    session
        .add_rule(Rule::new(
            Some("grandparentOf"),
            st("grandparentOf", vec![var("$a"), var("$c")]),
            ConditionNode::And(vec![
                ConditionNode::Leaf(st("parentOf", vec![var("$a"), var("$b")])),
                ConditionNode::Leaf(st("parentOf", vec![var("$b"), var("$c")])),
            ]),
        ))
        .unwrap();

    let result = session.execute(
        &st(
            "deduce",
            vec![ident("Alice"), ident("grandparentOf"), hole("r")],
        ),
        &opts(),
    );
    assert!(result.success);
    assert_eq!(result.bindings["r"].answer, "grandparentOf Alice Carol");
    assert_eq!(result.bindings["r"].method, Method::RuleDerived);
}

#[test]
fn deduce_honours_the_operator_filter() {
    use noetic::ast::builders::var;
    use noetic::rule_engine::{ConditionNode, Rule};

    let mut session = Session::new();
    session.add_fact(&fact2("parentOf", "Alice", "Bob")).unwrap();
    session
        .add_rule(Rule::new(
            Some("ancestorOf"),
            st("ancestorOf", vec![var("$a"), var("$b")]),
            ConditionNode::Leaf(st("parentOf", vec![var("$a"), var("$b")])),
        ))
        .unwrap();

    let filtered = session.execute(
        &st("deduce", vec![ident("Alice"), ident("other"), hole("r")]),
        &opts(),
    );
    assert!(!filtered.success);
    assert_eq!(filtered.reason.as_deref(), Some("Unknown operator 'other'"));

    let any = session.execute(
        &st("deduce", vec![ident("Alice"), ident("any"), hole("r")]),
        &opts(),
    );
    assert!(any.success);
}

// ============================================================================
// Plan verification
// ============================================================================

fn plan_kb() -> Session {
    let mut session = Session::new();
    session.add_fact(&st("holds", vec![ident("HasFlour")])).unwrap();
    session
        .add_fact(&st(
            "planStep",
            vec![ident("bakeBread"), ident("1"), ident("mixDough")],
        ))
        .unwrap();
    session
        .add_fact(&st(
            "planStep",
            vec![ident("bakeBread"), ident("2"), ident("bake")],
        ))
        .unwrap();
    session
        .add_fact(&fact2("requires", "mixDough", "HasFlour"))
        .unwrap();
    session
        .add_fact(&fact2("achieves", "mixDough", "HasDough"))
        .unwrap();
    session
        .add_fact(&fact2("requires", "bake", "HasDough"))
        .unwrap();
    session
        .add_fact(&fact2("achieves", "bake", "HasBread"))
        .unwrap();
    session
}

#[test]
fn valid_plan_replays_to_valid_with_step_log() {
    let mut session = plan_kb();
    let result = session.execute(
        &st("verifyPlan", vec![ident("bakeBread"), hole("status")]),
        &opts(),
    );
    assert!(result.success);
    let binding = &result.bindings["status"];
    assert_eq!(binding.answer, "valid");
    assert_eq!(binding.steps, vec!["Step 1: mixDough ok", "Step 2: bake ok"]);
}

#[test]
fn missing_precondition_invalidates_the_plan() {
    let mut session = plan_kb();
    session.retract(&st("holds", vec![ident("HasFlour")])).unwrap();
    let result = session.execute(
        &st("verifyPlan", vec![ident("bakeBread"), hole("status")]),
        &opts(),
    );
    let binding = &result.bindings["status"];
    assert_eq!(binding.answer, "invalid");
    assert_eq!(binding.steps, vec!["Step 1: mixDough missing HasFlour"]);
}

#[test]
fn unknown_plan_is_a_structured_failure() {
    let mut session = Session::new();
    let result = session.execute(
        &st("verifyPlan", vec![ident("ghost"), hole("status")]),
        &opts(),
    );
    assert!(!result.success);
    assert_eq!(result.reason.as_deref(), Some("Unknown plan 'ghost'"));
}

// ============================================================================
// Shape fall-through
// ============================================================================

#[test]
fn wrong_shape_falls_through_to_the_ordinary_pipeline() {
    let mut session = Session::new();
    // `similar` with two knowns is not the meta shape; treated as a plain
    // relation with no matching facts.
    session.add_fact(&fact2("similar", "A", "B")).unwrap();
    let result = session.execute(
        &st("similar", vec![ident("A"), ident("B"), hole("x")]),
        &opts(),
    );
    // Falls through; no ternary facts exist, so the query misses.
    assert!(!result.success);
}
