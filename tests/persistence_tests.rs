//! Persistence tests: NDJSON fact round-trips, rule catalogs, and
//! deterministic vector reconstitution.

use noetic::ast::builders::{fact2, hole, ident, negated, st, var};
use noetic::rule_engine::{ConditionNode, Rule};
use noetic::{QueryOptions, Session};
use tempfile::TempDir;

fn temp_path(dir: &TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn facts_round_trip_through_ndjson() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "facts.ndjson");

    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Rex", "Dog")).unwrap();
    session.add_fact(&fact2("owns", "John", "Mary")).unwrap();
    session
        .add_fact(&negated(fact2("can", "Penguin", "Fly")))
        .unwrap();
    let written = session.save_facts(&path).unwrap();
    assert_eq!(written, 3);

    let mut restored = Session::new();
    let added = restored.load_facts(&path).unwrap();
    assert_eq!(added, 3);
    assert!(restored.contains(&fact2("isA", "Rex", "Dog")));
    assert!(restored.contains(&fact2("owns", "John", "Mary")));
    assert!(restored.contains(&negated(fact2("can", "Penguin", "Fly"))));
}

#[test]
fn reloaded_negations_still_filter_queries() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "kb.ndjson");

    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Penguin", "Bird")).unwrap();
    session.add_fact(&fact2("can", "Bird", "Fly")).unwrap();
    session
        .add_fact(&negated(fact2("can", "Penguin", "Fly")))
        .unwrap();
    session.save_facts(&path).unwrap();

    let mut restored = Session::new();
    restored.load_facts(&path).unwrap();
    let result = restored.execute(
        &st("can", vec![ident("Penguin"), hole("x")]),
        &QueryOptions::default(),
    );
    assert!(result.all_results.iter().all(|r| r.bindings["x"] != "Fly"));
}

#[test]
fn queries_agree_before_and_after_reload() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "chain.ndjson");

    let mut session = Session::new();
    session
        .add_fact(&fact2("isA", "Rex", "GermanShepherd"))
        .unwrap();
    session
        .add_fact(&fact2("isA", "GermanShepherd", "Dog"))
        .unwrap();
    let query = st("isA", vec![ident("Rex"), hole("x")]);
    let before = session.execute(&query, &QueryOptions::default());
    session.save_facts(&path).unwrap();

    let mut restored = Session::new();
    restored.load_facts(&path).unwrap();
    let after = restored.execute(&query, &QueryOptions::default());

    let before_answers: Vec<&String> = before
        .all_results
        .iter()
        .map(|r| &r.bindings["x"])
        .collect();
    let after_answers: Vec<&String> =
        after.all_results.iter().map(|r| &r.bindings["x"]).collect();
    assert_eq!(before_answers, after_answers);
    assert_eq!(before.confidence, after.confidence);
}

#[test]
fn rules_round_trip_through_json() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "rules.json");

    let mut session = Session::new();
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
    session.save_rules(&path).unwrap();

    let mut restored = Session::new();
    assert_eq!(restored.load_rules(&path).unwrap(), 1);
    restored.add_fact(&fact2("parentOf", "Alice", "Bob")).unwrap();
    restored.add_fact(&fact2("parentOf", "Bob", "Carol")).unwrap();

    let result = restored.execute(
        &st("grandparentOf", vec![ident("Alice"), hole("x")]),
        &QueryOptions::default(),
    );
    assert_eq!(result.bindings["x"].answer, "Carol");
}

#[test]
fn compound_facts_survive_the_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = temp_path(&dir, "compound.ndjson");

    let mut session = Session::new();
    let stmt = st(
        "causes",
        vec![ident("Rain"), noetic::ast::builders::comp(st("wet", vec![ident("Grass")]))],
    );
    session.add_fact(&stmt).unwrap();
    session.save_facts(&path).unwrap();

    let mut restored = Session::new();
    restored.load_facts(&path).unwrap();
    assert!(restored.contains(&stmt));
}

#[test]
fn missing_file_is_a_storage_error() {
    let dir = TempDir::new().unwrap();
    let mut session = Session::new();
    let err = session
        .load_facts(&temp_path(&dir, "absent.ndjson"))
        .unwrap_err();
    assert!(matches!(err, noetic::EngineError::Storage(_)));
}
