//! Property inheritance integration tests, covering both walk directions
//! and the negation-override semantics.

use noetic::ast::builders::{fact2, hole, ident, negated, st};
use noetic::{Method, QueryOptions, Session};

fn bird_kb() -> Session {
    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Penguin", "Bird")).unwrap();
    session.add_fact(&fact2("isA", "Sparrow", "Bird")).unwrap();
    session.add_fact(&fact2("can", "Bird", "Fly")).unwrap();
    session
}

// ============================================================================
// By-subject walk (upward)
// ============================================================================

#[test]
fn instances_inherit_type_properties() {
    let mut session = bird_kb();
    let result = session.execute(
        &st("can", vec![ident("Sparrow"), hole("x")]),
        &QueryOptions::default(),
    );
    assert!(result.success);
    let binding = &result.bindings["x"];
    assert_eq!(binding.answer, "Fly");
    assert_eq!(binding.method, Method::PropertyInheritance);
    assert!((binding.similarity - 0.85).abs() < 1e-5);
    assert_eq!(binding.inherited_from.as_deref(), Some("Bird"));
    assert_eq!(binding.steps, vec!["isA Sparrow Bird", "can Bird Fly"]);
}

#[test]
fn deeper_ancestors_score_lower() {
    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Rex", "Dog")).unwrap();
    session.add_fact(&fact2("isA", "Dog", "Animal")).unwrap();
    session.add_fact(&fact2("can", "Dog", "Bark")).unwrap();
    session.add_fact(&fact2("can", "Animal", "Breathe")).unwrap();

    let result = session.execute(
        &st("can", vec![ident("Rex"), hole("x")]),
        &QueryOptions::default(),
    );
    let bark = result
        .all_results
        .iter()
        .find(|r| r.bindings["x"] == "Bark")
        .unwrap();
    let breathe = result
        .all_results
        .iter()
        .find(|r| r.bindings["x"] == "Breathe")
        .unwrap();
    assert!((bark.score - 0.85).abs() < 1e-5);
    assert!((breathe.score - 0.80).abs() < 1e-5);
    assert!(bark.score > breathe.score);
}

// ============================================================================
// Negation overrides
// ============================================================================

#[test]
fn subject_negation_filters_the_inherited_value() {
    let mut session = bird_kb();
    session
        .add_fact(&negated(fact2("can", "Penguin", "Fly")))
        .unwrap();

    let result = session.execute(
        &st("can", vec![ident("Penguin"), hole("x")]),
        &QueryOptions::default(),
    );
    // `Fly` is blocked for Penguin specifically.
    assert!(result
        .all_results
        .iter()
        .all(|r| r.bindings["x"] != "Fly"));

    // Sparrow still inherits it.
    let sparrow = session.execute(
        &st("can", vec![ident("Sparrow"), hole("x")]),
        &QueryOptions::default(),
    );
    assert!(sparrow
        .all_results
        .iter()
        .any(|r| r.bindings["x"] == "Fly"));
}

#[test]
fn parent_type_negation_blocks_all_descendants() {
    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Rex", "Dog")).unwrap();
    session.add_fact(&fact2("isA", "Dog", "Pet")).unwrap();
    session.add_fact(&fact2("can", "Pet", "StayInside")).unwrap();
    // Negate at the intermediate type, not the instance.
    session
        .add_fact(&negated(fact2("can", "Dog", "StayInside")))
        .unwrap();

    let result = session.execute(
        &st("can", vec![ident("Rex"), hole("x")]),
        &QueryOptions::default(),
    );
    assert!(result
        .all_results
        .iter()
        .all(|r| r.bindings["x"] != "StayInside"));
}

// ============================================================================
// By-value walk (downward)
// ============================================================================

#[test]
fn value_queries_descend_to_instances() {
    let mut session = bird_kb();
    let result = session.execute(
        &st("can", vec![hole("who"), ident("Fly")]),
        &QueryOptions::default(),
    );
    assert!(result.success);
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["who"].as_str())
        .collect();
    assert!(answers.contains(&"Penguin"));
    assert!(answers.contains(&"Sparrow"));
    let penguin = result
        .all_results
        .iter()
        .find(|r| r.bindings["who"] == "Penguin")
        .unwrap();
    assert_eq!(penguin.method, Method::PropertyInheritance);
    assert_eq!(penguin.inherited_from.as_deref(), Some("Bird"));
}

#[test]
fn value_walk_honours_subject_negations() {
    let mut session = bird_kb();
    session
        .add_fact(&negated(fact2("can", "Penguin", "Fly")))
        .unwrap();
    let result = session.execute(
        &st("can", vec![hole("who"), ident("Fly")]),
        &QueryOptions::default(),
    );
    let answers: Vec<&str> = result
        .all_results
        .iter()
        .map(|r| r.bindings["who"].as_str())
        .collect();
    assert!(!answers.contains(&"Penguin"));
    assert!(answers.contains(&"Sparrow"));
}

#[test]
fn non_inheritable_relations_skip_the_walk() {
    let mut session = Session::new();
    session.add_fact(&fact2("isA", "Rex", "Dog")).unwrap();
    session.add_fact(&fact2("owns", "Dog", "Collar")).unwrap();

    let result = session.execute(
        &st("owns", vec![ident("Rex"), hole("x")]),
        &QueryOptions::default(),
    );
    // `owns` is not inheritable: Rex does not get Dog's collar.
    assert!(result
        .all_results
        .iter()
        .all(|r| r.method != Method::PropertyInheritance));
}

#[test]
fn dictionary_controls_the_inheritable_set() {
    let mut session = Session::new();
    session
        .load_relation_dictionary(
            "isA __TransitiveRelation\nwears __InheritableProperty\n",
        )
        .unwrap();
    session.add_fact(&fact2("isA", "Rex", "Dog")).unwrap();
    session.add_fact(&fact2("wears", "Dog", "Collar")).unwrap();

    let result = session.execute(
        &st("wears", vec![ident("Rex"), hole("x")]),
        &QueryOptions::default(),
    );
    assert!(result.success);
    assert_eq!(result.bindings["x"].answer, "Collar");
    assert_eq!(result.bindings["x"].method, Method::PropertyInheritance);
}
