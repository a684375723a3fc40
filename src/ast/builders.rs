//! Short constructors for programmatic statement building.
//!
//! Tests and meta-operator pipelines assemble statements constantly; these
//! keep call sites readable:
//!
//! ```
//! use noetic::ast::builders::{st, ident, hole};
//!
//! let query = st("isA", vec![ident("Rex"), hole("x")]);
//! assert_eq!(query.canonical_key(), "isA Rex ?x");
//! ```

use super::{ArgTerm, Statement};

/// Build a statement from an operator and args.
pub fn st(operator: &str, args: Vec<ArgTerm>) -> Statement {
    Statement::new(operator, args)
}

/// Ground identifier term.
pub fn ident(name: &str) -> ArgTerm {
    ArgTerm::Ident(name.to_string())
}

/// Variable term. Accepts the name with or without the leading `$`.
pub fn var(name: &str) -> ArgTerm {
    if let Some(stripped) = name.strip_prefix('$') {
        ArgTerm::Variable(format!("${stripped}"))
    } else {
        ArgTerm::Variable(format!("${name}"))
    }
}

/// Query hole term.
pub fn hole(name: &str) -> ArgTerm {
    ArgTerm::Hole(name.trim_start_matches('?').to_string())
}

/// Nested compound term.
pub fn comp(inner: Statement) -> ArgTerm {
    ArgTerm::Compound(Box::new(inner))
}

/// Reference term (`@name`).
pub fn reference(name: &str) -> ArgTerm {
    ArgTerm::Reference(name.trim_start_matches('@').to_string())
}

/// Binary ground statement, the most common fact shape.
pub fn fact2(operator: &str, subject: &str, object: &str) -> Statement {
    st(operator, vec![ident(subject), ident(object)])
}

/// `Not`-wrapped statement for negations.
pub fn negated(inner: Statement) -> Statement {
    st("Not", vec![comp(inner)])
}
