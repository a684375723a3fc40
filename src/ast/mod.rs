//! # Statement IR - Canonical Term Types
//!
//! The internal statement shape consumed from the surface parser and used by
//! every reasoning component. A [`Statement`] is an operator plus N argument
//! terms; an [`ArgTerm`] is a tagged enum over identifiers, `$`-variables,
//! query holes, nested compound statements, and `@`-references.
//!
//! ## Builders
//!
//! For programmatic construction, see the [`builders`] module which provides
//! short constructors (`st`, `ident`, `var`, `hole`, `comp`, `reference`).

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub mod builders;

// ============================================================================
// Reserved identifiers
// ============================================================================

/// Logical connectives and constants. These can never appear as entities in
/// transitive chains or as type classes.
pub const RESERVED_IDENTIFIERS: [&str; 16] = [
    "Implies", "And", "Or", "Not", "ForAll", "Exists", "True", "False",
    "implies", "and", "or", "not", "forall", "exists", "true", "false",
];

/// Whether `name` is a reserved logical identifier.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_IDENTIFIERS.contains(&name)
}

// ============================================================================
// Core IR types
// ============================================================================

/// One argument position of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgTerm {
    /// Ground entity or relation identifier.
    Ident(String),
    /// Rule/query variable; the name includes the leading `$`.
    Variable(String),
    /// Query placeholder to be filled by the engine.
    Hole(String),
    /// Nested statement appearing as an argument.
    Compound(Box<Statement>),
    /// Named handle to a stored metadata record.
    Reference(String),
}

impl ArgTerm {
    /// The identifier name when this term is ground and atomic.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            ArgTerm::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this term contains no variables or holes.
    pub fn is_ground(&self) -> bool {
        match self {
            ArgTerm::Ident(_) | ArgTerm::Reference(_) => true,
            ArgTerm::Variable(_) | ArgTerm::Hole(_) => false,
            ArgTerm::Compound(inner) => inner.is_ground(),
        }
    }

    /// Canonical textual form, used for dedup keys and fact identity.
    pub fn canonical(&self) -> String {
        match self {
            ArgTerm::Ident(name) => name.clone(),
            ArgTerm::Variable(name) => name.clone(),
            ArgTerm::Hole(name) => format!("?{name}"),
            ArgTerm::Compound(inner) => format!("({})", inner.canonical_key()),
            ArgTerm::Reference(name) => format!("@{name}"),
        }
    }
}

impl fmt::Display for ArgTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// An operator applied to argument terms.
///
/// Doubles as the pattern type in rules: a pattern is a statement whose
/// arguments may be variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub operator: String,
    pub args: Vec<ArgTerm>,
}

/// Rule pattern alias. Same shape as [`Statement`]; variables allowed.
pub type Pattern = Statement;

impl Statement {
    /// Create a statement from parts.
    pub fn new(operator: impl Into<String>, args: Vec<ArgTerm>) -> Self {
        Statement {
            operator: operator.into(),
            args,
        }
    }

    /// Number of argument terms.
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Whether the statement contains no variables or holes (recursively).
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(ArgTerm::is_ground)
    }

    /// All variable names appearing anywhere in the statement.
    pub fn variables(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut HashSet<String>) {
        for arg in &self.args {
            match arg {
                ArgTerm::Variable(name) => {
                    out.insert(name.clone());
                }
                ArgTerm::Compound(inner) => inner.collect_variables(out),
                _ => {}
            }
        }
    }

    /// Hole slots as `(position, name)` pairs; positions are 1-based.
    pub fn holes(&self) -> Vec<(usize, String)> {
        self.args
            .iter()
            .enumerate()
            .filter_map(|(i, arg)| match arg {
                ArgTerm::Hole(name) => Some((i + 1, name.clone())),
                _ => None,
            })
            .collect()
    }

    /// Canonical identity key: operator followed by canonical args,
    /// space-separated. Two statements denote the same proposition iff their
    /// keys are equal.
    pub fn canonical_key(&self) -> String {
        if self.args.is_empty() {
            return self.operator.clone();
        }
        let args: Vec<String> = self.args.iter().map(ArgTerm::canonical).collect();
        format!("{} {}", self.operator, args.join(" "))
    }

    /// Structural validation: nonempty operator, and every compound argument
    /// valid recursively. Returns the offending description on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.operator.is_empty() {
            return Err("statement has an empty operator".to_string());
        }
        for arg in &self.args {
            match arg {
                ArgTerm::Ident(name) | ArgTerm::Variable(name) | ArgTerm::Reference(name) => {
                    if name.is_empty() {
                        return Err(format!(
                            "empty identifier in args of '{}'",
                            self.operator
                        ));
                    }
                }
                ArgTerm::Hole(_) => {}
                ArgTerm::Compound(inner) => inner.validate()?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key())
    }
}
