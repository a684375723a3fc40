//! # Noetic - Hybrid Neuro-Symbolic Knowledge Engine
//!
//! Stores typed propositional facts and rules, and answers queries by
//! composing several reasoning strategies under a single priority-ranked
//! result pipeline.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Statement IR (from the surface parser)
//!     ↓
//! [Session::execute]
//!     ↓
//! [Classify]            → knowns + holes
//!     ↓
//! [Meta-operators]      → similar / induce / analogy / abduce / … (if matched)
//!     ↓
//! [Source pipeline]     → direct → transitive → rules → inheritance
//!                         → elementOf → implies → CSP → bundle → vector
//!     ↓
//! [Merge]               → priority-aware replacement per binding
//!     ↓
//! [Filter]              → modal type-class + negation overrides
//!     ↓
//! [Rank + assemble]     → bindings, confidence, ambiguity, alternatives
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use noetic::{Session, QueryOptions};
//! use noetic::ast::builders::{fact2, hole, ident, st};
//!
//! let mut session = Session::new();
//! session.add_fact(&fact2("isA", "Rex", "GermanShepherd")).unwrap();
//! session.add_fact(&fact2("isA", "GermanShepherd", "Dog")).unwrap();
//!
//! let result = session.execute(
//!     &st("isA", vec![ident("Rex"), hole("x")]),
//!     &QueryOptions::default(),
//! );
//! assert!(result.success);
//! assert_eq!(result.bindings["x"].answer, "GermanShepherd");
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ast` | Statement IR: terms, patterns, canonical keys |
//! | `hdc` | Vector oracle, symbol interning, ANN index |
//! | `fact_store` | Indexed facts, partitions, `bundle_version` |
//! | `semantic_index` | Relation dictionary and classification |
//! | `transitive` | Cached edge graphs, BFS closure queries |
//! | `rule_engine` | Rules, unification, condition matching |
//! | `inheritance` | `isA` property inheritance (both directions) |
//! | `theory` | Snapshot layers for counter-factuals |
//! | `prove` | Backward prover |
//! | `query` | Orchestrator, merge, ranking |
//! | `meta_ops` | The ten meta-operator pipelines |
//! | `session` | Owning runtime state and public API |
//! | `storage` | NDJSON fact + JSON rule persistence |

pub mod ast;
pub mod config;
pub mod error;
pub mod execution;
pub mod fact_store;
pub mod hdc;
pub mod inheritance;
pub mod prove;
pub mod query;
pub mod rule_engine;
pub mod semantic_index;
pub mod session;
pub mod stats;
pub mod storage;
pub mod theory;
pub mod transitive;

mod meta_ops;

// Re-export the public surface.
pub use ast::{ArgTerm, Pattern, Statement};
pub use config::{Config, HdcStrategy};
pub use error::EngineError;
pub use execution::Deadline;
pub use fact_store::{Fact, FactId, FactStore, Partition, Polarity};
pub use hdc::{AnnIndex, DenseOracle, Hypervector, VectorOracle};
pub use prove::{ProofResult, ProveOptions};
pub use query::results::{Binding, Method, QueryResult, ScoredResult};
pub use query::QueryOptions;
pub use rule_engine::{ConditionNode, Rule, RuleEngine};
pub use semantic_index::{RelationProps, SemanticIndex};
pub use session::Session;
pub use stats::ReasoningStats;
pub use theory::{TheoryLayer, TheoryStack};
pub use transitive::{TransitiveHit, TransitivePair, TransitiveReasoner};
