//! Session: the owning runtime state.
//!
//! A session owns the fact store, rule engine, reference registry, edge
//! caches, theory stack, scope vectors, and statistics. It is
//! single-threaded cooperative: queries and mutations are synchronous, and
//! every mutation bumps the store's `bundle_version` so dependent caches
//! rebuild lazily. Multiple sessions may run in parallel threads; they share
//! nothing mutable (the vector oracle's intern table is append-only).
//!
//! ## Lifecycle
//!
//! 1. `Session::new()` / `Session::with_config(config)`
//! 2. `add_fact()` / `add_rule()` / `add_reference()`
//! 3. `execute()` / `direct_match()` / `prove()`
//! 4. `push_theory()` … `pop_theory()` for hypothetical reasoning

use crate::ast::{ArgTerm, Statement};
use crate::config::{Config, HdcStrategy};
use crate::error::EngineError;
use crate::execution::Deadline;
use crate::fact_store::{AddOutcome, Fact, FactId, FactStore, Partition, Polarity};
use crate::hdc::{statement_vector, AnnIndex, DenseOracle, Hypervector, VectorOracle};
use crate::prove::{ProofResult, ProveOptions, Prover};
use crate::query::results::QueryResult;
use crate::query::{EngineCtx, QueryOptions};
use crate::rule_engine::{Rule, RuleEngine};
use crate::semantic_index::SemanticIndex;
use crate::stats::ReasoningStats;
use crate::storage;
use crate::theory::TheoryStack;
use crate::transitive::TransitiveReasoner;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// One reasoning session. Unique owner of all mutable engine state.
pub struct Session {
    config: Config,
    oracle: Arc<dyn VectorOracle>,
    store: FactStore,
    rules: RuleEngine,
    references: HashMap<String, Statement>,
    transitive: TransitiveReasoner,
    semantic: SemanticIndex,
    theories: TheoryStack,
    scope: HashMap<String, Hypervector>,
    stats: ReasoningStats,
    ann: Option<AnnIndex>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// Session with default configuration (2048-dim exact strategy).
    pub fn new() -> Self {
        // The default config always validates.
        match Session::with_config(Config::default()) {
            Ok(session) => session,
            Err(_) => unreachable!("default config is valid"),
        }
    }

    /// Session from an explicit configuration.
    pub fn with_config(config: Config) -> Result<Self, EngineError> {
        config.validate()?;
        let oracle: Arc<dyn VectorOracle> = Arc::new(DenseOracle::new(config.vector.geometry));
        Session::with_oracle(config, oracle)
    }

    /// Session with a caller-provided vector oracle (stub oracles in tests,
    /// or an intern table shared across sessions).
    pub fn with_oracle(
        config: Config,
        oracle: Arc<dyn VectorOracle>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let ann = (config.query.hdc_strategy == HdcStrategy::Approximate).then(AnnIndex::new);
        tracing::info!(
            geometry = config.vector.geometry,
            strategy = ?config.query.hdc_strategy,
            "session created"
        );
        Ok(Session {
            config,
            oracle,
            store: FactStore::new(),
            rules: RuleEngine::new(),
            references: HashMap::new(),
            transitive: TransitiveReasoner::new(),
            semantic: SemanticIndex::new(),
            theories: TheoryStack::new(),
            scope: HashMap::new(),
            stats: ReasoningStats::default(),
            ann,
        })
    }

    /// Replace the relation dictionary from its textual format.
    pub fn load_relation_dictionary(&mut self, text: &str) -> Result<(), EngineError> {
        self.semantic = SemanticIndex::from_dictionary(text)?;
        self.transitive.clear();
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn semantic_index(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn stats(&self) -> &ReasoningStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn fact_count(&self) -> usize {
        self.store.len()
    }

    pub fn bundle_version(&self) -> u64 {
        self.store.bundle_version()
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules.rules()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Assert a ground statement as a fact. Re-assertion is an idempotent
    /// no-op returning the existing id.
    pub fn add_fact(&mut self, statement: &Statement) -> Result<FactId, EngineError> {
        self.add_fact_inner(statement, None)
    }

    /// Assert a fact under a stable handle name for `@`-references.
    pub fn add_named_fact(
        &mut self,
        name: &str,
        statement: &Statement,
    ) -> Result<FactId, EngineError> {
        self.add_fact_inner(statement, Some(name))
    }

    fn add_fact_inner(
        &mut self,
        statement: &Statement,
        name: Option<&str>,
    ) -> Result<FactId, EngineError> {
        let fact = self.make_fact(statement, name)?;
        let vector = fact.vector.clone();
        match self.store.add(fact) {
            AddOutcome::Added(id) => {
                if let Some(ann) = &self.ann {
                    ann.insert(id, &vector);
                }
                tracing::debug!(key = %statement.canonical_key(), id, "fact added");
                Ok(id)
            }
            AddOutcome::AlreadyPresent(id) => Ok(id),
        }
    }

    /// Retract a fact by statement identity. Returns whether anything was
    /// removed.
    pub fn retract(&mut self, statement: &Statement) -> Result<bool, EngineError> {
        let canonical = self.canonicalize(statement);
        let Some(fact) = self.store.get_by_key(&canonical.canonical_key()) else {
            return Ok(false);
        };
        let id = fact.id;
        self.store.remove(id);
        if let Some(ann) = &self.ann {
            ann.remove(id);
        }
        tracing::debug!(key = %canonical.canonical_key(), "fact retracted");
        Ok(true)
    }

    /// Whether an exact fact with this identity is stored.
    pub fn contains(&self, statement: &Statement) -> bool {
        let canonical = self.canonicalize(statement);
        self.store.get_by_key(&canonical.canonical_key()).is_some()
    }

    /// Register a rule. Fails on malformed rules (unbound conclusion
    /// variables).
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), EngineError> {
        self.rules.register(rule)
    }

    /// Register a named metadata record for `@`-references.
    pub fn add_reference(&mut self, name: &str, statement: Statement) -> Result<(), EngineError> {
        statement
            .validate()
            .map_err(EngineError::InvalidInput)?;
        self.references.insert(name.to_string(), statement);
        Ok(())
    }

    pub fn reference(&self, name: &str) -> Option<&Statement> {
        self.references.get(name)
    }

    /// Bind a named scope vector.
    pub fn set_scope(&mut self, name: &str, vector: Hypervector) {
        self.scope.insert(name.to_string(), vector);
    }

    pub fn scope(&self, name: &str) -> Option<&Hypervector> {
        self.scope.get(name)
    }

    fn make_fact(&self, statement: &Statement, name: Option<&str>) -> Result<Fact, EngineError> {
        statement
            .validate()
            .map_err(EngineError::InvalidInput)?;
        if !statement.is_ground() {
            return Err(EngineError::InvalidInput(format!(
                "facts must be ground: '{}'",
                statement.canonical_key()
            )));
        }

        let partition = if self.theories.depth() > 0 {
            Partition::Theory
        } else {
            Partition::Truth
        };

        // `Not`-wrapped facts carry the inner statement's vector so the
        // similarity-based negation path can match them.
        if statement.operator == "Not" {
            if statement.args.len() != 1 {
                return Err(EngineError::InvalidInput(
                    "Not takes exactly one argument".to_string(),
                ));
            }
            let inner = match &statement.args[0] {
                ArgTerm::Compound(inner) => (**inner).clone(),
                ArgTerm::Reference(ref_name) => self
                    .references
                    .get(ref_name)
                    .cloned()
                    .or_else(|| self.store.get_named(ref_name).map(Fact::statement))
                    .ok_or_else(|| EngineError::UnresolvedReference(ref_name.clone()))?,
                _ => {
                    return Err(EngineError::InvalidInput(
                        "Not requires a compound or reference argument".to_string(),
                    ))
                }
            };
            let vector = statement_vector(self.oracle.as_ref(), &inner, &self.references);
            return Ok(Fact {
                id: 0,
                operator: statement.operator.clone(),
                args: statement.args.clone(),
                polarity: Polarity::Negated,
                vector,
                inner: Some(inner),
                name: name.map(str::to_string),
                partition,
            });
        }

        if let Some(declared) = self.semantic.declared_arity(&statement.operator) {
            if declared != statement.arity() {
                return Err(EngineError::ArityMismatch {
                    operator: statement.operator.clone(),
                    declared,
                    actual: statement.arity(),
                });
            }
        }

        let canonical = self.canonicalize(statement);
        let vector = statement_vector(self.oracle.as_ref(), &canonical, &self.references);
        Ok(Fact {
            id: 0,
            operator: canonical.operator,
            args: canonical.args,
            polarity: Polarity::Asserted,
            vector,
            inner: None,
            name: name.map(str::to_string),
            partition,
        })
    }

    /// Order symmetric-relation argument pairs when canonicalization is on.
    fn canonicalize(&self, statement: &Statement) -> Statement {
        if self.config.query.canonicalization_enabled
            && self.semantic.is_symmetric(&statement.operator)
            && statement.args.len() == 2
        {
            if let (Some(a), Some(b)) = (statement.args[0].as_ident(), statement.args[1].as_ident())
            {
                if a > b {
                    return Statement::new(
                        statement.operator.clone(),
                        vec![statement.args[1].clone(), statement.args[0].clone()],
                    );
                }
            }
        }
        statement.clone()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn deadline(&self) -> Deadline {
        let wall = (self.config.limits.deadline_ms > 0)
            .then(|| Duration::from_millis(self.config.limits.deadline_ms));
        let steps = (self.config.limits.max_steps > 0).then_some(self.config.limits.max_steps);
        Deadline::new(wall, steps)
    }

    /// Execute a query. User errors come back as soft failures
    /// (`success: false` with a reason); no query mutates session facts.
    pub fn execute(&mut self, statement: &Statement, options: &QueryOptions) -> QueryResult {
        let canonical = self.canonicalize(statement);
        let deadline = self.deadline();
        let mut ctx = EngineCtx {
            store: &self.store,
            semantic: &self.semantic,
            rules: &self.rules,
            references: &self.references,
            oracle: self.oracle.as_ref(),
            transitive: &mut self.transitive,
            stats: &mut self.stats,
            deadline: &deadline,
            settings: &self.config.query,
            ann: self.ann.as_ref(),
            max_depth: self.config.limits.max_depth,
        };
        crate::query::execute(&mut ctx, &canonical, options)
    }

    /// Existence check for a hole-free statement.
    pub fn direct_match(&mut self, statement: &Statement) -> QueryResult {
        let canonical = self.canonicalize(statement);
        let deadline = self.deadline();
        let mut ctx = EngineCtx {
            store: &self.store,
            semantic: &self.semantic,
            rules: &self.rules,
            references: &self.references,
            oracle: self.oracle.as_ref(),
            transitive: &mut self.transitive,
            stats: &mut self.stats,
            deadline: &deadline,
            settings: &self.config.query,
            ann: self.ann.as_ref(),
            max_depth: self.config.limits.max_depth,
        };
        crate::query::direct_match(&mut ctx, &canonical)
    }

    /// Prove a ground goal through facts, transitive closure, and rules.
    pub fn prove(&mut self, goal: &Statement, options: &ProveOptions) -> ProofResult {
        let steps = (self.config.limits.max_steps > 0).then_some(self.config.limits.max_steps);
        let deadline = Deadline::new(options.timeout, steps);
        let mut prover = Prover {
            store: &self.store,
            semantic: &self.semantic,
            rules: &self.rules,
            transitive: &mut self.transitive,
            stats: &mut self.stats,
            deadline: &deadline,
            max_depth: options.max_depth,
        };
        prover.prove(goal)
    }

    // ========================================================================
    // Theory stack
    // ========================================================================

    /// Push a theory layer snapshotting the current facts and scope.
    pub fn push_theory(&mut self) -> u64 {
        self.push_theory_with(HashMap::new(), 0, HashMap::new())
    }

    /// Push a theory layer with dimension overrides and metadata. Overrides
    /// shadow scope entries until the layer pops.
    pub fn push_theory_with(
        &mut self,
        dimension_overrides: HashMap<String, Hypervector>,
        priority: i32,
        metadata: HashMap<String, String>,
    ) -> u64 {
        let id = self.theories.push(
            self.store.snapshot(),
            self.scope.clone(),
            dimension_overrides.clone(),
            priority,
            metadata,
        );
        for (name, vector) in dimension_overrides {
            self.scope.insert(name, vector);
        }
        self.store.touch();
        tracing::info!(layer = id, depth = self.theories.depth(), "theory pushed");
        id
    }

    /// Pop the most recent theory layer, restoring its snapshot verbatim.
    /// Returns whether a layer was popped.
    pub fn pop_theory(&mut self) -> bool {
        let Some(layer) = self.theories.pop() else {
            return false;
        };
        self.scope = layer.scope_snapshot().clone();
        let snapshot = layer.fact_snapshot().clone();
        self.restore_store(snapshot);
        tracing::info!(layer = layer.id, "theory popped");
        true
    }

    /// Discard the stack without rolling back; theory facts become truth.
    pub fn commit_theories(&mut self) -> usize {
        let discarded = self.theories.commit();
        if discarded > 0 {
            self.store.merge_theory_into_truth();
        }
        discarded
    }

    /// Roll back to the oldest snapshot and clear the stack.
    pub fn reset_theories(&mut self) -> bool {
        let Some(bottom) = self.theories.reset() else {
            return false;
        };
        self.scope = bottom.scope_snapshot().clone();
        let snapshot = bottom.fact_snapshot().clone();
        self.restore_store(snapshot);
        true
    }

    pub fn theory_depth(&self) -> usize {
        self.theories.depth()
    }

    fn restore_store(&mut self, snapshot: FactStore) {
        self.store.restore(snapshot);
        if let Some(ann) = &mut self.ann {
            // Rebuild the vector index against the restored fact set.
            *ann = AnnIndex::new();
            for fact in self.store.iter() {
                ann.insert(fact.id, &fact.vector);
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save all facts as NDJSON. Returns the record count.
    pub fn save_facts(&self, path: &Path) -> Result<usize, EngineError> {
        storage::save_facts_to_path(path, self.store.iter())
    }

    /// Load NDJSON facts, re-adding each (vectors reconstitute
    /// deterministically). Returns how many facts were added.
    pub fn load_facts(&mut self, path: &Path) -> Result<usize, EngineError> {
        let statements = storage::load_facts_from_path(path)?;
        let mut added = 0;
        for statement in statements {
            match self.add_fact(&statement) {
                Ok(_) => added += 1,
                Err(err) => {
                    tracing::warn!(key = %statement.canonical_key(), %err, "skipping persisted fact");
                }
            }
        }
        Ok(added)
    }

    /// Save registered rules as JSON.
    pub fn save_rules(&self, path: &Path) -> Result<(), EngineError> {
        storage::save_rules_to_path(path, self.rules.rules())
    }

    /// Load rules from JSON, registering each.
    pub fn load_rules(&mut self, path: &Path) -> Result<usize, EngineError> {
        let rules = storage::load_rules_from_path(path)?;
        let mut added = 0;
        for rule in rules {
            match self.rules.register(rule) {
                Ok(()) => added += 1,
                Err(err) => tracing::warn!(%err, "skipping persisted rule"),
            }
        }
        Ok(added)
    }
}
