//! # Hyperdimensional Vector Substrate
//!
//! Symbol table and vector oracle: every identifier maps to a stable dense
//! bipolar hypervector, derived deterministically from its name and the
//! configured geometry. Facts are encoded by binding each argument vector to
//! a positional role vector and bundling the results, so the encoding is a
//! pure function of `(operator, args, geometry)`.
//!
//! Callers treat vectors as opaque: all arithmetic goes through the
//! [`VectorOracle`] trait, which keeps the numeric kernel swappable and
//! testable with a stub.

use crate::ast::{ArgTerm, Statement};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

pub mod ann;

pub use ann::AnnIndex;

/// Opaque fixed-width hypervector handle. Immutable once interned.
pub type Hypervector = Arc<Vec<f32>>;

/// Capability surface of the vector kernel.
///
/// Implementations must be deterministic: `from_name` is a pure function of
/// `(name, geometry)`, and all operations are reproducible.
pub trait VectorOracle: Send + Sync {
    /// Vector dimension.
    fn geometry(&self) -> usize;

    /// Stable vector for an identifier; interned on first use.
    fn from_name(&self, name: &str) -> Hypervector;

    /// Elementwise binding (associates two vectors; self-inverse).
    fn bind(&self, a: &Hypervector, b: &Hypervector) -> Hypervector;

    /// Majority-rule superposition of several vectors.
    fn bundle(&self, parts: &[Hypervector]) -> Hypervector;

    /// Bind a vector to the role vector of an argument position.
    fn with_position(&self, v: &Hypervector, position: usize) -> Hypervector;

    /// Similarity in `[0, 1]`; ~0 for unrelated vectors, 1 for identical.
    fn similarity(&self, a: &Hypervector, b: &Hypervector) -> f32;
}

/// Default oracle: dense bipolar vectors with a shared intern table.
///
/// The intern table may be shared across sessions; entries are immutable
/// once created, so concurrent readers never observe a vector changing.
pub struct DenseOracle {
    geometry: usize,
    interned: DashMap<String, Hypervector>,
}

impl DenseOracle {
    /// Create an oracle with the given vector dimension.
    pub fn new(geometry: usize) -> Self {
        DenseOracle {
            geometry,
            interned: DashMap::new(),
        }
    }

    /// Number of interned symbols.
    pub fn interned_len(&self) -> usize {
        self.interned.len()
    }

    /// All interned `(name, vector)` pairs, snapshot order unspecified.
    pub fn interned_symbols(&self) -> Vec<(String, Hypervector)> {
        self.interned
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn seed_for(name: &str, geometry: usize) -> u64 {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes) ^ (geometry as u64)
    }
}

impl VectorOracle for DenseOracle {
    fn geometry(&self) -> usize {
        self.geometry
    }

    fn from_name(&self, name: &str) -> Hypervector {
        if let Some(existing) = self.interned.get(name) {
            return existing.clone();
        }
        let mut rng = StdRng::seed_from_u64(Self::seed_for(name, self.geometry));
        let vector: Vec<f32> = (0..self.geometry)
            .map(|_| if rng.gen::<bool>() { 1.0 } else { -1.0 })
            .collect();
        let vector = Arc::new(vector);
        self.interned
            .entry(name.to_string())
            .or_insert_with(|| vector.clone())
            .clone()
    }

    fn bind(&self, a: &Hypervector, b: &Hypervector) -> Hypervector {
        let out: Vec<f32> = a.iter().zip(b.iter()).map(|(x, y)| x * y).collect();
        Arc::new(out)
    }

    fn bundle(&self, parts: &[Hypervector]) -> Hypervector {
        if parts.is_empty() {
            return Arc::new(vec![0.0; self.geometry]);
        }
        let mut sums = vec![0.0f32; self.geometry];
        for part in parts {
            for (slot, value) in sums.iter_mut().zip(part.iter()) {
                *slot += value;
            }
        }
        let out: Vec<f32> = sums
            .into_iter()
            .map(|sum| if sum >= 0.0 { 1.0 } else { -1.0 })
            .collect();
        Arc::new(out)
    }

    fn with_position(&self, v: &Hypervector, position: usize) -> Hypervector {
        let role = self.from_name(&format!("__slot{position}"));
        self.bind(v, &role)
    }

    fn similarity(&self, a: &Hypervector, b: &Hypervector) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
            return 0.0;
        }
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

/// Encode a term. Variables and holes contribute nothing (they encode as a
/// zero vector so partially-ground statements can still be compared).
/// Unresolved references encode as their handle name, which matches nothing.
pub fn term_vector(
    oracle: &dyn VectorOracle,
    term: &ArgTerm,
    references: &HashMap<String, Statement>,
) -> Hypervector {
    match term {
        ArgTerm::Ident(name) => oracle.from_name(name),
        ArgTerm::Variable(_) | ArgTerm::Hole(_) => Arc::new(vec![0.0; oracle.geometry()]),
        ArgTerm::Compound(inner) => statement_vector(oracle, inner, references),
        ArgTerm::Reference(name) => match references.get(name) {
            Some(target) => statement_vector(oracle, target, references),
            None => oracle.from_name(&format!("@{name}")),
        },
    }
}

/// Encode a statement: role-bound operator and argument vectors, bundled.
/// Pure in `(operator, args, geometry)` for ground statements.
pub fn statement_vector(
    oracle: &dyn VectorOracle,
    stmt: &Statement,
    references: &HashMap<String, Statement>,
) -> Hypervector {
    let mut parts = Vec::with_capacity(stmt.args.len() + 1);
    parts.push(oracle.with_position(&oracle.from_name(&stmt.operator), 0));
    for (i, arg) in stmt.args.iter().enumerate() {
        if matches!(arg, ArgTerm::Variable(_) | ArgTerm::Hole(_)) {
            continue;
        }
        let vector = term_vector(oracle, arg, references);
        parts.push(oracle.with_position(&vector, i + 1));
    }
    oracle.bundle(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{fact2, hole, ident, st};

    fn refs() -> HashMap<String, Statement> {
        HashMap::new()
    }

    #[test]
    fn from_name_is_deterministic() {
        let a = DenseOracle::new(512);
        let b = DenseOracle::new(512);
        assert_eq!(a.from_name("Dog"), b.from_name("Dog"));
    }

    #[test]
    fn different_names_are_dissimilar() {
        let oracle = DenseOracle::new(2048);
        let dog = oracle.from_name("Dog");
        let cat = oracle.from_name("Cat");
        assert!(oracle.similarity(&dog, &cat) < 0.2);
        assert!((oracle.similarity(&dog, &dog) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn geometry_participates_in_the_seed() {
        let small = DenseOracle::new(512);
        let large = DenseOracle::new(1024);
        let a = small.from_name("Dog");
        let b = large.from_name("Dog");
        assert_ne!(a[..512.min(b.len())], b[..512]);
    }

    #[test]
    fn statement_vector_is_pure() {
        let oracle = DenseOracle::new(1024);
        let v1 = statement_vector(&oracle, &fact2("isA", "Rex", "Dog"), &refs());
        let v2 = statement_vector(&oracle, &fact2("isA", "Rex", "Dog"), &refs());
        assert_eq!(v1, v2);
    }

    #[test]
    fn argument_order_changes_the_encoding() {
        let oracle = DenseOracle::new(1024);
        let ab = statement_vector(&oracle, &fact2("parentOf", "A", "B"), &refs());
        let ba = statement_vector(&oracle, &fact2("parentOf", "B", "A"), &refs());
        assert!(oracle.similarity(&ab, &ba) < 0.9);
    }

    #[test]
    fn query_encoding_with_hole_resembles_full_fact() {
        let oracle = DenseOracle::new(2048);
        let full = statement_vector(&oracle, &fact2("owns", "John", "Mary"), &refs());
        let query = statement_vector(
            &oracle,
            &st("owns", vec![ident("John"), hole("who")]),
            &refs(),
        );
        let unrelated = statement_vector(&oracle, &fact2("owns", "Alice", "Bob"), &refs());
        assert!(oracle.similarity(&query, &full) > oracle.similarity(&query, &unrelated));
    }

    #[test]
    fn reference_encodes_as_its_target() {
        let oracle = DenseOracle::new(1024);
        let mut references = HashMap::new();
        references.insert("belief".to_string(), fact2("can", "Penguin", "Fly"));
        let via_ref = term_vector(&oracle, &ArgTerm::Reference("belief".into()), &references);
        let direct = statement_vector(&oracle, &fact2("can", "Penguin", "Fly"), &references);
        assert_eq!(via_ref, direct);
    }
}
