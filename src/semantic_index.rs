//! Relation dictionary and identifier classification.
//!
//! Relations carry property bits (`transitive`, `symmetric`, `inheritable`,
//! `functional`, `inverseOf`, declared arity) sourced from a textual
//! dictionary. When no dictionary is loaded a built-in default set applies.
//!
//! ## Dictionary format
//!
//! One relation per line, `#` starts a comment:
//!
//! ```text
//! isA      __TransitiveRelation arity=2
//! can      __InheritableProperty
//! near     __SymmetricRelation
//! causedBy inverseOf=causes
//! ```

use crate::ast::is_reserved;
use crate::error::EngineError;
use crate::fact_store::FactStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default transitive relations when no dictionary file is loaded.
pub const DEFAULT_TRANSITIVE: [&str; 11] = [
    "isA",
    "locatedIn",
    "partOf",
    "subclassOf",
    "containedIn",
    "before",
    "after",
    "causes",
    "appealsTo",
    "leadsTo",
    "enables",
];

const DEFAULT_INHERITABLE: [&str; 6] = ["can", "cannot", "must", "has", "hasProperty", "likes"];
const DEFAULT_SYMMETRIC: [&str; 3] = ["near", "marriedTo", "siblingOf"];

/// Modal operators; their result sets exclude type-classes.
pub const MODAL_OPERATORS: [&str; 3] = ["can", "must", "cannot"];

/// Property bits of one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationProps {
    pub transitive: bool,
    pub symmetric: bool,
    pub inheritable: bool,
    pub functional: bool,
    pub inverse_of: Option<String>,
    pub arity: Option<usize>,
}

/// Classifies relations by property bits and identifiers as
/// type-classes vs instances.
#[derive(Debug, Clone)]
pub struct SemanticIndex {
    relations: HashMap<String, RelationProps>,
}

impl Default for SemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticIndex {
    /// Index with the built-in default relation set.
    pub fn new() -> Self {
        let mut index = SemanticIndex::empty();
        for name in DEFAULT_TRANSITIVE {
            index.relations.entry(name.to_string()).or_default().transitive = true;
        }
        for name in DEFAULT_INHERITABLE {
            index.relations.entry(name.to_string()).or_default().inheritable = true;
        }
        for name in DEFAULT_SYMMETRIC {
            index.relations.entry(name.to_string()).or_default().symmetric = true;
        }
        index
            .relations
            .entry("causedBy".to_string())
            .or_default()
            .inverse_of = Some("causes".to_string());
        index
    }

    /// Index with no relations declared.
    pub fn empty() -> Self {
        SemanticIndex {
            relations: HashMap::new(),
        }
    }

    /// Parse a textual relation dictionary. Replaces the default set
    /// entirely; load the defaults first and merge manually if both are
    /// wanted.
    pub fn from_dictionary(text: &str) -> Result<Self, EngineError> {
        // Compiled per load, not per line; dictionary loads are rare.
        let name_re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let mut index = SemanticIndex::empty();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let name = tokens.next().unwrap_or("");
            if !name_re.is_match(name) {
                return Err(EngineError::Config(format!(
                    "relation dictionary line {}: invalid operator '{name}'",
                    line_no + 1
                )));
            }
            let props = index.relations.entry(name.to_string()).or_default();
            for token in tokens {
                match token {
                    "__TransitiveRelation" => props.transitive = true,
                    "__SymmetricRelation" => props.symmetric = true,
                    "__InheritableProperty" => props.inheritable = true,
                    "__FunctionalRelation" => props.functional = true,
                    _ => {
                        if let Some(other) = token.strip_prefix("inverseOf=") {
                            props.inverse_of = Some(other.to_string());
                        } else if let Some(n) = token.strip_prefix("arity=") {
                            let arity = n.parse::<usize>().map_err(|_| {
                                EngineError::Config(format!(
                                    "relation dictionary line {}: bad arity '{n}'",
                                    line_no + 1
                                ))
                            })?;
                            props.arity = Some(arity);
                        } else {
                            return Err(EngineError::Config(format!(
                                "relation dictionary line {}: unknown token '{token}'",
                                line_no + 1
                            )));
                        }
                    }
                }
            }
        }
        Ok(index)
    }

    /// Declare or update a relation programmatically.
    pub fn declare(&mut self, name: &str, props: RelationProps) {
        self.relations.insert(name.to_string(), props);
    }

    pub fn is_transitive(&self, operator: &str) -> bool {
        self.relations
            .get(operator)
            .is_some_and(|props| props.transitive)
    }

    pub fn is_inheritable_property(&self, operator: &str) -> bool {
        self.relations
            .get(operator)
            .is_some_and(|props| props.inheritable)
    }

    pub fn is_symmetric(&self, operator: &str) -> bool {
        self.relations
            .get(operator)
            .is_some_and(|props| props.symmetric)
    }

    pub fn is_functional(&self, operator: &str) -> bool {
        self.relations
            .get(operator)
            .is_some_and(|props| props.functional)
    }

    pub fn inverse_of(&self, operator: &str) -> Option<&str> {
        self.relations
            .get(operator)
            .and_then(|props| props.inverse_of.as_deref())
    }

    /// Declared arity, when the dictionary pins one.
    pub fn declared_arity(&self, operator: &str) -> Option<usize> {
        self.relations.get(operator).and_then(|props| props.arity)
    }

    /// Whether the dictionary has an entry for this operator.
    pub fn is_declared(&self, operator: &str) -> bool {
        self.relations.contains_key(operator)
    }

    /// Whether the operator's results must exclude type-classes.
    pub fn is_modal(operator: &str) -> bool {
        MODAL_OPERATORS.contains(&operator)
    }

    /// An identifier is a type-class when it appears as the object of any
    /// `isA` fact. Reserved identifiers are never type-classes.
    pub fn is_type_class(&self, identifier: &str, store: &FactStore) -> bool {
        if is_reserved(identifier) {
            return false;
        }
        store.get_with_arg("isA", 1, identifier).next().is_some()
    }

    /// Names of all transitive relations, for cache warm-up.
    pub fn transitive_relations(&self) -> impl Iterator<Item = &str> {
        self.relations
            .iter()
            .filter(|(_, props)| props.transitive)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ident;
    use crate::fact_store::{Fact, Partition, Polarity};
    use std::sync::Arc;

    fn store_with_isa(subject: &str, object: &str) -> FactStore {
        let mut store = FactStore::new();
        store.add(Fact {
            id: 0,
            operator: "isA".to_string(),
            args: vec![ident(subject), ident(object)],
            polarity: Polarity::Asserted,
            vector: Arc::new(vec![0.0]),
            inner: None,
            name: None,
            partition: Partition::Truth,
        });
        store
    }

    #[test]
    fn defaults_cover_the_standard_transitive_set() {
        let index = SemanticIndex::new();
        for name in DEFAULT_TRANSITIVE {
            assert!(index.is_transitive(name), "{name} should be transitive");
        }
        assert!(!index.is_transitive("owns"));
    }

    #[test]
    fn dictionary_round_trips_property_bits() {
        let text = "\
# test dictionary
isA __TransitiveRelation arity=2
can __InheritableProperty
near __SymmetricRelation
causedBy inverseOf=causes
";
        let index = SemanticIndex::from_dictionary(text).unwrap();
        assert!(index.is_transitive("isA"));
        assert_eq!(index.declared_arity("isA"), Some(2));
        assert!(index.is_inheritable_property("can"));
        assert!(index.is_symmetric("near"));
        assert_eq!(index.inverse_of("causedBy"), Some("causes"));
        assert!(!index.is_transitive("can"));
    }

    #[test]
    fn dictionary_rejects_unknown_tokens() {
        let result = SemanticIndex::from_dictionary("isA __Bogus\n");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn type_class_requires_an_isa_object_occurrence() {
        let index = SemanticIndex::new();
        let store = store_with_isa("Rex", "Dog");
        assert!(index.is_type_class("Dog", &store));
        assert!(!index.is_type_class("Rex", &store));
        assert!(!index.is_type_class("Not", &store));
    }

    #[test]
    fn modal_operators_are_fixed() {
        assert!(SemanticIndex::is_modal("can"));
        assert!(SemanticIndex::is_modal("cannot"));
        assert!(SemanticIndex::is_modal("must"));
        assert!(!SemanticIndex::is_modal("isA"));
    }
}
