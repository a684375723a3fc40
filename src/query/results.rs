//! Result model: method tags, scored results, the priority-aware merge
//! collector, and final `QueryResult` assembly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which reasoning source produced a result. Ordering between sources is
/// decided by [`Method::priority`], never by enum order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Direct,
    Transitive,
    PropertyInheritance,
    BundleCommon,
    CompoundCsp,
    RuleDerived,
    Hdc,
    Induced,
}

impl Method {
    /// The method-priority matrix. Higher wins on merge.
    pub fn priority(self) -> u8 {
        match self {
            Method::Direct => 7,
            Method::Transitive => 6,
            Method::PropertyInheritance => 5,
            Method::BundleCommon => 4,
            Method::CompoundCsp => 3,
            Method::RuleDerived => 2,
            Method::Hdc | Method::Induced => 1,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Method::Direct => "direct",
            Method::Transitive => "transitive",
            Method::PropertyInheritance => "property_inheritance",
            Method::BundleCommon => "bundle_common",
            Method::CompoundCsp => "compound_csp",
            Method::RuleDerived => "rule_derived",
            Method::Hdc => "hdc",
            Method::Induced => "induced",
        };
        write!(f, "{tag}")
    }
}

/// One scored candidate: hole-name → answer bindings plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub bindings: BTreeMap<String, String>,
    pub score: f32,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    /// For inherited properties: the ancestor the value came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

impl ScoredResult {
    /// Merge identity: the hole answers, independent of provenance.
    pub fn binding_key(&self) -> String {
        let parts: Vec<String> = self
            .bindings
            .iter()
            .map(|(hole, answer)| format!("{hole}={answer}"))
            .collect();
        parts.join("&")
    }
}

/// Primary binding for one hole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub answer: String,
    pub similarity: f32,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<String>,
}

/// Outcome of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub bindings: BTreeMap<String, Binding>,
    pub confidence: f32,
    pub ambiguous: bool,
    pub all_results: Vec<ScoredResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QueryResult {
    /// Soft failure with a reason and no bindings.
    pub fn failure(reason: impl Into<String>) -> Self {
        QueryResult {
            success: false,
            bindings: BTreeMap::new(),
            confidence: 0.0,
            ambiguous: false,
            all_results: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Empty miss without a dedicated reason.
    pub fn miss() -> Self {
        QueryResult {
            success: false,
            bindings: BTreeMap::new(),
            confidence: 0.0,
            ambiguous: false,
            all_results: Vec::new(),
            reason: None,
        }
    }
}

/// Collects results across sources, replacing same-binding entries only when
/// the newcomer's method has strictly higher priority.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Vec<ScoredResult>,
    by_key: std::collections::HashMap<String, usize>,
}

impl ResultCollector {
    pub fn new() -> Self {
        ResultCollector::default()
    }

    /// Offer a result to the pool.
    pub fn offer(&mut self, result: ScoredResult) {
        let key = result.binding_key();
        match self.by_key.get(&key) {
            Some(&slot) => {
                if result.method.priority() > self.results[slot].method.priority() {
                    self.results[slot] = result;
                }
            }
            None => {
                self.by_key.insert(key, self.results.len());
                self.results.push(result);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Drop results failing the predicate (modal / negation filters).
    pub fn retain(&mut self, mut keep: impl FnMut(&ScoredResult) -> bool) {
        self.results.retain(|result| keep(result));
        self.by_key.clear();
        for (slot, result) in self.results.iter().enumerate() {
            self.by_key.insert(result.binding_key(), slot);
        }
    }

    /// Stable sort by `(−priority, −score)`, optionally capped.
    pub fn into_ranked(self, max_results: Option<usize>) -> Vec<ScoredResult> {
        let mut results = self.into_results();
        rank(&mut results, max_results);
        results
    }

    /// The merged pool in offer order, for pre-rank filtering.
    pub fn into_results(self) -> Vec<ScoredResult> {
        self.results
    }
}

/// Stable sort by `(−priority, −score)` with an optional cap. Ties keep
/// their offer order, which is part of the result-order contract.
pub fn rank(results: &mut Vec<ScoredResult>, max_results: Option<usize>) {
    results.sort_by(|a, b| {
        b.method
            .priority()
            .cmp(&a.method.priority())
            .then_with(|| b.score.total_cmp(&a.score))
    });
    if let Some(cap) = max_results {
        results.truncate(cap);
    }
}

/// Assemble the final result: primary binding per hole with up to three
/// alternatives, confidence from the top score, ambiguity when the top two
/// scores sit within 0.1.
pub fn assemble(hole_names: &[String], ranked: Vec<ScoredResult>) -> QueryResult {
    if ranked.is_empty() {
        return QueryResult::miss();
    }
    let mut bindings = BTreeMap::new();
    for hole in hole_names {
        let Some(top) = ranked.iter().find(|result| result.bindings.contains_key(hole)) else {
            continue;
        };
        let answer = top.bindings[hole].clone();
        let mut alternatives = Vec::new();
        for other in &ranked {
            if alternatives.len() >= 3 {
                break;
            }
            if let Some(candidate) = other.bindings.get(hole) {
                if candidate != &answer && !alternatives.contains(candidate) {
                    alternatives.push(candidate.clone());
                }
            }
        }
        bindings.insert(
            hole.clone(),
            Binding {
                answer,
                similarity: top.score,
                method: top.method,
                steps: top.steps.clone(),
                alternatives,
                inherited_from: top.inherited_from.clone(),
            },
        );
    }

    let confidence = ranked[0].score;
    let ambiguous = ranked.len() >= 2 && (confidence - ranked[1].score) < 0.1;
    QueryResult {
        success: !bindings.is_empty(),
        bindings,
        confidence,
        ambiguous,
        all_results: ranked,
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(hole: &str, answer: &str, method: Method, score: f32) -> ScoredResult {
        let mut bindings = BTreeMap::new();
        bindings.insert(hole.to_string(), answer.to_string());
        ScoredResult {
            bindings,
            score,
            method,
            steps: Vec::new(),
            depth: None,
            inherited_from: None,
        }
    }

    #[test]
    fn higher_priority_replaces_same_binding() {
        let mut collector = ResultCollector::new();
        collector.offer(result("x", "Mary", Method::Hdc, 0.9));
        collector.offer(result("x", "Mary", Method::Direct, 1.0));
        let ranked = collector.into_ranked(None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].method, Method::Direct);
    }

    #[test]
    fn lower_priority_duplicate_is_discarded() {
        let mut collector = ResultCollector::new();
        collector.offer(result("x", "Mary", Method::Direct, 1.0));
        collector.offer(result("x", "Mary", Method::Hdc, 0.99));
        let ranked = collector.into_ranked(None);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].method, Method::Direct);
    }

    #[test]
    fn ranking_orders_by_priority_then_score() {
        let mut collector = ResultCollector::new();
        collector.offer(result("x", "A", Method::RuleDerived, 0.85));
        collector.offer(result("x", "B", Method::Transitive, 0.80));
        collector.offer(result("x", "C", Method::Transitive, 0.85));
        let ranked = collector.into_ranked(None);
        let answers: Vec<&str> = ranked.iter().map(|r| r.bindings["x"].as_str()).collect();
        assert_eq!(answers, vec!["C", "B", "A"]);
    }

    #[test]
    fn assemble_attaches_up_to_three_alternatives() {
        let ranked = vec![
            result("x", "A", Method::Direct, 1.0),
            result("x", "B", Method::Transitive, 0.85),
            result("x", "C", Method::Transitive, 0.80),
            result("x", "D", Method::RuleDerived, 0.85),
            result("x", "E", Method::Hdc, 0.5),
        ];
        let out = assemble(&["x".to_string()], ranked);
        let binding = &out.bindings["x"];
        assert_eq!(binding.answer, "A");
        assert_eq!(binding.alternatives, vec!["B", "C", "D"]);
    }

    #[test]
    fn ambiguity_requires_two_close_scores() {
        let out = assemble(
            &["x".to_string()],
            vec![
                result("x", "A", Method::Transitive, 0.85),
                result("x", "B", Method::Transitive, 0.80),
            ],
        );
        assert!(out.ambiguous);

        let out = assemble(
            &["x".to_string()],
            vec![
                result("x", "A", Method::Direct, 1.0),
                result("x", "B", Method::Hdc, 0.4),
            ],
        );
        assert!(!out.ambiguous);
    }

    #[test]
    fn cap_truncates_after_ranking() {
        let mut collector = ResultCollector::new();
        collector.offer(result("x", "A", Method::Hdc, 0.5));
        collector.offer(result("x", "B", Method::Direct, 1.0));
        let ranked = collector.into_ranked(Some(1));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].bindings["x"], "B");
    }
}
