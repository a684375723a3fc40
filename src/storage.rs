//! Fact and rule persistence.
//!
//! Facts serialise as newline-delimited JSON in either of two record forms:
//!
//! ```text
//! {"subject":"Rex","relation":"isA","object":"Dog"}
//! {"operator":"can","args":["Bird","Fly"],"polarity":"asserted"}
//! ```
//!
//! Loading accepts both forms per line. Argument strings round-trip through
//! the canonical term syntax, so compound arguments (`(can Penguin Fly)`),
//! references (`@name`) and negations survive a save/load cycle. Vectors
//! are never persisted; they reconstitute deterministically from the
//! identifiers on re-add.
//!
//! Malformed lines are skipped with a warning, never a panic.

use crate::ast::{ArgTerm, Statement};
use crate::error::EngineError;
use crate::fact_store::{Fact, Polarity};
use crate::rule_engine::Rule;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One persisted fact record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactRecord {
    /// Arity-2 convention.
    Triple {
        subject: String,
        relation: String,
        object: String,
    },
    /// Rich N-ary form with optional polarity.
    Nary {
        operator: String,
        args: Vec<String>,
        #[serde(default = "default_polarity")]
        polarity: Polarity,
    },
}

fn default_polarity() -> Polarity {
    Polarity::Asserted
}

impl FactRecord {
    /// Render a stored fact into its richest lossless record form.
    pub fn from_fact(fact: &Fact) -> FactRecord {
        FactRecord::Nary {
            operator: fact.operator.clone(),
            args: fact.args.iter().map(ArgTerm::canonical).collect(),
            polarity: fact.polarity,
        }
    }

    /// Rebuild the statement this record denotes.
    pub fn to_statement(&self) -> Result<Statement, EngineError> {
        match self {
            FactRecord::Triple {
                subject,
                relation,
                object,
            } => Ok(Statement::new(
                relation.clone(),
                vec![parse_term(subject)?, parse_term(object)?],
            )),
            FactRecord::Nary { operator, args, .. } => {
                let parsed: Result<Vec<ArgTerm>, EngineError> =
                    args.iter().map(|arg| parse_term(arg)).collect();
                Ok(Statement::new(operator.clone(), parsed?))
            }
        }
    }

    /// The record's polarity (triples are always asserted).
    pub fn polarity(&self) -> Polarity {
        match self {
            FactRecord::Triple { .. } => Polarity::Asserted,
            FactRecord::Nary { polarity, .. } => *polarity,
        }
    }
}

/// Parse one canonical-form term: `(op args…)` compound, `@name` reference,
/// `$name` variable, `?name` hole, otherwise identifier.
pub fn parse_term(source: &str) -> Result<ArgTerm, EngineError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(EngineError::InvalidInput("empty term".to_string()));
    }
    if let Some(rest) = source.strip_prefix('@') {
        return Ok(ArgTerm::Reference(rest.to_string()));
    }
    if source.starts_with('$') {
        return Ok(ArgTerm::Variable(source.to_string()));
    }
    if let Some(rest) = source.strip_prefix('?') {
        return Ok(ArgTerm::Hole(rest.to_string()));
    }
    if source.starts_with('(') {
        if !source.ends_with(')') {
            return Err(EngineError::InvalidInput(format!(
                "unbalanced compound term '{source}'"
            )));
        }
        let inner = &source[1..source.len() - 1];
        let tokens = split_top_level(inner)?;
        let mut iter = tokens.into_iter();
        let operator = iter
            .next()
            .ok_or_else(|| EngineError::InvalidInput("empty compound term".to_string()))?;
        let args: Result<Vec<ArgTerm>, EngineError> =
            iter.map(|token| parse_term(&token)).collect();
        return Ok(ArgTerm::Compound(Box::new(Statement::new(operator, args?))));
    }
    Ok(ArgTerm::Ident(source.to_string()))
}

/// Split on spaces at parenthesis depth zero.
fn split_top_level(source: &str) -> Result<Vec<String>, EngineError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in source.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    EngineError::InvalidInput(format!("unbalanced parens in '{source}'"))
                })?;
                current.push(ch);
            }
            ' ' if depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(EngineError::InvalidInput(format!(
            "unbalanced parens in '{source}'"
        )));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Write facts as NDJSON. Returns how many records were written.
pub fn save_facts<'a, W: Write>(
    writer: &mut W,
    facts: impl Iterator<Item = &'a Fact>,
) -> Result<usize, EngineError> {
    let mut written = 0;
    for fact in facts {
        let record = FactRecord::from_fact(fact);
        let line =
            serde_json::to_string(&record).map_err(|e| EngineError::Storage(e.to_string()))?;
        writeln!(writer, "{line}").map_err(|e| EngineError::Storage(e.to_string()))?;
        written += 1;
    }
    Ok(written)
}

/// Read NDJSON fact records. Malformed lines are skipped with a warning.
pub fn load_facts<R: BufRead>(reader: R) -> Result<Vec<Statement>, EngineError> {
    let mut statements = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EngineError::Storage(e.to_string()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: FactRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(line = line_no + 1, %err, "skipping malformed fact record");
                continue;
            }
        };
        let statement = match record.to_statement() {
            Ok(statement) => statement,
            Err(err) => {
                tracing::warn!(line = line_no + 1, %err, "skipping unparseable fact record");
                continue;
            }
        };
        // Negated records re-wrap in `Not` so re-adding restores polarity.
        if record.polarity() == Polarity::Negated && statement.operator != "Not" {
            statements.push(Statement::new(
                "Not",
                vec![ArgTerm::Compound(Box::new(statement))],
            ));
        } else {
            statements.push(statement);
        }
    }
    Ok(statements)
}

/// Save facts to a file path.
pub fn save_facts_to_path<'a>(
    path: &Path,
    facts: impl Iterator<Item = &'a Fact>,
) -> Result<usize, EngineError> {
    let file = File::create(path).map_err(|e| EngineError::Storage(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    let written = save_facts(&mut writer, facts)?;
    writer
        .flush()
        .map_err(|e| EngineError::Storage(e.to_string()))?;
    Ok(written)
}

/// Load facts from a file path.
pub fn load_facts_from_path(path: &Path) -> Result<Vec<Statement>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::Storage(e.to_string()))?;
    load_facts(BufReader::new(file))
}

/// Save rules as a JSON array.
pub fn save_rules_to_path(path: &Path, rules: &[Rule]) -> Result<(), EngineError> {
    let file = File::create(path).map_err(|e| EngineError::Storage(e.to_string()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), rules)
        .map_err(|e| EngineError::Storage(e.to_string()))
}

/// Load rules from a JSON array file.
pub fn load_rules_from_path(path: &Path) -> Result<Vec<Rule>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::Storage(e.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| EngineError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{comp, ident, st};

    #[test]
    fn both_record_forms_parse() {
        let input = "\
{\"subject\":\"Rex\",\"relation\":\"isA\",\"object\":\"Dog\"}
{\"operator\":\"can\",\"args\":[\"Bird\",\"Fly\"]}
";
        let statements = load_facts(input.as_bytes()).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].canonical_key(), "isA Rex Dog");
        assert_eq!(statements[1].canonical_key(), "can Bird Fly");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = "\
{\"subject\":\"Rex\",\"relation\":\"isA\",\"object\":\"Dog\"}
not json at all
{\"operator\":\"can\",\"args\":[\"Bird\",\"Fly\"]}
";
        let statements = load_facts(input.as_bytes()).unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn negated_records_rewrap_in_not() {
        let input = "{\"operator\":\"can\",\"args\":[\"Penguin\",\"Fly\"],\"polarity\":\"negated\"}\n";
        let statements = load_facts(input.as_bytes()).unwrap();
        assert_eq!(statements[0].canonical_key(), "Not (can Penguin Fly)");
    }

    #[test]
    fn compound_terms_round_trip_through_canonical_syntax() {
        let term = parse_term("(causes Rain (wet Grass))").unwrap();
        assert_eq!(term.canonical(), "(causes Rain (wet Grass))");
        let expected = comp(st(
            "causes",
            vec![ident("Rain"), comp(st("wet", vec![ident("Grass")]))],
        ));
        assert_eq!(term, expected);
    }

    #[test]
    fn unbalanced_parens_error() {
        assert!(parse_term("(causes Rain").is_err());
        assert!(split_top_level("a (b c").is_err());
    }

    #[test]
    fn sigils_select_term_kinds() {
        assert!(matches!(parse_term("@belief").unwrap(), ArgTerm::Reference(_)));
        assert!(matches!(parse_term("$x").unwrap(), ArgTerm::Variable(_)));
        assert!(matches!(parse_term("?x").unwrap(), ArgTerm::Hole(_)));
        assert!(matches!(parse_term("Dog").unwrap(), ArgTerm::Ident(_)));
    }
}
