//! Versioned export/import of learned state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use docmatch_model::{LearningStatistics, ScoringWeights};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{edge, LearningStore};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Snapshot is not a JSON object")]
    NotAnObject,

    #[error("Invalid snapshot version: {0}")]
    InvalidVersion(String),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u64),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEntry {
    pub reference_pattern: String,
    pub path_pattern: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermMapping {
    pub reference_term: String,
    pub path_term: String,
    pub weight: f64,
}

/// Export document exchanged with the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSnapshot {
    pub version: u32,
    pub export_date: DateTime<Utc>,
    pub patterns: Vec<PatternEntry>,
    pub term_mappings: Vec<TermMapping>,
    pub statistics: LearningStatistics,
    pub weights: ScoringWeights,
}

/// Outcome of an import; entries that could not be read become warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub version: u64,
    pub patterns_imported: usize,
    pub term_mappings_imported: usize,
    pub warnings: Vec<String>,
}

impl LearningStore {
    /// Export learned state. Entries are sorted for stable output.
    pub fn export_snapshot(&self) -> LearningSnapshot {
        let mut patterns: Vec<PatternEntry> = self
            .patterns
            .iter()
            .flat_map(|(reference_pattern, paths)| {
                paths.iter().map(move |(path_pattern, count)| PatternEntry {
                    reference_pattern: reference_pattern.clone(),
                    path_pattern: path_pattern.clone(),
                    count: *count,
                })
            })
            .collect();
        patterns.sort_by(|a, b| {
            (&a.reference_pattern, &a.path_pattern).cmp(&(&b.reference_pattern, &b.path_pattern))
        });

        let mut term_mappings: Vec<TermMapping> = self
            .terms
            .iter()
            .map(|((a, b), weight)| TermMapping {
                reference_term: a.clone(),
                path_term: b.clone(),
                weight: *weight,
            })
            .collect();
        term_mappings.sort_by(|a, b| {
            (&a.reference_term, &a.path_term).cmp(&(&b.reference_term, &b.path_term))
        });

        LearningSnapshot {
            version: SNAPSHOT_VERSION,
            export_date: Utc::now(),
            patterns,
            term_mappings,
            statistics: self.statistics.clone(),
            weights: self.weights,
        }
    }

    /// Import from a JSON string.
    pub fn import_json(&mut self, json: &str) -> Result<ImportReport, ImportError> {
        let value: Value = serde_json::from_str(json)?;
        self.import_snapshot(value)
    }

    /// Replace learned state with an imported snapshot.
    ///
    /// Malformed entries are skipped with a warning. The snapshot is read
    /// into a draft and swapped in only once it has been fully read; on
    /// error the current state is untouched. History is cleared.
    pub fn import_snapshot(&mut self, value: Value) -> Result<ImportReport, ImportError> {
        let obj = value.as_object().ok_or(ImportError::NotAnObject)?;
        let mut report = ImportReport::default();

        report.version = match obj.get("version") {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| ImportError::InvalidVersion(v.to_string()))?,
            None => {
                report
                    .warnings
                    .push(format!("missing version, assuming {SNAPSHOT_VERSION}"));
                SNAPSHOT_VERSION as u64
            }
        };
        if report.version == 0 || report.version > SNAPSHOT_VERSION as u64 {
            return Err(ImportError::UnsupportedVersion(report.version));
        }

        let mut patterns: HashMap<String, HashMap<String, i64>> = HashMap::new();
        for entry in read_entries::<PatternEntry>(obj.get("patterns"), "patterns", &mut report.warnings) {
            if entry.reference_pattern.is_empty() || entry.path_pattern.is_empty() {
                report.warnings.push("patterns: skipped entry with empty pattern".to_string());
                continue;
            }
            *patterns
                .entry(entry.reference_pattern)
                .or_default()
                .entry(entry.path_pattern)
                .or_insert(0) += entry.count;
            report.patterns_imported += 1;
        }

        let mut terms = HashMap::new();
        for mapping in
            read_entries::<TermMapping>(obj.get("termMappings"), "termMappings", &mut report.warnings)
        {
            if mapping.reference_term.is_empty() || mapping.path_term.is_empty() {
                report.warnings.push("termMappings: skipped entry with empty term".to_string());
                continue;
            }
            if !mapping.weight.is_finite() {
                report.warnings.push(format!(
                    "termMappings: skipped non-finite weight for {}/{}",
                    mapping.reference_term, mapping.path_term
                ));
                continue;
            }
            terms.insert(
                edge(&mapping.reference_term, &mapping.path_term),
                mapping.weight.clamp(0.0, 1.0),
            );
            report.term_mappings_imported += 1;
        }

        let statistics = match obj.get("statistics") {
            Some(v) => match serde_json::from_value::<LearningStatistics>(v.clone()) {
                Ok(stats) if statistics_consistent(&stats) => stats,
                Ok(stats) => {
                    report.warnings.push(format!(
                        "statistics: inconsistent (total {}, successful {}, failed {}, average {}), using defaults",
                        stats.total_matches,
                        stats.successful_matches,
                        stats.failed_matches,
                        stats.average_confidence
                    ));
                    LearningStatistics::default()
                }
                Err(err) => {
                    report.warnings.push(format!("statistics: {err}"));
                    LearningStatistics::default()
                }
            },
            None => {
                report.warnings.push("statistics: missing".to_string());
                LearningStatistics::default()
            }
        };

        let weights = match obj.get("weights") {
            Some(v) => match serde_json::from_value::<ScoringWeights>(v.clone()) {
                Ok(w) if w.is_normalized() => w,
                Ok(w) => {
                    report
                        .warnings
                        .push(format!("weights: not normalized (sum {:.6}), using defaults", w.sum()));
                    ScoringWeights::default()
                }
                Err(err) => {
                    report.warnings.push(format!("weights: {err}"));
                    ScoringWeights::default()
                }
            },
            None => ScoringWeights::default(),
        };

        self.patterns = patterns;
        self.terms = terms;
        self.statistics = statistics;
        self.weights = weights;
        self.history.clear();

        tracing::info!(
            patterns = report.patterns_imported,
            terms = report.term_mappings_imported,
            warnings = report.warnings.len(),
            "Imported learning snapshot"
        );
        Ok(report)
    }
}

/// Counters add up and the average confidence is a valid score.
fn statistics_consistent(stats: &LearningStatistics) -> bool {
    stats.successful_matches.checked_add(stats.failed_matches) == Some(stats.total_matches)
        && (0.0..=1.0).contains(&stats.average_confidence)
}

fn read_entries<T: serde::de::DeserializeOwned>(
    value: Option<&Value>,
    field: &str,
    warnings: &mut Vec<String>,
) -> Vec<T> {
    let entries = match value {
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            warnings.push(format!("{field}: not an array"));
            return Vec::new();
        }
        None => return Vec::new(),
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| match serde_json::from_value(entry.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warnings.push(format!("{field}[{i}]: {err}"));
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn trained() -> LearningStore {
        let mut store = LearningStore::default();
        for i in 0..60 {
            store.record_match(
                &format!("Exhibit A5-{i:02} Claimant Letter"),
                &format!("bundle/A5-{i:02} Claimant Letter.pdf"),
                0.7 + (i % 3) as f64 * 0.1,
                i % 7 != 0,
            );
        }
        store
    }

    #[test]
    fn test_round_trip_statistics() {
        let store = trained();
        let value = serde_json::to_value(store.export_snapshot()).unwrap();

        let mut restored = LearningStore::default();
        let report = restored.import_snapshot(value).unwrap();
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(restored.statistics(), store.statistics());
    }

    #[test]
    fn test_round_trip_through_string() {
        let store = trained();
        let json = serde_json::to_string(&store.export_snapshot()).unwrap();

        let mut restored = LearningStore::default();
        restored.import_json(&json).unwrap();
        assert_eq!(restored.statistics(), store.statistics());
        assert_eq!(
            restored.learned_bonus("Exhibit B1-01 Claimant Letter", "x/B1-01 Claimant Letter.pdf"),
            store.learned_bonus("Exhibit B1-01 Claimant Letter", "x/B1-01 Claimant Letter.pdf")
        );
    }

    #[test]
    fn test_export_format_fields() {
        let value = serde_json::to_value(trained().export_snapshot()).unwrap();
        for field in ["version", "exportDate", "patterns", "termMappings", "statistics", "weights"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["version"], json!(1));
    }

    #[test]
    fn test_corrupt_entries_are_skipped() {
        let mut store = LearningStore::default();
        let report = store
            .import_snapshot(json!({
                "version": 1,
                "patterns": [
                    {"referencePattern": "exhibit a# #", "pathPattern": "a# # letter", "count": 3},
                    {"referencePattern": 5},
                    "junk"
                ],
                "termMappings": [
                    {"referenceTerm": "letter", "pathTerm": "claimant", "weight": 1.7},
                    {"referenceTerm": "memo"}
                ],
                "statistics": {"totalMatches": 3},
                "weights": {"word": 0.9, "character": 0.9, "learned": 0.9}
            }))
            .unwrap();

        assert_eq!(report.patterns_imported, 1);
        assert_eq!(report.term_mappings_imported, 1);
        // two bad patterns, one bad mapping, statistics, weights
        assert_eq!(report.warnings.len(), 5);

        assert_eq!(store.pattern_count("Exhibit A5-01", "x/A5-01 letter.pdf"), 3);
        assert_eq!(store.term_weight("claimant", "letter"), Some(1.0));
        assert_eq!(store.weights(), ScoringWeights::default());
    }

    #[test]
    fn test_round_trip_with_shapeless_samples() {
        let mut store = LearningStore::default();
        store.record_match("Exhibit 1", "docs/.pdf", 0.8, true);
        store.record_match("–", "docs/letter.pdf", 0.2, false);
        store.record_match("Exhibit 2", "docs/letter 2.pdf", 0.6, true);

        let value = serde_json::to_value(store.export_snapshot()).unwrap();
        let mut restored = LearningStore::default();
        let report = restored.import_snapshot(value).unwrap();

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(restored.statistics(), store.statistics());
    }

    #[test]
    fn test_inconsistent_statistics_replaced() {
        for statistics in [
            json!({"totalMatches": 2, "successfulMatches": 5, "failedMatches": 0, "averageConfidence": 0.5}),
            json!({"totalMatches": 2, "successfulMatches": 1, "failedMatches": 1, "averageConfidence": 1.7}),
        ] {
            let mut store = LearningStore::default();
            let report = store
                .import_snapshot(json!({"version": 1, "statistics": statistics}))
                .unwrap();

            assert_eq!(report.warnings.len(), 1, "{:?}", report.warnings);
            assert!(report.warnings[0].starts_with("statistics: inconsistent"));
            assert_eq!(store.statistics().statistics, LearningStatistics::default());
        }
    }

    #[test]
    fn test_fatal_import_leaves_state() {
        let mut store = trained();
        let before = store.statistics();

        assert!(matches!(
            store.import_snapshot(json!("not an object")),
            Err(ImportError::NotAnObject)
        ));
        assert!(matches!(
            store.import_snapshot(json!({"version": 99})),
            Err(ImportError::UnsupportedVersion(99))
        ));
        assert!(matches!(
            store.import_snapshot(json!({"version": "one"})),
            Err(ImportError::InvalidVersion(_))
        ));
        assert!(store.import_json("{not json").is_err());

        assert_eq!(store.statistics(), before);
    }
}
