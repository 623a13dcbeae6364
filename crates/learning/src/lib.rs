//! Adaptive learning from confirmed and rejected matches.
//!
//! Keeps two kinds of evidence:
//! - Pattern counts: digit-generalized reference shape → path shape
//! - Term relationships: weighted edges between reference and path terms
//!
//! and turns them into a bounded bonus blended into the base score at the
//! current `learned` weight.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use docmatch_features::{basename, generalize, tokenize};
use docmatch_model::{LearningStatistics, ScoredCandidate, ScoringWeights};
use docmatch_rerank::ScoreEnhancer;
use serde::{Deserialize, Serialize};

mod snapshot;

pub use snapshot::{
    ImportError, ImportReport, LearningSnapshot, PatternEntry, TermMapping, SNAPSHOT_VERSION,
};

/// Configuration for the learning store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Match history ring buffer size
    pub history_capacity: usize,
    /// Matches required before the learned weight may grow
    pub weight_update_threshold: u64,
    /// Success rate required before the learned weight may grow
    pub success_rate_threshold: f64,
    /// Upper bound for the learned weight
    pub learned_weight_ceiling: f64,
    /// Matches past the threshold at which the ceiling is fully reachable
    pub weight_saturation_matches: u64,
    pub pattern_bonus_cap: f64,
    pub pattern_bonus_scale: f64,
    pub term_bonus_cap: f64,
    pub term_bonus_scale: f64,
    /// Term weight increment on confirmation
    pub confirm_step: f64,
    /// Term weight decrement on rejection
    pub reject_step: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            weight_update_threshold: 50,
            success_rate_threshold: 0.8,
            learned_weight_ceiling: 0.4,
            weight_saturation_matches: 450,
            pattern_bonus_cap: 0.15,
            pattern_bonus_scale: 0.03,
            term_bonus_cap: 0.15,
            term_bonus_scale: 0.05,
            confirm_step: 0.1,
            reject_step: 0.05,
        }
    }
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub reference: String,
    pub path: String,
    pub score: f64,
    pub confirmed: bool,
    /// Sibling candidate recorded as an implicit negative
    #[serde(default)]
    pub implicit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Learned contribution for one (reference, path) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedBonus {
    pub pattern_bonus: f64,
    pub term_bonus: f64,
}

impl LearnedBonus {
    pub fn total(&self) -> f64 {
        self.pattern_bonus + self.term_bonus
    }
}

/// Summary exposed to callers; stable across export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsReport {
    pub statistics: LearningStatistics,
    pub weights: ScoringWeights,
    pub success_rate: f64,
    /// Number of (reference pattern, path pattern) pairs
    pub pattern_count: usize,
    pub term_relationship_count: usize,
}

type TermEdge = (String, String);

fn edge(a: &str, b: &str) -> TermEdge {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Accumulated learning state.
#[derive(Debug, Clone)]
pub struct LearningStore {
    config: LearningConfig,
    statistics: LearningStatistics,
    weights: ScoringWeights,
    patterns: HashMap<String, HashMap<String, i64>>,
    terms: HashMap<TermEdge, f64>,
    history: VecDeque<HistoryEntry>,
}

impl Default for LearningStore {
    fn default() -> Self {
        Self::new(LearningConfig::default())
    }
}

impl LearningStore {
    pub fn new(config: LearningConfig) -> Self {
        Self {
            config,
            statistics: LearningStatistics::default(),
            weights: ScoringWeights::default(),
            patterns: HashMap::new(),
            terms: HashMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Record a confirmed or rejected pairing.
    pub fn record_match(&mut self, reference: &str, path: &str, score: f64, confirmed: bool) {
        if reference.trim().is_empty() || path.trim().is_empty() {
            tracing::warn!(reference, path, "Ignoring sample with empty reference or path");
            return;
        }
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };

        let stats = &mut self.statistics;
        stats.total_matches += 1;
        if confirmed {
            stats.successful_matches += 1;
        } else {
            stats.failed_matches += 1;
        }
        stats.average_confidence +=
            (score - stats.average_confidence) / stats.total_matches as f64;

        self.apply_sample(reference, path, confirmed);
        self.push_history(reference, path, score, confirmed, false);
        self.update_weights();

        tracing::debug!(
            reference,
            path,
            confirmed,
            total = self.statistics.total_matches,
            learned_weight = self.weights.learned,
            "Recorded match"
        );
    }

    /// Record an unchosen sibling candidate as a negative sample.
    ///
    /// Pattern and term evidence is updated; the success counters are not.
    pub fn record_negative_sample(&mut self, reference: &str, path: &str, score: f64) {
        if reference.trim().is_empty() || path.trim().is_empty() {
            return;
        }
        self.apply_sample(reference, path, false);
        self.push_history(reference, path, score.clamp(0.0, 1.0), false, true);
    }

    fn apply_sample(&mut self, reference: &str, path: &str, confirmed: bool) {
        let delta = if confirmed { 1 } else { -1 };
        let ref_pattern = generalize(reference);
        let path_pattern = generalize(basename(path));
        // Strings that clean to nothing carry no shape to learn.
        if !ref_pattern.is_empty() && !path_pattern.is_empty() {
            *self
                .patterns
                .entry(ref_pattern)
                .or_default()
                .entry(path_pattern)
                .or_insert(0) += delta;
        }

        let ref_terms = tokenize(reference);
        let path_terms = tokenize(path);
        for a in &ref_terms {
            for b in &path_terms {
                let key = edge(a, b);
                if confirmed {
                    let weight = self.terms.entry(key).or_insert(0.0);
                    *weight = (*weight + self.config.confirm_step).min(1.0);
                } else if let Some(weight) = self.terms.get_mut(&key) {
                    *weight = (*weight - self.config.reject_step).max(0.0);
                }
            }
        }
    }

    fn push_history(&mut self, reference: &str, path: &str, score: f64, confirmed: bool, implicit: bool) {
        self.history.push_back(HistoryEntry {
            reference: reference.to_string(),
            path: path.to_string(),
            score,
            confirmed,
            implicit,
            timestamp: Utc::now(),
        });
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    /// Raise the learned weight once there is enough successful history.
    ///
    /// The target grows with data volume past the threshold and with the
    /// margin of the success rate over its threshold; it never decreases.
    pub fn update_weights(&mut self) {
        let cfg = &self.config;
        let total = self.statistics.total_matches;
        let rate = self.statistics.success_rate();
        if total <= cfg.weight_update_threshold || rate <= cfg.success_rate_threshold {
            return;
        }

        let volume = ((total - cfg.weight_update_threshold) as f64
            / cfg.weight_saturation_matches.max(1) as f64)
            .min(1.0);
        let margin = ((rate - cfg.success_rate_threshold)
            / (1.0 - cfg.success_rate_threshold).max(f64::EPSILON))
        .clamp(0.0, 1.0);

        let floor = ScoringWeights::default().learned;
        let ceiling = cfg.learned_weight_ceiling.max(floor);
        let target = floor + (ceiling - floor) * volume * margin;

        if target > self.weights.learned {
            self.weights.rebalance(target);
        }
    }

    /// Learned bonus for a pair, without blending.
    pub fn learned_bonus(&self, reference: &str, path: &str) -> LearnedBonus {
        self.bonus_for(&generalize(reference), &tokenize(reference), path)
    }

    fn bonus_for(&self, ref_pattern: &str, ref_terms: &[String], path: &str) -> LearnedBonus {
        let cfg = &self.config;

        let count = self
            .patterns
            .get(ref_pattern)
            .and_then(|paths| paths.get(&generalize(basename(path))))
            .copied()
            .unwrap_or(0);
        let pattern_bonus = if count > 0 {
            (((count + 1) as f64).ln() * cfg.pattern_bonus_scale).min(cfg.pattern_bonus_cap)
        } else {
            0.0
        };

        let path_terms = tokenize(path);
        let strength: f64 = ref_terms
            .iter()
            .flat_map(|a| path_terms.iter().map(move |b| edge(a, b)))
            .filter_map(|key| self.terms.get(&key))
            .sum();
        let term_bonus = (strength * cfg.term_bonus_scale).min(cfg.term_bonus_cap);

        LearnedBonus {
            pattern_bonus,
            term_bonus,
        }
    }

    fn blend(&self, base: f64, bonus: &LearnedBonus) -> f64 {
        let learned = self.weights.learned;
        (base * (1.0 - learned) + bonus.total() * learned).clamp(0.0, 1.0)
    }

    /// Blend the learned bonus into a base score.
    pub fn enhance_score(&self, reference: &str, path: &str, base: f64) -> (f64, LearnedBonus) {
        let bonus = self.learned_bonus(reference, path);
        (self.blend(base, &bonus), bonus)
    }

    /// Current weight of the relationship between two terms.
    pub fn term_weight(&self, a: &str, b: &str) -> Option<f64> {
        self.terms.get(&edge(a, b)).copied()
    }

    /// Signed count for a (reference, path) pattern pair.
    pub fn pattern_count(&self, reference: &str, path: &str) -> i64 {
        self.patterns
            .get(&generalize(reference))
            .and_then(|paths| paths.get(&generalize(basename(path))))
            .copied()
            .unwrap_or(0)
    }

    pub fn statistics(&self) -> StatisticsReport {
        StatisticsReport {
            statistics: self.statistics.clone(),
            weights: self.weights,
            success_rate: self.statistics.success_rate(),
            pattern_count: self.patterns.values().map(HashMap::len).sum(),
            term_relationship_count: self.terms.len(),
        }
    }

    /// Clear all learned state back to defaults.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Self::new(config);
        tracing::info!("Learning state reset");
    }
}

impl ScoreEnhancer for LearningStore {
    fn name(&self) -> &'static str {
        "learning"
    }

    fn enhance(&self, reference: &str, results: &mut [ScoredCandidate]) {
        let ref_pattern = generalize(reference);
        let ref_terms = tokenize(reference);
        for result in results.iter_mut() {
            let bonus = self.bonus_for(&ref_pattern, &ref_terms, &result.path);
            let score = self.blend(result.score, &bonus);
            result.breakdown.pattern_bonus = bonus.pattern_bonus;
            result.breakdown.term_bonus = bonus.term_bonus;
            result.breakdown.learned_score = Some(score);
            result.score = score;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmatch_model::{ScoreBreakdown, WEIGHT_TOLERANCE};
    use pretty_assertions::assert_eq;

    const REF: &str = "Exhibit A5-01 Claimant Letter";
    const PATH: &str = "bundle/A5-01 Claimant Letter.pdf";

    #[test]
    fn test_record_updates_statistics() {
        let mut store = LearningStore::default();
        store.record_match(REF, PATH, 0.9, true);
        store.record_match(REF, "bundle/other.pdf", 0.3, false);

        let stats = store.statistics().statistics;
        assert_eq!(stats.total_matches, 2);
        assert_eq!(stats.successful_matches, 1);
        assert_eq!(stats.failed_matches, 1);
        assert!((stats.average_confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sample_ignored() {
        let mut store = LearningStore::default();
        store.record_match("", PATH, 0.9, true);
        store.record_match(REF, "  ", 0.9, true);
        assert_eq!(store.statistics().statistics.total_matches, 0);
    }

    #[test]
    fn test_weights_sum_to_one_after_every_record() {
        let mut store = LearningStore::default();
        for i in 0..300 {
            let confirmed = i % 10 != 0;
            store.record_match(&format!("Exhibit {i}"), &format!("docs/{i}.pdf"), 0.8, confirmed);
            assert!((store.weights().sum() - 1.0).abs() <= WEIGHT_TOLERANCE);
        }
        assert!(store.weights().learned > ScoringWeights::default().learned);
        assert!(store.weights().learned <= store.config().learned_weight_ceiling);
    }

    #[test]
    fn test_weights_unchanged_below_success_rate() {
        let mut store = LearningStore::default();
        for i in 0..100 {
            store.record_match(REF, PATH, 0.5, i % 2 == 0);
        }
        assert_eq!(store.weights(), ScoringWeights::default());
    }

    #[test]
    fn test_pattern_bonus_monotonic() {
        let mut store = LearningStore::default();
        let mut previous = store.learned_bonus(REF, PATH).pattern_bonus;
        for _ in 0..200 {
            store.record_match(REF, PATH, 0.9, true);
            let bonus = store.learned_bonus(REF, PATH).pattern_bonus;
            assert!(bonus >= previous);
            assert!(bonus <= store.config().pattern_bonus_cap);
            previous = bonus;
        }
        assert!(previous > 0.0);

        for _ in 0..300 {
            store.record_match(REF, PATH, 0.2, false);
            let bonus = store.learned_bonus(REF, PATH).pattern_bonus;
            assert!(bonus <= previous);
            previous = bonus;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_pattern_generalizes_digits() {
        let mut store = LearningStore::default();
        store.record_match(REF, PATH, 0.9, true);
        assert_eq!(
            store.pattern_count("Exhibit A7-12 Claimant Letter", "x/A7-12 Claimant Letter.pdf"),
            1
        );
    }

    #[test]
    fn test_shapeless_strings_not_learned_as_patterns() {
        let mut store = LearningStore::default();
        store.record_match("Exhibit 1", "docs/.pdf", 0.8, true);
        store.record_match("–", "docs/letter.pdf", 0.2, false);

        let report = store.statistics();
        assert_eq!(report.statistics.total_matches, 2);
        assert_eq!(report.pattern_count, 0);
    }

    #[test]
    fn test_term_weights_clamped() {
        let mut store = LearningStore::default();
        for _ in 0..15 {
            store.record_match(REF, PATH, 0.9, true);
        }
        assert_eq!(store.term_weight("claimant", "letter"), Some(1.0));
        assert_eq!(store.term_weight("letter", "claimant"), Some(1.0));

        for _ in 0..30 {
            store.record_match(REF, PATH, 0.1, false);
        }
        assert_eq!(store.term_weight("claimant", "letter"), Some(0.0));

        store.record_match("Invoice", "x/receipt.pdf", 0.1, false);
        assert_eq!(store.term_weight("invoice", "receipt"), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = LearningStore::new(LearningConfig {
            history_capacity: 5,
            ..Default::default()
        });
        for i in 0..8 {
            store.record_match(&format!("ref {i}"), &format!("p/{i}.pdf"), 0.5, true);
        }
        let refs: Vec<&str> = store.history().map(|h| h.reference.as_str()).collect();
        assert_eq!(refs, vec!["ref 3", "ref 4", "ref 5", "ref 6", "ref 7"]);
    }

    #[test]
    fn test_negative_sample_skips_counters() {
        let mut store = LearningStore::default();
        store.record_match(REF, PATH, 0.9, true);
        store.record_negative_sample(REF, "bundle/A5-01 Respondent Memo.pdf", 0.6);

        assert_eq!(store.statistics().statistics.total_matches, 1);
        assert_eq!(store.pattern_count(REF, "bundle/A5-01 Respondent Memo.pdf"), -1);
        assert!(store.history().last().unwrap().implicit);
    }

    #[test]
    fn test_enhancer_prefers_learned_path() {
        let mut store = LearningStore::default();
        store.record_match(REF, PATH, 0.9, true);

        let candidate = |path: &str, index| ScoredCandidate {
            path: path.to_string(),
            index,
            score: 0.5,
            breakdown: ScoreBreakdown {
                base_score: 0.5,
                ..Default::default()
            },
        };
        let mut results = vec![
            candidate("bundle/A5-02 Unrelated Memo.pdf", 0),
            candidate("bundle/A5-02 Claimant Letter.pdf", 1),
        ];
        store.enhance("Exhibit A5-02 Claimant Letter", &mut results);

        assert!(results[1].score > results[0].score);
        assert!(results[1].breakdown.pattern_bonus > 0.0);
        assert_eq!(results[1].breakdown.learned_score, Some(results[1].score));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut store = LearningStore::default();
        for _ in 0..5 {
            store.record_match(REF, PATH, 0.9, true);
        }
        store.reset();
        let report = store.statistics();
        assert_eq!(report.statistics, LearningStatistics::default());
        assert_eq!(report.weights, ScoringWeights::default());
        assert_eq!(report.pattern_count, 0);
        assert_eq!(store.history().count(), 0);
    }
}
