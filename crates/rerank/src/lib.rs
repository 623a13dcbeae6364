//! Scoring and ranking of candidate paths for a reference.
//!
//! Computes a base similarity for every available candidate, runs the
//! ordered enhancer pipeline (learning, context, ...) over the survivors and
//! returns them ranked.

use std::cmp::Ordering;

use docmatch_features::{basename, char_score, clean, word_score};
use docmatch_model::{ScoreBreakdown, ScoredCandidate, ScoringWeights};
use serde::{Deserialize, Serialize};

/// Configuration for the ranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Base scores below this are dropped before enhancement
    pub score_floor: f64,
    /// Maximum results returned per search
    pub max_results: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            score_floor: 0.05,
            max_results: 20,
        }
    }
}

/// A stage that adjusts scores after the base pass.
///
/// Stages see the surviving results of one search and may raise or lower
/// each `score`, recording their contribution in the breakdown.
pub trait ScoreEnhancer {
    /// Stage name for logging.
    fn name(&self) -> &'static str;

    fn enhance(&self, reference: &str, results: &mut [ScoredCandidate]);
}

/// Ordered list of enhancer stages, applied first to last.
#[derive(Default)]
pub struct Pipeline<'a> {
    stages: Vec<&'a dyn ScoreEnhancer>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage(mut self, stage: &'a dyn ScoreEnhancer) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: &'a dyn ScoreEnhancer) {
        self.stages.push(stage);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, reference: &str, results: &mut [ScoredCandidate]) {
        for stage in &self.stages {
            stage.enhance(reference, results);
            tracing::trace!(stage = stage.name(), results = results.len(), "Applied enhancer");
        }
    }
}

/// Word, character and blended base score for one pair.
pub fn score_breakdown(reference: &str, path: &str, weights: &ScoringWeights) -> ScoreBreakdown {
    if reference.trim().is_empty() || path.trim().is_empty() {
        return ScoreBreakdown::default();
    }

    let cleaned = clean(reference);
    if !cleaned.is_empty() && cleaned == clean(basename(path)) {
        return ScoreBreakdown {
            word_score: 1.0,
            char_score: 1.0,
            base_score: 1.0,
            ..Default::default()
        };
    }

    let word = word_score(reference, path);
    let character = char_score(reference, path);
    let lexical = weights.word + weights.character;
    let base = if lexical > 0.0 {
        (weights.word * word + weights.character * character) / lexical
    } else {
        0.0
    };

    ScoreBreakdown {
        word_score: word,
        char_score: character,
        base_score: base.clamp(0.0, 1.0),
        ..Default::default()
    }
}

/// Base similarity of a reference and a candidate path, in [0, 1].
pub fn score(reference: &str, path: &str, weights: &ScoringWeights) -> f64 {
    score_breakdown(reference, path, weights).base_score
}

/// Base-score every candidate, keeping those at or above `floor`.
///
/// Candidates are `(pool index, path)` pairs; the pass is pure and may run
/// off the owning thread.
pub fn score_pool<'p, I>(
    reference: &str,
    candidates: I,
    weights: &ScoringWeights,
    floor: f64,
) -> Vec<ScoredCandidate>
where
    I: IntoIterator<Item = (usize, &'p str)>,
{
    if reference.trim().is_empty() {
        return Vec::new();
    }

    candidates
        .into_iter()
        .filter_map(|(index, path)| {
            let breakdown = score_breakdown(reference, path, weights);
            (breakdown.base_score >= floor && breakdown.base_score > 0.0).then(|| ScoredCandidate {
                path: path.to_string(),
                index,
                score: breakdown.base_score,
                breakdown,
            })
        })
        .collect()
}

/// Sort by score descending; equal scores keep pool order.
pub fn sort_results(results: &mut [ScoredCandidate]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
}

/// Apply the pipeline to base-scored results, then sort and truncate.
pub fn finish(
    reference: &str,
    mut results: Vec<ScoredCandidate>,
    pipeline: &Pipeline<'_>,
    config: &ScorerConfig,
) -> Vec<ScoredCandidate> {
    pipeline.run(reference, &mut results);
    for result in &mut results {
        result.score = result.score.clamp(0.0, 1.0);
    }
    sort_results(&mut results);
    results.truncate(config.max_results);
    results
}

/// Rank candidates for a reference.
pub fn rank<'p, I>(
    reference: &str,
    candidates: I,
    weights: &ScoringWeights,
    pipeline: &Pipeline<'_>,
    config: &ScorerConfig,
) -> Vec<ScoredCandidate>
where
    I: IntoIterator<Item = (usize, &'p str)>,
{
    let results = score_pool(reference, candidates, weights, config.score_floor);
    finish(reference, results, pipeline, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pool(paths: &[&'static str]) -> Vec<(usize, &'static str)> {
        paths.iter().copied().enumerate().collect()
    }

    struct Boost(&'static str);

    impl ScoreEnhancer for Boost {
        fn name(&self) -> &'static str {
            "boost"
        }

        fn enhance(&self, _reference: &str, results: &mut [ScoredCandidate]) {
            for r in results.iter_mut().filter(|r| r.path == self.0) {
                r.score += 0.5;
            }
        }
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let weights = ScoringWeights::default();
        assert_eq!(score("Exhibit A5-01", "", &weights), 0.0);
        assert_eq!(score("", "folder/A5-01.pdf", &weights), 0.0);
        assert_eq!(score("   ", "folder/A5-01.pdf", &weights), 0.0);
    }

    #[test]
    fn test_identical_cleaned_scores_one() {
        let weights = ScoringWeights::default();
        assert_eq!(score("The Letter", "x/the_letter.PDF", &weights), 1.0);
    }

    #[test]
    fn test_rank_orders_by_score() {
        let weights = ScoringWeights::default();
        let paths = pool(&[
            "folder/unrelated-invoice.pdf",
            "folder/A5-02-letter.pdf",
            "folder/A5-03-letter.pdf",
        ]);
        let hits = rank(
            "Exhibit A5-02",
            paths,
            &weights,
            &Pipeline::new(),
            &ScorerConfig::default(),
        );
        assert_eq!(hits[0].path, "folder/A5-02-letter.pdf");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_ties_keep_pool_order() {
        let weights = ScoringWeights::default();
        let paths = pool(&["b/report.pdf", "a/report.pdf"]);
        let hits = rank("report", paths, &weights, &Pipeline::new(), &ScorerConfig::default());
        assert_eq!(hits[0].index, 0);
        assert_eq!(hits[1].index, 1);
    }

    #[test]
    fn test_floor_and_limit() {
        let weights = ScoringWeights::default();
        let config = ScorerConfig {
            score_floor: 0.05,
            max_results: 1,
        };
        let paths = pool(&["x/report-1.pdf", "x/report-2.pdf", "x/report-3.pdf"]);
        let hits = rank("report", paths, &weights, &Pipeline::new(), &config);
        assert_eq!(hits.len(), 1);

        let strict = ScorerConfig {
            score_floor: 0.99,
            max_results: 20,
        };
        let hits = rank("report", pool(&["x/zzzz.pdf"]), &weights, &Pipeline::new(), &strict);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_pipeline_runs_stages_and_clamps() {
        let weights = ScoringWeights::default();
        let paths = pool(&["x/report-1.pdf", "x/report-final-draft.pdf"]);

        let boost = Boost("x/report-final-draft.pdf");
        let pipeline = Pipeline::new().with_stage(&boost);
        assert_eq!(pipeline.names(), vec!["boost"]);
        let hits = rank("report", paths.clone(), &weights, &pipeline, &ScorerConfig::default());
        assert_eq!(hits[0].path, "x/report-final-draft.pdf");

        let boost = Boost("x/report-1.pdf");
        let pipeline = Pipeline::new().with_stage(&boost);
        let hits = rank("report", paths, &weights, &pipeline, &ScorerConfig::default());
        assert_eq!(hits[0].path, "x/report-1.pdf");
        assert_eq!(hits[0].score, 1.0);
    }
}
