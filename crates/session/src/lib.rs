//! Matching session: the single owner of ledger, learning and context state.
//!
//! A search snapshots the available pool into a [`ScoringJob`], base-scores
//! it (inline or on the blocking pool), then runs the learning and context
//! enhancers on the owning side. Confirmations update the ledger, feed the
//! learning store and the context tracker, and record the strongest unchosen
//! siblings of the last search as implicit negatives.

use std::collections::HashMap;

use docmatch_context::{ContextConfig, ContextTracker};
use docmatch_learning::{
    ImportError, ImportReport, LearningConfig, LearningSnapshot, LearningStore, StatisticsReport,
};
use docmatch_model::{Match, MatchError, MatchMethod, ScoredCandidate, SeriesGroup, SeriesSuggestion};
use docmatch_rerank::{finish, Pipeline, ScoreEnhancer, ScorerConfig};
use docmatch_series::{
    detect_patterns_with, find_path_pattern, generate_paths_for_series, PathTemplate, SeriesConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod ledger;
pub mod worker;

pub use ledger::MatchLedger;
pub use worker::{ScoredBatch, ScoringJob};

/// Configuration for a matching session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scorer: ScorerConfig,
    pub series: SeriesConfig,
    pub learning: LearningConfig,
    pub context: ContextConfig,
    /// Unchosen siblings recorded as negatives on confirm
    pub negative_samples: usize,
    /// Minimum final score for a sibling to count as a negative
    pub negative_sample_min_score: f64,
    /// Required lead of the top result over the runner-up in `auto_match`
    pub auto_match_margin: f64,
    /// Record a compensating negative when a match is removed
    pub unlearn_on_remove: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerConfig::default(),
            series: SeriesConfig::default(),
            learning: LearningConfig::default(),
            context: ContextConfig::default(),
            negative_samples: 3,
            negative_sample_min_score: 0.5,
            auto_match_margin: 0.1,
            unlearn_on_remove: false,
        }
    }
}

/// Learning report plus ledger counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatistics {
    #[serde(flatten)]
    pub learning: StatisticsReport,
    pub references: usize,
    pub matched_references: usize,
    pub candidates: usize,
    pub available_candidates: usize,
}

/// Template and generated pairings for one series group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPlan {
    pub template: PathTemplate,
    pub suggestions: Vec<SeriesSuggestion>,
}

/// Outcome of applying a series plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesApplication {
    pub applied: Vec<Match>,
    /// `(reference, reason)` for suggestions that were not applied
    pub skipped: Vec<(String, String)>,
}

pub struct MatchingSession {
    config: SessionConfig,
    ledger: MatchLedger,
    learning: LearningStore,
    context: ContextTracker,
    extra_stages: Vec<Box<dyn ScoreEnhancer + Send>>,
    last_results: HashMap<String, Vec<ScoredCandidate>>,
    latest_request: u64,
}

impl MatchingSession {
    pub fn new<R, P>(references: R, paths: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self::with_config(references, paths, SessionConfig::default())
    }

    pub fn with_config<R, P>(references: R, paths: P, config: SessionConfig) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let ledger = MatchLedger::new(references, paths);
        tracing::info!(
            references = ledger.references().len(),
            candidates = ledger.candidates().len(),
            "Session created"
        );
        Self {
            learning: LearningStore::new(config.learning.clone()),
            context: ContextTracker::new(config.context.clone()),
            config,
            ledger,
            extra_stages: Vec::new(),
            last_results: HashMap::new(),
            latest_request: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &MatchLedger {
        &self.ledger
    }

    pub fn learning(&self) -> &LearningStore {
        &self.learning
    }

    pub fn context(&self) -> &ContextTracker {
        &self.context
    }

    /// Append an enhancer that runs after learning and context.
    pub fn add_enhancer(&mut self, stage: Box<dyn ScoreEnhancer + Send>) {
        tracing::debug!(stage = stage.name(), "Added enhancer stage");
        self.extra_stages.push(stage);
    }

    /// Ranked candidates for a reference, scored inline.
    pub fn search(&mut self, reference: &str) -> Vec<ScoredCandidate> {
        let batch = self.begin_search(reference).run();
        self.finish_search(batch).unwrap_or_default()
    }

    /// Snapshot the available pool for off-thread scoring.
    ///
    /// Issuing a new request supersedes every earlier one.
    pub fn begin_search(&mut self, reference: &str) -> ScoringJob {
        self.latest_request += 1;
        ScoringJob {
            request_id: self.latest_request,
            reference: reference.to_string(),
            candidates: self
                .ledger
                .available_candidates()
                .map(|(index, path)| (index, path.to_string()))
                .collect(),
            weights: self.learning.weights(),
            floor: self.config.scorer.score_floor,
        }
    }

    /// Enhance and rank a scored batch.
    ///
    /// Returns `None` when a newer request has been issued since the batch's
    /// job was created. Paths used in the meantime are dropped.
    pub fn finish_search(&mut self, batch: ScoredBatch) -> Option<Vec<ScoredCandidate>> {
        if batch.request_id != self.latest_request {
            tracing::debug!(
                request_id = batch.request_id,
                latest = self.latest_request,
                "Discarding superseded search results"
            );
            return None;
        }

        let ScoredBatch {
            reference,
            mut results,
            ..
        } = batch;
        results.retain(|r| !self.ledger.is_path_used(&r.path));

        let results = {
            let mut pipeline = Pipeline::new()
                .with_stage(&self.learning)
                .with_stage(&self.context);
            for stage in &self.extra_stages {
                pipeline.push(&**stage);
            }
            finish(&reference, results, &pipeline, &self.config.scorer)
        };

        tracing::debug!(
            reference = %reference,
            results = results.len(),
            top = results.first().map(|r| r.score),
            "Search finished"
        );
        self.last_results.insert(reference, results.clone());
        Some(results)
    }

    /// Results of the most recent search for a reference.
    pub fn last_results(&self, reference: &str) -> Option<&[ScoredCandidate]> {
        self.last_results.get(reference).map(Vec::as_slice)
    }

    /// Confirm a pairing.
    pub fn confirm(
        &mut self,
        reference: &str,
        path: &str,
        score: f64,
        method: MatchMethod,
    ) -> Result<Match, MatchError> {
        let confirmed = self
            .ledger
            .insert(Match::new(reference, path, score, method))?
            .clone();

        self.learning
            .record_match(reference, path, confirmed.score, true);

        // The path is no longer available to any other reference.
        for results in self.last_results.values_mut() {
            results.retain(|c| c.path != path);
        }

        if let Some(siblings) = self.last_results.remove(reference) {
            let negatives = siblings
                .iter()
                .filter(|c| c.path != path && c.score >= self.config.negative_sample_min_score)
                .take(self.config.negative_samples);
            for sibling in negatives {
                self.learning
                    .record_negative_sample(reference, &sibling.path, sibling.score);
            }
        }

        self.context.record_confirmed(reference, path);

        tracing::info!(
            reference,
            path,
            score = confirmed.score,
            method = ?method,
            "Confirmed match"
        );
        Ok(confirmed)
    }

    /// Record an explicit rejection of a pairing.
    pub fn reject(&mut self, reference: &str, path: &str) -> Result<(), MatchError> {
        self.ledger.validate_pair(reference, path)?;

        let score = self
            .last_results
            .get(reference)
            .and_then(|results| results.iter().find(|c| c.path == path))
            .map(|c| c.score)
            .unwrap_or_else(|| docmatch_rerank::score(reference, path, &self.learning.weights()));
        self.learning.record_match(reference, path, score, false);

        if let Some(results) = self.last_results.get_mut(reference) {
            results.retain(|c| c.path != path);
        }
        tracing::info!(reference, path, "Rejected match");
        Ok(())
    }

    /// Pass on a reference; its top search result counts as a negative.
    ///
    /// Returns the path that was passed over, if the reference had results.
    pub fn skip(&mut self, reference: &str) -> Result<Option<String>, MatchError> {
        if !self.ledger.contains_reference(reference) {
            return Err(MatchError::Validation(format!("unknown reference: {reference}")));
        }

        let top = self
            .last_results
            .remove(reference)
            .and_then(|results| {
                results
                    .into_iter()
                    .find(|c| !self.ledger.is_path_used(&c.path))
            });
        let Some(top) = top else {
            return Ok(None);
        };

        self.learning
            .record_match(reference, &top.path, top.score, false);
        tracing::info!(reference, path = %top.path, "Skipped reference");
        Ok(Some(top.path))
    }

    /// Remove a confirmed match, releasing the reference and its path.
    pub fn remove(&mut self, reference: &str) -> Result<Match, MatchError> {
        let removed = self.ledger.remove(reference)?;
        if self.config.unlearn_on_remove {
            self.learning
                .record_negative_sample(&removed.reference, &removed.path, removed.score);
        }
        tracing::info!(reference, path = %removed.path, "Removed match");
        Ok(removed)
    }

    /// Series among the references that are still unmatched.
    pub fn bulk_detect_series(&self) -> Vec<SeriesGroup> {
        let unmatched: Vec<&str> = self.ledger.unmatched_references().collect();
        detect_patterns_with(&unmatched, &self.config.series)
    }

    /// Infer a path template for a group and generate its pairings.
    pub fn suggest_series(&self, group: &SeriesGroup) -> Option<SeriesPlan> {
        let template = find_path_pattern(
            group,
            self.ledger.available_candidates().map(|(_, path)| path),
            &self.learning.weights(),
            &self.config.series,
        )?;
        let suggestions = generate_paths_for_series(group, &template, &self.config.series);
        Some(SeriesPlan {
            template,
            suggestions,
        })
    }

    /// Confirm every suggestion whose path exists and is still available.
    pub fn apply_series(&mut self, plan: &SeriesPlan) -> SeriesApplication {
        let mut outcome = SeriesApplication::default();
        for suggestion in &plan.suggestions {
            let reason = if self.ledger.is_reference_matched(&suggestion.reference) {
                Some("reference already matched")
            } else if !self.ledger.contains_path(&suggestion.path) {
                Some("path not found")
            } else if self.ledger.is_path_used(&suggestion.path) {
                Some("path already used")
            } else {
                None
            };
            if let Some(reason) = reason {
                outcome
                    .skipped
                    .push((suggestion.reference.clone(), reason.to_string()));
                continue;
            }

            match self.confirm(
                &suggestion.reference,
                &suggestion.path,
                suggestion.confidence,
                MatchMethod::Pattern,
            ) {
                Ok(applied) => outcome.applied.push(applied),
                Err(err) => outcome
                    .skipped
                    .push((suggestion.reference.clone(), err.to_string())),
            }
        }

        tracing::info!(
            applied = outcome.applied.len(),
            skipped = outcome.skipped.len(),
            "Applied series"
        );
        outcome
    }

    /// Confirm each unmatched reference whose top result clears `threshold`
    /// and leads the runner-up by the configured margin.
    pub fn auto_match(&mut self, threshold: f64) -> Result<Vec<Match>, MatchError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MatchError::Validation(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }

        let pending: Vec<String> = self
            .ledger
            .unmatched_references()
            .map(str::to_string)
            .collect();

        let mut confirmed = Vec::new();
        for reference in pending {
            let results = self.search(&reference);
            let Some(top) = results.first() else {
                continue;
            };
            let runner_up = results.get(1).map_or(0.0, |c| c.score);
            if top.score < threshold || top.score - runner_up < self.config.auto_match_margin {
                continue;
            }
            confirmed.push(self.confirm(&reference, &top.path, top.score, MatchMethod::Auto)?);
        }
        Ok(confirmed)
    }

    pub fn export_learning_data(&self) -> LearningSnapshot {
        self.learning.export_snapshot()
    }

    /// Replace learned state from a snapshot document.
    pub fn import_learning_data(&mut self, value: Value) -> Result<ImportReport, ImportError> {
        let report = self.learning.import_snapshot(value)?;
        self.last_results.clear();
        Ok(report)
    }

    pub fn statistics(&self) -> SessionStatistics {
        SessionStatistics {
            learning: self.learning.statistics(),
            references: self.ledger.references().len(),
            matched_references: self.ledger.matches().len(),
            candidates: self.ledger.candidates().len(),
            available_candidates: self.ledger.available_count(),
        }
    }

    /// Forget learned state and session context. Matches are kept.
    pub fn reset_learning(&mut self) {
        self.learning.reset();
        self.context.reset();
        self.last_results.clear();
    }
}
