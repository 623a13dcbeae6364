//! Off-thread base scoring.
//!
//! A `ScoringJob` owns a snapshot of the available pool and the current
//! weights, so it can run on the blocking pool without touching session
//! state. Results come back tagged with the request id they were issued
//! under.

use docmatch_model::{ScoredCandidate, ScoringWeights};
use docmatch_rerank::score_pool;
use tokio::task::JoinError;

/// Pure scoring work for one search request.
#[derive(Debug, Clone)]
pub struct ScoringJob {
    pub(crate) request_id: u64,
    pub(crate) reference: String,
    pub(crate) candidates: Vec<(usize, String)>,
    pub(crate) weights: ScoringWeights,
    pub(crate) floor: f64,
}

/// Base-scored results of a job.
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub request_id: u64,
    pub reference: String,
    pub results: Vec<ScoredCandidate>,
}

impl ScoringJob {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn pool_size(&self) -> usize {
        self.candidates.len()
    }

    /// Score on the current thread.
    pub fn run(self) -> ScoredBatch {
        let results = score_pool(
            &self.reference,
            self.candidates.iter().map(|(index, path)| (*index, path.as_str())),
            &self.weights,
            self.floor,
        );
        tracing::debug!(
            request_id = self.request_id,
            pool = self.candidates.len(),
            kept = results.len(),
            "Scored candidate pool"
        );
        ScoredBatch {
            request_id: self.request_id,
            reference: self.reference,
            results,
        }
    }

    /// Score on tokio's blocking pool.
    pub async fn spawn(self) -> Result<ScoredBatch, JoinError> {
        tokio::task::spawn_blocking(move || self.run()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn job() -> ScoringJob {
        ScoringJob {
            request_id: 7,
            reference: "Exhibit A5-02".to_string(),
            candidates: vec![
                (0, "folder/A5-02-letter.pdf".to_string()),
                (3, "other/notes.txt".to_string()),
            ],
            weights: ScoringWeights::default(),
            floor: 0.05,
        }
    }

    #[test]
    fn test_run_keeps_pool_indices() {
        let batch = job().run();
        assert_eq!(batch.request_id, 7);
        assert_eq!(batch.results.len(), 1);
        assert_eq!(batch.results[0].index, 0);
    }

    #[tokio::test]
    async fn test_spawn_matches_inline_run() {
        let inline = job().run();
        let spawned = job().spawn().await.unwrap();
        assert_eq!(spawned.results, inline.results);
    }
}
