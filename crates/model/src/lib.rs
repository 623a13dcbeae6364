//! Core domain model for docmatch reference reconciliation.
//!
//! This crate defines the plain-data types shared by every stage:
//! - `Match`: a confirmed (reference, path) pairing
//! - `ScoringWeights` / `LearningStatistics`: adaptive scoring state
//! - `ScoredCandidate` / `ScoreBreakdown`: explainable search results
//! - `SeriesGroup`: a numbered series of references
//! - `MatchError`: ledger-level failures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance used when checking that the scoring weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

/// How a match came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Picked by the user from search results
    Manual,
    /// Generated from a detected series template
    Pattern,
    /// Accepted automatically above a confidence threshold
    Auto,
}

impl Default for MatchMethod {
    fn default() -> Self {
        Self::Manual
    }
}

impl From<&str> for MatchMethod {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pattern" => Self::Pattern,
            "auto" => Self::Auto,
            _ => Self::Manual,
        }
    }
}

/// A confirmed pairing of a reference with a candidate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// The reference text (natural key)
    pub reference: String,

    /// The candidate path (natural key)
    pub path: String,

    /// Score at confirmation time, in [0, 1]
    pub score: f64,

    /// Whether the user confirmed the pairing
    #[serde(default = "default_true")]
    pub confirmed: bool,

    #[serde(default)]
    pub method: MatchMethod,

    pub timestamp: DateTime<Utc>,
}

impl Match {
    pub fn new(
        reference: impl Into<String>,
        path: impl Into<String>,
        score: f64,
        method: MatchMethod,
    ) -> Self {
        Self {
            reference: reference.into(),
            path: path.into(),
            score: score.clamp(0.0, 1.0),
            confirmed: true,
            method,
            timestamp: Utc::now(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Adaptive blend weights for the scorer.
///
/// `word + character + learned` always equals 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub word: f64,
    pub character: f64,
    pub learned: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            word: 0.55,
            character: 0.30,
            learned: 0.15,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.word + self.character + self.learned
    }

    /// True when every weight is in [0, 1] and they sum to one.
    pub fn is_normalized(&self) -> bool {
        let in_range = |w: f64| (0.0..=1.0).contains(&w);
        in_range(self.word)
            && in_range(self.character)
            && in_range(self.learned)
            && (self.sum() - 1.0).abs() <= WEIGHT_TOLERANCE
    }

    /// Set `learned` and split the remainder between word and character in
    /// their current proportion.
    pub fn rebalance(&mut self, learned: f64) {
        let learned = learned.clamp(0.0, 1.0);
        let lexical = self.word + self.character;
        let word_share = if lexical > 0.0 { self.word / lexical } else { 0.5 };
        let remaining = 1.0 - learned;

        self.word = remaining * word_share;
        self.character = remaining - self.word;
        self.learned = learned;
    }
}

/// Aggregate counters kept by the learning store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStatistics {
    pub total_matches: u64,
    pub successful_matches: u64,
    pub failed_matches: u64,
    pub average_confidence: f64,
}

impl LearningStatistics {
    /// Share of recorded matches that were confirmed.
    pub fn success_rate(&self) -> f64 {
        if self.total_matches == 0 {
            0.0
        } else {
            self.successful_matches as f64 / self.total_matches as f64
        }
    }
}

/// Broad category of a referenced document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Statement,
    Exhibit,
    Witness,
    Expert,
    Correspondence,
    Order,
    Submission,
    Appendix,
    Other,
}

impl DocumentType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Statement => "Statement",
            Self::Exhibit => "Exhibit",
            Self::Witness => "Witness Evidence",
            Self::Expert => "Expert Report",
            Self::Correspondence => "Correspondence",
            Self::Order => "Order",
            Self::Submission => "Submission",
            Self::Appendix => "Appendix",
            Self::Other => "Other",
        }
    }
}

/// Bonuses added by the contextual reweighter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBonuses {
    pub folder: f64,
    pub document_type: f64,
    pub sequence: f64,
    pub hierarchy: f64,
    pub proximity: f64,
}

impl ContextBonuses {
    pub fn total(&self) -> f64 {
        self.folder + self.document_type + self.sequence + self.hierarchy + self.proximity
    }
}

/// Per-component view of how a score was assembled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Token overlap between reference and basename
    pub word_score: f64,

    /// Normalized edit-distance similarity
    pub char_score: f64,

    /// Weighted blend of word and character scores
    pub base_score: f64,

    /// Bonus from learned reference → path patterns
    #[serde(default)]
    pub pattern_bonus: f64,

    /// Bonus from learned term relationships
    #[serde(default)]
    pub term_bonus: f64,

    /// Score after blending in the learned bonus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_score: Option<f64>,

    #[serde(default)]
    pub context: ContextBonuses,
}

/// A candidate path with its score for one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub path: String,

    /// Position in the original candidate pool (tie-break key)
    pub index: usize,

    /// Final blended score in [0, 1]
    pub score: f64,

    pub breakdown: ScoreBreakdown,
}

/// Known series shapes, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Exhibit,
    Appendix,
    Witness,
    Generic,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 4] = [Self::Exhibit, Self::Appendix, Self::Witness, Self::Generic];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Exhibit => "exhibit",
            Self::Appendix => "appendix",
            Self::Witness => "witness",
            Self::Generic => "generic",
        }
    }
}

/// One reference within a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesItem {
    pub reference: String,

    /// Extracted numeric index
    pub number: u32,

    /// The digits as written, e.g. "03"
    pub digits: String,
}

/// How regularly a numbered series advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncrementPattern {
    /// Every step equals the detected increment
    Strict,
    /// Most steps equal the increment, with gaps
    MostlySequential,
    Irregular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesIncrement {
    pub step: i64,
    pub pattern: IncrementPattern,
}

/// A group of references that share a naming scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesGroup {
    pub kind: SeriesKind,

    /// Grouping key, e.g. "exhibit:a5"
    pub series_key: String,

    /// The series code as written in the first reference, e.g. "A5"
    pub series_code: String,

    /// Items ordered by number
    pub items: Vec<SeriesItem>,

    pub increment: SeriesIncrement,
}

impl SeriesGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A generated pairing proposed for a series item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSuggestion {
    pub reference: String,
    pub path: String,
    pub confidence: f64,
}

/// Errors raised by the match ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Path already matched: {path} (to {reference})")]
    PathInUse { path: String, reference: String },

    #[error("Reference already matched: {reference} (to {path})")]
    ReferenceMatched { reference: String, path: String },

    #[error("No match for reference: {0}")]
    NotFound(String),
}

impl MatchError {
    /// True for uniqueness violations the caller should surface.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PathInUse { .. } | Self::ReferenceMatched { .. })
    }
}
