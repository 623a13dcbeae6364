//! Session-context reweighting of search results.
//!
//! Uses the recent confirmation history to favour candidates that continue
//! what the user has been doing: same folder, folders already used for this
//! kind of document, the next number of a sequence, and paths close to the
//! ones recently confirmed.

use std::collections::{HashMap, VecDeque};

use docmatch_features::{folder_segments, parent_folder, tokenize, trailing_number};
use docmatch_model::{
    ContextBonuses, DocumentType, IncrementPattern, ScoredCandidate, SeriesIncrement,
};
use docmatch_rerank::ScoreEnhancer;
use docmatch_series::detect_increment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// No single context bonus may exceed this.
pub const MAX_BONUS: f64 = 0.15;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Confirmed matches kept in the rolling window (clamped to 5..=20)
    pub window_size: usize,
    /// Numbers remembered per sequence
    pub sequence_memory: usize,
    pub same_folder_bonus: f64,
    pub subfolder_bonus: f64,
    pub document_type_step: f64,
    pub document_type_cap: f64,
    pub sequence_bonus: f64,
    pub hierarchy_cap: f64,
    pub proximity_cap: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            sequence_memory: 6,
            same_folder_bonus: 0.10,
            subfolder_bonus: 0.05,
            document_type_step: 0.05,
            document_type_cap: 0.15,
            sequence_bonus: 0.15,
            hierarchy_cap: 0.10,
            proximity_cap: 0.10,
        }
    }
}

static DOCUMENT_TYPES: Lazy<Vec<(DocumentType, Regex)>> = Lazy::new(|| {
    [
        (
            DocumentType::Statement,
            r"(?i)\b(statement\s+of\s+(case|claim|defen[cs]e|reply)|pleadings?|particulars\s+of\s+claim)\b",
        ),
        (DocumentType::Exhibit, r"(?i)\b(exhibits?|exh)\b"),
        (
            DocumentType::Witness,
            r"(?i)\b(witness|affidavit|declaration|[a-z]?w[-_\s]?\d+)\b",
        ),
        (DocumentType::Expert, r"(?i)\b(expert|report)\b"),
        (
            DocumentType::Correspondence,
            r"(?i)\b(letter|e-?mail|correspondence|memo(randum)?|fax)\b",
        ),
        (
            DocumentType::Order,
            r"(?i)\b(order|judge?ment|ruling|award|decision|direction)\b",
        ),
        (
            DocumentType::Submission,
            r"(?i)\b(submissions?|skeleton|brief|memorial|argument)\b",
        ),
        (DocumentType::Appendix, r"(?i)\b(appendix|annex|schedule|attachment)\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("document type regex")))
    .collect()
});

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex"));

/// Classify a reference; the first matching category wins.
pub fn classify_document(text: &str) -> DocumentType {
    DOCUMENT_TYPES
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
        .unwrap_or(DocumentType::Other)
}

/// Reference with its last number abstracted, plus that number.
///
/// "Exhibit A5-02" → ("exhibit a5-#", 2)
pub fn sequence_key(reference: &str) -> Option<(String, u32)> {
    let m = DIGITS_RE.find_iter(reference).last()?;
    let number = m.as_str().parse().ok()?;
    let key = format!(
        "{}#{}",
        reference[..m.start()].trim().to_lowercase(),
        reference[m.end()..].trim_end().to_lowercase()
    );
    Some((key, number))
}

#[derive(Debug, Clone)]
struct ContextEntry {
    path: String,
    folder: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct SequenceTracker {
    numbers: VecDeque<u32>,
}

impl SequenceTracker {
    fn last(&self) -> Option<u32> {
        self.numbers.back().copied()
    }

    /// Increment over the remembered numbers. A single observation is
    /// treated as a tentative step of one.
    fn increment(&self) -> SeriesIncrement {
        if self.numbers.len() < 2 {
            return SeriesIncrement {
                step: 1,
                pattern: IncrementPattern::MostlySequential,
            };
        }
        let numbers: Vec<u32> = self.numbers.iter().copied().collect();
        detect_increment(&numbers)
    }

    fn expected_next(&self) -> Option<(u32, IncrementPattern)> {
        let increment = self.increment();
        if increment.step <= 0 {
            return None;
        }
        let next = self.last()? as i64 + increment.step;
        u32::try_from(next).ok().map(|n| (n, increment.pattern))
    }
}

/// Rolling session context.
#[derive(Debug, Clone)]
pub struct ContextTracker {
    config: ContextConfig,
    window: VecDeque<ContextEntry>,
    current_folder: Option<String>,
    type_folders: HashMap<DocumentType, HashMap<String, u32>>,
    sequences: HashMap<String, SequenceTracker>,
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl ContextTracker {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            window: VecDeque::new(),
            current_folder: None,
            type_folders: HashMap::new(),
            sequences: HashMap::new(),
        }
    }

    fn window_size(&self) -> usize {
        self.config.window_size.clamp(5, 20)
    }

    pub fn current_folder(&self) -> Option<&str> {
        self.current_folder.as_deref()
    }

    /// Recently confirmed paths, oldest first.
    pub fn recent_paths(&self) -> impl Iterator<Item = &str> {
        self.window.iter().map(|e| e.path.as_str())
    }

    /// Feed a confirmed match into the context.
    pub fn record_confirmed(&mut self, reference: &str, path: &str) {
        let folder = parent_folder(path).map(str::to_string);
        let doc_type = classify_document(reference);

        if let Some(folder) = &folder {
            *self
                .type_folders
                .entry(doc_type)
                .or_default()
                .entry(folder.clone())
                .or_insert(0) += 1;
        }
        self.current_folder = folder.clone();

        if let Some((key, number)) = sequence_key(reference) {
            let memory = self.config.sequence_memory.max(2);
            let tracker = self.sequences.entry(key).or_default();
            tracker.numbers.push_back(number);
            while tracker.numbers.len() > memory {
                tracker.numbers.pop_front();
            }
        }

        self.window.push_back(ContextEntry {
            path: path.to_string(),
            folder,
        });
        while self.window.len() > self.window_size() {
            self.window.pop_front();
        }

        tracing::debug!(
            reference,
            path,
            doc_type = doc_type.label(),
            window = self.window.len(),
            "Updated match context"
        );
    }

    /// Compute the context bonuses for one candidate.
    pub fn bonuses(&self, reference: &str, path: &str) -> ContextBonuses {
        let doc_type = classify_document(reference);
        let ref_terms = tokenize(reference);
        let expected = self.expected_for(reference);
        self.bonuses_with(doc_type, &ref_terms, expected, path)
    }

    fn expected_for(&self, reference: &str) -> Option<(u32, IncrementPattern)> {
        let (key, number) = sequence_key(reference)?;
        let (next, pattern) = self.sequences.get(&key)?.expected_next()?;
        (next == number).then_some((next, pattern))
    }

    fn bonuses_with(
        &self,
        doc_type: DocumentType,
        ref_terms: &[String],
        expected: Option<(u32, IncrementPattern)>,
        path: &str,
    ) -> ContextBonuses {
        let cfg = &self.config;
        let folder = parent_folder(path);

        let folder_bonus = match (self.current_folder.as_deref(), folder) {
            (Some(current), Some(candidate)) if current == candidate => cfg.same_folder_bonus,
            (Some(current), Some(candidate))
                if candidate.len() > current.len()
                    && candidate.starts_with(current)
                    && candidate[current.len()..].starts_with(['/', '\\']) =>
            {
                cfg.subfolder_bonus
            }
            _ => 0.0,
        };

        let document_type = folder
            .and_then(|f| self.type_folders.get(&doc_type)?.get(f))
            .map(|count| (*count as f64 * cfg.document_type_step).min(cfg.document_type_cap))
            .unwrap_or(0.0);

        let sequence = match (expected, trailing_number(path)) {
            (Some((next, pattern)), Some((number, _))) if number == next => match pattern {
                IncrementPattern::Strict => cfg.sequence_bonus,
                IncrementPattern::MostlySequential => cfg.sequence_bonus * 2.0 / 3.0,
                IncrementPattern::Irregular => cfg.sequence_bonus / 3.0,
            },
            _ => 0.0,
        };

        ContextBonuses {
            folder: folder_bonus.min(MAX_BONUS),
            document_type: document_type.min(MAX_BONUS),
            sequence: sequence.min(MAX_BONUS),
            hierarchy: hierarchy_overlap(ref_terms, path) * cfg.hierarchy_cap.min(MAX_BONUS),
            proximity: self.proximity(path) * cfg.proximity_cap.min(MAX_BONUS),
        }
    }

    /// Best shared-prefix ratio between the candidate's folders and the
    /// folders of recently confirmed paths.
    fn proximity(&self, path: &str) -> f64 {
        let segments = folder_segments(path);
        if segments.is_empty() {
            return 0.0;
        }

        self.window
            .iter()
            .filter_map(|entry| entry.folder.as_deref())
            .map(|folder| {
                let recent: Vec<&str> = folder
                    .split(['/', '\\'])
                    .filter(|s| !s.is_empty())
                    .collect();
                let shared = segments
                    .iter()
                    .zip(&recent)
                    .take_while(|(a, b)| a.eq_ignore_ascii_case(b))
                    .count();
                shared as f64 / segments.len().max(recent.len()) as f64
            })
            .fold(0.0, f64::max)
    }

    /// Forget the session context.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        *self = Self::new(config);
    }
}

/// Share of folder depth whose segment names mention a reference term.
///
/// Deeper segments weigh more: segment `i` of `n` has weight `(i + 1) / n`.
pub fn hierarchy_overlap(ref_terms: &[String], path: &str) -> f64 {
    let segments = folder_segments(path);
    if segments.is_empty() || ref_terms.is_empty() {
        return 0.0;
    }

    let n = segments.len() as f64;
    let mut total = 0.0;
    let mut hit = 0.0;
    for (i, segment) in segments.iter().enumerate() {
        let weight = (i + 1) as f64 / n;
        total += weight;
        if tokenize(segment).iter().any(|t| ref_terms.contains(t)) {
            hit += weight;
        }
    }
    hit / total
}

impl ScoreEnhancer for ContextTracker {
    fn name(&self) -> &'static str {
        "context"
    }

    fn enhance(&self, reference: &str, results: &mut [ScoredCandidate]) {
        let doc_type = classify_document(reference);
        let ref_terms = tokenize(reference);
        let expected = self.expected_for(reference);
        for result in results.iter_mut() {
            let bonuses = self.bonuses_with(doc_type, &ref_terms, expected, &result.path);
            result.score = (result.score + bonuses.total()).min(1.0);
            result.breakdown.context = bonuses;
        }
    }
}
