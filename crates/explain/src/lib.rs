//! Explanation generation for ranked candidates.
//!
//! Converts a candidate's score breakdown into human-readable reasons
//! suitable for display next to a search result.

use docmatch_features::{basename, word_tokens};
use docmatch_model::{ScoreBreakdown, ScoredCandidate};
use serde::{Deserialize, Serialize};

/// One contributing factor of a candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchReason {
    /// Cleaned reference and file name are identical
    ExactName,
    /// Shared words between reference and file name
    WordOverlap { score: f64 },
    /// Edit-distance similarity of the cleaned strings
    CharacterSimilarity { score: f64 },
    /// Reference and path shapes seen together before
    LearnedPattern { bonus: f64 },
    /// Terms confirmed together before
    TermRelationship { bonus: f64 },
    /// Path sits in the folder of recent confirmations
    SameFolder { bonus: f64 },
    /// Folder already holds documents of the reference's type
    DocumentType { bonus: f64 },
    /// File number continues the reference's sequence
    Sequence { bonus: f64 },
    /// Reference terms appear in the folder hierarchy
    Hierarchy { bonus: f64 },
    /// Path is close to recently confirmed paths
    Proximity { bonus: f64 },
}

impl MatchReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ExactName => "exact name",
            Self::WordOverlap { .. } => "word overlap",
            Self::CharacterSimilarity { .. } => "similar spelling",
            Self::LearnedPattern { .. } => "learned pattern",
            Self::TermRelationship { .. } => "related terms",
            Self::SameFolder { .. } => "same folder",
            Self::DocumentType { .. } => "document type",
            Self::Sequence { .. } => "sequence",
            Self::Hierarchy { .. } => "folder hierarchy",
            Self::Proximity { .. } => "nearby files",
        }
    }

    /// Relative weight of the reason, 0.0 - 1.0.
    pub fn strength(&self) -> f64 {
        match self {
            Self::ExactName => 1.0,
            Self::WordOverlap { score } | Self::CharacterSimilarity { score } => *score,
            // Bonuses are capped at 0.15; scale them onto the same range.
            Self::LearnedPattern { bonus }
            | Self::TermRelationship { bonus }
            | Self::SameFolder { bonus }
            | Self::DocumentType { bonus }
            | Self::Sequence { bonus }
            | Self::Hierarchy { bonus }
            | Self::Proximity { bonus } => (bonus / 0.15).min(1.0),
        }
    }
}

/// A structured explanation for one reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line)
    pub summary: String,

    /// Detailed explanation (1-2 sentences)
    pub detail: String,

    /// Strength (0.0 - 1.0)
    pub strength: f64,

    /// Evidence items supporting this explanation
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence supporting a reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind: String,

    pub value: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl EvidenceItem {
    fn new(kind: &str, value: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
            context: None,
        }
    }
}

/// Reasons present in a breakdown, strongest first.
pub fn reasons(breakdown: &ScoreBreakdown) -> Vec<MatchReason> {
    let mut reasons = Vec::new();

    if breakdown.word_score >= 1.0 && breakdown.char_score >= 1.0 {
        reasons.push(MatchReason::ExactName);
    } else {
        if breakdown.word_score > 0.0 {
            reasons.push(MatchReason::WordOverlap {
                score: breakdown.word_score,
            });
        }
        if breakdown.char_score > 0.0 {
            reasons.push(MatchReason::CharacterSimilarity {
                score: breakdown.char_score,
            });
        }
    }

    let bonuses: [(f64, fn(f64) -> MatchReason); 7] = [
        (breakdown.pattern_bonus, |bonus| MatchReason::LearnedPattern { bonus }),
        (breakdown.term_bonus, |bonus| MatchReason::TermRelationship { bonus }),
        (breakdown.context.folder, |bonus| MatchReason::SameFolder { bonus }),
        (breakdown.context.document_type, |bonus| MatchReason::DocumentType { bonus }),
        (breakdown.context.sequence, |bonus| MatchReason::Sequence { bonus }),
        (breakdown.context.hierarchy, |bonus| MatchReason::Hierarchy { bonus }),
        (breakdown.context.proximity, |bonus| MatchReason::Proximity { bonus }),
    ];
    for (bonus, make) in bonuses {
        if bonus > 0.0 {
            reasons.push(make(bonus));
        }
    }

    reasons.sort_by(|a, b| b.strength().total_cmp(&a.strength()));
    reasons
}

/// Generate explanations for a ranked candidate.
pub fn explain_candidate(candidate: &ScoredCandidate, reference: &str) -> Vec<Explanation> {
    reasons(&candidate.breakdown)
        .iter()
        .map(|reason| explain_reason(reason, reference, &candidate.path))
        .collect()
}

/// Generate the explanation for a single reason.
pub fn explain_reason(reason: &MatchReason, reference: &str, path: &str) -> Explanation {
    let name = basename(path);
    let strength = reason.strength();

    match reason {
        MatchReason::ExactName => Explanation {
            summary: "Exact name match".to_string(),
            detail: format!(
                "The file name '{name}' is the reference '{reference}' once case, \
                 punctuation and extensions are ignored."
            ),
            strength,
            evidence: vec![EvidenceItem::new("exact_name", name)],
        },

        MatchReason::WordOverlap { score } => {
            let path_tokens = word_tokens(name);
            let shared: Vec<String> = word_tokens(reference)
                .into_iter()
                .filter(|t| path_tokens.contains(t))
                .collect();
            Explanation {
                summary: format!("{:.0}% word overlap", score * 100.0),
                detail: format!("'{name}' shares words with '{reference}'."),
                strength,
                evidence: shared
                    .into_iter()
                    .map(|t| EvidenceItem::new("shared_word", t))
                    .collect(),
            }
        }

        MatchReason::CharacterSimilarity { score } => Explanation {
            summary: "Similar spelling".to_string(),
            detail: format!(
                "'{name}' and '{reference}' are {:.0}% alike character by character.",
                score * 100.0
            ),
            strength,
            evidence: vec![EvidenceItem::new("edit_similarity", format!("{score:.2}"))],
        },

        MatchReason::LearnedPattern { bonus } => Explanation {
            summary: "Matches a learned pattern".to_string(),
            detail: "References shaped like this one were previously matched to files \
                     named like this one."
                .to_string(),
            strength,
            evidence: vec![EvidenceItem::new("pattern_bonus", format!("{bonus:.3}"))],
        },

        MatchReason::TermRelationship { bonus } => Explanation {
            summary: "Related terms".to_string(),
            detail: "Words in the reference were confirmed alongside words in this path before."
                .to_string(),
            strength,
            evidence: vec![EvidenceItem::new("term_bonus", format!("{bonus:.3}"))],
        },

        MatchReason::SameFolder { bonus } => context_explanation(
            "In the current folder",
            "The file is in (or below) the folder of the most recent confirmation.",
            "folder_bonus",
            *bonus,
            strength,
            path,
        ),

        MatchReason::DocumentType { bonus } => context_explanation(
            "Folder holds this document type",
            "Documents of the same type as the reference were filed in this folder.",
            "document_type_bonus",
            *bonus,
            strength,
            path,
        ),

        MatchReason::Sequence { bonus } => context_explanation(
            "Continues the sequence",
            "The file number is the next one expected in the reference's series.",
            "sequence_bonus",
            *bonus,
            strength,
            path,
        ),

        MatchReason::Hierarchy { bonus } => context_explanation(
            "Folder names match",
            "Words of the reference appear in the folder path.",
            "hierarchy_bonus",
            *bonus,
            strength,
            path,
        ),

        MatchReason::Proximity { bonus } => context_explanation(
            "Near recent matches",
            "The file shares folders with recently confirmed files.",
            "proximity_bonus",
            *bonus,
            strength,
            path,
        ),
    }
}

fn context_explanation(
    summary: &str,
    detail: &str,
    kind: &str,
    bonus: f64,
    strength: f64,
    path: &str,
) -> Explanation {
    Explanation {
        summary: summary.to_string(),
        detail: detail.to_string(),
        strength,
        evidence: vec![EvidenceItem {
            kind: kind.to_string(),
            value: format!("{bonus:.3}"),
            context: Some(path.to_string()),
        }],
    }
}

/// One-line confidence summary for a candidate.
pub fn summarize_confidence(candidate: &ScoredCandidate) -> String {
    let found = reasons(&candidate.breakdown);
    if found.is_empty() {
        return "Low confidence - no supporting evidence.".to_string();
    }

    let level = if candidate.score >= 0.8 {
        "HIGH CONFIDENCE"
    } else if candidate.score >= 0.5 {
        "MODERATE CONFIDENCE"
    } else {
        "LOW CONFIDENCE"
    };

    let labels: Vec<_> = found.iter().map(MatchReason::label).collect();
    format!("{}: {}", level, labels.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmatch_model::ContextBonuses;

    fn candidate(score: f64, breakdown: ScoreBreakdown) -> ScoredCandidate {
        ScoredCandidate {
            path: "bundle/exhibits/A5-02 Letter.pdf".to_string(),
            index: 0,
            score,
            breakdown,
        }
    }

    #[test]
    fn test_exact_name() {
        let breakdown = ScoreBreakdown {
            word_score: 1.0,
            char_score: 1.0,
            base_score: 1.0,
            ..Default::default()
        };
        assert_eq!(reasons(&breakdown), vec![MatchReason::ExactName]);

        let explanation = explain_reason(&MatchReason::ExactName, "A5-02 Letter", "x/A5-02 Letter.pdf");
        assert_eq!(explanation.strength, 1.0);
        assert!(explanation.summary.contains("Exact"));
    }

    #[test]
    fn test_reasons_ordered_by_strength() {
        let breakdown = ScoreBreakdown {
            word_score: 0.5,
            char_score: 0.2,
            base_score: 0.4,
            pattern_bonus: 0.15,
            context: ContextBonuses {
                folder: 0.05,
                ..Default::default()
            },
            ..Default::default()
        };
        let labels: Vec<&str> = reasons(&breakdown).iter().map(MatchReason::label).collect();
        assert_eq!(
            labels,
            vec!["learned pattern", "word overlap", "same folder", "similar spelling"]
        );
    }

    #[test]
    fn test_word_overlap_evidence() {
        let explanation = explain_reason(
            &MatchReason::WordOverlap { score: 0.67 },
            "Exhibit A5-02 Letter",
            "bundle/A5-02 Letter.pdf",
        );
        let words: Vec<&str> = explanation.evidence.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(words, vec!["a5", "02", "letter"]);
    }

    #[test]
    fn test_explain_candidate_covers_context() {
        let c = candidate(
            0.62,
            ScoreBreakdown {
                word_score: 0.6,
                base_score: 0.5,
                context: ContextBonuses {
                    sequence: 0.15,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let explanations = explain_candidate(&c, "Exhibit A5-02");
        assert_eq!(explanations.len(), 2);
        assert_eq!(explanations[0].summary, "Continues the sequence");
        assert_eq!(
            explanations[0].evidence[0].context.as_deref(),
            Some("bundle/exhibits/A5-02 Letter.pdf")
        );
    }

    #[test]
    fn test_summarize_confidence() {
        let none = candidate(0.1, ScoreBreakdown::default());
        assert!(summarize_confidence(&none).starts_with("Low confidence"));

        let strong = candidate(
            0.9,
            ScoreBreakdown {
                word_score: 1.0,
                char_score: 1.0,
                base_score: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(summarize_confidence(&strong), "HIGH CONFIDENCE: exact name");
    }
}
