//! Numbered series detection and path templating.
//!
//! Groups references that share a naming scheme ("Exhibit A5-01",
//! "Exhibit A5-02", ...), infers a path template from the best match of the
//! first item and generates paths for the rest of the series.

use std::collections::HashMap;

use docmatch_features::{basename, is_stop_word};
use docmatch_model::{
    IncrementPattern, ScoringWeights, SeriesGroup, SeriesIncrement, SeriesItem, SeriesKind,
    SeriesSuggestion,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder for the item number in a path template.
pub const NUMBER_PLACEHOLDER: &str = "{n}";

/// Placeholder for the series code in a path template.
pub const SERIES_PLACEHOLDER: &str = "{series}";

/// Configuration for series detection and bulk generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Minimum items for a group to count as a series
    pub min_group_size: usize,
    /// Score the first item's candidate must exceed to seed a template
    pub template_threshold: f64,
    /// Confidence attached to generated suggestions
    pub suggestion_confidence: f64,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            min_group_size: 2,
            template_threshold: 0.7,
            suggestion_confidence: 0.85,
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("series regex"))
        .collect()
}

static EXHIBIT_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"(?i)\b(?:exhibit|exh\.?|ex\.)\s*(?:(?P<code>[a-z]+\d*)[-_.\s]+)?(?P<num>\d+)\b"])
});

static APPENDIX_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\b(?:appendix|annex|schedule|attachment|tab)\s*(?:(?P<code>[a-z]+)[-_.\s]*)?(?P<num>\d+)\b",
    ])
});

static WITNESS_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?i)\bwitness\s+statement\s*(?:no\.?\s*)?(?P<num>\d+)\b",
        r"(?i)\b(?P<code>[a-z]?ws?)[-_.\s]?(?P<num>\d+)\b",
    ])
});

static GENERIC_RES: Lazy<Vec<Regex>> =
    Lazy::new(|| compile(&[r"(?i)\b(?P<code>[a-z]{1,4})[-_.\s]?(?P<num>\d+)\b"]));

// Words that read like a short code before a day or year, never a series.
const MONTHS: [&str; 15] = [
    "jan", "feb", "mar", "apr", "may", "jun", "june", "jul", "july", "aug", "sep", "sept", "oct",
    "nov", "dec",
];

fn is_series_code(code: &str) -> bool {
    let code = code.to_lowercase();
    !is_stop_word(&code) && !MONTHS.contains(&code.as_str())
}

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits regex"));

fn rules(kind: SeriesKind) -> &'static [Regex] {
    match kind {
        SeriesKind::Exhibit => &EXHIBIT_RES,
        SeriesKind::Appendix => &APPENDIX_RES,
        SeriesKind::Witness => &WITNESS_RES,
        SeriesKind::Generic => &GENERIC_RES,
    }
}

/// Series membership extracted from a single reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMatch {
    pub kind: SeriesKind,
    /// Series code as written, possibly empty
    pub code: String,
    pub number: u32,
    pub digits: String,
}

impl SeriesMatch {
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.label(), self.code.to_lowercase())
    }
}

/// Extract series membership, trying kinds in priority order.
pub fn extract_series(reference: &str) -> Option<SeriesMatch> {
    SeriesKind::ALL.iter().find_map(|&kind| {
        rules(kind).iter().find_map(|re| {
            re.captures_iter(reference).find_map(|caps| {
                let code = caps.name("code").map(|m| m.as_str()).unwrap_or_default();
                if !code.is_empty() && !is_series_code(code) {
                    return None;
                }
                let digits = caps.name("num")?.as_str();
                let number = digits.parse().ok()?;
                Some(SeriesMatch {
                    kind,
                    code: code.to_string(),
                    number,
                    digits: digits.to_string(),
                })
            })
        })
    })
}

/// Classify the steps between consecutive numbers.
///
/// The step is the most common positive difference (smallest on ties).
pub fn detect_increment(numbers: &[u32]) -> SeriesIncrement {
    let diffs: Vec<i64> = numbers
        .windows(2)
        .map(|w| w[1] as i64 - w[0] as i64)
        .collect();

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for &d in diffs.iter().filter(|d| **d > 0) {
        *counts.entry(d).or_default() += 1;
    }

    let Some((step, count)) = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    else {
        return SeriesIncrement {
            step: 0,
            pattern: IncrementPattern::Irregular,
        };
    };

    let pattern = if count == diffs.len() {
        IncrementPattern::Strict
    } else if count * 2 >= diffs.len() {
        IncrementPattern::MostlySequential
    } else {
        IncrementPattern::Irregular
    };

    SeriesIncrement { step, pattern }
}

/// Group references into numbered series.
pub fn detect_patterns<S: AsRef<str>>(references: &[S]) -> Vec<SeriesGroup> {
    detect_patterns_with(references, &SeriesConfig::default())
}

/// Group references into numbered series using `config`.
///
/// Groups keep the order in which their key first appears; items are
/// sorted by number.
pub fn detect_patterns_with<S: AsRef<str>>(
    references: &[S],
    config: &SeriesConfig,
) -> Vec<SeriesGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, (SeriesKind, String, Vec<SeriesItem>)> = HashMap::new();

    for reference in references {
        let reference = reference.as_ref();
        let Some(found) = extract_series(reference) else {
            continue;
        };
        let key = found.key();
        let entry = pending.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            (found.kind, found.code.clone(), Vec::new())
        });
        entry.2.push(SeriesItem {
            reference: reference.to_string(),
            number: found.number,
            digits: found.digits,
        });
    }

    let groups: Vec<SeriesGroup> = order
        .into_iter()
        .filter_map(|key| {
            let (kind, code, mut items) = pending.remove(&key)?;
            if items.len() < config.min_group_size.max(2) {
                return None;
            }
            items.sort_by_key(|item| item.number);
            let numbers: Vec<u32> = items.iter().map(|i| i.number).collect();
            Some(SeriesGroup {
                kind,
                series_key: key,
                series_code: code,
                increment: detect_increment(&numbers),
                items,
            })
        })
        .collect();

    tracing::debug!(
        references = references.len(),
        groups = groups.len(),
        "Detected series"
    );
    groups
}

/// A path shape with the item number (and series code) abstracted out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathTemplate {
    /// Path with `{n}` and optionally `{series}` placeholders
    pub pattern: String,

    /// Zero-padding width of the number, 0 when unpadded
    pub pad_width: usize,

    /// Series code as written in the source path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_text: Option<String>,

    /// The candidate the template was derived from
    pub source_path: String,

    /// Score of the source candidate for the group's first item
    pub score: f64,
}

impl PathTemplate {
    /// Render the template for one number and series code.
    pub fn render(&self, number: u32, code: &str) -> String {
        let digits = if self.pad_width > 0 {
            format!("{:0width$}", number, width = self.pad_width)
        } else {
            number.to_string()
        };
        self.pattern
            .replace(SERIES_PLACEHOLDER, code)
            .replace(NUMBER_PLACEHOLDER, &digits)
    }
}

/// Infer a path template from the best candidate for the group's first item.
///
/// Only candidates whose file name carries the item's number are eligible,
/// and the best of them must score above the configured threshold.
pub fn find_path_pattern<'p, I>(
    group: &SeriesGroup,
    candidates: I,
    weights: &ScoringWeights,
    config: &SeriesConfig,
) -> Option<PathTemplate>
where
    I: IntoIterator<Item = &'p str>,
{
    let first = group.items.first()?;

    let mut best: Option<(&str, f64)> = None;
    for path in candidates {
        if number_run(basename(path), first.number).is_none() {
            continue;
        }
        let score = docmatch_rerank::score(&first.reference, path, weights);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((path, score));
        }
    }

    let (path, score) = best?;
    if score <= config.template_threshold {
        tracing::debug!(
            series = %group.series_key,
            path,
            score,
            "Best candidate below template threshold"
        );
        return None;
    }

    build_template(path, first.number, &group.series_code, score)
}

/// Byte range of the last digit run in `name` whose value is `number`.
fn number_run(name: &str, number: u32) -> Option<(usize, usize)> {
    DIGITS_RE
        .find_iter(name)
        .filter(|m| m.as_str().parse::<u32>().ok() == Some(number))
        .last()
        .map(|m| (m.start(), m.end()))
}

fn build_template(path: &str, number: u32, code: &str, score: f64) -> Option<PathTemplate> {
    let name = basename(path);
    let folder = &path[..path.len() - name.len()];
    let (start, end) = number_run(name, number)?;

    let digits = &name[start..end];
    let pad_width = if digits.len() > 1 && digits.starts_with('0') {
        digits.len()
    } else {
        0
    };

    let (before, before_code) = replace_code(&name[..start], code);
    let (after, after_code) = replace_code(&name[end..], code);

    Some(PathTemplate {
        pattern: format!("{folder}{before}{NUMBER_PLACEHOLDER}{after}"),
        pad_width,
        series_text: before_code.or(after_code),
        source_path: path.to_string(),
        score,
    })
}

/// Replace standalone, case-insensitive occurrences of `code` with the
/// series placeholder, returning the first occurrence as written.
fn replace_code(segment: &str, code: &str) -> (String, Option<String>) {
    if code.is_empty() || !code.is_ascii() {
        return (segment.to_string(), None);
    }

    let lowered = segment.to_ascii_lowercase();
    let needle = code.to_ascii_lowercase();
    let bytes = segment.as_bytes();

    let mut out = String::with_capacity(segment.len());
    let mut found = None;
    let mut cursor = 0;
    for (idx, _) in lowered.match_indices(&needle) {
        if idx < cursor {
            continue;
        }
        let end = idx + needle.len();
        let clear_before = idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric();
        let clear_after = end == bytes.len() || !bytes[end].is_ascii_alphabetic();
        if !(clear_before && clear_after) {
            continue;
        }
        out.push_str(&segment[cursor..idx]);
        out.push_str(SERIES_PLACEHOLDER);
        found.get_or_insert_with(|| segment[idx..end].to_string());
        cursor = end;
    }
    out.push_str(&segment[cursor..]);

    (out, found)
}

/// Generate a suggested path for every item of the group.
pub fn generate_paths_for_series(
    group: &SeriesGroup,
    template: &PathTemplate,
    config: &SeriesConfig,
) -> Vec<SeriesSuggestion> {
    // Within the template's own series keep the path's spelling of the code.
    let code = match &template.series_text {
        Some(text) if text.eq_ignore_ascii_case(&group.series_code) => text.as_str(),
        _ => group.series_code.as_str(),
    };

    group
        .items
        .iter()
        .map(|item| SeriesSuggestion {
            reference: item.reference.clone(),
            path: template.render(item.number, code),
            confidence: config.suggestion_confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_witness_series_detected() {
        let groups = detect_patterns(&["CW-1", "CW-2", "CW-3"]);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.kind, SeriesKind::Witness);
        assert_eq!(group.len(), 3);
        assert_eq!(
            group.increment,
            SeriesIncrement {
                step: 1,
                pattern: IncrementPattern::Strict
            }
        );
    }

    #[test]
    fn test_extract_priority() {
        let exhibit = extract_series("Exhibit A5-03 – Claimant Letter").unwrap();
        assert_eq!(exhibit.kind, SeriesKind::Exhibit);
        assert_eq!(exhibit.code, "A5");
        assert_eq!(exhibit.number, 3);
        assert_eq!(exhibit.digits, "03");

        let annex = extract_series("Annex 4").unwrap();
        assert_eq!(annex.kind, SeriesKind::Appendix);
        assert_eq!(annex.key(), "appendix:");

        let statement = extract_series("Witness Statement No. 2").unwrap();
        assert_eq!(statement.kind, SeriesKind::Witness);
        assert_eq!(statement.number, 2);

        let generic = extract_series("HB-12 hearing bundle").unwrap();
        assert_eq!(generic.kind, SeriesKind::Generic);
        assert_eq!(generic.key(), "generic:hb");

        assert!(extract_series("Claimant Letter").is_none());
    }

    #[test]
    fn test_dates_are_not_series() {
        assert!(extract_series("Letter of 5 June 2023").is_none());
        assert!(extract_series("Minutes dated 12 Mar 2021").is_none());
        assert!(detect_patterns(&["Letter of 5 June 2023", "Email of 9 June 2023"]).is_empty());

        let bundle = extract_series("Notes for HB-4").unwrap();
        assert_eq!(bundle.key(), "generic:hb");
        assert_eq!(bundle.number, 4);
    }

    #[test]
    fn test_groups_sorted_and_singletons_dropped() {
        let refs = [
            "Exhibit A5-03 – Letter",
            "Exhibit A5-01 – Letter",
            "Annex 1",
            "Exhibit A5-02",
            "Exhibit B1-01",
            "Annex 2",
            "Random note",
        ];
        let groups = detect_patterns(&refs);
        let keys: Vec<&str> = groups.iter().map(|g| g.series_key.as_str()).collect();
        assert_eq!(keys, vec!["exhibit:a5", "appendix:"]);

        let numbers: Vec<u32> = groups[0].items.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_increment_patterns() {
        assert_eq!(detect_increment(&[2, 4, 6]).step, 2);
        assert_eq!(detect_increment(&[2, 4, 6]).pattern, IncrementPattern::Strict);
        assert_eq!(
            detect_increment(&[1, 2, 3, 5]).pattern,
            IncrementPattern::MostlySequential
        );
        assert_eq!(
            detect_increment(&[1, 4, 5, 11]).pattern,
            IncrementPattern::Irregular
        );
        assert_eq!(detect_increment(&[3, 3]).step, 0);
    }

    fn letter_group() -> SeriesGroup {
        detect_patterns(&[
            "Exhibit A5-01 Letter",
            "Exhibit A5-02 Letter",
            "Exhibit A5-03 Letter",
        ])
        .remove(0)
    }

    #[test]
    fn test_template_from_best_candidate() {
        let group = letter_group();
        let paths = ["docs/other.pdf", "docs/Exhibit A5-01 Letter.pdf"];
        let template = find_path_pattern(
            &group,
            paths,
            &ScoringWeights::default(),
            &SeriesConfig::default(),
        )
        .unwrap();

        assert_eq!(template.pattern, "docs/Exhibit {series}-{n} Letter.pdf");
        assert_eq!(template.pad_width, 2);
        assert_eq!(template.series_text.as_deref(), Some("A5"));

        let paths: Vec<String> = generate_paths_for_series(&group, &template, &SeriesConfig::default())
            .into_iter()
            .map(|s| s.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "docs/Exhibit A5-01 Letter.pdf",
                "docs/Exhibit A5-02 Letter.pdf",
                "docs/Exhibit A5-03 Letter.pdf",
            ]
        );
    }

    #[test]
    fn test_template_threshold() {
        let group = detect_patterns(&["CW-1", "CW-2", "CW-3"]).remove(0);
        let paths = ["C0001.pdf", "C0002.pdf", "C0003.pdf"];
        let weights = ScoringWeights::default();

        assert!(find_path_pattern(&group, paths, &weights, &SeriesConfig::default()).is_none());

        let relaxed = SeriesConfig {
            template_threshold: 0.0,
            ..Default::default()
        };
        let template = find_path_pattern(&group, paths, &weights, &relaxed).unwrap();
        assert_eq!(template.pattern, "C{n}.pdf");
        assert_eq!(template.pad_width, 4);

        let suggestions = generate_paths_for_series(&group, &template, &relaxed);
        assert_eq!(suggestions[2].path, "C0003.pdf");
        assert_eq!(suggestions[2].reference, "CW-3");
        assert_eq!(suggestions[2].confidence, 0.85);
    }

    #[test]
    fn test_no_candidate_with_number() {
        let group = letter_group();
        let template = find_path_pattern(
            &group,
            ["docs/Letter.pdf"],
            &ScoringWeights::default(),
            &SeriesConfig::default(),
        );
        assert!(template.is_none());
    }

    #[test]
    fn test_code_replacement_boundaries() {
        assert_eq!(
            replace_code("docs C-", "c"),
            ("docs {series}-".to_string(), Some("C".to_string()))
        );
        assert_eq!(replace_code("abc", "b"), ("abc".to_string(), None));
    }
}
