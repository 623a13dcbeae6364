//! Authoritative record of confirmed pairings.
//!
//! A candidate path is `available` until a match uses it; a reference is
//! `unmatched` until it is confirmed. Both flip back when the match is
//! removed. At most one match exists per reference and per path.

use std::collections::{HashMap, HashSet};

use docmatch_model::{Match, MatchError};

#[derive(Debug, Clone, Default)]
pub struct MatchLedger {
    references: Vec<String>,
    reference_set: HashSet<String>,
    candidates: Vec<String>,
    candidate_index: HashMap<String, usize>,
    matches: Vec<Match>,
    path_by_reference: HashMap<String, String>,
    reference_by_path: HashMap<String, String>,
}

impl MatchLedger {
    /// Build a ledger over ordered references and candidate paths.
    ///
    /// Identity is the exact text; repeated entries are kept once.
    pub fn new<R, P>(references: R, candidates: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        let mut ledger = Self::default();

        for reference in references {
            let reference = reference.into();
            if reference.trim().is_empty() {
                continue;
            }
            if ledger.reference_set.insert(reference.clone()) {
                ledger.references.push(reference);
            } else {
                tracing::warn!(reference = %reference, "Duplicate reference ignored");
            }
        }

        for path in candidates {
            let path = path.into();
            if path.trim().is_empty() || ledger.candidate_index.contains_key(&path) {
                continue;
            }
            ledger.candidate_index.insert(path.clone(), ledger.candidates.len());
            ledger.candidates.push(path);
        }

        ledger
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Confirmed matches in confirmation order.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn contains_reference(&self, reference: &str) -> bool {
        self.reference_set.contains(reference)
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.candidate_index.contains_key(path)
    }

    pub fn is_reference_matched(&self, reference: &str) -> bool {
        self.path_by_reference.contains_key(reference)
    }

    pub fn is_path_used(&self, path: &str) -> bool {
        self.reference_by_path.contains_key(path)
    }

    pub fn match_for(&self, reference: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.reference == reference)
    }

    pub fn unmatched_references(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .map(String::as_str)
            .filter(|r| !self.is_reference_matched(r))
    }

    /// Available candidates as `(pool index, path)`.
    pub fn available_candidates(&self) -> impl Iterator<Item = (usize, &str)> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, path)| !self.is_path_used(path))
            .map(|(index, path)| (index, path.as_str()))
    }

    pub fn available_count(&self) -> usize {
        self.candidates.len() - self.reference_by_path.len()
    }

    /// Check that a reference and path are both known.
    pub fn validate_pair(&self, reference: &str, path: &str) -> Result<(), MatchError> {
        if reference.trim().is_empty() {
            return Err(MatchError::Validation("reference is empty".to_string()));
        }
        if path.trim().is_empty() {
            return Err(MatchError::Validation("path is empty".to_string()));
        }
        if !self.contains_reference(reference) {
            return Err(MatchError::Validation(format!("unknown reference: {reference}")));
        }
        if !self.contains_path(path) {
            return Err(MatchError::Validation(format!("unknown path: {path}")));
        }
        Ok(())
    }

    /// Check that a new match would not break uniqueness.
    pub fn check_available(&self, reference: &str, path: &str) -> Result<(), MatchError> {
        self.validate_pair(reference, path)?;
        if let Some(existing) = self.path_by_reference.get(reference) {
            return Err(MatchError::ReferenceMatched {
                reference: reference.to_string(),
                path: existing.clone(),
            });
        }
        if let Some(owner) = self.reference_by_path.get(path) {
            return Err(MatchError::PathInUse {
                path: path.to_string(),
                reference: owner.clone(),
            });
        }
        Ok(())
    }

    /// Record a match, flipping the reference to matched and the path to used.
    pub fn insert(&mut self, record: Match) -> Result<&Match, MatchError> {
        self.check_available(&record.reference, &record.path)?;

        self.path_by_reference
            .insert(record.reference.clone(), record.path.clone());
        self.reference_by_path
            .insert(record.path.clone(), record.reference.clone());
        self.matches.push(record);

        let last = self.matches.len() - 1;
        Ok(&self.matches[last])
    }

    /// Remove the match for a reference and release its path.
    pub fn remove(&mut self, reference: &str) -> Result<Match, MatchError> {
        let position = self
            .matches
            .iter()
            .position(|m| m.reference == reference)
            .ok_or_else(|| MatchError::NotFound(reference.to_string()))?;

        let removed = self.matches.remove(position);
        self.path_by_reference.remove(&removed.reference);
        self.reference_by_path.remove(&removed.path);
        Ok(removed)
    }
}
