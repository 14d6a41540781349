//! Orchestration from free text or uploaded artifacts to taxonomy codes.
//!
//! Classifier entry points never fail: every oracle or persistence problem collapses
//! into a [`ClassificationResult`] whose [`Outcome`] records which terminal state was
//! reached.

pub mod access;
pub mod extract;
pub mod file;
pub mod specialization;

use serde::Serialize;

use crate::taxonomy::{Code, SENTINEL_CODE, SENTINEL_NAME};

pub use access::{AccessExpander, AccessSet};
pub use extract::ExtractionError;
pub use file::{Artifact, FileClassifier, Modality};
pub use specialization::SpecializationClassifier;

/// Confidence of every fallback result.
pub const FALLBACK_CONFIDENCE: f64 = 0.1;
/// Confidence of a code minted by dynamic extension.
pub const EXTENDED_CONFIDENCE: f64 = 0.5;
/// Confidence of a code recovered from the artifact's filename.
pub const NAME_MATCH_CONFIDENCE: f64 = 0.3;

/// Which terminal state produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The oracle proposed a code that exists.
    Matched,
    /// A new code was minted and persisted.
    Extended,
    /// The filename matched an existing name.
    NameMatch,
    /// Nothing usable; the sentinel code.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub code: Code,
    pub name: String,
    pub confidence: f64,
    pub outcome: Outcome,
}

impl ClassificationResult {
    pub fn new(code: Code, name: impl Into<String>, confidence: f64, outcome: Outcome) -> Self {
        Self {
            code,
            name: name.into(),
            confidence,
            outcome,
        }
    }

    /// The universal "unclassified" result.
    pub fn fallback() -> Self {
        Self::new(
            SENTINEL_CODE,
            SENTINEL_NAME,
            FALLBACK_CONFIDENCE,
            Outcome::Fallback,
        )
    }

    pub fn is_fallback(&self) -> bool {
        self.outcome == Outcome::Fallback
    }
}

/// Capitalize the first letter of every whitespace-separated word and lowercase the rest.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
