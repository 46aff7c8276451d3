//! Submission scoring
//!
//! Compares the mutations a player reported against the puzzle's answer key:
//! - correct   = key ∩ submitted
//! - missed    = key − submitted
//! - incorrect = submitted − key
//!
//! Accuracy is the share of the key that was found, as a percentage.

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

use crate::models::MutationId;

/// Per-set breakdown returned to the player. Lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub correct_mutations: Vec<MutationId>,
    pub missed_mutations: Vec<MutationId>,
    pub incorrect_mutations: Vec<MutationId>,
    pub total_mutations: usize,
    pub found_mutations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub breakdown: ScoreBreakdown,
    /// Unrounded percentage in [0, 100].
    pub accuracy: f64,
    pub feedback: Feedback,
}

impl Evaluation {
    /// Number of correct mutations, persisted as the submission score.
    pub fn score(&self) -> i32 {
        i32::try_from(self.breakdown.correct_mutations.len()).unwrap_or(i32::MAX)
    }

    /// Accuracy rounded to two decimals for display.
    pub fn rounded_accuracy(&self) -> f64 {
        (self.accuracy * 100.0).round() / 100.0
    }
}

// ============================================================================
// FEEDBACK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Excellent,
    Good,
    Progress,
    KeepPracticing,
}

impl Feedback {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= 90.0 {
            Feedback::Excellent
        } else if accuracy >= 70.0 {
            Feedback::Good
        } else if accuracy >= 50.0 {
            Feedback::Progress
        } else {
            Feedback::KeepPracticing
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Feedback::Excellent => "Excellent! You found almost all mutations!",
            Feedback::Good => "Good job! Keep practicing to improve further.",
            Feedback::Progress => "You're making progress.",
            Feedback::KeepPracticing => "Keep practicing. Focus on analyzing the sequence.",
        }
    }
}

impl Serialize for Feedback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

// ============================================================================
// SCORING
// ============================================================================

/// Percentage of `total` that was found. An empty answer key scores 0.
pub fn calculate_accuracy(correct: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    correct as f64 / total as f64 * 100.0
}

/// Score one submission against a puzzle's answer key.
pub fn evaluate(answer_key: &[MutationId], submitted: &[MutationId]) -> Evaluation {
    let expected: BTreeSet<MutationId> = answer_key.iter().copied().collect();
    let found: BTreeSet<MutationId> = submitted.iter().copied().collect();

    let correct: Vec<MutationId> = expected.intersection(&found).copied().collect();
    let missed: Vec<MutationId> = expected.difference(&found).copied().collect();
    let incorrect: Vec<MutationId> = found.difference(&expected).copied().collect();

    let accuracy = calculate_accuracy(correct.len(), expected.len());

    Evaluation {
        breakdown: ScoreBreakdown {
            correct_mutations: correct,
            missed_mutations: missed,
            incorrect_mutations: incorrect,
            total_mutations: expected.len(),
            found_mutations: found.len(),
        },
        accuracy,
        feedback: Feedback::from_accuracy(accuracy),
    }
}
