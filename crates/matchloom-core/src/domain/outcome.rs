//! Outcome model: what an evaluation produces and what the store keeps.
//!
//! `Evaluation` is the evaluator's raw answer for one pair. The orchestrator
//! stamps it into an `OutcomeDraft`, and the store turns the draft into a
//! `MatchOutcome` by assigning the id.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::MatchId;
use super::pair::{JobId, MatchRequestPair, ResumeId};

/// Score for one dimension of the comparison (skills, education, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionScore {
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Structured explanation attached to a score.
///
/// Every field has a default so partially filled analyses still load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchDetail {
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, DimensionScore>,
    #[serde(default)]
    pub overall_assessment: String,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

impl MatchDetail {
    pub fn with_dimension(
        mut self,
        name: impl Into<String>,
        score: f64,
        reason: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        self.dimension_scores.insert(
            name.into(),
            DimensionScore {
                score,
                reason: reason.into(),
                suggestion: suggestion.into(),
            },
        );
        self
    }

    pub fn with_assessment(mut self, assessment: impl Into<String>) -> Self {
        self.overall_assessment = assessment.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.improvement_suggestions.push(suggestion.into());
        self
    }
}

/// Result of evaluating one resume against one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    #[serde(default)]
    pub detail: MatchDetail,
}

impl Evaluation {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            detail: MatchDetail::default(),
        }
    }

    pub fn with_detail(mut self, detail: MatchDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// An evaluation ready to be persisted, before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeDraft {
    pub resume_id: ResumeId,
    pub job_id: JobId,
    pub score: f64,
    pub detail: MatchDetail,
    pub computed_at: DateTime<Utc>,
}

impl OutcomeDraft {
    pub fn new(pair: &MatchRequestPair, evaluation: Evaluation, computed_at: DateTime<Utc>) -> Self {
        Self {
            resume_id: pair.resume_id.clone(),
            job_id: pair.job_id.clone(),
            score: evaluation.score,
            detail: evaluation.detail,
            computed_at,
        }
    }
}

/// A persisted match outcome. Immutable once written; only deletion touches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub id: MatchId,
    pub resume_id: ResumeId,
    pub job_id: JobId,
    pub score: f64,
    #[serde(default)]
    pub detail: MatchDetail,
    pub computed_at: DateTime<Utc>,
}

impl MatchOutcome {
    pub fn from_draft(id: MatchId, draft: OutcomeDraft) -> Self {
        Self {
            id,
            resume_id: draft.resume_id,
            job_id: draft.job_id,
            score: draft.score,
            detail: draft.detail,
            computed_at: draft.computed_at,
        }
    }
}
