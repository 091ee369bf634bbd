use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a resume held by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeId(String);

impl ResumeId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reference to a job posting held by the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One unit of work inside a batch: evaluate `resume_id` against `job_id`.
///
/// Immutable once submitted. Duplicates inside a batch are legal and each
/// produces its own outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRequestPair {
    pub resume_id: ResumeId,
    pub job_id: JobId,
}

impl MatchRequestPair {
    pub fn new(resume_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            resume_id: ResumeId::new(resume_id),
            job_id: JobId::new(job_id),
        }
    }

    /// A pair is malformed when either side is blank. Whether the ids exist is
    /// the evaluator's business, not the submitter's.
    pub fn is_malformed(&self) -> bool {
        self.resume_id.as_str().trim().is_empty() || self.job_id.as_str().trim().is_empty()
    }
}

impl fmt::Display for MatchRequestPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resume={} job={}", self.resume_id, self.job_id)
    }
}
