//! CatalogEvaluator - デモ用の評価器
//!
//! 履歴書と求人をメモリ上のカタログから引き、固定の分析結果を返す。
//! 実際のスコアリング（外部 LLM など）はこのリポジトリの対象外。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use matchloom_core::domain::{Evaluation, EvaluationError, MatchDetail, MatchRequestPair};
use matchloom_core::ports::MatchEvaluator;

pub struct CatalogEvaluator {
    resumes: HashMap<String, String>,
    jobs: HashMap<String, String>,
    latency: Duration,
}

impl CatalogEvaluator {
    pub fn new(latency: Duration) -> Self {
        Self {
            resumes: HashMap::new(),
            jobs: HashMap::new(),
            latency,
        }
    }

    pub fn with_resume(mut self, id: &str, content: &str) -> Self {
        self.resumes.insert(id.to_string(), content.to_string());
        self
    }

    pub fn with_job(mut self, id: &str, description: &str) -> Self {
        self.jobs.insert(id.to_string(), description.to_string());
        self
    }

    /// Small fixed catalog used by the demo run.
    pub fn demo(latency: Duration) -> Self {
        Self::new(latency)
            .with_resume("resume-alice", "5 years of Rust backend work, tokio, postgres")
            .with_resume("resume-bob", "3 years of Python data pipelines")
            .with_resume("resume-chen", "new grad, CS degree, systems programming projects")
            .with_job("job-backend", "Senior backend engineer: Rust, async, distributed systems")
    }
}

/// Analysis returned for every known pair.
fn canned_detail() -> MatchDetail {
    MatchDetail::default()
        .with_dimension(
            "job_function",
            85.0,
            "work history closely matches the role",
            "highlight the most relevant projects",
        )
        .with_dimension("education", 90.0, "meets the degree requirement", "")
        .with_dimension(
            "major",
            80.0,
            "field of study is a reasonable fit",
            "mention relevant coursework",
        )
        .with_dimension(
            "years_of_experience",
            75.0,
            "slightly below the requested experience",
            "emphasize project depth and growth",
        )
        .with_dimension(
            "skills",
            88.0,
            "has the core skills for the role",
            "describe the tech stack in more depth",
        )
        .with_assessment("good overall fit with a competitive profile")
        .with_suggestion("describe relevant project experience in more detail")
        .with_suggestion("show both depth and breadth of the tech stack")
        .with_suggestion("quantify results and contributions")
}

#[async_trait]
impl MatchEvaluator for CatalogEvaluator {
    async fn evaluate(&self, pair: &MatchRequestPair) -> Result<Evaluation, EvaluationError> {
        tokio::time::sleep(self.latency).await;

        if !self.resumes.contains_key(pair.resume_id.as_str()) {
            return Err(EvaluationError::ResumeNotFound(pair.resume_id.clone()));
        }
        if !self.jobs.contains_key(pair.job_id.as_str()) {
            return Err(EvaluationError::JobNotFound(pair.job_id.clone()));
        }
        Ok(Evaluation::new(83.6).with_detail(canned_detail()))
    }
}
