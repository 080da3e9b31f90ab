//! Ranking report: matches, summary statistics and every degraded path taken

use crate::llm::analyzer::QualitativeAnalysis;
use crate::processing::document::ResumeProfile;
use crate::processing::ranker::RankedMatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final-score threshold for a strong match
pub const STRONG_MATCH_SCORE: f32 = 75.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingReport {
    pub metadata: ReportMetadata,
    pub resume: ResumeSummary,
    pub summary: SummaryStatistics,
    pub matches: Vec<ReportedMatch>,
    /// Empty only when every signal came from its primary source
    pub degradations: Vec<Degradation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub resume_file: String,
    pub jobs_file: String,
    pub processing_time_ms: u64,
    pub models_used: ModelsUsed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsUsed {
    pub embedding_provider: String,
    pub llm_model: Option<String>,
    pub resume_parser: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeSummary {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub skills: Vec<String>,
    pub experience_years: Option<f32>,
    pub education: Vec<String>,
}

impl From<&ResumeProfile> for ResumeSummary {
    fn from(profile: &ResumeProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            skills: profile.skills.iter().cloned().collect(),
            experience_years: profile.known_experience(),
            education: profile.education.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedMatch {
    #[serde(flatten)]
    pub ranked: RankedMatch,
    pub analysis: Option<QualitativeAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub jobs_ranked: usize,
    pub candidates_considered: usize,
    pub corpus_size: usize,
    pub average_score: f32,
    pub top_score: f32,
    pub strong_matches: usize,
    pub average_skill_coverage: f32,
}

impl SummaryStatistics {
    pub fn from_matches(matches: &[ReportedMatch], candidates_considered: usize, corpus_size: usize) -> Self {
        let count = matches.len();
        let mean = |values: Vec<f32>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f32>() / values.len() as f32
            }
        };

        Self {
            jobs_ranked: count,
            candidates_considered,
            corpus_size,
            average_score: mean(matches.iter().map(|m| m.ranked.final_score()).collect()),
            top_score: matches
                .iter()
                .map(|m| m.ranked.final_score())
                .fold(0.0, f32::max),
            strong_matches: matches
                .iter()
                .filter(|m| m.ranked.final_score() >= STRONG_MATCH_SCORE)
                .count(),
            average_skill_coverage: mean(
                matches
                    .iter()
                    .map(|m| m.ranked.skill_match.coverage_score)
                    .collect(),
            ),
        }
    }
}

/// A point where the pipeline continued on a fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The remote resume parser failed and the local heuristics ran
    ResumeParserFallback { reason: String },
    /// A job record was loaded with defaults in place of malformed fields
    JobRecordRepaired { message: String },
    /// Rows of the corpus file that could not be read at all
    JobRecordsSkipped { count: usize },
    /// These jobs are indexed with zero vectors
    ZeroVectorEmbeddings { job_ids: Vec<String> },
    /// Experience fit was scored with the placeholder for these jobs
    UnknownExperience {
        job_ids: Vec<String>,
        resume_experience_unknown: bool,
    },
    /// The qualitative analysis for this job is the rule-based one
    AnalysisFallback { job_id: String, reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::ResumeParserFallback { reason } => {
                write!(f, "Resume parsed locally after remote parser failure: {}", reason)
            }
            Degradation::JobRecordRepaired { message } => write!(f, "Job record repaired: {}", message),
            Degradation::JobRecordsSkipped { count } => write!(f, "{} unreadable job rows skipped", count),
            Degradation::ZeroVectorEmbeddings { job_ids } => write!(
                f,
                "{} jobs indexed with zero-vector embeddings: {}",
                job_ids.len(),
                job_ids.join(", ")
            ),
            Degradation::UnknownExperience {
                job_ids,
                resume_experience_unknown,
            } => {
                if *resume_experience_unknown {
                    write!(
                        f,
                        "Resume states no experience; placeholder experience fit used for {} jobs",
                        job_ids.len()
                    )
                } else {
                    write!(
                        f,
                        "Placeholder experience fit used for jobs without a range: {}",
                        job_ids.join(", ")
                    )
                }
            }
            Degradation::AnalysisFallback { job_id, reason } => {
                write!(f, "Rule-based analysis used for job {}: {}", job_id, reason)
            }
        }
    }
}

impl RankingReport {
    pub fn best_match(&self) -> Option<&ReportedMatch> {
        self.matches.first()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn analysis_fallbacks(&self) -> usize {
        self.degradations
            .iter()
            .filter(|d| matches!(d, Degradation::AnalysisFallback { .. }))
            .count()
    }
}
