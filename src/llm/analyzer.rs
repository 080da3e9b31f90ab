//! Qualitative match analysis: language model verdicts with a rule-based fallback

use crate::config::Config;
use crate::error::{KeenEyeError, Result};
use crate::llm::client::LanguageModel;
use crate::llm::prompts::PromptTemplates;
use crate::processing::document::{JobPosting, ResumeProfile};
use crate::processing::experience_matcher::ExperienceFitResult;
use crate::processing::ranker::RankedMatch;
use crate::processing::skill_matcher::SkillMatchResult;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub point: String,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weakness {
    pub point: String,
    #[serde(default)]
    pub mitigation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Yes,
    Maybe,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Medium
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Yes => "yes",
            Decision::Maybe => "maybe",
            Decision::No => "no",
        })
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub decision: Decision,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: Confidence,
}

impl Recommendation {
    /// Decision bands: 75+ yes, 50+ maybe, otherwise no
    pub fn for_score(match_score: u32) -> Self {
        let (decision, reasoning, confidence) = if match_score >= 75 {
            (
                Decision::Yes,
                "Strong match with excellent skill coverage and alignment",
                Confidence::High,
            )
        } else if match_score >= 50 {
            (
                Decision::Maybe,
                "Moderate match with some gaps that could be addressed",
                Confidence::Medium,
            )
        } else {
            (
                Decision::No,
                "Limited match with significant skill gaps",
                Confidence::Medium,
            )
        };
        Self {
            decision,
            reasoning: reasoning.to_string(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    LanguageModel,
    RuleBased,
}

impl fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnalysisSource::LanguageModel => "language model",
            AnalysisSource::RuleBased => "rule-based fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeAnalysis {
    /// 0-100
    pub match_score: u32,
    pub strengths: Vec<Strength>,
    pub weaknesses: Vec<Weakness>,
    pub recommendation: Recommendation,
    pub key_insights: Vec<String>,
    pub source: AnalysisSource,
    /// Why the rule-based path ran, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl QualitativeAnalysis {
    pub fn is_fallback(&self) -> bool {
        self.source == AnalysisSource::RuleBased
    }
}

/// The one response shape accepted from the model
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    match_score: f64,
    strengths: Vec<Strength>,
    #[serde(default)]
    weaknesses: Vec<Weakness>,
    #[serde(default)]
    recommendation: Option<Recommendation>,
    #[serde(default)]
    key_insights: Vec<String>,
}

/// Deterministic verdict from skill coverage and semantic similarity alone
pub fn fallback_analysis(skills: &SkillMatchResult, semantic_score: f32) -> QualitativeAnalysis {
    let coverage = f64::from(skills.coverage_score);
    let semantic = f64::from(semantic_score);
    let match_score = (coverage * 100.0 * 0.6 + semantic * 100.0 * 0.4).max(0.0) as u32;

    let mut strengths = Vec::new();
    if !skills.matched_skills.is_empty() {
        strengths.push(Strength {
            point: "Strong technical skill alignment".to_string(),
            evidence: format!(
                "Matched {} key skills: {}",
                skills.matched_skills.len(),
                first_n(&skills.matched_skills, 3)
            ),
        });
    }
    if semantic_score > 0.7 {
        strengths.push(Strength {
            point: "Excellent semantic match".to_string(),
            evidence: format!(
                "High similarity score of {:.2} indicates strong relevance",
                semantic_score
            ),
        });
    }
    if strengths.is_empty() {
        strengths.push(Strength {
            point: "Basic qualifications met".to_string(),
            evidence: "Resume contains relevant keywords".to_string(),
        });
    }

    let mut weaknesses = Vec::new();
    if !skills.missing_skills.is_empty() {
        weaknesses.push(Weakness {
            point: "Some skill gaps identified".to_string(),
            mitigation: format!("Consider training in: {}", first_n(&skills.missing_skills, 3)),
        });
    }
    if semantic_score < 0.5 {
        weaknesses.push(Weakness {
            point: "Lower semantic alignment".to_string(),
            mitigation: "Review job description carefully to ensure fit".to_string(),
        });
    }
    if weaknesses.is_empty() {
        weaknesses.push(Weakness {
            point: "Further review needed".to_string(),
            mitigation: "Detailed interview recommended".to_string(),
        });
    }

    QualitativeAnalysis {
        match_score,
        strengths,
        weaknesses,
        recommendation: Recommendation::for_score(match_score),
        key_insights: vec![
            format!("Skill coverage: {:.0}%", coverage * 100.0),
            format!("Semantic similarity: {:.2}", semantic_score),
        ],
        source: AnalysisSource::RuleBased,
        fallback_reason: None,
    }
}

fn first_n<'a, I>(items: I, n: usize) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    items.into_iter().take(n).map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// First balanced `{...}` object in `text`, skipping braces inside JSON strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a model response into an analysis; any shape problem is an error
pub fn parse_analysis(response: &str) -> Result<QualitativeAnalysis> {
    let json = extract_json_object(response)
        .ok_or_else(|| KeenEyeError::Decode("no JSON object in model response".to_string()))?;
    let payload: AnalysisPayload = serde_json::from_str(json)
        .map_err(|e| KeenEyeError::Decode(format!("model response does not match the analysis shape: {}", e)))?;

    if !payload.match_score.is_finite() || !(0.0..=100.0).contains(&payload.match_score) {
        return Err(KeenEyeError::Decode(format!(
            "match_score {} is outside 0-100",
            payload.match_score
        )));
    }
    let match_score = payload.match_score.round() as u32;

    Ok(QualitativeAnalysis {
        match_score,
        strengths: payload.strengths,
        weaknesses: payload.weaknesses,
        recommendation: payload
            .recommendation
            .unwrap_or_else(|| Recommendation::for_score(match_score)),
        key_insights: payload.key_insights,
        source: AnalysisSource::LanguageModel,
        fallback_reason: None,
    })
}

pub struct QualitativeAnalyst {
    llm: Option<Arc<dyn LanguageModel>>,
    templates: PromptTemplates,
    max_tokens: usize,
    temperature: f32,
    concurrency: usize,
}

impl QualitativeAnalyst {
    pub fn new(llm: Option<Arc<dyn LanguageModel>>, config: &Config) -> Self {
        Self {
            llm,
            templates: PromptTemplates::new(config.processing.prompt_excerpt_chars),
            max_tokens: config.providers.llm_max_tokens,
            temperature: config.providers.llm_temperature,
            concurrency: config.ranking.analysis_concurrency.max(1),
        }
    }

    /// Analyst that never calls a model
    pub fn rule_based(config: &Config) -> Self {
        Self::new(None, config)
    }

    pub fn has_language_model(&self) -> bool {
        self.llm.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.llm.as_ref().map(|llm| llm.model_name())
    }

    /// Always produces an analysis; the model path degrades to the rule-based one
    pub async fn analyze_match(
        &self,
        resume: &ResumeProfile,
        job: &JobPosting,
        skills: &SkillMatchResult,
        semantic_score: f32,
        experience: Option<&ExperienceFitResult>,
    ) -> QualitativeAnalysis {
        let Some(llm) = &self.llm else {
            return with_reason(fallback_analysis(skills, semantic_score), "language model disabled");
        };

        let params = self.templates.params(resume, job, skills, semantic_score, experience);
        let prompt = self.templates.render_match_analysis(&params);
        debug!("Analysis prompt for {}: {} chars", job.id, prompt.len());

        let outcome = match llm.generate(&prompt, self.max_tokens, self.temperature).await {
            Ok(response) => parse_analysis(&response),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!("LLM analysis failed for job {}: {}; using rule-based analysis", job.id, err);
                with_reason(fallback_analysis(skills, semantic_score), &err.to_string())
            }
        }
    }

    /// Analyse each match; output order always equals input order
    pub async fn batch_analyze(&self, resume: &ResumeProfile, matches: &[RankedMatch]) -> Vec<QualitativeAnalysis> {
        let total = matches.len();
        // Collected eagerly: spawned rankings need this future to be Send
        let pending: Vec<_> = matches
            .iter()
            .enumerate()
            .map(|(i, ranked)| self.analyze_ranked(i, total, resume, ranked))
            .collect();
        stream::iter(pending).buffered(self.concurrency).collect().await
    }

    async fn analyze_ranked(
        &self,
        index: usize,
        total: usize,
        resume: &ResumeProfile,
        ranked: &RankedMatch,
    ) -> QualitativeAnalysis {
        info!("Analyzing job {}/{}: {}", index + 1, total, ranked.job.title);
        self.analyze_match(
            resume,
            &ranked.job,
            &ranked.skill_match,
            ranked.semantic_score,
            ranked.experience_fit.as_ref(),
        )
        .await
    }
}

fn with_reason(mut analysis: QualitativeAnalysis, reason: &str) -> QualitativeAnalysis {
    analysis.fallback_reason = Some(reason.to_string());
    analysis
}
