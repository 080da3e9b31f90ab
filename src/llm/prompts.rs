//! Prompt template for the qualitative match analysis

use crate::processing::document::{JobPosting, ResumeProfile};
use crate::processing::experience_matcher::ExperienceFitResult;
use crate::processing::skill_matcher::SkillMatchResult;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

const MAX_REQUIRED_SKILLS: usize = 15;
const MAX_CANDIDATE_SKILLS: usize = 10;
const MAX_MATCHED_SKILLS: usize = 10;
const MAX_MISSING_SKILLS: usize = 5;

#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub match_analysis: String,
    /// Grapheme cap on the description and resume excerpts
    pub excerpt_limit: usize,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new(1500)
    }
}

/// Values substituted into the template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptParams {
    pub job_title: String,
    pub company: String,
    pub experience_range: String,
    pub required_skills: String,
    pub job_description: String,
    pub candidate_name: String,
    pub candidate_experience: String,
    pub candidate_skills: String,
    pub resume_excerpt: String,
    pub semantic_score: String,
    pub skill_counts: String,
    pub skill_coverage: String,
    pub matched_skills: String,
    pub missing_skills: String,
    pub experience_fit: String,
}

impl PromptTemplates {
    pub fn new(excerpt_limit: usize) -> Self {
        Self {
            match_analysis: MATCH_ANALYSIS_TEMPLATE.to_string(),
            excerpt_limit,
        }
    }

    pub fn params(
        &self,
        resume: &ResumeProfile,
        job: &JobPosting,
        skills: &SkillMatchResult,
        semantic_score: f32,
        experience: Option<&ExperienceFitResult>,
    ) -> PromptParams {
        PromptParams {
            job_title: job.title.clone(),
            company: job.company.clone(),
            experience_range: job
                .experience
                .map(|r| format!("{}-{} years", r.min(), r.max()))
                .unwrap_or_else(|| "not stated".to_string()),
            required_skills: join_capped(&job.required_skills, MAX_REQUIRED_SKILLS),
            job_description: truncate_graphemes(&job.description, self.excerpt_limit),
            candidate_name: resume.name.clone(),
            candidate_experience: resume
                .known_experience()
                .map(|y| format!("{} years", y))
                .unwrap_or_else(|| "not stated".to_string()),
            candidate_skills: join_capped(&resume.skills, MAX_CANDIDATE_SKILLS),
            resume_excerpt: truncate_graphemes(&resume.raw_text, self.excerpt_limit),
            semantic_score: format!("{:.3}", semantic_score),
            skill_counts: format!("{}/{}", skills.match_count(), skills.total_required()),
            skill_coverage: format!("{:.1}%", skills.coverage_score * 100.0),
            matched_skills: join_capped(&skills.matched_skills, MAX_MATCHED_SKILLS),
            missing_skills: join_capped(&skills.missing_skills, MAX_MISSING_SKILLS),
            experience_fit: experience
                .map(|fit| fit.fit_category.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// Single left-to-right pass; substituted text is never rescanned
    pub fn render_match_analysis(&self, params: &PromptParams) -> String {
        let mut rendered = String::with_capacity(
            self.match_analysis.len() + params.job_description.len() + params.resume_excerpt.len(),
        );
        let mut rest = self.match_analysis.as_str();
        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let placeholder = after
                .find('}')
                .and_then(|close| params.value(&after[..close]).map(|value| (close, value)));
            match placeholder {
                Some((close, value)) => {
                    rendered.push_str(value);
                    rest = &after[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

impl PromptParams {
    fn value(&self, name: &str) -> Option<&str> {
        let value = match name {
            "job_title" => &self.job_title,
            "company" => &self.company,
            "experience_range" => &self.experience_range,
            "required_skills" => &self.required_skills,
            "job_description" => &self.job_description,
            "candidate_name" => &self.candidate_name,
            "candidate_experience" => &self.candidate_experience,
            "candidate_skills" => &self.candidate_skills,
            "resume_excerpt" => &self.resume_excerpt,
            "semantic_score" => &self.semantic_score,
            "skill_counts" => &self.skill_counts,
            "skill_coverage" => &self.skill_coverage,
            "matched_skills" => &self.matched_skills,
            "missing_skills" => &self.missing_skills,
            "experience_fit" => &self.experience_fit,
            _ => return None,
        };
        Some(value)
    }
}

/// At most `limit` grapheme clusters of `text`
pub fn truncate_graphemes(text: &str, limit: usize) -> String {
    text.graphemes(true).take(limit).collect()
}

fn join_capped<'a, I>(items: I, cap: usize) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let joined = items.into_iter().take(cap).map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "None".to_string()
    } else {
        joined
    }
}

const MATCH_ANALYSIS_TEMPLATE: &str = r#"Review how well this candidate fits the job below. The scores under PRELIMINARY SCORES were computed deterministically; explain and refine them rather than starting over.

<JOB>
Title: {job_title}
Company: {company}
Experience required: {experience_range}
Required skills: {required_skills}

{job_description}
</JOB>

<CANDIDATE>
Name: {candidate_name}
Experience: {candidate_experience}
Skills: {candidate_skills}

{resume_excerpt}
</CANDIDATE>

PRELIMINARY SCORES
- Semantic similarity (0-1): {semantic_score}
- Required skills matched: {skill_counts}
- Skill coverage: {skill_coverage}
- Matched skills: {matched_skills}
- Missing skills: {missing_skills}
- Experience fit: {experience_fit}

Answer with a single JSON object of this shape:
{
  "match_score": <integer 0-100>,
  "strengths": [{"point": "<strength>", "evidence": "<supporting detail from the resume>"}],
  "weaknesses": [{"point": "<gap>", "mitigation": "<how the candidate could close it>"}],
  "recommendation": {"decision": "yes|maybe|no", "reasoning": "<why>", "confidence": "high|medium|low"},
  "key_insights": ["<insight>"]
}

Output the JSON object only. No prose before or after it."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::experience_matcher::ExperienceMatcher;
    use crate::processing::skill_matcher::SkillMatcher;

    fn sample() -> (ResumeProfile, JobPosting, SkillMatchResult) {
        let resume = ResumeProfile::new("Data engineer with Python and SQL")
            .with_skills(["python", "sql"])
            .with_experience_years(4.0);
        let job = JobPosting::new("1", "Data Engineer", "Acme")
            .with_description("Build pipelines with {braces} intact")
            .with_skills(["python", "aws", "sql"])
            .with_experience(3.0, 6.0);
        let skills = SkillMatcher::new()
            .unwrap()
            .match_skills(&resume.skills, &job.required_skills);
        (resume, job, skills)
    }

    #[test]
    fn test_prompt_carries_preliminary_scores() {
        let (resume, job, skills) = sample();
        let fit = ExperienceMatcher::new().fit(4.0, 3.0, 6.0);
        let templates = PromptTemplates::default();
        let prompt = templates.render_match_analysis(&templates.params(&resume, &job, &skills, 0.8123, Some(&fit)));

        assert!(prompt.contains("Semantic similarity (0-1): 0.812"));
        assert!(prompt.contains("Required skills matched: 2/3"));
        assert!(prompt.contains("Skill coverage: 66.7%"));
        assert!(prompt.contains("Missing skills: aws"));
        assert!(prompt.contains("Experience fit: Perfect Fit"));
        assert!(prompt.contains("Experience required: 3-6 years"));
        assert!(prompt.contains("{braces}"));
        assert!(prompt.contains("\"match_score\""));
    }

    #[test]
    fn test_excerpts_are_bounded() {
        let (mut resume, job, skills) = sample();
        resume.raw_text = "é".repeat(5000);
        let templates = PromptTemplates::new(100);
        let params = templates.params(&resume, &job, &skills, 0.5, None);
        assert_eq!(params.resume_excerpt.chars().count(), 100);
        assert_eq!(params.experience_fit, "unknown");
    }

    #[test]
    fn test_empty_skill_lists_render_none() {
        let (_, job, _) = sample();
        let resume = ResumeProfile::new("no skills here");
        let skills = SkillMatcher::new().unwrap().match_skills(&resume.skills, &job.required_skills);
        let params = PromptTemplates::default().params(&resume, &job, &skills, 0.1, None);
        assert_eq!(params.matched_skills, "None");
        assert_eq!(params.candidate_skills, "None");
        assert_eq!(params.candidate_experience, "not stated");
    }

    #[test]
    fn test_placeholders_in_user_text_are_left_alone() {
        let (resume, mut job, skills) = sample();
        job.description = "Paste your {resume_excerpt} and {candidate_name} here".to_string();
        job.title = "Lead {company}".to_string();
        let templates = PromptTemplates::default();
        let prompt = templates.render_match_analysis(&templates.params(&resume, &job, &skills, 0.5, None));

        assert!(prompt.contains("Paste your {resume_excerpt} and {candidate_name} here"));
        assert!(prompt.contains("Title: Lead {company}"));
        assert_eq!(prompt.matches("Data engineer with Python and SQL").count(), 1);
    }
}
