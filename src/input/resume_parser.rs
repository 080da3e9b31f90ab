//! Resume parsing into a `ResumeProfile`, locally or through a remote service

use crate::error::{status_error, KeenEyeError, Result};
use crate::input::file_detector::FileType;
use crate::input::text_extractor::extract_text;
use crate::processing::document::ResumeProfile;
use crate::processing::skill_matcher::SkillMatcher;
use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ResumeParser: Send + Sync {
    fn name(&self) -> &str;

    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ResumeProfile>;
}

const EDUCATION_KEYWORDS: &[(&str, &str)] = &[
    ("bachelor", "Bachelor's Degree"),
    ("master", "Master's Degree"),
    ("phd", "PhD"),
    ("mba", "MBA"),
    ("b.s.", "Bachelor's Degree"),
    ("m.s.", "Master's Degree"),
    ("b.tech", "Bachelor's Degree"),
    ("m.tech", "Master's Degree"),
];

/// Longest first line still accepted as a candidate name
const MAX_NAME_CHARS: usize = 50;

/// Heuristic parser: text extraction, skill dictionary and regex fields
pub struct LocalResumeParser {
    skill_matcher: Arc<SkillMatcher>,
    experience_patterns: Vec<Regex>,
    email_pattern: Regex,
    phone_patterns: Vec<Regex>,
}

impl LocalResumeParser {
    pub fn new(skill_matcher: Arc<SkillMatcher>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| KeenEyeError::Processing(format!("Invalid resume pattern '{}': {}", pattern, e)))
        };

        Ok(Self {
            skill_matcher,
            experience_patterns: vec![
                compile(r"(\d+(?:\.\d+)?)\+?\s*years?\s+(?:of\s+)?experience")?,
                compile(r"experience\s*:\s*(\d+(?:\.\d+)?)\+?\s*years?")?,
                compile(r"(\d+(?:\.\d+)?)\+?\s*yrs\s+(?:of\s+)?experience")?,
            ],
            email_pattern: compile(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phone_patterns: vec![
                compile(r"\+?\d{1,3}[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")?,
                compile(r"\d{10}")?,
            ],
        })
    }

    /// Build a profile from already-extracted text
    pub fn parse_text(&self, text: &str) -> ResumeProfile {
        let mut profile = ResumeProfile::new(text).with_skills(self.skill_matcher.extract_skills(text));
        if let Some(years) = self.extract_experience(text) {
            profile = profile.with_experience_years(years);
        }
        profile.education = extract_education(text);
        profile.name = extract_name(text);
        profile.email = self
            .email_pattern
            .find(text)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        profile.phone = self
            .phone_patterns
            .iter()
            .find_map(|p| p.find(text))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        profile
    }

    /// First stated number of years, `None` when the resume states none
    fn extract_experience(&self, text: &str) -> Option<f32> {
        let lowered = text.to_lowercase();
        self.experience_patterns
            .iter()
            .find_map(|p| p.captures(&lowered))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

fn extract_education(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut degrees: Vec<String> = Vec::new();
    for (keyword, degree) in EDUCATION_KEYWORDS {
        if lowered.contains(keyword) && !degrees.iter().any(|d| d == degree) {
            degrees.push(degree.to_string());
        }
    }
    degrees
}

fn extract_name(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or("").trim();
    if !first_line.is_empty()
        && first_line.chars().count() < MAX_NAME_CHARS
        && !first_line.chars().any(|c| c.is_ascii_digit())
    {
        first_line.to_string()
    } else {
        "Unknown".to_string()
    }
}

#[async_trait]
impl ResumeParser for LocalResumeParser {
    fn name(&self) -> &str {
        "local"
    }

    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ResumeProfile> {
        let text = extract_text(FileType::from_filename(filename), bytes, filename)?;
        if text.trim().is_empty() {
            return Err(KeenEyeError::InvalidInput(format!("No text could be extracted from {}", filename)));
        }
        Ok(self.parse_text(&text))
    }
}

#[derive(Debug, Deserialize)]
struct ApiLayerResponse {
    #[serde(default)]
    raw_text: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    experience: Vec<ApiLayerExperience>,
    #[serde(default)]
    education: Vec<ApiLayerEducation>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLayerExperience {
    #[serde(default)]
    years: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiLayerEducation {
    #[serde(default)]
    name: String,
}

impl ApiLayerResponse {
    fn into_profile(self) -> ResumeProfile {
        let raw_text = self
            .raw_text
            .filter(|t| !t.trim().is_empty())
            .or(self.text)
            .unwrap_or_default();
        let stated: Vec<f32> = self.experience.iter().filter_map(|e| e.years).collect();

        let mut profile = ResumeProfile::new(raw_text)
            .with_skills(self.skills.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()));
        if !stated.is_empty() {
            profile = profile.with_experience_years(stated.iter().sum());
        }
        profile.education = self
            .education
            .into_iter()
            .map(|e| e.name)
            .filter(|n| !n.trim().is_empty())
            .collect();
        profile.name = self.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| "Unknown".to_string());
        profile.email = self.email.unwrap_or_default();
        profile.phone = self.phone.unwrap_or_default();
        profile
    }
}

/// APILayer resume parser: multipart upload, typed response
pub struct ApiLayerResumeParser {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ApiLayerResumeParser {
    pub fn new(endpoint: impl Into<String>, api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeenEyeError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ResumeParser for ApiLayerResumeParser {
    fn name(&self) -> &str {
        "apilayer"
    }

    async fn parse(&self, bytes: &[u8], filename: &str) -> Result<ResumeProfile> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(FileType::from_filename(filename).mime_type())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: ApiLayerResponse = response.json().await?;
        let profile = parsed.into_profile();
        if profile.raw_text.trim().is_empty() {
            return Err(KeenEyeError::Decode("resume parser returned no text".to_string()));
        }
        debug!("APILayer parsed {} skills", profile.skills.len());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> LocalResumeParser {
        LocalResumeParser::new(Arc::new(SkillMatcher::new().unwrap())).unwrap()
    }

    const RESUME: &str = "Jane Doe\njane.doe@example.com | +1 555-123-4567\n\
        Senior data engineer with 7+ years of experience in Python, SQL and AWS.\n\
        M.S. Computer Science, Bachelor of Engineering";

    #[test]
    fn test_local_parser_fields() {
        let profile = parser().parse_text(RESUME);
        assert_eq!(profile.name, "Jane Doe");
        assert_eq!(profile.email, "jane.doe@example.com");
        assert_eq!(profile.phone, "+1 555-123-4567");
        assert_eq!(profile.known_experience(), Some(7.0));
        assert!(profile.skills.contains("python"));
        assert!(profile.skills.contains("aws"));
        assert_eq!(profile.education, vec!["Bachelor's Degree", "Master's Degree"]);
    }

    #[test]
    fn test_prose_without_skills_yields_none() {
        let profile = parser().parse_text("Sam Lee\nI handle HTML emails and revenue reports, happy to copy edit");
        assert!(profile.skills.is_empty(), "unexpected skills: {:?}", profile.skills);
    }

    #[test]
    fn test_experience_variants() {
        let p = parser();
        assert_eq!(p.parse_text("Experience: 4 years").known_experience(), Some(4.0));
        assert_eq!(p.parse_text("10 yrs of experience").known_experience(), Some(10.0));
        assert_eq!(p.parse_text("Recent graduate").known_experience(), None);
    }

    #[test]
    fn test_name_heuristic_rejects_digits() {
        assert_eq!(extract_name("Resume 2024\nJane"), "Unknown");
        assert_eq!(extract_name(""), "Unknown");
    }

    #[tokio::test]
    async fn test_local_parse_rejects_empty_text() {
        let err = parser().parse(b"   ", "cv.txt").await.unwrap_err();
        assert!(matches!(err, KeenEyeError::InvalidInput(_)));
    }

    #[test]
    fn test_apilayer_response_mapping() {
        let json = r#"{"text": "Resume body", "skills": ["Python", " SQL "],
            "experience": [{"title": "Dev", "years": 2.5}, {"title": "Lead", "years": 3}],
            "education": [{"name": "BSc Physics"}], "name": "", "email": "a@b.io"}"#;
        let parsed: ApiLayerResponse = serde_json::from_str(json).unwrap();
        let profile = parsed.into_profile();
        assert_eq!(profile.raw_text, "Resume body");
        assert_eq!(profile.known_experience(), Some(5.5));
        assert!(profile.skills.contains("sql"));
        assert_eq!(profile.name, "Unknown");
        assert_eq!(profile.education, vec!["BSc Physics"]);
    }
}
