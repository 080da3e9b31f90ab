//! Job postings and resume profiles

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Declared experience requirement of a posting, `min <= max` by construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRange {
    min: f32,
    max: f32,
}

impl ExperienceRange {
    /// Returns `None` for negative, non-finite, or inverted bounds
    pub fn new(min: f32, max: f32) -> Option<Self> {
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return None;
        }
        Some(Self { min, max })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }
}

/// A job posting, read-only once the corpus is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub title: String,
    pub company: String,
    pub description: String,
    pub required_skills: BTreeSet<String>,
    /// `None` when the record carried no usable range
    pub experience: Option<ExperienceRange>,
}

impl JobPosting {
    pub fn new(id: impl Into<String>, title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            company: company.into(),
            description: String::new(),
            required_skills: BTreeSet::new(),
            experience: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills = skills
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    pub fn with_experience(mut self, min: f32, max: f32) -> Self {
        self.experience = ExperienceRange::new(min, max);
        self
    }

    /// Text sent to the embedding provider for this posting
    pub fn embedding_text(&self) -> String {
        if self.description.trim().is_empty() {
            format!("{} at {}", self.title, self.company)
        } else {
            self.description.clone()
        }
    }
}

/// Structured view of an uploaded resume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeProfile {
    pub raw_text: String,
    pub skills: BTreeSet<String>,
    pub experience_years: f32,
    /// False when the parser found no statement of experience at all
    pub experience_known: bool,
    pub education: Vec<String>,
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl ResumeProfile {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            name: "Unknown".to_string(),
            ..Default::default()
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_experience_years(mut self, years: f32) -> Self {
        self.experience_years = if years.is_finite() { years.max(0.0) } else { 0.0 };
        self.experience_known = years.is_finite();
        self
    }

    /// Candidate years when known
    pub fn known_experience(&self) -> Option<f32> {
        self.experience_known.then_some(self.experience_years)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(ExperienceRange::new(5.0, 3.0).is_none());
        assert!(ExperienceRange::new(-1.0, 3.0).is_none());
        assert!(ExperienceRange::new(f32::NAN, 3.0).is_none());
        let range = ExperienceRange::new(3.0, 3.0).unwrap();
        assert_eq!(range.min(), range.max());
    }

    #[test]
    fn test_job_builder_trims_skills() {
        let job = JobPosting::new("1", "Data Scientist", "Acme")
            .with_skills(vec![" Python ", "", "SQL"])
            .with_experience(2.0, 6.0);
        assert_eq!(job.required_skills.len(), 2);
        assert!(job.required_skills.contains("Python"));
        assert_eq!(job.experience.unwrap().max(), 6.0);
    }

    #[test]
    fn test_embedding_text_falls_back_to_title() {
        let job = JobPosting::new("7", "ML Engineer", "Initech");
        assert_eq!(job.embedding_text(), "ML Engineer at Initech");
        let job = job.with_description("Build models");
        assert_eq!(job.embedding_text(), "Build models");
    }

    #[test]
    fn test_resume_experience_is_clamped() {
        let resume = ResumeProfile::new("text").with_experience_years(-3.0);
        assert_eq!(resume.experience_years, 0.0);
        assert_eq!(resume.known_experience(), Some(0.0));
        assert_eq!(ResumeProfile::new("text").known_experience(), None);
    }
}
