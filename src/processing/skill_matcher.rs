//! Skill extraction and resume/job skill overlap

use crate::error::{KeenEyeError, Result};
use aho_corasick::{AhoCorasick, MatchKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Synonym-driven skill matcher
pub struct SkillMatcher {
    matcher: AhoCorasick,
    /// Canonical skill for each pattern id
    pattern_skills: Vec<String>,
    /// Pattern ids that only count as a standalone word
    whole_word: Vec<bool>,
    synonyms: BTreeMap<String, BTreeSet<String>>,
}

/// Overlap between a resume's skills and a job's required skills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMatchResult {
    pub matched_skills: BTreeSet<String>,
    pub missing_skills: BTreeSet<String>,
    pub extra_skills: BTreeSet<String>,
    /// |matched| / |required|, 0.0 when nothing is required
    pub coverage_score: f32,
}

impl SkillMatchResult {
    pub fn match_count(&self) -> usize {
        self.matched_skills.len()
    }

    pub fn total_required(&self) -> usize {
        self.matched_skills.len() + self.missing_skills.len()
    }
}

impl SkillMatcher {
    /// Create a matcher over the built-in synonym table
    pub fn new() -> Result<Self> {
        Self::with_custom_synonyms(&BTreeMap::new())
    }

    /// Merge extra canonical -> variant entries over the built-in table
    pub fn with_custom_synonyms(extra: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut synonyms = Self::default_synonyms();
        for (canonical, variants) in extra {
            let canonical = canonical.trim().to_lowercase();
            if canonical.is_empty() {
                continue;
            }
            let entry = synonyms.entry(canonical.clone()).or_default();
            entry.insert(canonical);
            entry.extend(
                variants
                    .iter()
                    .map(|v| v.trim().to_lowercase())
                    .filter(|v| !v.is_empty()),
            );
        }

        let mut patterns = Vec::new();
        let mut pattern_skills = Vec::new();
        let mut whole_word = Vec::new();
        for (canonical, variants) in &synonyms {
            for variant in variants {
                whole_word.push(needs_word_boundary(variant));
                patterns.push(variant.clone());
                pattern_skills.push(canonical.clone());
            }
        }

        // Standard match kind so overlapping variants are all reported
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(&patterns)
            .map_err(|e| KeenEyeError::Processing(format!("Failed to build skill matcher: {}", e)))?;

        Ok(Self {
            matcher,
            pattern_skills,
            whole_word,
            synonyms,
        })
    }

    /// Canonical skills with at least one variant contained in `text`.
    /// Short variants such as "py" or "ml" must stand alone as a word.
    pub fn extract_skills(&self, text: &str) -> BTreeSet<String> {
        let lowered = text.to_lowercase();
        self.matcher
            .find_overlapping_iter(&lowered)
            .filter(|mat| {
                !self.whole_word[mat.pattern().as_usize()] || is_standalone(&lowered, mat.start(), mat.end())
            })
            .map(|mat| self.pattern_skills[mat.pattern().as_usize()].clone())
            .collect()
    }

    /// Case-insensitive set comparison of resume skills against required skills
    pub fn match_skills<R, J>(&self, resume_skills: R, job_skills: J) -> SkillMatchResult
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        let resume_set = normalize(resume_skills);
        let job_set = normalize(job_skills);

        let matched_skills: BTreeSet<String> = resume_set.intersection(&job_set).cloned().collect();
        let missing_skills: BTreeSet<String> = job_set.difference(&resume_set).cloned().collect();
        let extra_skills: BTreeSet<String> = resume_set.difference(&job_set).cloned().collect();

        let coverage_score = if job_set.is_empty() {
            0.0
        } else {
            matched_skills.len() as f32 / job_set.len() as f32
        };

        SkillMatchResult {
            matched_skills,
            missing_skills,
            extra_skills,
            coverage_score,
        }
    }

    pub fn skill_count(&self) -> usize {
        self.synonyms.len()
    }

    pub fn variants(&self, canonical: &str) -> Option<&BTreeSet<String>> {
        self.synonyms.get(&canonical.to_lowercase())
    }

    /// Built-in table: canonical skill -> surface forms
    fn default_synonyms() -> BTreeMap<String, BTreeSet<String>> {
        let table: &[(&str, &[&str])] = &[
            ("python", &["python", "py", "python3"]),
            ("javascript", &["javascript", "js", "node.js", "nodejs"]),
            ("machine learning", &["ml", "machine learning", "machinelearning"]),
            ("deep learning", &["dl", "deep learning", "deeplearning", "neural networks"]),
            ("react", &["react", "reactjs", "react.js"]),
            ("aws", &["aws", "amazon web services"]),
            ("java", &["java"]),
            ("sql", &["sql"]),
            ("angular", &["angular"]),
            ("vue", &["vue"]),
            ("nlp", &["nlp", "natural language processing"]),
            ("computer vision", &["computer vision"]),
            ("azure", &["azure"]),
            ("gcp", &["gcp", "google cloud"]),
            ("docker", &["docker"]),
            ("kubernetes", &["kubernetes", "k8s"]),
            ("tensorflow", &["tensorflow"]),
            ("pytorch", &["pytorch"]),
            ("scikit-learn", &["scikit-learn", "sklearn"]),
            ("pandas", &["pandas"]),
            ("numpy", &["numpy"]),
            ("spark", &["spark"]),
            ("hadoop", &["hadoop"]),
            ("git", &["git"]),
            ("linux", &["linux"]),
            ("rest api", &["rest api"]),
            ("microservices", &["microservices"]),
            ("agile", &["agile"]),
            ("scrum", &["scrum"]),
        ];

        table
            .iter()
            .map(|(canonical, variants)| {
                (
                    canonical.to_string(),
                    variants.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect()
    }
}

/// Variants shorter than this collide with ordinary words ("py" in "happy")
const MIN_EMBEDDED_VARIANT_CHARS: usize = 3;

/// Longer short-form variants that still collide with common words
const STANDALONE_VARIANTS: &[&str] = &["aws", "git", "vue", "k8s"];

fn needs_word_boundary(variant: &str) -> bool {
    variant.chars().count() < MIN_EMBEDDED_VARIANT_CHARS || STANDALONE_VARIANTS.contains(&variant)
}

fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

fn normalize<I>(skills: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    skills
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
