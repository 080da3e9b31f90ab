//! Job corpus loading from CSV or JSON with per-record repair

use crate::error::{KeenEyeError, Result};
use crate::processing::document::{ExperienceRange, JobPosting};
use log::{info, warn};
use serde_json::Value;
use std::path::Path;

/// Jobs read from a corpus file, plus every repair applied on the way
#[derive(Debug, Clone, Default)]
pub struct JobLoadResult {
    pub jobs: Vec<JobPosting>,
    pub warnings: Vec<String>,
    pub skipped_rows: usize,
}

/// Record fields as text, before any interpretation
#[derive(Debug, Clone, Default)]
struct RawJob {
    id: Option<String>,
    title: Option<String>,
    company: Option<String>,
    description: Option<String>,
    min_experience: Option<String>,
    max_experience: Option<String>,
    skills: Option<SkillsField>,
}

#[derive(Debug, Clone)]
enum SkillsField {
    List(Vec<String>),
    Text(String),
}

const ID_KEYS: &[&str] = &["Job_ID", "job_id", "id"];
const TITLE_KEYS: &[&str] = &["Job Title", "job_title", "title"];
const COMPANY_KEYS: &[&str] = &["Company", "company"];
const DESCRIPTION_KEYS: &[&str] = &["Job Description", "job_description", "description"];
const MIN_EXPERIENCE_KEYS: &[&str] = &["Min_Experience", "min_experience"];
const MAX_EXPERIENCE_KEYS: &[&str] = &["Max_Experience", "max_experience"];
const SKILLS_KEYS: &[&str] = &["skills_list", "required_skills", "skills"];

/// Load a corpus, choosing the format from the file extension
pub fn load_jobs(path: &Path) -> Result<JobLoadResult> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let content = std::fs::read(path)?;
    let result = match extension.as_str() {
        "csv" => load_jobs_csv(&content)?,
        "json" => load_jobs_json(&content)?,
        _ => {
            return Err(KeenEyeError::UnsupportedFormat(format!(
                "Job corpus must be .csv or .json: {}",
                path.display()
            )))
        }
    };

    info!(
        "Loaded {} jobs from {} ({} repairs, {} rows skipped)",
        result.jobs.len(),
        path.display(),
        result.warnings.len(),
        result.skipped_rows
    );
    Ok(result)
}

pub fn load_jobs_csv(content: &[u8]) -> Result<JobLoadResult> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);
    let headers = reader.headers()?.clone();
    let column = |keys: &[&str]| {
        headers
            .iter()
            .position(|h| keys.iter().any(|k| h.eq_ignore_ascii_case(k)))
    };

    let id_col = column(ID_KEYS);
    let title_col = column(TITLE_KEYS);
    let company_col = column(COMPANY_KEYS);
    let description_col = column(DESCRIPTION_KEYS);
    let min_col = column(MIN_EXPERIENCE_KEYS);
    let max_col = column(MAX_EXPERIENCE_KEYS);
    let skills_col = column(SKILLS_KEYS);

    if title_col.is_none() && description_col.is_none() {
        return Err(KeenEyeError::InvalidInput(
            "CSV has neither a 'Job Title' nor a 'Job Description' column".to_string(),
        ));
    }

    let mut result = JobLoadResult::default();
    for (row, record) in reader.records().enumerate() {
        let row_number = row + 1;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let message = format!("row {}: unreadable record skipped ({})", row_number, err);
                warn!("{}", message);
                result.warnings.push(message);
                result.skipped_rows += 1;
                continue;
            }
        };

        let field = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };
        let raw = RawJob {
            id: field(id_col),
            title: field(title_col),
            company: field(company_col),
            description: field(description_col),
            min_experience: field(min_col),
            max_experience: field(max_col),
            skills: field(skills_col).map(SkillsField::Text),
        };
        result.jobs.push(repair(row_number, raw, &mut result.warnings));
    }
    Ok(result)
}

pub fn load_jobs_json(content: &[u8]) -> Result<JobLoadResult> {
    let value: Value = serde_json::from_slice(content)?;
    let records = match value {
        Value::Array(records) => records,
        _ => {
            return Err(KeenEyeError::InvalidInput(
                "JSON job corpus must be an array of records".to_string(),
            ))
        }
    };

    let mut result = JobLoadResult::default();
    for (row, record) in records.into_iter().enumerate() {
        let row_number = row + 1;
        let Value::Object(map) = record else {
            let message = format!("row {}: not a JSON object, skipped", row_number);
            warn!("{}", message);
            result.warnings.push(message);
            result.skipped_rows += 1;
            continue;
        };

        let lookup = |keys: &[&str]| keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null());
        let text = |keys: &[&str]| lookup(keys).and_then(value_to_text);
        let raw = RawJob {
            id: text(ID_KEYS),
            title: text(TITLE_KEYS),
            company: text(COMPANY_KEYS),
            description: text(DESCRIPTION_KEYS),
            min_experience: text(MIN_EXPERIENCE_KEYS),
            max_experience: text(MAX_EXPERIENCE_KEYS),
            skills: lookup(SKILLS_KEYS).map(|v| match v {
                Value::Array(items) => SkillsField::List(items.iter().filter_map(value_to_text).collect()),
                other => SkillsField::Text(value_to_text(other).unwrap_or_default()),
            }),
        };
        result.jobs.push(repair(row_number, raw, &mut result.warnings));
    }
    Ok(result)
}

fn value_to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Turn a raw record into a posting, defaulting whatever is malformed
fn repair(row_number: usize, raw: RawJob, warnings: &mut Vec<String>) -> JobPosting {
    let mut note = |message: String| {
        warn!("{}", message);
        warnings.push(message);
    };

    let id = raw.id.unwrap_or_else(|| {
        note(format!("row {}: missing job id, using row number", row_number));
        row_number.to_string()
    });
    let title = raw.title.unwrap_or_else(|| {
        note(format!("job {}: missing title", id));
        "Untitled".to_string()
    });
    let company = raw.company.unwrap_or_else(|| "Unknown".to_string());

    let skills = match raw.skills {
        Some(SkillsField::List(items)) => items,
        Some(SkillsField::Text(text)) => parse_skill_list(&text),
        None => {
            note(format!("job {}: no skill list, treated as empty", id));
            Vec::new()
        }
    };

    let mut job = JobPosting::new(id.clone(), title, company)
        .with_description(raw.description.unwrap_or_default())
        .with_skills(skills);

    let min = raw.min_experience.as_deref().map(parse_years);
    let max = raw.max_experience.as_deref().map(parse_years);
    job.experience = match (min, max) {
        (Some(Some(min)), Some(Some(max))) => {
            let range = ExperienceRange::new(min, max);
            if range.is_none() {
                note(format!(
                    "job {}: invalid experience range {}-{}, treated as unknown",
                    id, min, max
                ));
            }
            range
        }
        (None, None) => None,
        _ => {
            note(format!("job {}: incomplete or unparseable experience range, treated as unknown", id));
            None
        }
    };

    job
}

fn parse_years(text: &str) -> Option<f32> {
    text.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Accepts a JSON array, a Python-style list literal, or comma separated text
pub fn parse_skill_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return clean(items);
        }
        let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
        return clean(
            inner
                .split(',')
                .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string()),
        );
    }
    clean(trimmed.split(',').map(str::to_string))
}

fn clean<I: IntoIterator<Item = String>>(items: I) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Job_ID,Job Title,Company,Job Description,Min_Experience,Max_Experience,skills_list\n\
        1,Data Engineer,Acme,Build pipelines,2,5,\"['Python', 'SQL']\"\n\
        ,ML Engineer,Initech,Train models,abc,4,\"[\"\"PyTorch\"\"]\"\n\
        3,Analyst,Globex,Dashboards,6,2,\"excel, sql\"\n\
        4,Intern,Hooli,Learn,,,\n";

    #[test]
    fn test_csv_rows_are_repaired_not_dropped() {
        let result = load_jobs_csv(CSV.as_bytes()).unwrap();
        assert_eq!(result.jobs.len(), 4);
        assert_eq!(result.skipped_rows, 0);

        let first = &result.jobs[0];
        assert_eq!(first.required_skills.len(), 2);
        assert_eq!(first.experience.unwrap().max(), 5.0);

        let second = &result.jobs[1];
        assert_eq!(second.id, "2");
        assert!(second.experience.is_none());
        assert!(second.required_skills.contains("PyTorch"));

        assert!(result.jobs[2].experience.is_none());
        assert!(result.jobs[2].required_skills.contains("excel"));
        assert!(result.jobs[3].required_skills.is_empty());

        // missing id, bad range, inverted range, missing skills
        assert_eq!(result.warnings.len(), 4);
    }

    #[test]
    fn test_json_accepts_both_key_styles() {
        let json = r#"[
            {"Job_ID": 10, "Job Title": "Rust Dev", "Company": "Ferris", "Job Description": "Systems",
             "Min_Experience": 3, "Max_Experience": 7, "skills_list": ["Rust", "Linux"]},
            {"job_id": "11", "title": "Go Dev", "company": "Gopher", "description": "APIs",
             "skills": "go, docker"},
            "not an object"
        ]"#;
        let result = load_jobs_json(json.as_bytes()).unwrap();
        assert_eq!(result.jobs.len(), 2);
        assert_eq!(result.skipped_rows, 1);
        assert_eq!(result.jobs[0].id, "10");
        assert_eq!(result.jobs[0].experience.unwrap().min(), 3.0);
        assert!(result.jobs[1].required_skills.contains("docker"));
        assert!(result.jobs[1].experience.is_none());
    }

    #[test]
    fn test_json_must_be_an_array() {
        assert!(load_jobs_json(br#"{"jobs": []}"#).is_err());
    }

    #[test]
    fn test_skill_list_formats() {
        assert_eq!(parse_skill_list(r#"["a", "b"]"#), vec!["a", "b"]);
        assert_eq!(parse_skill_list("['c++', 'c#']"), vec!["c++", "c#"]);
        assert_eq!(parse_skill_list("x, ,y"), vec!["x", "y"]);
        assert!(parse_skill_list("[]").is_empty());
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.xml");
        std::fs::write(&path, "<jobs/>").unwrap();
        assert!(matches!(load_jobs(&path), Err(KeenEyeError::UnsupportedFormat(_))));
    }
}
