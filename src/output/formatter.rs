//! Output formatters for ranking reports

use crate::config::OutputFormat;
use crate::error::Result;
use crate::llm::analyzer::QualitativeAnalysis;
use crate::output::report::*;
use colored::{Color, Colorize};
use std::path::{Path, PathBuf};

/// Trait for formatting ranking reports
pub trait OutputFormatter {
    fn format_report(&self, report: &RankingReport) -> Result<String>;
    fn supports_format(&self) -> OutputFormat;
}

/// Console formatter with optional colors
pub struct ConsoleFormatter {
    use_colors: bool,
    detailed: bool,
}

pub struct JsonFormatter {
    pretty: bool,
}

pub struct MarkdownFormatter {
    include_metadata: bool,
}

/// Report generator that coordinates different formatters
pub struct ReportGenerator {
    console_formatter: ConsoleFormatter,
    json_formatter: JsonFormatter,
    markdown_formatter: MarkdownFormatter,
}

impl ConsoleFormatter {
    pub fn new(use_colors: bool, detailed: bool) -> Self {
        Self { use_colors, detailed }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn format_header(&self, title: &str, level: u8) -> String {
        let prefix = match level {
            1 => "█",
            2 => "▓",
            3 => "▒",
            _ => "░",
        };

        let color = match level {
            1 => Color::Blue,
            2 => Color::Green,
            3 => Color::Yellow,
            _ => Color::White,
        };

        if self.use_colors {
            format!("\n{} {}\n", prefix.color(color).bold(), title.color(color).bold())
        } else {
            format!("\n{} {}\n", prefix, title)
        }
    }

    fn format_score_badge(&self, score: f32) -> String {
        let (badge, color) = match score.round() as u8 {
            90..=100 => ("EXCELLENT", Color::Green),
            75..=89 => ("STRONG", Color::BrightGreen),
            60..=74 => ("GOOD", Color::Yellow),
            45..=59 => ("FAIR", Color::BrightYellow),
            _ => ("WEAK", Color::Red),
        };

        if self.use_colors {
            format!("[{}]", badge.color(color).bold())
        } else {
            format!("[{}]", badge)
        }
    }

    fn format_analysis(&self, analysis: &QualitativeAnalysis) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "    Analysis ({}): {}/100, recommend {} ({} confidence)\n",
            analysis.source,
            analysis.match_score,
            self.colorize(&analysis.recommendation.decision.to_string(), Color::Cyan),
            analysis.recommendation.confidence
        ));
        if !analysis.recommendation.reasoning.is_empty() {
            output.push_str(&format!("      {}\n", analysis.recommendation.reasoning));
        }
        for strength in &analysis.strengths {
            output.push_str(&format!("      + {}", self.colorize(&strength.point, Color::Green)));
            if self.detailed && !strength.evidence.is_empty() {
                output.push_str(&format!(" ({})", strength.evidence));
            }
            output.push('\n');
        }
        for weakness in &analysis.weaknesses {
            output.push_str(&format!("      - {}", self.colorize(&weakness.point, Color::Red)));
            if self.detailed && !weakness.mitigation.is_empty() {
                output.push_str(&format!(" ({})", weakness.mitigation));
            }
            output.push('\n');
        }
        if self.detailed {
            for insight in &analysis.key_insights {
                output.push_str(&format!("      * {}\n", insight));
            }
        }
        output
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_report(&self, report: &RankingReport) -> Result<String> {
        let mut output = String::new();

        output.push_str(&self.format_header("JOB MATCH RANKING", 1));
        output.push_str(&format!(
            "Generated: {} | Processing time: {}ms\n",
            report.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            report.metadata.processing_time_ms
        ));

        output.push_str(&self.format_header("Candidate", 2));
        output.push_str(&format!("Name: {}\n", report.resume.name));
        let experience = report
            .resume
            .experience_years
            .map(|y| format!("{} years", y))
            .unwrap_or_else(|| "not stated".to_string());
        output.push_str(&format!("Experience: {}\n", experience));
        output.push_str(&format!(
            "Skills ({}): {}\n",
            report.resume.skills.len(),
            report.resume.skills.join(", ")
        ));

        output.push_str(&self.format_header("Summary", 2));
        let s = &report.summary;
        output.push_str(&format!(
            "Ranked {} of {} candidates from a corpus of {}\n",
            s.jobs_ranked, s.candidates_considered, s.corpus_size
        ));
        output.push_str(&format!(
            "Average score: {:.1} | Top score: {:.1} | Strong matches: {} | Avg skill coverage: {:.0}%\n",
            s.average_score,
            s.top_score,
            s.strong_matches,
            s.average_skill_coverage * 100.0
        ));

        output.push_str(&self.format_header("Ranked Matches", 2));
        for reported in &report.matches {
            let m = &reported.ranked;
            output.push_str(&format!(
                "\n{:>2}. {} @ {} {:.1} {}\n",
                m.rank,
                self.colorize(&m.job.title, Color::Cyan),
                m.job.company,
                m.final_score(),
                self.format_score_badge(m.final_score())
            ));
            output.push_str(&format!(
                "    Semantic {:.3} | Skills {}/{} ({:.0}%) | Experience {}\n",
                m.semantic_score,
                m.skill_match.match_count(),
                m.skill_match.total_required(),
                m.skill_match.coverage_score * 100.0,
                m.experience_fit
                    .as_ref()
                    .map(|fit| format!("{} ({:.2})", fit.fit_category, fit.fit_score))
                    .unwrap_or_else(|| "unknown".to_string())
            ));

            if self.detailed {
                output.push_str(&format!(
                    "    Points: semantic {:.1} + skills {:.1} + experience {:.1}{}{}\n",
                    m.score.semantic_points,
                    m.score.skill_points,
                    m.score.experience_points,
                    if m.score.experience_placeholder { " (placeholder)" } else { "" },
                    m.score
                        .analysis_points
                        .map(|p| format!(" + analysis {:.1}", p))
                        .unwrap_or_default()
                ));
                if !m.skill_match.missing_skills.is_empty() {
                    let missing: Vec<&str> = m.skill_match.missing_skills.iter().map(String::as_str).collect();
                    output.push_str(&format!("    Missing: {}\n", missing.join(", ")));
                }
            }

            if let Some(analysis) = &reported.analysis {
                output.push_str(&self.format_analysis(analysis));
            }
        }

        if report.is_degraded() {
            output.push_str(&self.format_header("Degraded Results", 3));
            for degradation in &report.degradations {
                output.push_str(&format!("{} {}\n", self.colorize("!", Color::Yellow), degradation));
            }
        }

        Ok(output)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Console
    }
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_report(&self, report: &RankingReport) -> Result<String> {
        if self.pretty {
            Ok(serde_json::to_string_pretty(report)?)
        } else {
            Ok(serde_json::to_string(report)?)
        }
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Json
    }
}

impl MarkdownFormatter {
    pub fn new(include_metadata: bool) -> Self {
        Self { include_metadata }
    }

    fn markdown_score_badge(score: f32) -> &'static str {
        match score.round() as u8 {
            90..=100 => "🟢 Excellent",
            75..=89 => "🟢 Strong",
            60..=74 => "🟡 Good",
            45..=59 => "🟠 Fair",
            _ => "🔴 Weak",
        }
    }

    /// Keep table cells on one line
    fn cell(text: &str) -> String {
        text.replace('|', "\\|").replace('\n', " ")
    }
}

impl OutputFormatter for MarkdownFormatter {
    fn format_report(&self, report: &RankingReport) -> Result<String> {
        let mut output = String::new();

        output.push_str("# Job Match Ranking\n\n");
        if self.include_metadata {
            output.push_str(&format!(
                "**Generated:** {} | **Processing Time:** {}ms\n",
                report.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                report.metadata.processing_time_ms
            ));
            output.push_str(&format!(
                "**Resume:** `{}` | **Jobs:** `{}` | **Embeddings:** {}\n\n",
                file_name(&report.metadata.resume_file),
                file_name(&report.metadata.jobs_file),
                report.metadata.models_used.embedding_provider
            ));
        }

        output.push_str("## Candidate\n\n");
        output.push_str(&format!("- **Name:** {}\n", report.resume.name));
        output.push_str(&format!(
            "- **Experience:** {}\n",
            report
                .resume
                .experience_years
                .map(|y| format!("{} years", y))
                .unwrap_or_else(|| "not stated".to_string())
        ));
        output.push_str(&format!("- **Skills:** {}\n\n", report.resume.skills.join(", ")));

        output.push_str("## Ranked Matches\n\n");
        output.push_str("| Rank | Job | Company | Score | Semantic | Skills | Experience |\n");
        output.push_str("|------|-----|---------|-------|----------|--------|------------|\n");
        for reported in &report.matches {
            let m = &reported.ranked;
            output.push_str(&format!(
                "| {} | {} | {} | {:.1} {} | {:.3} | {}/{} | {} |\n",
                m.rank,
                Self::cell(&m.job.title),
                Self::cell(&m.job.company),
                m.final_score(),
                Self::markdown_score_badge(m.final_score()),
                m.semantic_score,
                m.skill_match.match_count(),
                m.skill_match.total_required(),
                m.experience_fit
                    .as_ref()
                    .map(|fit| fit.fit_category.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ));
        }
        output.push('\n');

        let analysed: Vec<&ReportedMatch> = report.matches.iter().filter(|m| m.analysis.is_some()).collect();
        if !analysed.is_empty() {
            output.push_str("## Analysis\n\n");
            for reported in analysed {
                let Some(analysis) = &reported.analysis else { continue };
                output.push_str(&format!(
                    "### {}. {} at {}\n\n",
                    reported.ranked.rank, reported.ranked.job.title, reported.ranked.job.company
                ));
                output.push_str(&format!(
                    "**Match score:** {}/100 ({}) | **Recommendation:** {} ({} confidence)\n\n",
                    analysis.match_score,
                    analysis.source,
                    analysis.recommendation.decision,
                    analysis.recommendation.confidence
                ));
                if !analysis.recommendation.reasoning.is_empty() {
                    output.push_str(&format!("{}\n\n", analysis.recommendation.reasoning));
                }
                for strength in &analysis.strengths {
                    output.push_str(&format!("- ✅ **{}**: {}\n", strength.point, strength.evidence));
                }
                for weakness in &analysis.weaknesses {
                    output.push_str(&format!("- ⚠️ **{}**: {}\n", weakness.point, weakness.mitigation));
                }
                output.push('\n');
            }
        }

        if report.is_degraded() {
            output.push_str("## Degraded Results\n\n");
            for degradation in &report.degradations {
                output.push_str(&format!("- {}\n", degradation));
            }
            output.push('\n');
        }

        Ok(output)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Markdown
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self {
            console_formatter: ConsoleFormatter::new(true, false),
            json_formatter: JsonFormatter::new(true),
            markdown_formatter: MarkdownFormatter::new(true),
        }
    }

    pub fn with_options(use_colors: bool, detailed: bool, pretty_json: bool, include_metadata: bool) -> Self {
        Self {
            console_formatter: ConsoleFormatter::new(use_colors, detailed),
            json_formatter: JsonFormatter::new(pretty_json),
            markdown_formatter: MarkdownFormatter::new(include_metadata),
        }
    }

    pub fn generate_report(&self, report: &RankingReport, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Console => self.console_formatter.format_report(report),
            OutputFormat::Json => self.json_formatter.format_report(report),
            OutputFormat::Markdown => self.markdown_formatter.format_report(report),
        }
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn save_report_to_file(content: &str, file_path: &Path) -> Result<()> {
    use std::fs;
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file_path, content)?;
    Ok(())
}

/// `target` itself, or a suggested file name inside it when `target` is a directory
pub fn report_path(target: &Path, format: &OutputFormat, resume_name: &str) -> PathBuf {
    if target.is_dir() {
        target.join(suggest_filename(format, resume_name, true))
    } else {
        target.to_path_buf()
    }
}

pub fn suggest_filename(format: &OutputFormat, resume_name: &str, timestamp: bool) -> String {
    let base_name = Path::new(resume_name)
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();

    let timestamp_suffix = if timestamp {
        format!("_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
    } else {
        String::new()
    };

    match format {
        OutputFormat::Console => format!("{}_matches{}.txt", base_name, timestamp_suffix),
        OutputFormat::Json => format!("{}_matches{}.json", base_name, timestamp_suffix),
        OutputFormat::Markdown => format!("{}_matches{}.md", base_name, timestamp_suffix),
    }
}
