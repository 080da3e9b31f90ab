//! End-to-end match pipeline: corpus indexing, resume ranking and report assembly

use crate::config::Config;
use crate::error::Result;
use crate::input::{load_jobs, InputManager, ParsedResume};
use crate::llm::analyzer::{fallback_analysis, QualitativeAnalyst};
use crate::llm::client::LlmClient;
use crate::output::report::{
    Degradation, ModelsUsed, RankingReport, ReportMetadata, ReportedMatch, ResumeSummary, SummaryStatistics,
};
use crate::processing::document::JobPosting;
use crate::processing::embedding_providers::provider_from_config;
use crate::processing::embeddings::EmbeddingEngine;
use crate::processing::ranker::{CorpusSource, RankedMatch, RankingEngine};
use crate::processing::skill_matcher::SkillMatcher;
use crate::retry::RetryPolicy;
use chrono::Utc;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub use crate::processing::ranker::CorpusSummary;

fn corpus_degradations(corpus: &CorpusSummary) -> Vec<Degradation> {
    let mut degradations: Vec<Degradation> = corpus
        .warnings
        .iter()
        .map(|message| Degradation::JobRecordRepaired {
            message: message.clone(),
        })
        .collect();
    if corpus.skipped_rows > 0 {
        degradations.push(Degradation::JobRecordsSkipped {
            count: corpus.skipped_rows,
        });
    }
    if !corpus.build.degraded_jobs.is_empty() {
        degradations.push(Degradation::ZeroVectorEmbeddings {
            job_ids: corpus.build.degraded_jobs.clone(),
        });
    }
    degradations
}

pub struct MatchPipeline {
    config: Arc<Config>,
    input: InputManager,
    engine: RankingEngine,
    analyst: QualitativeAnalyst,
}

impl MatchPipeline {
    /// Wire every component from a validated config
    pub fn from_config(config: Arc<Config>) -> Result<Self> {
        let skill_matcher = Arc::new(SkillMatcher::with_custom_synonyms(&config.skills.synonyms)?);

        let embeddings = EmbeddingEngine::new(
            provider_from_config(&config)?,
            RetryPolicy::from_config(&config.retry),
            config.processing.batch_size,
        )
        .with_cache(config.processing.enable_caching);
        let engine = RankingEngine::new(&config, embeddings, skill_matcher.clone());
        let analyst = QualitativeAnalyst::new(LlmClient::from_config(&config)?, &config);
        let input = InputManager::new(&config, skill_matcher)?;

        Ok(Self::from_parts(config, input, engine, analyst))
    }

    pub fn from_parts(
        config: Arc<Config>,
        input: InputManager,
        engine: RankingEngine,
        analyst: QualitativeAnalyst,
    ) -> Self {
        Self {
            config,
            input,
            engine,
            analyst,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.engine = self.engine.with_progress(show_progress);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &RankingEngine {
        &self.engine
    }

    /// Load a corpus file and replace the index with it
    pub async fn index_jobs_file(&self, path: &Path) -> Result<CorpusSummary> {
        let loaded = load_jobs(path)?;
        self.index_loaded(
            path.display().to_string(),
            loaded.jobs,
            loaded.warnings,
            loaded.skipped_rows,
        )
        .await
    }

    pub async fn index_jobs(&self, source: &str, jobs: Vec<JobPosting>) -> Result<CorpusSummary> {
        self.index_loaded(source.to_string(), jobs, Vec::new(), 0).await
    }

    async fn index_loaded(
        &self,
        jobs_file: String,
        jobs: Vec<JobPosting>,
        warnings: Vec<String>,
        skipped_rows: usize,
    ) -> Result<CorpusSummary> {
        let source = CorpusSource {
            jobs_file,
            warnings,
            skipped_rows,
        };
        let summary = self.engine.build_index_from(source, jobs).await?;
        let build = &summary.build;
        info!(
            "Indexed {} jobs ({:?}, dimension {}) in {}ms",
            build.jobs_indexed, build.mode, build.dimension, build.processing_time_ms
        );
        if !build.degraded_jobs.is_empty() {
            warn!(
                "{} jobs indexed with zero-vector embeddings",
                build.degraded_jobs.len()
            );
        }
        Ok(summary)
    }

    pub async fn corpus_summary(&self) -> Option<CorpusSummary> {
        self.engine.corpus_summary().await
    }

    /// Parse a resume file and rank the indexed corpus against it
    pub async fn rank_resume_file(&self, path: &Path) -> Result<RankingReport> {
        let start_time = Instant::now();
        let parsed = self.input.parse_resume_file(path).await?;
        self.rank_parsed(parsed, &path.display().to_string(), start_time).await
    }

    pub async fn rank_resume_bytes(&self, bytes: &[u8], filename: &str) -> Result<RankingReport> {
        let start_time = Instant::now();
        let parsed = self.input.parse_resume_bytes(bytes, filename).await?;
        self.rank_parsed(parsed, filename, start_time).await
    }

    async fn rank_parsed(&self, parsed: ParsedResume, resume_file: &str, start_time: Instant) -> Result<RankingReport> {
        let mut degradations = Vec::new();
        if let Some(reason) = &parsed.fallback_reason {
            degradations.push(Degradation::ResumeParserFallback {
                reason: reason.clone(),
            });
        }
        let profile = &parsed.profile;
        let outcome = self.engine.rank(profile).await?;
        degradations.extend(corpus_degradations(&outcome.corpus));

        let placeholder_jobs = outcome.placeholder_experience_jobs();
        if !placeholder_jobs.is_empty() {
            degradations.push(Degradation::UnknownExperience {
                job_ids: placeholder_jobs,
                resume_experience_unknown: profile.known_experience().is_none(),
            });
        }

        let analysed_count = self.config.ranking.analysis_top_n.min(outcome.matches.len());
        let analyses = self
            .analyst
            .batch_analyze(profile, &outcome.matches[..analysed_count])
            .await;

        if self.analyst.has_language_model() {
            for (ranked, analysis) in outcome.matches.iter().zip(&analyses) {
                if let Some(reason) = &analysis.fallback_reason {
                    degradations.push(Degradation::AnalysisFallback {
                        job_id: ranked.job.id.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        let mut analyses = analyses.into_iter();
        let mut matches: Vec<ReportedMatch> = outcome
            .matches
            .into_iter()
            .map(|ranked| ReportedMatch {
                ranked,
                analysis: analyses.next(),
            })
            .collect();

        if self.config.ranking.blend_analysis_score {
            self.blend_analysis_scores(&mut matches);
        }

        let summary = SummaryStatistics::from_matches(&matches, outcome.candidates_considered, outcome.corpus_size);
        for degradation in &degradations {
            warn!("{}", degradation);
        }

        Ok(RankingReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                resume_file: resume_file.to_string(),
                jobs_file: outcome.corpus.jobs_file,
                processing_time_ms: start_time.elapsed().as_millis() as u64,
                models_used: ModelsUsed {
                    embedding_provider: self.engine.embedding_provider().to_string(),
                    llm_model: self.analyst.model_name().map(str::to_string),
                    resume_parser: parsed.parser.clone(),
                },
            },
            resume: ResumeSummary::from(profile),
            summary,
            matches,
            degradations,
        })
    }

    /// Add each match's analysis score to its total and re-sort. Jobs past
    /// the analysed prefix use the rule-based score.
    fn blend_analysis_scores(&self, matches: &mut [ReportedMatch]) {
        let fusion = self.engine.fusion();
        for reported in matches.iter_mut() {
            let analysis_score = match &reported.analysis {
                Some(analysis) => analysis.match_score,
                None => rule_based_score(&reported.ranked),
            };
            reported.ranked.score = fusion.blend(&reported.ranked.score, analysis_score as f32);
        }

        matches.sort_by(|a, b| b.ranked.score.total.total_cmp(&a.ranked.score.total));
        for (i, reported) in matches.iter_mut().enumerate() {
            reported.ranked.rank = i + 1;
        }
    }
}

fn rule_based_score(ranked: &RankedMatch) -> u32 {
    fallback_analysis(&ranked.skill_match, ranked.semantic_score).match_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::resume_parser::ResumeParser;
    use crate::processing::document::ResumeProfile;
    use crate::processing::embedding_providers::HashEmbeddingProvider;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn offline_pipeline(config: Config) -> MatchPipeline {
        pipeline_with_parser(config, None)
    }

    fn pipeline_with_parser(config: Config, remote: Option<Box<dyn ResumeParser>>) -> MatchPipeline {
        let config = Arc::new(config.offline());
        let skill_matcher = Arc::new(SkillMatcher::new().unwrap());
        let embeddings = EmbeddingEngine::new(Arc::new(HashEmbeddingProvider::new(64)), RetryPolicy::none(), 8);
        let engine = RankingEngine::new(&config, embeddings, skill_matcher.clone());
        let analyst = QualitativeAnalyst::rule_based(&config);
        let mut input = InputManager::new(&config, skill_matcher).unwrap();
        if let Some(remote) = remote {
            input = input.with_remote_parser(remote);
        }
        MatchPipeline::from_parts(config, input, engine, analyst)
    }

    /// Remote parser that only returns once `parties` parses are in flight
    struct RendezvousParser {
        barrier: Barrier,
    }

    #[async_trait]
    impl ResumeParser for RendezvousParser {
        fn name(&self) -> &str {
            "rendezvous"
        }

        async fn parse(&self, bytes: &[u8], _filename: &str) -> crate::error::Result<ResumeProfile> {
            self.barrier.wait().await;
            Ok(ResumeProfile::new(String::from_utf8_lossy(bytes)).with_experience_years(4.0))
        }
    }

    fn jobs() -> Vec<JobPosting> {
        vec![
            JobPosting::new("1", "Rust Engineer", "Ferris")
                .with_description("Rust systems programming with tokio and linux")
                .with_skills(["rust", "linux"])
                .with_experience(2.0, 6.0),
            JobPosting::new("2", "Accountant", "Ledger")
                .with_description("Bookkeeping, tax returns and audits")
                .with_skills(["excel"]),
        ]
    }

    const RESUME: &[u8] = b"Sam Lee\n4 years of experience building Rust services on Linux with tokio";

    #[tokio::test]
    async fn test_ranking_before_indexing_fails() {
        let pipeline = offline_pipeline(Config::default());
        let err = pipeline.rank_resume_bytes(RESUME, "cv.txt").await.unwrap_err();
        assert!(matches!(err, crate::error::KeenEyeError::IndexNotBuilt));
    }

    #[tokio::test]
    async fn test_report_lists_unknown_experience() {
        let pipeline = offline_pipeline(Config::default());
        pipeline.index_jobs("memory", jobs()).await.unwrap();

        let report = pipeline.rank_resume_bytes(RESUME, "cv.txt").await.unwrap();
        assert_eq!(report.matches.len(), 2);
        assert_eq!(report.best_match().unwrap().ranked.job.id, "1");
        assert_eq!(report.metadata.models_used.embedding_provider, "hash");
        assert!(report.metadata.models_used.llm_model.is_none());
        assert!(report.degradations.iter().any(|d| matches!(
            d,
            Degradation::UnknownExperience { job_ids, resume_experience_unknown: false } if job_ids == &vec!["2".to_string()]
        )));
        // Rule-based by choice is not a degradation
        assert_eq!(report.analysis_fallbacks(), 0);
        assert!(report.matches.iter().all(|m| m.analysis.is_some()));
    }

    #[tokio::test]
    async fn test_analysis_limited_to_top_n() {
        let mut config = Config::default();
        config.ranking.analysis_top_n = 1;
        let pipeline = offline_pipeline(config);
        pipeline.index_jobs("memory", jobs()).await.unwrap();

        let report = pipeline.rank_resume_bytes(RESUME, "cv.txt").await.unwrap();
        assert!(report.matches[0].analysis.is_some());
        assert!(report.matches[1].analysis.is_none());
    }

    #[tokio::test]
    async fn test_blending_adds_analysis_points_everywhere() {
        let mut config = Config::default();
        config.ranking.blend_analysis_score = true;
        config.ranking.analysis_top_n = 1;
        let pipeline = offline_pipeline(config);
        pipeline.index_jobs("memory", jobs()).await.unwrap();

        let report = pipeline.rank_resume_bytes(RESUME, "cv.txt").await.unwrap();
        for (i, reported) in report.matches.iter().enumerate() {
            assert_eq!(reported.ranked.rank, i + 1);
            assert!(reported.ranked.score.analysis_points.is_some());
        }
        let totals: Vec<f32> = report.matches.iter().map(|m| m.ranked.final_score()).collect();
        assert!(totals.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_resume_parses_run_concurrently() {
        let parser = RendezvousParser {
            barrier: Barrier::new(2),
        };
        let pipeline = pipeline_with_parser(Config::default(), Some(Box::new(parser)));
        pipeline.index_jobs("memory", jobs()).await.unwrap();

        let both = futures::future::join(
            pipeline.rank_resume_bytes(RESUME, "a.txt"),
            pipeline.rank_resume_bytes(RESUME, "b.txt"),
        );
        let (a, b) = tokio::time::timeout(Duration::from_secs(5), both)
            .await
            .expect("resume parses were serialized");
        assert_eq!(a.unwrap().metadata.models_used.resume_parser, "rendezvous");
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_report_names_the_corpus_it_ranked() {
        let pipeline = offline_pipeline(Config::default());
        pipeline.index_jobs("first.csv", jobs()).await.unwrap();
        pipeline.index_jobs("second.csv", jobs()).await.unwrap();

        let report = pipeline.rank_resume_bytes(RESUME, "cv.txt").await.unwrap();
        assert_eq!(report.metadata.jobs_file, "second.csv");
        assert_eq!(pipeline.corpus_summary().await.unwrap().jobs_file, "second.csv");
    }
}
