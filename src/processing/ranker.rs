//! Ranking engine: semantic retrieval followed by skill/experience rescoring
//!
//! The indexed corpus sits behind an async `RwLock`. Rebuilding takes the
//! write lock and replaces the corpus wholesale; ranking only needs a read
//! lock, so several resumes can be ranked against one corpus at once.

use crate::config::Config;
use crate::error::{KeenEyeError, Result};
use crate::processing::document::{JobPosting, ResumeProfile};
use crate::processing::embeddings::EmbeddingEngine;
use crate::processing::experience_matcher::{ExperienceFitResult, ExperienceMatcher};
use crate::processing::scoring::{ScoreBreakdown, ScoreFusion};
use crate::processing::skill_matcher::{SkillMatchResult, SkillMatcher};
use crate::processing::vector_index::{IndexMode, IndexOptions, VectorIndex};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// A job joined with every signal computed for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    /// 1-based position after sorting by `score.total`
    pub rank: usize,
    pub job: JobPosting,
    pub semantic_score: f32,
    pub distance: f32,
    pub skill_match: SkillMatchResult,
    /// `None` when the job or the resume has no usable experience data
    pub experience_fit: Option<ExperienceFitResult>,
    pub score: ScoreBreakdown,
    /// The job's stored embedding is a zero vector
    pub embedding_degraded: bool,
}

impl RankedMatch {
    pub fn final_score(&self) -> f32 {
        self.score.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBuildSummary {
    pub jobs_indexed: usize,
    pub dimension: usize,
    pub mode: IndexMode,
    /// Ids of jobs whose embeddings fell back to zero vectors
    pub degraded_jobs: Vec<String>,
    pub cache_hits: usize,
    pub processing_time_ms: u64,
}

/// What an indexed corpus was loaded from and how its build went
#[derive(Debug, Clone)]
pub struct CorpusSummary {
    pub jobs_file: String,
    pub build: IndexBuildSummary,
    /// Repairs applied while loading records
    pub warnings: Vec<String>,
    pub skipped_rows: usize,
}

/// Loader-side facts recorded alongside an index
#[derive(Debug, Clone, Default)]
pub struct CorpusSource {
    pub jobs_file: String,
    pub warnings: Vec<String>,
    pub skipped_rows: usize,
}

/// Result of ranking one resume
#[derive(Debug, Clone)]
pub struct RankingOutcome {
    pub matches: Vec<RankedMatch>,
    /// Candidates scored before truncation to the presentation size
    pub candidates_considered: usize,
    pub corpus_size: usize,
    /// The corpus these matches were ranked against
    pub corpus: CorpusSummary,
}

impl RankingOutcome {
    /// Presented matches that scored experience with the placeholder
    pub fn placeholder_experience_jobs(&self) -> Vec<String> {
        self.matches
            .iter()
            .filter(|m| m.score.experience_placeholder)
            .map(|m| m.job.id.clone())
            .collect()
    }

    pub fn degraded_embedding_jobs(&self) -> Vec<String> {
        self.matches
            .iter()
            .filter(|m| m.embedding_degraded)
            .map(|m| m.job.id.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct IndexedCorpus {
    jobs: Vec<JobPosting>,
    degraded: Vec<bool>,
    index: Option<VectorIndex>,
    summary: Option<CorpusSummary>,
}

pub struct RankingEngine {
    embeddings: EmbeddingEngine,
    skill_matcher: Arc<SkillMatcher>,
    experience_matcher: ExperienceMatcher,
    fusion: ScoreFusion,
    index_options: IndexOptions,
    top_k_semantic: usize,
    top_k_final: usize,
    show_progress: bool,
    corpus: RwLock<IndexedCorpus>,
}

impl RankingEngine {
    pub fn new(config: &Config, embeddings: EmbeddingEngine, skill_matcher: Arc<SkillMatcher>) -> Self {
        Self {
            embeddings,
            skill_matcher,
            experience_matcher: ExperienceMatcher::new(),
            fusion: ScoreFusion::from_config(&config.scoring, &config.ranking),
            index_options: IndexOptions::from_config(&config.ranking),
            top_k_semantic: config.ranking.top_k_semantic.max(1),
            top_k_final: config.ranking.top_k_final.max(1),
            show_progress: false,
            corpus: RwLock::new(IndexedCorpus::default()),
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn fusion(&self) -> &ScoreFusion {
        &self.fusion
    }

    pub fn skill_matcher(&self) -> &SkillMatcher {
        &self.skill_matcher
    }

    pub fn embedding_provider(&self) -> &str {
        self.embeddings.provider_name()
    }

    pub async fn corpus_size(&self) -> usize {
        self.corpus.read().await.jobs.len()
    }

    pub async fn is_indexed(&self) -> bool {
        self.corpus.read().await.index.is_some()
    }

    pub async fn corpus_summary(&self) -> Option<CorpusSummary> {
        self.corpus.read().await.summary.clone()
    }

    pub async fn build_index(&self, jobs: Vec<JobPosting>) -> Result<IndexBuildSummary> {
        let summary = self.build_index_from(CorpusSource::default(), jobs).await?;
        Ok(summary.build)
    }

    /// Embed `jobs` and replace the indexed corpus with them. Fails without
    /// touching the current corpus when the index cannot be built or when
    /// not a single job could be embedded.
    pub async fn build_index_from(&self, source: CorpusSource, jobs: Vec<JobPosting>) -> Result<CorpusSummary> {
        let start_time = Instant::now();
        if jobs.is_empty() {
            return Err(KeenEyeError::Configuration(
                "cannot build an index from an empty job corpus".to_string(),
            ));
        }

        info!(
            "Embedding {} jobs with {}",
            jobs.len(),
            self.embeddings.provider_name()
        );
        let texts: Vec<String> = jobs.iter().map(JobPosting::embedding_text).collect();
        let progress = self.progress_bar(texts.len());
        let batch = self.embeddings.embed_batch(&texts, Some(&progress)).await;
        progress.finish_and_clear();

        if batch.degraded_count() == batch.len() {
            return Err(KeenEyeError::Embedding(format!(
                "all {} job embeddings failed; refusing to build an index of zero vectors",
                batch.len()
            )));
        }

        let degraded_jobs: Vec<String> = batch
            .degraded_positions()
            .into_iter()
            .map(|i| jobs[i].id.clone())
            .collect();
        let cache_hits = batch.cache_hits;
        let degraded = batch.degraded.clone();

        let mut index = VectorIndex::new(self.index_options.clone());
        index.build(&jobs, batch.vectors)?;
        let dimension = index.dimension().unwrap_or_default();
        let mode = index.mode().unwrap_or(IndexMode::Exact);

        let summary = CorpusSummary {
            jobs_file: source.jobs_file,
            build: IndexBuildSummary {
                jobs_indexed: jobs.len(),
                dimension,
                mode,
                degraded_jobs,
                cache_hits,
                processing_time_ms: start_time.elapsed().as_millis() as u64,
            },
            warnings: source.warnings,
            skipped_rows: source.skipped_rows,
        };

        *self.corpus.write().await = IndexedCorpus {
            jobs,
            degraded,
            index: Some(index),
            summary: Some(summary.clone()),
        };
        Ok(summary)
    }

    /// Rank the indexed corpus against `resume`, best match first
    pub async fn rank(&self, resume: &ResumeProfile) -> Result<RankingOutcome> {
        if !self.is_indexed().await {
            return Err(KeenEyeError::IndexNotBuilt);
        }
        // No corpus lock across the provider call
        let query = self.embeddings.embed_query(&resume.raw_text).await?;

        let corpus = self.corpus.read().await;
        let index = corpus.index.as_ref().ok_or(KeenEyeError::IndexNotBuilt)?;
        let summary = corpus.summary.clone().ok_or(KeenEyeError::IndexNotBuilt)?;
        let hits = index.search(&query, self.top_k_semantic)?;
        debug!("Semantic search returned {} candidates", hits.len());

        let candidate_years = resume.known_experience();
        if candidate_years.is_none() {
            warn!("Resume states no years of experience; experience fit uses the placeholder");
        }

        let mut matches: Vec<RankedMatch> = hits
            .iter()
            .map(|hit| {
                let job = &corpus.jobs[hit.position];
                let skill_match = self
                    .skill_matcher
                    .match_skills(&resume.skills, &job.required_skills);
                let experience_fit = match (candidate_years, job.experience) {
                    (Some(years), Some(range)) => Some(self.experience_matcher.fit_range(years, &range)),
                    _ => None,
                };
                let score = self.fusion.fuse(
                    hit.similarity,
                    skill_match.coverage_score,
                    experience_fit.as_ref().map(|fit| fit.fit_score),
                );
                RankedMatch {
                    rank: 0,
                    job: job.clone(),
                    semantic_score: hit.similarity,
                    distance: hit.distance,
                    skill_match,
                    experience_fit,
                    score,
                    embedding_degraded: corpus.degraded.get(hit.position).copied().unwrap_or(false),
                }
            })
            .collect();

        let candidates_considered = matches.len();
        sort_and_rank(&mut matches);
        matches.truncate(self.top_k_final);

        info!(
            "Ranked {} candidates, presenting {}",
            candidates_considered,
            matches.len()
        );
        Ok(RankingOutcome {
            matches,
            candidates_considered,
            corpus_size: corpus.jobs.len(),
            corpus: summary,
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("embedding");
        pb
    }
}

/// Stable sort by descending total score, then assign 1-based ranks.
/// Equal scores keep their incoming (semantic search) order.
pub fn sort_and_rank(matches: &mut [RankedMatch]) {
    matches.sort_by(|a, b| b.score.total.total_cmp(&a.score.total));
    for (i, m) in matches.iter_mut().enumerate() {
        m.rank = i + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::embeddings::{EmbeddingProvider, EmbeddingTask};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Embeds "axis:N" as the unit vector on axis N; anything else fails
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn name(&self) -> &str {
            "axis"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    let axis: usize = t
                        .strip_prefix("axis:")
                        .and_then(|n| n.trim().parse().ok())
                        .ok_or_else(|| KeenEyeError::Network(format!("cannot embed {}", t)))?;
                    let mut v = vec![0.0; 4];
                    v[axis % 4] = 1.0;
                    Ok(v)
                })
                .collect()
        }
    }

    fn engine(config: &Config) -> RankingEngine {
        let embeddings = EmbeddingEngine::new(Arc::new(AxisProvider), RetryPolicy::none(), 8);
        RankingEngine::new(config, embeddings, Arc::new(SkillMatcher::new().unwrap()))
    }

    fn job(id: &str, axis: usize, skills: &[&str]) -> JobPosting {
        JobPosting::new(id, format!("Job {}", id), "Acme")
            .with_description(format!("axis:{}", axis))
            .with_skills(skills.iter().copied())
    }

    #[tokio::test]
    async fn test_rank_before_build_fails() {
        let engine = engine(&Config::default());
        let err = engine.rank(&ResumeProfile::new("axis:0")).await.unwrap_err();
        assert!(matches!(err, KeenEyeError::IndexNotBuilt));
    }

    #[tokio::test]
    async fn test_skills_can_outrank_semantics() {
        let engine = engine(&Config::default());
        engine
            .build_index(vec![
                job("semantic", 0, &["cobol"]),
                job("skills", 1, &["python", "sql"]),
            ])
            .await
            .unwrap();

        let resume = ResumeProfile::new("axis:0").with_skills(["python", "sql"]);
        let outcome = engine.rank(&resume).await.unwrap();

        // semantic: 1.0*35 + 0 + 7.5 = 42.5; skills: (1/3)*35 + 30 + 7.5 = 49.17
        assert_eq!(outcome.matches[0].job.id, "skills");
        assert_eq!(outcome.matches[0].rank, 1);
        assert_eq!(outcome.matches[1].rank, 2);
        assert_eq!(outcome.placeholder_experience_jobs().len(), 2);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_search_order() {
        let engine = engine(&Config::default());
        let jobs = (0..6).map(|i| job(&format!("j{}", i), 3, &[])).collect();
        engine.build_index(jobs).await.unwrap();

        let outcome = engine.rank(&ResumeProfile::new("axis:3")).await.unwrap();
        let ids: Vec<&str> = outcome.matches.iter().map(|m| m.job.id.as_str()).collect();
        assert_eq!(ids, vec!["j0", "j1", "j2", "j3", "j4", "j5"]);
    }

    #[tokio::test]
    async fn test_truncates_to_final_size() {
        let mut config = Config::default();
        config.ranking.top_k_final = 2;
        let engine = engine(&config);
        engine
            .build_index((0..5).map(|i| job(&i.to_string(), i, &[])).collect())
            .await
            .unwrap();

        let outcome = engine.rank(&ResumeProfile::new("axis:0")).await.unwrap();
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.candidates_considered, 5);
        assert_eq!(outcome.corpus_size, 5);
    }

    #[tokio::test]
    async fn test_degraded_embeddings_are_reported() {
        let engine = engine(&Config::default());
        let broken = JobPosting::new("broken", "Broken", "Acme").with_description("unembeddable");
        let summary = engine.build_index(vec![job("ok", 0, &[]), broken]).await.unwrap();

        assert_eq!(summary.degraded_jobs, vec!["broken".to_string()]);
        let outcome = engine.rank(&ResumeProfile::new("axis:0")).await.unwrap();
        assert_eq!(outcome.degraded_embedding_jobs(), vec!["broken".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_corpus() {
        let engine = engine(&Config::default());
        engine.build_index(vec![job("kept", 0, &[])]).await.unwrap();

        let broken = JobPosting::new("x", "X", "Acme").with_description("nope");
        assert!(engine.build_index(vec![broken]).await.is_err());
        assert!(engine.build_index(Vec::new()).await.is_err());

        let outcome = engine.rank(&ResumeProfile::new("axis:0")).await.unwrap();
        assert_eq!(outcome.matches[0].job.id, "kept");
    }

    #[tokio::test]
    async fn test_experience_fit_used_when_both_sides_known() {
        let engine = engine(&Config::default());
        engine
            .build_index(vec![job("senior", 0, &[]).with_experience(5.0, 10.0)])
            .await
            .unwrap();

        let resume = ResumeProfile::new("axis:0").with_experience_years(2.0);
        let outcome = engine.rank(&resume).await.unwrap();
        let fit = outcome.matches[0].experience_fit.as_ref().unwrap();
        assert!((fit.fit_score - 0.4).abs() < 1e-6);
        assert!(!outcome.matches[0].score.experience_placeholder);
    }

    /// Parks query embeddings until released; documents embed immediately
    struct GatedProvider {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl EmbeddingProvider for GatedProvider {
        fn name(&self) -> &str {
            "gated"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
            if task == EmbeddingTask::Query {
                self.entered.notify_one();
                self.release.notified().await;
            }
            AxisProvider.embed(texts, task).await
        }
    }

    #[tokio::test]
    async fn test_rebuild_proceeds_while_query_is_embedding() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let provider = GatedProvider {
            entered: entered.clone(),
            release: release.clone(),
        };
        let embeddings = EmbeddingEngine::new(Arc::new(provider), RetryPolicy::none(), 8);
        let engine = Arc::new(RankingEngine::new(
            &Config::default(),
            embeddings,
            Arc::new(SkillMatcher::new().unwrap()),
        ));
        engine.build_index(vec![job("old", 0, &[])]).await.unwrap();

        let ranking = tokio::spawn({
            let engine = engine.clone();
            async move { engine.rank(&ResumeProfile::new("axis:1")).await }
        });
        entered.notified().await;

        let source = CorpusSource {
            jobs_file: "new.csv".to_string(),
            ..CorpusSource::default()
        };
        tokio::time::timeout(
            Duration::from_secs(5),
            engine.build_index_from(source, vec![job("new", 1, &[])]),
        )
        .await
        .expect("rebuild blocked behind a query embedding")
        .unwrap();
        release.notify_one();

        let outcome = ranking.await.unwrap().unwrap();
        assert_eq!(outcome.matches[0].job.id, "new");
        assert_eq!(outcome.corpus.jobs_file, "new.csv");
        assert_eq!(outcome.corpus.build.jobs_indexed, 1);
    }
}
