//! Embedding, matching, scoring and ranking

pub mod document;
pub mod embeddings;
pub mod embedding_providers;
pub mod vector_index;
pub mod skill_matcher;
pub mod experience_matcher;
pub mod scoring;
pub mod ranker;

pub use document::{ExperienceRange, JobPosting, ResumeProfile};
pub use ranker::{RankedMatch, RankingEngine};
