//! Language model integration: client transports, prompts and the qualitative analyst

pub mod client;
pub mod prompts;
pub mod analyzer;

pub use analyzer::{fallback_analysis, AnalysisSource, QualitativeAnalysis, QualitativeAnalyst};
pub use client::{LanguageModel, LlmClient};
