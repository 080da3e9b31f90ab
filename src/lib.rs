//! keeneye library: rank job postings against a resume

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod retry;

pub use config::Config;
pub use error::{KeenEyeError, Result};
pub use pipeline::MatchPipeline;
