//! Input processing module
//! Handles resume uploads, text extraction and job corpus loading

pub mod file_detector;
pub mod text_extractor;
pub mod resume_parser;
pub mod jobs;
pub mod manager;

pub use jobs::{load_jobs, JobLoadResult};
pub use manager::{InputManager, ParsedResume};
