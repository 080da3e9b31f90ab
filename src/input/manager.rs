//! Input manager: resume upload validation and parser selection

use crate::config::{Config, ParserKind};
use crate::error::{KeenEyeError, Result};
use crate::input::file_detector::FileType;
use crate::input::resume_parser::{ApiLayerResumeParser, LocalResumeParser, ResumeParser};
use crate::processing::document::ResumeProfile;
use crate::processing::skill_matcher::SkillMatcher;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A parsed resume and how it was produced
#[derive(Debug, Clone)]
pub struct ParsedResume {
    pub profile: ResumeProfile,
    pub parser: String,
    /// Set when the configured remote parser failed and the local one ran
    pub fallback_reason: Option<String>,
}

pub struct InputManager {
    remote: Option<Box<dyn ResumeParser>>,
    local: LocalResumeParser,
    use_local_fallback: bool,
    max_upload_bytes: usize,
    /// Locked only for lookup and insert, never across a parse
    cache: Option<Mutex<HashMap<PathBuf, ParsedResume>>>,
}

impl InputManager {
    pub fn new(config: &Config, skill_matcher: Arc<SkillMatcher>) -> Result<Self> {
        let remote: Option<Box<dyn ResumeParser>> = match config.providers.parser {
            ParserKind::Local => None,
            ParserKind::Apilayer => {
                let api_key = config.providers.apilayer_api_key.clone().ok_or_else(|| {
                    KeenEyeError::Configuration("APILAYER_API_KEY is required for the remote parser".to_string())
                })?;
                Some(Box::new(ApiLayerResumeParser::new(
                    config.providers.parser_endpoint.clone(),
                    api_key,
                    Duration::from_secs(config.retry.request_timeout_secs),
                )?))
            }
        };

        Ok(Self {
            remote,
            local: LocalResumeParser::new(skill_matcher)?,
            use_local_fallback: config.processing.use_local_parser_fallback,
            max_upload_bytes: config.processing.max_upload_bytes,
            cache: config.processing.enable_caching.then(|| Mutex::new(HashMap::new())),
        })
    }

    /// Replace the remote parser, e.g. with a scripted one
    pub fn with_remote_parser(mut self, parser: Box<dyn ResumeParser>) -> Self {
        self.remote = Some(parser);
        self
    }

    pub async fn parse_resume_file(&self, path: &Path) -> Result<ParsedResume> {
        if let Some(cached) = self.cached(path) {
            info!("Using cached resume for: {}", path.display());
            return Ok(cached);
        }

        if !path.exists() {
            return Err(KeenEyeError::InvalidInput(format!(
                "File does not exist: {}",
                path.display()
            )));
        }
        let metadata = tokio::fs::metadata(path).await?;
        self.check_size(metadata.len() as usize)?;

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("resume")
            .to_string();
        let parsed = self.parse_resume_bytes(&bytes, &filename).await?;

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(path.to_path_buf(), parsed.clone());
        }
        Ok(parsed)
    }

    fn cached(&self, path: &Path) -> Option<ParsedResume> {
        let cache = self.cache.as_ref()?;
        let guard = cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.get(path).cloned()
    }

    /// Size and type checks run before any parser, local or remote
    pub async fn parse_resume_bytes(&self, bytes: &[u8], filename: &str) -> Result<ParsedResume> {
        self.check_size(bytes.len())?;
        let file_type = FileType::from_filename(filename);
        if !file_type.is_supported() {
            return Err(KeenEyeError::UnsupportedFormat(format!(
                "Unsupported file type for: {} (expected pdf, docx, txt or md)",
                filename
            )));
        }

        let mut fallback_reason = None;
        if let Some(remote) = &self.remote {
            info!("Parsing {} with {}", filename, remote.name());
            match remote.parse(bytes, filename).await {
                Ok(profile) => {
                    return Ok(ParsedResume {
                        profile,
                        parser: remote.name().to_string(),
                        fallback_reason: None,
                    })
                }
                Err(err) if self.use_local_fallback => {
                    warn!("{} parser failed ({}); falling back to local parser", remote.name(), err);
                    fallback_reason = Some(format!("{} parser failed: {}", remote.name(), err));
                }
                Err(err) => return Err(err),
            }
        }

        info!("Parsing {} locally", filename);
        let profile = self.local.parse(bytes, filename).await?;
        Ok(ParsedResume {
            profile,
            parser: self.local.name().to_string(),
            fallback_reason,
        })
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_upload_bytes {
            return Err(KeenEyeError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    pub fn cache_size(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| {
            cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
        })
    }
}
