//! Configuration management for the job ranker
//!
//! A `Config` is loaded once at startup, validated, and handed to every
//! component constructor. Credentials only ever come from the environment.

use crate::error::{KeenEyeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub providers: ProviderConfig,
    pub ranking: RankingConfig,
    pub scoring: ScoringConfig,
    pub processing: ProcessingConfig,
    pub retry: RetryConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub llm: LlmProviderKind,
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_max_tokens: usize,
    pub llm_temperature: f32,
    pub embedding: EmbeddingProviderKind,
    pub embedding_model: String,
    pub embedding_base_url: String,
    pub parser: ParserKind,
    pub parser_endpoint: String,
    #[serde(default, skip_serializing)]
    pub groq_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub apilayer_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// OpenAI-compatible chat completions API (Groq by default)
    ChatCompletions,
    /// Ollama-style local generate endpoint
    Local,
    /// Qualitative analysis always uses the rule-based generator
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Gemini,
    Model2vec,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    Apilayer,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub top_k_semantic: usize,
    pub top_k_final: usize,
    pub analysis_top_n: usize,
    pub analysis_concurrency: usize,
    pub exact_index_threshold: usize,
    pub ivf_max_lists: usize,
    pub ivf_nprobe: usize,
    /// Fit score used when a job or resume carries no usable experience data
    pub experience_placeholder: f32,
    pub blend_analysis_score: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub semantic_weight: f32,
    pub skill_weight: f32,
    pub experience_weight: f32,
    pub llm_weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub embedding_dim: usize,
    pub batch_size: usize,
    pub enable_caching: bool,
    pub max_upload_bytes: usize,
    pub use_local_parser_fallback: bool,
    pub prompt_excerpt_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Extra canonical skill -> surface forms, merged over the built-in table
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub detailed: bool,
    pub color_output: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Console,
    Json,
    Markdown,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProviderConfig {
                llm: LlmProviderKind::ChatCompletions,
                llm_model: "llama-3.3-70b-versatile".to_string(),
                llm_base_url: "https://api.groq.com/openai/v1".to_string(),
                llm_max_tokens: 1024,
                llm_temperature: 0.3,
                embedding: EmbeddingProviderKind::Gemini,
                embedding_model: "text-embedding-004".to_string(),
                embedding_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                parser: ParserKind::Local,
                parser_endpoint: "https://api.apilayer.com/resume_parser/upload".to_string(),
                groq_api_key: None,
                gemini_api_key: None,
                apilayer_api_key: None,
            },
            ranking: RankingConfig {
                top_k_semantic: 50,
                top_k_final: 15,
                analysis_top_n: 5,
                analysis_concurrency: 1,
                exact_index_threshold: 1000,
                ivf_max_lists: 100,
                ivf_nprobe: 8,
                experience_placeholder: 0.5,
                blend_analysis_score: false,
            },
            scoring: ScoringConfig {
                semantic_weight: 0.35,
                skill_weight: 0.30,
                experience_weight: 0.15,
                llm_weight: 0.20,
            },
            processing: ProcessingConfig {
                embedding_dim: 768,
                batch_size: 32,
                enable_caching: true,
                max_upload_bytes: 10 * 1024 * 1024,
                use_local_parser_fallback: true,
                prompt_excerpt_chars: 1500,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 2000,
                max_delay_ms: 16_000,
                request_timeout_secs: 60,
            },
            skills: SkillsConfig::default(),
            output: OutputConfig {
                format: OutputFormat::Console,
                detailed: false,
                color_output: true,
            },
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| KeenEyeError::Configuration(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| KeenEyeError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("keeneye")
            .join("config.toml")
    }

    /// Pull credentials from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_credentials(|key| std::env::var(key).ok())
    }

    /// Fill credentials from an arbitrary lookup; blank values count as unset
    pub fn with_credentials<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = read("GROQ_API_KEY") {
            self.providers.groq_api_key = Some(key);
        }
        if let Some(key) = read("GEMINI_API_KEY") {
            self.providers.gemini_api_key = Some(key);
        }
        if let Some(key) = read("APILAYER_API_KEY") {
            self.providers.apilayer_api_key = Some(key);
        }
        self
    }

    /// Switch to providers that need neither network nor credentials
    pub fn offline(mut self) -> Self {
        self.providers.embedding = EmbeddingProviderKind::Hash;
        self.providers.llm = LlmProviderKind::Disabled;
        self.providers.parser = ParserKind::Local;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        let weights = [
            ("semantic_weight", s.semantic_weight),
            ("skill_weight", s.skill_weight),
            ("experience_weight", s.experience_weight),
            ("llm_weight", s.llm_weight),
        ];
        for (name, weight) in weights {
            if !(0.0..=1.0).contains(&weight) {
                return Err(KeenEyeError::Configuration(format!(
                    "scoring.{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }

        let active = self.active_weight_sum();
        if active > 1.0 + 1e-4 {
            return Err(KeenEyeError::Configuration(format!(
                "active scoring weights sum to {:.3}, which exceeds 1.0",
                active
            )));
        }

        if self.ranking.top_k_semantic == 0 || self.ranking.top_k_final == 0 {
            return Err(KeenEyeError::Configuration(
                "ranking.top_k_semantic and ranking.top_k_final must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ranking.experience_placeholder) {
            return Err(KeenEyeError::Configuration(
                "ranking.experience_placeholder must be within [0, 1]".to_string(),
            ));
        }
        if self.processing.batch_size == 0 {
            return Err(KeenEyeError::Configuration(
                "processing.batch_size must be positive".to_string(),
            ));
        }
        if self.processing.embedding_dim == 0 {
            return Err(KeenEyeError::Configuration(
                "processing.embedding_dim must be positive".to_string(),
            ));
        }

        let missing = self.missing_credentials();
        if !missing.is_empty() {
            return Err(KeenEyeError::Configuration(format!(
                "Missing required API keys: {} (set them in the environment)",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// Weight sum across the components that can contribute to a score
    pub fn active_weight_sum(&self) -> f32 {
        let s = &self.scoring;
        let mut total = s.semantic_weight + s.skill_weight + s.experience_weight;
        if self.ranking.blend_analysis_score {
            total += s.llm_weight;
        }
        total
    }

    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let p = &self.providers;
        let mut missing = Vec::new();
        if p.llm == LlmProviderKind::ChatCompletions && p.groq_api_key.is_none() {
            missing.push("GROQ_API_KEY");
        }
        if p.embedding == EmbeddingProviderKind::Gemini && p.gemini_api_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        if p.parser == ParserKind::Apilayer && p.apilayer_api_key.is_none() {
            missing.push("APILAYER_API_KEY");
        }
        missing
    }

    /// Credential status per provider, without exposing values
    pub fn api_status(&self) -> Vec<(&'static str, &'static str)> {
        let status = |key: &Option<String>, required: bool| match (key.is_some(), required) {
            (true, _) => "configured",
            (false, true) => "missing",
            (false, false) => "optional",
        };
        let p = &self.providers;
        vec![
            ("Groq", status(&p.groq_api_key, p.llm == LlmProviderKind::ChatCompletions)),
            ("Gemini", status(&p.gemini_api_key, p.embedding == EmbeddingProviderKind::Gemini)),
            ("APILayer", status(&p.apilayer_api_key, p.parser == ParserKind::Apilayer)),
        ]
    }
}
