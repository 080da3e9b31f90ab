//! keeneye: rank job postings against a resume

use anyhow::{bail, Context};
use clap::Parser;
use keeneye::cli::{self, Cli, Commands, ConfigAction};
use keeneye::config::Config;
use keeneye::output::{report_path, save_report_to_file, ReportGenerator};
use keeneye::pipeline::MatchPipeline;
use log::{error, info};
use std::path::Path;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    // Load configuration
    let config = match load_config(cli.config.as_deref(), cli.offline) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            process::exit(1);
        }
    };

    // Execute command
    if let Err(e) = run_command(cli.command, config).await {
        error!("Command failed: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>, offline: bool) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => Config::load()?,
    };
    let config = config.with_env_overrides();
    Ok(if offline { config.offline() } else { config })
}

async fn run_command(command: Commands, mut config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Rank {
            resume,
            jobs,
            top,
            output,
            save,
            detailed,
            no_llm,
        } => {
            cli::validate_file_extension(&resume, &["pdf", "docx", "txt", "md"])
                .map_err(anyhow::Error::msg)
                .context("resume file")?;
            cli::validate_file_extension(&jobs, &["csv", "json"])
                .map_err(anyhow::Error::msg)
                .context("job corpus")?;
            let output_format = cli::parse_output_format(&output).map_err(anyhow::Error::msg)?;

            if let Some(top) = top {
                config.ranking.top_k_final = top;
            }
            if no_llm {
                config.providers.llm = keeneye::config::LlmProviderKind::Disabled;
            }
            config.validate()?;

            info!("Ranking {} against {}", jobs.display(), resume.display());
            let use_colors = config.output.color_output;
            let detailed = detailed || config.output.detailed;
            let pipeline = MatchPipeline::from_config(Arc::new(config))?.with_progress(true);

            let corpus = pipeline
                .index_jobs_file(&jobs)
                .await
                .with_context(|| format!("indexing {}", jobs.display()))?;
            info!(
                "Index ready: {} jobs, dimension {}",
                corpus.build.jobs_indexed, corpus.build.dimension
            );

            let report = pipeline
                .rank_resume_file(&resume)
                .await
                .with_context(|| format!("ranking against {}", resume.display()))?;

            let generator = ReportGenerator::with_options(use_colors && save.is_none(), detailed, true, true);
            let content = generator.generate_report(&report, &output_format)?;

            match save {
                Some(target) => {
                    let path = report_path(&target, &output_format, &resume.to_string_lossy());
                    save_report_to_file(&content, &path)?;
                    println!("Report saved to {}", path.display());
                }
                None => println!("{}", content),
            }
        }

        Commands::Index { jobs } => {
            cli::validate_file_extension(&jobs, &["csv", "json"])
                .map_err(anyhow::Error::msg)
                .context("job corpus")?;
            config.providers.llm = keeneye::config::LlmProviderKind::Disabled;
            config.validate()?;

            let pipeline = MatchPipeline::from_config(Arc::new(config))?.with_progress(true);
            let corpus = pipeline.index_jobs_file(&jobs).await?;

            println!("Index built for {}", corpus.jobs_file);
            println!("  Jobs indexed: {}", corpus.build.jobs_indexed);
            println!("  Dimension: {}", corpus.build.dimension);
            println!("  Mode: {:?}", corpus.build.mode);
            println!("  Zero-vector jobs: {}", corpus.build.degraded_jobs.len());
            println!("  Records repaired: {}", corpus.warnings.len());
            println!("  Rows skipped: {}", corpus.skipped_rows);
            println!("  Time: {}ms", corpus.build.processing_time_ms);
            for warning in &corpus.warnings {
                println!("  ! {}", warning);
            }
        }

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("Current Configuration\n");
                println!("{}", toml::to_string_pretty(&config)?);
            }

            Some(ConfigAction::Path) => {
                println!("{}", Config::config_path().display());
            }

            Some(ConfigAction::Reset) => {
                Config::default().save()?;
                println!("Configuration reset to defaults at {}", Config::config_path().display());
            }

            Some(ConfigAction::Status) => {
                println!("API credentials:");
                for (provider, status) in config.api_status() {
                    println!("  {}: {}", provider, status);
                }
                let missing = config.missing_credentials();
                if !missing.is_empty() {
                    bail!("missing credentials: {}", missing.join(", "));
                }
            }
        },
    }

    Ok(())
}
