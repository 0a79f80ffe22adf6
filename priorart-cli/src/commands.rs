//! Subcommand handlers.

use crate::render::{self, OutputFormat};
use crate::{Commands, ConfigAction};
use priorart_core::config::load_config;
use priorart_core::{AnalysisError, AppConfig, PriorArtAnalyst};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Analyze {
            idea,
            format,
            output,
            plans,
            top_k,
        } => {
            let config = effective_config(workspace, plans, top_k)?;
            let idea = read_idea(&idea)?;
            handle_analyze(&config, &idea, format, output.as_deref()).await
        }
        Commands::Check => handle_check(workspace).await,
        Commands::Config { action } => handle_config(action.unwrap_or(ConfigAction::Show), workspace),
    }
}

/// Load layered configuration, then apply command-line overrides.
fn effective_config(
    workspace: &Path,
    plans: Option<usize>,
    top_k: Option<usize>,
) -> anyhow::Result<AppConfig> {
    let mut config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(plans) = plans {
        config.pipeline.plan_count = plans;
    }
    if let Some(top_k) = top_k {
        config.pipeline.top_k_per_plan = top_k;
        config.pipeline.relaxed_retry_min_results =
            config.pipeline.relaxed_retry_min_results.min(top_k);
    }
    config
        .pipeline
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(config)
}

fn read_idea(arg: &str) -> anyhow::Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut idea = String::new();
    std::io::stdin().read_to_string(&mut idea)?;
    Ok(idea)
}

async fn handle_analyze(
    config: &AppConfig,
    idea: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let analyst = PriorArtAnalyst::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize providers: {}", e))?;
    analyst.check_compatibility().await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling analysis");
            on_signal.cancel();
        }
    });

    let report = match analyst.analyze_with_cancellation(idea, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            print_failure_trace(&e);
            return Err(e.into());
        }
    };

    let rendered = render::render(&report, format)?;
    match output {
        Some(path) => {
            let path = output_path(path, format);
            std::fs::write(&path, rendered)?;
            info!(path = %path.display(), "Report written");
            println!("Report saved to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// A directory gets a timestamped file name; anything else is used as-is.
fn output_path(path: &Path, format: OutputFormat) -> PathBuf {
    if path.is_dir() {
        path.join(render::default_filename(&chrono::Local::now(), format))
    } else {
        path.to_path_buf()
    }
}

fn print_failure_trace(err: &AnalysisError) {
    let Some(trace) = err.trace() else {
        return;
    };
    if trace.is_empty() {
        return;
    }
    eprintln!("Pipeline trace before failure:");
    for event in trace.events() {
        eprintln!("  - {}", render::describe_event(event));
    }
}

async fn handle_check(workspace: &Path) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let analyst = PriorArtAnalyst::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize providers: {}", e))?;
    let dimension = analyst.check_compatibility().await?;
    println!(
        "OK: embedder {} ({}) and vector store {} agree on dimension {}",
        config.embedding.provider, config.embedding.model, config.vector_store.provider, dimension
    );
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".priorart");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
