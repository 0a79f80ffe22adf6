//! priorart CLI: grounded prior-art analysis of an invention idea.

mod commands;
mod render;

use clap::Parser;
use render::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// priorart: retrieval-augmented patent and prior-art analysis
#[derive(Parser, Debug)]
#[command(name = "priorart", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Analyze an invention idea against the patent index
    Analyze {
        /// Idea text, or `-` to read it from stdin
        idea: String,

        /// Report format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Write the report to this file or directory instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of search plans to generate
        #[arg(long)]
        plans: Option<usize>,

        /// Documents to keep per search plan
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Check that the embedder and vector index dimensions agree
    Check,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace configuration file
    Init,
    /// Print the effective configuration
    Show,
}

fn verbosity_directive(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// `RUST_LOG`, when set and parseable, wins over the verbosity flags.
fn stderr_filter(fallback: &str, rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter(
            verbosity_directive(cli.verbose, cli.quiet),
            std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        ));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "priorart", "priorart")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "priorart.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "priorart", "analyze", "a solar coating", "--format", "json", "--plans", "1",
            "--top-k", "8",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                idea,
                format,
                output,
                plans,
                top_k,
            } => {
                assert_eq!(idea, "a solar coating");
                assert_eq!(format, OutputFormat::Json);
                assert!(output.is_none());
                assert_eq!(plans, Some(1));
                assert_eq!(top_k, Some(8));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["priorart", "-vv", "analyze", "-"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
        assert_eq!(cli.workspace, PathBuf::from("."));
        assert!(matches!(
            cli.command,
            Commands::Analyze {
                format: OutputFormat::Markdown,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_config_without_action() {
        let cli = Cli::try_parse_from(["priorart", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { action: None }));
        let cli = Cli::try_parse_from(["priorart", "config", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: Some(ConfigAction::Init)
            }
        ));
    }

    #[test]
    fn test_stderr_filter_prefers_rust_log() {
        let filter = stderr_filter("info", Some("priorart_core=trace".into()));
        assert_eq!(filter.to_string().to_lowercase(), "priorart_core=trace");

        let filter = stderr_filter(verbosity_directive(0, true), None);
        assert_eq!(filter.to_string().to_lowercase(), "error");

        let filter = stderr_filter(verbosity_directive(2, false), Some("  ".into()));
        assert_eq!(filter.to_string().to_lowercase(), "trace");
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["priorart", "analyze", "x", "--format", "pdf"]).is_err());
    }
}
