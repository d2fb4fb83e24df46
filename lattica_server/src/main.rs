//! Lattica server binary.
//!
//! ```bash
//! # Start with defaults (embedded in-memory stores)
//! lattica_server
//!
//! # Start with a config file
//! lattica_server --config lattica.toml
//!
//! # Print a documented example config and exit
//! lattica_server --init-config
//!
//! # Batch-ingest files from the command line
//! lattica_server ingest docs/*.md --domain handbook
//! ```
//!
//! Exit codes for the CLI paths: 0 success, 2 invalid arguments, 3 store
//! unavailable, 4 partial success with failures, 1 unexpected error.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lattica_config::LatticaConfig;
use lattica_core::{DocumentStatus, ErrorKind};
use lattica_extraction::chunker::DocumentFormat;
use lattica_server::state::AppState;

/// Lattica hybrid retrieval engine.
#[derive(Parser, Debug)]
#[command(name = "lattica_server")]
#[command(about = "Lattica — hybrid graph + vector + keyword retrieval engine")]
#[command(version)]
struct Cli {
    /// Path to a lattica.toml config file. Also via LATTICA_CONFIG.
    #[arg(short, long, env = "LATTICA_CONFIG", global = true)]
    config: Option<String>,

    /// Print a documented example lattica.toml and exit.
    #[arg(long)]
    init_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest files into the engine and exit.
    Ingest {
        /// Files to ingest.
        paths: Vec<String>,
        /// Corpus domain tag.
        #[arg(long, default_value = "general")]
        domain: String,
        /// Skip entity/relation extraction.
        #[arg(long)]
        skip_knowledge_graph: bool,
    },
}

fn init_tracing(config: &LatticaConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.server.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LatticaConfig> {
    match &cli.config {
        Some(path) => LatticaConfig::from_file(path),
        None => {
            let mut config = LatticaConfig::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.init_config {
        print!("{}", LatticaConfig::example_toml_commented());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config);

    match cli.command {
        Some(Commands::Ingest { paths, domain, skip_knowledge_graph }) => {
            ingest_command(config, paths, domain, !skip_knowledge_graph).await
        }
        None => serve(config).await,
    }
}

async fn serve(config: LatticaConfig) -> ExitCode {
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let state = match AppState::from_config(config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            tracing::error!("failed to build application state: {err}");
            return ExitCode::from(3);
        }
    };
    if let Err(err) = state.rebuild_keyword_index().await {
        tracing::warn!("keyword index rebuild failed at startup: {err}");
    }

    tracing::info!(
        "Lattica server starting on {} (stores: {})",
        bind,
        state.config.stores.mode
    );
    let app = lattica_server::router(state);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind {bind}: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("server error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn ingest_command(
    config: LatticaConfig,
    paths: Vec<String>,
    domain: String,
    build_knowledge_graph: bool,
) -> ExitCode {
    if paths.is_empty() {
        eprintln!("no input files given");
        return ExitCode::from(2);
    }
    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(err) => {
            eprintln!("failed to build engine: {err}");
            return ExitCode::from(3);
        }
    };

    let mut failures = 0usize;
    let mut partials = 0usize;
    for path in &paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                eprintln!("{path}: read failed: {err}");
                failures += 1;
                continue;
            }
        };
        let name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path.as_str());
        let format = DocumentFormat::from_filename(name);
        match state
            .ingestion
            .ingest_document(name, &domain, format, &text, build_knowledge_graph)
            .await
        {
            Ok(report) => {
                println!(
                    "{name}: {} chunks, {} entities, {} relations ({:?})",
                    report.chunks, report.entities, report.relations, report.status
                );
                if report.status == DocumentStatus::Partial {
                    partials += 1;
                }
            }
            Err(err) => {
                eprintln!("{name}: ingestion failed: {err}");
                match err.kind() {
                    ErrorKind::TransientDependency | ErrorKind::PermanentDependency => {
                        return ExitCode::from(3);
                    }
                    _ => failures += 1,
                }
            }
        }
    }

    if failures > 0 || partials > 0 {
        ExitCode::from(4)
    } else {
        ExitCode::SUCCESS
    }
}
