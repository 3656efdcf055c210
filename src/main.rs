//! mixgen-daemon: style remix generation around a single-instance backend.
//!
//! This binary can run in two modes:
//! - CLI mode: one generation, written to a local file
//! - Daemon mode: JSON-RPC server on stdin/stdout

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixgen_daemon::audio::{cleanup_artifact, finalize_artifact};
use mixgen_daemon::backend::create_backend;
use mixgen_daemon::cli::Cli;
use mixgen_daemon::config::DaemonConfig;
use mixgen_daemon::coordinator::GenerationCoordinator;
use mixgen_daemon::prompt::{build_prompt, validate_description};
use mixgen_daemon::rpc::{run_server, ServerState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // stdout carries JSON-RPC responses in daemon mode
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixgen_daemon=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    if !cli.is_daemon_mode() && !cli.is_cli_mode() {
        print_usage();
        return Ok(());
    }

    let mut config = DaemonConfig::from_env();
    cli.apply_to(&mut config);
    if let Some(reason) = config.validate() {
        return Err(anyhow!("invalid configuration: {}", reason));
    }

    tracing::info!(
        backend = %config.backend,
        device = %config.device,
        work_dir = %config.effective_work_dir().display(),
        output_format = %config.output.format,
        "Starting mixgen-daemon"
    );

    let backend = create_backend(&config);
    let coordinator = GenerationCoordinator::start(backend, config.coordinator.clone())
        .await
        .context("generation backend failed to start")?;

    if cli.is_daemon_mode() {
        let state = ServerState::new(Arc::new(coordinator), config);
        run_server(Arc::new(state))
            .await
            .context("JSON-RPC server failed")
    } else {
        let description = cli.description.as_deref().unwrap_or_default();
        run_cli_mode(&cli, description, &coordinator, &config).await
    }
}

/// Runs one generation and copies the result to the output path.
async fn run_cli_mode(
    cli: &Cli,
    description: &str,
    coordinator: &GenerationCoordinator,
    config: &DaemonConfig,
) -> Result<()> {
    validate_description(description)?;
    let prompt = build_prompt(description, &config.prompt_context);
    let output_path = cli.output_path(config.output.format);

    eprintln!("=== mixgen-daemon CLI ===");
    eprintln!("Backend: {}", coordinator.backend_name());
    eprintln!("Prompt: \"{}\"", prompt);
    eprintln!("Output: {}", output_path.display());
    eprintln!();

    let start_time = Instant::now();
    let artifact = coordinator.generate(&prompt).await?;
    let artifact = finalize_artifact(artifact, &config.output).await?;

    let copied = copy_to(&artifact.path, &output_path);
    cleanup_artifact(&artifact.path);
    copied?;

    eprintln!("Generation complete!");
    eprintln!("  Time: {:.2}s", start_time.elapsed().as_secs_f32());
    if let Some(duration) = artifact.duration_sec {
        eprintln!("  Audio duration: {:.2}s", duration);
    }
    eprintln!("  Size: {:.1} MB", artifact.size_mb());
    eprintln!("Saved to: {}", output_path.display());

    Ok(())
}

fn copy_to(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    std::fs::copy(from, to).with_context(|| format!("cannot write {}", to.display()))?;
    Ok(())
}

/// Prints usage information.
fn print_usage() {
    eprintln!("mixgen-daemon: style remixes with MusicGen and ACE-Step");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  One-shot generation:");
    eprintln!("    mixgen-daemon --description \"jazz piano\" --output jazz.mp3");
    eprintln!();
    eprintln!("  ACE-Step repaint of the reference recording:");
    eprintln!("    MIXGEN_REFERENCE_AUDIO=anthem.mp3 mixgen-daemon --backend ace-step -d \"metal\"");
    eprintln!();
    eprintln!("  Daemon mode (JSON-RPC server):");
    eprintln!("    mixgen-daemon --daemon");
    eprintln!();
    eprintln!("Configuration is read from MIXGEN_* environment variables and .env.");
    eprintln!("Run 'mixgen-daemon --help' for full options.");
}
