//! Command-line interface.
//!
//! One-shot generation for local use, or `--daemon` for the JSON-RPC
//! server. Flags override values loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::backend::BackendKind;
use crate::config::DaemonConfig;
use crate::types::ArtifactFormat;

/// Available generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// MusicGen: text-to-music, optional melody conditioning
    Musicgen,
    /// ACE-Step: diffusion repaint of the reference recording
    AceStep,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Musicgen => BackendKind::MusicGen,
            BackendArg::AceStep => BackendKind::AceStep,
        }
    }
}

/// mixgen-daemon: style remixes of a reference piece with MusicGen and ACE-Step
#[derive(Parser, Debug)]
#[command(name = "mixgen-daemon")]
#[command(about = "Style remix generation daemon with MusicGen and ACE-Step backends")]
#[command(version)]
pub struct Cli {
    /// Style to remix into, e.g. "jazz piano" (empty for the plain context)
    #[arg(short, long)]
    pub description: Option<String>,

    /// Output file path (defaults to mix.<format>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generation backend (overrides MIXGEN_BACKEND)
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Per-job generation budget in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Jobs held at once before new requests are rejected
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_queue_depth: Option<u64>,

    /// Run in daemon mode (JSON-RPC over stdio)
    #[arg(long)]
    pub daemon: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Returns true if running in CLI mode (not daemon mode).
    pub fn is_cli_mode(&self) -> bool {
        !self.daemon && self.description.is_some()
    }

    /// Returns true if running in daemon mode.
    pub fn is_daemon_mode(&self) -> bool {
        self.daemon
    }

    /// Returns the effective output path for an artifact of `format`.
    pub fn output_path(&self, format: ArtifactFormat) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("mix.{}", format.extension())))
    }

    /// Applies flag overrides on top of `config`.
    pub fn apply_to(&self, config: &mut DaemonConfig) {
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if let Some(secs) = self.timeout_secs {
            config.coordinator.generation_timeout = Duration::from_secs(secs);
        }
        if let Some(depth) = self.max_queue_depth {
            config.coordinator.max_queue_depth = depth as usize;
        }
    }
}
