//! Backend abstraction for the generation engines.
//!
//! Both engines (MusicGen and ACE-Step) sit behind [`GenerationBackend`].
//! The engine is chosen once, in [`create_backend`]; nothing downstream
//! branches on which one is active.

use serde::{Deserialize, Serialize};

use crate::config::DaemonConfig;
use crate::error::BackendError;
use crate::types::Artifact;

pub mod ace_step;
pub mod musicgen;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use ace_step::AceStepBackend;
pub use musicgen::MusicGenBackend;
pub use stage::StageProgram;

/// Available generation engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BackendKind {
    /// MusicGen: autoregressive text-to-music, optional melody conditioning.
    #[default]
    #[serde(rename = "musicgen")]
    MusicGen,

    /// ACE-Step: diffusion generation repainting a reference recording.
    #[serde(rename = "ace_step")]
    AceStep,
}

impl BackendKind {
    /// Returns the string representation of the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::MusicGen => "musicgen",
            BackendKind::AceStep => "ace_step",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "musicgen" | "music_gen" => Some(BackendKind::MusicGen),
            "acestep" | "ace_step" => Some(BackendKind::AceStep),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single-instance generation capability.
///
/// `setup` runs exactly once before any `generate` call and is the only
/// place the backend may mutate itself. `generate` is synchronous and may
/// take minutes; callers must not invoke it concurrently.
pub trait GenerationBackend: Send + Sync {
    /// Short engine name for logs and status reports.
    fn name(&self) -> &'static str;

    /// Prepares the backend for serving.
    fn setup(&mut self) -> Result<(), BackendError>;

    /// Produces one recording for `prompt`.
    fn generate(&self, prompt: &str) -> Result<Artifact, BackendError>;
}

/// Builds the backend selected by the configuration.
pub fn create_backend(config: &DaemonConfig) -> Box<dyn GenerationBackend> {
    match config.backend {
        BackendKind::MusicGen => Box::new(MusicGenBackend::new(config)),
        BackendKind::AceStep => Box::new(AceStepBackend::new(config)),
    }
}
