//! MusicGen engine.
//!
//! Text-to-music through a MusicGen stage program. When the configured
//! model is a melody variant and the reference recording exists, the
//! recording is passed along for melody conditioning.

use std::path::PathBuf;

use super::stage::StageProgram;
use super::GenerationBackend;
use crate::config::{DaemonConfig, Device, MusicGenConfig};
use crate::error::BackendError;
use crate::types::Artifact;

/// MusicGen backend driving an external stage program.
#[derive(Debug)]
pub struct MusicGenBackend {
    stage: StageProgram,
    params: MusicGenConfig,
    device: Device,
    work_dir: PathBuf,
    reference_audio: Option<PathBuf>,
    melody: Option<PathBuf>,
}

impl MusicGenBackend {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            stage: StageProgram::new(config.musicgen.command.clone()),
            params: config.musicgen.clone(),
            device: config.device,
            work_dir: config.effective_work_dir(),
            reference_audio: config.reference_audio_path.clone(),
            melody: None,
        }
    }

    /// Whether the configured model accepts melody conditioning.
    pub fn supports_melody(&self) -> bool {
        self.params.model_name.contains("melody")
    }

    /// Melody recording used for conditioning, decided during setup.
    pub fn melody(&self) -> Option<&PathBuf> {
        self.melody.as_ref()
    }

    fn stage_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("MUSICGEN_MODEL", self.params.model_name.clone()),
            ("DEVICE", self.device.to_string()),
            ("DURATION", self.params.duration_sec.to_string()),
            ("TOP_K", self.params.top_k.to_string()),
            ("TEMPERATURE", self.params.temperature.to_string()),
            ("CFG_COEF", self.params.cfg_coef.to_string()),
        ];
        if let Some(melody) = &self.melody {
            env.push(("REFERENCE_MELODY_PATH", melody.to_string_lossy().to_string()));
        }
        env
    }
}

impl GenerationBackend for MusicGenBackend {
    fn name(&self) -> &'static str {
        "musicgen"
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        let program = self.stage.resolve()?.to_path_buf();
        std::fs::create_dir_all(&self.work_dir)?;

        self.melody = match &self.reference_audio {
            Some(path) if path.exists() && self.supports_melody() => {
                tracing::info!(path = %path.display(), "Using reference melody");
                Some(path.clone())
            }
            Some(path) if path.exists() => {
                tracing::info!(
                    model = %self.params.model_name,
                    "Model has no melody conditioning, generating from text only"
                );
                None
            }
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Reference melody not found, generating from text only"
                );
                None
            }
            None => None,
        };

        tracing::info!(
            program = %program.display(),
            model = %self.params.model_name,
            device = %self.device,
            duration_sec = self.params.duration_sec,
            "MusicGen backend ready"
        );
        Ok(())
    }

    fn generate(&self, prompt: &str) -> Result<Artifact, BackendError> {
        self.stage.run(prompt, &self.work_dir, &self.stage_env())
    }
}
