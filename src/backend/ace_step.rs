//! ACE-Step engine.
//!
//! Diffusion generation through an ACE-Step stage program. The stage always
//! runs a repaint over the full duration; the reference recording, when one
//! is available, is what gets repainted in the requested style.

use std::path::PathBuf;

use super::stage::StageProgram;
use super::GenerationBackend;
use crate::config::{AceStepConfig, DaemonConfig, Device};
use crate::error::BackendError;
use crate::types::Artifact;

/// Task type handed to the stage program.
const TASK_TYPE: &str = "repaint";

/// ACE-Step backend driving an external stage program.
#[derive(Debug)]
pub struct AceStepBackend {
    stage: StageProgram,
    params: AceStepConfig,
    device: Device,
    work_dir: PathBuf,
    reference_audio: Option<PathBuf>,
    repaint_source: Option<PathBuf>,
}

impl AceStepBackend {
    pub fn new(config: &DaemonConfig) -> Self {
        Self {
            stage: StageProgram::new(config.ace_step.command.clone()),
            params: config.ace_step.clone(),
            device: config.device,
            work_dir: config.effective_work_dir(),
            reference_audio: config.reference_audio_path.clone(),
            repaint_source: None,
        }
    }

    /// Reference recording chosen during setup, if it exists.
    pub fn repaint_source(&self) -> Option<&PathBuf> {
        self.repaint_source.as_ref()
    }

    fn stage_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("ACESTEP_TASK_TYPE", TASK_TYPE.to_string()),
            ("ACESTEP_AUDIO_DURATION", self.params.audio_duration_sec.to_string()),
            ("ACESTEP_INFER_STEP", self.params.inference_steps.to_string()),
            ("ACESTEP_VOCAL_LANGUAGE", self.params.vocal_language.clone()),
            ("DEVICE", self.device.to_string()),
        ];
        if let Some(source) = &self.repaint_source {
            env.push(("REFERENCE_AUDIO_PATH", source.to_string_lossy().to_string()));
        }
        if let Some(lyrics) = &self.params.lyrics_path {
            env.push(("ACESTEP_LYRICS_PATH", lyrics.to_string_lossy().to_string()));
        }
        env
    }
}

impl GenerationBackend for AceStepBackend {
    fn name(&self) -> &'static str {
        "ace_step"
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        let program = self.stage.resolve()?.to_path_buf();
        std::fs::create_dir_all(&self.work_dir)?;

        if let Some(lyrics) = &self.params.lyrics_path {
            if !lyrics.is_file() {
                return Err(BackendError::Setup(format!(
                    "lyrics file not found: {}",
                    lyrics.display()
                )));
            }
        }

        self.repaint_source = match &self.reference_audio {
            Some(path) if path.exists() => Some(path.clone()),
            Some(path) => {
                tracing::warn!(
                    path = %path.display(),
                    "Reference audio not found, repainting without a reference"
                );
                None
            }
            None => {
                tracing::warn!("No reference audio configured, repainting without a reference");
                None
            }
        };

        tracing::info!(
            program = %program.display(),
            task = TASK_TYPE,
            reference = self.repaint_source.is_some(),
            device = %self.device,
            steps = self.params.inference_steps,
            duration_sec = self.params.audio_duration_sec,
            "ACE-Step backend ready"
        );
        Ok(())
    }

    fn generate(&self, prompt: &str) -> Result<Artifact, BackendError> {
        self.stage.run(prompt, &self.work_dir, &self.stage_env())
    }
}
