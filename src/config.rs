//! Daemon configuration module.
//!
//! Contains the runtime configuration for the mixgen-daemon: coordinator
//! limits, backend engine selection and parameters, and artifact delivery
//! settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::BackendKind;
use crate::types::ArtifactFormat;

/// Default maximum number of jobs queued or running at once.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 3;

/// Default wall-clock budget per generation job.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(840);

/// Default context the user description is blended into.
pub const DEFAULT_PROMPT_CONTEXT: &str = "stately ceremonial march, \
     triumphant brass fanfare over steady snare, \
     proud anthem moving forward with unwavering resolve";

/// Execution device handed to the backend stage program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Let the stage program pick the best available device.
    #[default]
    Auto,

    /// Force CPU execution.
    Cpu,

    /// Use CUDA for NVIDIA GPU acceleration.
    Cuda,

    /// Use Metal on Apple Silicon.
    Metal,
}

impl Device {
    /// Returns the string representation of the device.
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Metal => "metal",
        }
    }

    /// Parses a device from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Device::Auto),
            "cpu" => Some(Device::Cpu),
            "cuda" => Some(Device::Cuda),
            "metal" | "mps" => Some(Device::Metal),
            _ => None,
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Limits consumed by the generation coordinator at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum number of jobs held at once (one running, the rest waiting).
    pub max_queue_depth: usize,

    /// Wall-clock budget per job, measured from the backend call start.
    pub generation_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

impl CoordinatorConfig {
    /// Validates the limits.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.max_queue_depth == 0 {
            return Some("max_queue_depth must be > 0".to_string());
        }
        if self.generation_timeout.is_zero() {
            return Some("generation_timeout must be > 0".to_string());
        }
        None
    }
}

/// MusicGen engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicGenConfig {
    /// Stage program invoked as `<command> <prompt> <output_path>`.
    pub command: String,

    /// Pretrained model name. Melody conditioning needs a "melody" model.
    pub model_name: String,

    /// Generated audio duration in seconds.
    pub duration_sec: f32,

    /// Top-k sampling.
    pub top_k: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Classifier-free guidance coefficient.
    pub cfg_coef: f32,
}

impl Default for MusicGenConfig {
    fn default() -> Self {
        Self {
            command: "musicgen-stage".to_string(),
            model_name: "facebook/musicgen-small".to_string(),
            duration_sec: 15.0,
            top_k: 250,
            temperature: 1.0,
            cfg_coef: 3.0,
        }
    }
}

/// ACE-Step engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AceStepConfig {
    /// Stage program invoked as `<command> <prompt> <output_path>`.
    pub command: String,

    /// Generated audio duration in seconds.
    pub audio_duration_sec: f32,

    /// Number of diffusion inference steps.
    pub inference_steps: u32,

    /// Optional lyrics file sung over the generated track.
    pub lyrics_path: Option<PathBuf>,

    /// Vocal language code for the lyrics.
    pub vocal_language: String,
}

impl Default for AceStepConfig {
    fn default() -> Self {
        Self {
            command: "acestep-stage".to_string(),
            audio_duration_sec: 60.0,
            inference_steps: 60,
            lyrics_path: None,
            vocal_language: "en".to_string(),
        }
    }
}

/// Artifact delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Format delivered to callers; WAV output is converted when this is mp3.
    pub format: ArtifactFormat,

    /// Largest deliverable file in megabytes.
    pub max_file_size_mb: f64,

    /// ffmpeg audio bitrate for mp3 conversion.
    pub mp3_bitrate: String,

    /// ffmpeg executable.
    pub ffmpeg: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ArtifactFormat::Mp3,
            max_file_size_mb: 24.0,
            mp3_bitrate: "192k".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Runtime configuration for the daemon.
///
/// This configuration is typically loaded from environment variables
/// (and a `.env` file) at startup, then adjusted by command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Generation engine served by the coordinator.
    pub backend: BackendKind,

    /// Admission and deadline limits.
    pub coordinator: CoordinatorConfig,

    /// Execution device for inference.
    pub device: Device,

    /// Reference recording used for melody conditioning / repainting.
    pub reference_audio_path: Option<PathBuf>,

    /// Directory receiving per-job output directories.
    /// If None, uses the platform-specific default cache location.
    pub work_dir: Option<PathBuf>,

    /// Context the user description is blended into.
    pub prompt_context: String,

    /// MusicGen specific configuration.
    pub musicgen: MusicGenConfig,

    /// ACE-Step specific configuration.
    pub ace_step: AceStepConfig,

    /// Delivery settings.
    pub output: OutputConfig,
}

impl DaemonConfig {
    /// Creates a new DaemonConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a DaemonConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `MIXGEN_BACKEND` - Engine (musicgen, ace_step)
    /// - `MIXGEN_MAX_QUEUE_DEPTH` - Jobs held before shedding load
    /// - `MIXGEN_GENERATION_TIMEOUT_SECS` - Wall-clock budget per job
    /// - `MIXGEN_DEVICE` - Device selection (auto, cpu, cuda, metal)
    /// - `MIXGEN_REFERENCE_AUDIO` - Reference recording path
    /// - `MIXGEN_WORK_DIR` - Output root directory
    /// - `MIXGEN_PROMPT_CONTEXT` - Prompt context
    /// - `MIXGEN_MUSICGEN_*` - COMMAND, MODEL, DURATION, TOP_K, TEMPERATURE, CFG_COEF
    /// - `MIXGEN_ACE_STEP_*` - COMMAND, DURATION, STEPS, LYRICS, LANGUAGE
    /// - `MIXGEN_OUTPUT_FORMAT`, `MIXGEN_MAX_FILE_SIZE_MB`, `MIXGEN_MP3_BITRATE`, `MIXGEN_FFMPEG`
    ///
    /// Falls back to defaults for unset or unparsable variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = var("MIXGEN_BACKEND").and_then(|v| BackendKind::parse(&v)) {
            config.backend = backend;
        }

        if let Some(depth) = parsed(var("MIXGEN_MAX_QUEUE_DEPTH")).filter(|d: &usize| *d > 0) {
            config.coordinator.max_queue_depth = depth;
        }

        if let Some(secs) = parsed(var("MIXGEN_GENERATION_TIMEOUT_SECS")).filter(|s: &u64| *s > 0) {
            config.coordinator.generation_timeout = Duration::from_secs(secs);
        }

        if let Some(device) = var("MIXGEN_DEVICE").and_then(|v| Device::parse(&v)) {
            config.device = device;
        }

        if let Some(path) = var("MIXGEN_REFERENCE_AUDIO") {
            config.reference_audio_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("MIXGEN_WORK_DIR") {
            config.work_dir = Some(PathBuf::from(path));
        }

        if let Some(context) = var("MIXGEN_PROMPT_CONTEXT") {
            config.prompt_context = context;
        }

        // MusicGen
        if let Some(command) = var("MIXGEN_MUSICGEN_COMMAND") {
            config.musicgen.command = command;
        }
        if let Some(model) = var("MIXGEN_MUSICGEN_MODEL") {
            config.musicgen.model_name = model;
        }
        if let Some(duration) = parsed(var("MIXGEN_MUSICGEN_DURATION")).filter(|d: &f32| *d > 0.0) {
            config.musicgen.duration_sec = duration;
        }
        if let Some(top_k) = parsed(var("MIXGEN_MUSICGEN_TOP_K")) {
            config.musicgen.top_k = top_k;
        }
        let temperature = parsed(var("MIXGEN_MUSICGEN_TEMPERATURE"));
        if let Some(temperature) = temperature.filter(|t: &f32| *t > 0.0) {
            config.musicgen.temperature = temperature;
        }
        if let Some(cfg_coef) = parsed(var("MIXGEN_MUSICGEN_CFG_COEF")) {
            config.musicgen.cfg_coef = cfg_coef;
        }

        // ACE-Step
        if let Some(command) = var("MIXGEN_ACE_STEP_COMMAND") {
            config.ace_step.command = command;
        }
        if let Some(duration) = parsed(var("MIXGEN_ACE_STEP_DURATION")).filter(|d: &f32| *d > 0.0) {
            config.ace_step.audio_duration_sec = duration;
        }
        let steps = parsed(var("MIXGEN_ACE_STEP_STEPS"));
        if let Some(steps) = steps.filter(|s: &u32| (1..=200).contains(s)) {
            config.ace_step.inference_steps = steps;
        }
        if let Some(path) = var("MIXGEN_ACE_STEP_LYRICS") {
            config.ace_step.lyrics_path = Some(PathBuf::from(path));
        }
        if let Some(language) = var("MIXGEN_ACE_STEP_LANGUAGE") {
            config.ace_step.vocal_language = language.to_lowercase();
        }

        // Output
        if let Some(format) = var("MIXGEN_OUTPUT_FORMAT").and_then(|v| ArtifactFormat::parse(&v)) {
            config.output.format = format;
        }
        if let Some(max_mb) = parsed(var("MIXGEN_MAX_FILE_SIZE_MB")).filter(|m: &f64| *m > 0.0) {
            config.output.max_file_size_mb = max_mb;
        }
        if let Some(bitrate) = var("MIXGEN_MP3_BITRATE") {
            config.output.mp3_bitrate = bitrate;
        }
        if let Some(ffmpeg) = var("MIXGEN_FFMPEG") {
            config.output.ffmpeg = ffmpeg;
        }

        config
    }

    /// Returns the effective work directory, using platform defaults if not specified.
    pub fn effective_work_dir(&self) -> PathBuf {
        if let Some(ref path) = self.work_dir {
            path.clone()
        } else {
            default_work_dir()
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if let Some(err) = self.coordinator.validate() {
            return Some(err);
        }
        if self.musicgen.duration_sec <= 0.0 || self.ace_step.audio_duration_sec <= 0.0 {
            return Some("generation duration must be > 0".to_string());
        }
        if self.ace_step.inference_steps == 0 {
            return Some("ace_step inference_steps must be > 0".to_string());
        }
        if self.output.max_file_size_mb <= 0.0 {
            return Some("max_file_size_mb must be > 0".to_string());
        }
        None
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            coordinator: CoordinatorConfig::default(),
            device: Device::Auto,
            reference_audio_path: None,
            work_dir: None,
            prompt_context: DEFAULT_PROMPT_CONTEXT.to_string(),
            musicgen: MusicGenConfig::default(),
            ace_step: AceStepConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Returns the platform-specific default work directory.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/mixgen/work
/// - Linux: ~/.cache/mixgen/work
/// - Windows: C:\Users\<user>\AppData\Local\mixgen\cache\work
fn default_work_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "mixgen") {
        proj_dirs.cache_dir().join("work")
    } else {
        std::env::temp_dir().join("mixgen")
    }
}
