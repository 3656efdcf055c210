//! Artifact type representing a generated sound recording.
//!
//! An Artifact is a reference to a file produced by a backend, with enough
//! format metadata for the front ends to deliver it. Ownership of the file
//! passes to whoever receives the Artifact.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::probe_wav;
use crate::error::BackendError;

/// Container format of a generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Wav,
    Mp3,
}

impl ArtifactFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Wav => "wav",
            ArtifactFormat::Mp3 => "mp3",
        }
    }

    /// Parses a format from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "wave" => Some(ArtifactFormat::Wav),
            "mp3" => Some(ArtifactFormat::Mp3),
            _ => None,
        }
    }

    /// Detects the format from a file's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
    }
}

impl std::fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A generated sound recording on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Full filesystem path to the file.
    pub path: PathBuf,

    /// Container format.
    pub format: ArtifactFormat,

    /// File size in bytes.
    pub size_bytes: u64,

    /// Sample rate in Hz (WAV only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    /// Channel count (WAV only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,

    /// Audio duration in seconds (WAV only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f32>,
}

impl Artifact {
    /// Builds an Artifact from a file a backend just wrote.
    ///
    /// Missing, empty or unreadable files count as "no output".
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|_| {
            BackendError::NoOutput(format!("{} was not created", path.display()))
        })?;
        if metadata.len() == 0 {
            return Err(BackendError::NoOutput(format!(
                "{} is empty",
                path.display()
            )));
        }

        let format = ArtifactFormat::from_path(&path).ok_or_else(|| {
            BackendError::NoOutput(format!("unrecognized output file {}", path.display()))
        })?;

        let mut artifact = Self {
            path,
            format,
            size_bytes: metadata.len(),
            sample_rate: None,
            channels: None,
            duration_sec: None,
        };

        if format == ArtifactFormat::Wav {
            let info = probe_wav(&artifact.path).map_err(|e| {
                BackendError::NoOutput(format!(
                    "unreadable WAV output {}: {}",
                    artifact.path.display(),
                    e
                ))
            })?;
            artifact.sample_rate = Some(info.sample_rate);
            artifact.channels = Some(info.channels);
            artifact.duration_sec = Some(info.duration_sec);
        }

        Ok(artifact)
    }

    /// File size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}
