//! Artifact post-processing before handing a file to a caller.
//!
//! Conversion to mp3 goes through an external ffmpeg process; size checks
//! and cleanup work on the filesystem directly.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::config::OutputConfig;
use crate::error::{DaemonError, Result};
use crate::types::{Artifact, ArtifactFormat};

/// Prefix of the per-job directories created by backends.
pub const JOB_DIR_PREFIX: &str = "mixgen_";

/// Converts an artifact to mp3 next to the original file.
///
/// The source file is left in place; it lives in the same job directory
/// and goes away with [`cleanup_artifact`].
pub async fn convert_to_mp3(artifact: &Artifact, ffmpeg: &str, bitrate: &str) -> Result<Artifact> {
    let mp3_path = artifact.path.with_extension(ArtifactFormat::Mp3.extension());

    let output = Command::new(ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(&artifact.path)
        .args(["-b:a", bitrate])
        .arg(&mp3_path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DaemonError::conversion_failed(format!("could not run {}: {}", ffmpeg, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DaemonError::conversion_failed(format!(
            "{} exited with {}: {}",
            ffmpeg,
            output.status,
            tail(&stderr, 400)
        )));
    }

    tracing::info!(
        from = %artifact.path.display(),
        to = %mp3_path.display(),
        "Converted artifact to mp3"
    );

    Artifact::from_path(&mp3_path).map_err(|e| DaemonError::conversion_failed(e.to_string()))
}

/// Returns true if the file at `path` is at most `max_mb` megabytes.
pub fn check_file_size(path: &Path, max_mb: f64) -> std::io::Result<bool> {
    let size_mb = std::fs::metadata(path)?.len() as f64 / (1024.0 * 1024.0);
    Ok(size_mb <= max_mb)
}

/// Removes a delivered or rejected artifact.
///
/// If the file sits in a per-job directory the whole directory goes,
/// otherwise only the file. Errors are ignored.
pub fn cleanup_artifact(path: &Path) {
    let job_dir = path.parent().filter(|parent| {
        parent
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(JOB_DIR_PREFIX))
    });

    let result = match job_dir {
        Some(dir) if dir.exists() => std::fs::remove_dir_all(dir),
        _ if path.exists() => std::fs::remove_file(path),
        _ => Ok(()),
    };

    if let Err(e) = result {
        tracing::debug!(path = %path.display(), error = %e, "Artifact cleanup failed");
    }
}

/// Removes an artifact's files when dropped, unless released first.
///
/// Held while async work on a generated file can still fail or be
/// cancelled, so the file never outlives its last owner.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: Option<PathBuf>,
}

impl ArtifactGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Hands the file over; it is kept on drop.
    pub fn release(mut self) {
        self.path = None;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            cleanup_artifact(&path);
        }
    }
}

/// Brings a freshly generated artifact into deliverable shape.
///
/// Converts to the configured format when needed, then enforces the size
/// limit. On any error, or if the returned future is dropped before it
/// completes, the artifact is cleaned up.
pub async fn finalize_artifact(artifact: Artifact, output: &OutputConfig) -> Result<Artifact> {
    let source = ArtifactGuard::new(&artifact.path);

    let (artifact, converted) =
        if output.format == ArtifactFormat::Mp3 && artifact.format != ArtifactFormat::Mp3 {
            let mp3 = convert_to_mp3(&artifact, &output.ffmpeg, &output.mp3_bitrate).await?;
            let guard = ArtifactGuard::new(&mp3.path);
            (mp3, Some(guard))
        } else {
            (artifact, None)
        };

    let within_limit = check_file_size(&artifact.path, output.max_file_size_mb)
        .map_err(|e| DaemonError::conversion_failed(format!("cannot stat artifact: {}", e)))?;
    if !within_limit {
        return Err(DaemonError::artifact_too_large(
            artifact.size_mb(),
            output.max_file_size_mb,
        ));
    }

    source.release();
    if let Some(guard) = converted {
        guard.release();
    }
    Ok(artifact)
}

/// Last `max_chars` characters of `text`, for quoting process stderr.
pub(crate) fn tail(text: &str, max_chars: usize) -> &str {
    let text = text.trim_end();
    let skip = text.chars().count().saturating_sub(max_chars);
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
