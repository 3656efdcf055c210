//! External stage programs.
//!
//! A stage program performs one generation in a child process:
//! `<program> <prompt> <output_path>`, with engine parameters in its
//! environment. The model stays loaded in whatever the program manages;
//! from here it is a blocking call that either leaves a file behind or
//! fails.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use crate::audio::delivery::tail;
use crate::audio::JOB_DIR_PREFIX;
use crate::error::BackendError;
use crate::types::Artifact;

/// Name of the file a stage program is asked to write.
pub const OUTPUT_FILE_NAME: &str = "mix.wav";

/// An external generation program.
#[derive(Debug, Clone)]
pub struct StageProgram {
    program: String,
    resolved: Option<PathBuf>,
}

impl StageProgram {
    /// Creates a stage program from a name on PATH or a path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            resolved: None,
        }
    }

    /// The configured program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolved executable path, available after [`resolve`](Self::resolve).
    pub fn resolved(&self) -> Option<&Path> {
        self.resolved.as_deref()
    }

    /// Looks the program up on PATH (or checks the given path).
    pub fn resolve(&mut self) -> Result<&Path, BackendError> {
        let path = which::which(&self.program).map_err(|_| BackendError::CommandNotFound {
            program: self.program.clone(),
        })?;
        Ok(self.resolved.insert(path))
    }

    /// Runs one generation into a fresh job directory under `work_dir`.
    ///
    /// The job directory is kept when an artifact comes back and removed
    /// otherwise.
    pub fn run(
        &self,
        prompt: &str,
        work_dir: &Path,
        env: &[(&'static str, String)],
    ) -> Result<Artifact, BackendError> {
        let program = self
            .resolved
            .as_ref()
            .ok_or_else(|| BackendError::Setup(format!("{} used before setup", self.program)))?;

        let job_dir = tempfile::Builder::new()
            .prefix(JOB_DIR_PREFIX)
            .tempdir_in(work_dir)?;
        let output_path = job_dir.path().join(OUTPUT_FILE_NAME);

        let started = Instant::now();
        let output = Command::new(program)
            .arg(prompt)
            .arg(&output_path)
            .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
            .stdin(Stdio::null())
            .output()?;

        tracing::debug!(
            program = %program.display(),
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage program finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::CommandFailed {
                status: output.status.to_string(),
                stderr: tail(&stderr, 400).to_string(),
            });
        }

        let artifact = Artifact::from_path(&output_path)?;
        // Ownership of the directory moves to whoever receives the artifact
        let _ = job_dir.keep();
        Ok(artifact)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::audio::wav::write_wav;
    use crate::types::ArtifactFormat;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    fn job_dirs(work: &Path) -> usize {
        std::fs::read_dir(work)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(JOB_DIR_PREFIX))
            .count()
    }

    #[test]
    fn resolve_missing_program_fails() {
        let mut stage = StageProgram::new("mixgen-no-such-stage-program");
        let err = stage.resolve().unwrap_err();
        assert!(matches!(err, BackendError::CommandNotFound { .. }));
        assert!(stage.resolved().is_none());
    }

    #[test]
    fn run_before_resolve_fails() {
        let work = tempdir().unwrap();
        let stage = StageProgram::new("sh");
        let err = stage.run("x", work.path(), &[]).unwrap_err();
        assert!(matches!(err, BackendError::Setup(_)));
    }

    #[test]
    fn run_collects_artifact() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        let fixture = bin.path().join("fixture.wav");
        write_wav(&[0.0f32; 320], &fixture, 32000).unwrap();
        let program = script(
            bin.path(),
            "stage",
            r#"[ "$1" = "jazz piano" ] || exit 3
cp "$MIXGEN_TEST_FIXTURE" "$2""#,
        );
        let mut stage = StageProgram::new(program);
        stage.resolve().unwrap();

        let env = [("MIXGEN_TEST_FIXTURE", fixture.to_string_lossy().to_string())];
        let artifact = stage.run("jazz piano", work.path(), &env).unwrap();

        assert_eq!(artifact.format, ArtifactFormat::Wav);
        assert_eq!(artifact.sample_rate, Some(32000));
        assert!(artifact.path.starts_with(work.path()));
        assert!(artifact.path.ends_with(OUTPUT_FILE_NAME));
        assert_eq!(job_dirs(work.path()), 1);
    }

    #[test]
    fn run_with_unreadable_output_is_no_output() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        let program = script(bin.path(), "stage", r#"printf 'not a wav' > "$2""#);
        let mut stage = StageProgram::new(program);
        stage.resolve().unwrap();

        let err = stage.run("jazz", work.path(), &[]).unwrap_err();
        assert!(matches!(err, BackendError::NoOutput(_)));
        assert_eq!(job_dirs(work.path()), 0);
    }

    #[test]
    fn run_reports_exit_failure() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        let program = script(bin.path(), "stage", "echo 'CUDA out of memory' >&2\nexit 2");
        let mut stage = StageProgram::new(program);
        stage.resolve().unwrap();

        let err = stage.run("jazz", work.path(), &[]).unwrap_err();
        match err {
            BackendError::CommandFailed { stderr, .. } => {
                assert!(stderr.contains("CUDA out of memory"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(job_dirs(work.path()), 0);
    }

    #[test]
    fn run_without_output_is_no_output() {
        let bin = tempdir().unwrap();
        let work = tempdir().unwrap();
        let program = script(bin.path(), "stage", "exit 0");
        let mut stage = StageProgram::new(program);
        stage.resolve().unwrap();

        let err = stage.run("jazz", work.path(), &[]).unwrap_err();
        assert!(matches!(err, BackendError::NoOutput(_)));
    }
}
