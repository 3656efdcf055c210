//! Scriptable in-process backend for coordinator and server tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::GenerationBackend;
use crate::audio::wav::write_wav;
use crate::audio::JOB_DIR_PREFIX;
use crate::error::BackendError;
use crate::types::{Artifact, ArtifactFormat};

/// One observed backend call.
#[derive(Debug, Clone)]
pub(crate) struct CallRecord {
    pub prompt: String,
    pub start: Instant,
    pub end: Option<Instant>,
}

#[derive(Debug, Default)]
struct CallLogInner {
    records: Vec<CallRecord>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared log of backend calls, kept by the test after the backend is boxed.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog {
    inner: Arc<Mutex<CallLogInner>>,
}

impl CallLog {
    fn begin(&self, prompt: &str) -> CallScope {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight += 1;
        inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
        inner.records.push(CallRecord {
            prompt: prompt.to_string(),
            start: Instant::now(),
            end: None,
        });
        CallScope {
            log: self.clone(),
            index: inner.records.len() - 1,
        }
    }

    /// Calls in start order.
    pub fn records(&self) -> Vec<CallRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    /// Prompts in start order.
    pub fn prompts(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.prompt).collect()
    }

    pub fn started(&self, prompt: &str) -> bool {
        self.records().iter().any(|r| r.prompt == prompt)
    }

    pub fn finished(&self, prompt: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.prompt == prompt && r.end.is_some())
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }
}

/// Closes a call record on drop, including when the call panics.
struct CallScope {
    log: CallLog,
    index: usize,
}

impl Drop for CallScope {
    fn drop(&mut self) {
        let mut inner = match self.log.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.in_flight -= 1;
        inner.records[self.index].end = Some(Instant::now());
    }
}

/// Backend whose behavior is scripted per prompt.
#[derive(Debug)]
pub(crate) struct StubBackend {
    default_delay: Duration,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    setup_error: Option<String>,
    output_dir: Option<PathBuf>,
    ready: bool,
    calls: CallLog,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            default_delay: Duration::from_millis(10),
            delays: HashMap::new(),
            failures: HashMap::new(),
            panics: HashSet::new(),
            setup_error: None,
            output_dir: None,
            ready: false,
            calls: CallLog::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn delay_for(mut self, prompt: &str, delay: Duration) -> Self {
        self.delays.insert(prompt.to_string(), delay);
        self
    }

    pub fn fail_on(mut self, prompt: &str, message: &str) -> Self {
        self.failures.insert(prompt.to_string(), message.to_string());
        self
    }

    pub fn panic_on(mut self, prompt: &str) -> Self {
        self.panics.insert(prompt.to_string());
        self
    }

    pub fn fail_setup(mut self, message: &str) -> Self {
        self.setup_error = Some(message.to_string());
        self
    }

    /// Writes a real WAV file per call under `dir` instead of returning a
    /// placeholder path.
    pub fn writing_to(mut self, dir: &Path) -> Self {
        self.output_dir = Some(dir.to_path_buf());
        self
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl GenerationBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn setup(&mut self) -> Result<(), BackendError> {
        if let Some(message) = &self.setup_error {
            return Err(BackendError::Setup(message.clone()));
        }
        self.ready = true;
        Ok(())
    }

    fn generate(&self, prompt: &str) -> Result<Artifact, BackendError> {
        if !self.ready {
            return Err(BackendError::Setup("generate called before setup".into()));
        }

        let _scope = self.calls.begin(prompt);
        let delay = self
            .delays
            .get(prompt)
            .copied()
            .unwrap_or(self.default_delay);
        std::thread::sleep(delay);

        if self.panics.contains(prompt) {
            panic!("stub backend panicked on {prompt:?}");
        }
        if let Some(message) = self.failures.get(prompt) {
            return Err(BackendError::NoOutput(message.clone()));
        }

        if let Some(dir) = &self.output_dir {
            let job_dir = tempfile::Builder::new()
                .prefix(JOB_DIR_PREFIX)
                .tempdir_in(dir)?
                .keep();
            let path = job_dir.join("mix.wav");
            write_wav(&[0.0f32; 3200], &path, 32000)
                .map_err(|e| BackendError::NoOutput(e.to_string()))?;
            return Artifact::from_path(path);
        }

        Ok(Artifact {
            path: PathBuf::from(format!("/stub/{prompt}.wav")),
            format: ArtifactFormat::Wav,
            size_bytes: 1024,
            sample_rate: Some(32000),
            channels: Some(2),
            duration_sec: Some(1.0),
        })
    }
}
