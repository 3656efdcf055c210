//! Generation coordinator.
//!
//! Serves many concurrent callers from a single-instance backend. Each
//! request passes the admission gate (or is rejected as busy), waits its
//! turn for the exclusive slot, runs on the offload worker and races the
//! generation deadline.
//!
//! A timed-out call is abandoned, not interrupted. It keeps the exclusive
//! slot until the backend actually returns, so the next job waits for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::audio::cleanup_artifact;
use crate::backend::GenerationBackend;
use crate::config::CoordinatorConfig;
use crate::error::{BackendError, DaemonError, Result};
use crate::types::{Artifact, GenerationJob};

mod admission;
mod deadline;
mod offload;
mod slot;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use deadline::with_deadline;
pub use offload::{BlockingOffloader, Pending};
pub use slot::{ExclusiveSlot, SlotGuard};

/// Name of the worker thread running backend calls.
pub const WORKER_THREAD_NAME: &str = "mixgen-generate";

/// Snapshot of the coordinator for status reports.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorStatus {
    pub backend: &'static str,
    pub queue_depth: usize,
    pub max_queue_depth: usize,
    pub backend_busy: bool,
    pub generation_timeout_secs: u64,
}

/// Admission, ordering and deadline control around one backend.
pub struct GenerationCoordinator {
    backend: Arc<dyn GenerationBackend>,
    admission: AdmissionGate,
    slot: ExclusiveSlot,
    offloader: BlockingOffloader,
    generation_timeout: Duration,
}

impl std::fmt::Debug for GenerationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCoordinator")
            .field("backend", &self.backend.name())
            .field("admission", &self.admission)
            .field("slot", &self.slot)
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

impl GenerationCoordinator {
    /// Prepares `backend` and returns a coordinator ready to serve.
    ///
    /// Setup runs once, on the offload worker, before the backend becomes
    /// shared. A setup failure is returned as SETUP_FAILED and no
    /// coordinator exists to accept requests.
    pub async fn start(
        mut backend: Box<dyn GenerationBackend>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        if let Some(reason) = config.validate() {
            return Err(DaemonError::invalid_config(reason));
        }

        let offloader = BlockingOffloader::spawn(WORKER_THREAD_NAME)?;
        let name = backend.name();
        tracing::info!(backend = name, "Setting up generation backend");

        let started = Instant::now();
        let (backend, outcome) = offloader
            .submit(move || {
                let outcome = backend.setup();
                (backend, outcome)
            })
            .await
            .map_err(|fault| DaemonError::setup_failed(BackendError::Setup(fault.message)))?;
        outcome.map_err(DaemonError::setup_failed)?;

        tracing::info!(
            backend = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            max_queue_depth = config.max_queue_depth,
            timeout_secs = config.generation_timeout.as_secs(),
            "Generation backend ready"
        );

        Ok(Self {
            backend: Arc::from(backend),
            admission: AdmissionGate::new(config.max_queue_depth),
            slot: ExclusiveSlot::new(),
            offloader,
            generation_timeout: config.generation_timeout,
        })
    }

    /// Generates one recording for `prompt`.
    ///
    /// Fails with BUSY when the coordinator is full, GENERATION_TIMEOUT
    /// when the deadline elapses first and BACKEND_FAILED when the backend
    /// reports an error.
    pub async fn generate(&self, prompt: &str) -> Result<Artifact> {
        let mut job = GenerationJob::new(prompt);
        self.run_job(&mut job).await
    }

    /// Runs `job` to a terminal state, recording each transition on it.
    pub async fn run_job(&self, job: &mut GenerationJob) -> Result<Artifact> {
        let Some(_admission) = self.admission.try_admit() else {
            let err = DaemonError::busy(self.admission.max_depth());
            tracing::info!(
                job_id = %job.job_id,
                max_queue_depth = self.admission.max_depth(),
                "Rejected generation job, coordinator is full"
            );
            job.set_rejected(&err);
            return Err(err);
        };
        job.set_admitted();
        tracing::info!(
            job_id = %job.job_id,
            queue_depth = self.admission.depth(),
            "Admitted generation job"
        );

        let slot = match self.slot.acquire().await {
            Ok(slot) => slot,
            Err(err) => {
                job.set_failed(&err);
                return Err(err);
            }
        };
        job.set_running();
        tracing::debug!(
            job_id = %job.job_id,
            waited_ms = job.elapsed().as_millis() as u64,
            "Generation job holds the backend"
        );

        let backend = Arc::clone(&self.backend);
        let prompt = job.prompt.clone();
        let call = self.offloader.submit_reclaiming(
            move || {
                // The slot is released when the backend returns, not when the
                // caller stops waiting.
                let _slot = slot;
                backend.generate(&prompt)
            },
            discard_unclaimed,
        );

        let outcome = with_deadline(
            async { call.await?.map_err(DaemonError::backend_failed) },
            self.generation_timeout,
        )
        .await;

        match &outcome {
            Ok(artifact) => {
                job.set_completed(artifact);
                tracing::info!(
                    job_id = %job.job_id,
                    path = %artifact.path.display(),
                    elapsed_ms = job.elapsed().as_millis() as u64,
                    "Generation job completed"
                );
            }
            Err(err) => {
                job.set_failed(err);
                tracing::warn!(
                    job_id = %job.job_id,
                    code = %err.code,
                    error = %err.message,
                    "Generation job failed"
                );
            }
        }
        outcome
    }

    /// Number of jobs currently queued or running.
    pub fn queue_depth(&self) -> usize {
        self.admission.depth()
    }

    pub fn max_queue_depth(&self) -> usize {
        self.admission.max_depth()
    }

    /// True while a backend call holds the exclusive slot, including an
    /// abandoned call that has not returned yet.
    pub fn is_backend_busy(&self) -> bool {
        self.slot.is_held()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            backend: self.backend_name(),
            queue_depth: self.queue_depth(),
            max_queue_depth: self.max_queue_depth(),
            backend_busy: self.is_backend_busy(),
            generation_timeout_secs: self.generation_timeout.as_secs(),
        }
    }
}

/// Removes the output of a call whose caller timed out or went away.
fn discard_unclaimed(outcome: std::result::Result<Artifact, BackendError>) {
    if let Ok(artifact) = outcome {
        tracing::info!(
            path = %artifact.path.display(),
            "Discarding output of an abandoned generation"
        );
        cleanup_artifact(&artifact.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::StubBackend;
    use crate::error::ErrorCode;
    use crate::types::JobStatus;
    use std::error::Error as _;
    use tokio::task::JoinSet;

    async fn start(
        stub: StubBackend,
        max_queue_depth: usize,
        timeout: Duration,
    ) -> GenerationCoordinator {
        let config = CoordinatorConfig {
            max_queue_depth,
            generation_timeout: timeout,
        };
        GenerationCoordinator::start(Box::new(stub), config)
            .await
            .unwrap()
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..1000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    const LONG: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn generate_returns_artifact() {
        let coordinator = start(StubBackend::new(), 3, LONG).await;
        let artifact = coordinator.generate("jazz").await.unwrap();
        assert_eq!(artifact.path, std::path::PathBuf::from("/stub/jazz.wav"));
        assert_eq!(coordinator.queue_depth(), 0);
        assert!(!coordinator.is_backend_busy());
    }

    #[tokio::test]
    async fn rejects_beyond_queue_depth() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(150));
        let coordinator = Arc::new(start(stub, 2, LONG).await);

        let mut tasks = JoinSet::new();
        for prompt in ["a", "b"] {
            let coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { coordinator.generate(prompt).await });
        }
        wait_until(|| coordinator.queue_depth() == 2).await;

        let err = coordinator.generate("c").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Busy);
        assert!(err.to_string().contains("try again"));
        assert_eq!(coordinator.queue_depth(), 2);

        while let Some(result) = tasks.join_next().await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn burst_is_bounded_and_leak_free() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(20));
        let calls = stub.calls();
        let coordinator = Arc::new(start(stub, 3, LONG).await);

        let mut tasks = JoinSet::new();
        for i in 0..10 {
            let coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { coordinator.generate(&format!("job-{i}")).await });
        }

        let (mut completed, mut busy) = (0, 0);
        while let Some(result) = tasks.join_next().await {
            match result.unwrap() {
                Ok(_) => completed += 1,
                Err(err) if err.code == ErrorCode::Busy => busy += 1,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert_eq!(completed, 3);
        assert_eq!(busy, 7);
        assert_eq!(coordinator.queue_depth(), 0);
        assert_eq!(calls.max_in_flight(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn backend_calls_never_overlap() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(15));
        let calls = stub.calls();
        let coordinator = Arc::new(start(stub, 5, LONG).await);

        let mut tasks = JoinSet::new();
        for i in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { coordinator.generate(&format!("job-{i}")).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let records = calls.records();
        assert_eq!(records.len(), 5);
        for pair in records.windows(2) {
            let previous_end = pair[0].end.unwrap();
            assert!(previous_end <= pair[1].start, "backend calls overlapped");
        }
    }

    #[tokio::test]
    async fn admitted_jobs_run_in_arrival_order() {
        let stub = StubBackend::new().delay_for("holder", Duration::from_millis(150));
        let calls = stub.calls();
        let coordinator = Arc::new(start(stub, 4, LONG).await);

        let mut tasks = JoinSet::new();
        for (depth, prompt) in ["holder", "a", "b", "c"].into_iter().enumerate() {
            let task_coordinator = Arc::clone(&coordinator);
            tasks.spawn(async move { task_coordinator.generate(prompt).await });
            wait_until(|| coordinator.queue_depth() == depth + 1).await;
            if prompt == "holder" {
                wait_until(|| calls.started("holder")).await;
            }
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        assert_eq!(calls.prompts(), vec!["holder", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn timeout_fires_at_deadline() {
        let stub = StubBackend::new().delay_for("slow", Duration::from_millis(600));
        let coordinator = start(stub, 3, Duration::from_millis(100)).await;

        let started = Instant::now();
        let err = coordinator.generate("slow").await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.code, ErrorCode::GenerationTimeout);
        assert!(err.to_string().contains("shorter duration"));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500), "timed out late: {elapsed:?}");
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn abandoned_call_keeps_slot_until_it_returns() {
        let stub = StubBackend::new().delay_for("slow", Duration::from_millis(300));
        let calls = stub.calls();
        let coordinator = start(stub, 3, Duration::from_millis(50)).await;

        let err = coordinator.generate("slow").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::GenerationTimeout);
        assert!(coordinator.is_backend_busy());
        assert!(!calls.finished("slow"));

        coordinator.generate("next").await.unwrap();

        let records = calls.records();
        assert_eq!(records[0].prompt, "slow");
        assert_eq!(records[1].prompt, "next");
        assert!(records[1].start >= records[0].end.unwrap());
        assert!(!coordinator.is_backend_busy());
    }

    #[tokio::test]
    async fn abandoned_call_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubBackend::new()
            .with_delay(Duration::from_millis(200))
            .writing_to(dir.path());
        let calls = stub.calls();
        let coordinator = start(stub, 3, Duration::from_millis(50)).await;

        let err = coordinator.generate("slow").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::GenerationTimeout);

        wait_until(|| calls.finished("slow") && !coordinator.is_backend_busy()).await;
        let leftover = || std::fs::read_dir(dir.path()).unwrap().count();
        wait_until(|| leftover() == 0).await;
    }

    #[tokio::test]
    async fn cancelled_caller_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let stub = StubBackend::new()
            .with_delay(Duration::from_millis(100))
            .writing_to(dir.path());
        let calls = stub.calls();
        let coordinator = start(stub, 3, LONG).await;

        let call = coordinator.generate("gone");
        assert!(tokio::time::timeout(Duration::from_millis(20), call).await.is_err());

        wait_until(|| calls.finished("gone") && !coordinator.is_backend_busy()).await;
        let leftover = || std::fs::read_dir(dir.path()).unwrap().count();
        wait_until(|| leftover() == 0).await;
    }

    #[tokio::test]
    async fn concurrent_pair_with_depth_one() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(50));
        let coordinator = start(stub, 1, LONG).await;

        let (a, b) = tokio::join!(coordinator.generate("a"), coordinator.generate("b"));
        assert_eq!(a.unwrap().path, std::path::PathBuf::from("/stub/a.wav"));
        assert_eq!(b.unwrap_err().code, ErrorCode::Busy);
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn second_job_queues_behind_running_one() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(50));
        let calls = stub.calls();
        let coordinator = Arc::new(start(stub, 2, LONG).await);

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.generate("a").await })
        };
        wait_until(|| calls.started("a")).await;

        let second = coordinator.generate("b").await.unwrap();
        assert_eq!(second.path, std::path::PathBuf::from("/stub/b.wav"));
        first.await.unwrap().unwrap();

        assert_eq!(calls.prompts(), vec!["a", "b"]);
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn sequential_jobs_with_depth_one() {
        let coordinator = start(StubBackend::new(), 1, LONG).await;
        coordinator.generate("a").await.unwrap();
        coordinator.generate("b").await.unwrap();
        assert_eq!(coordinator.queue_depth(), 0);
    }

    #[tokio::test]
    async fn backend_failure_is_wrapped() {
        let stub = StubBackend::new().fail_on("broken", "no output");
        let coordinator = start(stub, 3, LONG).await;

        let err = coordinator.generate("broken").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BackendFailed);
        assert!(err.message.contains("no output"));
        assert!(err.source().is_some());
        assert_eq!(coordinator.queue_depth(), 0);
        assert!(!coordinator.is_backend_busy());
    }

    #[tokio::test]
    async fn backend_panic_does_not_poison_coordinator() {
        let stub = StubBackend::new().panic_on("boom");
        let coordinator = start(stub, 3, LONG).await;

        let err = coordinator.generate("boom").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BackendFailed);
        assert_eq!(coordinator.queue_depth(), 0);
        assert!(!coordinator.is_backend_busy());

        coordinator.generate("fine").await.unwrap();
    }

    #[tokio::test]
    async fn setup_failure_prevents_serving() {
        let stub = StubBackend::new().fail_setup("model weights missing");
        let err = GenerationCoordinator::start(Box::new(stub), CoordinatorConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SetupFailed);
        assert!(err.message.contains("model weights missing"));
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let config = CoordinatorConfig {
            max_queue_depth: 0,
            ..CoordinatorConfig::default()
        };
        let err = GenerationCoordinator::start(Box::new(StubBackend::new()), config)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_admission() {
        let stub = StubBackend::new().delay_for("holder", Duration::from_millis(200));
        let calls = stub.calls();
        let coordinator = Arc::new(start(stub, 2, LONG).await);

        let holder = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.generate("holder").await })
        };
        wait_until(|| calls.started("holder")).await;

        let waited =
            tokio::time::timeout(Duration::from_millis(20), coordinator.generate("impatient")).await;
        assert!(waited.is_err());
        assert_eq!(coordinator.queue_depth(), 1);

        holder.await.unwrap().unwrap();
        assert_eq!(coordinator.queue_depth(), 0);
        assert!(!calls.started("impatient"));
    }

    #[tokio::test]
    async fn run_job_records_transitions() {
        let stub = StubBackend::new().with_delay(Duration::from_millis(50));
        let coordinator = start(stub, 1, LONG).await;

        let mut first = GenerationJob::new("a");
        let mut second = GenerationJob::new("b");
        let (a, b) = tokio::join!(coordinator.run_job(&mut first), coordinator.run_job(&mut second));

        assert!(a.is_ok());
        assert_eq!(first.status, JobStatus::Completed);
        assert!(first.started_at.is_some());
        assert!(b.is_err());
        assert_eq!(second.status, JobStatus::Rejected);
        assert_eq!(second.error_code.as_deref(), Some("BUSY"));
    }

    #[tokio::test]
    async fn status_snapshot() {
        let coordinator = start(StubBackend::new(), 3, Duration::from_secs(840)).await;
        let status = coordinator.status();
        assert_eq!(status.backend, "stub");
        assert_eq!(status.queue_depth, 0);
        assert_eq!(status.max_queue_depth, 3);
        assert!(!status.backend_busy);
        assert_eq!(status.generation_timeout_secs, 840);
    }
}
