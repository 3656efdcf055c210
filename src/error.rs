//! Error types for the mixgen-daemon.
//!
//! Defines the error codes surfaced to callers of the generation
//! coordinator and its front ends, plus the backend collaborator errors
//! they wrap.

use std::fmt;
use std::time::Duration;

/// Error codes returned by the daemon in error responses.
///
/// These codes are used in JSON-RPC error responses and allow clients
/// to programmatically handle specific error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The coordinator is holding its maximum number of jobs.
    /// Trigger: admission denied at the queue depth ceiling.
    Busy,

    /// The job exceeded the wall-clock generation budget.
    /// Trigger: deadline elapsed before the backend returned.
    GenerationTimeout,

    /// The backend reported an error or produced no usable output.
    /// Trigger: stage program failure, missing output, worker fault.
    BackendFailed,

    /// The backend could not be prepared for serving.
    /// Trigger: stage program missing, work directory not writable.
    SetupFailed,

    /// The user description is not acceptable.
    /// Trigger: description exceeds 1000 characters.
    InvalidPrompt,

    /// The finished artifact is larger than the delivery limit.
    /// Trigger: file size above the configured maximum.
    ArtifactTooLarge,

    /// The artifact could not be converted to the delivery format.
    /// Trigger: ffmpeg missing or exiting with an error.
    ConversionFailed,

    /// The configuration has out-of-range values.
    /// Trigger: zero queue depth, zero timeout, non-positive limits.
    InvalidConfig,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Busy => "BUSY",
            ErrorCode::GenerationTimeout => "GENERATION_TIMEOUT",
            ErrorCode::BackendFailed => "BACKEND_FAILED",
            ErrorCode::SetupFailed => "SETUP_FAILED",
            ErrorCode::InvalidPrompt => "INVALID_PROMPT",
            ErrorCode::ArtifactTooLarge => "ARTIFACT_TOO_LARGE",
            ErrorCode::ConversionFailed => "CONVERSION_FAILED",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::Busy => "Generation queue is at maximum capacity",
            ErrorCode::GenerationTimeout => "Generation exceeded the wall-clock budget",
            ErrorCode::BackendFailed => "Generation backend reported a failure",
            ErrorCode::SetupFailed => "Generation backend could not be initialized",
            ErrorCode::InvalidPrompt => "Description must be at most 1000 characters",
            ErrorCode::ArtifactTooLarge => "Generated file exceeds the delivery size limit",
            ErrorCode::ConversionFailed => "Generated file could not be converted",
            ErrorCode::InvalidConfig => "Daemon configuration is invalid",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::Busy => "The generator is currently busy. Please try again in a few minutes",
            ErrorCode::GenerationTimeout => {
                "Try a shorter duration or fewer inference steps to reduce the workload"
            }
            ErrorCode::BackendFailed => {
                "Check the daemon log for the stage program output, then retry the request"
            }
            ErrorCode::SetupFailed => {
                "Verify the stage program is installed and on PATH, and that the work \
                 directory is writable"
            }
            ErrorCode::InvalidPrompt => {
                "Provide a style description of at most 1000 characters \
                 (e.g., 'lo-fi hip hop', 'jazz piano')"
            }
            ErrorCode::ArtifactTooLarge => {
                "Try a shorter duration or raise MIXGEN_MAX_FILE_SIZE_MB"
            }
            ErrorCode::ConversionFailed => {
                "Verify ffmpeg is installed, or set MIXGEN_OUTPUT_FORMAT=wav"
            }
            ErrorCode::InvalidConfig => "Check the MIXGEN_* environment variables",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors reported by a generation backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stage program not found: {program}")]
    CommandNotFound { program: String },

    #[error("stage program exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("no output produced: {0}")]
    NoOutput(String),

    #[error("backend setup failed: {0}")]
    Setup(String),
}

/// Main error type for daemon operations.
#[derive(Debug)]
pub struct DaemonError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DaemonError {
    /// Creates a new DaemonError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new DaemonError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a BUSY error.
    pub fn busy(max_queue_depth: usize) -> Self {
        Self::new(
            ErrorCode::Busy,
            format!(
                "Generator is busy ({} jobs queued or running)",
                max_queue_depth
            ),
        )
    }

    /// Creates a GENERATION_TIMEOUT error.
    pub fn generation_timeout(limit: Duration) -> Self {
        Self::new(
            ErrorCode::GenerationTimeout,
            format!("Generation timed out after {}s", limit.as_secs()),
        )
    }

    /// Creates a BACKEND_FAILED error wrapping the backend's report.
    pub fn backend_failed(err: BackendError) -> Self {
        let message = format!("Generation failed: {}", err);
        Self::with_source(ErrorCode::BackendFailed, message, err)
    }

    /// Creates a BACKEND_FAILED error for a fault outside the backend itself.
    pub fn worker_fault(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BackendFailed,
            format!("Generation worker fault: {}", reason.into()),
        )
    }

    /// Creates a SETUP_FAILED error.
    pub fn setup_failed(err: BackendError) -> Self {
        let message = format!("Backend setup failed: {}", err);
        Self::with_source(ErrorCode::SetupFailed, message, err)
    }

    /// Creates an INVALID_PROMPT error for descriptions that are too long.
    pub fn prompt_too_long(len: usize) -> Self {
        Self::new(
            ErrorCode::InvalidPrompt,
            format!("Description too long: {} characters (maximum 1000)", len),
        )
    }

    /// Creates an ARTIFACT_TOO_LARGE error.
    pub fn artifact_too_large(size_mb: f64, max_mb: f64) -> Self {
        Self::new(
            ErrorCode::ArtifactTooLarge,
            format!(
                "Generated file is {:.1} MB (maximum {:.1} MB)",
                size_mb, max_mb
            ),
        )
    }

    /// Creates a CONVERSION_FAILED error.
    pub fn conversion_failed(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConversionFailed,
            format!("Conversion failed: {}", reason.into()),
        )
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using DaemonError.
pub type Result<T> = std::result::Result<T, DaemonError>;
