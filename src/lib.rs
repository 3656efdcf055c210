//! mixgen-daemon: generation coordinator for a single-instance music backend.
//!
//! Many callers may ask for a generation at once while exactly one backend
//! call runs at a time. The coordinator bounds how many jobs it holds,
//! serves them in arrival order on a dedicated worker thread, and answers
//! every caller within a fixed wall-clock budget.
//!
//! # Modules
//!
//! - [`coordinator`]: Admission, exclusive access, offloading and deadlines
//! - [`backend`]: Generation engines (MusicGen, ACE-Step) behind one trait
//! - [`audio`]: WAV probing, mp3 conversion, size checks and cleanup
//! - [`prompt`]: Prompt construction from a style description
//! - [`rpc`]: JSON-RPC server over stdio
//! - [`types`]: Core data types (Artifact, GenerationJob)
//! - [`config`]: Runtime configuration (DaemonConfig, CoordinatorConfig)
//! - [`error`]: Error types and codes (DaemonError, ErrorCode)
//!
//! # Example
//!
//! ```rust,ignore
//! use mixgen_daemon::{create_backend, DaemonConfig, GenerationCoordinator};
//!
//! let config = DaemonConfig::from_env();
//! let coordinator =
//!     GenerationCoordinator::start(create_backend(&config), config.coordinator.clone()).await?;
//!
//! let artifact = coordinator.generate("jazz piano remix of a ceremonial march").await?;
//! println!("{}", artifact.path.display());
//! ```

pub mod audio;
pub mod backend;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod prompt;
pub mod rpc;
pub mod types;

// Re-export commonly used types at crate root for convenience
pub use backend::{create_backend, BackendKind, GenerationBackend};
pub use config::{CoordinatorConfig, DaemonConfig, Device};
pub use coordinator::{CoordinatorStatus, GenerationCoordinator};
pub use error::{BackendError, DaemonError, ErrorCode, Result};
pub use types::{Artifact, ArtifactFormat, GenerationJob, JobStatus};
