//! Core types for the mixgen-daemon.
//!
//! This module re-exports the data types used throughout the daemon:
//! - [`GenerationJob`]: one caller's request with its state
//! - [`Artifact`]: a generated recording handed back to the caller

mod artifact;
mod job;

pub use artifact::{Artifact, ArtifactFormat};
pub use job::{GenerationJob, JobStatus};
