//! Audio artifact handling.
//!
//! Provides WAV probing, mp3 conversion, size checks and cleanup for
//! generated files.

pub mod delivery;
pub mod wav;

// Re-export commonly used items
pub use delivery::{
    check_file_size, cleanup_artifact, convert_to_mp3, finalize_artifact, ArtifactGuard,
    JOB_DIR_PREFIX,
};
pub use wav::{probe_wav, samples_to_duration, WavInfo};
