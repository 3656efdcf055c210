//! Prompt construction from a user's style description.

use crate::error::{DaemonError, Result};

/// Longest accepted description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Blends a style description into the prompt context.
///
/// An empty description yields the context alone.
pub fn build_prompt(description: &str, context: &str) -> String {
    let style = description.trim();
    if style.is_empty() {
        return context.to_string();
    }
    format!(
        "{style} remix of a {context}, reimagined with {style} instrumentation, rhythm, and production"
    )
}

/// Rejects descriptions longer than [`MAX_DESCRIPTION_CHARS`].
pub fn validate_description(description: &str) -> Result<()> {
    let len = description.chars().count();
    if len > MAX_DESCRIPTION_CHARS {
        return Err(DaemonError::prompt_too_long(len));
    }
    Ok(())
}
