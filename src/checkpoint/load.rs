//! Checkpoint reading

use super::format::{Checkpoint, CheckpointFormat, CHECKPOINT_FORMAT_VERSION};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Read a checkpoint from `path`
///
/// The format is detected from the extension. Checkpoints written by a
/// newer format version are rejected.
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization("Checkpoint path has no extension".to_string()))?;
    let format = CheckpointFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("Unsupported checkpoint extension: {ext}")))?;

    let content = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading checkpoint {}", path.display()), e))?;

    let checkpoint: Checkpoint = match format {
        CheckpointFormat::Json => serde_json::from_str(&content)?,
        CheckpointFormat::Yaml => serde_yaml::from_str(&content)?,
    };

    if checkpoint.format_version > CHECKPOINT_FORMAT_VERSION {
        return Err(Error::state(
            "checkpoint",
            format!(
                "format version {} is newer than supported version {CHECKPOINT_FORMAT_VERSION}",
                checkpoint.format_version
            ),
        ));
    }
    Ok(checkpoint)
}
