//! Checkpoint writing

use super::format::{Checkpoint, CheckpointFormat};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Write a checkpoint to `path`
///
/// The format follows the extension. Data goes to a sibling temporary file
/// that is renamed into place, so an interrupted save never leaves a
/// truncated checkpoint behind.
///
/// # Example
///
/// ```no_run
/// use segmentar::checkpoint::{save_checkpoint, Checkpoint};
/// # let checkpoint: Checkpoint = todo!();
/// save_checkpoint(&checkpoint, "work_dir/iter_1000.json")?;
/// # Ok::<(), segmentar::Error>(())
/// ```
pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Serialization("Checkpoint path has no extension".to_string()))?;
    let format = CheckpointFormat::from_extension(ext)
        .ok_or_else(|| Error::Serialization(format!("Unsupported checkpoint extension: {ext}")))?;

    let data = match format {
        CheckpointFormat::Json => serde_json::to_string_pretty(checkpoint)?,
        CheckpointFormat::Yaml => serde_yaml::to_string(checkpoint)?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
    }

    let tmp = path.with_extension(format!("{ext}.tmp"));
    fs::write(&tmp, data).map_err(|e| Error::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(format!("renaming to {}", path.display()), e))?;

    tracing::debug!(path = %path.display(), iteration = checkpoint.iteration(), "checkpoint written");
    Ok(())
}
