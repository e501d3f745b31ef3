//! Loading run specifications from YAML

use super::schema::RunSpec;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Read, parse and validate a run specification
///
/// # Example
///
/// ```no_run
/// use segmentar::config::load_config;
///
/// let spec = load_config("configs/schedule_160k.yaml")?;
/// println!("{} iterations", spec.runner.max_iters);
/// # Ok::<(), segmentar::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunSpec> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path)
        .map_err(|e| Error::io(format!("reading config {}", path.display()), e))?;
    let spec = parse_config(&yaml)?;
    tracing::debug!(path = %path.display(), max_iters = spec.runner.max_iters, "config loaded");
    Ok(spec)
}

/// Parse and validate a run specification from YAML text
pub fn parse_config(yaml: &str) -> Result<RunSpec> {
    let spec: RunSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config("config", format!("failed to parse YAML config: {e}")))?;
    validate_config(&spec)?;
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "runner:\n  max_iters: 10\n  checkpoint_interval: 5").unwrap();
        let spec = load_config(file.path()).unwrap();
        assert_eq!(spec.runner.checkpoint_interval, Some(5));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("/nonexistent/run.yaml").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        assert!(parse_config("runner: [").unwrap_err().is_config());
    }

    #[test]
    fn test_invalid_values_rejected_at_load() {
        let err = parse_config("runner:\n  max_iters: 0\n").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("max_iters"));
    }
}
