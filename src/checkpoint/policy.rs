//! Key matching policy for loading persisted state

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// How to treat missing, unexpected, or mis-shaped keys when loading state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Any key mismatch fails the whole load; nothing is written
    #[default]
    Strict,
    /// Matching keys are loaded; mismatches are reported and skipped
    Lenient,
}

/// Outcome of matching persisted keys against tracked keys
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Keys loaded
    pub loaded: Vec<String>,
    /// Tracked keys absent from the persisted state
    pub missing: Vec<String>,
    /// Persisted keys nothing tracks
    pub unexpected: Vec<String>,
    /// Keys present on both sides with incompatible shapes
    pub mismatched: Vec<String>,
    /// Keys skipped on request
    pub ignored: Vec<String>,
}

impl LoadReport {
    /// No missing, unexpected, or mismatched keys
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    /// Human-readable list of problems
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing keys: {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("unexpected keys: {}", self.unexpected.join(", ")));
        }
        if !self.mismatched.is_empty() {
            parts.push(format!("shape mismatch: {}", self.mismatched.join(", ")));
        }
        if parts.is_empty() {
            "all keys matched".to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Apply the policy: fail under `Strict` when unclean, warn under `Lenient`
    pub fn enforce(&self, component: &str, policy: LoadPolicy) -> Result<()> {
        if self.is_clean() {
            return Ok(());
        }
        match policy {
            LoadPolicy::Strict => Err(Error::state(component, self.summary())),
            LoadPolicy::Lenient => {
                for key in &self.missing {
                    tracing::warn!(component, key = %key, "missing key skipped");
                }
                for key in &self.unexpected {
                    tracing::warn!(component, key = %key, "unexpected key skipped");
                }
                for key in &self.mismatched {
                    tracing::warn!(component, key = %key, "mis-shaped key skipped");
                }
                Ok(())
            }
        }
    }
}
