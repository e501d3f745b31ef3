//! Margin calibration receiver for calibration-aware loss terms

use crate::data::ClassStatistics;
use crate::{Error, Result};
use std::sync::Arc;

/// Per-class margins handed to a calibration-aware loss term
///
/// The statistics are set once before the first iteration and shared
/// read-only for the rest of the run.
#[derive(Clone, Debug)]
pub struct MarginCalibration {
    num_classes: usize,
    stats: Option<Arc<ClassStatistics>>,
}

impl MarginCalibration {
    /// Receiver expecting statistics for `num_classes` classes
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes, stats: None }
    }

    /// Number of classes the loss term covers
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Install the statistics; the class count must match
    pub fn set_margins(&mut self, stats: Arc<ClassStatistics>) -> Result<()> {
        if stats.num_classes() != self.num_classes {
            return Err(Error::config(
                "calibration",
                format!(
                    "statistics cover {} classes, loss expects {}",
                    stats.num_classes(),
                    self.num_classes
                ),
            ));
        }
        self.stats = Some(stats);
        Ok(())
    }

    /// Whether margins have been installed
    pub fn is_ready(&self) -> bool {
        self.stats.is_some()
    }

    /// Fail unless margins have been installed
    pub fn ensure_ready(&self) -> Result<&ClassStatistics> {
        self.stats
            .as_deref()
            .ok_or_else(|| Error::config("calibration", "class statistics were not provided before training"))
    }

    /// `(positive_margin, negative_margin)` of a class
    pub fn margins(&self, class: usize) -> Option<(f64, f64)> {
        let stat = self.stats.as_ref()?.classes.get(class)?;
        Some((stat.positive_margin, stat.negative_margin))
    }
}
