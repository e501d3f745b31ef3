//! One-shot per-class statistics for margin calibration

use super::source::AnnotationSource;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const NAME: &str = "dataset_stats";

/// Statistics of one class
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassStat {
    /// Labelled pixels of this class
    pub pixel_count: u64,
    /// Margin applied to the class's own logit
    pub positive_margin: f64,
    /// Margin applied against the class
    pub negative_margin: f64,
}

/// Per-class statistics over the whole training set
///
/// Computed once before training and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistics {
    /// One entry per class, in class order
    pub classes: Vec<ClassStat>,
    /// Non-ignored pixels over the whole dataset
    pub total_pixels: u64,
}

impl ClassStatistics {
    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Positive margins in class order
    pub fn positive_margins(&self) -> Vec<f64> {
        self.classes.iter().map(|c| c.positive_margin).collect()
    }

    /// Negative margins in class order
    pub fn negative_margins(&self) -> Vec<f64> {
        self.classes.iter().map(|c| c.negative_margin).collect()
    }
}

/// Computes margin calibration constants from a full pass over the annotations
///
/// For class `i` with `n_i` pixels out of `N` labelled pixels,
/// `p_i = n_i / N` and `b_i = N - n_i`:
///
/// - `negative_margin_i = τ · sqrt(b_i) / n_i`
/// - `positive_margin_i = negative_margin_i · p_i · sqrt(n_i) / (υ · b_i − p_i · sqrt(b_i))`
///
/// A class without pixels, or a non-positive denominator, is a configuration
/// error; margins are never clamped.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetStatCollector {
    tau: f64,
    upsilon: f64,
}

impl Default for DatasetStatCollector {
    fn default() -> Self {
        Self { tau: 10.0, upsilon: 1.0 }
    }
}

impl DatasetStatCollector {
    /// Collector with custom `τ` and `υ`; both must be positive
    pub fn new(tau: f64, upsilon: f64) -> Result<Self> {
        for (name, v) in [("tau", tau), ("upsilon", upsilon)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::config(NAME, format!("{name} must be positive, got {v}")));
            }
        }
        Ok(Self { tau, upsilon })
    }

    /// Count labelled pixels per class over every annotation
    pub fn count_pixels(&self, source: &dyn AnnotationSource) -> Result<Vec<u64>> {
        let num_classes = source.num_classes();
        let ignore = source.ignore_index();
        let reduce = source.reduce_zero_label();
        if reduce && ignore != 255 {
            return Err(Error::config(
                NAME,
                format!("reduce_zero_label requires ignore index 255, got {ignore}"),
            ));
        }

        let mut counts = vec![0u64; num_classes];
        for idx in 0..source.len() {
            let map = source.annotation(idx)?;
            for &raw in map.iter() {
                let label = match (reduce, raw) {
                    (_, l) if l == ignore => continue,
                    (true, 0) => continue,
                    (true, l) => l - 1,
                    (false, l) => l,
                };
                let slot = counts.get_mut(label as usize).ok_or_else(|| {
                    Error::config(
                        NAME,
                        format!("annotation {idx} has label {label}, beyond {num_classes} classes"),
                    )
                })?;
                *slot += 1;
            }
        }
        tracing::debug!(items = source.len(), num_classes, "pixel histogram collected");
        Ok(counts)
    }

    /// Margins from a per-class pixel histogram
    pub fn margins_from_counts(&self, counts: &[u64]) -> Result<ClassStatistics> {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return Err(Error::config(NAME, "dataset has no labelled pixels"));
        }
        let n_total = total as f64;

        let mut classes = Vec::with_capacity(counts.len());
        for (class, &count) in counts.iter().enumerate() {
            if count == 0 {
                return Err(Error::config(
                    NAME,
                    format!("class {class} has no pixels; its margins would be infinite"),
                ));
            }
            let n = count as f64;
            let prob = n / n_total;
            let bg = n_total - n;
            let negative = self.tau * bg.sqrt() / n;
            let denom = self.upsilon * bg - prob * bg.sqrt();
            if !(denom.is_finite() && denom > 0.0) {
                return Err(Error::config(
                    NAME,
                    format!(
                        "class {class}: positive margin denominator is {denom} \
                         ({bg} background pixels, upsilon {})",
                        self.upsilon
                    ),
                ));
            }
            let positive = negative * prob * n.sqrt() / denom;
            classes.push(ClassStat { pixel_count: count, positive_margin: positive, negative_margin: negative });
        }
        Ok(ClassStatistics { classes, total_pixels: total })
    }

    /// Full pass: histogram then margins
    pub fn collect(&self, source: &dyn AnnotationSource) -> Result<ClassStatistics> {
        let counts = self.count_pixels(source)?;
        let stats = self.margins_from_counts(&counts)?;
        tracing::info!(
            num_classes = stats.num_classes(),
            total_pixels = stats.total_pixels,
            "class statistics computed"
        );
        Ok(stats)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::data::InMemoryAnnotations;
    use ndarray::Array2;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_collection_is_idempotent(
            pixels in prop::collection::vec(0u8..4, 16..64),
        ) {
            let mut labels = pixels.clone();
            // every class present at least once
            labels.extend([0u8, 1, 2, 3]);
            let len = labels.len();
            let map = Array2::from_shape_vec((1, len), labels).unwrap();
            let src = InMemoryAnnotations::new(vec![map], 4);

            let collector = DatasetStatCollector::default();
            let first = collector.collect(&src);
            let second = collector.collect(&src);
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(&a, &b);
                    for c in &a.classes {
                        prop_assert!(c.positive_margin.is_finite() && c.negative_margin.is_finite());
                    }
                }
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "collection was not deterministic"),
            }
        }
    }
}
