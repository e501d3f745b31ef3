//! Annotation access for dataset statistics

use crate::{Error, Result};
use ndarray::Array2;

/// Dataset collaborator: per-item segmentation annotations
pub trait AnnotationSource {
    /// Number of items
    fn len(&self) -> usize;

    /// Check whether the dataset has no items
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of classes
    fn num_classes(&self) -> usize;

    /// Label excluded from every statistic
    fn ignore_index(&self) -> u8 {
        255
    }

    /// Whether label 0 means "unlabelled" and the rest shift down by one
    fn reduce_zero_label(&self) -> bool {
        false
    }

    /// Annotation map of item `idx`
    fn annotation(&self, idx: usize) -> Result<Array2<u8>>;
}

/// Annotations held in memory
#[derive(Clone, Debug)]
pub struct InMemoryAnnotations {
    maps: Vec<Array2<u8>>,
    num_classes: usize,
    ignore_index: u8,
    reduce_zero_label: bool,
}

impl InMemoryAnnotations {
    /// Wrap annotation maps for `num_classes` classes, ignore label 255
    pub fn new(maps: Vec<Array2<u8>>, num_classes: usize) -> Self {
        Self { maps, num_classes, ignore_index: 255, reduce_zero_label: false }
    }

    /// Use a different ignore label
    pub fn with_ignore_index(mut self, ignore_index: u8) -> Self {
        self.ignore_index = ignore_index;
        self
    }

    /// Treat label 0 as unlabelled
    pub fn with_reduce_zero_label(mut self, reduce: bool) -> Self {
        self.reduce_zero_label = reduce;
        self
    }
}

impl AnnotationSource for InMemoryAnnotations {
    fn len(&self) -> usize {
        self.maps.len()
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn ignore_index(&self) -> u8 {
        self.ignore_index
    }

    fn reduce_zero_label(&self) -> bool {
        self.reduce_zero_label
    }

    fn annotation(&self, idx: usize) -> Result<Array2<u8>> {
        self.maps.get(idx).cloned().ok_or_else(|| {
            Error::config("dataset", format!("annotation {idx} out of range ({} items)", self.maps.len()))
        })
    }
}
