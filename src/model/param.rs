//! Trainable parameter handle

use ndarray::Array1;

/// A flat trainable parameter with an optional gradient and a gradient switch
///
/// When `requires_grad` is false the parameter carries no gradient and the
/// optimizer leaves it untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    data: Array1<f32>,
    grad: Option<Array1<f32>>,
    requires_grad: bool,
}

impl Param {
    /// Create a trainable parameter from data
    pub fn new(data: Array1<f32>) -> Self {
        Self { data, grad: None, requires_grad: true }
    }

    /// Create a trainable parameter from a vector
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self::new(Array1::from(values))
    }

    /// Create a zero-initialized trainable parameter
    pub fn zeros(len: usize) -> Self {
        Self::new(Array1::zeros(len))
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the parameter has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current values
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutable access to current values
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Accumulated gradient, if any
    pub fn grad(&self) -> Option<&Array1<f32>> {
        self.grad.as_ref()
    }

    /// Set the gradient. Ignored while gradients are disabled.
    pub fn set_grad(&mut self, grad: Array1<f32>) {
        if self.requires_grad {
            self.grad = Some(grad);
        }
    }

    /// Add to the gradient, allocating it on first use. Ignored while gradients are disabled.
    pub fn accumulate_grad(&mut self, grad: &Array1<f32>) {
        if !self.requires_grad {
            return;
        }
        match self.grad.as_mut() {
            Some(g) => *g += grad,
            None => self.grad = Some(grad.clone()),
        }
    }

    /// Drop the gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Whether gradients flow into this parameter
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Enable or disable gradient flow. Disabling also drops any pending gradient.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
        if !requires_grad {
            self.grad = None;
        }
    }
}
