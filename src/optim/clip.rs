//! Gradient clipping utilities

use crate::model::ParamStore;

/// Clip gradients by global norm
///
/// Computes the global norm over the gradients of trainable parameters and
/// scales them down if it exceeds `max_norm`. Frozen parameters carry no
/// gradient and are skipped.
///
/// Algorithm:
/// 1. global_norm = sqrt(sum of all gradient squared norms)
/// 2. If global_norm > max_norm, every gradient is scaled by max_norm / global_norm
///
/// # Returns
/// The global norm before clipping
pub fn clip_grad_norm(params: &mut ParamStore, max_norm: f32) -> f32 {
    let total_norm_sq: f32 = params
        .iter()
        .filter(|(_, p)| p.requires_grad())
        .filter_map(|(_, p)| p.grad())
        .map(|grad| grad.iter().map(|&g| g * g).sum::<f32>())
        .sum();

    let global_norm = total_norm_sq.sqrt();

    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        for (_, param) in params.iter_mut() {
            if let Some(grad) = param.grad() {
                let clipped = grad * clip_coef;
                param.set_grad(clipped);
            }
        }
    }

    global_norm
}
