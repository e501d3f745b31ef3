//! Property-based tests for configuration validation

use super::error::ValidationError;
use super::tests::create_valid_spec;
use super::validator::validate_config;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_valid_ranges_pass(
        max_iters in 1usize..200_000,
        lr in 1e-6f32..1.0,
        momentum in 0.0f32..0.99,
        grad_clip in proptest::option::of(0.1f32..100.0),
    ) {
        let mut spec = create_valid_spec();
        spec.runner.max_iters = max_iters;
        spec.optimizer.lr = lr;
        spec.optimizer.momentum = momentum;
        spec.optimizer.grad_clip = grad_clip;
        prop_assert!(validate_config(&spec).is_ok());
    }

    #[test]
    fn prop_momentum_at_or_above_one_fails(momentum in 1.0f32..10.0) {
        let mut spec = create_valid_spec();
        spec.optimizer.momentum = momentum;
        let is_momentum_error =
            matches!(validate_config(&spec), Err(ValidationError::InvalidMomentum { .. }));
        prop_assert!(is_momentum_error);
    }

    #[test]
    fn prop_non_increasing_steps_fail(a in 1usize..1000, d in 0usize..1000) {
        let mut spec = create_valid_spec();
        if let Some(policy) = spec.lr_config.as_mut() {
            policy.steps = vec![a + d, a];
        }
        let is_lr_error = matches!(validate_config(&spec), Err(ValidationError::InvalidLrPolicy(_)));
        prop_assert!(is_lr_error);
    }
}
