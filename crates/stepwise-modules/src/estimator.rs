//! Local error estimators.
//!
//! Both publish `error_estimate`, a component-wise vector with the sign
//! convention `estimate ≈ y_exact − y_lower` for embedded pairs and
//! `estimate ≈ y_exact − y_fine` for step doubling.

use stepwise_core::{Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

/// `final_values − final_values_embedded`.
#[derive(Debug)]
pub struct EmbeddedEstimator {
    decls: Declarations,
}

impl EmbeddedEstimator {
    /// Create the estimator.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require([Key::FinalValues, Key::FinalValuesEmbedded])
                .supply([Key::ErrorEstimate]),
        }
    }
}

impl Default for EmbeddedEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for EmbeddedEstimator {
    fn name(&self) -> &str {
        "embedded_estimator"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let high = bag.final_values()?;
        let low = bag.vector(Key::FinalValuesEmbedded)?;
        ctx.check_dimension(high)?;
        ctx.check_dimension(low)?;
        let estimate: Vec<f64> = high.iter().zip(low).map(|(h, l)| h - l).collect();
        ctx.publish(Key::ErrorEstimate, estimate)
    }
}

/// Richardson estimate `(fine − coarse) / (2^q − 1)` from a
/// [`StepDoubling`](crate::StepDoubling) pair, with `q` the kernel order.
#[derive(Debug)]
pub struct DoublingEstimator {
    decls: Declarations,
}

impl DoublingEstimator {
    /// Create the estimator.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require([Key::FinalValuesFine, Key::FinalValuesCoarse, Key::Order])
                .supply([Key::ErrorEstimate]),
        }
    }
}

impl Default for DoublingEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for DoublingEstimator {
    fn name(&self) -> &str {
        "doubling_estimator"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let fine = bag.vector(Key::FinalValuesFine)?;
        let coarse = bag.vector(Key::FinalValuesCoarse)?;
        let order = bag.order()?;
        ctx.check_dimension(fine)?;
        ctx.check_dimension(coarse)?;
        if order == 0 {
            return Err(ModuleError::ExecutionFailed {
                reason: "step doubling needs a kernel of order at least 1".into(),
            });
        }
        let denom = 2f64.powi(order as i32) - 1.0;
        let estimate: Vec<f64> = fine
            .iter()
            .zip(coarse)
            .map(|(f, c)| (f - c) / denom)
            .collect();
        ctx.publish(Key::ErrorEstimate, estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::PropertyBag;
    use stepwise_module::StepHistory;
    use stepwise_test_utils::{seeded_bag, HarmonicOscillator};

    fn run(module: &dyn Module, bag: &mut PropertyBag) -> Result<(), ModuleError> {
        let history = StepHistory::new();
        let ode = HarmonicOscillator::new(1.0);
        let supplies = module.declarations().supplies().clone();
        let mut ctx = StepContext::new(bag, &ode, &history, module.name(), &supplies);
        module.step(&mut ctx)
    }

    #[test]
    fn embedded_difference() {
        let mut bag = seeded_bag(0.0, 0.1, &[1.0, 1.0]);
        bag.insert(Key::FinalValues, vec![1.5, 2.0]);
        bag.insert(Key::FinalValuesEmbedded, vec![1.25, 2.5]);
        run(&EmbeddedEstimator::new(), &mut bag).unwrap();
        assert_eq!(bag.error_estimate().unwrap(), &[0.25, -0.5]);
    }

    #[test]
    fn doubling_scales_by_order() {
        let mut bag = seeded_bag(0.0, 0.1, &[1.0, 1.0]);
        bag.insert(Key::FinalValuesFine, vec![1.3, 0.0]);
        bag.insert(Key::FinalValuesCoarse, vec![1.0, 0.6]);
        bag.insert(Key::Order, 2u32);
        run(&DoublingEstimator::new(), &mut bag).unwrap();
        let est = bag.error_estimate().unwrap();
        assert!((est[0] - 0.1).abs() < 1e-15);
        assert!((est[1] + 0.2).abs() < 1e-15);
    }

    #[test]
    fn zero_order_rejected() {
        let mut bag = seeded_bag(0.0, 0.1, &[1.0, 1.0]);
        bag.insert(Key::FinalValuesFine, vec![1.0, 1.0]);
        bag.insert(Key::FinalValuesCoarse, vec![1.0, 1.0]);
        bag.insert(Key::Order, 0u32);
        assert!(run(&DoublingEstimator::new(), &mut bag).is_err());
    }

    #[test]
    fn wrong_length_is_a_dimension_error() {
        let mut bag = seeded_bag(0.0, 0.1, &[1.0, 1.0]);
        bag.insert(Key::FinalValues, vec![1.0]);
        bag.insert(Key::FinalValuesEmbedded, vec![1.0]);
        assert!(matches!(
            run(&EmbeddedEstimator::new(), &mut bag),
            Err(ModuleError::DimensionMismatch { .. })
        ));
    }
}
