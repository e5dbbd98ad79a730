//! Local Richardson extrapolation.

use stepwise_core::{Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

/// Replaces `final_values` with `final_values + error_estimate`.
///
/// Consumes and republishes `final_values`, so the orderer places it
/// after the estimator and before every other consumer of the key. Paired
/// with step doubling this raises the order of the kept solution by one.
/// The extrapolated value is no longer the point the kernel's FSAL
/// derivative was evaluated at, and the solver stops reusing it.
#[derive(Debug)]
pub struct RichardsonExtrapolation {
    decls: Declarations,
}

impl RichardsonExtrapolation {
    /// Create the module.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require([Key::FinalValues, Key::ErrorEstimate])
                .supply([Key::FinalValues]),
        }
    }
}

impl Default for RichardsonExtrapolation {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for RichardsonExtrapolation {
    fn name(&self) -> &str {
        "richardson_extrapolation"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let y1 = bag.final_values()?;
        let est = bag.error_estimate()?;
        ctx.check_dimension(est)?;
        let improved: Vec<f64> = y1.iter().zip(est).map(|(y, e)| y + e).collect();
        ctx.publish(Key::FinalValues, improved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DoublingEstimator, ForwardEuler, StepDoubling};
    use stepwise_core::KeySet;
    use stepwise_module::{order_modules, StepHistory};
    use stepwise_test_utils::{root_keys, seeded_bag, Decay};

    #[test]
    fn adds_estimate() {
        let module = RichardsonExtrapolation::new();
        let mut bag = seeded_bag(0.0, 0.1, &[1.0]);
        bag.insert(Key::FinalValues, vec![2.0]);
        bag.insert(Key::ErrorEstimate, vec![0.25]);
        let history = StepHistory::new();
        let supplies = KeySet::from([Key::FinalValues]);
        let ode = Decay::new(1.0);
        let mut ctx = StepContext::new(&mut bag, &ode, &history, "r", &supplies);
        module.step(&mut ctx).unwrap();
        assert_eq!(bag.final_values().unwrap(), &[2.25]);
    }

    #[test]
    fn chains_between_estimator_and_consumers() {
        let modules: Vec<Box<dyn Module>> = vec![
            Box::new(RichardsonExtrapolation::new()),
            Box::new(DoublingEstimator::new()),
            Box::new(StepDoubling::new(Box::new(ForwardEuler::new()))),
        ];
        let order = order_modules(&modules, &root_keys()).unwrap();
        assert_eq!(order, vec![2, 1, 0]);
    }
}
