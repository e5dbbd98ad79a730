//! Step-doubling decorator.
//!
//! Wraps a stepping kernel and runs it three times per attempt: two half
//! steps, then one full step from the same start. The two-half-step
//! result becomes `final_values` and is also published as
//! `final_values_fine`; the full step is `final_values_coarse`. A
//! [`DoublingEstimator`](crate::DoublingEstimator) turns the pair into an
//! error estimate.
//!
//! Each invocation runs against a scratch copy of the bag, so the inner
//! kernel never sees another invocation's outputs. Keys the inner kernel
//! supplies besides `final_values` (order, tableau, FSAL derivative) are
//! forwarded from the second half step, which ends where the fine
//! solution does.

use stepwise_core::{Key, ModuleError, Ode, PropertyBag};
use stepwise_module::{Declarations, Module, StepContext};

/// Runs an inner kernel at `h/2` twice and at `h` once.
pub struct StepDoubling {
    name: String,
    inner: Box<dyn Module>,
    decls: Declarations,
}

impl StepDoubling {
    /// Wrap `inner`. The decorator's declarations are the inner
    /// kernel's plus `final_values` and the fine and coarse solutions,
    /// all of which it publishes on every step.
    pub fn new(inner: Box<dyn Module>) -> Self {
        let decls = Declarations::new()
            .supply([Key::FinalValues, Key::FinalValuesFine, Key::FinalValuesCoarse])
            .merge(inner.declarations());
        Self {
            name: format!("step_doubling({})", inner.name()),
            inner,
            decls,
        }
    }

    /// The wrapped kernel.
    pub fn inner(&self) -> &dyn Module {
        self.inner.as_ref()
    }

    fn invoke(
        &self,
        bag: &mut PropertyBag,
        ctx: &StepContext<'_>,
    ) -> Result<Vec<f64>, ModuleError> {
        let supplies = self.inner.declarations().supplies();
        let mut inner_ctx =
            StepContext::new(bag, ctx.ode(), ctx.history(), self.inner.name(), supplies);
        self.inner.step(&mut inner_ctx)?;
        Ok(bag.final_values()?.to_vec())
    }
}

impl std::fmt::Debug for StepDoubling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDoubling")
            .field("inner", &self.inner.name())
            .finish()
    }
}

impl Module for StepDoubling {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn validate(&self, ode: &dyn Ode) -> Result<(), ModuleError> {
        self.inner.validate(ode)
    }

    fn begin(&mut self, t0: f64, tf: f64, y0: &[f64]) -> Result<(), ModuleError> {
        self.inner.begin(t0, tf, y0)
    }

    fn end(&mut self, t: f64, y: &[f64]) -> Result<(), ModuleError> {
        self.inner.end(t, y)
    }

    fn next_stop(&self, t: f64) -> Option<f64> {
        self.inner.next_stop(t)
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let base = ctx.bag().clone();
        let t0 = base.initial_time()?;
        let h = base.step_size()?;
        let half = 0.5 * h;

        let mut first = base.clone();
        first.insert(Key::StepSize, half);
        first.insert(Key::FinalTime, t0 + half);
        let midpoint = self.invoke(&mut first, ctx)?;

        let mut second = base.clone();
        second.insert(Key::InitialTime, t0 + half);
        second.insert(Key::StepSize, half);
        second.insert(Key::InitialValues, midpoint);
        let fine = self.invoke(&mut second, ctx)?;

        let mut full = base;
        let coarse = self.invoke(&mut full, ctx)?;

        for key in self.inner.declarations().supplies() {
            if *key == Key::FinalValues {
                continue;
            }
            if let Some(value) = second.get(*key) {
                ctx.publish(*key, value.clone())?;
            }
        }
        ctx.publish(Key::FinalValues, fine.clone())?;
        ctx.publish(Key::FinalValuesFine, fine)?;
        ctx.publish(Key::FinalValuesCoarse, coarse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExplicitRk, ForwardEuler, StormerVerlet};
    use stepwise_core::tableau;
    use stepwise_module::StepHistory;
    use stepwise_test_utils::{assert_close, seeded_bag, Decay, RecordingModule};

    fn run(module: &StepDoubling, ode: &dyn Ode, bag: &mut PropertyBag) {
        let history = StepHistory::new();
        let supplies = module.declarations().supplies().clone();
        let mut ctx = StepContext::new(bag, ode, &history, module.name(), &supplies);
        module.step(&mut ctx).unwrap();
    }

    #[test]
    fn euler_fine_and_coarse() {
        let module = StepDoubling::new(Box::new(ForwardEuler::new()));
        let mut bag = seeded_bag(0.0, 0.1, &[1.0]);
        run(&module, &Decay::new(1.0), &mut bag);
        assert_close(bag.vector(Key::FinalValuesFine).unwrap()[0], 0.95 * 0.95, 1e-15);
        assert_close(bag.vector(Key::FinalValuesCoarse).unwrap()[0], 0.9, 1e-15);
        assert_eq!(bag.final_values().unwrap(), bag.vector(Key::FinalValuesFine).unwrap());
        assert_eq!(bag.order().unwrap(), 1);
    }

    #[test]
    fn declarations_merge_inner() {
        let kernel = ExplicitRk::new(tableau::dormand_prince()).unwrap();
        let module = StepDoubling::new(Box::new(kernel));
        let supplies = module.declarations().supplies();
        for key in [
            Key::FinalValuesFine,
            Key::FinalValuesCoarse,
            Key::FinalValues,
            Key::FinalDerivative,
            Key::Order,
        ] {
            assert!(supplies.contains(key), "missing {key}");
        }
        assert!(module.declarations().requires().contains(Key::StepSize));
        assert_eq!(module.name(), "step_doubling(explicit_rk(dormand_prince))");
    }

    #[test]
    fn inner_sees_half_steps_then_full() {
        let recorder = RecordingModule::new("kernel");
        let log = recorder.log();
        let module = StepDoubling::new(Box::new(recorder));
        let mut bag = seeded_bag(1.0, 0.2, &[1.0]);
        bag.insert(Key::FinalValues, vec![1.0]);
        let history = StepHistory::new();
        let supplies = module.declarations().supplies().clone();
        let ode = Decay::new(1.0);
        let mut ctx = StepContext::new(&mut bag, &ode, &history, "d", &supplies);
        // The recorder publishes nothing, so the decorator finds the
        // seeded final values each time.
        module.step(&mut ctx).unwrap();
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls, vec![(1.0, 0.1), (1.1, 0.1), (1.0, 0.2)]);
        assert_eq!(bag.vector(Key::FinalValuesFine).unwrap(), &[1.0]);
    }

    #[test]
    fn declares_final_values_for_any_inner() {
        let module = StepDoubling::new(Box::new(RecordingModule::new("kernel")));
        let supplies = module.declarations().supplies();
        for key in [Key::FinalValues, Key::FinalValuesFine, Key::FinalValuesCoarse] {
            assert!(supplies.contains(key), "missing {key}");
        }
    }

    #[test]
    fn validate_forwards_to_inner() {
        let module = StepDoubling::new(Box::new(StormerVerlet::new()));
        assert!(module.validate(&Decay::new(1.0)).is_err());
    }
}
