//! Cooperative stop requests.
//!
//! Both modules publish `stop`, OR-ing in any value an earlier stop
//! module already published this step. The solver checks the flag after
//! every attempt and ends the run at the last accepted point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stepwise_core::{Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

/// Stops the run once a shared flag is raised.
///
/// The flag can be set from any thread; the run ends after the attempt
/// in progress.
#[derive(Debug)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    decls: Declarations,
}

impl StopSignal {
    /// Watch `flag`.
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            decls: Declarations::new().request([Key::Stop]).supply([Key::Stop]),
        }
    }

    /// A fresh flag and a module watching it.
    pub fn pair() -> (Arc<AtomicBool>, Self) {
        let flag = Arc::new(AtomicBool::new(false));
        (Arc::clone(&flag), Self::new(flag))
    }
}

impl Module for StopSignal {
    fn name(&self) -> &str {
        "stop_signal"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let earlier = ctx.bag().flag_if_present(Key::Stop)?.unwrap_or(false);
        let raised = self.flag.load(Ordering::Acquire);
        ctx.publish(Key::Stop, earlier || raised)
    }
}

type Predicate = dyn Fn(f64, &[f64]) -> bool + Send + Sync;

/// Stops the run at the first accepted point where `predicate(t, y)`
/// holds.
pub struct StopWhen {
    predicate: Box<Predicate>,
    decls: Declarations,
}

impl StopWhen {
    /// Stop when `predicate(t1, y1)` returns `true` for an accepted step.
    pub fn new(predicate: impl Fn(f64, &[f64]) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Box::new(predicate),
            decls: Declarations::new()
                .require([Key::FinalTime, Key::FinalValues])
                .require_if_present([Key::Accepted])
                .request([Key::Stop, Key::AdvancedTime])
                .supply([Key::Stop]),
        }
    }
}

impl std::fmt::Debug for StopWhen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopWhen").finish_non_exhaustive()
    }
}

impl Module for StopWhen {
    fn name(&self) -> &str {
        "stop_when"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let earlier = bag.flag_if_present(Key::Stop)?.unwrap_or(false);
        let accepted = bag.flag_if_present(Key::Accepted)?.unwrap_or(true);
        let hit = accepted && {
            let t1 = match bag.scalar_if_present(Key::AdvancedTime)? {
                Some(t) => t,
                None => bag.final_time()?,
            };
            (self.predicate)(t1, bag.final_values()?)
        };
        ctx.publish(Key::Stop, earlier || hit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::PropertyBag;
    use stepwise_module::StepHistory;
    use stepwise_test_utils::{seeded_bag, Decay};

    fn run(module: &dyn Module, bag: &mut PropertyBag) {
        let history = StepHistory::new();
        let supplies = module.declarations().supplies().clone();
        let ode = Decay::new(1.0);
        let mut ctx = StepContext::new(bag, &ode, &history, module.name(), &supplies);
        module.step(&mut ctx).unwrap();
    }

    #[test]
    fn signal_follows_flag() {
        let (flag, module) = StopSignal::pair();
        let mut bag = PropertyBag::new();
        run(&module, &mut bag);
        assert!(!bag.flag(Key::Stop).unwrap());
        flag.store(true, Ordering::Release);
        run(&module, &mut bag);
        assert!(bag.flag(Key::Stop).unwrap());
    }

    #[test]
    fn earlier_stop_is_kept() {
        let (_flag, module) = StopSignal::pair();
        let mut bag = PropertyBag::new();
        bag.insert(Key::Stop, true);
        run(&module, &mut bag);
        assert!(bag.flag(Key::Stop).unwrap());
    }

    #[test]
    fn predicate_only_on_accepted_steps() {
        let module = StopWhen::new(|_t, y| y[0] < 0.5);
        let mut bag = seeded_bag(0.0, 0.1, &[1.0]);
        bag.insert(Key::FinalValues, vec![0.4]);
        bag.insert(Key::Accepted, false);
        run(&module, &mut bag);
        assert!(!bag.flag(Key::Stop).unwrap());

        bag.insert(Key::Accepted, true);
        run(&module, &mut bag);
        assert!(bag.flag(Key::Stop).unwrap());
    }

    #[test]
    fn predicate_sees_advanced_time() {
        let module = StopWhen::new(|t, _y| t >= 3.0);
        let mut bag = seeded_bag(0.0, 0.1, &[1.0]);
        bag.insert(Key::FinalValues, vec![1.0]);
        run(&module, &mut bag);
        assert!(!bag.flag(Key::Stop).unwrap());
        bag.insert(Key::Stop, false);
        bag.insert(Key::AdvancedTime, 3.5);
        run(&module, &mut bag);
        assert!(bag.flag(Key::Stop).unwrap());
    }
}
