//! Output cadences.
//!
//! An [`OutputModule`] sits at the end of the pipeline and forwards
//! accepted points to an [`OutputSink`]. Cadences other than
//! [`OutputCadence::AllPoints`] publish their next target through
//! [`Module::next_stop`], and the solver shortens the step to land on it
//! exactly. Kernels that advance a fictitious time cannot be clamped; a
//! target that falls inside such a step is reconstructed with the
//! published scheme's [`Interpolant`], or a cubic Hermite through the
//! step's ends when no scheme is published.

use std::sync::Mutex;

use stepwise_core::{Interpolant, Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

use crate::sink::{OutputSink, SinkError};

/// Which points reach the sink.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputCadence {
    /// The initial point and every accepted step.
    AllPoints,
    /// `n` points evenly spaced over `[t0, tf]`, both ends included.
    FixedCount(usize),
    /// `t0, t0 + dt, t0 + 2·dt, ...` up to `tf`.
    FixedInterval(f64),
    /// Explicit output times. Times outside `[t0, tf]` are ignored.
    Times(Vec<f64>),
}

impl OutputCadence {
    /// Target times over `[t0, tf]`, ascending. `None` for
    /// [`OutputCadence::AllPoints`].
    pub fn targets(&self, t0: f64, tf: f64) -> Option<Vec<f64>> {
        match self {
            Self::AllPoints => None,
            Self::FixedCount(0) => Some(Vec::new()),
            Self::FixedCount(1) => Some(vec![tf]),
            Self::FixedCount(n) => {
                let span = tf - t0;
                let last = (*n - 1) as f64;
                let mut times: Vec<f64> =
                    (0..*n).map(|i| t0 + span * (i as f64 / last)).collect();
                if let Some(end) = times.last_mut() {
                    *end = tf;
                }
                Some(times)
            }
            Self::FixedInterval(dt) => {
                let mut times = Vec::new();
                if *dt > 0.0 && dt.is_finite() {
                    let mut k = 0u64;
                    loop {
                        let t = t0 + k as f64 * dt;
                        if t > tf + slack(tf) {
                            break;
                        }
                        times.push(t.min(tf));
                        k += 1;
                    }
                }
                Some(times)
            }
            Self::Times(times) => {
                let mut kept: Vec<f64> = times
                    .iter()
                    .copied()
                    .filter(|t| *t >= t0 - slack(t0) && *t <= tf + slack(tf))
                    .collect();
                kept.sort_by(f64::total_cmp);
                kept.dedup();
                Some(kept)
            }
        }
    }
}

/// Tolerance for "reached a target" comparisons.
fn slack(t: f64) -> f64 {
    64.0 * f64::EPSILON * t.abs().max(1.0)
}

struct OutputState {
    sink: Box<dyn OutputSink>,
    targets: Option<Vec<f64>>,
    next: usize,
    emitted: u64,
}

impl OutputState {
    fn pending(&self) -> Option<f64> {
        self.targets.as_ref()?.get(self.next).copied()
    }

    fn emit(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError> {
        self.sink.emit(t, y)?;
        self.emitted += 1;
        Ok(())
    }

    /// Pending targets strictly before `t1`, consumed.
    fn take_inside(&mut self, t1: f64) -> Vec<f64> {
        let mut inside = Vec::new();
        while let Some(target) = self.pending() {
            if target + slack(target) >= t1 {
                break;
            }
            inside.push(target);
            self.next += 1;
        }
        inside
    }

    /// Emit `(t, y)` if it reaches the pending target, then drop every
    /// target it covers.
    fn offer(&mut self, t: f64, y: &[f64]) -> Result<(), SinkError> {
        if self.targets.is_none() {
            return self.emit(t, y);
        }
        let Some(target) = self.pending() else {
            return Ok(());
        };
        if t + slack(target) < target {
            return Ok(());
        }
        self.emit(t, y)?;
        while let Some(target) = self.pending() {
            if t + slack(target) < target {
                break;
            }
            self.next += 1;
        }
        Ok(())
    }
}

fn sink_error(e: SinkError) -> ModuleError {
    ModuleError::Sink {
        reason: e.to_string(),
    }
}

fn poisoned() -> ModuleError {
    ModuleError::Sink {
        reason: "output state poisoned".into(),
    }
}

/// Forwards accepted points to a sink at a chosen cadence.
pub struct OutputModule {
    cadence: OutputCadence,
    state: Mutex<OutputState>,
    decls: Declarations,
}

impl OutputModule {
    /// Attach `sink` with `cadence`.
    pub fn new(sink: Box<dyn OutputSink>, cadence: OutputCadence) -> Self {
        Self {
            cadence,
            state: Mutex::new(OutputState {
                sink,
                targets: None,
                next: 0,
                emitted: 0,
            }),
            decls: Declarations::new()
                .require([
                    Key::InitialTime,
                    Key::InitialValues,
                    Key::FinalTime,
                    Key::FinalValues,
                ])
                .require_if_present([Key::Accepted])
                .request([Key::AdvancedTime, Key::Scheme]),
        }
    }

    /// The cadence.
    pub fn cadence(&self) -> &OutputCadence {
        &self.cadence
    }

    /// Points emitted so far in the current run.
    pub fn emitted(&self) -> u64 {
        self.state.lock().map(|s| s.emitted).unwrap_or(0)
    }
}

impl std::fmt::Debug for OutputModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputModule")
            .field("cadence", &self.cadence)
            .finish()
    }
}

impl Module for OutputModule {
    fn name(&self) -> &str {
        "output"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn begin(&mut self, t0: f64, tf: f64, y0: &[f64]) -> Result<(), ModuleError> {
        let targets = self.cadence.targets(t0, tf);
        let state = self.state.get_mut().map_err(|_| poisoned())?;
        state.targets = targets;
        state.next = 0;
        state.emitted = 0;
        state.sink.begin(y0.len()).map_err(sink_error)?;
        state.offer(t0, y0).map_err(sink_error)
    }

    fn end(&mut self, _t: f64, _y: &[f64]) -> Result<(), ModuleError> {
        let state = self.state.get_mut().map_err(|_| poisoned())?;
        state.sink.end().map_err(sink_error)
    }

    fn next_stop(&self, t: f64) -> Option<f64> {
        let state = self.state.lock().ok()?;
        let targets = state.targets.as_ref()?;
        targets[state.next..]
            .iter()
            .copied()
            .find(|target| *target > t + slack(*target))
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        if bag.flag_if_present(Key::Accepted)? == Some(false) {
            return Ok(());
        }
        let t1 = match bag.scalar_if_present(Key::AdvancedTime)? {
            Some(t) => t,
            None => bag.final_time()?,
        };
        let y1 = bag.final_values()?;
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.targets.is_some() {
            let inside = state.take_inside(t1);
            if !inside.is_empty() {
                let t0 = bag.initial_time()?;
                let y0 = bag.initial_values()?;
                let interpolant = if bag.contains(Key::Scheme) {
                    bag.scheme(Key::Scheme)?.interpolant()
                } else {
                    Interpolant::CubicHermite
                };
                let n = y0.len();
                let (mut f0, mut f1) = (Vec::new(), Vec::new());
                if interpolant.needs_derivatives() {
                    f0.resize(n, 0.0);
                    f1.resize(n, 0.0);
                    ctx.ode().rhs(t0, y0, &mut f0)?;
                    ctx.ode().rhs(t1, y1, &mut f1)?;
                }
                let h = t1 - t0;
                let mut y = vec![0.0; n];
                for target in inside {
                    interpolant.eval((target - t0) / h, h, y0, y1, &f0, &f1, &mut y);
                    state.emit(target, &y).map_err(sink_error)?;
                }
            }
        }
        state.offer(t1, y1).map_err(sink_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use stepwise_core::{KeySet, PropertyBag};
    use stepwise_module::StepHistory;
    use stepwise_core::tableau;
    use stepwise_test_utils::{assert_close, seeded_bag, Decay};

    fn offer(module: &OutputModule, bag: &mut PropertyBag) {
        let history = StepHistory::new();
        let supplies = KeySet::empty();
        let ode = Decay::new(1.0);
        let mut ctx = StepContext::new(bag, &ode, &history, "output", &supplies);
        module.step(&mut ctx).unwrap();
    }

    fn step_bag(t0: f64, h: f64, y1: f64, accepted: bool) -> PropertyBag {
        let mut bag = seeded_bag(t0, h, &[0.0]);
        bag.insert(Key::FinalValues, vec![y1]);
        bag.insert(Key::Accepted, accepted);
        bag
    }

    #[test]
    fn fixed_count_targets_include_both_ends() {
        let t = OutputCadence::FixedCount(5).targets(0.0, 1.0).unwrap();
        assert_eq!(t, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(
            OutputCadence::FixedCount(1).targets(0.0, 2.0),
            Some(vec![2.0])
        );
    }

    #[test]
    fn fixed_interval_stops_at_final_time() {
        let t = OutputCadence::FixedInterval(0.5).targets(1.0, 2.2).unwrap();
        assert_eq!(t, vec![1.0, 1.5, 2.0]);
    }

    #[test]
    fn explicit_times_sorted_and_filtered() {
        let cadence = OutputCadence::Times(vec![0.7, -1.0, 0.2, 5.0, 0.2]);
        assert_eq!(cadence.targets(0.0, 1.0), Some(vec![0.2, 0.7]));
    }

    #[test]
    fn all_points_emits_initial_and_accepted_steps() {
        let sink = MemorySink::new();
        let mut module = OutputModule::new(Box::new(sink.clone()), OutputCadence::AllPoints);
        module.begin(0.0, 1.0, &[1.0]).unwrap();
        offer(&module, &mut step_bag(0.0, 0.5, 0.6, true));
        offer(&module, &mut step_bag(0.5, 0.5, 0.1, false));
        offer(&module, &mut step_bag(0.5, 0.25, 0.4, true));
        module.end(0.75, &[0.4]).unwrap();
        let sol = sink.solution();
        assert_eq!(sol.times, vec![0.0, 0.5, 0.75]);
        assert_eq!(sol.values[2], vec![0.4]);
        assert_eq!(module.next_stop(0.0), None);
    }

    #[test]
    fn targets_drive_next_stop_and_emission() {
        let sink = MemorySink::new();
        let mut module =
            OutputModule::new(Box::new(sink.clone()), OutputCadence::FixedInterval(0.5));
        module.begin(0.0, 1.0, &[1.0]).unwrap();
        assert_eq!(sink.solution().times, vec![0.0]);
        assert_eq!(module.next_stop(0.0), Some(0.5));

        offer(&module, &mut step_bag(0.0, 0.3, 0.7, true));
        assert_eq!(sink.solution().len(), 1);
        assert_eq!(module.next_stop(0.3), Some(0.5));

        offer(&module, &mut step_bag(0.3, 0.2, 0.6, true));
        assert_eq!(sink.solution().times, vec![0.0, 0.5]);
        assert_eq!(module.next_stop(0.5), Some(1.0));
        assert_eq!(module.emitted(), 2);
    }

    #[test]
    fn unclamped_step_interpolates_each_target_inside() {
        let sink = MemorySink::new();
        let mut module =
            OutputModule::new(Box::new(sink.clone()), OutputCadence::FixedInterval(0.25));
        module.begin(0.0, 1.0, &[0.0]).unwrap();
        let mut bag = step_bag(0.0, 0.1, 0.6, true);
        bag.insert(Key::AdvancedTime, 0.6);
        bag.insert(Key::Scheme, tableau::forward_euler());
        offer(&module, &mut bag);
        // 0.25 and 0.5 fall inside the step; a first-order scheme
        // interpolates linearly. Nothing lands on 0.6 itself.
        let sol = sink.solution();
        assert_eq!(sol.times, vec![0.0, 0.25, 0.5]);
        assert_close(sol.values[1][0], 0.25, 1e-15);
        assert_close(sol.values[2][0], 0.5, 1e-15);
        assert_eq!(module.next_stop(0.6), Some(0.75));
    }

    #[test]
    fn hermite_used_without_a_scheme() {
        let sink = MemorySink::new();
        let mut module =
            OutputModule::new(Box::new(sink.clone()), OutputCadence::Times(vec![0.25, 0.5, 0.6]));
        module.begin(0.0, 1.0, &[1.0]).unwrap();
        let mut bag = seeded_bag(0.0, 0.1, &[1.0]);
        bag.insert(Key::FinalValues, vec![(-0.6f64).exp()]);
        bag.insert(Key::AdvancedTime, 0.6);
        offer(&module, &mut bag);
        let sol = sink.solution();
        assert_eq!(sol.times, vec![0.25, 0.5, 0.6]);
        assert_close(sol.values[0][0], (-0.25f64).exp(), 1e-3);
        assert_close(sol.values[1][0], (-0.5f64).exp(), 1e-3);
        assert_eq!(sol.values[2][0], (-0.6f64).exp());
    }
}
