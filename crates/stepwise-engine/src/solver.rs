//! The stepping loop.
//!
//! A [`Solver`] assembles its modules once per run, then repeats:
//! seed the bag with the step's endpoints, run every module in pipeline
//! order, read back the outcome, update the step history. The loop ends
//! at the final time, on a stop request, or at the step limit.

use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use stepwise_core::{
    AdditiveOde, DenseMatrix, Key, KeySet, ModuleError, Ode, OdeError, PropertyBag, Separable,
};
use stepwise_module::{assemble, Binding, DerivativeCache, Module, Pipeline, StepContext, StepHistory};
use stepwise_modules::{
    ArclengthVerlet, ControlLaw, DoublingEstimator, EmbeddedEstimator, ExplicitRk, ForwardEuler,
    Imex, JacobianModule, OutputCadence, OutputModule, OutputSink, StepController, StepDoubling,
    StormerVerlet,
};
use tracing::{debug, info, trace, warn};

use crate::config::{validate_cadence, ConfigError, ErrorControl, InitialStep, Method, SolverConfig};
use crate::initial_step;
use crate::metrics::RunMetrics;

// ── Termination / SolveError ───────────────────────────────────────

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The final time was reached.
    Completed,
    /// A stop module raised [`Key::Stop`].
    Stopped,
    /// `max_steps` attempts were made before reaching the final time.
    StepLimit,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
            Self::StepLimit => write!(f, "step limit reached"),
        }
    }
}

/// Errors that end a run.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveError {
    /// Configuration or assembly failed before integration started.
    Config(ConfigError),
    /// The solver has already been started.
    AlreadyRunning,
    /// A module failed and the failure is not recoverable.
    ModuleFailed {
        /// Name of the failing module.
        module: String,
        /// What went wrong.
        error: ModuleError,
    },
    /// The step size fell below what the current time can resolve.
    StepSizeUnderflow {
        /// Time at which the step was attempted.
        time: f64,
        /// The step that was too small.
        step: f64,
    },
    /// An output sink failed.
    Sink {
        /// Description from the sink.
        reason: String,
    },
    /// A fixed-step run produced a non-finite state.
    NonFinite {
        /// Start of the offending step.
        time: f64,
    },
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::AlreadyRunning => write!(f, "solver has already been started"),
            Self::ModuleFailed { module, error } => write!(f, "module '{module}' failed: {error}"),
            Self::StepSizeUnderflow { time, step } => {
                write!(f, "step size {step} underflows at t = {time}")
            }
            Self::Sink { reason } => write!(f, "output sink failed: {reason}"),
            Self::NonFinite { time } => {
                write!(f, "non-finite state after the fixed step from t = {time}")
            }
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::ModuleFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigError> for SolveError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

fn module_failure(module: &str, error: ModuleError) -> SolveError {
    match error {
        ModuleError::Sink { reason } => SolveError::Sink { reason },
        error => SolveError::ModuleFailed {
            module: module.to_string(),
            error,
        },
    }
}

// ── CountingOde ────────────────────────────────────────────────────

/// Forwards to the user's ODE and counts evaluations for [`RunMetrics`].
struct CountingOde<'a> {
    inner: &'a dyn Ode,
    rhs: AtomicU64,
    jacobian: AtomicU64,
}

impl<'a> CountingOde<'a> {
    fn new(inner: &'a dyn Ode) -> Self {
        Self {
            inner,
            rhs: AtomicU64::new(0),
            jacobian: AtomicU64::new(0),
        }
    }

    fn rhs_count(&self) -> u64 {
        self.rhs.load(Ordering::Relaxed)
    }

    fn jacobian_count(&self) -> u64 {
        self.jacobian.load(Ordering::Relaxed)
    }

    fn split(&self) -> Result<&'a dyn AdditiveOde, OdeError> {
        self.inner.additive().ok_or_else(|| OdeError::EvaluationFailed {
            reason: "ODE has no additive split".to_string(),
        })
    }
}

impl Ode for CountingOde<'_> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        self.rhs.fetch_add(1, Ordering::Relaxed);
        self.inner.rhs(t, y, dydt)
    }

    fn jacobian(&self, t: f64, y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        self.jacobian.fetch_add(1, Ordering::Relaxed);
        self.inner.jacobian(t, y, jac)
    }

    fn additive(&self) -> Option<&dyn AdditiveOde> {
        self.inner.additive().map(|_| self as &dyn AdditiveOde)
    }

    fn separable(&self) -> Option<&dyn Separable> {
        self.inner.separable().map(|_| self as &dyn Separable)
    }
}

impl AdditiveOde for CountingOde<'_> {
    fn non_stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        self.rhs.fetch_add(1, Ordering::Relaxed);
        self.split()?.non_stiff(t, y, out)
    }

    fn stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        self.rhs.fetch_add(1, Ordering::Relaxed);
        self.split()?.stiff(t, y, out)
    }

    fn stiff_jacobian(&self, t: f64, y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        self.jacobian.fetch_add(1, Ordering::Relaxed);
        self.split()?.stiff_jacobian(t, y, jac)
    }
}

impl Separable for CountingOde<'_> {
    fn acceleration(&self, t: f64, q: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        self.rhs.fetch_add(1, Ordering::Relaxed);
        match self.inner.separable() {
            Some(s) => s.acceleration(t, q, out),
            None => Err(OdeError::EvaluationFailed {
                reason: "ODE is not separable".to_string(),
            }),
        }
    }
}

// ── Module construction ────────────────────────────────────────────

fn kernel(method: &Method) -> Result<Box<dyn Module>, ConfigError> {
    Ok(match method {
        Method::ForwardEuler => Box::new(ForwardEuler::new()),
        Method::ExplicitRk(scheme) => Box::new(ExplicitRk::new(scheme.clone()).map_err(|e| {
            ConfigError::InvalidMethod {
                reason: e.to_string(),
            }
        })?),
        Method::Imex(scheme) => Box::new(Imex::new(scheme.clone())),
        Method::StormerVerlet => Box::new(StormerVerlet::new()),
        Method::ArclengthVerlet(system) => Box::new(ArclengthVerlet::new(system.clone())),
    })
}

/// The modules a configuration contributes, before user modules.
fn configured_modules(config: &SolverConfig) -> Result<Vec<Box<dyn Module>>, ConfigError> {
    let mut modules: Vec<Box<dyn Module>> = Vec::new();
    if let Method::Imex(_) = config.method {
        modules.push(Box::new(JacobianModule::new()));
    }
    let kernel = kernel(&config.method)?;
    match config.error_control {
        ErrorControl::None | ErrorControl::Custom => modules.push(kernel),
        ErrorControl::Embedded(law) => {
            modules.push(kernel);
            modules.push(Box::new(EmbeddedEstimator::new()));
            modules.push(Box::new(StepController::new(
                law.into(),
                config.tolerance.clone(),
                config.controller.clone(),
            )));
        }
        ErrorControl::StepDoubling => {
            modules.push(Box::new(StepDoubling::new(kernel)));
            modules.push(Box::new(DoublingEstimator::new()));
            modules.push(Box::new(StepController::new(
                ControlLaw::Doubling,
                config.tolerance.clone(),
                config.controller.clone(),
            )));
        }
    }
    Ok(modules)
}

/// Keys the solver seeds before the first module runs.
pub fn root_keys() -> KeySet {
    KeySet::from([
        Key::InitialTime,
        Key::FinalTime,
        Key::StepSize,
        Key::InitialValues,
    ])
}

/// Tolerance for "reached" comparisons against `t`.
fn slack(t: f64) -> f64 {
    64.0 * f64::EPSILON * t.abs().max(1.0)
}

/// Smallest step the current time can resolve.
fn min_step(t: f64) -> f64 {
    16.0 * f64::EPSILON * t.abs().max(1.0)
}

// ── Solver ─────────────────────────────────────────────────────────

/// Integrates one initial value problem per instance.
///
/// Configure, attach extra modules and outputs, then call
/// [`solve`](Solver::solve) once. After the run the solver answers
/// queries about the final state, the assembled pipeline and
/// [`RunMetrics`]. Reconfiguring or solving again fails with
/// [`SolveError::AlreadyRunning`].
pub struct Solver {
    config: SolverConfig,
    extra: Vec<Box<dyn Module>>,
    started: bool,
    pipeline: Option<Pipeline>,
    t: f64,
    y: Vec<f64>,
    h: f64,
    metrics: RunMetrics,
    termination: Option<Termination>,
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("method", &self.config.method.name())
            .field("error_control", &self.config.error_control)
            .field("started", &self.started)
            .field("t", &self.t)
            .field("termination", &self.termination)
            .finish_non_exhaustive()
    }
}

impl Solver {
    /// A solver for `config`. Validation happens in [`solve`](Solver::solve).
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            extra: Vec::new(),
            started: false,
            pipeline: None,
            t: 0.0,
            y: Vec::new(),
            h: 0.0,
            metrics: RunMetrics::default(),
            termination: None,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Add a module to the assembly. Placement is decided by its
    /// declarations, not by the order of calls.
    pub fn add_module(&mut self, module: Box<dyn Module>) -> Result<(), SolveError> {
        if self.started {
            return Err(SolveError::AlreadyRunning);
        }
        self.extra.push(module);
        Ok(())
    }

    /// Attach an output sink with the given cadence.
    pub fn add_output(
        &mut self,
        sink: Box<dyn OutputSink>,
        cadence: OutputCadence,
    ) -> Result<(), SolveError> {
        validate_cadence(&cadence)?;
        self.add_module(Box::new(OutputModule::new(sink, cadence)))
    }

    /// Integrate `ode` from `(t0, y0)` to `tf`.
    ///
    /// Every configuration and assembly check runs before the first
    /// right-hand side evaluation.
    pub fn solve(
        &mut self,
        ode: &dyn Ode,
        t0: f64,
        tf: f64,
        y0: &[f64],
    ) -> Result<Termination, SolveError> {
        if self.started {
            return Err(SolveError::AlreadyRunning);
        }
        self.started = true;
        let run_start = Instant::now();

        // 1. Configuration.
        self.config.validate()?;
        if !t0.is_finite() || !tf.is_finite() || tf <= t0 {
            return Err(ConfigError::InvalidInterval { t0, tf }.into());
        }
        let n = ode.dimension();
        if y0.len() != n {
            return Err(ConfigError::DimensionMismatch {
                expected: n,
                found: y0.len(),
            }
            .into());
        }
        for spec in [&self.config.tolerance.atol, &self.config.tolerance.rtol] {
            if let Some(found) = spec.len() {
                if found != n {
                    return Err(ConfigError::ToleranceDimension { expected: n, found }.into());
                }
            }
        }

        // 2. Assembly.
        let counting = CountingOde::new(ode);
        let mut modules = configured_modules(&self.config)?;
        modules.append(&mut self.extra);
        let mut pipeline =
            assemble(modules, &root_keys(), &counting).map_err(ConfigError::Assembly)?;
        debug!(order = ?pipeline.names(), "pipeline assembled");

        // 3. First step and begin hooks.
        let h0 = match self.config.initial_step {
            InitialStep::Fixed(h) => h,
            InitialStep::Auto => initial_step::estimate(
                &counting,
                t0,
                tf,
                y0,
                &self.config.tolerance,
                self.config.method.order(),
            )
            .map_err(|e| module_failure("initial_step", e.into()))?,
        };
        self.t = t0;
        self.y = y0.to_vec();
        self.h = h0;
        self.metrics = RunMetrics {
            module_us: pipeline
                .names()
                .into_iter()
                .map(|name| (name.to_string(), 0))
                .collect(),
            ..RunMetrics::default()
        };
        let mut outcome = Ok(Termination::Completed);
        for module in pipeline.modules_mut() {
            if let Err(e) = module.begin(t0, tf, y0) {
                outcome = Err(module_failure(module.name(), e));
                break;
            }
        }

        // 4. Stepping.
        if outcome.is_ok() {
            outcome = self.run(&pipeline, &counting, tf);
        }

        // 5. End hooks. A failed run keeps its first error.
        for module in pipeline.modules_mut() {
            let ended = module.end(self.t, &self.y);
            if outcome.is_ok() {
                if let Err(e) = ended {
                    outcome = Err(module_failure(module.name(), e));
                }
            }
        }

        self.metrics.rhs_evaluations = counting.rhs_count();
        self.metrics.jacobian_evaluations = counting.jacobian_count();
        self.metrics.total_us = run_start.elapsed().as_micros() as u64;
        self.pipeline = Some(pipeline);
        match &outcome {
            Ok(reason) => {
                self.termination = Some(*reason);
                info!(
                    reason = %reason,
                    t = self.t,
                    accepted = self.metrics.accepted_steps,
                    rejected = self.metrics.rejected_steps,
                    rhs = self.metrics.rhs_evaluations,
                    "run finished"
                );
            }
            Err(e) => {
                info!(
                    error = %e,
                    t = self.t,
                    accepted = self.metrics.accepted_steps,
                    rejected = self.metrics.rejected_steps,
                    rhs = self.metrics.rhs_evaluations,
                    "run failed"
                );
            }
        }
        outcome
    }

    fn run(
        &mut self,
        pipeline: &Pipeline,
        ode: &CountingOde<'_>,
        tf: f64,
    ) -> Result<Termination, SolveError> {
        let controlled = pipeline.supplies(Key::Accepted);
        let unclamped = pipeline.supplies(Key::AdvancedTime);
        let fsal_cache = pipeline.supplies(Key::FinalDerivative)
            && pipeline.final_supplier(Key::FinalDerivative)
                == pipeline.final_supplier(Key::FinalValues);
        let amin = self.config.controller.amin;
        let mut history = StepHistory::new();
        let mut bag = PropertyBag::new();

        loop {
            if self.t >= tf - slack(tf) {
                return Ok(Termination::Completed);
            }
            if history.attempts >= self.config.max_steps {
                return Ok(Termination::StepLimit);
            }

            // Land exactly on tf and on every module's stopping time.
            let t = self.t;
            let mut t1 = t + self.h;
            if !unclamped {
                let stop = pipeline
                    .modules()
                    .iter()
                    .filter_map(|m| m.next_stop(t))
                    .fold(tf, f64::min);
                if t1 >= stop - slack(stop) {
                    t1 = stop;
                }
            }
            let h = t1 - t;
            if h.is_nan() || h < min_step(t) {
                return Err(SolveError::StepSizeUnderflow { time: t, step: h });
            }

            bag.clear();
            bag.insert(Key::InitialTime, t);
            bag.insert(Key::FinalTime, t1);
            bag.insert(Key::StepSize, h);
            bag.insert(Key::InitialValues, self.y.as_slice());

            let mut singular_at = None;
            for (i, module) in pipeline.modules().iter().enumerate() {
                match self.step_module(i, module.as_ref(), &mut bag, ode, &history) {
                    Ok(()) => {}
                    Err(ModuleError::LinearSolveFailure { stage, pivot }) if controlled => {
                        warn!(t, h, stage, pivot, "singular stage matrix, rejecting step");
                        self.metrics.linear_solve_failures += 1;
                        singular_at = Some(i);
                        break;
                    }
                    Err(e) => return Err(module_failure(module.name(), e)),
                }
            }

            let read = |e| module_failure("solver", ModuleError::Bag(e));

            if let Some(failed) = singular_at {
                history.record(false, None, h, None);
                self.metrics.rejected_steps += 1;
                self.h = amin * h;
                // Stop modules downstream of the kernel still get their say
                // when everything they require is already in the bag.
                bag.insert(Key::Accepted, false);
                for (i, module) in pipeline.modules().iter().enumerate().skip(failed + 1) {
                    let ready = module.declarations().supplies().contains(Key::Stop)
                        && pipeline
                            .requirements(i)
                            .is_some_and(|keys| keys.iter().all(|k| bag.contains(*k)));
                    if ready {
                        self.step_module(i, module.as_ref(), &mut bag, ode, &history)
                            .map_err(|e| module_failure(module.name(), e))?;
                    }
                }
                if bag.flag_if_present(Key::Stop).map_err(read)? == Some(true) {
                    return Ok(Termination::Stopped);
                }
                continue;
            }

            let accepted = bag.flag_if_present(Key::Accepted).map_err(read)?.unwrap_or(true);
            let error = bag.scalar_if_present(Key::NormalizedError).map_err(read)?;
            let next = bag
                .scalar_if_present(Key::NextStepSize)
                .map_err(read)?
                .unwrap_or(self.h);

            if accepted {
                let y1 = bag.final_values().map_err(read)?;
                if !controlled && !y1.iter().all(|v| v.is_finite()) {
                    return Err(SolveError::NonFinite { time: t });
                }
                let t_new = bag
                    .scalar_if_present(Key::AdvancedTime)
                    .map_err(read)?
                    .unwrap_or(t1);
                let cache = match (fsal_cache, bag.vector(Key::FinalDerivative)) {
                    (true, Ok(dydt)) => Some(DerivativeCache {
                        t: t_new,
                        y: y1.to_vec(),
                        dydt: dydt.to_vec(),
                    }),
                    _ => None,
                };
                self.y.copy_from_slice(y1);
                self.t = t_new;
                history.record(true, error, h, cache);
                self.metrics.accepted_steps += 1;
                trace!(t = t_new, h, "step accepted");
            } else {
                history.record(false, error, h, None);
                self.metrics.rejected_steps += 1;
                debug!(t, h, error = ?error, next, "step rejected");
            }
            self.h = next;

            if bag.flag_if_present(Key::Stop).map_err(read)? == Some(true) {
                return Ok(Termination::Stopped);
            }
        }
    }

    fn step_module(
        &mut self,
        index: usize,
        module: &dyn Module,
        bag: &mut PropertyBag,
        ode: &CountingOde<'_>,
        history: &StepHistory,
    ) -> Result<(), ModuleError> {
        let start = Instant::now();
        let supplies = module.declarations().supplies();
        let mut ctx = StepContext::new(bag, ode, history, module.name(), supplies);
        let result = module.step(&mut ctx);
        if let Some(slot) = self.metrics.module_us.get_mut(index) {
            slot.1 += start.elapsed().as_micros() as u64;
        }
        result
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Time of the last accepted point.
    pub fn final_time(&self) -> f64 {
        self.t
    }

    /// State at [`final_time`](Solver::final_time).
    pub fn final_values(&self) -> &[f64] {
        &self.y
    }

    /// Step size the next attempt would have used.
    pub fn final_step(&self) -> f64 {
        self.h
    }

    /// Counters for the last run.
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Why the last run ended, if it ended without error.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Module names in execution order. Empty before a successful assembly.
    pub fn module_order(&self) -> Vec<&str> {
        self.pipeline.as_ref().map(Pipeline::names).unwrap_or_default()
    }

    /// Consumer → supplier bindings of the assembled pipeline.
    pub fn bindings(&self) -> &[Binding] {
        self.pipeline.as_ref().map(Pipeline::bindings).unwrap_or(&[])
    }

    /// The assembled pipeline, after a run.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddedLaw;
    use stepwise_core::tableau;
    use stepwise_modules::{MemorySink, StopSignal, Tolerance};
    use stepwise_test_utils::{
        assert_close, ConstantModule, Decay, ExplodingOde, FailingModule, FailingOde, Growth,
        HarmonicOscillator, RecordingModule,
    };

    fn fixed(method: Method, h: f64) -> Solver {
        Solver::new(SolverConfig::fixed(method, h))
    }

    // ── Fixed step ─────────────────────────────────────────────────

    #[test]
    fn euler_single_step_is_exact() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        let reason = solver.solve(&Decay::new(1.0), 0.0, 0.1, &[1.0]).unwrap();
        assert_eq!(reason, Termination::Completed);
        assert_eq!(solver.final_values(), &[0.9]);
        assert_eq!(solver.final_time(), 0.1);
        assert_eq!(solver.metrics().accepted_steps, 1);
        assert_eq!(solver.metrics().rhs_evaluations, 1);
    }

    #[test]
    fn rk4_one_step_on_growth() {
        let mut solver = fixed(Method::ExplicitRk(tableau::rk4()), 1.0);
        solver.solve(&Growth, 0.0, 1.0, &[1.0]).unwrap();
        assert_close(solver.final_values()[0], 2.708_333_333, 1e-8);
        assert_eq!(solver.metrics().rhs_evaluations, 4);
    }

    #[test]
    fn last_step_lands_on_final_time() {
        let mut solver = fixed(Method::ForwardEuler, 0.3);
        solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
        assert_eq!(solver.final_time(), 1.0);
        assert_eq!(solver.metrics().accepted_steps, 4);
        // The nominal step survives the shortened last step.
        assert_eq!(solver.final_step(), 0.3);
    }

    #[test]
    fn fsal_saves_one_evaluation_per_step() {
        let mut solver = fixed(Method::ExplicitRk(tableau::dormand_prince()), 0.1);
        solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
        let steps = solver.metrics().accepted_steps;
        assert_eq!(steps, 10);
        assert_eq!(solver.metrics().rhs_evaluations, 7 + 6 * (steps - 1));
    }

    #[test]
    fn verlet_conserves_energy_over_long_run() {
        let ode = HarmonicOscillator::new(1.0);
        let y0 = [1.0, 0.0];
        let mut solver = fixed(Method::StormerVerlet, 0.01);
        solver.solve(&ode, 0.0, 100.0, &y0).unwrap();
        let drift = (ode.energy(solver.final_values()) - ode.energy(&y0)).abs();
        assert!(drift < 1e-4, "energy drift {drift}");
    }

    #[test]
    fn fixed_step_non_finite_is_an_error() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        let err = solver
            .solve(&ExplodingOde { blow_up_at: 0.05 }, 0.0, 1.0, &[1.0])
            .unwrap_err();
        assert!(matches!(err, SolveError::NonFinite { time } if (time - 0.1).abs() < 1e-15));
    }

    // ── Adaptive ───────────────────────────────────────────────────

    #[test]
    fn adaptive_dormand_prince_meets_tolerance() {
        let config = SolverConfig::adaptive(
            Method::ExplicitRk(tableau::dormand_prince()),
            ErrorControl::Embedded(EmbeddedLaw::ExplicitPi),
            Tolerance::scalar(1e-10, 1e-8),
        );
        let mut solver = Solver::new(config);
        let ode = Decay::new(1.0);
        solver.solve(&ode, 0.0, 5.0, &[1.0]).unwrap();
        assert_eq!(solver.final_time(), 5.0);
        assert_close(solver.final_values()[0], ode.exact(5.0, 1.0), 1e-8);
        assert!(solver.metrics().accepted_steps > 5);
    }

    #[test]
    fn non_finite_trial_is_rejected_not_fatal() {
        let config = SolverConfig {
            max_steps: 20,
            ..SolverConfig::default()
        };
        let mut solver = Solver::new(config);
        let reason = solver.solve(&ExplodingOde { blow_up_at: -1.0 }, 0.0, 1.0, &[1.0]);
        // Every attempt is rejected with a forced shrink until the step
        // limit or an underflow ends the run.
        match reason {
            Ok(Termination::StepLimit) => {}
            Err(SolveError::StepSizeUnderflow { .. }) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(solver.metrics().accepted_steps, 0);
    }

    #[test]
    fn step_limit_is_reported() {
        let config = SolverConfig {
            max_steps: 3,
            ..SolverConfig::fixed(Method::ForwardEuler, 0.01)
        };
        let mut solver = Solver::new(config);
        assert_eq!(
            solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap(),
            Termination::StepLimit
        );
        assert_close(solver.final_time(), 0.03, 1e-15);
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    #[test]
    fn solver_is_single_shot() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        solver.solve(&Decay::new(1.0), 0.0, 0.1, &[1.0]).unwrap();
        assert_eq!(
            solver.solve(&Decay::new(1.0), 0.0, 0.1, &[1.0]),
            Err(SolveError::AlreadyRunning)
        );
        assert!(matches!(
            solver.add_module(Box::new(RecordingModule::new("late"))),
            Err(SolveError::AlreadyRunning)
        ));
    }

    #[test]
    fn bad_interval_and_dimension() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        assert!(matches!(
            solver.solve(&Decay::new(1.0), 1.0, 1.0, &[1.0]),
            Err(SolveError::Config(ConfigError::InvalidInterval { .. }))
        ));
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        assert!(matches!(
            solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0, 2.0]),
            Err(SolveError::Config(ConfigError::DimensionMismatch { expected: 1, found: 2 }))
        ));
    }

    #[test]
    fn tolerance_dimension_checked_before_rhs() {
        let mut config = SolverConfig::default();
        config.tolerance.atol = stepwise_modules::ToleranceSpec::PerComponent(vec![1e-6; 3]);
        let ode = FailingOde::new(usize::MAX);
        let mut solver = Solver::new(config);
        assert!(matches!(
            solver.solve(&ode, 0.0, 1.0, &[1.0]),
            Err(SolveError::Config(ConfigError::ToleranceDimension { expected: 1, found: 3 }))
        ));
        assert_eq!(ode.calls(), 0);
    }

    #[test]
    fn rhs_failure_aborts_run() {
        let mut solver = fixed(Method::ExplicitRk(tableau::rk4()), 0.1);
        let err = solver.solve(&FailingOde::new(6), 0.0, 1.0, &[1.0]).unwrap_err();
        match err {
            SolveError::ModuleFailed { module, error } => {
                assert_eq!(module, "explicit_rk(rk4)");
                assert!(matches!(error, ModuleError::Rhs(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(solver.metrics().accepted_steps, 1);
        assert_close(solver.final_time(), 0.1, 1e-15);
    }

    #[test]
    fn module_failure_names_the_module() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        solver
            .add_module(Box::new(FailingModule::new("flaky", 2)))
            .unwrap();
        let err = solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap_err();
        assert!(matches!(err, SolveError::ModuleFailed { ref module, .. } if module == "flaky"));
        assert!(err.source().is_some());
    }

    #[test]
    fn recorder_sees_every_attempt() {
        let recorder = RecordingModule::new("recorder");
        let log = recorder.log();
        let mut solver = fixed(Method::ForwardEuler, 0.25);
        solver.add_module(Box::new(recorder)).unwrap();
        solver.solve(&Decay::new(1.0), 0.0, 0.5, &[1.0]).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(*log, vec![(0.0, 0.25), (0.25, 0.25)]);
    }

    #[test]
    fn stop_flag_ends_run_after_attempt() {
        let (flag, signal) = StopSignal::pair();
        flag.store(true, Ordering::Release);
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        solver.add_module(Box::new(signal)).unwrap();
        let reason = solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
        assert_eq!(reason, Termination::Stopped);
        assert_eq!(solver.metrics().accepted_steps, 1);
    }

    // ── Singular stage matrices ────────────────────────────────────

    /// `y' = y/γ` for ARS(2,2,2): `I − hγJ` vanishes at `h = 1`.
    fn resonant_growth() -> (Decay, f64) {
        let gamma = tableau::ars222().gamma();
        (Decay::new(-1.0 / gamma), 1.0 / gamma)
    }

    fn imex_adaptive() -> Solver {
        let mut config = SolverConfig::adaptive(
            Method::Imex(tableau::ars222()),
            ErrorControl::Embedded(EmbeddedLaw::ImplicitPredictive),
            Tolerance::scalar(1e-8, 1e-6),
        );
        config.initial_step = InitialStep::Fixed(1.0);
        Solver::new(config)
    }

    #[test]
    fn singular_stage_matrix_is_rejected_and_recovered() {
        let (ode, rate) = resonant_growth();
        let mut solver = imex_adaptive();
        let reason = solver.solve(&ode, 0.0, 2.0, &[1.0]).unwrap();
        assert_eq!(reason, Termination::Completed);

        let m = solver.metrics();
        assert_eq!(m.linear_solve_failures, 1);
        assert!(m.rejected_steps >= 1);
        assert!(m.accepted_steps > 0);
        assert_eq!(solver.final_time(), 2.0);
        let exact = (2.0 * rate).exp();
        assert!(((solver.final_values()[0] - exact) / exact).abs() < 1e-2);
    }

    #[test]
    fn singular_stage_matrix_without_controller_aborts() {
        let (ode, _) = resonant_growth();
        let mut solver = fixed(Method::Imex(tableau::ars222()), 1.0);
        let err = solver.solve(&ode, 0.0, 2.0, &[1.0]).unwrap_err();
        match err {
            SolveError::ModuleFailed { module, error } => {
                assert_eq!(module, "imex(ars222)");
                assert!(matches!(error, ModuleError::LinearSolveFailure { .. }));
            }
            other => panic!("expected a module failure, got {other:?}"),
        }
        assert_eq!(solver.metrics().linear_solve_failures, 0);
        assert_eq!(solver.final_time(), 0.0);
    }

    #[test]
    fn stop_flag_honoured_on_singular_attempt() {
        let (ode, _) = resonant_growth();
        let (flag, signal) = StopSignal::pair();
        flag.store(true, Ordering::Release);
        let mut solver = imex_adaptive();
        solver.add_module(Box::new(signal)).unwrap();
        let reason = solver.solve(&ode, 0.0, 2.0, &[1.0]).unwrap();
        assert_eq!(reason, Termination::Stopped);
        assert_eq!(solver.metrics().linear_solve_failures, 1);
        assert_eq!(solver.metrics().accepted_steps, 0);
        assert_eq!(solver.final_time(), 0.0);
    }

    #[test]
    fn outputs_hit_requested_times() {
        let sink = MemorySink::new();
        let mut solver = fixed(Method::ExplicitRk(tableau::rk4()), 0.3);
        solver
            .add_output(Box::new(sink.clone()), OutputCadence::FixedInterval(0.25))
            .unwrap();
        solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
        assert_eq!(sink.solution().times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn invalid_cadence_rejected_on_attach() {
        let mut solver = fixed(Method::ForwardEuler, 0.1);
        assert!(matches!(
            solver.add_output(Box::new(MemorySink::new()), OutputCadence::FixedCount(0)),
            Err(SolveError::Config(ConfigError::InvalidCadence { .. }))
        ));
    }

    #[test]
    fn module_order_and_bindings_after_run() {
        let mut solver = Solver::new(SolverConfig::default());
        solver
            .add_module(Box::new(ConstantModule::new("tag", vec![])))
            .unwrap();
        solver.solve(&Decay::new(1.0), 0.0, 1.0, &[1.0]).unwrap();
        let order = solver.module_order();
        assert_eq!(
            &order[..3],
            &[
                "explicit_rk(dormand_prince)",
                "embedded_estimator",
                "step_controller(basic)"
            ]
        );
        assert!(!solver.bindings().is_empty());
        assert_eq!(solver.metrics().module_us.len(), order.len());
    }
}
