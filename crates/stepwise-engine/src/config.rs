//! Solver configuration, validation, and error types.
//!
//! [`SolverConfig`] selects the stepping method, the error-control
//! family and the numerical parameters of a run.
//! [`validate()`](SolverConfig::validate) checks every invariant that
//! does not depend on the ODE; the per-run checks (interval, dimensions)
//! happen at the start of [`Solver::solve`](crate::Solver::solve). Both
//! run before any right-hand side evaluation.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use stepwise_core::{AdditiveScheme, Scheme};
use stepwise_module::AssemblyError;
use stepwise_modules::{
    ControlLaw, ControllerParams, GravitationalSystem, OutputCadence, Tolerance,
};

// ── Method ─────────────────────────────────────────────────────────

/// The stepping kernel.
#[derive(Clone, Debug)]
pub enum Method {
    /// Forward Euler, order 1.
    ForwardEuler,
    /// Explicit Runge-Kutta with the given tableau.
    ExplicitRk(Arc<Scheme>),
    /// IMEX additive Runge-Kutta with the given pair.
    Imex(Arc<AdditiveScheme>),
    /// Störmer-Verlet for separable second-order systems.
    StormerVerlet,
    /// Arclength-parameterized Verlet for a gravitating system. The step
    /// size is a fictitious-time increment.
    ArclengthVerlet(GravitationalSystem),
}

impl Method {
    /// Order of the kernel's main solution.
    pub fn order(&self) -> u32 {
        match self {
            Self::ForwardEuler => 1,
            Self::ExplicitRk(s) => s.order(),
            Self::Imex(s) => s.order(),
            Self::StormerVerlet | Self::ArclengthVerlet(_) => 2,
        }
    }

    /// Whether the kernel publishes an embedded solution.
    pub fn is_embedded(&self) -> bool {
        match self {
            Self::ExplicitRk(s) => s.is_embedded(),
            Self::Imex(s) => s.is_embedded(),
            _ => false,
        }
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &str {
        match self {
            Self::ForwardEuler => "forward_euler",
            Self::ExplicitRk(s) => s.name(),
            Self::Imex(s) => s.name(),
            Self::StormerVerlet => "stormer_verlet",
            Self::ArclengthVerlet(_) => "arclength_verlet",
        }
    }
}

// ── ErrorControl ───────────────────────────────────────────────────

/// Step-size control law for embedded estimates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddedLaw {
    /// Elementary controller.
    Basic,
    /// PI controller, suited to explicit methods.
    ExplicitPi,
    /// Predictive controller, suited to implicit methods.
    ImplicitPredictive,
}

impl From<EmbeddedLaw> for ControlLaw {
    fn from(law: EmbeddedLaw) -> Self {
        match law {
            EmbeddedLaw::Basic => ControlLaw::Basic,
            EmbeddedLaw::ExplicitPi => ControlLaw::ExplicitPi,
            EmbeddedLaw::ImplicitPredictive => ControlLaw::ImplicitPredictive,
        }
    }
}

/// How the local error is estimated and the step adapted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorControl {
    /// Fixed step, no estimate.
    None,
    /// Embedded estimate with the given law. Requires an embedded method.
    Embedded(EmbeddedLaw),
    /// Step doubling with Richardson's estimate.
    StepDoubling,
    /// Estimator and controller modules supplied by the caller through
    /// [`Solver::add_module`](crate::Solver::add_module).
    Custom,
}

// ── InitialStep ────────────────────────────────────────────────────

/// First step size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitialStep {
    /// Estimated from `f(t0, y0)` and the tolerances.
    Auto,
    /// Exactly this step.
    Fixed(f64),
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected before integration starts.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// `tf ≤ t0`, or an endpoint is not finite.
    InvalidInterval {
        /// Initial time.
        t0: f64,
        /// Final time.
        tf: f64,
    },
    /// A fixed step is zero, negative or not finite.
    InvalidStep {
        /// The configured step.
        value: f64,
    },
    /// `y0` does not have the ODE dimension.
    DimensionMismatch {
        /// ODE dimension.
        expected: usize,
        /// Length of `y0`.
        found: usize,
    },
    /// A per-component tolerance does not have the ODE dimension.
    ToleranceDimension {
        /// ODE dimension.
        expected: usize,
        /// Length of the tolerance vector.
        found: usize,
    },
    /// A tolerance value is out of range.
    InvalidTolerance {
        /// Which invariant was violated.
        reason: String,
    },
    /// A controller parameter is out of range.
    InvalidController {
        /// Which invariant was violated.
        reason: String,
    },
    /// The error control needs an embedded solution the method lacks.
    MissingEmbedded {
        /// The method.
        method: String,
    },
    /// The method cannot be combined with the rest of the configuration.
    InvalidMethod {
        /// Why.
        reason: String,
    },
    /// An output cadence is malformed.
    InvalidCadence {
        /// Why.
        reason: String,
    },
    /// `max_steps` is zero.
    ZeroMaxSteps,
    /// Module assembly failed.
    Assembly(AssemblyError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInterval { t0, tf } => {
                write!(f, "invalid interval: need finite t0 < tf, got [{t0}, {tf}]")
            }
            Self::InvalidStep { value } => {
                write!(f, "step size must be finite and positive, got {value}")
            }
            Self::DimensionMismatch { expected, found } => {
                write!(f, "initial state has {found} components, ODE has {expected}")
            }
            Self::ToleranceDimension { expected, found } => {
                write!(f, "tolerance has {found} components, ODE has {expected}")
            }
            Self::InvalidTolerance { reason } => write!(f, "invalid tolerance: {reason}"),
            Self::InvalidController { reason } => {
                write!(f, "invalid controller parameters: {reason}")
            }
            Self::MissingEmbedded { method } => {
                write!(f, "error control needs an embedded method, '{method}' has none")
            }
            Self::InvalidMethod { reason } => write!(f, "invalid method: {reason}"),
            Self::InvalidCadence { reason } => write!(f, "invalid output cadence: {reason}"),
            Self::ZeroMaxSteps => write!(f, "max_steps must be at least 1"),
            Self::Assembly(e) => write!(f, "assembly: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Assembly(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AssemblyError> for ConfigError {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

// ── SolverConfig ───────────────────────────────────────────────────

/// Complete configuration of a [`Solver`](crate::Solver).
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Stepping kernel. Default: Dormand-Prince 5(4).
    pub method: Method,
    /// Error control. Default: embedded, basic law.
    pub error_control: ErrorControl,
    /// Tolerances. Default: atol `1e-6`, rtol `1e-3`.
    pub tolerance: Tolerance,
    /// Controller parameters.
    pub controller: ControllerParams,
    /// First step. Default: automatic.
    pub initial_step: InitialStep,
    /// Maximum number of step attempts. Default: 100 000.
    pub max_steps: u64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: Method::ExplicitRk(stepwise_core::tableau::dormand_prince()),
            error_control: ErrorControl::Embedded(EmbeddedLaw::Basic),
            tolerance: Tolerance::default(),
            controller: ControllerParams::default(),
            initial_step: InitialStep::Auto,
            max_steps: 100_000,
        }
    }
}

impl SolverConfig {
    /// A fixed-step configuration.
    pub fn fixed(method: Method, h: f64) -> Self {
        Self {
            method,
            error_control: ErrorControl::None,
            initial_step: InitialStep::Fixed(h),
            ..Self::default()
        }
    }

    /// An adaptive configuration with the given method and control.
    pub fn adaptive(method: Method, error_control: ErrorControl, tolerance: Tolerance) -> Self {
        Self {
            method,
            error_control,
            tolerance,
            ..Self::default()
        }
    }

    /// Validate every invariant that does not depend on the ODE.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Method structure.
        if let Method::ExplicitRk(scheme) = &self.method {
            scheme.check_explicit().map_err(|e| ConfigError::InvalidMethod {
                reason: e.to_string(),
            })?;
        }
        // 2. Method / error-control combinations.
        match (&self.method, self.error_control) {
            (Method::ArclengthVerlet(_), ErrorControl::None) => {}
            (Method::ArclengthVerlet(_), _) => {
                return Err(ConfigError::InvalidMethod {
                    reason: "arclength Verlet advances a fictitious time and only runs \
                             with a fixed step"
                        .to_string(),
                });
            }
            (method, ErrorControl::Embedded(_)) if !method.is_embedded() => {
                return Err(ConfigError::MissingEmbedded {
                    method: method.name().to_string(),
                });
            }
            _ => {}
        }
        if let (Method::ArclengthVerlet(_), InitialStep::Auto) =
            (&self.method, self.initial_step)
        {
            return Err(ConfigError::InvalidMethod {
                reason: "arclength Verlet needs a fixed initial step".to_string(),
            });
        }
        // 3. Initial step.
        if let InitialStep::Fixed(h) = self.initial_step {
            if !h.is_finite() || h <= 0.0 {
                return Err(ConfigError::InvalidStep { value: h });
            }
        }
        // 4. Tolerances.
        for &atol in self.tolerance.atol.values() {
            if !atol.is_finite() || atol <= 0.0 {
                return Err(ConfigError::InvalidTolerance {
                    reason: format!("atol must be finite and positive, got {atol}"),
                });
            }
        }
        for &rtol in self.tolerance.rtol.values() {
            if !rtol.is_finite() || rtol < 0.0 {
                return Err(ConfigError::InvalidTolerance {
                    reason: format!("rtol must be finite and non-negative, got {rtol}"),
                });
            }
        }
        // 5. Controller parameters.
        validate_controller(&self.controller)?;
        // 6. Step budget.
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        Ok(())
    }
}

fn validate_controller(p: &ControllerParams) -> Result<(), ConfigError> {
    let checks: [(&str, f64, bool, &str); 5] = [
        ("amin", p.amin, p.amin > 0.0 && p.amin < 1.0, "in (0, 1)"),
        ("amax_normal", p.amax_normal, p.amax_normal > 1.0, "> 1"),
        ("amax_rejected", p.amax_rejected, p.amax_rejected >= 1.0, ">= 1"),
        ("safety", p.safety, p.safety > 0.0, "> 0"),
        ("threshold", p.threshold, p.threshold > 0.0, "> 0"),
    ];
    for (name, value, ok, range) in checks {
        if !value.is_finite() || !ok {
            return Err(ConfigError::InvalidController {
                reason: format!("{name} must be finite and {range}, got {value}"),
            });
        }
    }
    Ok(())
}

/// Check an output cadence against the run interval's shape.
pub(crate) fn validate_cadence(cadence: &OutputCadence) -> Result<(), ConfigError> {
    match cadence {
        OutputCadence::AllPoints => Ok(()),
        OutputCadence::FixedCount(0) => Err(ConfigError::InvalidCadence {
            reason: "fixed count must be at least 1".to_string(),
        }),
        OutputCadence::FixedCount(_) => Ok(()),
        OutputCadence::FixedInterval(dt) if !dt.is_finite() || *dt <= 0.0 => {
            Err(ConfigError::InvalidCadence {
                reason: format!("interval must be finite and positive, got {dt}"),
            })
        }
        OutputCadence::FixedInterval(_) => Ok(()),
        OutputCadence::Times(times) => match times.iter().find(|t| !t.is_finite()) {
            Some(t) => Err(ConfigError::InvalidCadence {
                reason: format!("output time {t} is not finite"),
            }),
            None => Ok(()),
        },
    }
}
