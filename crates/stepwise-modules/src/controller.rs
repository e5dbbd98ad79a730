//! Adaptive step-size control.
//!
//! A [`StepController`] turns the error estimate published earlier in
//! the step into a verdict (`accepted`) and a proposal for the next
//! attempt (`next_step_size`). The arithmetic lives in the pure
//! function [`decide`], so every control law can be tested without a
//! pipeline.
//!
//! # Normalized error
//!
//! With `tol_i = rtol_i·max(|y0_i|, |y1_i|) + atol_i`, the controller
//! computes `ε = RMS(est_i / tol_i)`. A step with `ε ≤ 1` meets the
//! tolerance.
//!
//! # Laws
//!
//! | Law | Factor on acceptance (`next = h / factor`) |
//! |-----|--------------------------------------------|
//! | [`ControlLaw::Basic`] | `ε^(1/(q+1))` |
//! | [`ControlLaw::ExplicitPi`] | `ε^α·(ε/ε_prev)^β`, `α = 0.7/q`, `β = 0.4/q` |
//! | [`ControlLaw::ImplicitPredictive`] | `(h_prev/h)·(ε²/ε_prev)^(1/(q+1))` |
//! | [`ControlLaw::Doubling`] | `h_opt = h / (ε·2^q)^(1/(q+1))`, see [`decide`] |
//!
//! The embedded laws divide the raw factor by `safety`, cap it at
//! `1/amin` and floor it at `1/amax`. `amax` is `amax_normal` after an
//! accepted step and `amax_rejected` after a rejection, so a retry never
//! grows the step by more than `amax_rejected`. The PI and predictive
//! laws fall back to the basic law until an accepted step supplies the
//! history they need.
//!
//! A non-finite trial state or estimate short-circuits all of this: the
//! step is rejected and the next attempt is `amin·h`.

use stepwise_core::{Key, ModuleError, Ode};
use stepwise_module::{Declarations, Module, StepContext, StepHistory};

use crate::vecops::all_finite;

// ── Tolerances ─────────────────────────────────────────────────

/// A tolerance shared by every component or given per component.
#[derive(Clone, Debug, PartialEq)]
pub enum ToleranceSpec {
    /// Same value for every component.
    Scalar(f64),
    /// One value per state component.
    PerComponent(Vec<f64>),
}

impl ToleranceSpec {
    /// Value for component `i`.
    pub fn at(&self, i: usize) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerComponent(v) => v.get(i).copied().unwrap_or(f64::NAN),
        }
    }

    /// Number of components for a per-component tolerance.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::PerComponent(v) => Some(v.len()),
        }
    }

    /// Every value, for validation.
    pub fn values(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::PerComponent(v) => v,
        }
    }
}

/// Absolute and relative tolerances.
#[derive(Clone, Debug, PartialEq)]
pub struct Tolerance {
    /// Absolute tolerance. Default `1e-6`.
    pub atol: ToleranceSpec,
    /// Relative tolerance. Default `1e-3`.
    pub rtol: ToleranceSpec,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::scalar(1e-6, 1e-3)
    }
}

impl Tolerance {
    /// Scalar tolerances.
    pub fn scalar(atol: f64, rtol: f64) -> Self {
        Self {
            atol: ToleranceSpec::Scalar(atol),
            rtol: ToleranceSpec::Scalar(rtol),
        }
    }

    /// Fail unless every per-component tolerance has length `n`.
    pub fn check_dimension(&self, n: usize) -> Result<(), ModuleError> {
        for spec in [&self.atol, &self.rtol] {
            if let Some(found) = spec.len() {
                if found != n {
                    return Err(ModuleError::DimensionMismatch { expected: n, found });
                }
            }
        }
        Ok(())
    }

    /// `RMS(est_i / (rtol_i·max(|y0_i|, |y1_i|) + atol_i))`.
    ///
    /// Returns `0.0` for an empty state.
    pub fn normalized_error(&self, y0: &[f64], y1: &[f64], estimate: &[f64]) -> f64 {
        if estimate.is_empty() {
            return 0.0;
        }
        let sum: f64 = estimate
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let scale = self.rtol.at(i) * y0[i].abs().max(y1[i].abs()) + self.atol.at(i);
                let r = e / scale;
                r * r
            })
            .sum();
        (sum / estimate.len() as f64).sqrt()
    }
}

// ── Parameters ─────────────────────────────────────────────────

/// Growth, shrink and acceptance parameters shared by every law.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerParams {
    /// Largest growth after an accepted step (`> 1`).
    pub amax_normal: f64,
    /// Largest growth after a rejected step (`≥ 1`).
    pub amax_rejected: f64,
    /// Smallest shrink factor (`∈ (0, 1)`).
    pub amin: f64,
    /// Safety factor applied to the raw proposal (`> 0`).
    pub safety: f64,
    /// Step doubling accepts while `h / h_opt ≤ threshold` (`> 0`).
    pub threshold: f64,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            amax_normal: 5.0,
            amax_rejected: 1.0,
            amin: 0.2,
            safety: 0.85,
            threshold: 3.0,
        }
    }
}

impl ControllerParams {
    fn amax(&self, history: &StepHistory) -> f64 {
        if history.previous_accepted {
            self.amax_normal
        } else {
            self.amax_rejected
        }
    }
}

// ── Decision ───────────────────────────────────────────────────

/// Which formula turns `ε` into the next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlLaw {
    /// Elementary controller for embedded estimates.
    Basic,
    /// PI controller for explicit embedded methods.
    ExplicitPi,
    /// Predictive controller for implicit embedded methods.
    ImplicitPredictive,
    /// Step-doubling controller.
    Doubling,
}

impl ControlLaw {
    /// Whether the law consumes an embedded estimate.
    pub fn is_embedded(self) -> bool {
        !matches!(self, Self::Doubling)
    }

    fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::ExplicitPi => "explicit_pi",
            Self::ImplicitPredictive => "implicit_predictive",
            Self::Doubling => "doubling",
        }
    }
}

/// Verdict for one attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Whether the attempt is kept.
    pub accepted: bool,
    /// Step size for the next attempt.
    pub next_step: f64,
}

/// Apply `law` to the normalized error `eps` of a step of size `h` taken
/// by a method of order `q`.
///
/// A non-finite `eps` is always a rejection with `next_step = amin·h`.
///
/// The doubling law computes `h_opt = h / (ε·2^q)^(1/(q+1))`, proposes
/// `clamp(2·safety·h_opt, amin·h, amax·h)` and accepts while
/// `h / h_opt ≤ threshold`.
pub fn decide(
    law: ControlLaw,
    params: &ControllerParams,
    eps: f64,
    q: u32,
    h: f64,
    history: &StepHistory,
) -> Decision {
    if !eps.is_finite() {
        return Decision {
            accepted: false,
            next_step: params.amin * h,
        };
    }
    let q = q.max(1);
    let qf = f64::from(q);
    let amax = params.amax(history);

    if law == ControlLaw::Doubling {
        let ratio = (eps * 2f64.powi(q as i32)).powf(1.0 / (qf + 1.0));
        let h_opt = h / ratio;
        let proposal = 2.0 * params.safety * h_opt;
        let lo = params.amin * h;
        let hi = amax * h;
        let next_step = if proposal.is_nan() {
            hi
        } else {
            proposal.clamp(lo.min(hi), hi.max(lo))
        };
        return Decision {
            accepted: ratio <= params.threshold,
            next_step,
        };
    }

    let basic = eps.powf(1.0 / (qf + 1.0));
    let accepted = eps <= 1.0;
    let raw = if accepted {
        match (law, history.accepted_error, history.accepted_step) {
            (ControlLaw::ExplicitPi, Some(prev), _) if eps > 0.0 && prev > 0.0 => {
                let alpha = 0.7 / qf;
                let beta = 0.4 / qf;
                eps.powf(alpha) * (eps / prev).powf(beta)
            }
            (ControlLaw::ImplicitPredictive, Some(prev), Some(h_prev))
                if eps > 0.0 && prev > 0.0 =>
            {
                (h_prev / h) * (eps * eps / prev).powf(1.0 / (qf + 1.0))
            }
            _ => basic,
        }
    } else {
        basic
    };

    let mut factor = (raw / params.safety).min(1.0 / params.amin);
    factor = if accepted {
        factor.max(1.0 / amax)
    } else {
        factor.max(1.0 / params.amax_rejected)
    };
    Decision {
        accepted,
        next_step: h / factor,
    }
}

// ── Module ─────────────────────────────────────────────────────

/// Publishes `accepted`, `next_step_size` and `normalized_error`.
///
/// For embedded laws `q` is the lower of `order` and `embedded_order`,
/// since the estimate measures the lower-order solution. For step
/// doubling `q` is the kernel order.
#[derive(Debug)]
pub struct StepController {
    law: ControlLaw,
    tolerance: Tolerance,
    params: ControllerParams,
    name: String,
    decls: Declarations,
}

impl StepController {
    /// Create a controller.
    ///
    /// Parameter ranges are not checked here; the solver's configuration
    /// pass validates them before assembly.
    pub fn new(law: ControlLaw, tolerance: Tolerance, params: ControllerParams) -> Self {
        let mut decls = Declarations::new()
            .require([
                Key::InitialValues,
                Key::FinalValues,
                Key::ErrorEstimate,
                Key::StepSize,
                Key::Order,
            ])
            .supply([Key::Accepted, Key::NextStepSize, Key::NormalizedError]);
        if law.is_embedded() {
            decls = decls.request([Key::EmbeddedOrder]);
        }
        Self {
            law,
            tolerance,
            params,
            name: format!("step_controller({})", law.name()),
            decls,
        }
    }

    /// The control law.
    pub fn law(&self) -> ControlLaw {
        self.law
    }

    /// The tolerances.
    pub fn tolerance(&self) -> &Tolerance {
        &self.tolerance
    }

    /// The parameters.
    pub fn params(&self) -> &ControllerParams {
        &self.params
    }
}

impl Module for StepController {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn validate(&self, ode: &dyn Ode) -> Result<(), ModuleError> {
        self.tolerance.check_dimension(ode.dimension())
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let h = bag.step_size()?;
        let y0 = bag.initial_values()?;
        let y1 = bag.final_values()?;
        let estimate = bag.error_estimate()?;
        ctx.check_dimension(y1)?;
        ctx.check_dimension(estimate)?;

        let order = bag.order()?;
        let q = match (self.law.is_embedded(), bag.count_if_present(Key::EmbeddedOrder)?) {
            (true, Some(embedded)) => order.min(embedded),
            _ => order,
        };

        let eps = if all_finite(y1) && all_finite(estimate) {
            self.tolerance.normalized_error(y0, y1, estimate)
        } else {
            f64::INFINITY
        };
        let decision = decide(self.law, &self.params, eps, q, h, ctx.history());

        let eps = if eps.is_finite() {
            eps
        } else {
            tracing::warn!(h, next = decision.next_step, "non-finite trial state, step rejected");
            f64::INFINITY
        };

        ctx.publish(Key::Accepted, decision.accepted)?;
        ctx.publish(Key::NextStepSize, decision.next_step)?;
        ctx.publish(Key::NormalizedError, eps)
    }
}
