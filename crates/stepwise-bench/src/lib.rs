//! Benchmark profiles for the Stepwise ODE integration framework.
//!
//! Provides pre-built systems and [`SolverConfig`] profiles:
//!
//! - [`Lorenz`]: the chaotic Lorenz system, a non-stiff workload
//! - [`Robertson`]: Robertson's chemical kinetics, a stiff workload with
//!   a native split for IMEX kernels
//! - [`explicit_profile`], [`doubling_profile`], [`imex_profile`]:
//!   adaptive configurations for each error-control family

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use stepwise_core::{tableau, AdditiveOde, Ode, OdeError};
use stepwise_engine::{EmbeddedLaw, ErrorControl, Method, SolverConfig};
use stepwise_modules::Tolerance;

/// Lorenz system with the classical parameters σ = 10, ρ = 28, β = 8/3.
#[derive(Clone, Copy, Debug)]
pub struct Lorenz;

impl Lorenz {
    /// A point near the attractor.
    pub const INITIAL: [f64; 3] = [1.0, 1.0, 1.0];
}

impl Ode for Lorenz {
    fn dimension(&self) -> usize {
        3
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = 10.0 * (y[1] - y[0]);
        dydt[1] = y[0] * (28.0 - y[2]) - y[1];
        dydt[2] = y[0] * y[1] - 8.0 / 3.0 * y[2];
        Ok(())
    }
}

/// Robertson's three-species reaction, stiff for `t ≳ 1`.
///
/// The split puts the fast `3·10⁷·y₂²` and `10⁴·y₂y₃` terms in the stiff
/// part and the slow `0.04·y₁` conversion in the non-stiff part.
#[derive(Clone, Copy, Debug)]
pub struct Robertson;

impl Robertson {
    /// All mass in the first species.
    pub const INITIAL: [f64; 3] = [1.0, 0.0, 0.0];
}

impl Ode for Robertson {
    fn dimension(&self) -> usize {
        3
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        let mut stiff = [0.0; 3];
        self.stiff(t, y, &mut stiff)?;
        self.non_stiff(t, y, dydt)?;
        for (d, s) in dydt.iter_mut().zip(stiff) {
            *d += s;
        }
        Ok(())
    }

    fn additive(&self) -> Option<&dyn AdditiveOde> {
        Some(self)
    }
}

impl AdditiveOde for Robertson {
    fn non_stiff(&self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        out[0] = -0.04 * y[0];
        out[1] = 0.04 * y[0];
        out[2] = 0.0;
        Ok(())
    }

    fn stiff(&self, _t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        let fast = 3e7 * y[1] * y[1];
        let slow = 1e4 * y[1] * y[2];
        out[0] = slow;
        out[1] = -slow - fast;
        out[2] = fast;
        Ok(())
    }
}

/// Dormand-Prince 5(4) with the PI controller.
pub fn explicit_profile() -> SolverConfig {
    SolverConfig::adaptive(
        Method::ExplicitRk(tableau::dormand_prince()),
        ErrorControl::Embedded(EmbeddedLaw::ExplicitPi),
        Tolerance::scalar(1e-9, 1e-6),
    )
}

/// Classical RK4 with step doubling.
pub fn doubling_profile() -> SolverConfig {
    SolverConfig::adaptive(
        Method::ExplicitRk(tableau::rk4()),
        ErrorControl::StepDoubling,
        Tolerance::scalar(1e-9, 1e-6),
    )
}

/// ARS(2,2,2) with the predictive controller.
pub fn imex_profile() -> SolverConfig {
    SolverConfig::adaptive(
        Method::Imex(tableau::ars222()),
        ErrorControl::Embedded(EmbeddedLaw::ImplicitPredictive),
        Tolerance::scalar(1e-8, 1e-4),
    )
}
