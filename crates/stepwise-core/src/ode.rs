//! The [`Ode`] trait and its optional structural capabilities.
//!
//! An ODE is an immutable right-hand side `f(t, y)` of fixed dimension.
//! Implementations must tolerate repeated calls at arbitrary `(t, y)`,
//! including intermediate stage states far from the solution.
//!
//! Two optional capabilities are exposed through accessor methods rather
//! than trait-object downcasts, so a single `&dyn Ode` carries them:
//!
//! - [`AdditiveOde`]: a native stiff/non-stiff split for IMEX kernels.
//! - [`Separable`]: a second-order system `q'' = a(t, q)` for symplectic
//!   kernels, with state layout `[q; v]`.

use crate::error::OdeError;
use crate::linalg::DenseMatrix;

/// A first-order system `dy/dt = f(t, y)`.
///
/// # Examples
///
/// ```
/// use stepwise_core::{Ode, OdeError};
///
/// struct Decay;
///
/// impl Ode for Decay {
///     fn dimension(&self) -> usize { 1 }
///
///     fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
///         dydt[0] = -y[0];
///         Ok(())
///     }
/// }
///
/// let mut out = [0.0];
/// Decay.rhs(0.0, &[2.0], &mut out).unwrap();
/// assert_eq!(out, [-2.0]);
/// ```
pub trait Ode: Send + Sync {
    /// Length of the state vector.
    fn dimension(&self) -> usize;

    /// Evaluate `f(t, y)` into `dydt`.
    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError>;

    /// Evaluate `∂f/∂y` at `(t, y)` into `jac` (already sized `n × n`).
    ///
    /// Default: central finite differences of [`rhs`](Ode::rhs).
    fn jacobian(&self, t: f64, y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        finite_difference_jacobian(|t, y, out| self.rhs(t, y, out), t, y, jac)
    }

    /// Native stiff/non-stiff split, if the system has one.
    fn additive(&self) -> Option<&dyn AdditiveOde> {
        None
    }

    /// Second-order structure, if the system is separable.
    fn separable(&self) -> Option<&dyn Separable> {
        None
    }
}

/// A native split `f = f_E + f_I` into non-stiff and stiff parts.
pub trait AdditiveOde: Send + Sync {
    /// Non-stiff part `f_E(t, y)`, integrated explicitly.
    fn non_stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError>;

    /// Stiff part `f_I(t, y)`, integrated implicitly.
    fn stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError>;

    /// `∂f_I/∂y` at `(t, y)`. Default: central finite differences of
    /// [`stiff`](AdditiveOde::stiff).
    fn stiff_jacobian(&self, t: f64, y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        finite_difference_jacobian(|t, y, out| self.stiff(t, y, out), t, y, jac)
    }
}

/// A separable second-order system `q'' = a(t, q)`.
///
/// The first-order state is `[q; v]` with `q` and `v` of equal length, so
/// the [`Ode::dimension`] of a separable system is always even.
pub trait Separable: Send + Sync {
    /// Evaluate the acceleration `a(t, q)` into `out` (length `q.len()`).
    fn acceleration(&self, t: f64, q: &[f64], out: &mut [f64]) -> Result<(), OdeError>;
}

/// Central-difference Jacobian of `f` at `(t, y)`, written into `jac`.
///
/// Uses a per-component perturbation `cbrt(ε)·max(|y_j|, 1)` and costs
/// `2n` evaluations of `f`.
pub fn finite_difference_jacobian<F>(
    mut f: F,
    t: f64,
    y: &[f64],
    jac: &mut DenseMatrix,
) -> Result<(), OdeError>
where
    F: FnMut(f64, &[f64], &mut [f64]) -> Result<(), OdeError>,
{
    let n = y.len();
    jac.reset(n, n);
    let mut yp = y.to_vec();
    let mut f_plus = vec![0.0; n];
    let mut f_minus = vec![0.0; n];
    let base = f64::EPSILON.cbrt();
    for j in 0..n {
        let h = base * y[j].abs().max(1.0);
        yp[j] = y[j] + h;
        f(t, &yp, &mut f_plus)?;
        yp[j] = y[j] - h;
        f(t, &yp, &mut f_minus)?;
        yp[j] = y[j];
        let inv = 1.0 / (2.0 * h);
        for i in 0..n {
            jac.set(i, j, (f_plus[i] - f_minus[i]) * inv);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Linear2;

    impl Ode for Linear2 {
        fn dimension(&self) -> usize {
            2
        }

        fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
            dydt[0] = -2.0 * y[0] + y[1];
            dydt[1] = 3.0 * y[0] * y[0];
            Ok(())
        }
    }

    #[test]
    fn default_jacobian_matches_analytic() {
        let mut jac = DenseMatrix::zeros(2, 2);
        Linear2.jacobian(0.0, &[1.5, -1.0], &mut jac).unwrap();
        assert!((jac.get(0, 0) + 2.0).abs() < 1e-8);
        assert!((jac.get(0, 1) - 1.0).abs() < 1e-8);
        assert!((jac.get(1, 0) - 9.0).abs() < 1e-6);
        assert!(jac.get(1, 1).abs() < 1e-8);
    }

    #[test]
    fn capabilities_absent_by_default() {
        assert!(Linear2.additive().is_none());
        assert!(Linear2.separable().is_none());
    }

    #[test]
    fn rhs_failure_propagates_through_jacobian() {
        let failing = |_t: f64, _y: &[f64], _out: &mut [f64]| -> Result<(), OdeError> {
            Err(OdeError::EvaluationFailed {
                reason: "domain".into(),
            })
        };
        let mut jac = DenseMatrix::zeros(1, 1);
        assert!(finite_difference_jacobian(failing, 0.0, &[1.0], &mut jac).is_err());
    }
}
