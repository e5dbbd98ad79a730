//! Fixture ODEs.

use std::sync::atomic::{AtomicUsize, Ordering};

use stepwise_core::{AdditiveOde, DenseMatrix, Ode, OdeError, Separable};

/// `y' = -rate·y`, with an analytic Jacobian.
pub struct Decay {
    pub rate: f64,
}

impl Decay {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    pub fn exact(&self, t: f64, y0: f64) -> f64 {
        y0 * (-self.rate * t).exp()
    }
}

impl Ode for Decay {
    fn dimension(&self) -> usize {
        1
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = -self.rate * y[0];
        Ok(())
    }

    fn jacobian(&self, _t: f64, _y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        jac.reset(1, 1);
        jac.set(0, 0, -self.rate);
        Ok(())
    }
}

/// `y' = y`.
pub struct Growth;

impl Ode for Growth {
    fn dimension(&self) -> usize {
        1
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = y[0];
        Ok(())
    }
}

/// `q'' = -ω²q` with state `[q, v]`; separable.
pub struct HarmonicOscillator {
    pub omega: f64,
}

impl HarmonicOscillator {
    pub fn new(omega: f64) -> Self {
        Self { omega }
    }

    pub fn energy(&self, y: &[f64]) -> f64 {
        0.5 * y[1] * y[1] + 0.5 * self.omega * self.omega * y[0] * y[0]
    }
}

impl Ode for HarmonicOscillator {
    fn dimension(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = y[1];
        dydt[1] = -self.omega * self.omega * y[0];
        Ok(())
    }

    fn separable(&self) -> Option<&dyn Separable> {
        Some(self)
    }
}

impl Separable for HarmonicOscillator {
    fn acceleration(&self, _t: f64, q: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        out[0] = -self.omega * self.omega * q[0];
        Ok(())
    }
}

/// Prothero-Robinson: `y' = -λ(y - cos t) - sin t`, exact `y = cos t`
/// from `y(0) = 1`. The stiff part is `-λ(y - cos t)`.
pub struct ProtheroRobinson {
    pub lambda: f64,
}

impl ProtheroRobinson {
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }
}

impl Ode for ProtheroRobinson {
    fn dimension(&self) -> usize {
        1
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = -self.lambda * (y[0] - t.cos()) - t.sin();
        Ok(())
    }

    fn jacobian(&self, _t: f64, _y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        jac.reset(1, 1);
        jac.set(0, 0, -self.lambda);
        Ok(())
    }

    fn additive(&self) -> Option<&dyn AdditiveOde> {
        Some(self)
    }
}

impl AdditiveOde for ProtheroRobinson {
    fn non_stiff(&self, t: f64, _y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        out[0] = -t.sin();
        Ok(())
    }

    fn stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        out[0] = -self.lambda * (y[0] - t.cos());
        Ok(())
    }

    fn stiff_jacobian(&self, _t: f64, _y: &[f64], jac: &mut DenseMatrix) -> Result<(), OdeError> {
        jac.reset(1, 1);
        jac.set(0, 0, -self.lambda);
        Ok(())
    }
}

/// Van der Pol oscillator `x'' = μ(1 - x²)x' - x`.
pub struct VanDerPol {
    pub mu: f64,
}

impl Ode for VanDerPol {
    fn dimension(&self) -> usize {
        2
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = y[1];
        dydt[1] = self.mu * (1.0 - y[0] * y[0]) * y[1] - y[0];
        Ok(())
    }
}

/// Fails with [`OdeError::EvaluationFailed`] once `calls` evaluations
/// have succeeded.
pub struct FailingOde {
    pub succeed_for: usize,
    calls: AtomicUsize,
}

impl FailingOde {
    pub fn new(succeed_for: usize) -> Self {
        Self {
            succeed_for,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Ode for FailingOde {
    fn dimension(&self) -> usize {
        1
    }

    fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_for {
            return Err(OdeError::EvaluationFailed {
                reason: format!("fixture failure after {n} calls"),
            });
        }
        dydt[0] = -y[0];
        Ok(())
    }
}

/// `y' = -y` that returns a non-finite derivative whenever the step
/// reaches past `blow_up_at` in `t`.
pub struct ExplodingOde {
    pub blow_up_at: f64,
}

impl Ode for ExplodingOde {
    fn dimension(&self) -> usize {
        1
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        dydt[0] = if t > self.blow_up_at { f64::NAN } else { -y[0] };
        Ok(())
    }
}
