//! Automatic first step.
//!
//! A single evaluation of `f(t0, y0)` gives the scale of the solution's
//! rate of change. With `r` the smallest relative tolerance, the step is
//! chosen so that a method of order `p` would commit an error of roughly
//! `r·|y|` on it:
//!
//! ```text
//! h0 = 0.8 · r^(1/p) / ‖f(t0, y0) / max(|y0|, atol/rtol)‖_rms
//! ```
//!
//! The floor `atol/rtol` is taken per component; a component with zero
//! `rtol` uses `r` instead.
//!
//! clamped to `[16ε·max(|t0|, 1), tf − t0]`.

use stepwise_core::{Ode, OdeError};
use stepwise_modules::Tolerance;

const SAFETY: f64 = 0.8;

/// Estimate a first step for a method of order `order`.
///
/// Returns the full interval when the derivative is zero or not finite;
/// the controller shrinks it on the first attempt.
pub fn estimate(
    ode: &dyn Ode,
    t0: f64,
    tf: f64,
    y0: &[f64],
    tolerance: &Tolerance,
    order: u32,
) -> Result<f64, OdeError> {
    let span = tf - t0;
    let n = y0.len();
    let mut f0 = vec![0.0; n];
    ode.rhs(t0, y0, &mut f0)?;

    let r = reference_rtol(tolerance);
    let mut sum = 0.0;
    for (i, (&f, &y)) in f0.iter().zip(y0).enumerate() {
        let rtol = tolerance.rtol.at(i);
        let floor = tolerance.atol.at(i) / if rtol > 0.0 { rtol } else { r };
        sum += (f / y.abs().max(floor)).powi(2);
    }
    let norm = if n == 0 { 0.0 } else { (sum / n as f64).sqrt() };
    if !norm.is_finite() || norm == 0.0 {
        return Ok(span);
    }

    let h = SAFETY * r.powf(1.0 / f64::from(order.max(1))) / norm;
    let floor = 16.0 * f64::EPSILON * t0.abs().max(1.0);
    Ok(h.clamp(floor.min(span), span))
}

/// Smallest positive relative tolerance, falling back to the smallest
/// absolute tolerance when every `rtol` is zero.
fn reference_rtol(tolerance: &Tolerance) -> f64 {
    let smallest = |values: &[f64]| {
        values
            .iter()
            .copied()
            .filter(|v| *v > 0.0)
            .fold(f64::INFINITY, f64::min)
    };
    let r = smallest(tolerance.rtol.values());
    if r.is_finite() {
        r
    } else {
        smallest(tolerance.atol.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stepwise_modules::ToleranceSpec;
    use stepwise_test_utils::{Decay, FailingOde, HarmonicOscillator};

    #[test]
    fn scales_with_decay_rate() {
        let tol = Tolerance::scalar(1e-6, 1e-3);
        let slow = estimate(&Decay::new(1.0), 0.0, 10.0, &[1.0], &tol, 5).unwrap();
        let fast = estimate(&Decay::new(100.0), 0.0, 10.0, &[1.0], &tol, 5).unwrap();
        assert!((slow / fast - 100.0).abs() < 1e-9);
        let expected = 0.8 * 1e-3f64.powf(0.2);
        assert!((slow - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_derivative_takes_whole_interval() {
        let tol = Tolerance::default();
        let h = estimate(&Decay::new(0.0), 1.0, 3.0, &[1.0], &tol, 4).unwrap();
        assert_eq!(h, 2.0);
    }

    #[test]
    fn clamped_to_interval() {
        let tol = Tolerance::scalar(1e-2, 1e-1);
        let h = estimate(&Decay::new(1e-6), 0.0, 0.5, &[1.0], &tol, 1).unwrap();
        assert_eq!(h, 0.5);
    }

    #[test]
    fn zero_rtol_falls_back_to_atol() {
        let tol = Tolerance::scalar(1e-4, 0.0);
        let h = estimate(&Decay::new(1.0), 0.0, 10.0, &[1.0], &tol, 1).unwrap();
        // r = 1e-4, scale = max(1, 1) = 1.
        assert!((h - 0.8e-4).abs() < 1e-15);
    }

    #[test]
    fn floor_uses_each_components_rtol() {
        // Velocity starts at zero, so its floor atol/rtol = 0.1 sets its
        // scale; a shared floor would use 1e-2/1e-4 = 100.
        let tol = Tolerance {
            atol: ToleranceSpec::PerComponent(vec![1e-6, 1e-2]),
            rtol: ToleranceSpec::PerComponent(vec![1e-4, 1e-1]),
        };
        let ode = HarmonicOscillator::new(1.0);
        let h = estimate(&ode, 0.0, 100.0, &[1.0, 0.0], &tol, 1).unwrap();
        // f0 = [0, -1], scales [1, 0.1], rms = sqrt(50).
        let expected = 0.8 * 1e-4 / 50f64.sqrt();
        assert!((h - expected).abs() < 1e-15, "h = {h}");
    }

    #[test]
    fn rhs_failure_propagates() {
        let tol = Tolerance::default();
        assert!(estimate(&FailingOde::new(0), 0.0, 1.0, &[1.0], &tol, 2).is_err());
    }

    proptest! {
        #[test]
        fn always_within_interval(
            rate in 0.0f64..1e6,
            y in -1e3f64..1e3,
            span in 1e-6f64..1e3,
            rtol in 1e-12f64..1e-1,
            order in 1u32..8,
        ) {
            let tol = Tolerance::scalar(rtol * 1e-3, rtol);
            let h = estimate(&Decay::new(rate), 0.0, span, &[y], &tol, order).unwrap();
            prop_assert!(h > 0.0);
            prop_assert!(h <= span);
        }
    }
}
