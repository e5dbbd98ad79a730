//! Solver-owned memory carried from one step attempt to the next.

/// A right-hand side value together with the exact point it was
/// evaluated at.
#[derive(Clone, Debug, PartialEq)]
pub struct DerivativeCache {
    /// Time of evaluation.
    pub t: f64,
    /// State of evaluation.
    pub y: Vec<f64>,
    /// `f(t, y)`.
    pub dydt: Vec<f64>,
}

/// Outcome of previous step attempts, owned by the solver.
///
/// Modules see a shared reference through
/// [`StepContext::history`](crate::StepContext::history). The solver
/// updates it with [`record`](StepHistory::record) once the outcome of
/// an attempt is known, so every module in one attempt sees the same
/// history.
#[derive(Clone, Debug, PartialEq)]
pub struct StepHistory {
    /// Whether the previous attempt was accepted. `true` before the first
    /// step, which is not a retry.
    pub previous_accepted: bool,
    /// Normalized error of the last accepted step.
    pub accepted_error: Option<f64>,
    /// Step size of the last accepted step.
    pub accepted_step: Option<f64>,
    /// Derivative at the end of the last accepted step, for FSAL reuse.
    pub derivative: Option<DerivativeCache>,
    /// Number of attempts recorded so far.
    pub attempts: u64,
}

impl Default for StepHistory {
    fn default() -> Self {
        Self {
            previous_accepted: true,
            accepted_error: None,
            accepted_step: None,
            derivative: None,
            attempts: 0,
        }
    }
}

impl StepHistory {
    /// Fresh history for the start of a run.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached derivative, if it was evaluated exactly at `(t, y)` and
    /// the previous attempt was accepted.
    pub fn derivative_at(&self, t: f64, y: &[f64]) -> Option<&[f64]> {
        if !self.previous_accepted {
            return None;
        }
        let cache = self.derivative.as_ref()?;
        (cache.t == t && cache.y == y).then_some(cache.dydt.as_slice())
    }

    /// Record the outcome of an attempt.
    ///
    /// `error` and `step` only update the accepted-step memory when the
    /// attempt was accepted. `derivative` replaces the cache on acceptance
    /// and is ignored otherwise.
    pub fn record(
        &mut self,
        accepted: bool,
        error: Option<f64>,
        step: f64,
        derivative: Option<DerivativeCache>,
    ) {
        self.attempts += 1;
        self.previous_accepted = accepted;
        if accepted {
            if error.is_some() {
                self.accepted_error = error;
            }
            self.accepted_step = Some(step);
            self.derivative = derivative;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> DerivativeCache {
        DerivativeCache {
            t: 1.0,
            y: vec![2.0],
            dydt: vec![-2.0],
        }
    }

    #[test]
    fn first_step_counts_as_accepted() {
        let h = StepHistory::new();
        assert!(h.previous_accepted);
        assert!(h.accepted_error.is_none());
    }

    #[test]
    fn rejection_keeps_accepted_memory() {
        let mut h = StepHistory::new();
        h.record(true, Some(0.5), 0.1, Some(cache()));
        h.record(false, Some(4.0), 0.2, None);
        assert!(!h.previous_accepted);
        assert_eq!(h.accepted_error, Some(0.5));
        assert_eq!(h.accepted_step, Some(0.1));
        assert!(h.derivative.is_some());
        assert_eq!(h.attempts, 2);
    }

    #[test]
    fn derivative_requires_exact_point_and_acceptance() {
        let mut h = StepHistory::new();
        h.record(true, None, 0.1, Some(cache()));
        assert_eq!(h.derivative_at(1.0, &[2.0]), Some(&[-2.0][..]));
        assert!(h.derivative_at(1.0, &[2.0 + 1e-12]).is_none());
        assert!(h.derivative_at(1.1, &[2.0]).is_none());
        h.record(false, None, 0.1, None);
        assert!(h.derivative_at(1.0, &[2.0]).is_none());
    }
}
