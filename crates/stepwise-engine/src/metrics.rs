//! Per-run performance counters for the solver.
//!
//! [`RunMetrics`] is reset at the start of every run and read back after
//! it through [`Solver::metrics`](crate::Solver::metrics).

/// Counters and timings collected over one run.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunMetrics {
    /// Accepted step attempts.
    pub accepted_steps: u64,
    /// Rejected step attempts.
    pub rejected_steps: u64,
    /// Right-hand side evaluations, including split and acceleration
    /// evaluations.
    pub rhs_evaluations: u64,
    /// Jacobian evaluations.
    pub jacobian_evaluations: u64,
    /// Attempts rejected because a stage matrix was singular.
    pub linear_solve_failures: u64,
    /// Cumulative time per module, in pipeline order: `(name, microseconds)`.
    pub module_us: Vec<(String, u64)>,
    /// Wall-clock time of the whole run, in microseconds.
    pub total_us: u64,
}

impl RunMetrics {
    /// Accepted plus rejected attempts.
    pub fn attempts(&self) -> u64 {
        self.accepted_steps + self.rejected_steps
    }

    /// Fraction of attempts that were rejected, `0` before any attempt.
    pub fn rejection_rate(&self) -> f64 {
        match self.attempts() {
            0 => 0.0,
            n => self.rejected_steps as f64 / n as f64,
        }
    }
}
