//! Running solvers on worker threads.
//!
//! A run is handed to a thread as an opaque unit: the [`Solver`] and its
//! ODE move onto the thread and come back, with the result, over a
//! one-slot channel. Nothing is shared between runs.
//!
//! ```text
//! caller                      stepwise-solve-N
//!   |--spawn_solve(job)------------>|
//!   |                               | solver.solve(ode, t0, tf, y0)
//!   |<--RunReport via bounded(1)----|
//! ```

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use stepwise_core::Ode;
use tracing::debug;

use crate::solver::{SolveError, Solver, Termination};

// ── Error types ────────────────────────────────────────────────────

/// Failure to run a job on a worker thread.
#[derive(Debug, PartialEq, Eq)]
pub enum WorkerError {
    /// The OS refused to create the thread.
    Spawn {
        /// Description from the OS.
        reason: String,
    },
    /// The worker exited without reporting, which means it panicked.
    Disconnected,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { reason } => write!(f, "failed to spawn solve thread: {reason}"),
            Self::Disconnected => write!(f, "solve thread exited without a result"),
        }
    }
}

impl std::error::Error for WorkerError {}

// ── Jobs and reports ───────────────────────────────────────────────

/// One initial value problem and the solver that will integrate it.
pub struct SolveJob {
    /// A configured, unstarted solver.
    pub solver: Solver,
    /// The system to integrate.
    pub ode: Arc<dyn Ode>,
    /// Initial time.
    pub t0: f64,
    /// Final time.
    pub tf: f64,
    /// Initial state.
    pub y0: Vec<f64>,
}

impl fmt::Debug for SolveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolveJob")
            .field("solver", &self.solver)
            .field("t0", &self.t0)
            .field("tf", &self.tf)
            .field("dimension", &self.y0.len())
            .finish()
    }
}

/// Outcome of a job: the run result and the solver, for post-run queries.
#[derive(Debug)]
pub struct RunReport {
    /// What [`Solver::solve`] returned.
    pub result: Result<Termination, SolveError>,
    /// The solver after the run.
    pub solver: Solver,
}

/// Handle to a run in progress.
#[derive(Debug)]
pub struct SolveHandle {
    reply: Receiver<RunReport>,
    thread: JoinHandle<()>,
}

impl SolveHandle {
    /// Block until the run finishes.
    pub fn join(self) -> Result<RunReport, WorkerError> {
        let report = self.reply.recv().map_err(|_| WorkerError::Disconnected);
        // The sender is dropped as the thread exits; a panic has already
        // surfaced as a closed channel above.
        let _ = self.thread.join();
        report
    }

    /// Whether the run has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

// ── Spawning ───────────────────────────────────────────────────────

fn spawn_named(name: String, job: SolveJob) -> Result<SolveHandle, WorkerError> {
    let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || {
            let SolveJob {
                mut solver,
                ode,
                t0,
                tf,
                y0,
            } = job;
            let result = solver.solve(ode.as_ref(), t0, tf, &y0);
            // The caller may have dropped the handle; nothing to report to.
            let _ = reply_tx.send(RunReport { result, solver });
        })
        .map_err(|e| WorkerError::Spawn {
            reason: e.to_string(),
        })?;
    Ok(SolveHandle {
        reply: reply_rx,
        thread,
    })
}

/// Run `job` on a new thread named `stepwise-solve`.
pub fn spawn_solve(job: SolveJob) -> Result<SolveHandle, WorkerError> {
    spawn_named("stepwise-solve".to_string(), job)
}

/// Run every job on its own thread and gather the reports in input
/// order.
///
/// All threads are spawned before any is joined. If a spawn fails, the
/// threads already started are joined and the spawn error is returned.
pub fn solve_batch(jobs: Vec<SolveJob>) -> Result<Vec<RunReport>, WorkerError> {
    let count = jobs.len();
    let mut handles = Vec::with_capacity(count);
    for (i, job) in jobs.into_iter().enumerate() {
        match spawn_named(format!("stepwise-solve-{i}"), job) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for handle in handles {
                    let _ = handle.join();
                }
                return Err(e);
            }
        }
    }
    debug!(jobs = count, "batch spawned");
    handles.into_iter().map(SolveHandle::join).collect()
}
