//! Solver engine for Stepwise.
//!
//! Provides the [`Solver`] that owns the stepping loop, the
//! [`SolverConfig`] that selects a method and an error-control family,
//! the automatic first-step selector, per-run [`RunMetrics`], and a
//! worker-thread runner for independent problems.
//!
//! ```
//! use stepwise_engine::{Method, Solver, SolverConfig, Termination};
//! use stepwise_core::{Ode, OdeError};
//!
//! struct Decay;
//!
//! impl Ode for Decay {
//!     fn dimension(&self) -> usize { 1 }
//!
//!     fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
//!         dydt[0] = -y[0];
//!         Ok(())
//!     }
//! }
//!
//! let mut solver = Solver::new(SolverConfig::fixed(Method::ForwardEuler, 0.1));
//! assert_eq!(solver.solve(&Decay, 0.0, 0.1, &[1.0]), Ok(Termination::Completed));
//! assert_eq!(solver.final_values(), &[0.9]);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod initial_step;
pub mod metrics;
pub mod solver;
pub mod worker;

pub use config::{ConfigError, EmbeddedLaw, ErrorControl, InitialStep, Method, SolverConfig};
pub use metrics::RunMetrics;
pub use solver::{root_keys, SolveError, Solver, Termination};
pub use worker::{solve_batch, spawn_solve, RunReport, SolveHandle, SolveJob, WorkerError};
