//! Stepwise: pipeline-assembled adaptive ODE integration.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Stepwise sub-crates. For most users, adding `stepwise` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use stepwise::prelude::*;
//!
//! struct Oscillator;
//!
//! impl Ode for Oscillator {
//!     fn dimension(&self) -> usize { 2 }
//!
//!     fn rhs(&self, _t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
//!         dydt[0] = y[1];
//!         dydt[1] = -y[0];
//!         Ok(())
//!     }
//! }
//!
//! let sink = MemorySink::new();
//! let mut solver = Solver::new(SolverConfig::adaptive(
//!     Method::ExplicitRk(stepwise::types::tableau::dormand_prince()),
//!     ErrorControl::Embedded(EmbeddedLaw::ExplicitPi),
//!     Tolerance::scalar(1e-9, 1e-7),
//! ));
//! solver
//!     .add_output(Box::new(sink.clone()), OutputCadence::FixedCount(5))
//!     .unwrap();
//!
//! let reason = solver.solve(&Oscillator, 0.0, 1.0, &[1.0, 0.0]).unwrap();
//! assert_eq!(reason, Termination::Completed);
//! assert!((solver.final_values()[0] - 1f64.cos()).abs() < 1e-6);
//! assert_eq!(sink.solution().len(), 5);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `stepwise-core` | Keys, property bag, ODE traits, schemes, tableaux, errors |
//! | [`module`] | `stepwise-module` | Module trait, step context, history, pipeline assembly |
//! | [`modules`] | `stepwise-modules` | Kernels, estimators, controllers, outputs, stop modules |
//! | [`engine`] | `stepwise-engine` | Solver loop, configuration, metrics, worker threads |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and errors (`stepwise-core`).
///
/// Contains [`types::Key`], [`types::PropertyBag`], the [`types::Ode`]
/// trait with its optional capabilities, [`types::Scheme`] and the
/// built-in tableaux in [`types::tableau`].
pub use stepwise_core as types;

/// Module trait and pipeline assembly (`stepwise-module`).
///
/// The [`module::Module`] trait is the main extension point for
/// user-defined stages of a step.
pub use stepwise_module as module;

/// Built-in modules (`stepwise-modules`).
///
/// Stepping kernels such as [`modules::ExplicitRk`] and [`modules::Imex`],
/// estimators, the [`modules::StepController`], output sinks and stop
/// modules.
pub use stepwise_modules as modules;

/// Solver engine (`stepwise-engine`).
///
/// [`engine::Solver`] for one run, [`engine::solve_batch`] for many
/// independent runs on worker threads.
pub use stepwise_engine as engine;

/// Common imports for typical Stepwise usage.
///
/// ```rust
/// use stepwise::prelude::*;
/// ```
///
/// This imports the solver and its configuration, the ODE traits, the
/// module trait, and the output and stop modules.
pub mod prelude {
    // Core types and traits
    pub use stepwise_core::{
        AdditiveOde, AdditiveScheme, DenseMatrix, Interpolant, Key, Ode, PropertyBag, Scheme,
        Separable,
    };

    // Errors
    pub use stepwise_core::{ModuleError, OdeError};
    pub use stepwise_module::AssemblyError;

    // Module
    pub use stepwise_module::{Declarations, Module, StepContext};

    // Built-in modules
    pub use stepwise_modules::{
        ControllerParams, GravitationalSystem, MemorySink, OutputCadence, OutputSink, Solution,
        StopSignal, StopWhen, TextSink, Tolerance, ToleranceSpec,
    };

    // Engine
    pub use stepwise_engine::{
        ConfigError, EmbeddedLaw, ErrorControl, InitialStep, Method, RunMetrics, SolveError,
        Solver, SolverConfig, Termination,
    };
}
