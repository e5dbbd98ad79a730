//! Built-in modules for Stepwise pipelines.
//!
//! # Typical pipeline (each step)
//!
//! 1. [`JacobianModule`] (IMEX only) → `jacobian`
//! 2. A stepping kernel ([`ForwardEuler`], [`ExplicitRk`], [`Imex`],
//!    [`StormerVerlet`], [`ArclengthVerlet`]), optionally wrapped in
//!    [`StepDoubling`] → `final_values`, `order`, ...
//! 3. An error estimator ([`EmbeddedEstimator`], [`DoublingEstimator`])
//!    → `error_estimate`
//! 4. Optionally [`RichardsonExtrapolation`], which chains `final_values`.
//! 5. A [`StepController`] → `accepted`, `next_step_size`
//! 6. [`OutputModule`]s and stop modules ([`StopSignal`], [`StopWhen`]).
//!
//! The order above is not hard-coded: it falls out of each module's
//! declared keys at assembly.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod arclength;
pub mod controller;
pub mod doubling;
pub mod estimator;
pub mod euler;
pub mod explicit_rk;
pub mod imex;
pub mod jacobian;
pub mod output;
pub mod richardson;
pub mod sink;
pub mod stop;
pub mod verlet;

mod vecops;

pub use arclength::{ArclengthVerlet, GravitationalSystem};
pub use controller::{
    decide, ControlLaw, ControllerParams, Decision, StepController, Tolerance, ToleranceSpec,
};
pub use doubling::StepDoubling;
pub use estimator::{DoublingEstimator, EmbeddedEstimator};
pub use euler::ForwardEuler;
pub use explicit_rk::ExplicitRk;
pub use imex::Imex;
pub use jacobian::JacobianModule;
pub use output::{OutputCadence, OutputModule};
pub use richardson::RichardsonExtrapolation;
pub use sink::{FanOut, MemorySink, OutputSink, SinkError, Solution, TextSink};
pub use stop::{StopSignal, StopWhen};
pub use verlet::StormerVerlet;

use stepwise_core::Key;

/// Keys every stepping kernel reads from the solver's seed.
pub(crate) const KERNEL_INPUTS: [Key; 3] = [Key::InitialTime, Key::StepSize, Key::InitialValues];
