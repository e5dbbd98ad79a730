//! Module trait, step context and pipeline assembly for Stepwise.
//!
//! A [`Module`] is one stage of the per-step computation: a stepping
//! kernel, an error estimator, a controller, an output writer. Modules
//! declare the [`Key`](stepwise_core::Key)s they require and supply;
//! [`assemble`] orders and checks them once before integration starts.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod context;
pub mod history;
pub mod module;
pub mod pipeline;

pub use context::StepContext;
pub use history::{DerivativeCache, StepHistory};
pub use module::{Declarations, Module};
pub use pipeline::{
    assemble, effective_requirements, order_modules, satisfy_modules, AssemblyError, Binding,
    BindingKind, Pipeline, Supplier,
};
