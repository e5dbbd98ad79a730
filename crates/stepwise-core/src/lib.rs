//! Core types and traits for the Stepwise ODE integration framework.
//!
//! This is the leaf crate of the workspace. It defines the data exchanged
//! between pipeline modules each step: typed property keys, the
//! [`PropertyBag`] and its [`Value`] union, Butcher tableaux, the [`Ode`]
//! trait with its optional capabilities, a small dense LU for implicit
//! stages, and the shared error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bag;
pub mod error;
pub mod key;
pub mod linalg;
pub mod ode;
pub mod scheme;
pub mod tableau;
pub mod value;

pub use bag::PropertyBag;
pub use error::{BagError, ModuleError, OdeError, SchemeError};
pub use key::{Key, KeySet};
pub use linalg::{DenseMatrix, LuFactors, SingularMatrix};
pub use ode::{finite_difference_jacobian, AdditiveOde, Ode, Separable};
pub use scheme::{AdditiveScheme, Interpolant, Scheme};
pub use value::{Value, ValueKind};
