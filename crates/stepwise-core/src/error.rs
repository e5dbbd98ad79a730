//! Error types shared across the Stepwise workspace.
//!
//! Organized by origin: property-bag access, user right-hand sides,
//! tableau construction, and module execution. Assembly, configuration
//! and run-level errors live in the crates that raise them.

use std::error::Error;
use std::fmt;

use crate::key::Key;
use crate::value::ValueKind;

/// Errors from typed [`PropertyBag`](crate::PropertyBag) access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BagError {
    /// The key has no value in the bag.
    Missing {
        /// The absent key.
        key: Key,
    },
    /// The key holds a value of a different kind.
    TypeMismatch {
        /// The key that was read.
        key: Key,
        /// The kind the caller asked for.
        expected: ValueKind,
        /// The kind actually stored.
        found: ValueKind,
    },
}

impl fmt::Display for BagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "key '{key}' not present"),
            Self::TypeMismatch {
                key,
                expected,
                found,
            } => write!(f, "key '{key}' holds {found}, expected {expected}"),
        }
    }
}

impl Error for BagError {}

/// Failure raised by a user-supplied right-hand side, Jacobian or
/// acceleration function. Aborts the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OdeError {
    /// The function could not be evaluated at the requested point.
    EvaluationFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for OdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EvaluationFailed { reason } => write!(f, "evaluation failed: {reason}"),
        }
    }
}

impl Error for OdeError {}

/// Errors detected while building a [`Scheme`](crate::Scheme) or
/// [`AdditiveScheme`](crate::AdditiveScheme).
#[derive(Clone, Debug, PartialEq)]
pub enum SchemeError {
    /// The tableau has no stages.
    NoStages,
    /// `A`, `b`, `b̂` or `c` disagree on the stage count.
    ShapeMismatch {
        /// Which coefficient array is malformed.
        what: &'static str,
        /// Expected length.
        expected: usize,
        /// Actual length.
        found: usize,
    },
    /// A coefficient is NaN or infinite.
    NonFiniteCoefficient {
        /// Which coefficient array contains it.
        what: &'static str,
    },
    /// The declared order is zero.
    ZeroOrder,
    /// An explicit kernel was given a tableau with entries on or above the diagonal.
    NotExplicit {
        /// Row of the offending entry.
        row: usize,
        /// Column of the offending entry.
        col: usize,
    },
    /// The implicit half of an additive pair is not ESDIRK.
    NotEsdirk {
        /// Description of the violated structure.
        reason: String,
    },
    /// FSAL was declared but the last stage does not reproduce the step result.
    NotFsal,
    /// The two tableaux of an additive pair use different stage times.
    StageTimeMismatch {
        /// First stage index where `c` differs.
        stage: usize,
    },
}

impl fmt::Display for SchemeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStages => write!(f, "tableau has no stages"),
            Self::ShapeMismatch {
                what,
                expected,
                found,
            } => write!(f, "{what} has length {found}, expected {expected}"),
            Self::NonFiniteCoefficient { what } => {
                write!(f, "{what} contains a non-finite coefficient")
            }
            Self::ZeroOrder => write!(f, "order must be at least 1"),
            Self::NotExplicit { row, col } => {
                write!(f, "tableau entry a[{row}][{col}] makes the method implicit")
            }
            Self::NotEsdirk { reason } => write!(f, "implicit tableau is not ESDIRK: {reason}"),
            Self::NotFsal => write!(f, "last stage does not match the weights (FSAL)"),
            Self::StageTimeMismatch { stage } => {
                write!(f, "additive tableaux disagree on c[{stage}]")
            }
        }
    }
}

impl Error for SchemeError {}

/// Errors from a single module's `step()`.
///
/// Wrapped in a run-level error by the solver, which adds the module name.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleError {
    /// A required key was absent or had the wrong kind.
    Bag(BagError),
    /// The module tried to publish a key it never declared as supplied.
    UndeclaredSupply {
        /// Name of the publishing module.
        module: String,
        /// The undeclared key.
        key: Key,
    },
    /// A vector did not have the ODE dimension.
    DimensionMismatch {
        /// The ODE dimension.
        expected: usize,
        /// The length found.
        found: usize,
    },
    /// The user right-hand side failed.
    Rhs(OdeError),
    /// The iteration matrix of an implicit stage could not be factored.
    LinearSolveFailure {
        /// Stage whose solve failed.
        stage: usize,
        /// Magnitude of the rejected pivot.
        pivot: f64,
    },
    /// An output sink failed to accept data.
    Sink {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// Any other execution failure.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bag(e) => write!(f, "property bag: {e}"),
            Self::UndeclaredSupply { module, key } => {
                write!(f, "module '{module}' published undeclared key '{key}'")
            }
            Self::DimensionMismatch { expected, found } => {
                write!(f, "vector has length {found}, expected {expected}")
            }
            Self::Rhs(e) => write!(f, "right-hand side: {e}"),
            Self::LinearSolveFailure { stage, pivot } => {
                write!(f, "linear solve failed in stage {stage} (pivot {pivot:e})")
            }
            Self::Sink { reason } => write!(f, "output sink: {reason}"),
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
        }
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Bag(e) => Some(e),
            Self::Rhs(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BagError> for ModuleError {
    fn from(e: BagError) -> Self {
        Self::Bag(e)
    }
}

impl From<OdeError> for ModuleError {
    fn from(e: OdeError) -> Self {
        Self::Rhs(e)
    }
}
