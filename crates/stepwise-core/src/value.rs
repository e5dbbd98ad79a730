//! The tagged-union [`Value`] stored in a property bag.

use std::fmt;
use std::sync::Arc;

use crate::linalg::DenseMatrix;
use crate::scheme::Scheme;

/// A dynamically-kinded property value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A real scalar (times, step sizes, normalized errors).
    Scalar(f64),
    /// A small non-negative integer (method orders).
    Count(u32),
    /// A boolean flag (acceptance, stop requests).
    Flag(bool),
    /// A state-sized vector.
    Vector(Vec<f64>),
    /// A dense matrix (Jacobians).
    Matrix(DenseMatrix),
    /// A shared tableau description.
    Scheme(Arc<Scheme>),
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Count(_) => ValueKind::Count,
            Self::Flag(_) => ValueKind::Flag,
            Self::Vector(_) => ValueKind::Vector,
            Self::Matrix(_) => ValueKind::Matrix,
            Self::Scheme(_) => ValueKind::Scheme,
        }
    }
}

/// Discriminant of a [`Value`], used in type-mismatch diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// [`Value::Scalar`].
    Scalar,
    /// [`Value::Count`].
    Count,
    /// [`Value::Flag`].
    Flag,
    /// [`Value::Vector`].
    Vector,
    /// [`Value::Matrix`].
    Matrix,
    /// [`Value::Scheme`].
    Scheme,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scalar => "scalar",
            Self::Count => "count",
            Self::Flag => "flag",
            Self::Vector => "vector",
            Self::Matrix => "matrix",
            Self::Scheme => "scheme",
        };
        f.write_str(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Count(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Self::Vector(v.to_vec())
    }
}

impl From<DenseMatrix> for Value {
    fn from(v: DenseMatrix) -> Self {
        Self::Matrix(v)
    }
}

impl From<Arc<Scheme>> for Value {
    fn from(v: Arc<Scheme>) -> Self {
        Self::Scheme(v)
    }
}
