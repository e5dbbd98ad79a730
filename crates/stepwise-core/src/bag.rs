//! The per-step [`PropertyBag`].
//!
//! A bag is created fresh for every step attempt, seeded by the solver
//! with the interval endpoints, then filled by each module in pipeline
//! order. Later writes to a key replace earlier ones, so a reader always
//! sees the most recent supplier.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::error::BagError;
use crate::key::Key;
use crate::linalg::DenseMatrix;
use crate::scheme::Scheme;
use crate::value::{Value, ValueKind};

/// Heterogeneous key/value store exchanged between modules during one step.
#[derive(Clone, Debug, Default)]
pub struct PropertyBag {
    entries: IndexMap<Key, Value>,
}

impl PropertyBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: Key, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key, value.into())
    }

    /// Raw access to a stored value.
    pub fn get(&self, key: Key) -> Option<&Value> {
        self.entries.get(&key)
    }

    /// Whether `key` currently has a value.
    pub fn contains(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, key: Key) -> Option<Value> {
        self.entries.shift_remove(&key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    /// Drop every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn lookup(&self, key: Key) -> Result<&Value, BagError> {
        self.entries.get(&key).ok_or(BagError::Missing { key })
    }

    /// Read a scalar.
    pub fn scalar(&self, key: Key) -> Result<f64, BagError> {
        match self.lookup(key)? {
            Value::Scalar(v) => Ok(*v),
            other => Err(mismatch(key, ValueKind::Scalar, other)),
        }
    }

    /// Read a count.
    pub fn count(&self, key: Key) -> Result<u32, BagError> {
        match self.lookup(key)? {
            Value::Count(v) => Ok(*v),
            other => Err(mismatch(key, ValueKind::Count, other)),
        }
    }

    /// Read a flag.
    pub fn flag(&self, key: Key) -> Result<bool, BagError> {
        match self.lookup(key)? {
            Value::Flag(v) => Ok(*v),
            other => Err(mismatch(key, ValueKind::Flag, other)),
        }
    }

    /// Read a vector.
    pub fn vector(&self, key: Key) -> Result<&[f64], BagError> {
        match self.lookup(key)? {
            Value::Vector(v) => Ok(v),
            other => Err(mismatch(key, ValueKind::Vector, other)),
        }
    }

    /// Read a matrix.
    pub fn matrix(&self, key: Key) -> Result<&DenseMatrix, BagError> {
        match self.lookup(key)? {
            Value::Matrix(m) => Ok(m),
            other => Err(mismatch(key, ValueKind::Matrix, other)),
        }
    }

    /// Read a scheme.
    pub fn scheme(&self, key: Key) -> Result<&Arc<Scheme>, BagError> {
        match self.lookup(key)? {
            Value::Scheme(s) => Ok(s),
            other => Err(mismatch(key, ValueKind::Scheme, other)),
        }
    }

    /// Read a flag if present. A value of the wrong kind is still an error.
    pub fn flag_if_present(&self, key: Key) -> Result<Option<bool>, BagError> {
        if !self.contains(key) {
            return Ok(None);
        }
        self.flag(key).map(Some)
    }

    /// Read a scalar if present. A value of the wrong kind is still an error.
    pub fn scalar_if_present(&self, key: Key) -> Result<Option<f64>, BagError> {
        if !self.contains(key) {
            return Ok(None);
        }
        self.scalar(key).map(Some)
    }

    /// Read a count if present. A value of the wrong kind is still an error.
    pub fn count_if_present(&self, key: Key) -> Result<Option<u32>, BagError> {
        if !self.contains(key) {
            return Ok(None);
        }
        self.count(key).map(Some)
    }

    // ── Semantic accessors ─────────────────────────────────────────

    /// [`Key::InitialTime`].
    pub fn initial_time(&self) -> Result<f64, BagError> {
        self.scalar(Key::InitialTime)
    }

    /// [`Key::FinalTime`].
    pub fn final_time(&self) -> Result<f64, BagError> {
        self.scalar(Key::FinalTime)
    }

    /// [`Key::StepSize`].
    pub fn step_size(&self) -> Result<f64, BagError> {
        self.scalar(Key::StepSize)
    }

    /// [`Key::InitialValues`].
    pub fn initial_values(&self) -> Result<&[f64], BagError> {
        self.vector(Key::InitialValues)
    }

    /// [`Key::FinalValues`].
    pub fn final_values(&self) -> Result<&[f64], BagError> {
        self.vector(Key::FinalValues)
    }

    /// [`Key::ErrorEstimate`].
    pub fn error_estimate(&self) -> Result<&[f64], BagError> {
        self.vector(Key::ErrorEstimate)
    }

    /// [`Key::Order`].
    pub fn order(&self) -> Result<u32, BagError> {
        self.count(Key::Order)
    }
}

fn mismatch(key: Key, expected: ValueKind, found: &Value) -> BagError {
    BagError::TypeMismatch {
        key,
        expected,
        found: found.kind(),
    }
}
