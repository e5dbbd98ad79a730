//! The [`Module`] trait and its key [`Declarations`].
//!
//! Modules are stateless per-step operators executed in dependency order.
//! Anything that must survive between steps lives in the solver-owned
//! [`StepHistory`](crate::StepHistory), which modules read through the
//! [`StepContext`].

use stepwise_core::{Key, KeySet, ModuleError, Ode};

use crate::context::StepContext;

/// The four key sets a module declares at construction.
///
/// - `requires`: must be present when the module runs.
/// - `supplies`: published by the module; the only keys it may write.
/// - `requests`: read if present, otherwise ignored.
/// - `requires_if_present`: promoted to `requires` when some other module
///   (or the solver) supplies the key in the final assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declarations {
    requires: KeySet,
    supplies: KeySet,
    requests: KeySet,
    requires_if_present: KeySet,
}

impl Declarations {
    /// Empty declarations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add required keys.
    pub fn require(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.requires.extend(keys);
        self
    }

    /// Add supplied keys.
    pub fn supply(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.supplies.extend(keys);
        self
    }

    /// Add requested keys.
    pub fn request(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.requests.extend(keys);
        self
    }

    /// Add required-if-present keys.
    pub fn require_if_present(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.requires_if_present.extend(keys);
        self
    }

    /// Keys that must be present.
    pub fn requires(&self) -> &KeySet {
        &self.requires
    }

    /// Keys this module publishes.
    pub fn supplies(&self) -> &KeySet {
        &self.supplies
    }

    /// Keys read opportunistically.
    pub fn requests(&self) -> &KeySet {
        &self.requests
    }

    /// Keys required only if someone else supplies them.
    pub fn requires_if_present(&self) -> &KeySet {
        &self.requires_if_present
    }

    /// Compose with the declarations of a wrapped module.
    ///
    /// Every set becomes the union of both; the outer declarations come
    /// first so diagnostics name the decorator's own keys before the
    /// inner module's.
    pub fn merge(&self, inner: &Declarations) -> Declarations {
        Declarations {
            requires: self.requires.union(&inner.requires),
            supplies: self.supplies.union(&inner.supplies),
            requests: self.requests.union(&inner.requests),
            requires_if_present: self.requires_if_present.union(&inner.requires_if_present),
        }
    }
}

/// One stage of the per-step pipeline.
///
/// # Contract
///
/// - `step()` takes `&self`: modules carry no mutable state between
///   steps. Step-to-step memory is read from [`StepContext::history`].
/// - `declarations()` is consulted once, at assembly.
/// - `step()` may only publish keys listed in its supplied set;
///   [`StepContext::publish`] enforces this.
///
/// # Object safety
///
/// This trait is object-safe; the solver stores modules as
/// `Vec<Box<dyn Module>>`.
///
/// # Examples
///
/// A module that publishes a constant stop flag:
///
/// ```
/// use stepwise_core::{Key, ModuleError};
/// use stepwise_module::{Declarations, Module, StepContext};
///
/// struct NeverStop {
///     decls: Declarations,
/// }
///
/// impl Module for NeverStop {
///     fn name(&self) -> &str { "never_stop" }
///
///     fn declarations(&self) -> &Declarations { &self.decls }
///
///     fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
///         ctx.publish(Key::Stop, false)
///     }
/// }
///
/// let m = NeverStop { decls: Declarations::new().supply([Key::Stop]) };
/// assert!(m.declarations().supplies().contains(Key::Stop));
/// ```
pub trait Module: Send + 'static {
    /// Human-readable name for diagnostics and timings.
    fn name(&self) -> &str;

    /// The module's key declarations.
    fn declarations(&self) -> &Declarations;

    /// Check compatibility with the ODE. Called once at assembly, before
    /// any right-hand side evaluation.
    fn validate(&self, _ode: &dyn Ode) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once before the first step with the integration interval
    /// and the initial state.
    fn begin(&mut self, _t0: f64, _tf: f64, _y0: &[f64]) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once after the run ends with the last accepted point.
    fn end(&mut self, _t: f64, _y: &[f64]) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Earliest time strictly after `t` the run must land on exactly.
    fn next_stop(&self, _t: f64) -> Option<f64> {
        None
    }

    /// Execute the module for one step attempt.
    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError>;
}
