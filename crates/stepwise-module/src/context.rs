//! Execution context passed to modules during a step attempt.
//!
//! [`StepContext`] gives a module read access to the property bag, the
//! ODE and the solver's [`StepHistory`], and write access restricted to
//! the keys the module declared as supplied.

use stepwise_core::{Key, KeySet, ModuleError, Ode, PropertyBag, Value};

use crate::history::StepHistory;

/// Execution context passed to each module's `step()` method.
pub struct StepContext<'a> {
    bag: &'a mut PropertyBag,
    ode: &'a dyn Ode,
    history: &'a StepHistory,
    module: &'a str,
    supplies: &'a KeySet,
}

impl<'a> StepContext<'a> {
    /// Construct a context for one module.
    ///
    /// Typically called by the solver. Decorators construct nested
    /// contexts over scratch bags to re-invoke a wrapped module.
    pub fn new(
        bag: &'a mut PropertyBag,
        ode: &'a dyn Ode,
        history: &'a StepHistory,
        module: &'a str,
        supplies: &'a KeySet,
    ) -> Self {
        Self {
            bag,
            ode,
            history,
            module,
            supplies,
        }
    }

    /// The shared property bag, as filled by earlier modules.
    pub fn bag(&self) -> &PropertyBag {
        self.bag
    }

    /// The ODE being integrated.
    pub fn ode(&self) -> &'a dyn Ode {
        self.ode
    }

    /// Outcome of previous attempts.
    pub fn history(&self) -> &'a StepHistory {
        self.history
    }

    /// Name of the module this context was built for.
    pub fn module_name(&self) -> &str {
        self.module
    }

    /// Publish a value under a declared key, replacing any earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::UndeclaredSupply`] if `key` is not in the
    /// module's supplied set.
    pub fn publish(&mut self, key: Key, value: impl Into<Value>) -> Result<(), ModuleError> {
        if !self.supplies.contains(key) {
            return Err(ModuleError::UndeclaredSupply {
                module: self.module.to_string(),
                key,
            });
        }
        self.bag.insert(key, value);
        Ok(())
    }

    /// Fail with [`ModuleError::DimensionMismatch`] unless `v` has the
    /// ODE dimension.
    pub fn check_dimension(&self, v: &[f64]) -> Result<(), ModuleError> {
        let expected = self.ode.dimension();
        if v.len() != expected {
            return Err(ModuleError::DimensionMismatch {
                expected,
                found: v.len(),
            });
        }
        Ok(())
    }
}
