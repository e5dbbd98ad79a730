//! Reusable mock modules.
//!
//! - [`ConstantModule`]: publishes fixed values, requires nothing else.
//! - [`FailingModule`]: fails deterministically after N calls.
//! - [`RecordingModule`]: records the step start time of every attempt.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stepwise_core::{Key, ModuleError, Value};
use stepwise_module::{Declarations, Module, StepContext};

/// Publishes a fixed list of `(key, value)` pairs every step.
pub struct ConstantModule {
    pub name: String,
    decls: Declarations,
    values: Vec<(Key, Value)>,
}

impl ConstantModule {
    pub fn new(name: impl Into<String>, values: Vec<(Key, Value)>) -> Self {
        let decls = Declarations::new().supply(values.iter().map(|(k, _)| *k));
        Self {
            name: name.into(),
            decls,
            values,
        }
    }

    /// Add required keys (read and ignored).
    pub fn requiring(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.decls = self.decls.require(keys);
        self
    }
}

impl Module for ConstantModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        for (key, value) in &self.values {
            ctx.publish(*key, value.clone())?;
        }
        Ok(())
    }
}

/// Succeeds `succeed_for` times, then fails with `ExecutionFailed`.
pub struct FailingModule {
    pub name: String,
    decls: Declarations,
    succeed_for: usize,
    calls: AtomicUsize,
}

impl FailingModule {
    pub fn new(name: impl Into<String>, succeed_for: usize) -> Self {
        Self {
            name: name.into(),
            decls: Declarations::new().require([Key::InitialTime]),
            succeed_for,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Module for FailingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, _ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_for {
            return Err(ModuleError::ExecutionFailed {
                reason: format!("failed at call {n}"),
            });
        }
        Ok(())
    }
}

/// Records `(initial_time, step_size)` of every attempt into a shared log.
pub struct RecordingModule {
    pub name: String,
    decls: Declarations,
    log: Arc<Mutex<Vec<(f64, f64)>>>,
}

impl RecordingModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            decls: Declarations::new().require([Key::InitialTime, Key::StepSize]),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the log; clone before boxing the module.
    pub fn log(&self) -> Arc<Mutex<Vec<(f64, f64)>>> {
        Arc::clone(&self.log)
    }
}

impl Module for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let t = ctx.bag().initial_time()?;
        let h = ctx.bag().step_size()?;
        self.log
            .lock()
            .map_err(|_| ModuleError::ExecutionFailed {
                reason: "log poisoned".into(),
            })?
            .push((t, h));
        Ok(())
    }
}
