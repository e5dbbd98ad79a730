//! Publishes `∂f/∂y` at the start of each step.

use stepwise_core::{DenseMatrix, Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

/// Evaluates the Jacobian once per step at `(t0, y0)`.
///
/// When the ODE has a native additive split the Jacobian of its stiff
/// part is published; otherwise the Jacobian of the full right-hand
/// side. Either comes from the ODE's analytic implementation if it has
/// one, central differences otherwise.
#[derive(Debug)]
pub struct JacobianModule {
    decls: Declarations,
}

impl JacobianModule {
    /// Create the module.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require([Key::InitialTime, Key::InitialValues])
                .supply([Key::Jacobian]),
        }
    }
}

impl Default for JacobianModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for JacobianModule {
    fn name(&self) -> &str {
        "jacobian"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let t0 = ctx.bag().initial_time()?;
        let y0 = ctx.bag().initial_values()?;
        ctx.check_dimension(y0)?;
        let n = y0.len();
        let mut jac = DenseMatrix::zeros(n, n);
        let ode = ctx.ode();
        match ode.additive() {
            Some(split) => split.stiff_jacobian(t0, y0, &mut jac)?,
            None => ode.jacobian(t0, y0, &mut jac)?,
        }
        ctx.publish(Key::Jacobian, jac)
    }
}
