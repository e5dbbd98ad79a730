//! Forward Euler kernel.

use stepwise_core::{Key, ModuleError};
use stepwise_module::{Declarations, Module, StepContext};

use crate::KERNEL_INPUTS;

/// `y1 = y0 + h·f(t0, y0)`, order 1.
#[derive(Debug)]
pub struct ForwardEuler {
    decls: Declarations,
}

impl ForwardEuler {
    /// Create the kernel.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require(KERNEL_INPUTS)
                .supply([Key::FinalValues, Key::Order]),
        }
    }
}

impl Default for ForwardEuler {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ForwardEuler {
    fn name(&self) -> &str {
        "forward_euler"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let t0 = bag.initial_time()?;
        let h = bag.step_size()?;
        let y0 = bag.initial_values()?;
        ctx.check_dimension(y0)?;

        let mut dydt = vec![0.0; y0.len()];
        ctx.ode().rhs(t0, y0, &mut dydt)?;
        let y1: Vec<f64> = y0.iter().zip(&dydt).map(|(y, d)| y + h * d).collect();

        ctx.publish(Key::FinalValues, y1)?;
        ctx.publish(Key::Order, 1u32)
    }
}
