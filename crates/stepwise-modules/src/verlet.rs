//! Störmer-Verlet kernel for separable second-order systems.
//!
//! State layout is `[q; v]`. One step is a half kick, a full drift and a
//! second half kick:
//!
//! ```text
//! v½ = v0 + h/2·a(t0, q0)
//! q1 = q0 + h·v½
//! v1 = v½ + h/2·a(t0 + h, q1)
//! ```

use stepwise_core::{Key, ModuleError, Ode, Separable};
use stepwise_module::{Declarations, Module, StepContext};

use crate::KERNEL_INPUTS;

/// Symplectic kick-drift-kick kernel, order 2.
#[derive(Debug)]
pub struct StormerVerlet {
    decls: Declarations,
}

impl StormerVerlet {
    /// Create the kernel.
    pub fn new() -> Self {
        Self {
            decls: Declarations::new()
                .require(KERNEL_INPUTS)
                .supply([Key::FinalValues, Key::Order]),
        }
    }
}

impl Default for StormerVerlet {
    fn default() -> Self {
        Self::new()
    }
}

/// The ODE's separable view, or an error naming `module`.
pub(crate) fn separable_view<'o>(
    module: &str,
    ode: &'o dyn Ode,
) -> Result<&'o dyn Separable, ModuleError> {
    let Some(sep) = ode.separable() else {
        return Err(ModuleError::ExecutionFailed {
            reason: format!("{module} needs an ODE with a separable acceleration"),
        });
    };
    if ode.dimension() % 2 != 0 {
        return Err(ModuleError::ExecutionFailed {
            reason: format!(
                "{module} needs a [q; v] state of even length, got {}",
                ode.dimension()
            ),
        });
    }
    Ok(sep)
}

impl Module for StormerVerlet {
    fn name(&self) -> &str {
        "stormer_verlet"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn validate(&self, ode: &dyn Ode) -> Result<(), ModuleError> {
        separable_view(self.name(), ode).map(|_| ())
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let t0 = bag.initial_time()?;
        let h = bag.step_size()?;
        let y0 = bag.initial_values()?;
        ctx.check_dimension(y0)?;
        let sep = separable_view(self.name(), ctx.ode())?;

        let m = y0.len() / 2;
        let mut y1 = y0.to_vec();
        let mut acc = vec![0.0; m];
        let (q, v) = y1.split_at_mut(m);

        sep.acceleration(t0, q, &mut acc)?;
        for (vi, ai) in v.iter_mut().zip(&acc) {
            *vi += 0.5 * h * ai;
        }
        for (qi, vi) in q.iter_mut().zip(v.iter()) {
            *qi += h * vi;
        }
        sep.acceleration(t0 + h, q, &mut acc)?;
        for (vi, ai) in v.iter_mut().zip(&acc) {
            *vi += 0.5 * h * ai;
        }

        ctx.publish(Key::FinalValues, y1)?;
        ctx.publish(Key::Order, 2u32)
    }
}
