//! Explicit Runge-Kutta kernel for an arbitrary tableau.
//!
//! Stages are `k_i = f(t0 + c_i·h, y0 + h·Σ_{j<i} a_ij·k_j)` and the step
//! result is `y1 = y0 + h·Σ b_i·k_i`. An embedded `b̂` reuses the same
//! stages. For FSAL tableaux the last stage is published as
//! `final_derivative`, and the first stage of the next step is taken from
//! the solver's history when the step starts exactly where the cached
//! derivative was evaluated.

use std::sync::Arc;

use stepwise_core::{Key, ModuleError, Scheme, SchemeError};
use stepwise_module::{Declarations, Module, StepContext};

use crate::vecops::combine;
use crate::KERNEL_INPUTS;

/// Explicit Runge-Kutta stepping kernel.
#[derive(Debug)]
pub struct ExplicitRk {
    name: String,
    scheme: Arc<Scheme>,
    decls: Declarations,
}

impl ExplicitRk {
    /// Create a kernel for `scheme`.
    ///
    /// # Errors
    ///
    /// [`SchemeError::NotExplicit`] if `A` has entries on or above the
    /// diagonal.
    pub fn new(scheme: Arc<Scheme>) -> Result<Self, SchemeError> {
        scheme.check_explicit()?;
        let mut decls = Declarations::new()
            .require(KERNEL_INPUTS)
            .supply([Key::FinalValues, Key::Order, Key::Scheme]);
        if scheme.is_embedded() {
            decls = decls.supply([Key::FinalValuesEmbedded, Key::EmbeddedOrder]);
        }
        if scheme.is_fsal() {
            decls = decls.supply([Key::FinalDerivative]);
        }
        Ok(Self {
            name: format!("explicit_rk({})", scheme.name()),
            scheme,
            decls,
        })
    }

    /// The tableau.
    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }
}

impl Module for ExplicitRk {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let scheme = &self.scheme;
        let bag = ctx.bag();
        let t0 = bag.initial_time()?;
        let h = bag.step_size()?;
        let y0 = bag.initial_values()?;
        ctx.check_dimension(y0)?;

        let n = y0.len();
        let s = scheme.stages();
        let mut k = vec![vec![0.0; n]; s];
        let mut stage_state = vec![0.0; n];

        for i in 0..s {
            if i == 0 && scheme.is_fsal() {
                if let Some(cached) = ctx.history().derivative_at(t0, y0) {
                    k[0].copy_from_slice(cached);
                    continue;
                }
            }
            combine(&mut stage_state, y0, h, &scheme.a_row(i)[..i], &k[..i]);
            ctx.ode()
                .rhs(t0 + scheme.c()[i] * h, &stage_state, &mut k[i])?;
        }

        // FSAL: the last stage state is the step result, bit for bit.
        let y1 = if scheme.is_fsal() {
            stage_state.clone()
        } else {
            let mut y1 = vec![0.0; n];
            combine(&mut y1, y0, h, scheme.b(), &k);
            y1
        };
        let embedded = scheme.b_embedded().map(|b_hat| {
            let mut y_hat = vec![0.0; n];
            combine(&mut y_hat, y0, h, b_hat, &k);
            y_hat
        });

        ctx.publish(Key::FinalValues, y1)?;
        ctx.publish(Key::Order, scheme.order())?;
        ctx.publish(Key::Scheme, Arc::clone(scheme))?;
        if let (Some(y_hat), Some(order)) = (embedded, scheme.embedded_order()) {
            ctx.publish(Key::FinalValuesEmbedded, y_hat)?;
            ctx.publish(Key::EmbeddedOrder, order)?;
        }
        if scheme.is_fsal() {
            let last = k.pop().unwrap_or_default();
            ctx.publish(Key::FinalDerivative, last)?;
        }
        Ok(())
    }
}
