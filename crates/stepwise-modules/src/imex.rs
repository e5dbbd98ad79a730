//! Additive IMEX kernel: explicit RK for the non-stiff part, ESDIRK for
//! the stiff part.
//!
//! Each step:
//!
//! 1. Read `J = ∂f_I/∂y` at `(t0, y0)` from the bag and factor the
//!    iteration matrix `M = I − h·γ·J` once.
//! 2. For each stage `i`, form the explicit predictor
//!    `Z_i = y0 + h·Σ_{j<i} (aE_ij·kE_j + aI_ij·kI_j)`, solve
//!    `M·kI_i = f_I(t_i, Z_i)` (one linearized Newton step, exact for a
//!    linear stiff part), set `Y_i = Z_i + h·γ·kI_i`, then evaluate
//!    `kE_i = f_E(t_i, Y_i)`. Stage 0 is explicit in both halves.
//! 3. `y1 = y0 + h·Σ (bE_i·kE_i + bI_i·kI_i)`, and likewise for the
//!    embedded weights.
//!
//! Without a native split the kernel splits automatically around the
//! step-start Jacobian: `f_I(y) = J·y`, `f_E(t, y) = f(t, y) − J·y`.
//!
//! A singular iteration matrix is reported as
//! [`ModuleError::LinearSolveFailure`] instead of producing non-finite
//! stages.

use std::sync::Arc;

use stepwise_core::{AdditiveScheme, DenseMatrix, Key, ModuleError, Ode};
use stepwise_module::{Declarations, Module, StepContext};

use crate::vecops::accumulate;
use crate::KERNEL_INPUTS;

/// IMEX additive Runge-Kutta kernel.
#[derive(Debug)]
pub struct Imex {
    name: String,
    scheme: Arc<AdditiveScheme>,
    decls: Declarations,
}

impl Imex {
    /// Create a kernel for an additive pair. The pair's structure is
    /// validated by [`AdditiveScheme::new`].
    pub fn new(scheme: Arc<AdditiveScheme>) -> Self {
        let mut decls = Declarations::new()
            .require(KERNEL_INPUTS)
            .require([Key::Jacobian])
            .supply([Key::FinalValues, Key::Order]);
        if scheme.is_embedded() {
            decls = decls.supply([Key::FinalValuesEmbedded, Key::EmbeddedOrder]);
        }
        Self {
            name: format!("imex({})", scheme.name()),
            scheme,
            decls,
        }
    }

    /// The additive pair.
    pub fn scheme(&self) -> &Arc<AdditiveScheme> {
        &self.scheme
    }
}

/// The two halves of the right-hand side seen by the kernel.
enum Split<'a> {
    Native(&'a dyn stepwise_core::AdditiveOde),
    Linearized { ode: &'a dyn Ode, jac: &'a DenseMatrix },
}

impl Split<'_> {
    fn stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), ModuleError> {
        match self {
            Self::Native(split) => split.stiff(t, y, out)?,
            Self::Linearized { jac, .. } => jac.mul_vec(y, out),
        }
        Ok(())
    }

    fn non_stiff(&self, t: f64, y: &[f64], out: &mut [f64]) -> Result<(), ModuleError> {
        match self {
            Self::Native(split) => split.non_stiff(t, y, out)?,
            Self::Linearized { ode, jac } => {
                ode.rhs(t, y, out)?;
                let mut linear = vec![0.0; y.len()];
                jac.mul_vec(y, &mut linear);
                for (o, l) in out.iter_mut().zip(&linear) {
                    *o -= l;
                }
            }
        }
        Ok(())
    }
}

impl Module for Imex {
    fn name(&self) -> &str {
        &self.name
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let ex = self.scheme.explicit();
        let im = self.scheme.implicit();
        let gamma = self.scheme.gamma();

        let bag = ctx.bag();
        let t0 = bag.initial_time()?;
        let h = bag.step_size()?;
        let y0 = bag.initial_values()?;
        let jac = bag.matrix(Key::Jacobian)?;
        ctx.check_dimension(y0)?;
        let n = y0.len();
        if jac.rows() != n || jac.cols() != n {
            return Err(ModuleError::DimensionMismatch {
                expected: n,
                found: jac.rows(),
            });
        }

        let ode = ctx.ode();
        let split = match ode.additive() {
            Some(native) => Split::Native(native),
            None => Split::Linearized { ode, jac },
        };

        let lu = jac
            .shifted_identity(h * gamma)
            .lu_scaled(1.0 + h * gamma * jac.norm_inf())
            .map_err(|e| ModuleError::LinearSolveFailure {
                stage: 1,
                pivot: e.pivot,
            })?;

        let s = self.scheme.stages();
        let c = self.scheme.c();
        let mut k_ex = vec![vec![0.0; n]; s];
        let mut k_im = vec![vec![0.0; n]; s];
        let mut z = vec![0.0; n];

        split.stiff(t0, y0, &mut k_im[0])?;
        split.non_stiff(t0, y0, &mut k_ex[0])?;

        for i in 1..s {
            let ti = t0 + c[i] * h;
            z.copy_from_slice(y0);
            accumulate(&mut z, h, &ex.a_row(i)[..i], &k_ex[..i]);
            accumulate(&mut z, h, &im.a_row(i)[..i], &k_im[..i]);

            split.stiff(ti, &z, &mut k_im[i])?;
            lu.solve_in_place(&mut k_im[i]);

            for (zj, kj) in z.iter_mut().zip(&k_im[i]) {
                *zj += h * gamma * kj;
            }
            split.non_stiff(ti, &z, &mut k_ex[i])?;
        }

        let mut y1 = y0.to_vec();
        accumulate(&mut y1, h, ex.b(), &k_ex);
        accumulate(&mut y1, h, im.b(), &k_im);

        let embedded = match (ex.b_embedded(), im.b_embedded()) {
            (Some(be), Some(bi)) => {
                let mut y_hat = y0.to_vec();
                accumulate(&mut y_hat, h, be, &k_ex);
                accumulate(&mut y_hat, h, bi, &k_im);
                Some(y_hat)
            }
            _ => None,
        };

        ctx.publish(Key::FinalValues, y1)?;
        ctx.publish(Key::Order, self.scheme.order())?;
        if let (Some(y_hat), Some(order)) = (embedded, self.scheme.embedded_order()) {
            ctx.publish(Key::FinalValuesEmbedded, y_hat)?;
            ctx.publish(Key::EmbeddedOrder, order)?;
        }
        Ok(())
    }
}
