//! Arclength-parameterized Verlet for gravitating N-body systems.
//!
//! The kernel advances a fictitious time `s` by the step size and
//! reports the physical time it reached under `Key::AdvancedTime`. With
//! potential `U > 0`, kinetic energy `T` and the binding energy
//! `B = U − T` fixed at the start of the run, one step is
//!
//! ```text
//! drift   dt = (h/2) / (T + B)     q += dt·v
//! kick    dt = h / U(q)            v += dt·a(q)
//! drift   dt = (h/2) / (T + B)     q += dt·v
//! ```
//!
//! Close encounters shrink the physical time per step automatically. For
//! two bodies the map traces the Kepler ellipse exactly and only the time
//! along it carries error.

use stepwise_core::{Key, ModuleError, Ode, OdeError, Separable};
use stepwise_module::{Declarations, Module, StepContext};

use crate::verlet::separable_view;
use crate::KERNEL_INPUTS;

/// Point masses in three dimensions under Newtonian gravity.
///
/// State is `[q; v]` with `q` and `v` each holding `3·N` coordinates,
/// body by body.
#[derive(Clone, Debug, PartialEq)]
pub struct GravitationalSystem {
    masses: Vec<f64>,
    g: f64,
}

impl GravitationalSystem {
    /// Bodies with the given masses and gravitational constant `g`.
    pub fn new(masses: Vec<f64>, g: f64) -> Self {
        Self { masses, g }
    }

    /// Body masses.
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Number of bodies.
    pub fn bodies(&self) -> usize {
        self.masses.len()
    }

    /// `U = Σ_{i<j} g·m_i·m_j / r_ij`, positive for any configuration.
    pub fn potential(&self, q: &[f64]) -> f64 {
        let n = self.bodies();
        let mut u = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                u += self.g * self.masses[i] * self.masses[j] / distance(q, i, j);
            }
        }
        u
    }

    /// `T = ½·Σ m_i·|v_i|²`.
    pub fn kinetic(&self, v: &[f64]) -> f64 {
        self.masses
            .iter()
            .zip(v.chunks_exact(3))
            .map(|(m, vi)| 0.5 * m * vi.iter().map(|x| x * x).sum::<f64>())
            .sum()
    }

    /// Total energy `T − U` of a `[q; v]` state.
    pub fn energy(&self, y: &[f64]) -> f64 {
        let (q, v) = y.split_at(3 * self.bodies());
        self.kinetic(v) - self.potential(q)
    }
}

fn distance(q: &[f64], i: usize, j: usize) -> f64 {
    let dx = q[3 * j] - q[3 * i];
    let dy = q[3 * j + 1] - q[3 * i + 1];
    let dz = q[3 * j + 2] - q[3 * i + 2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

impl Ode for GravitationalSystem {
    fn dimension(&self) -> usize {
        6 * self.bodies()
    }

    fn rhs(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<(), OdeError> {
        let half = 3 * self.bodies();
        let (q, v) = y.split_at(half);
        let (dq, dv) = dydt.split_at_mut(half);
        dq.copy_from_slice(v);
        self.acceleration(t, q, dv)
    }

    fn separable(&self) -> Option<&dyn Separable> {
        Some(self)
    }
}

impl Separable for GravitationalSystem {
    fn acceleration(&self, _t: f64, q: &[f64], out: &mut [f64]) -> Result<(), OdeError> {
        out.fill(0.0);
        let n = self.bodies();
        for i in 0..n {
            for j in (i + 1)..n {
                let r = distance(q, i, j);
                if r == 0.0 {
                    return Err(OdeError::EvaluationFailed {
                        reason: format!("bodies {i} and {j} collided"),
                    });
                }
                let inv_r3 = self.g / (r * r * r);
                for k in 0..3 {
                    let d = (q[3 * j + k] - q[3 * i + k]) * inv_r3;
                    out[3 * i + k] += self.masses[j] * d;
                    out[3 * j + k] -= self.masses[i] * d;
                }
            }
        }
        Ok(())
    }
}

/// Leapfrog in arclength time for a [`GravitationalSystem`].
///
/// Only meaningful with a fixed step: the step size is a fictitious-time
/// increment, so error controllers comparing it to physical time do not
/// apply.
#[derive(Debug)]
pub struct ArclengthVerlet {
    system: GravitationalSystem,
    binding: f64,
    decls: Declarations,
}

impl ArclengthVerlet {
    /// Create the kernel for `system`. Accelerations are taken from the
    /// ODE handed to the solver, energies from `system`.
    pub fn new(system: GravitationalSystem) -> Self {
        Self {
            system,
            binding: 0.0,
            decls: Declarations::new()
                .require(KERNEL_INPUTS)
                .supply([Key::FinalValues, Key::Order, Key::AdvancedTime]),
        }
    }

    /// Binding energy `U − T` fixed by [`Module::begin`].
    pub fn binding_energy(&self) -> f64 {
        self.binding
    }
}

impl Module for ArclengthVerlet {
    fn name(&self) -> &str {
        "arclength_verlet"
    }

    fn declarations(&self) -> &Declarations {
        &self.decls
    }

    fn validate(&self, ode: &dyn Ode) -> Result<(), ModuleError> {
        separable_view(self.name(), ode)?;
        let expected = self.system.dimension();
        if ode.dimension() != expected {
            return Err(ModuleError::DimensionMismatch {
                expected,
                found: ode.dimension(),
            });
        }
        Ok(())
    }

    fn begin(&mut self, _t0: f64, _tf: f64, y0: &[f64]) -> Result<(), ModuleError> {
        let (q, v) = y0.split_at(3 * self.system.bodies());
        let u = self.system.potential(q);
        if !(u > 0.0 && u.is_finite()) {
            return Err(ModuleError::ExecutionFailed {
                reason: format!("arclength time needs a finite positive potential, got {u}"),
            });
        }
        self.binding = u - self.system.kinetic(v);
        Ok(())
    }

    fn step(&self, ctx: &mut StepContext<'_>) -> Result<(), ModuleError> {
        let bag = ctx.bag();
        let t0 = bag.initial_time()?;
        let ds = bag.step_size()?;
        let y0 = bag.initial_values()?;
        ctx.check_dimension(y0)?;
        let sep = separable_view(self.name(), ctx.ode())?;

        let half = 3 * self.system.bodies();
        let mut y1 = y0.to_vec();
        let mut acc = vec![0.0; half];
        let (q, v) = y1.split_at_mut(half);
        let mut t = t0;

        let drift = |q: &mut [f64], v: &[f64], t: &mut f64| {
            let dt = 0.5 * ds / (self.system.kinetic(v) + self.binding);
            for (qi, vi) in q.iter_mut().zip(v) {
                *qi += dt * vi;
            }
            *t += dt;
        };

        drift(q, v, &mut t);
        let dt = ds / self.system.potential(q);
        sep.acceleration(t, q, &mut acc)?;
        for (vi, ai) in v.iter_mut().zip(&acc) {
            *vi += dt * ai;
        }
        drift(q, v, &mut t);

        ctx.publish(Key::FinalValues, y1)?;
        ctx.publish(Key::Order, 2u32)?;
        ctx.publish(Key::AdvancedTime, t)
    }
}
