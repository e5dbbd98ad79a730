//! Butcher tableaux: [`Scheme`] for single methods and
//! [`AdditiveScheme`] for IMEX pairs.
//!
//! Schemes are immutable once built and shared between modules through
//! `Arc<Scheme>`. Construction validates shape and finiteness; structural
//! requirements that depend on the consumer (explicitness, ESDIRK form)
//! are checked by the kernel that uses the scheme.

use crate::error::SchemeError;
use crate::linalg::DenseMatrix;

/// Tolerance used when comparing coefficients that should coincide
/// (FSAL rows, shared stage times, constant ESDIRK diagonals).
const COEFF_EPS: f64 = 1e-14;

/// An immutable Runge-Kutta tableau `(A, b, c[, b̂])` with its orders.
#[derive(Clone, Debug, PartialEq)]
pub struct Scheme {
    name: String,
    a: DenseMatrix,
    b: Vec<f64>,
    b_embedded: Option<Vec<f64>>,
    c: Vec<f64>,
    order: u32,
    embedded_order: Option<u32>,
    fsal: bool,
    interpolant: Interpolant,
}

fn check_finite(what: &'static str, values: &[f64]) -> Result<(), SchemeError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SchemeError::NonFiniteCoefficient { what })
    }
}

fn check_len(what: &'static str, expected: usize, found: usize) -> Result<(), SchemeError> {
    if expected == found {
        Ok(())
    } else {
        Err(SchemeError::ShapeMismatch {
            what,
            expected,
            found,
        })
    }
}

impl Scheme {
    /// Build a scheme from row-major `a`, weights `b`, stage times `c`
    /// and the order of the `b` solution.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError`] if the arrays disagree on the stage count,
    /// contain non-finite values, or `order` is zero.
    pub fn new(
        name: impl Into<String>,
        a: &[Vec<f64>],
        b: Vec<f64>,
        c: Vec<f64>,
        order: u32,
    ) -> Result<Self, SchemeError> {
        let s = b.len();
        if s == 0 {
            return Err(SchemeError::NoStages);
        }
        check_len("a", s, a.len())?;
        for row in a {
            check_len("a row", s, row.len())?;
            check_finite("a", row)?;
        }
        check_len("c", s, c.len())?;
        check_finite("b", &b)?;
        check_finite("c", &c)?;
        if order == 0 {
            return Err(SchemeError::ZeroOrder);
        }
        let a = DenseMatrix::from_rows(a).ok_or(SchemeError::ShapeMismatch {
            what: "a row",
            expected: s,
            found: 0,
        })?;
        Ok(Self {
            name: name.into(),
            a,
            b,
            b_embedded: None,
            c,
            order,
            embedded_order: None,
            fsal: false,
            interpolant: Interpolant::for_order(order),
        })
    }

    /// Assemble a built-in tableau without validation. Every caller is
    /// covered by a test in `tableau` that re-validates the result.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn builtin(
        name: &str,
        a: &[Vec<f64>],
        b: Vec<f64>,
        c: Vec<f64>,
        order: u32,
        embedded: Option<(Vec<f64>, u32)>,
        fsal: bool,
    ) -> Self {
        let s = b.len();
        let mut matrix = DenseMatrix::zeros(s, s);
        for (i, row) in a.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                matrix.set(i, j, v);
            }
        }
        let (b_embedded, embedded_order) = match embedded {
            Some((w, o)) => (Some(w), Some(o)),
            None => (None, None),
        };
        Self {
            name: name.to_string(),
            a: matrix,
            b,
            b_embedded,
            c,
            order,
            embedded_order,
            fsal,
            interpolant: Interpolant::for_order(order),
        }
    }

    /// Attach an embedded weight vector `b̂` of the given order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError`] if `b̂` has the wrong length, is non-finite,
    /// or `order` is zero.
    pub fn with_embedded(mut self, b_embedded: Vec<f64>, order: u32) -> Result<Self, SchemeError> {
        check_len("b_embedded", self.stages(), b_embedded.len())?;
        check_finite("b_embedded", &b_embedded)?;
        if order == 0 {
            return Err(SchemeError::ZeroOrder);
        }
        self.b_embedded = Some(b_embedded);
        self.embedded_order = Some(order);
        Ok(self)
    }

    /// Declare the scheme first-same-as-last.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotFsal`] unless the first stage is at
    /// `c = 0` with an empty row, the last stage is at `c = 1`, and the
    /// last row of `A` equals `b`.
    pub fn with_fsal(mut self) -> Result<Self, SchemeError> {
        let s = self.stages();
        let last = self.a.row(s - 1);
        let row_matches = last
            .iter()
            .zip(&self.b)
            .all(|(a, b)| (a - b).abs() <= COEFF_EPS);
        let first_empty = self.a.row(0).iter().all(|&v| v == 0.0);
        if !row_matches
            || !first_empty
            || self.c[0] != 0.0
            || (self.c[s - 1] - 1.0).abs() > COEFF_EPS
        {
            return Err(SchemeError::NotFsal);
        }
        self.fsal = true;
        Ok(self)
    }

    /// Replace the dense-output interpolant chosen from the order.
    pub fn with_interpolant(mut self, interpolant: Interpolant) -> Self {
        self.interpolant = interpolant;
        self
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages `s`.
    pub fn stages(&self) -> usize {
        self.b.len()
    }

    /// Coefficient `a[i][j]`.
    pub fn a(&self, i: usize, j: usize) -> f64 {
        self.a.get(i, j)
    }

    /// Row `i` of `A`.
    pub fn a_row(&self, i: usize) -> &[f64] {
        self.a.row(i)
    }

    /// Weights of the propagated solution.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Embedded weights, if any.
    pub fn b_embedded(&self) -> Option<&[f64]> {
        self.b_embedded.as_deref()
    }

    /// Stage times as fractions of the step.
    pub fn c(&self) -> &[f64] {
        &self.c
    }

    /// Order of the propagated solution.
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Order of the embedded solution, if any.
    pub fn embedded_order(&self) -> Option<u32> {
        self.embedded_order
    }

    /// Whether an embedded companion solution is available.
    pub fn is_embedded(&self) -> bool {
        self.b_embedded.is_some()
    }

    /// Whether the last stage doubles as the first stage of the next step.
    pub fn is_fsal(&self) -> bool {
        self.fsal
    }

    /// Dense output between the ends of an accepted step.
    pub fn interpolant(&self) -> Interpolant {
        self.interpolant
    }

    /// Order used for step-size control: the lower of the two orders
    /// for embedded schemes, the method order otherwise.
    pub fn control_order(&self) -> u32 {
        match self.embedded_order {
            Some(e) => e.min(self.order),
            None => self.order,
        }
    }

    /// Check that `A` is strictly lower triangular.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotExplicit`] naming the first offending entry.
    pub fn check_explicit(&self) -> Result<(), SchemeError> {
        let s = self.stages();
        for i in 0..s {
            for j in i..s {
                if self.a.get(i, j) != 0.0 {
                    return Err(SchemeError::NotExplicit { row: i, col: j });
                }
            }
        }
        Ok(())
    }

    /// Whether `A` is strictly lower triangular.
    pub fn is_explicit(&self) -> bool {
        self.check_explicit().is_ok()
    }

    /// Check the ESDIRK structure and return the shared diagonal `γ`.
    ///
    /// The first stage must be explicit (`a[0][·] = 0`), `A` lower
    /// triangular, and every later diagonal entry equal and non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError::NotEsdirk`] describing the violation.
    pub fn esdirk_gamma(&self) -> Result<f64, SchemeError> {
        let s = self.stages();
        if s < 2 {
            return Err(SchemeError::NotEsdirk {
                reason: "needs at least two stages".into(),
            });
        }
        if self.a.row(0).iter().any(|&v| v != 0.0) {
            return Err(SchemeError::NotEsdirk {
                reason: "first stage is not explicit".into(),
            });
        }
        let gamma = self.a.get(1, 1);
        if gamma == 0.0 {
            return Err(SchemeError::NotEsdirk {
                reason: "diagonal entry is zero".into(),
            });
        }
        for i in 1..s {
            if (self.a.get(i, i) - gamma).abs() > COEFF_EPS {
                return Err(SchemeError::NotEsdirk {
                    reason: format!("diagonal a[{i}][{i}] differs from a[1][1]"),
                });
            }
            for j in (i + 1)..s {
                if self.a.get(i, j) != 0.0 {
                    return Err(SchemeError::NotEsdirk {
                        reason: format!("entry a[{i}][{j}] above the diagonal"),
                    });
                }
            }
        }
        Ok(gamma)
    }
}

// ── Dense output ───────────────────────────────────────────────────

/// How a state inside an accepted step is reconstructed from its ends.
///
/// Both variants use only `(y0, f0)` at the start and `(y1, f1)` at the
/// end, so any kernel can be interpolated without keeping its stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolant {
    /// Straight line from `y0` to `y1`. Derivatives are ignored.
    Linear,
    /// Cubic Hermite through `(y0, f0)` and `(y1, f1)`; third order.
    CubicHermite,
}

impl Interpolant {
    /// Linear for first-order methods, cubic Hermite otherwise.
    pub fn for_order(order: u32) -> Self {
        if order <= 1 {
            Self::Linear
        } else {
            Self::CubicHermite
        }
    }

    /// Whether [`eval`](Interpolant::eval) reads `f0` and `f1`.
    pub fn needs_derivatives(self) -> bool {
        matches!(self, Self::CubicHermite)
    }

    /// Write the state at fraction `theta ∈ [0, 1]` of a step of size `h`
    /// into `out`.
    ///
    /// # Panics
    ///
    /// Panics if `y1`, or `f0` and `f1` when derivatives are needed, are
    /// shorter than `y0`.
    #[allow(clippy::too_many_arguments)]
    pub fn eval(
        self,
        theta: f64,
        h: f64,
        y0: &[f64],
        y1: &[f64],
        f0: &[f64],
        f1: &[f64],
        out: &mut [f64],
    ) {
        match self {
            Self::Linear => {
                for (i, o) in out.iter_mut().enumerate().take(y0.len()) {
                    *o = y0[i] + theta * (y1[i] - y0[i]);
                }
            }
            Self::CubicHermite => {
                let t2 = theta * theta;
                let t3 = t2 * theta;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + theta;
                let h01 = 3.0 * t2 - 2.0 * t3;
                let h11 = t3 - t2;
                for (i, o) in out.iter_mut().enumerate().take(y0.len()) {
                    *o = h00 * y0[i] + h10 * h * f0[i] + h01 * y1[i] + h11 * h * f1[i];
                }
            }
        }
    }
}

// ── Additive (IMEX) pairs ──────────────────────────────────────────

/// Two tableaux sharing stage times: an explicit one for the non-stiff
/// part and an ESDIRK one for the stiff part.
#[derive(Clone, Debug, PartialEq)]
pub struct AdditiveScheme {
    name: String,
    explicit: Scheme,
    implicit: Scheme,
    gamma: f64,
}

impl AdditiveScheme {
    /// Pair an explicit tableau with an ESDIRK tableau.
    ///
    /// # Errors
    ///
    /// Returns [`SchemeError`] if the stage counts or stage times differ,
    /// the explicit half has entries on or above the diagonal, or the
    /// implicit half is not ESDIRK.
    pub fn new(
        name: impl Into<String>,
        explicit: Scheme,
        implicit: Scheme,
    ) -> Result<Self, SchemeError> {
        check_len("implicit stages", explicit.stages(), implicit.stages())?;
        for (i, (ce, ci)) in explicit.c().iter().zip(implicit.c()).enumerate() {
            if (ce - ci).abs() > COEFF_EPS {
                return Err(SchemeError::StageTimeMismatch { stage: i });
            }
        }
        explicit.check_explicit()?;
        let gamma = implicit.esdirk_gamma()?;
        Ok(Self {
            name: name.into(),
            explicit,
            implicit,
            gamma,
        })
    }

    pub(crate) fn from_checked_parts(
        name: &str,
        explicit: Scheme,
        implicit: Scheme,
        gamma: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            explicit,
            implicit,
            gamma,
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The explicit (non-stiff) tableau.
    pub fn explicit(&self) -> &Scheme {
        &self.explicit
    }

    /// The ESDIRK (stiff) tableau.
    pub fn implicit(&self) -> &Scheme {
        &self.implicit
    }

    /// Number of stages.
    pub fn stages(&self) -> usize {
        self.explicit.stages()
    }

    /// Shared stage times.
    pub fn c(&self) -> &[f64] {
        self.explicit.c()
    }

    /// Constant implicit diagonal `γ`.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Order of the combined method.
    pub fn order(&self) -> u32 {
        self.explicit.order().min(self.implicit.order())
    }

    /// Order of the combined embedded solution. Present only when both
    /// halves carry embedded weights.
    pub fn embedded_order(&self) -> Option<u32> {
        match (self.explicit.embedded_order(), self.implicit.embedded_order()) {
            (Some(e), Some(i)) => Some(e.min(i)),
            _ => None,
        }
    }

    /// Whether both halves carry embedded weights.
    pub fn is_embedded(&self) -> bool {
        self.embedded_order().is_some()
    }

    /// Order used for step-size control.
    pub fn control_order(&self) -> u32 {
        match self.embedded_order() {
            Some(e) => e.min(self.order()),
            None => self.order(),
        }
    }
}
