//! Small dense matrices and LU factorization for implicit stage solves.
//!
//! Only what the IMEX kernel needs: a row-major [`DenseMatrix`], a
//! matrix-vector product, and LU with partial pivoting that reports a
//! singular pivot instead of producing non-finite values.

use std::error::Error;
use std::fmt;

/// Relative pivot tolerance: an `n × n` factorization at reference scale
/// `s` treats pivots at or below `n · PIVOT_TOLERANCE · s` as singular.
pub const PIVOT_TOLERANCE: f64 = 64.0 * f64::EPSILON;

/// A dense row-major `rows × cols` matrix of `f64`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create an `n × n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Build a matrix from row vectors. Returns `None` if rows are ragged.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Element `(i, j)`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Set element `(i, j)`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Flat row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Resize to `rows × cols` and zero every element.
    pub fn reset(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(rows * cols, 0.0);
    }

    /// `out = self · x`.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != cols` or `out.len() != rows`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        assert_eq!(x.len(), self.cols, "mul_vec: x has wrong length");
        assert_eq!(out.len(), self.rows, "mul_vec: out has wrong length");
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.row(i).iter().zip(x).map(|(a, b)| a * b).sum();
        }
    }

    /// Build the iteration matrix `I − scale·self` used by diagonally
    /// implicit stages.
    pub fn shifted_identity(&self, scale: f64) -> Self {
        let n = self.rows;
        let mut m = Self::zeros(n, self.cols);
        for i in 0..n {
            for j in 0..self.cols {
                let id = if i == j { 1.0 } else { 0.0 };
                m.data[i * self.cols + j] = id - scale * self.get(i, j);
            }
        }
        m
    }

    /// Maximum absolute row sum, `‖A‖∞`.
    pub fn norm_inf(&self) -> f64 {
        (0..self.rows)
            .map(|i| self.row(i).iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// Factor a square matrix as `P·A = L·U` with partial pivoting,
    /// judging pivots against `‖A‖∞`.
    pub fn lu(&self) -> Result<LuFactors, SingularMatrix> {
        self.lu_scaled(self.norm_inf())
    }

    /// Factor with pivots judged against an explicit reference scale.
    ///
    /// Use this when the matrix is a difference of larger terms, such as
    /// `I − hγJ`, whose own norm hides cancellation.
    pub fn lu_scaled(&self, scale: f64) -> Result<LuFactors, SingularMatrix> {
        let threshold = self.rows as f64 * PIVOT_TOLERANCE * scale;
        LuFactors::factor(self.clone(), threshold)
    }
}

/// A singular (or numerically singular) matrix was passed to [`DenseMatrix::lu`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SingularMatrix {
    /// Elimination column where no usable pivot was found.
    pub column: usize,
    /// Magnitude of the best pivot candidate.
    pub pivot: f64,
}

impl fmt::Display for SingularMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "singular matrix: pivot {:e} in column {}",
            self.pivot, self.column
        )
    }
}

impl Error for SingularMatrix {}

/// In-place LU factors of a square matrix.
#[derive(Clone, Debug)]
pub struct LuFactors {
    lu: DenseMatrix,
    pivot: Vec<usize>,
}

impl LuFactors {
    fn factor(mut a: DenseMatrix, threshold: f64) -> Result<Self, SingularMatrix> {
        let n = a.rows;
        debug_assert_eq!(n, a.cols, "LU requires a square matrix");
        let mut pivot: Vec<usize> = (0..n).collect();
        for k in 0..n {
            let mut max_val = a.get(k, k).abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let v = a.get(i, k).abs();
                if v > max_val {
                    max_val = v;
                    max_row = i;
                }
            }
            if !max_val.is_finite() || max_val <= threshold {
                return Err(SingularMatrix {
                    column: k,
                    pivot: max_val,
                });
            }
            if max_row != k {
                pivot.swap(k, max_row);
                for j in 0..n {
                    a.data.swap(k * n + j, max_row * n + j);
                }
            }
            let akk = a.get(k, k);
            for i in (k + 1)..n {
                let lik = a.get(i, k) / akk;
                a.set(i, k, lik);
                for j in (k + 1)..n {
                    let v = a.get(i, j) - lik * a.get(k, j);
                    a.set(i, j, v);
                }
            }
        }
        Ok(Self { lu: a, pivot })
    }

    /// Dimension of the factored matrix.
    pub fn dim(&self) -> usize {
        self.lu.rows
    }

    /// Solve `A·x = b`, overwriting `b` with `x`.
    ///
    /// # Panics
    ///
    /// Panics if `b.len()` differs from the factored dimension.
    pub fn solve_in_place(&self, b: &mut [f64]) {
        let n = self.dim();
        assert_eq!(b.len(), n, "solve_in_place: rhs has wrong length");
        let mut pb: Vec<f64> = self.pivot.iter().map(|&p| b[p]).collect();

        for i in 0..n {
            for j in 0..i {
                pb[i] -= self.lu.get(i, j) * pb[j];
            }
        }
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                pb[i] -= self.lu.get(i, j) * pb[j];
            }
            pb[i] /= self.lu.get(i, i);
        }
        b.copy_from_slice(&pb);
    }
}
