//! Single-threaded CPU kernels
//!
//! # CPU Backend
//!
//! Plain loops over flat row-major slices. These are the default kernels and
//! the reference the [`parallel`](super::parallel) backend must match bit for
//! bit, which is why both backends share [`row_product`] and [`Lu::solve_unit`].
//!
//! ## Implemented Ops
//!
//! - `matmul`: Matrix multiplication
//! - `lu`: LU decomposition with partial pivoting
//! - `inverse`: Inverse through column-wise LU solves
//! - `determinant`: Determinant from the LU diagonal

use crate::error::{Error, Result};

/// Computes one output row of `A · B`: `row[j] = Σ_l a_row[l] · b[l, j]`.
///
/// The summation order over `l` is fixed so every backend agrees exactly.
pub fn row_product(a_row: &[f64], b: &[f64], n: usize, row: &mut [f64]) {
    for (j, out) in row.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (l, &a) in a_row.iter().enumerate() {
            sum += a * b[l * n + j];
        }
        *out = sum;
    }
}

/// Performs a matrix multiplication `C = A × B` on flat data (`A: m×k`, `B: k×n`).
///
/// # Requirements
/// - `a.len() == m * k` and `b.len() == k * n`; the caller validates shapes.
#[must_use]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    for (i, row) in out.chunks_mut(n).enumerate() {
        row_product(&a[i * k..(i + 1) * k], b, n, row);
    }
    out
}

/// Packed LU factors of a row-permuted square matrix, `P·A = L·U`.
///
/// `L` has an implicit unit diagonal and is stored below the diagonal of `lu`;
/// `U` occupies the diagonal and above.
#[derive(Debug, Clone)]
pub struct Lu {
    n: usize,
    lu: Vec<f64>,
    perm: Vec<usize>,
    swaps: usize,
}

impl Lu {
    /// Determinant of the original matrix.
    #[must_use]
    pub fn determinant(&self) -> f64 {
        let n = self.n;
        let product: f64 = (0..n).map(|i| self.lu[i * n + i]).product();
        if self.swaps % 2 == 1 { -product } else { product }
    }

    /// Solves `A·x = e_j` and returns `x`, i.e. column `j` of `A⁻¹`.
    #[must_use]
    pub fn solve_unit(&self, j: usize) -> Vec<f64> {
        let n = self.n;
        let mut x = vec![0.0; n];

        // forward substitution with the row permutation applied to e_j
        for i in 0..n {
            let mut acc = if self.perm[i] == j { 1.0 } else { 0.0 };
            for k in 0..i {
                acc -= self.lu[i * n + k] * x[k];
            }
            x[i] = acc;
        }

        for i in (0..n).rev() {
            let mut acc = x[i];
            for k in i + 1..n {
                acc -= self.lu[i * n + k] * x[k];
            }
            x[i] = acc / self.lu[i * n + i];
        }
        x
    }
}

/// LU decomposition with partial pivoting.
///
/// A pivot whose magnitude is at most `tolerance * max_abs(a)` (or is `NaN`)
/// stops elimination and is reported as singular on behalf of `op`.
///
/// # Errors
/// Returns [`Error::Singular`] with the failing column and pivot magnitude.
pub fn lu(a: &[f64], n: usize, tolerance: f64, op: &'static str) -> Result<Lu> {
    let threshold = tolerance * a.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let mut lu = a.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut swaps = 0;

    for col in 0..n {
        let (p, magnitude) = (col..n)
            .map(|r| (r, lu[r * n + col].abs()))
            .fold((col, f64::NAN), |best, cur| {
                if best.1.is_nan() || cur.1 > best.1 { cur } else { best }
            });

        if magnitude.is_nan() || magnitude <= threshold {
            return Err(Error::Singular {
                op,
                column: col,
                pivot: magnitude,
            });
        }

        if p != col {
            for c in 0..n {
                lu.swap(p * n + c, col * n + c);
            }
            perm.swap(p, col);
            swaps += 1;
        }

        let pivot = lu[col * n + col];
        for r in col + 1..n {
            let factor = lu[r * n + col] / pivot;
            lu[r * n + col] = factor;
            for c in col + 1..n {
                lu[r * n + c] -= factor * lu[col * n + c];
            }
        }
    }

    Ok(Lu { n, lu, perm, swaps })
}

/// Inverse of an `n`×`n` matrix, solved one column at a time.
///
/// # Errors
/// Returns [`Error::Singular`] if the matrix fails the pivot test.
pub fn inverse(a: &[f64], n: usize, tolerance: f64) -> Result<Vec<f64>> {
    let factors = lu(a, n, tolerance, "inverse")?;
    let mut out = vec![0.0; n * n];
    for j in 0..n {
        scatter_column(&mut out, n, j, &factors.solve_unit(j));
    }
    Ok(out)
}

/// Writes `column` into column `j` of the row-major `n`×`n` buffer `out`.
pub fn scatter_column(out: &mut [f64], n: usize, j: usize, column: &[f64]) {
    for (i, &x) in column.iter().enumerate() {
        out[i * n + j] = x;
    }
}

/// Determinant of an `n`×`n` matrix as the signed product of the LU pivots.
///
/// No tolerance is applied: badly scaled but invertible matrices keep their
/// exact pivot product, and only an exactly zero pivot column yields `0.0`.
/// A `NaN` pivot yields `NaN`.
#[must_use]
pub fn determinant(a: &[f64], n: usize) -> f64 {
    match lu(a, n, 0.0, "determinant") {
        Ok(factors) => factors.determinant(),
        Err(Error::Singular { pivot, .. }) if pivot.is_nan() => f64::NAN,
        Err(_) => 0.0,
    }
}
