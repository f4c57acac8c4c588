//! Parallel CPU kernels
//!
//! Same arithmetic as [`cpu`](super::cpu), split across threads with
//! [`rayon`](https://docs.rs/rayon):
//!
//! - `matmul` hands each output row to its own task
//! - `inverse` solves the columns of `A⁻¹` independently
//!
//! Each output element is written by exactly one task and its summation order
//! is unchanged, so results are bit-identical to the serial backend.

use rayon::prelude::*;

use super::cpu;
use crate::error::Result;

/// Performs a matrix multiplication `C = A × B` (`A: m×k`, `B: k×n`) with one
/// rayon task per output row.
#[must_use]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }
    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        cpu::row_product(&a[i * k..(i + 1) * k], b, n, row);
    });
    out
}

/// Inverse of an `n`×`n` matrix with the column solves run in parallel.
///
/// The factorization itself is sequential.
///
/// # Errors
/// Returns [`Error::Singular`](crate::Error::Singular) if the matrix fails the pivot test.
pub fn inverse(a: &[f64], n: usize, tolerance: f64) -> Result<Vec<f64>> {
    let factors = cpu::lu(a, n, tolerance, "inverse")?;
    let columns: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|j| factors.solve_unit(j))
        .collect();

    let mut out = vec![0.0; n * n];
    for (j, column) in columns.iter().enumerate() {
        cpu::scatter_column(&mut out, n, j, column);
    }
    Ok(out)
}
