//! Operation Dispatch Layer
//!
//! This module selects the correct backend at runtime for each dense kernel,
//! based on the global [`Backend`].
//!
//! # Design Highlights
//! - **Pluggable**: Backends are modular and share their arithmetic helpers
//! - **Minimal overhead**: One atomic load per kernel call
//! - **Fallback logic**: Kernels without a parallel variant run on `Cpu`

use super::{cpu, parallel};
use crate::backend::{Backend, get_backend};
use crate::error::Result;

/// Dispatches matrix multiplication (`A: m×k`, `B: k×n`) to the selected backend.
#[must_use]
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    match get_backend() {
        Backend::Parallel => parallel::matmul(a, b, m, k, n),
        Backend::Cpu => cpu::matmul(a, b, m, k, n),
    }
}

/// Dispatches the matrix inverse to the selected backend.
///
/// # Errors
/// Returns [`Error::Singular`](crate::Error::Singular) for a singular matrix.
pub fn inverse(a: &[f64], n: usize, tolerance: f64) -> Result<Vec<f64>> {
    match get_backend() {
        Backend::Parallel => parallel::inverse(a, n, tolerance),
        Backend::Cpu => cpu::inverse(a, n, tolerance),
    }
}

/// Determinant has no parallel variant; elimination is inherently sequential.
#[must_use]
pub fn determinant(a: &[f64], n: usize) -> f64 {
    cpu::determinant(a, n)
}
