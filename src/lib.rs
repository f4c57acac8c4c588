//! linalg_grad: reverse-mode differentiation for dense linear algebra.
//!
//! Build a computation graph out of matrix primitives, evaluate it lazily, and
//! backpropagate exact gradients through transpose, diagonal construction and
//! extraction, matrix product, inverse and determinant.
//!
//! # Features
//!
//! - Arena-based graph with non-owning [`NodeId`] handles; fan-out is free.
//! - Lazy, memoised forward evaluation with leaf updates via [`Graph::set_value`].
//! - Backward pass ordered by consumer counts, so every gradient is complete
//!   before it is propagated further.
//! - Runtime-selectable CPU or multi-threaded kernels ([`backend`]).
//!
//! # Modules
//!
//! - [`graph`] — Graph arena, forward and backward drivers.
//! - [`backprop`] — Primitive operations and their gradient formulas.
//! - [`tensors`] — Dense row-major tensors and matrix math.
//! - [`ops`] — Kernels behind the tensor math, per backend.
//! - [`value`] — Scalar-or-tensor node payloads.
//! - [`config`] — Per-graph settings.
//! - [`error`] — The crate error type.
//!
//! # Example
//!
//! ```rust
//! use linalg_grad::{Graph, tensor};
//!
//! # fn main() -> linalg_grad::Result<()> {
//! let mut g = Graph::new();
//! let a = g.leaf(tensor!([[1.0, 2.0], [3.0, 4.0]]));
//! let b = g.leaf(tensor!([[0.5, 0.0], [0.0, 0.5]]));
//! let ab = g.dot(a, b)?;
//! let loss = g.sum(ab)?;
//!
//! assert_eq!(g.forward(loss)?.as_scalar(), Some(5.0));
//! g.backward(loss)?;
//! assert_eq!(g.grad(b)?.as_tensor().unwrap().data, vec![4.0, 4.0, 6.0, 6.0]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod backprop;
pub mod config;
pub mod error;
pub mod graph;
pub mod ops;
pub mod tensors;
pub mod value;

pub use backend::{Backend, get_backend, set_backend};
pub use backprop::{BinaryOp, UnaryOp};
pub use config::{GradPolicy, GraphConfig};
pub use error::{Error, Result};
pub use graph::{Graph, NodeId, Producer};
pub use tensors::{Ten64, Tensor, WithGrad};
pub use value::Value;
