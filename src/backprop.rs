//! Differentiable operations and their gradient formulas.
//!
//! # Primitive Set
//!
//! Every operation the graph can record is a variant of [`UnaryOp`] or
//! [`BinaryOp`]. Each variant has one forward formula and one backward formula
//! per operand, selected by an exhaustive `match`.
//!
//! | Primitive | Forward | Contribution to the input gradient |
//! |---|---|---|
//! | `transpose` | `Y = Xᵗ` | `dX[i,j] += G[j,i]` |
//! | `diag` | `Y = diag(x)` | `dx[i] += G[i,i]` |
//! | `diagonal` | `Y[i] = X[i,i]` | `dX[i,i] += G[i]` |
//! | `inverse` | `Y = X⁻¹` | `dX += -(Yᵗ·G·Yᵗ)` |
//! | `determinant` | `y = det X` | `dX[i,j] += y·g·X⁻¹[j,i]` |
//! | `dot` | `Y = A·B` | `dA += G·Bᵗ`, `dB += Aᵗ·G` |
//! | `add` | `Y = A + B` | `dA += G`, `dB += G` |
//! | `neg` | `Y = -X` | `dX += -G` |
//! | `sum` | `y = Σ X` | `dX[i] += g` |
//!
//! ## Autograd Pattern
//!
//! 1. **Forward** maps operand values to a fresh output value and never mutates its inputs.
//! 2. **Backward** receives the operand values, the output value `Y` and the
//!    upstream gradient `G`, and *adds* its contribution into the operand's
//!    gradient buffer. It never overwrites, so fan-out accumulates correctly.
//!
//! ## Usage Guidelines
//!
//! - Shape problems are returned as errors, never panics.
//! - `inverse` and the `determinant` gradient need a non-singular matrix; the
//!   pivot tolerance comes from the graph's [`GraphConfig`](crate::GraphConfig).

use crate::error::{Error, Result};
use crate::tensors::Ten64;
use crate::value::Value;

/// Single-operand primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Matrix transpose.
    Transpose,
    /// Vector to diagonal matrix.
    Diag,
    /// Main diagonal of a square matrix, as a vector.
    Diagonal,
    /// Matrix inverse.
    Inverse,
    /// Matrix determinant (scalar output).
    Determinant,
    /// Negation of a scalar or tensor.
    Neg,
    /// Sum of all tensor elements (scalar output).
    Sum,
}

/// Two-operand primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Matrix product.
    Dot,
    /// Element-wise sum of two equally shaped values.
    Add,
}

/// Restates a singularity found while inverting on behalf of `op`.
fn singular_as(op: &'static str) -> impl FnOnce(Error) -> Error {
    move |e| match e {
        Error::Singular { column, pivot, .. } => Error::Singular { op, column, pivot },
        other => other,
    }
}

impl UnaryOp {
    /// Name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Transpose => "transpose",
            Self::Diag => "diag",
            Self::Diagonal => "diagonal",
            Self::Inverse => "inverse",
            Self::Determinant => "determinant",
            Self::Neg => "neg",
            Self::Sum => "sum",
        }
    }

    /// Computes the output value from the operand value.
    ///
    /// # Errors
    /// Returns a shape error for an incompatible operand, or
    /// [`Error::Singular`] when inverting a singular matrix.
    pub fn forward(self, x: &Value, tolerance: f64) -> Result<Value> {
        let op = self.name();
        Ok(match self {
            Self::Transpose => Value::Tensor(x.tensor(op)?.transpose()?),
            Self::Diag => Value::Tensor(x.tensor(op)?.diag()?),
            Self::Diagonal => Value::Tensor(x.tensor(op)?.diagonal()?),
            Self::Inverse => Value::Tensor(x.tensor(op)?.inverse(tolerance)?),
            Self::Determinant => Value::Scalar(x.tensor(op)?.determinant()?),
            Self::Neg => match x {
                Value::Scalar(s) => Value::Scalar(-s),
                Value::Tensor(t) => Value::Tensor(t.neg()),
            },
            Self::Sum => Value::Scalar(x.tensor(op)?.sum()),
        })
    }

    /// Adds `∂L/∂x` into `dx`, given the operand `x`, output `y` and upstream gradient `g`.
    ///
    /// # Errors
    /// Returns a shape error if `dx` or `g` do not match the forward shapes,
    /// or [`Error::Singular`] for the determinant of a singular matrix.
    pub fn backward(self, x: &Value, y: &Value, g: &Value, dx: &mut Value, tolerance: f64) -> Result<()> {
        let op = self.name();
        match self {
            Self::Transpose => {
                let g = g.tensor(op)?;
                let (h, w) = g.matrix_dims(op)?;
                let dx = dx.tensor_mut(op)?;
                for i in 0..h {
                    for j in 0..w {
                        dx.data[j * h + i] += g.data[i * w + j];
                    }
                }
            }
            Self::Diag => {
                let g = g.tensor(op)?;
                let n = g.square_dim(op)?;
                let dx = dx.tensor_mut(op)?;
                for i in 0..n {
                    dx.data[i] += g.data[i * n + i];
                }
            }
            Self::Diagonal => {
                let g = g.tensor(op)?;
                let dx = dx.tensor_mut(op)?;
                let n = dx.square_dim(op)?;
                for i in 0..n {
                    dx.data[i * n + i] += g.data[i];
                }
            }
            Self::Inverse => {
                let y_t = y.tensor(op)?.transpose()?;
                let contribution = y_t.matmul(g.tensor(op)?)?.matmul(&y_t)?.neg();
                dx.tensor_mut(op)?.add_assign(&contribution)?;
            }
            Self::Determinant => {
                // Jacobi's formula
                let det = y.scalar(op)?;
                let g = g.scalar(op)?;
                let x = x.tensor(op)?;
                let n = x.square_dim(op)?;
                let inv = x.inverse(tolerance).map_err(singular_as(op))?;
                let dx = dx.tensor_mut(op)?;
                for i in 0..n {
                    for j in 0..n {
                        dx.data[i * n + j] += det * g * inv.data[j * n + i];
                    }
                }
            }
            Self::Neg => match g {
                Value::Scalar(s) => dx.accumulate(&Value::Scalar(-s))?,
                Value::Tensor(t) => dx.accumulate(&Value::Tensor(t.neg()))?,
            },
            Self::Sum => {
                let g = g.scalar(op)?;
                for d in &mut dx.tensor_mut(op)?.data {
                    *d += g;
                }
            }
        }
        Ok(())
    }
}

impl BinaryOp {
    /// Name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dot => "dot",
            Self::Add => "add",
        }
    }

    /// Computes the output value from both operand values.
    ///
    /// # Errors
    /// Returns a shape error for incompatible operands.
    pub fn forward(self, a: &Value, b: &Value) -> Result<Value> {
        let op = self.name();
        match self {
            Self::Dot => Ok(Value::Tensor(a.tensor(op)?.matmul(b.tensor(op)?)?)),
            Self::Add => match (a, b) {
                (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(x + y)),
                (Value::Tensor(x), Value::Tensor(y)) => Ok(Value::Tensor(x.add(y)?)),
                _ => Err(Error::Shape {
                    op,
                    expected: a.shape().to_vec(),
                    got: b.shape().to_vec(),
                }),
            },
        }
    }

    /// Adds `∂L/∂a` into `da`.
    ///
    /// # Errors
    /// Returns a shape error if the buffers do not match the forward shapes.
    pub fn backward_lhs(self, _a: &Value, b: &Value, g: &Value, da: &mut Value) -> Result<()> {
        let op = self.name();
        match self {
            Self::Dot => {
                let contribution = g.tensor(op)?.matmul(&b.tensor(op)?.transpose()?)?;
                da.tensor_mut(op)?.add_assign(&contribution)
            }
            Self::Add => da.accumulate(g),
        }
    }

    /// Adds `∂L/∂b` into `db`.
    ///
    /// # Errors
    /// Returns a shape error if the buffers do not match the forward shapes.
    pub fn backward_rhs(self, a: &Value, _b: &Value, g: &Value, db: &mut Value) -> Result<()> {
        let op = self.name();
        match self {
            Self::Dot => {
                let contribution: Ten64 = a.tensor(op)?.transpose()?.matmul(g.tensor(op)?)?;
                db.tensor_mut(op)?.add_assign(&contribution)
            }
            Self::Add => db.accumulate(g),
        }
    }
}
