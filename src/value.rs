//! Node payloads: a scalar or a dense tensor.

use crate::error::{Error, Result};
use crate::tensors::{Ten64, ZerosLike};

/// The value (or gradient) carried by a graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single number, e.g. the output of `determinant` or a scalar loss.
    Scalar(f64),
    /// A matrix or vector.
    Tensor(Ten64),
}

impl Value {
    /// Shape of the payload; a scalar has the empty shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Scalar(_) => &[],
            Self::Tensor(t) => &t.shape,
        }
    }

    /// Returns the scalar, or `None` for a tensor.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(s) => Some(*s),
            Self::Tensor(_) => None,
        }
    }

    /// Returns the tensor, or `None` for a scalar.
    #[must_use]
    pub const fn as_tensor(&self) -> Option<&Ten64> {
        match self {
            Self::Scalar(_) => None,
            Self::Tensor(t) => Some(t),
        }
    }

    /// Like [`Value::as_scalar`], but as an error for operation `op`.
    ///
    /// # Errors
    /// Returns [`Error::Kind`] if the value is a tensor.
    pub fn scalar(&self, op: &'static str) -> Result<f64> {
        self.as_scalar().ok_or(Error::Kind {
            op,
            expected: "scalar",
        })
    }

    /// Like [`Value::as_tensor`], but as an error for operation `op`.
    ///
    /// # Errors
    /// Returns [`Error::Kind`] if the value is a scalar.
    pub fn tensor(&self, op: &'static str) -> Result<&Ten64> {
        self.as_tensor().ok_or(Error::Kind {
            op,
            expected: "tensor",
        })
    }

    /// Mutable access to the tensor.
    ///
    /// # Errors
    /// Returns [`Error::Kind`] if the value is a scalar.
    pub fn tensor_mut(&mut self, op: &'static str) -> Result<&mut Ten64> {
        match self {
            Self::Tensor(t) => Ok(t),
            Self::Scalar(_) => Err(Error::Kind {
                op,
                expected: "tensor",
            }),
        }
    }

    /// Multiplicative identity of the same shape: `1` or an all-ones tensor.
    #[must_use]
    pub fn ones_like(&self) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(1.0),
            Self::Tensor(t) => Self::Tensor(Ten64::ones(t.shape.clone())),
        }
    }

    /// Whether `self` and `other` have the same kind and shape.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(_), Self::Scalar(_)) => true,
            (Self::Tensor(a), Self::Tensor(b)) => a.shape == b.shape,
            _ => false,
        }
    }

    /// Adds `other` into `self`.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if kinds or shapes differ.
    pub fn accumulate(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => {
                *a += b;
                Ok(())
            }
            (Self::Tensor(a), Self::Tensor(b)) => a.add_assign(b),
            (lhs, rhs) => Err(Error::Shape {
                op: "accumulate",
                expected: lhs.shape().to_vec(),
                got: rhs.shape().to_vec(),
            }),
        }
    }
}

impl ZerosLike for Value {
    fn zeros_like(&self) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(0.0),
            Self::Tensor(t) => Self::Tensor(t.zeros_like()),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Scalar(x)
    }
}

impl From<Ten64> for Value {
    fn from(t: Ten64) -> Self {
        Self::Tensor(t)
    }
}
