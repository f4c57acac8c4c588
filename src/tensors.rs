//! Core tensor data structures and operations.
//!
//! # Dense Tensor Collaborator
//!
//! The differentiation layer never looks inside a tensor beyond the handful of
//! operations defined here. They are deliberately plain: row-major storage, no
//! strides, no broadcasting.
//!
//! It supports:
//! - Construction of N-dimensional tensors with shape and row-major data layout
//! - Indexed element access by multi-index
//! - Element-wise addition, negation and scaling
//! - Matrix transpose, diagonal construction and extraction
//! - Matrix product, inverse and determinant through the [`ops`](crate::ops) dispatch layer
//!
//! ## Design Highlights
//! - Tensors are strongly typed: `Tensor<T>` for any element type, `Ten64` for the `f64` math
//! - Shape is stored as a `Vec<usize>` and enforced at runtime
//! - `WithGrad<T>` pairs any value with its gradient for autograd
//! - The `tensor!` macro supports ergonomic tensor creation from nested arrays
//!
//! ## Limitations
//! - Row-major only
//! - No broadcasting, slicing, or shape inference
//! - Linear algebra is limited to rank-2 matrices and rank-1 vectors
//!
//! ## Example
//!
//! ```rust
//! use linalg_grad::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! ```

use crate::error::{Error, Result};
use crate::ops::dispatch;

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    /// Extent of each dimension.
    pub shape: Vec<usize>,
    /// Row-major elements.
    pub data: Vec<T>,
}

/// The tensor every differentiable operation works on.
pub type Ten64 = Tensor<f64>;

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Fallible counterpart of [`Tensor::new`].
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if the element count does not match the shape.
    pub fn try_new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(Error::Shape {
                op: "tensor",
                expected: vec![expected],
                got: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }


    /// Flat row-major offset of a multi-index.
    ///
    /// # Errors
    /// Returns [`Error::Index`] if the index has the wrong rank or is out of bounds.
    pub fn offset(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.shape.len() || index.iter().zip(&self.shape).any(|(i, d)| i >= d) {
            return Err(Error::Index {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (&i, &d)| acc * d + i))
    }
}

impl<T: Clone> Tensor<T> {
    /// Creates a tensor with every element set to `value`.
    pub fn filled(shape: impl Into<Vec<usize>>, value: T) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![value; len],
        }
    }
}

impl<T: Copy> Tensor<T> {
    /// Reads the element at `index`.
    ///
    /// # Errors
    /// Returns [`Error::Index`] for an invalid index.
    pub fn get(&self, index: &[usize]) -> Result<T> {
        Ok(self.data[self.offset(index)?])
    }

    /// Writes the element at `index`.
    ///
    /// # Errors
    /// Returns [`Error::Index`] for an invalid index.
    pub fn set(&mut self, index: &[usize], value: T) -> Result<()> {
        let at = self.offset(index)?;
        self.data[at] = value;
        Ok(())
    }
}

impl Ten64 {
    /// Zero-filled tensor.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        Self::filled(shape, 0.0)
    }

    /// One-filled tensor.
    pub fn ones(shape: impl Into<Vec<usize>>) -> Self {
        Self::filled(shape, 1.0)
    }

    /// The `n`×`n` identity matrix.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        let mut out = Self::zeros(vec![n, n]);
        for i in 0..n {
            out.data[i * n + i] = 1.0;
        }
        out
    }

    /// Returns `(rows, cols)` of a rank-2 tensor.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] for any other rank.
    pub fn matrix_dims(&self, op: &'static str) -> Result<(usize, usize)> {
        match self.shape[..] {
            [r, c] => Ok((r, c)),
            _ => Err(Error::RankMismatch {
                op,
                expected: 2,
                shape: self.shape.clone(),
            }),
        }
    }

    /// Returns `n` for an `n`×`n` matrix.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] or [`Error::NotSquare`].
    pub fn square_dim(&self, op: &'static str) -> Result<usize> {
        let (r, c) = self.matrix_dims(op)?;
        if r != c {
            return Err(Error::NotSquare {
                op,
                shape: self.shape.clone(),
            });
        }
        Ok(r)
    }

    fn expect_same_shape(&self, other: &Self, op: &'static str) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::Shape {
                op,
                expected: self.shape.clone(),
                got: other.shape.clone(),
            });
        }
        Ok(())
    }

    /// Element-wise sum.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if shapes differ.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.expect_same_shape(other, "add")?;
        Ok(Self {
            shape: self.shape.clone(),
            data: self.data.iter().zip(&other.data).map(|(a, b)| a + b).collect(),
        })
    }

    /// In-place element-wise sum, used for gradient accumulation.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if shapes differ.
    pub fn add_assign(&mut self, other: &Self) -> Result<()> {
        self.expect_same_shape(other, "add")?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// Element-wise negation.
    #[must_use]
    pub fn neg(&self) -> Self {
        self.scale(-1.0)
    }

    /// Multiplies every element by `factor`.
    #[must_use]
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|x| x * factor).collect(),
        }
    }

    /// Sum of all elements.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Matrix transpose.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] unless the tensor is a matrix.
    pub fn transpose(&self) -> Result<Self> {
        let (h, w) = self.matrix_dims("transpose")?;
        let mut data = vec![0.0; h * w];
        for i in 0..h {
            for j in 0..w {
                data[j * h + i] = self.data[i * w + j];
            }
        }
        Ok(Self::new(vec![w, h], data))
    }

    /// Builds a square matrix with `self` on its diagonal.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] unless the tensor is a vector.
    pub fn diag(&self) -> Result<Self> {
        let [n] = self.shape[..] else {
            return Err(Error::RankMismatch {
                op: "diag",
                expected: 1,
                shape: self.shape.clone(),
            });
        };
        let mut out = Self::zeros(vec![n, n]);
        for (i, &x) in self.data.iter().enumerate() {
            out.data[i * n + i] = x;
        }
        Ok(out)
    }

    /// Extracts the main diagonal of a square matrix.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] or [`Error::NotSquare`].
    pub fn diagonal(&self) -> Result<Self> {
        let n = self.square_dim("diagonal")?;
        Ok(Self::new(
            vec![n],
            (0..n).map(|i| self.data[i * n + i]).collect(),
        ))
    }

    /// Matrix product `self · other`.
    ///
    /// # Errors
    /// Returns [`Error::RankMismatch`] for non-matrices and [`Error::Shape`]
    /// if the inner dimensions differ.
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        let (m, k) = self.matrix_dims("dot")?;
        let (k2, n) = other.matrix_dims("dot")?;
        if k != k2 {
            return Err(Error::Shape {
                op: "dot",
                expected: vec![k, n],
                got: other.shape.clone(),
            });
        }
        Ok(Self::new(vec![m, n], dispatch::matmul(&self.data, &other.data, m, k, n)))
    }

    /// Matrix inverse.
    ///
    /// A pivot with `|p| <= tolerance * max|self|` counts as singular.
    ///
    /// # Errors
    /// Returns [`Error::NotSquare`]/[`Error::RankMismatch`] for bad shapes and
    /// [`Error::Singular`] for a singular matrix.
    pub fn inverse(&self, tolerance: f64) -> Result<Self> {
        let n = self.square_dim("inverse")?;
        let data = dispatch::inverse(&self.data, n, tolerance)?;
        Ok(Self::new(vec![n, n], data))
    }

    /// Matrix determinant, the signed product of the LU pivots.
    ///
    /// Unlike [`Tensor::inverse`] this applies no singularity tolerance; it is
    /// `0.0` only when elimination finds an exactly zero pivot column.
    ///
    /// # Errors
    /// Returns [`Error::NotSquare`]/[`Error::RankMismatch`] for bad shapes.
    pub fn determinant(&self) -> Result<f64> {
        let n = self.square_dim("determinant")?;
        Ok(dispatch::determinant(&self.data, n))
    }
}

/// Values that can produce an additive identity of their own shape.
pub trait ZerosLike {
    /// Zero of the same shape as `self`.
    #[must_use]
    fn zeros_like(&self) -> Self;
}

impl ZerosLike for f64 {
    fn zeros_like(&self) -> Self {
        0.0
    }
}

impl ZerosLike for Ten64 {
    fn zeros_like(&self) -> Self {
        Self::zeros(self.shape.clone())
    }
}

/// A container for tracking gradients of values (used in autograd).
///
/// Typically used as `WithGrad<Ten64>` or `WithGrad<Value>`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithGrad<T> {
    /// Forward value.
    pub value: T,
    /// Gradient accumulated for `value`; always the same shape.
    pub grad: T,
}

impl<T: ZerosLike> WithGrad<T> {
    /// Pairs `value` with a zero gradient of the same shape.
    pub fn new(value: T) -> Self {
        let grad = value.zeros_like();
        Self { value, grad }
    }

    /// Resets the gradient to zero.
    pub fn zero_grad(&mut self) {
        self.grad = self.value.zeros_like();
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use linalg_grad::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    (- $lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![-$lit])
    };

    ([ $( $inner:tt )+ ]) => {
        $crate::tensor!(@rows [] $( $inner )+)
    };

    (@rows [ $( $done:expr ),* ] - $lit:literal $(, $( $rest:tt )* )?) => {
        $crate::tensor!(@rows [ $( $done, )* $crate::tensor!(- $lit) ] $( $( $rest )* )?)
    };

    (@rows [ $( $done:expr ),* ] $head:tt $(, $( $rest:tt )* )?) => {
        $crate::tensor!(@rows [ $( $done, )* $crate::tensor!($head) ] $( $( $rest )* )?)
    };

    (@rows [ $( $done:expr ),+ ]) => {{
        let children = vec![ $( $done ),+ ];
        let first_shape = children[0].shape.clone();
        assert!(children.iter().all(|c| c.shape == first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(&first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}
