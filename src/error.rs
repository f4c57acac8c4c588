//! Error types for graph construction, forward evaluation and backpropagation.

use thiserror::Error;

use crate::graph::NodeId;

/// Every failure the engine can report.
///
/// Shape and singularity errors come from the numeric kernels; the rest are
/// graph-structure errors raised by the driver. None of them is recoverable
/// within the pass that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operand shapes are incompatible with the operation.
    #[error("{op}: shape mismatch, expected {expected:?}, got {got:?}")]
    Shape {
        /// Operation that rejected its operands.
        op: &'static str,
        /// Shape the operation required.
        expected: Vec<usize>,
        /// Shape it received.
        got: Vec<usize>,
    },

    /// A square matrix was required.
    #[error("{op}: expected a square matrix, got shape {shape:?}")]
    NotSquare {
        /// Operation that rejected its operand.
        op: &'static str,
        /// Offending shape.
        shape: Vec<usize>,
    },

    /// Operand had the wrong number of dimensions.
    #[error("{op}: expected rank {expected}, got shape {shape:?}")]
    RankMismatch {
        /// Operation that rejected its operand.
        op: &'static str,
        /// Required rank.
        expected: usize,
        /// Offending shape.
        shape: Vec<usize>,
    },

    /// A scalar was given where a tensor is required, or the reverse.
    #[error("{op}: expected a {expected} operand")]
    Kind {
        /// Operation that rejected its operand.
        op: &'static str,
        /// `"scalar"` or `"tensor"`.
        expected: &'static str,
    },

    /// Index out of bounds for the tensor shape.
    #[error("index {index:?} out of bounds for shape {shape:?}")]
    Index {
        /// Requested multi-index.
        index: Vec<usize>,
        /// Shape of the tensor.
        shape: Vec<usize>,
    },

    /// Matrix is singular or below the configured pivot tolerance.
    #[error("{op}: matrix is singular (pivot {pivot:e} at column {column})")]
    Singular {
        /// Operation that needed an invertible matrix.
        op: &'static str,
        /// Column at which elimination broke down.
        column: usize,
        /// Magnitude of the rejected pivot.
        pivot: f64,
    },

    /// The dependency graph is not acyclic.
    #[error("cycle detected: {remaining} node(s) could not be ordered")]
    Cycle {
        /// Reachable nodes that never became ready.
        remaining: usize,
    },

    /// Backward requested on a node whose value was never computed.
    #[error("node {0} has no forward value; run forward first")]
    NotEvaluated(NodeId),

    /// The id does not address a node of this graph.
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    /// A producer refers to an operand that is missing from the graph.
    #[error("node {node} refers to missing operand {operand}")]
    MissingOperand {
        /// Consumer holding the dangling reference.
        node: NodeId,
        /// The missing operand.
        operand: NodeId,
    },

    /// Only leaves may have their value replaced.
    #[error("node {0} is produced by an operation and cannot be assigned")]
    NotALeaf(NodeId),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error stems from operand shapes rather than values or graph structure.
    #[must_use]
    pub const fn is_shape(&self) -> bool {
        matches!(
            self,
            Self::Shape { .. } | Self::NotSquare { .. } | Self::RankMismatch { .. } | Self::Kind { .. }
        )
    }
}
