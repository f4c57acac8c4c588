//! Computation graph and differentiation driver.
//!
//! # Graph Model
//!
//! A [`Graph`] is a caller-owned arena of nodes. Applying a primitive appends a
//! node that records the operation and the [`NodeId`]s of its operands; nothing
//! is computed until [`Graph::forward`] is asked for a value. Operand ids are
//! plain indices into the arena, so a node never owns its inputs and only the
//! graph mutates node state.
//!
//! Because operands must already exist when a node is created, every operand
//! id is smaller than the id of its consumer. [`Graph::set_value`] relies on
//! that to invalidate downstream caches in a single sweep.
//!
//! # Passes
//!
//! - **Forward** walks the unevaluated ancestors of a node depth-first,
//!   evaluates them operands-first and caches every value. Values are staged
//!   and only committed when the whole chain succeeded.
//! - **Backward** orders the subgraph reachable from the output with Kahn's
//!   algorithm over consumer counts: a node propagates to its operands only
//!   after every reachable consumer has propagated into it, so its gradient is
//!   complete when its backward formula runs. Gradients are staged the same way.
//!
//! # Example
//!
//! ```rust
//! use linalg_grad::{Graph, tensor};
//!
//! # fn main() -> linalg_grad::Result<()> {
//! let mut g = Graph::new();
//! let x = g.leaf(tensor!([[2.0, 1.0], [1.0, 3.0]]));
//! let det = g.determinant(x)?;
//!
//! assert!((g.forward(det)?.as_scalar().unwrap() - 5.0).abs() < 1e-12);
//! g.backward(det)?;
//!
//! // d(det X)/dX = det(X) · X⁻ᵀ
//! let dx = g.grad(x)?.as_tensor().unwrap();
//! assert!((dx.get(&[0, 0])? - 3.0).abs() < 1e-12);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;

use log::{debug, trace, warn};

use crate::backprop::{BinaryOp, UnaryOp};
use crate::config::{GradPolicy, GraphConfig};
use crate::error::{Error, Result};
use crate::tensors::{WithGrad, ZerosLike};
use crate::value::Value;

type Gradients = HashMap<NodeId, Value>;

/// Handle to a node of one [`Graph`].
///
/// Ids are indices into the graph that issued them; using an id with another
/// graph is not detected unless it is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its graph.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The operation that produced a node, together with its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    /// Result of a single-operand primitive.
    Unary(UnaryOp, [NodeId; 1]),
    /// Result of a two-operand primitive; operands in call order.
    Binary(BinaryOp, [NodeId; 2]),
}

impl Producer {
    /// Operation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unary(op, _) => op.name(),
            Self::Binary(op, _) => op.name(),
        }
    }

    /// Operand ids, in order.
    #[must_use]
    pub fn operands(&self) -> &[NodeId] {
        match self {
            Self::Unary(_, ids) => ids.as_slice(),
            Self::Binary(_, ids) => ids.as_slice(),
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    producer: Option<Producer>,
    slot: Option<WithGrad<Value>>,
}

/// A caller-owned computation graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    config: GraphConfig,
    version: u64,
    evaluations: u64,
}

impl Graph {
    /// Empty graph with the default [`GraphConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty graph with custom settings.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Incremented whenever a leaf value is replaced.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Total number of primitive forward formulas run so far.
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Introduces an input node holding `value`.
    pub fn leaf(&mut self, value: impl Into<Value>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            producer: None,
            slot: Some(WithGrad::new(value.into())),
        });
        id
    }

    /// Records `op(x)` and returns the new node. Nothing is computed yet.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] if `x` is not a node of this graph.
    pub fn apply_unary(&mut self, op: UnaryOp, x: NodeId) -> Result<NodeId> {
        self.check(x)?;
        Ok(self.push(Producer::Unary(op, [x])))
    }

    /// Records `op(a, b)` and returns the new node. Nothing is computed yet.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] if either operand is not a node of this graph.
    pub fn apply_binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.check(a)?;
        self.check(b)?;
        Ok(self.push(Producer::Binary(op, [a, b])))
    }

    fn push(&mut self, producer: Producer) -> NodeId {
        let id = NodeId(self.nodes.len());
        trace!("recorded {id} = {}{:?}", producer.name(), producer.operands());
        self.nodes.push(Node {
            producer: Some(producer),
            slot: None,
        });
        id
    }

    /// `Xᵗ`.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn transpose(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Transpose, x)
    }

    /// Square matrix with the vector `x` on its diagonal.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn diag(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Diag, x)
    }

    /// Main diagonal of the square matrix `x`.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn diagonal(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Diagonal, x)
    }

    /// `X⁻¹`.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn inverse(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Inverse, x)
    }

    /// `det X`, a scalar.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn determinant(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Determinant, x)
    }

    /// `-X`.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn neg(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Neg, x)
    }

    /// Sum of all elements of `x`, a scalar.
    ///
    /// # Errors
    /// See [`Graph::apply_unary`].
    pub fn sum(&mut self, x: NodeId) -> Result<NodeId> {
        self.apply_unary(UnaryOp::Sum, x)
    }

    /// Matrix product `A·B`.
    ///
    /// # Errors
    /// See [`Graph::apply_binary`].
    pub fn dot(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_binary(BinaryOp::Dot, a, b)
    }

    /// Element-wise `A + B`.
    ///
    /// # Errors
    /// See [`Graph::apply_binary`].
    pub fn add(&mut self, a: NodeId, b: NodeId) -> Result<NodeId> {
        self.apply_binary(BinaryOp::Add, a, b)
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::UnknownNode(id))
        }
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode(id))
    }

    /// Whether `id` is an input rather than the result of an operation.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] for a foreign id.
    pub fn is_leaf(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.producer.is_none())
    }

    /// The producing operation's name, or `"leaf"`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] for a foreign id.
    pub fn op_name(&self, id: NodeId) -> Result<&'static str> {
        Ok(self.node(id)?.producer.map_or("leaf", |p| p.name()))
    }

    /// Operand ids of `id`; empty for a leaf.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] for a foreign id.
    pub fn operands(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.producer.as_ref().map_or(&[][..], Producer::operands))
    }

    /// The cached forward value of `id`.
    ///
    /// # Errors
    /// Returns [`Error::NotEvaluated`] if `id` has not been evaluated since the
    /// last change to its inputs.
    pub fn value(&self, id: NodeId) -> Result<&Value> {
        self.node(id)?
            .slot
            .as_ref()
            .map(|s| &s.value)
            .ok_or(Error::NotEvaluated(id))
    }

    /// The gradient of `id` from the last backward pass (zero before any pass).
    ///
    /// # Errors
    /// Returns [`Error::NotEvaluated`] if `id` has no value.
    pub fn grad(&self, id: NodeId) -> Result<&Value> {
        self.node(id)?
            .slot
            .as_ref()
            .map(|s| &s.grad)
            .ok_or(Error::NotEvaluated(id))
    }

    /// Replaces the value of a leaf and invalidates everything computed from it.
    ///
    /// # Errors
    /// Returns [`Error::UnknownNode`] or [`Error::NotALeaf`].
    pub fn set_value(&mut self, leaf: NodeId, value: impl Into<Value>) -> Result<()> {
        if !self.is_leaf(leaf)? {
            return Err(Error::NotALeaf(leaf));
        }
        self.nodes[leaf.0].slot = Some(WithGrad::new(value.into()));
        self.version += 1;

        let mut dirty = vec![false; self.nodes.len()];
        dirty[leaf.0] = true;
        let mut invalidated = 0usize;
        for i in leaf.0 + 1..self.nodes.len() {
            let stale = self.nodes[i]
                .producer
                .is_some_and(|p| p.operands().iter().any(|o| dirty.get(o.0) == Some(&true)));
            if stale {
                dirty[i] = true;
                if self.nodes[i].slot.take().is_some() {
                    invalidated += 1;
                }
            }
        }
        debug!(
            "leaf {leaf} replaced, graph version {}, {invalidated} cached value(s) dropped",
            self.version
        );
        Ok(())
    }

    /// Resets the gradient of every evaluated node to zero.
    pub fn zero_grad(&mut self) {
        for slot in self.nodes.iter_mut().filter_map(|n| n.slot.as_mut()) {
            slot.zero_grad();
        }
    }

    /// Evaluates `output` and every ancestor it needs, and returns its value.
    ///
    /// Values are memoised: a node is computed at most once per graph version,
    /// so calling `forward` again is free and returns the identical value.
    ///
    /// # Errors
    /// Propagates shape and singularity errors from the primitives, and
    /// graph-structure errors. On error no value is cached.
    pub fn forward(&mut self, output: NodeId) -> Result<&Value> {
        self.check(output)?;
        let order = self.evaluation_order(output)?;
        if !order.is_empty() {
            debug!("forward {output}: evaluating {} node(s)", order.len());
        }

        let tolerance = self.config.singular_tolerance;
        let mut staged: HashMap<NodeId, Value> = HashMap::with_capacity(order.len());
        for &id in &order {
            let producer = self.node(id)?.producer.ok_or(Error::NotEvaluated(id))?;
            let value = match producer {
                Producer::Unary(op, [x]) => op.forward(self.lookup(id, x, &staged)?, tolerance),
                Producer::Binary(op, [a, b]) => {
                    op.forward(self.lookup(id, a, &staged)?, self.lookup(id, b, &staged)?)
                }
            };
            let value = value.inspect_err(|e| {
                warn!("forward {output} abandoned at {id} ({}): {e}", producer.name());
            })?;
            trace!("forward {id} = {} -> {:?}", producer.name(), value.shape());
            staged.insert(id, value);
        }

        self.evaluations += staged.len() as u64;
        for (id, value) in staged {
            self.nodes[id.0].slot = Some(WithGrad::new(value));
        }
        self.value(output)
    }

    fn lookup<'a>(
        &'a self,
        consumer: NodeId,
        operand: NodeId,
        staged: &'a HashMap<NodeId, Value>,
    ) -> Result<&'a Value> {
        let node = self.nodes.get(operand.0).ok_or(Error::MissingOperand {
            node: consumer,
            operand,
        })?;
        node.slot
            .as_ref()
            .map(|s| &s.value)
            .or_else(|| staged.get(&operand))
            .ok_or(Error::NotEvaluated(operand))
    }

    /// Unevaluated ancestors of `output` (itself included), operands first.
    fn evaluation_order(&self, output: NodeId) -> Result<Vec<NodeId>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut order = Vec::new();
        let mut stack = vec![(output, false)];

        let cycle = |marks: &[Mark]| Error::Cycle {
            remaining: marks.iter().filter(|&&m| m == Mark::Open).count(),
        };

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                marks[id.0] = Mark::Done;
                order.push(id);
                continue;
            }
            match marks[id.0] {
                Mark::Done => continue,
                Mark::Open => return Err(cycle(&marks)),
                Mark::New => {}
            }

            let node = &self.nodes[id.0];
            let Some(producer) = node.producer.filter(|_| node.slot.is_none()) else {
                marks[id.0] = Mark::Done;
                continue;
            };

            marks[id.0] = Mark::Open;
            stack.push((id, true));
            for &operand in producer.operands() {
                match marks.get(operand.0) {
                    None => return Err(Error::MissingOperand { node: id, operand }),
                    Some(Mark::Open) => return Err(cycle(&marks)),
                    Some(Mark::Done) => {}
                    Some(Mark::New) => stack.push((operand, false)),
                }
            }
        }
        Ok(order)
    }

    /// Backpropagates from `output`, seeding its gradient with ones
    /// (`1.0` for a scalar, an all-ones tensor otherwise).
    ///
    /// # Errors
    /// See [`Graph::backward_with`].
    pub fn backward(&mut self, output: NodeId) -> Result<()> {
        let seed = self.value(output)?.ones_like();
        self.backward_with(output, seed)
    }

    /// Backpropagates `seed` (the gradient of the loss with respect to
    /// `output`) to every ancestor of `output`.
    ///
    /// Under [`GradPolicy::Reset`] every gradient in the graph is replaced by
    /// this pass's result; under [`GradPolicy::Accumulate`] the result is added
    /// onto the existing gradients. Either way nothing changes on error.
    ///
    /// # Errors
    /// - [`Error::NotEvaluated`] if `output` (or an ancestor) has no value
    /// - [`Error::Shape`] if `seed` does not match the shape of `output`
    /// - [`Error::Singular`] from the `determinant`/`inverse` gradients
    /// - [`Error::Cycle`] / [`Error::MissingOperand`] for a malformed graph
    pub fn backward_with(&mut self, output: NodeId, seed: impl Into<Value>) -> Result<()> {
        let seed = seed.into();
        let value = self.value(output)?;
        if !value.same_shape(&seed) {
            return Err(Error::Shape {
                op: "backward",
                expected: value.shape().to_vec(),
                got: seed.shape().to_vec(),
            });
        }

        let grads = self
            .propagate(output, seed)
            .inspect_err(|e| warn!("backward {output} abandoned: {e}"))?;

        match self.config.grad_policy {
            GradPolicy::Reset => {
                self.zero_grad();
                for (id, grad) in grads {
                    if let Some(slot) = self.nodes[id.0].slot.as_mut() {
                        slot.grad = grad;
                    }
                }
            }
            GradPolicy::Accumulate => {
                for (id, grad) in grads {
                    if let Some(slot) = self.nodes[id.0].slot.as_mut() {
                        slot.grad.accumulate(&grad)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the backward formulas over the subgraph reachable from `output`
    /// and returns the gradient of every reachable node.
    fn propagate(&self, output: NodeId, seed: Value) -> Result<Gradients> {
        let (mut grads, mut pending) = self.reachable(output)?;
        grads.insert(output, seed);
        debug!("backward {output}: {} reachable node(s)", grads.len());

        let tolerance = self.config.singular_tolerance;
        let total = grads.len();
        let mut released = 0usize;
        let mut ready = Vec::new();
        if pending.get(&output).copied().unwrap_or(0) == 0 {
            ready.push(output);
        }

        while let Some(id) = ready.pop() {
            released += 1;
            let Some(producer) = self.nodes[id.0].producer else {
                continue;
            };
            trace!("backward {id} ({})", producer.name());

            let y = self.value(id)?;
            let g = grads.get(&id).cloned().ok_or(Error::NotEvaluated(id))?;
            match producer {
                Producer::Unary(op, [x]) => {
                    let dx = grads.get_mut(&x).ok_or(Error::MissingOperand { node: id, operand: x })?;
                    op.backward(self.value(x)?, y, &g, dx, tolerance)?;
                }
                Producer::Binary(op, [a, b]) => {
                    let (av, bv) = (self.value(a)?, self.value(b)?);
                    let da = grads.get_mut(&a).ok_or(Error::MissingOperand { node: id, operand: a })?;
                    op.backward_lhs(av, bv, &g, da)?;
                    let db = grads.get_mut(&b).ok_or(Error::MissingOperand { node: id, operand: b })?;
                    op.backward_rhs(av, bv, &g, db)?;
                }
            }

            for &operand in producer.operands() {
                if let Some(count) = pending.get_mut(&operand) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(operand);
                    }
                }
            }
        }

        if released != total {
            return Err(Error::Cycle {
                remaining: total - released,
            });
        }
        Ok(grads)
    }

    /// Zero gradients and reachable-consumer counts for every node reachable from `output`.
    fn reachable(&self, output: NodeId) -> Result<(Gradients, HashMap<NodeId, usize>)> {
        let mut grads = Gradients::new();
        let mut pending: HashMap<NodeId, usize> = HashMap::new();
        let mut stack = vec![output];

        while let Some(id) = stack.pop() {
            if grads.contains_key(&id) {
                continue;
            }
            let node = self.node(id)?;
            let slot = node.slot.as_ref().ok_or(Error::NotEvaluated(id))?;
            grads.insert(id, slot.value.zeros_like());

            for &operand in node.producer.as_ref().map_or(&[][..], Producer::operands) {
                if operand.0 >= self.nodes.len() {
                    return Err(Error::MissingOperand { node: id, operand });
                }
                *pending.entry(operand).or_insert(0) += 1;
                stack.push(operand);
            }
        }
        Ok((grads, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Two nodes that consume each other, which the public API cannot build.
    fn cyclic_graph() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new();
        let x = g.leaf(tensor!([[1.0, 2.0], [3.0, 4.0]]));
        let a = g.transpose(x).unwrap();
        let b = g.transpose(a).unwrap();
        g.nodes[a.0].producer = Some(Producer::Unary(UnaryOp::Transpose, [b]));
        (g, a, b)
    }

    #[test]
    fn forward_detects_cycle() {
        init();
        let (mut g, _, b) = cyclic_graph();
        assert!(matches!(g.forward(b), Err(Error::Cycle { .. })));
        assert_eq!(g.evaluations(), 0);
    }

    #[test]
    fn backward_detects_cycle() {
        init();
        let (mut g, a, b) = cyclic_graph();
        let value = Value::Tensor(tensor!([[1.0, 0.0], [0.0, 1.0]]));
        g.nodes[a.0].slot = Some(WithGrad::new(value.clone()));
        g.nodes[b.0].slot = Some(WithGrad::new(value));
        assert!(matches!(g.backward(b), Err(Error::Cycle { .. })));
    }

    #[test]
    fn dangling_operand_is_reported() {
        init();
        let mut g = Graph::new();
        let x = g.leaf(tensor!([[1.0]]));
        let y = g.neg(x).unwrap();
        g.nodes[y.0].producer = Some(Producer::Unary(UnaryOp::Neg, [NodeId(42)]));
        assert_eq!(
            g.forward(y).unwrap_err(),
            Error::MissingOperand {
                node: y,
                operand: NodeId(42)
            }
        );
    }

    #[test]
    fn reachable_counts_every_consumer_edge() {
        let mut g = Graph::new();
        let x = g.leaf(tensor!([[1.0, 2.0], [3.0, 4.0]]));
        let xx = g.dot(x, x).unwrap();
        let xt = g.transpose(x).unwrap();
        let out = g.add(xx, xt).unwrap();
        g.forward(out).unwrap();

        let (grads, pending) = g.reachable(out).unwrap();
        assert_eq!(grads.len(), 4);
        assert_eq!(pending[&x], 3);
        assert_eq!(pending[&xx], 1);
        assert!(!pending.contains_key(&out));
    }

    #[test]
    fn set_value_only_invalidates_descendants() {
        let mut g = Graph::new();
        let a = g.leaf(tensor!([[1.0, 0.0], [0.0, 2.0]]));
        let b = g.leaf(tensor!([[3.0, 1.0], [1.0, 3.0]]));
        let ia = g.inverse(a).unwrap();
        let ib = g.inverse(b).unwrap();
        let out = g.dot(ia, ib).unwrap();
        g.forward(out).unwrap();

        g.set_value(b, tensor!([[2.0, 0.0], [0.0, 2.0]])).unwrap();
        assert!(g.value(ia).is_ok());
        assert_eq!(g.value(ib), Err(Error::NotEvaluated(ib)));
        assert_eq!(g.value(out), Err(Error::NotEvaluated(out)));
        assert_eq!(g.version(), 1);
    }
}
