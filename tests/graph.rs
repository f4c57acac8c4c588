use approx::assert_abs_diff_eq;
use linalg_grad::{
    Error, GradPolicy, Graph, GraphConfig, Ten64, UnaryOp, Value, tensor,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tensor_of(v: &Value) -> &Ten64 {
    v.as_tensor().expect("tensor value")
}

fn sample() -> Ten64 {
    tensor!([[1.0, 2.0], [3.0, 4.0]])
}

#[test]
fn test_nodes_are_lazy() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let t = g.transpose(x).unwrap();

    assert_eq!(g.len(), 2);
    assert!(!g.is_empty());
    assert_eq!(g.value(t), Err(Error::NotEvaluated(t)));
    assert_eq!(g.evaluations(), 0);
    assert!(g.value(x).is_ok());
}

#[test]
fn test_introspection() {
    let mut g = Graph::new();
    assert!(g.is_empty());
    let a = g.leaf(sample());
    let b = g.leaf(sample());
    let ab = g.dot(a, b).unwrap();
    let inv = g.apply_unary(UnaryOp::Inverse, ab).unwrap();

    assert_eq!(g.op_name(a).unwrap(), "leaf");
    assert_eq!(g.op_name(ab).unwrap(), "dot");
    assert_eq!(g.op_name(inv).unwrap(), "inverse");
    assert_eq!(g.operands(ab).unwrap(), &[a, b]);
    assert_eq!(g.operands(inv).unwrap(), &[ab]);
    assert!(g.operands(a).unwrap().is_empty());
    assert!(g.is_leaf(a).unwrap());
    assert!(!g.is_leaf(inv).unwrap());
    assert_eq!(inv.index(), 3);
    assert_eq!(inv.to_string(), "#3");
}

#[test]
fn test_forward_is_memoized() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(tensor!([[4.5, 1.4, 2.1], [-3.0, 2.0, 1.0], [-2.0, 0.3, 9.2]]));
    let inv = g.inverse(x).unwrap();
    let xt = g.transpose(inv).unwrap();
    let out = g.dot(xt, x).unwrap();

    let first = g.forward(out).unwrap().clone();
    let evaluations = g.evaluations();
    assert_eq!(evaluations, 3);

    let second = g.forward(out).unwrap().clone();
    assert_eq!(g.evaluations(), evaluations);
    let bits = |v: &Value| -> Vec<u64> { tensor_of(v).data.iter().map(|x| x.to_bits()).collect() };
    assert_eq!(bits(&first), bits(&second));

    // intermediate results are cached along the way
    g.forward(inv).unwrap();
    assert_eq!(g.evaluations(), evaluations);
}

#[test]
fn test_shared_subexpression_evaluated_once() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let inv = g.inverse(x).unwrap();
    let a = g.transpose(inv).unwrap();
    let b = g.neg(inv).unwrap();
    let out = g.add(a, b).unwrap();

    g.forward(out).unwrap();
    assert_eq!(g.evaluations(), 4);
}

#[test]
fn test_fan_out_gradients_add_up() {
    init();
    let x0 = sample();

    // X feeds both transpose(X) and dot(X, X)
    let mut g = Graph::new();
    let x = g.leaf(x0.clone());
    let xt = g.transpose(x).unwrap();
    let xx = g.dot(x, x).unwrap();
    let out = g.add(xt, xx).unwrap();
    g.forward(out).unwrap();
    g.backward(out).unwrap();
    let combined = tensor_of(g.grad(x).unwrap()).clone();

    let mut only_t = Graph::new();
    let x1 = only_t.leaf(x0.clone());
    let t = only_t.transpose(x1).unwrap();
    only_t.forward(t).unwrap();
    only_t.backward(t).unwrap();

    let mut only_dot = Graph::new();
    let x2 = only_dot.leaf(x0.clone());
    let d = only_dot.dot(x2, x2).unwrap();
    only_dot.forward(d).unwrap();
    only_dot.backward(d).unwrap();

    let expected = tensor_of(only_t.grad(x1).unwrap())
        .add(tensor_of(only_dot.grad(x2).unwrap()))
        .unwrap();
    assert_eq!(combined, expected);

    // G·Xᵗ + Xᵗ·G + 1 with G = ones
    let ones = Ten64::ones(vec![2, 2]);
    let by_hand = ones
        .matmul(&x0.transpose().unwrap())
        .unwrap()
        .add(&x0.transpose().unwrap().matmul(&ones).unwrap())
        .unwrap()
        .add(&ones)
        .unwrap();
    assert_eq!(combined, by_hand);
}

#[test]
fn test_gradient_complete_before_propagation() {
    init();
    // inverse(X) reaches the output through two paths; its backward formula
    // must see the sum of both before running.
    let mut g = Graph::new();
    let x = g.leaf(tensor!([[2.0, 1.0], [1.0, 3.0]]));
    let inv = g.inverse(x).unwrap();
    let a = g.transpose(inv).unwrap();
    let b = g.dot(inv, inv).unwrap();
    let s = g.add(a, b).unwrap();
    let out = g.sum(s).unwrap();
    g.forward(out).unwrap();
    g.backward(out).unwrap();

    let y = tensor_of(g.value(inv).unwrap()).clone();
    let ones = Ten64::ones(vec![2, 2]);
    let g_inv = ones
        .add(&ones.matmul(&y.transpose().unwrap()).unwrap())
        .unwrap()
        .add(&y.transpose().unwrap().matmul(&ones).unwrap())
        .unwrap();
    for (a, b) in tensor_of(g.grad(inv).unwrap()).data.iter().zip(&g_inv.data) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }

    let yt = y.transpose().unwrap();
    let dx = yt.matmul(&g_inv).unwrap().matmul(&yt).unwrap().neg();
    let got = tensor_of(g.grad(x).unwrap());
    for (a, b) in got.data.iter().zip(&dx.data) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn test_backward_requires_forward() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let det = g.determinant(x).unwrap();
    assert_eq!(g.backward(det), Err(Error::NotEvaluated(det)));
    assert_eq!(g.grad(det), Err(Error::NotEvaluated(det)));
}

#[test]
fn test_seed_shape_is_checked() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let t = g.transpose(x).unwrap();
    g.forward(t).unwrap();

    assert!(matches!(
        g.backward_with(t, Ten64::ones(vec![3, 2])),
        Err(Error::Shape { op: "backward", .. })
    ));
    assert!(matches!(
        g.backward_with(t, 1.0),
        Err(Error::Shape { op: "backward", .. })
    ));
}

#[test]
fn test_foreign_node_rejected() {
    let mut small = Graph::new();
    let mut big = Graph::new();
    small.leaf(sample());
    let _ = big.leaf(sample());
    let _ = big.leaf(sample());
    let far = big.leaf(sample());

    assert_eq!(small.transpose(far), Err(Error::UnknownNode(far)));
    assert_eq!(small.forward(far).unwrap_err(), Error::UnknownNode(far));
    assert_eq!(small.value(far), Err(Error::UnknownNode(far)));
    assert_eq!(small.len(), 1);
}

#[test]
fn test_set_value_requires_leaf() {
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let t = g.transpose(x).unwrap();
    assert_eq!(g.set_value(t, sample()), Err(Error::NotALeaf(t)));
    assert_eq!(g.version(), 0);
}

#[test]
fn test_set_value_invalidates_downstream() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(tensor!([[2.0, 0.0], [0.0, 4.0]]));
    let inv = g.inverse(x).unwrap();
    let det = g.determinant(inv).unwrap();

    assert_abs_diff_eq!(g.forward(det).unwrap().as_scalar().unwrap(), 0.125);
    g.backward(det).unwrap();

    g.set_value(x, tensor!([[1.0, 0.0], [0.0, 5.0]])).unwrap();
    assert_eq!(g.version(), 1);
    assert_eq!(g.value(det), Err(Error::NotEvaluated(det)));
    assert_eq!(tensor_of(g.grad(x).unwrap()).data, vec![0.0; 4]);

    assert_abs_diff_eq!(g.forward(det).unwrap().as_scalar().unwrap(), 0.2);
    assert_eq!(g.evaluations(), 4);
}

#[test]
fn test_reset_policy_repeats_gradients() {
    init();
    let mut g = Graph::new();
    let a = g.leaf(sample());
    let b = g.leaf(tensor!([[0.0, 1.0], [1.0, 0.0]]));
    let ab = g.dot(a, b).unwrap();
    let out = g.sum(ab).unwrap();
    g.forward(out).unwrap();

    g.backward(out).unwrap();
    let first = g.grad(a).unwrap().clone();
    g.backward(out).unwrap();
    assert_eq!(g.grad(a).unwrap(), &first);
}

#[test]
fn test_reset_policy_clears_unreached_nodes() {
    init();
    let mut g = Graph::new();
    let a = g.leaf(sample());
    let b = g.leaf(sample());
    let sa = g.sum(a).unwrap();
    let sb = g.sum(b).unwrap();
    g.forward(sa).unwrap();
    g.forward(sb).unwrap();

    g.backward(sa).unwrap();
    assert_eq!(tensor_of(g.grad(a).unwrap()).data, vec![1.0; 4]);
    g.backward(sb).unwrap();
    assert_eq!(tensor_of(g.grad(a).unwrap()).data, vec![0.0; 4]);
    assert_eq!(tensor_of(g.grad(b).unwrap()).data, vec![1.0; 4]);
}

#[test]
fn test_accumulate_policy() {
    init();
    let cfg = GraphConfig::default().with_grad_policy(GradPolicy::Accumulate);
    let mut g = Graph::with_config(cfg);
    assert_eq!(g.config().grad_policy, GradPolicy::Accumulate);

    let a = g.leaf(sample());
    let sa = g.sum(a).unwrap();
    let ta = g.transpose(a).unwrap();
    g.forward(sa).unwrap();
    g.forward(ta).unwrap();

    g.backward(sa).unwrap();
    g.backward(sa).unwrap();
    assert_eq!(tensor_of(g.grad(a).unwrap()).data, vec![2.0; 4]);

    g.backward_with(ta, tensor!([[1.0, 2.0], [3.0, 4.0]])).unwrap();
    assert_eq!(tensor_of(g.grad(a).unwrap()).data, vec![3.0, 5.0, 4.0, 6.0]);

    g.zero_grad();
    assert_eq!(tensor_of(g.grad(a).unwrap()).data, vec![0.0; 4]);
}

#[test]
fn test_failed_backward_keeps_previous_gradients() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let sx = g.sum(x).unwrap();
    let singular = g.leaf(tensor!([[1.0, 1.0], [1.0, 1.0]]));
    let det = g.determinant(singular).unwrap();
    let both = g.add(sx, det).unwrap();

    g.forward(sx).unwrap();
    g.backward(sx).unwrap();
    let before = g.grad(x).unwrap().clone();

    assert_eq!(g.forward(both).unwrap(), &Value::Scalar(10.0));
    assert!(matches!(g.backward(both), Err(Error::Singular { .. })));
    assert_eq!(g.grad(x).unwrap(), &before);
    assert_eq!(g.grad(both).unwrap(), &Value::Scalar(0.0));
}

#[test]
fn test_failed_forward_caches_nothing() {
    init();
    let mut g = Graph::new();
    let x = g.leaf(sample());
    let t = g.transpose(x).unwrap();
    let bad = g.diag(t).unwrap();

    assert!(g.forward(bad).is_err());
    assert_eq!(g.value(t), Err(Error::NotEvaluated(t)));
    assert_eq!(g.evaluations(), 0);
}

#[test]
fn test_singular_tolerance_is_configurable() {
    init();
    let near = tensor!([[1.0, 0.0], [0.0, 1e-8]]);

    let mut strict = Graph::with_config(GraphConfig::default().with_singular_tolerance(1e-6));
    let x = strict.leaf(near.clone());
    let inv = strict.inverse(x).unwrap();
    assert!(matches!(strict.forward(inv), Err(Error::Singular { .. })));

    let mut lenient = Graph::new();
    let x = lenient.leaf(near);
    let inv = lenient.inverse(x).unwrap();
    assert_abs_diff_eq!(
        tensor_of(lenient.forward(inv).unwrap()).data[3],
        1e8,
        epsilon = 1e-4
    );
}

#[test]
fn test_node_ids_order() {
    let mut g = Graph::new();
    let a = g.leaf(sample());
    let b = g.neg(a).unwrap();
    assert!(a < b);
    assert_eq!(b.index(), 1);
    assert_eq!(g.operands(b).unwrap(), &[a]);
}
