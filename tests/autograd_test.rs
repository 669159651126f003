//! Graph construction and the backward pass through the public API.

use ampere::{Axes, Conv2dOptions, Tensor, TensorError};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn approx_eq(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() < tol
}

fn leaf(data: &[f32], shape: &[usize]) -> Tensor {
    Tensor::new(data.to_vec(), shape, true)
}

#[test]
fn test_reused_node_gradient() {
    let x = leaf(&[1.5, -2.0, 3.0], &[3]);
    let y = (&(&x + &x) * &x).sum_all();
    y.backward();
    // d/dx (2x * x) = 4x
    assert_eq!(x.grad().unwrap(), vec![6.0, -8.0, 12.0]);
}

#[test]
fn test_each_node_visited_once() {
    // every branch below reuses `h`; a double visit would double its gradient
    let x = leaf(&[2.0], &[1]);
    let h = x.exp();
    let y = &(&h * &h) + &h.log();
    y.backward();
    let e2 = 2.0f32.exp();
    assert!(approx_eq(x.grad().unwrap()[0], 2.0 * e2 * e2 + 1.0, 1e-2));
}

#[test]
fn test_gradients_accumulate_until_zeroed() {
    let x = leaf(&[1.0, 2.0], &[2]);
    x.mul_scalar(3.0).sum_all().backward();
    x.mul_scalar(3.0).sum_all().backward();
    assert_eq!(x.grad().unwrap(), vec![6.0, 6.0]);
    x.zero_grad();
    assert!(x.grad().is_none());
}

#[test]
fn test_non_scalar_root_is_an_error() {
    let x = leaf(&[1.0, 2.0], &[2]);
    let err = x.exp().try_backward().unwrap_err();
    assert!(matches!(err, TensorError::NonScalarRoot(ref shape) if shape == &vec![2]));
    assert!(x.grad().is_none());
}

#[test]
fn test_graph_without_trainable_leaves() {
    let x: Tensor = Tensor::new(vec![1.0, 2.0], &[2], false);
    let y = x.exp().sum_all();
    assert!(!y.requires_grad());
    assert!(y.is_leaf());
    y.backward();
    assert!(x.grad().is_none());
}

#[test]
fn test_interior_nodes_keep_no_gradient() {
    let x = leaf(&[1.0], &[1]);
    let h = x.mul_scalar(2.0);
    h.exp().backward();
    assert!(!h.is_leaf());
    assert!(h.grad().is_none());
    assert!(x.grad().is_some());
}

#[test]
fn test_max_tie_break_is_stable() {
    let data = [1.0, 1.0, 0.0, 1.0];
    for _ in 0..5 {
        let x = leaf(&data, &[1, 4]);
        x.max(Axes::All).backward();
        assert_eq!(x.grad().unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
    }
    let x = leaf(&[3.0, 5.0, 5.0, 1.0, 1.0, 0.0], &[2, 3]);
    x.max(1).sum_all().backward();
    assert_eq!(x.grad().unwrap(), vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_min_routes_to_first_minimum() {
    let x = leaf(&[2.0, -1.0, -1.0], &[3]);
    x.min(0).backward();
    assert_eq!(x.grad().unwrap(), vec![0.0, 1.0, 0.0]);
}

#[test]
fn test_linear_regression_converges() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(42);
    let xs: Tensor = Tensor::randn_with_rng(&[32, 3], &mut rng);
    let true_w: Tensor = Tensor::new(vec![2.0, -1.0, 0.5], &[3, 1], false);
    let ys = xs.matmul(&true_w).add_scalar(0.3);

    let mut w: Tensor = Tensor::zeros(&[3, 1]).requires_grad_(true);
    let mut b: Tensor = Tensor::zeros(&[1]).requires_grad_(true);
    let mut first_loss = None;
    let mut loss_value = f32::MAX;
    for _ in 0..200 {
        let pred = &xs.matmul(&w) + &b;
        let loss = (&pred - &ys).square().mean_all();
        loss.backward();
        loss_value = loss.item();
        first_loss.get_or_insert(loss_value);

        let step = |p: &Tensor| {
            let g = p.grad_tensor().unwrap();
            (p.detach() - g.mul_scalar(0.1)).requires_grad_(true)
        };
        w = step(&w);
        b = step(&b);
    }
    assert!(loss_value < first_loss.unwrap() * 1e-3, "loss {loss_value}");
    let learned = w.to_vec();
    for (got, want) in learned.iter().zip([2.0, -1.0, 0.5]) {
        assert!(approx_eq(*got, want, 1e-2), "weights {learned:?}");
    }
    assert!(approx_eq(b.item(), 0.3, 1e-2));
}

#[test]
fn test_small_cnn_backward_reaches_every_parameter() {
    let mut rng = StdRng::seed_from_u64(7);
    let x: Tensor = Tensor::randn_with_rng(&[2, 1, 8, 8], &mut rng);
    let w1: Tensor = Tensor::uniform_with_rng(&[4, 1, 3, 3], &mut rng).requires_grad_(true);
    let w2: Tensor = Tensor::uniform_with_rng(&[4 * 4 * 4, 5], &mut rng).requires_grad_(true);
    let labels: Tensor = Tensor::eye(5).shrink(&[(0, 2), (0, 5)]);

    let h = x
        .conv2d(&w1, None, Conv2dOptions::default().padding(1))
        .relu()
        .max_pool2d(2);
    assert_eq!(h.shape(), &[2, 4, 4, 4]);
    let logits = h.reshape(&[2, 4 * 4 * 4]).matmul(&w2);
    let loss = (logits.log_softmax(-1) * labels).sum_all().neg().div_scalar(2.0);
    loss.backward();

    for (name, p) in [("w1", &w1), ("w2", &w2)] {
        let g = p.grad().unwrap();
        assert_eq!(g.len(), p.numel(), "{name}");
        assert!(g.iter().all(|v| v.is_finite()), "{name}");
        assert!(g.iter().any(|&v| v != 0.0), "{name}");
    }
}
