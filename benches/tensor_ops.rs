//! Core tensor operation benchmarks
//!
//! - Binary operations, with and without broadcasting
//! - Unary primitives and composite activations
//! - Reductions and strided views
//! - Matrix multiplication and convolution
//! - Backward passes through small graphs

use ampere::{Conv2dOptions, Tensor};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn sine_tensor(shape: &[usize]) -> Tensor {
    let size: usize = shape.iter().product();
    let data: Vec<f32> = (0..size).map(|i| (i as f32 * 0.01).sin()).collect();
    Tensor::new(data, shape, false)
}

// ===== BINARY OPERATIONS =====

fn bench_binary_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary_ops");

    for size in [256, 4096, 65536] {
        group.bench_with_input(BenchmarkId::new("add", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            let y = sine_tensor(&[s]);
            b.iter(|| black_box(&x).add(black_box(&y)))
        });

        group.bench_with_input(BenchmarkId::new("mul", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            let y = sine_tensor(&[s]);
            b.iter(|| black_box(&x).mul(black_box(&y)))
        });

        group.bench_with_input(BenchmarkId::new("div", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            let y = sine_tensor(&[s]).add_scalar(2.0);
            b.iter(|| black_box(&x).div(black_box(&y)))
        });
    }

    group.bench_function("broadcast_add", |b| {
        let x = sine_tensor(&[256, 256]);
        let y = sine_tensor(&[256, 1]);
        b.iter(|| black_box(&x).add(black_box(&y)))
    });

    group.finish();
}

// ===== UNARY OPERATIONS =====

fn bench_unary_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("unary_ops");

    for size in [4096, 65536] {
        group.bench_with_input(BenchmarkId::new("exp", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            b.iter(|| black_box(&x).exp())
        });

        group.bench_with_input(BenchmarkId::new("relu", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            b.iter(|| black_box(&x).relu())
        });

        group.bench_with_input(BenchmarkId::new("sigmoid", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            b.iter(|| black_box(&x).sigmoid())
        });

        group.bench_with_input(BenchmarkId::new("gelu", size), &size, |b, &s| {
            let x = sine_tensor(&[s]);
            b.iter(|| black_box(&x).gelu())
        });
    }

    group.finish();
}

// ===== REDUCTIONS AND VIEWS =====

fn bench_reduce_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_ops");

    for n in [64, 256] {
        group.bench_with_input(BenchmarkId::new("sum_rows", n), &n, |b, &n| {
            let x = sine_tensor(&[n, n]);
            b.iter(|| black_box(&x).sum(1))
        });

        group.bench_with_input(BenchmarkId::new("max_cols", n), &n, |b, &n| {
            let x = sine_tensor(&[n, n]);
            b.iter(|| black_box(&x).max(0))
        });

        group.bench_with_input(BenchmarkId::new("sum_transposed", n), &n, |b, &n| {
            let x = sine_tensor(&[n, n]).permute(&[1, 0]);
            b.iter(|| black_box(&x).sum(1))
        });

        group.bench_with_input(BenchmarkId::new("softmax", n), &n, |b, &n| {
            let x = sine_tensor(&[n, n]);
            b.iter(|| black_box(&x).softmax(-1))
        });
    }

    group.bench_function("contiguous_copy", |b| {
        let x = sine_tensor(&[128, 256]).permute(&[1, 0]);
        b.iter(|| black_box(&x).contiguous())
    });

    group.finish();
}

// ===== MATRIX MULTIPLICATION =====

fn bench_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul");
    group.sample_size(20);

    for n in [16, 64, 128] {
        group.bench_with_input(BenchmarkId::new("square", n), &n, |b, &n| {
            let x = sine_tensor(&[n, n]);
            let y = sine_tensor(&[n, n]);
            b.iter(|| black_box(&x).matmul(black_box(&y)))
        });
    }

    group.bench_function("batched_8x32x32", |b| {
        let x = sine_tensor(&[8, 32, 32]);
        let y = sine_tensor(&[32, 32]);
        b.iter(|| black_box(&x).matmul(black_box(&y)))
    });

    group.finish();
}

// ===== CONVOLUTION =====

fn bench_conv(c: &mut Criterion) {
    let mut group = c.benchmark_group("conv2d");
    group.sample_size(20);

    for size in [16, 32] {
        group.bench_with_input(BenchmarkId::new("3x3_pad1", size), &size, |b, &s| {
            let x = sine_tensor(&[4, 8, s, s]);
            let w = sine_tensor(&[16, 8, 3, 3]);
            let opts = Conv2dOptions::default().padding(1);
            b.iter(|| black_box(&x).conv2d(black_box(&w), None, opts))
        });
    }

    group.bench_function("grouped_stride2", |b| {
        let x = sine_tensor(&[4, 16, 32, 32]);
        let w = sine_tensor(&[32, 4, 3, 3]);
        let opts = Conv2dOptions::default().stride(2).groups(4);
        b.iter(|| black_box(&x).conv2d(black_box(&w), None, opts))
    });

    group.bench_function("max_pool2d", |b| {
        let x = sine_tensor(&[4, 16, 32, 32]);
        b.iter(|| black_box(&x).max_pool2d(2))
    });

    group.finish();
}

// ===== BACKWARD =====

fn bench_backward(c: &mut Criterion) {
    let mut group = c.benchmark_group("backward");
    group.sample_size(20);

    group.bench_function("mlp_64", |b| {
        let x = sine_tensor(&[32, 64]);
        let w1 = sine_tensor(&[64, 64]).requires_grad_(true);
        let w2 = sine_tensor(&[64, 10]).requires_grad_(true);
        b.iter(|| {
            let loss = x.matmul(&w1).relu().matmul(&w2).log_softmax(-1).mean_all();
            loss.backward();
            w1.zero_grad();
            w2.zero_grad();
        })
    });

    group.bench_function("conv_block", |b| {
        let x = sine_tensor(&[2, 3, 16, 16]);
        let w = sine_tensor(&[8, 3, 3, 3]).requires_grad_(true);
        let opts = Conv2dOptions::default().padding(1);
        b.iter(|| {
            let loss = x.conv2d(&w, None, opts).relu().max_pool2d(2).mean_all();
            loss.backward();
            w.zero_grad();
        })
    });

    group.bench_function("long_chain_500", |b| {
        let x = sine_tensor(&[16]).requires_grad_(true);
        b.iter(|| {
            let mut y = x.clone();
            for _ in 0..500 {
                y = y.mul_scalar(0.999).add_scalar(0.001);
            }
            y.sum_all().backward();
            x.zero_grad();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_binary_ops,
    bench_unary_ops,
    bench_reduce_ops,
    bench_matmul,
    bench_conv,
    bench_backward
);
criterion_main!(benches);
