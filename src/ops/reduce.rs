//! Reductions and their gradients.
//!
//! The primitive keeps reduced axes as size-1 axes; the tensor methods drop
//! them afterwards unless a `*_keepdim` form is used. Reducing every axis
//! without keepdim yields shape `[1]`.

use crate::autograd::GradFn;
use crate::backend::Backend;
use crate::error::{Result, fatal};
use crate::ops::{MovementOp, ReduceOp};
use crate::options::Axes;
use crate::shape::{contiguous_strides, reduced_shape};
use crate::tensor::Tensor;

/// Sum: the gradient is expanded back over the reduced axes.
struct SumGradFn {
    input_shape: Vec<usize>,
}

impl<B: Backend> GradFn<B> for SumGradFn {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        if !needs_grad[0] {
            return Ok(vec![None]);
        }
        let dx = B::movement_op(grad, &MovementOp::Expand(self.input_shape.clone()))?;
        Ok(vec![Some(dx)])
    }
}

/// Max: each reduced group sends its gradient to a single position, the
/// first maximal element in row-major order (the first NaN when the maximum
/// is NaN). The routing runs on the host through `to_vec`/`from_vec`.
struct MaxGradFn<B: Backend> {
    x: B::Buffer,
    out: B::Buffer,
}

impl<B: Backend> GradFn<B> for MaxGradFn<B> {
    fn name(&self) -> &'static str {
        "max"
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        if !needs_grad[0] {
            return Ok(vec![None]);
        }
        let in_shape = B::shape(&self.x).to_vec();
        let out_shape = B::shape(&self.out);
        let x = B::to_vec(&self.x);
        let maxima = B::to_vec(&self.out);
        let g = B::to_vec(grad);

        // output position of every input element: reduced axes contribute nothing
        let mut out_strides = contiguous_strides(out_shape);
        for (stride, &dim) in out_strides.iter_mut().zip(out_shape) {
            if dim == 1 {
                *stride = 0;
            }
        }
        let mut routed = vec![false; maxima.len()];
        let mut dx = vec![0.0; x.len()];
        let mut index = vec![0usize; in_shape.len()];
        for (flat, &value) in x.iter().enumerate() {
            let group: isize = index
                .iter()
                .zip(&out_strides)
                .map(|(&i, &s)| i as isize * s)
                .sum();
            let group = group as usize;
            let max = maxima[group];
            let is_max = value == max || (value.is_nan() && max.is_nan());
            if !routed[group] && is_max {
                routed[group] = true;
                dx[flat] = g[group];
            }
            for axis in (0..in_shape.len()).rev() {
                index[axis] += 1;
                if index[axis] < in_shape[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Ok(vec![Some(B::from_vec(dx, &in_shape)?)])
    }
}

impl<B: Backend> Tensor<B> {
    /// The reduce primitive: `new_shape` keeps the rank, with 1 on every
    /// reduced axis.
    #[track_caller]
    pub fn reduce(&self, op: ReduceOp, new_shape: &[usize]) -> Self {
        let out = fatal(B::reduce_op(self.buffer(), op, new_shape));
        match op {
            ReduceOp::Sum => Tensor::from_op(
                out,
                &[self],
                SumGradFn {
                    input_shape: self.shape().to_vec(),
                },
            ),
            ReduceOp::Max => {
                let grad_fn = MaxGradFn::<B> {
                    x: self.buffer().clone(),
                    out: out.clone(),
                };
                Tensor::from_op(out, &[self], grad_fn)
            }
        }
    }

    #[track_caller]
    fn reduce_axes(&self, op: ReduceOp, axes: Axes, keepdim: bool) -> Self {
        let axes = fatal(axes.resolve(self.ndim()));
        self.reduce_resolved(op, &axes, keepdim)
    }

    #[track_caller]
    fn reduce_resolved(&self, op: ReduceOp, axes: &[usize], keepdim: bool) -> Self {
        let kept = self.reduce(op, &reduced_shape(self.shape(), axes));
        if keepdim {
            return kept;
        }
        let mut squeezed: Vec<usize> = self
            .shape()
            .iter()
            .enumerate()
            .filter(|(i, _)| !axes.contains(i))
            .map(|(_, &d)| d)
            .collect();
        if squeezed.is_empty() {
            squeezed.push(1);
        }
        kept.reshape(&squeezed)
    }

    /// Sum over `axes`, dropping them.
    #[track_caller]
    pub fn sum(&self, axes: impl Into<Axes>) -> Self {
        self.reduce_axes(ReduceOp::Sum, axes.into(), false)
    }

    #[track_caller]
    pub fn sum_keepdim(&self, axes: impl Into<Axes>) -> Self {
        self.reduce_axes(ReduceOp::Sum, axes.into(), true)
    }

    /// Sum of every element, shape `[1]`.
    pub fn sum_all(&self) -> Self {
        self.sum(Axes::All)
    }

    #[track_caller]
    pub fn max(&self, axes: impl Into<Axes>) -> Self {
        self.reduce_axes(ReduceOp::Max, axes.into(), false)
    }

    #[track_caller]
    pub fn max_keepdim(&self, axes: impl Into<Axes>) -> Self {
        self.reduce_axes(ReduceOp::Max, axes.into(), true)
    }

    #[track_caller]
    pub fn min(&self, axes: impl Into<Axes>) -> Self {
        self.neg().max(axes).neg()
    }

    #[track_caller]
    pub fn min_keepdim(&self, axes: impl Into<Axes>) -> Self {
        self.neg().max_keepdim(axes).neg()
    }

    #[track_caller]
    pub fn mean(&self, axes: impl Into<Axes>) -> Self {
        self.mean_impl(axes.into(), false)
    }

    #[track_caller]
    pub fn mean_keepdim(&self, axes: impl Into<Axes>) -> Self {
        self.mean_impl(axes.into(), true)
    }

    pub fn mean_all(&self) -> Self {
        self.mean(Axes::All)
    }

    #[track_caller]
    fn mean_impl(&self, axes: Axes, keepdim: bool) -> Self {
        let axes = fatal(axes.resolve(self.ndim()));
        let count: usize = axes.iter().map(|&a| self.shape()[a]).product();
        let total = self.reduce_resolved(ReduceOp::Sum, &axes, keepdim);
        total.div_scalar(count.max(1) as f32)
    }

    /// Softmax along `axis` (negative counts from the end).
    #[track_caller]
    pub fn softmax(&self, axis: isize) -> Self {
        let axes = Axes::from_signed(axis);
        let shifted = self.sub(&self.max_keepdim(axes.clone()).detach());
        let e = shifted.exp();
        &e / &e.sum_keepdim(axes)
    }

    #[track_caller]
    pub fn log_softmax(&self, axis: isize) -> Self {
        let axes = Axes::from_signed(axis);
        let shifted = self.sub(&self.max_keepdim(axes.clone()).detach());
        let log_norm = shifted.exp().sum_keepdim(axes).log();
        shifted.sub(&log_norm)
    }
}
