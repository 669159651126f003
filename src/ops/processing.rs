//! The convolution primitive and its gradient.
//!
//! Both gradients are themselves convolutions, built from movement
//! primitives on the backend buffers:
//!
//! - input: the output gradient is zero-stuffed back to stride 1, padded by
//!   the dilated kernel extent, and correlated with the per-group
//!   transposed and spatially flipped weights.
//! - weight: the input, with batch and channel axes swapped, is correlated
//!   with the output gradient used as the kernel. Stride and dilation trade
//!   places and the output is cut to the kernel size.

use crate::autograd::GradFn;
use crate::backend::Backend;
use crate::error::{Result, fatal};
use crate::ops::{ConvArgs, MovementOp, ProcessingOp};
use crate::tensor::Tensor;

struct ConvGradFn<B: Backend> {
    x: B::Buffer,
    w: B::Buffer,
    args: ConvArgs,
}

impl<B: Backend> ConvGradFn<B> {
    fn input_grad(&self, grad: &B::Buffer) -> Result<B::Buffer> {
        let a = &self.args;

        // zero-stuff the strided output back onto the stride-1 grid
        let mut g = grad.clone();
        if a.sy > 1 || a.sx > 1 {
            g = B::movement_op(&g, &MovementOp::Reshape(vec![a.bs, a.cout, a.oy, 1, a.ox, 1]))?;
            g = B::movement_op(
                &g,
                &MovementOp::Pad(vec![
                    (0, 0),
                    (0, 0),
                    (0, 0),
                    (0, a.sy - 1),
                    (0, 0),
                    (0, a.sx - 1),
                ]),
            )?;
            g = B::movement_op(
                &g,
                &MovementOp::Reshape(vec![a.bs, a.cout, a.oy * a.sy, a.ox * a.sx]),
            )?;
        }

        // (groups*rcout, cin, h, w) -> (groups*cin, rcout, h, w), flipped
        let mut wt = B::movement_op(
            &self.w,
            &MovementOp::Reshape(vec![a.groups, a.rcout, a.cin, a.h, a.w]),
        )?;
        wt = B::movement_op(&wt, &MovementOp::Permute(vec![0, 2, 1, 3, 4]))?;
        wt = B::movement_op(&wt, &MovementOp::Flip(vec![3, 4]))?;
        wt = B::movement_op(
            &wt,
            &MovementOp::Reshape(vec![a.groups * a.cin, a.rcout, a.h, a.w]),
        )?;

        let top = (a.h - 1) * a.dy;
        let left = (a.w - 1) * a.dx;
        let bottom = a.iy as isize - (a.oy * a.sy) as isize;
        let right = a.ix as isize - (a.ox * a.sx) as isize;
        g = pad_signed::<B>(
            &g,
            [(top as isize, bottom), (left as isize, right)],
        )?;

        let back = ConvArgs::new(
            B::shape(&g),
            B::shape(&wt),
            (1, 1),
            (a.dy, a.dx),
            a.groups,
        )?;
        B::processing_op(&g, ProcessingOp::Conv, &wt, &back)
    }

    fn weight_grad(&self, grad: &B::Buffer) -> Result<B::Buffer> {
        let a = &self.args;

        // input as (cin, groups*bs, iy, ix): channels become the batch
        let mut xt = B::movement_op(
            &self.x,
            &MovementOp::Reshape(vec![a.bs, a.groups, a.cin, a.iy, a.ix]),
        )?;
        xt = B::movement_op(&xt, &MovementOp::Permute(vec![2, 1, 0, 3, 4]))?;
        xt = B::movement_op(
            &xt,
            &MovementOp::Reshape(vec![a.cin, a.groups * a.bs, a.iy, a.ix]),
        )?;

        // gradient as (groups*rcout, bs, oy, ox): the kernel
        let gt = B::movement_op(grad, &MovementOp::Permute(vec![1, 0, 2, 3]))?;

        let back = ConvArgs::new(
            B::shape(&xt),
            B::shape(&gt),
            (a.dy, a.dx),
            (a.sy, a.sx),
            a.groups,
        )?
        .with_output(a.h, a.w)?;
        let dw = B::processing_op(&xt, ProcessingOp::Conv, &gt, &back)?;
        B::movement_op(&dw, &MovementOp::Permute(vec![1, 0, 2, 3]))
    }
}

/// Pad the two trailing axes of a 4D buffer; negative amounts crop.
fn pad_signed<B: Backend>(x: &B::Buffer, spatial: [(isize, isize); 2]) -> Result<B::Buffer> {
    let shape = B::shape(x).to_vec();
    let mut out = x.clone();
    if spatial.iter().any(|&(b, a)| b < 0 || a < 0) {
        let mut ranges: Vec<(usize, usize)> = shape.iter().map(|&d| (0, d)).collect();
        for (axis, &(before, after)) in spatial.iter().enumerate() {
            let dim = shape[2 + axis];
            let start = (-before).max(0) as usize;
            let end = dim.saturating_sub((-after).max(0) as usize);
            ranges[2 + axis] = (start, end.max(start));
        }
        out = B::movement_op(&out, &MovementOp::Shrink(ranges))?;
    }
    let mut padding = vec![(0, 0); shape.len()];
    for (axis, &(before, after)) in spatial.iter().enumerate() {
        padding[2 + axis] = (before.max(0) as usize, after.max(0) as usize);
    }
    B::movement_op(&out, &MovementOp::Pad(padding))
}

impl<B: Backend> GradFn<B> for ConvGradFn<B> {
    fn name(&self) -> &'static str {
        "conv"
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        let dx = if needs_grad[0] {
            Some(self.input_grad(grad)?)
        } else {
            None
        };
        let dw = if needs_grad[1] {
            Some(self.weight_grad(grad)?)
        } else {
            None
        };
        Ok(vec![dx, dw])
    }
}

impl<B: Backend> Tensor<B> {
    /// The convolution primitive on an already padded input.
    ///
    /// `args` must describe `self` and `weight`; build it with
    /// [`ConvArgs::new`].
    #[track_caller]
    pub fn conv_with_args(&self, weight: &Tensor<B>, args: &ConvArgs) -> Self {
        let out = fatal(B::processing_op(
            self.buffer(),
            ProcessingOp::Conv,
            weight.buffer(),
            args,
        ));
        let grad_fn = ConvGradFn::<B> {
            x: self.buffer().clone(),
            w: weight.buffer().clone(),
            args: *args,
        };
        Tensor::from_op(out, &[self, weight], grad_fn)
    }
}
