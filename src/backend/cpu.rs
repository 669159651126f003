//! Reference in-memory backend.
//!
//! A [`CpuBuffer`] is a strided view (shape, signed strides, base offset)
//! over reference-counted `f32` storage. Permute, flip, shrink, expand,
//! strided views and reshape of contiguous data only rewrite the view
//! metadata; pad and materialization copy into fresh storage.

use std::fmt;
use std::rc::Rc;

use rayon::prelude::*;

use crate::backend::Backend;
use crate::error::{Result, TensorError};
use crate::ops::{BinaryOp, ConvArgs, MovementOp, ProcessingOp, ReduceOp, UnaryOp};
use crate::shape::{self, contiguous_strides, numel};

/// Strided view over shared storage.
#[derive(Clone)]
pub struct CpuBuffer {
    storage: Rc<Vec<f32>>,
    shape: Vec<usize>,
    strides: Vec<isize>,
    offset: isize,
}

impl fmt::Debug for CpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBuffer")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("offset", &self.offset)
            .field("storage_len", &self.storage.len())
            .finish()
    }
}

impl CpuBuffer {
    /// Wrap row-major data. Fails if the length does not match the shape.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let elements = numel(shape);
        if data.len() != elements {
            return Err(TensorError::ShapeDataMismatch {
                shape: shape.to_vec(),
                elements,
                len: data.len(),
            });
        }
        Ok(Self::from_contiguous(data, shape.to_vec()))
    }

    fn from_contiguous(data: Vec<f32>, shape: Vec<usize>) -> Self {
        debug_assert_eq!(data.len(), numel(&shape));
        CpuBuffer {
            storage: Rc::new(data),
            strides: contiguous_strides(&shape),
            shape,
            offset: 0,
        }
    }

    fn view(&self, shape: Vec<usize>, strides: Vec<isize>, offset: isize) -> Self {
        CpuBuffer {
            storage: Rc::clone(&self.storage),
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn offset(&self) -> isize {
        self.offset
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// True when both buffers view the same storage block.
    pub fn shares_storage(&self, other: &CpuBuffer) -> bool {
        Rc::ptr_eq(&self.storage, &other.storage)
    }

    /// Row-major layout, ignoring the strides of size-1 axes.
    pub fn is_contiguous(&self) -> bool {
        let expected = contiguous_strides(&self.shape);
        self.shape
            .iter()
            .zip(self.strides.iter().zip(&expected))
            .all(|(&dim, (&s, &e))| dim == 1 || s == e)
    }

    /// Elements in logical row-major order.
    pub fn iter(&self) -> StridedIter<'_> {
        StridedIter {
            buffer: self,
            index: vec![0; self.shape.len()],
            pos: self.offset,
            remaining: self.numel(),
        }
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// A contiguous buffer with the same values; a cheap clone when already contiguous.
    pub fn contiguous(&self) -> CpuBuffer {
        if self.is_contiguous() {
            return self.clone();
        }
        log::trace!("materializing {:?} view", self.shape);
        Self::from_contiguous(self.to_vec(), self.shape.clone())
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> CpuBuffer {
        Self::from_contiguous(self.iter().map(f).collect(), self.shape.clone())
    }

    fn check_rank(&self, op: &'static str, rank: usize) -> Result<()> {
        if rank != self.shape.len() {
            return Err(TensorError::RankMismatch {
                op,
                expected: self.shape.len(),
                actual: rank,
            });
        }
        Ok(())
    }

    // === Primitives ===

    pub fn unary(&self, op: UnaryOp) -> CpuBuffer {
        match op {
            UnaryOp::Noop => self.clone(),
            UnaryOp::Neg => self.map(|x| -x),
            UnaryOp::Relu => self.map(|x| if x < 0.0 { 0.0 } else { x }),
            UnaryOp::Exp => self.map(f32::exp),
            UnaryOp::Log => self.map(f32::ln),
            UnaryOp::Sign => self.map(|x| {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    // zero stays zero and NaN stays NaN
                    x
                }
            }),
        }
    }

    pub fn binary(&self, op: BinaryOp, other: &CpuBuffer) -> Result<CpuBuffer> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                op: "binary_op",
                lhs: self.shape.clone(),
                rhs: other.shape.clone(),
            });
        }
        let f: fn(f32, f32) -> f32 = match op {
            BinaryOp::Add => |a, b| a + b,
            BinaryOp::Sub => |a, b| a - b,
            BinaryOp::Mul => |a, b| a * b,
            BinaryOp::Div => |a, b| a / b,
            BinaryOp::Pow => f32::powf,
            BinaryOp::CmpEq => |a, b| if a == b { 1.0 } else { 0.0 },
        };
        let data = self.iter().zip(other.iter()).map(|(a, b)| f(a, b)).collect();
        Ok(Self::from_contiguous(data, self.shape.clone()))
    }

    pub fn reduce(&self, op: ReduceOp, new_shape: &[usize]) -> Result<CpuBuffer> {
        self.check_rank("reduce_op", new_shape.len())?;
        if new_shape == self.shape.as_slice() {
            return Ok(self.clone());
        }
        let valid = self
            .shape
            .iter()
            .zip(new_shape)
            .all(|(&old, &new)| old == new || new == 1);
        if !valid {
            return Err(TensorError::InvalidReduce {
                from: self.shape.clone(),
                to: new_shape.to_vec(),
            });
        }

        let (init, fold): (f32, fn(f32, f32) -> f32) = match op {
            ReduceOp::Sum => (0.0, |acc, x| acc + x),
            ReduceOp::Max => (f32::NEG_INFINITY, |acc, x| {
                if acc.is_nan() || x.is_nan() {
                    f32::NAN
                } else {
                    acc.max(x)
                }
            }),
        };
        let mut out = vec![init; numel(new_shape)];
        let mut out_strides = contiguous_strides(new_shape);
        for (stride, &dim) in out_strides.iter_mut().zip(new_shape) {
            if dim == 1 {
                *stride = 0;
            }
        }
        let storage = &self.storage;
        walk2(
            &self.shape,
            (&self.strides, self.offset),
            (&out_strides, 0),
            |src, dst| {
                let slot = &mut out[dst as usize];
                *slot = fold(*slot, storage[src as usize]);
            },
        );
        Ok(Self::from_contiguous(out, new_shape.to_vec()))
    }

    pub fn movement(&self, op: &MovementOp) -> Result<CpuBuffer> {
        match op {
            MovementOp::Reshape(new_shape) => self.reshape(new_shape),
            MovementOp::Permute(order) => {
                if !shape::is_permutation(order, self.shape.len()) {
                    return Err(TensorError::InvalidPermutation(order.clone()));
                }
                let shape = order.iter().map(|&i| self.shape[i]).collect();
                let strides = order.iter().map(|&i| self.strides[i]).collect();
                Ok(self.view(shape, strides, self.offset))
            }
            MovementOp::Flip(axes) => self.flip(axes),
            MovementOp::Pad(padding) => self.pad(padding),
            MovementOp::Shrink(ranges) => {
                self.check_rank("shrink", ranges.len())?;
                let mut offset = self.offset;
                let mut shape = Vec::with_capacity(ranges.len());
                for (axis, &(start, end)) in ranges.iter().enumerate() {
                    if start > end || end > self.shape[axis] {
                        return Err(TensorError::OutOfBounds(format!(
                            "shrink range {start}..{end} on axis {axis} of {:?}",
                            self.shape
                        )));
                    }
                    offset += start as isize * self.strides[axis];
                    shape.push(end - start);
                }
                Ok(self.view(shape, self.strides.clone(), offset))
            }
            MovementOp::Expand(new_shape) => {
                self.check_rank("expand", new_shape.len())?;
                let mut strides = self.strides.clone();
                for (axis, (&old, &new)) in self.shape.iter().zip(new_shape).enumerate() {
                    if old == new {
                        continue;
                    }
                    if old != 1 {
                        return Err(TensorError::InvalidExpand {
                            from: self.shape.clone(),
                            to: new_shape.clone(),
                        });
                    }
                    strides[axis] = 0;
                }
                Ok(self.view(new_shape.clone(), strides, self.offset))
            }
            MovementOp::Strided(args) => self.as_strided(args),
        }
    }

    fn reshape(&self, new_shape: &[usize]) -> Result<CpuBuffer> {
        let (from_len, to_len) = (self.numel(), numel(new_shape));
        if from_len != to_len {
            return Err(TensorError::ReshapeMismatch {
                from: self.shape.clone(),
                from_len,
                to: new_shape.to_vec(),
                to_len,
            });
        }
        let base = self.contiguous();
        Ok(base.view(new_shape.to_vec(), contiguous_strides(new_shape), base.offset))
    }

    fn flip(&self, axes: &[usize]) -> Result<CpuBuffer> {
        let rank = self.shape.len();
        let mut flipped = vec![false; rank];
        for &axis in axes {
            if axis >= rank {
                return Err(TensorError::AxisOutOfBounds {
                    axis: axis as isize,
                    rank,
                });
            }
            if flipped[axis] {
                return Err(TensorError::InvalidParameter(format!(
                    "axis {axis} repeated in flip {axes:?}"
                )));
            }
            flipped[axis] = true;
        }
        let mut strides = self.strides.clone();
        let mut offset = self.offset;
        for axis in axes.iter().copied() {
            let dim = self.shape[axis];
            if dim > 0 {
                offset += (dim as isize - 1) * strides[axis];
            }
            strides[axis] = -strides[axis];
        }
        Ok(self.view(self.shape.clone(), strides, offset))
    }

    fn pad(&self, padding: &[(usize, usize)]) -> Result<CpuBuffer> {
        self.check_rank("pad", padding.len())?;
        if padding.iter().all(|&(before, after)| before == 0 && after == 0) {
            return Ok(self.clone());
        }
        let new_shape: Vec<usize> = self
            .shape
            .iter()
            .zip(padding)
            .map(|(&dim, &(before, after))| before + dim + after)
            .collect();
        let dst_strides = contiguous_strides(&new_shape);
        let dst_offset: isize = padding
            .iter()
            .zip(&dst_strides)
            .map(|(&(before, _), &stride)| before as isize * stride)
            .sum();
        let mut out = vec![0.0; numel(&new_shape)];
        let storage = &self.storage;
        walk2(
            &self.shape,
            (&self.strides, self.offset),
            (&dst_strides, dst_offset),
            |src, dst| out[dst as usize] = storage[src as usize],
        );
        Ok(Self::from_contiguous(out, new_shape))
    }

    fn as_strided(&self, args: &[(usize, usize)]) -> Result<CpuBuffer> {
        let base = self.contiguous();
        let shape: Vec<usize> = args.iter().map(|&(size, _)| size).collect();
        let strides: Vec<isize> = args.iter().map(|&(_, stride)| stride as isize).collect();
        if numel(&shape) > 0 {
            let reach: isize = shape
                .iter()
                .zip(&strides)
                .map(|(&size, &stride)| (size as isize - 1) * stride)
                .sum();
            if reach >= base.numel() as isize {
                return Err(TensorError::OutOfBounds(format!(
                    "strided view {args:?} reaches element {reach} of a {}-element buffer",
                    base.numel()
                )));
            }
        }
        Ok(base.view(shape, strides, base.offset))
    }

    /// Grouped convolution as one contraction over input windows.
    ///
    /// The window view `(bs, groups, oy, ox, cin, h, w)` is materialized and
    /// each row is dotted against the matching `(cin, h, w)` weight slice,
    /// one rayon task per `(batch, group)` block of the output.
    pub fn conv(&self, w: &CpuBuffer, args: &ConvArgs) -> Result<CpuBuffer> {
        let x_expected = [args.bs, args.groups * args.cin, args.iy, args.ix];
        let w_expected = [args.cout, args.cin, args.h, args.w];
        if self.shape != x_expected || w.shape != w_expected {
            return Err(TensorError::ConvShape(format!(
                "args {args:?} expect input {x_expected:?} and weight {w_expected:?}, got {:?} and {:?}",
                self.shape, w.shape
            )));
        }
        let windows = self.as_strided(&args.window_view())?.to_vec();
        let weights = w.to_vec();

        let k = args.cin * args.h * args.w;
        let plane = args.oy * args.ox;
        let mut out = vec![0.0f32; args.bs * args.cout * plane];
        out.par_chunks_mut(args.rcout * plane)
            .enumerate()
            .for_each(|(block, chunk)| {
                let g = block % args.groups;
                let rows = &windows[block * plane * k..(block + 1) * plane * k];
                for (oc, out_plane) in chunk.chunks_mut(plane).enumerate() {
                    let kernel = &weights[(g * args.rcout + oc) * k..(g * args.rcout + oc + 1) * k];
                    for (p, slot) in out_plane.iter_mut().enumerate() {
                        let row = &rows[p * k..(p + 1) * k];
                        *slot = row.iter().zip(kernel).map(|(a, b)| a * b).sum();
                    }
                }
            });
        Ok(Self::from_contiguous(out, args.output_shape()))
    }
}

/// Visit every index of `shape`, yielding the storage position under two
/// stride layouts at once.
fn walk2(
    shape: &[usize],
    (a_strides, a_offset): (&[isize], isize),
    (b_strides, b_offset): (&[isize], isize),
    mut f: impl FnMut(isize, isize),
) {
    let total = numel(shape);
    if total == 0 {
        return;
    }
    let mut index = vec![0usize; shape.len()];
    let (mut a, mut b) = (a_offset, b_offset);
    for remaining in (0..total).rev() {
        f(a, b);
        if remaining == 0 {
            break;
        }
        for axis in (0..shape.len()).rev() {
            index[axis] += 1;
            a += a_strides[axis];
            b += b_strides[axis];
            if index[axis] < shape[axis] {
                break;
            }
            a -= a_strides[axis] * shape[axis] as isize;
            b -= b_strides[axis] * shape[axis] as isize;
            index[axis] = 0;
        }
    }
}

/// Row-major iterator over a strided view.
pub struct StridedIter<'a> {
    buffer: &'a CpuBuffer,
    index: Vec<usize>,
    pos: isize,
    remaining: usize,
}

impl Iterator for StridedIter<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.buffer.storage[self.pos as usize];
        self.remaining -= 1;
        if self.remaining > 0 {
            let CpuBuffer { shape, strides, .. } = self.buffer;
            for axis in (0..shape.len()).rev() {
                self.index[axis] += 1;
                self.pos += strides[axis];
                if self.index[axis] < shape[axis] {
                    break;
                }
                self.pos -= strides[axis] * shape[axis] as isize;
                self.index[axis] = 0;
            }
        }
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter<'_> {}

/// The reference backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl Backend for CpuBackend {
    type Buffer = CpuBuffer;

    fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<CpuBuffer> {
        CpuBuffer::from_vec(data, shape)
    }

    fn to_vec(x: &CpuBuffer) -> Vec<f32> {
        x.to_vec()
    }

    fn shape(x: &CpuBuffer) -> &[usize] {
        x.shape()
    }

    fn unary_op(x: &CpuBuffer, op: UnaryOp) -> CpuBuffer {
        x.unary(op)
    }

    fn binary_op(x: &CpuBuffer, op: BinaryOp, y: &CpuBuffer) -> Result<CpuBuffer> {
        x.binary(op, y)
    }

    fn reduce_op(x: &CpuBuffer, op: ReduceOp, new_shape: &[usize]) -> Result<CpuBuffer> {
        x.reduce(op, new_shape)
    }

    fn movement_op(x: &CpuBuffer, op: &MovementOp) -> Result<CpuBuffer> {
        x.movement(op)
    }

    fn processing_op(
        x: &CpuBuffer,
        op: ProcessingOp,
        w: &CpuBuffer,
        args: &ConvArgs,
    ) -> Result<CpuBuffer> {
        match op {
            ProcessingOp::Conv => x.conv(w, args),
        }
    }
}
