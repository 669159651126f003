use crate::autograd::GradFn;
use crate::backend::Backend;
use crate::error::{Result, TensorError, fatal};
use crate::ops::{MovementOp, ReduceOp};
use crate::shape::{contiguous_strides, inverse_permutation, normalize_axis, numel};
use crate::tensor::Tensor;

/// Movement operations: change how data is indexed, never the values.
///
/// The gradient undoes the movement:
/// - Reshape: reshape back
/// - Permute: inverse permutation
/// - Flip: the same flip
/// - Pad: shrink to the original window
/// - Shrink: pad back with zeros
/// - Expand: sum over the expanded axes
/// - Strided: scatter-add through the view's index map
struct MovementGradFn {
    op: MovementOp,
    input_shape: Vec<usize>,
}

impl<B: Backend> GradFn<B> for MovementGradFn {
    fn name(&self) -> &'static str {
        self.op.name()
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        if !needs_grad[0] {
            return Ok(vec![None]);
        }
        let shape = &self.input_shape;
        let inverse = match &self.op {
            MovementOp::Reshape(_) => MovementOp::Reshape(shape.clone()),
            MovementOp::Permute(order) => MovementOp::Permute(inverse_permutation(order)),
            MovementOp::Flip(axes) => MovementOp::Flip(axes.clone()),
            MovementOp::Pad(padding) => MovementOp::Shrink(
                padding
                    .iter()
                    .zip(shape)
                    .map(|(&(before, _), &dim)| (before, before + dim))
                    .collect(),
            ),
            MovementOp::Shrink(ranges) => MovementOp::Pad(
                ranges
                    .iter()
                    .zip(shape)
                    .map(|(&(start, end), &dim)| (start, dim - end))
                    .collect(),
            ),
            MovementOp::Expand(_) => {
                return Ok(vec![Some(B::reduce_op(grad, ReduceOp::Sum, shape)?)]);
            }
            MovementOp::Strided(args) => {
                return Ok(vec![Some(scatter_strided::<B>(grad, args, shape)?)]);
            }
        };
        Ok(vec![Some(B::movement_op(grad, &inverse)?)])
    }
}

/// Add every element of `grad` back to the input position it was read from.
/// Overlapping windows accumulate. Runs on the host through `to_vec`/`from_vec`.
fn scatter_strided<B: Backend>(
    grad: &B::Buffer,
    args: &[(usize, usize)],
    input_shape: &[usize],
) -> Result<B::Buffer> {
    let g = B::to_vec(grad);
    let mut dx = vec![0.0; numel(input_shape)];
    let mut index = vec![0usize; args.len()];
    for &value in &g {
        let pos: usize = index
            .iter()
            .zip(args)
            .map(|(&i, &(_, stride))| i * stride)
            .sum();
        dx[pos] += value;
        for axis in (0..args.len()).rev() {
            index[axis] += 1;
            if index[axis] < args[axis].0 {
                break;
            }
            index[axis] = 0;
        }
    }
    B::from_vec(dx, input_shape)
}

impl<B: Backend> Tensor<B> {
    #[track_caller]
    fn movement(&self, op: MovementOp) -> Self {
        let out = fatal(B::movement_op(self.buffer(), &op));
        let grad_fn = MovementGradFn {
            op,
            input_shape: self.shape().to_vec(),
        };
        Tensor::from_op(out, &[self], grad_fn)
    }

    /// Same elements in row-major order under a new shape.
    #[track_caller]
    pub fn reshape(&self, shape: &[usize]) -> Self {
        self.movement(MovementOp::Reshape(shape.to_vec()))
    }

    /// Reshape where a single `-1` is inferred from the element count.
    #[track_caller]
    pub fn reshape_infer(&self, shape: &[isize]) -> Self {
        let resolved = fatal(infer_shape(shape, self.numel()));
        self.reshape(&resolved)
    }

    /// Output axis `i` is input axis `order[i]`.
    #[track_caller]
    pub fn permute(&self, order: &[usize]) -> Self {
        self.movement(MovementOp::Permute(order.to_vec()))
    }

    /// Alias of [`permute`](Self::permute).
    #[track_caller]
    pub fn transpose(&self, order: &[usize]) -> Self {
        self.permute(order)
    }

    /// Reverse the given axes; negative axes count from the end.
    #[track_caller]
    pub fn flip(&self, axes: &[isize]) -> Self {
        let rank = self.ndim();
        let axes = fatal(
            axes.iter()
                .map(|&a| normalize_axis(a, rank))
                .collect::<Result<Vec<_>>>(),
        );
        self.movement(MovementOp::Flip(axes))
    }

    /// Zero padding `(before, after)` per axis. Negative amounts crop.
    #[track_caller]
    pub fn pad(&self, padding: &[(isize, isize)]) -> Self {
        let (crop, grow) = fatal(split_padding(padding, self.shape()));
        let cropped = match crop {
            Some(ranges) => self.shrink(&ranges),
            None => self.clone(),
        };
        if grow.iter().all(|&(b, a)| b == 0 && a == 0) {
            return cropped;
        }
        cropped.movement(MovementOp::Pad(grow))
    }

    /// Keep `start..end` on every axis. Zero-copy.
    #[track_caller]
    pub fn shrink(&self, ranges: &[(usize, usize)]) -> Self {
        self.movement(MovementOp::Shrink(ranges.to_vec()))
    }

    /// Stretch size-1 axes to `shape` without copying. The rank must match.
    #[track_caller]
    pub fn expand(&self, shape: &[usize]) -> Self {
        self.movement(MovementOp::Expand(shape.to_vec()))
    }

    /// Arbitrary `(size, stride)` view over the row-major elements.
    ///
    /// Views may overlap (pooling windows); their gradients accumulate.
    #[track_caller]
    pub fn as_strided(&self, args: &[(usize, usize)]) -> Self {
        self.movement(MovementOp::Strided(args.to_vec()))
    }

    /// A node whose buffer is laid out row-major.
    #[track_caller]
    pub fn contiguous(&self) -> Self {
        let args: Vec<(usize, usize)> = self
            .shape()
            .iter()
            .zip(contiguous_strides(self.shape()))
            .map(|(&dim, stride)| (dim, stride as usize))
            .collect();
        self.as_strided(&args)
    }
}

/// Split signed padding into a crop (shrink ranges, if any side is
/// negative) followed by a zero pad.
fn split_padding(
    padding: &[(isize, isize)],
    shape: &[usize],
) -> Result<(Option<Vec<(usize, usize)>>, Vec<(usize, usize)>)> {
    if padding.len() != shape.len() {
        return Err(TensorError::RankMismatch {
            op: "pad",
            expected: shape.len(),
            actual: padding.len(),
        });
    }
    let mut crop = Vec::with_capacity(shape.len());
    for (&(before, after), &dim) in padding.iter().zip(shape) {
        let start = (-before).max(0) as usize;
        let cut = (-after).max(0) as usize;
        if start + cut > dim {
            return Err(TensorError::OutOfBounds(format!(
                "cannot crop {start}+{cut} from an axis of size {dim}"
            )));
        }
        crop.push((start, dim - cut));
    }
    let needs_crop = padding.iter().any(|&(b, a)| b < 0 || a < 0);
    let grow = padding
        .iter()
        .map(|&(b, a)| (b.max(0) as usize, a.max(0) as usize))
        .collect();
    Ok((needs_crop.then_some(crop), grow))
}

fn infer_shape(shape: &[isize], total: usize) -> Result<Vec<usize>> {
    let invalid = || {
        TensorError::InvalidParameter(format!(
            "cannot reshape {total} elements into {shape:?}"
        ))
    };
    let mut inferred = None;
    let mut known = 1usize;
    for (i, &d) in shape.iter().enumerate() {
        match d {
            -1 if inferred.is_none() => inferred = Some(i),
            d if d >= 0 => known *= d as usize,
            _ => return Err(invalid()),
        }
    }
    let mut out: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    if let Some(i) = inferred {
        if known == 0 || total % known != 0 {
            return Err(invalid());
        }
        out[i] = total / known;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::infer_shape;
    use crate::Tensor;

    fn leaf(data: &[f32], shape: &[usize]) -> Tensor {
        Tensor::new(data.to_vec(), shape, true)
    }

    fn arange(shape: &[usize]) -> Tensor {
        let n = shape.iter().product();
        leaf(&(0..n).map(|i| i as f32).collect::<Vec<_>>(), shape)
    }

    #[test]
    fn test_infer_shape() {
        assert_eq!(infer_shape(&[-1, 3], 12).unwrap(), vec![4, 3]);
        assert_eq!(infer_shape(&[2, -1, 2], 12).unwrap(), vec![2, 3, 2]);
        assert!(infer_shape(&[-1, -1], 12).is_err());
        assert!(infer_shape(&[-1, 5], 12).is_err());
        assert!(infer_shape(&[-2, 6], 12).is_err());
    }

    #[test]
    fn test_permute_backward_restores_layout() {
        let x = arange(&[2, 3, 4]);
        let y = x.permute(&[2, 0, 1]);
        assert_eq!(y.shape(), &[4, 2, 3]);
        let w = arange(&[4, 2, 3]);
        (&y * &w.detach()).sum_all().backward();
        // gradient at x[i][j][k] is w[k][i][j]
        let g = x.grad().unwrap();
        assert_eq!(g[1], w.to_vec()[6]);
        assert_eq!(g[4 * 3 + 2], w.to_vec()[2 * 6 + 3]);
    }

    #[test]
    fn test_pad_negative_crops() {
        let x = arange(&[3, 3]);
        let y = x.pad(&[(-1, 1), (0, -1)]);
        assert_eq!(y.shape(), &[3, 2]);
        assert_eq!(y.to_vec(), vec![3.0, 4.0, 6.0, 7.0, 0.0, 0.0]);
        y.sum_all().backward();
        assert_eq!(
            x.grad().unwrap(),
            vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_shrink_backward_pads() {
        let x = arange(&[4]);
        x.shrink(&[(1, 3)]).sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_flip_backward() {
        let x = arange(&[3]);
        let y = x.flip(&[-1]);
        assert_eq!(y.to_vec(), vec![2.0, 1.0, 0.0]);
        let w: Tensor = Tensor::new(vec![1.0, 2.0, 3.0], &[3], false);
        (&y * &w).sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_expand_backward_sums() {
        let x = leaf(&[1.0, 2.0], &[2, 1]);
        x.expand(&[2, 3]).sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![3.0, 3.0]);
    }

    #[test]
    fn test_strided_backward_accumulates_overlaps() {
        let x = arange(&[4]);
        let windows = x.as_strided(&[(3, 1), (2, 1)]);
        assert_eq!(windows.to_vec(), vec![0.0, 1.0, 1.0, 2.0, 2.0, 3.0]);
        windows.sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![1.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_contiguous_materializes() {
        let x = arange(&[2, 3]);
        let t = x.permute(&[1, 0]);
        let c = t.contiguous();
        assert!(c.buffer().is_contiguous());
        assert_eq!(c.to_vec(), t.to_vec());
        c.sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![1.0; 6]);
    }

    #[test]
    #[should_panic(expected = "Cannot reshape")]
    fn test_reshape_count_mismatch_panics() {
        arange(&[2, 3]).reshape(&[4]);
    }
}
