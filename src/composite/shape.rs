use crate::backend::Backend;
use crate::error::{TensorError, fatal};
use crate::shape::normalize_axis;
use crate::tensor::Tensor;

impl<B: Backend> Tensor<B> {
    /// Numpy-style slicing with `(start, end)` per leading axis.
    ///
    /// Ranges may reach outside the tensor; the overhang reads as zeros.
    /// Axes without a range are kept whole.
    #[track_caller]
    pub fn slice(&self, ranges: &[(isize, isize)]) -> Self {
        let shape = self.shape().to_vec();
        if ranges.len() > shape.len() {
            panic!(
                "{}",
                TensorError::RankMismatch {
                    op: "slice",
                    expected: shape.len(),
                    actual: ranges.len(),
                }
            );
        }
        let mut padding = Vec::with_capacity(shape.len());
        let mut window = Vec::with_capacity(shape.len());
        for (axis, &dim) in shape.iter().enumerate() {
            let (start, end) = ranges.get(axis).copied().unwrap_or((0, dim as isize));
            if end < start {
                panic!(
                    "{}",
                    TensorError::InvalidParameter(format!(
                        "slice range {start}..{end} on axis {axis} is reversed"
                    ))
                );
            }
            let before = (-start).max(0);
            let after = (end - dim as isize).max(0);
            padding.push((before, after));
            window.push(((start + before) as usize, (end + before) as usize));
        }
        self.pad(&padding).shrink(&window)
    }

    /// Collapse every axis from `start_dim` on into one.
    #[track_caller]
    pub fn flatten(&self, start_dim: usize) -> Self {
        let shape = self.shape();
        let start_dim = start_dim.min(shape.len());
        let mut flat = shape[..start_dim].to_vec();
        flat.push(shape[start_dim..].iter().product());
        self.reshape(&flat)
    }

    /// Insert a size-1 axis at `dim` (which may be `ndim`).
    #[track_caller]
    pub fn unsqueeze(&self, dim: isize) -> Self {
        let dim = fatal(normalize_axis(dim, self.ndim() + 1));
        let mut shape = self.shape().to_vec();
        shape.insert(dim, 1);
        self.reshape(&shape)
    }

    /// Drop axis `dim` if it has size 1; otherwise return the tensor as is.
    /// A rank-1 tensor keeps its axis.
    #[track_caller]
    pub fn squeeze(&self, dim: isize) -> Self {
        let dim = fatal(normalize_axis(dim, self.ndim()));
        if self.shape()[dim] != 1 || self.ndim() == 1 {
            return self.clone();
        }
        let mut shape = self.shape().to_vec();
        shape.remove(dim);
        self.reshape(&shape)
    }

    /// Concatenate along `dim`. Every other axis must agree.
    ///
    /// Each input is zero-padded out to the full length and the results are
    /// summed, so gradients flow back through the pads.
    #[track_caller]
    pub fn cat(tensors: &[&Tensor<B>], dim: isize) -> Self {
        let Some(first) = tensors.first() else {
            panic!(
                "{}",
                TensorError::InvalidParameter("cat needs at least one tensor".into())
            );
        };
        let rank = first.ndim();
        let dim = fatal(normalize_axis(dim, rank));
        for t in &tensors[1..] {
            let compatible = t.ndim() == rank
                && t.shape()
                    .iter()
                    .zip(first.shape())
                    .enumerate()
                    .all(|(axis, (a, b))| axis == dim || a == b);
            if !compatible {
                panic!(
                    "{}",
                    TensorError::ShapeMismatch {
                        op: "cat",
                        lhs: first.shape().to_vec(),
                        rhs: t.shape().to_vec(),
                    }
                );
            }
        }

        let total: usize = tensors.iter().map(|t| t.shape()[dim]).sum();
        let mut offset = 0usize;
        let mut parts = tensors.iter().map(|t| {
            let size = t.shape()[dim];
            let mut padding = vec![(0isize, 0isize); rank];
            padding[dim] = (offset as isize, (total - offset - size) as isize);
            offset += size;
            t.pad(&padding)
        });
        let Some(mut acc) = parts.next() else {
            unreachable!("at least one tensor");
        };
        for part in parts {
            acc = acc.add(&part);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use crate::Tensor;

    fn arange(shape: &[usize]) -> Tensor {
        let n = shape.iter().product();
        Tensor::new((0..n).map(|i| i as f32).collect(), shape, true)
    }

    #[test]
    fn test_slice_inside_and_outside() {
        let x = arange(&[4]);
        assert_eq!(x.slice(&[(1, 3)]).to_vec(), vec![1.0, 2.0]);
        assert_eq!(x.slice(&[(-1, 2)]).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(x.slice(&[(2, 6)]).to_vec(), vec![2.0, 3.0, 0.0, 0.0]);
        let m = arange(&[3, 3]);
        let s = m.slice(&[(1, 3)]);
        assert_eq!(s.shape(), &[2, 3]);
        s.sum_all().backward();
        assert_eq!(m.grad().unwrap(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_flatten_unsqueeze_squeeze() {
        let x = arange(&[2, 3, 4]);
        assert_eq!(x.flatten(1).shape(), &[2, 12]);
        assert_eq!(x.flatten(0).shape(), &[24]);
        assert_eq!(x.unsqueeze(0).shape(), &[1, 2, 3, 4]);
        assert_eq!(x.unsqueeze(-1).shape(), &[2, 3, 4, 1]);
        assert_eq!(x.unsqueeze(1).squeeze(1).shape(), &[2, 3, 4]);
        assert_eq!(x.squeeze(0).shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_cat_and_gradient_split() {
        let a = arange(&[2, 2]);
        let b: Tensor = Tensor::new(vec![9.0, 9.0], &[2, 1], true);
        let c = Tensor::cat(&[&a, &b], -1);
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_vec(), vec![0.0, 1.0, 9.0, 2.0, 3.0, 9.0]);

        let w: Tensor = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false);
        (&c * &w).sum_all().backward();
        assert_eq!(a.grad().unwrap(), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(b.grad().unwrap(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_multi_cat_along_first_axis() {
        let a: Tensor = Tensor::ones(&[1, 2]);
        let b: Tensor = Tensor::zeros(&[2, 2]);
        let c: Tensor = Tensor::full(&[1, 2], 5.0);
        let out = Tensor::cat(&[&a, &b, &c], 0);
        assert_eq!(out.shape(), &[4, 2]);
        assert_eq!(out.to_vec(), vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 5.0, 5.0]);
    }

    #[test]
    #[should_panic(expected = "cat")]
    fn test_cat_rejects_mismatched_axes() {
        let a: Tensor = Tensor::ones(&[2, 2]);
        let b: Tensor = Tensor::ones(&[3, 3]);
        Tensor::cat(&[&a, &b], 0);
    }
}
