use crate::backend::Backend;
use crate::error::{TensorError, fatal};
use crate::shape::broadcast_shapes;
use crate::tensor::Tensor;

impl<B: Backend> Tensor<B> {
    /// Matrix product with numpy semantics.
    ///
    /// 1-D operands are promoted to a row (left) or a column (right) and the
    /// promoted axis is dropped from the result. Leading batch axes
    /// broadcast. There is no matmul primitive: the product is a
    /// broadcast multiply of `(..., n, 1, k)` by `(..., 1, m, k)` followed by
    /// a sum over `k`.
    ///
    /// # Panics
    /// Panics if the inner dimensions differ or the batch axes do not
    /// broadcast.
    #[track_caller]
    pub fn matmul(&self, other: &Tensor<B>) -> Self {
        let (a, squeeze_rows) = match self.ndim() {
            0 | 1 => (self.reshape(&[1, self.numel()]), true),
            _ => (self.clone(), false),
        };
        let (b, squeeze_cols) = match other.ndim() {
            0 | 1 => (other.reshape(&[other.numel(), 1]), true),
            _ => (other.clone(), false),
        };

        let (a_shape, b_shape) = (a.shape().to_vec(), b.shape().to_vec());
        let (a_batch, &[n, k]) = a_shape.split_at(a_shape.len() - 2) else {
            unreachable!("rank is at least 2");
        };
        let (b_batch, &[k2, m]) = b_shape.split_at(b_shape.len() - 2) else {
            unreachable!("rank is at least 2");
        };
        if k != k2 {
            let err = TensorError::ShapeMismatch {
                op: "matmul",
                lhs: a_shape.clone(),
                rhs: b_shape.clone(),
            };
            panic!("{err}");
        }
        let batch = fatal(broadcast_shapes(a_batch, b_batch));

        let mut lhs_shape = batch.clone();
        lhs_shape.extend([n, 1, k]);
        let mut rhs_shape = batch.clone();
        rhs_shape.extend([1, m, k]);

        let rank = b_shape.len();
        let mut order: Vec<usize> = (0..rank).collect();
        order.swap(rank - 2, rank - 1);

        let lhs = a
            .reshape(&[a_batch, &[n, 1, k]].concat())
            .broadcast_to(&lhs_shape);
        let rhs = b
            .permute(&order)
            .reshape(&[b_batch, &[1, m, k]].concat())
            .broadcast_to(&rhs_shape);
        let product = lhs.mul(&rhs).sum(batch.len() + 2);

        let mut out_shape = batch;
        if !squeeze_rows {
            out_shape.push(n);
        }
        if !squeeze_cols {
            out_shape.push(m);
        }
        if out_shape.is_empty() {
            out_shape.push(1);
        }
        product.reshape(&out_shape)
    }

    /// Alias of [`matmul`](Self::matmul).
    #[track_caller]
    pub fn dot(&self, other: &Tensor<B>) -> Self {
        self.matmul(other)
    }
}
