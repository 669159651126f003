//! Elementwise single-input primitives and their gradients.
//!
//! - Noop: g
//! - Neg: -g
//! - Relu: g where x > 0
//! - Exp: g * exp(x), reusing the forward output
//! - Log: g / x
//! - Sign: zero almost everywhere

use crate::autograd::GradFn;
use crate::backend::Backend;
use crate::error::Result;
use crate::ops::{BinaryOp, UnaryOp};
use crate::tensor::Tensor;

/// Gradient function for unary primitives.
///
/// `saved` holds the input for Relu and Log and the output for Exp.
struct UnaryGradFn<B: Backend> {
    op: UnaryOp,
    saved: Option<B::Buffer>,
}

impl<B: Backend> GradFn<B> for UnaryGradFn<B> {
    fn name(&self) -> &'static str {
        match self.op {
            UnaryOp::Noop => "noop",
            UnaryOp::Neg => "neg",
            UnaryOp::Relu => "relu",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sign => "sign",
        }
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        if !needs_grad[0] {
            return Ok(vec![None]);
        }
        let dx = match (self.op, &self.saved) {
            (UnaryOp::Noop, _) => grad.clone(),
            (UnaryOp::Neg, _) => B::unary_op(grad, UnaryOp::Neg),
            (UnaryOp::Relu, Some(x)) => {
                let mask = B::unary_op(&B::unary_op(x, UnaryOp::Sign), UnaryOp::Relu);
                B::binary_op(grad, BinaryOp::Mul, &mask)?
            }
            (UnaryOp::Exp, Some(out)) => B::binary_op(grad, BinaryOp::Mul, out)?,
            (UnaryOp::Log, Some(x)) => B::binary_op(grad, BinaryOp::Div, x)?,
            (UnaryOp::Sign, _) => B::full(B::shape(grad), 0.0),
            (op, None) => unreachable!("{op:?} records its saved buffer"),
        };
        Ok(vec![Some(dx)])
    }
}

impl<B: Backend> Tensor<B> {
    fn unary(&self, op: UnaryOp) -> Self {
        let out = B::unary_op(self.buffer(), op);
        let saved = match op {
            UnaryOp::Relu | UnaryOp::Log => Some(self.buffer().clone()),
            UnaryOp::Exp => Some(out.clone()),
            UnaryOp::Noop | UnaryOp::Neg | UnaryOp::Sign => None,
        };
        Tensor::from_op(out, &[self], UnaryGradFn::<B> { op, saved })
    }

    /// Identity node: shares the buffer and passes the gradient through.
    pub fn noop(&self) -> Self {
        self.unary(UnaryOp::Noop)
    }

    pub fn neg(&self) -> Self {
        self.unary(UnaryOp::Neg)
    }

    pub fn relu(&self) -> Self {
        self.unary(UnaryOp::Relu)
    }

    pub fn exp(&self) -> Self {
        self.unary(UnaryOp::Exp)
    }

    /// Natural logarithm.
    pub fn log(&self) -> Self {
        self.unary(UnaryOp::Log)
    }

    /// -1, 0 or 1. Not differentiable: the gradient is zero.
    pub fn sign(&self) -> Self {
        self.unary(UnaryOp::Sign)
    }
}

#[cfg(test)]
mod tests {
    use crate::Tensor;

    fn leaf(data: &[f32]) -> Tensor {
        Tensor::new(data.to_vec(), &[data.len()], true)
    }

    #[test]
    fn test_relu_forward_backward() {
        let x = leaf(&[-1.0, 0.0, 2.0]);
        let y = x.relu();
        assert_eq!(y.to_vec(), vec![0.0, 0.0, 2.0]);
        y.sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_exp_log_backward() {
        let x = leaf(&[0.5, 2.0]);
        x.exp().sum_all().backward();
        let g = x.grad().unwrap();
        assert!((g[0] - 0.5f32.exp()).abs() < 1e-6);
        assert!((g[1] - 2.0f32.exp()).abs() < 1e-5);

        let z = leaf(&[0.5, 2.0]);
        z.log().sum_all().backward();
        assert_eq!(z.grad().unwrap(), vec![2.0, 0.5]);
    }

    #[test]
    fn test_neg_and_sign() {
        let x = leaf(&[-3.0, 0.0, 4.0]);
        assert_eq!(x.sign().to_vec(), vec![-1.0, 0.0, 1.0]);
        (-&x + x.sign()).sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![-1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_noop_shares_buffer() {
        let x = leaf(&[1.0, 2.0]);
        let y = x.noop();
        assert!(y.buffer().shares_storage(x.buffer()));
        y.sum_all().backward();
        assert_eq!(x.grad().unwrap(), vec![1.0, 1.0]);
    }
}
