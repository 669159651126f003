//! Elementwise two-input primitives, broadcasting, and operator overloads.
//!
//! Broadcasting happens here, not in the backend: both operands are
//! reshaped to a common rank and expanded to a common shape, so the
//! primitive always sees equal shapes and the expand's own gradient sums
//! the broadcast axes back.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::autograd::GradFn;
use crate::backend::Backend;
use crate::error::{Result, fatal};
use crate::ops::{BinaryOp, UnaryOp};
use crate::shape::{broadcast_shapes, pad_leading};
use crate::tensor::Tensor;

/// Gradient function for binary primitives.
///
/// - Add: (g, g)
/// - Sub: (g, -g)
/// - Mul: (g*b, g*a)
/// - Div: (g/b, -g*a/b²)
/// - Pow: (g*b*a^(b-1), g*a^b*ln(a))
/// - CmpEq: never recorded
struct BinaryGradFn<B: Backend> {
    op: BinaryOp,
    a: B::Buffer,
    b: B::Buffer,
    out: B::Buffer,
}

impl<B: Backend> BinaryGradFn<B> {
    fn lhs(&self, g: &B::Buffer) -> Result<B::Buffer> {
        let Self { a, b, .. } = self;
        match self.op {
            BinaryOp::Add | BinaryOp::Sub => Ok(g.clone()),
            BinaryOp::Mul => B::binary_op(g, BinaryOp::Mul, b),
            BinaryOp::Div => B::binary_op(g, BinaryOp::Div, b),
            BinaryOp::Pow => {
                let one = B::full(B::shape(b), 1.0);
                let b_minus_one = B::binary_op(b, BinaryOp::Sub, &one)?;
                let slope = B::binary_op(a, BinaryOp::Pow, &b_minus_one)?;
                let scaled = B::binary_op(b, BinaryOp::Mul, &slope)?;
                B::binary_op(g, BinaryOp::Mul, &scaled)
            }
            BinaryOp::CmpEq => Ok(B::full(B::shape(g), 0.0)),
        }
    }

    fn rhs(&self, g: &B::Buffer) -> Result<B::Buffer> {
        let Self { a, b, out, .. } = self;
        match self.op {
            BinaryOp::Add => Ok(g.clone()),
            BinaryOp::Sub => Ok(B::unary_op(g, UnaryOp::Neg)),
            BinaryOp::Mul => B::binary_op(g, BinaryOp::Mul, a),
            BinaryOp::Div => {
                let b_squared = B::binary_op(b, BinaryOp::Mul, b)?;
                let ratio = B::binary_op(a, BinaryOp::Div, &b_squared)?;
                let scaled = B::binary_op(g, BinaryOp::Mul, &ratio)?;
                Ok(B::unary_op(&scaled, UnaryOp::Neg))
            }
            BinaryOp::Pow => {
                let log_a = B::unary_op(a, UnaryOp::Log);
                let scaled = B::binary_op(out, BinaryOp::Mul, &log_a)?;
                B::binary_op(g, BinaryOp::Mul, &scaled)
            }
            BinaryOp::CmpEq => Ok(B::full(B::shape(g), 0.0)),
        }
    }
}

impl<B: Backend> GradFn<B> for BinaryGradFn<B> {
    fn name(&self) -> &'static str {
        match self.op {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Pow => "pow",
            BinaryOp::CmpEq => "cmpeq",
        }
    }

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>> {
        let da = if needs_grad[0] { Some(self.lhs(grad)?) } else { None };
        let db = if needs_grad[1] { Some(self.rhs(grad)?) } else { None };
        Ok(vec![da, db])
    }
}

impl<B: Backend> Tensor<B> {
    /// Bring two tensors to their common broadcast shape.
    ///
    /// # Panics
    /// Panics if the shapes are incompatible.
    #[track_caller]
    pub fn broadcast_with(&self, other: &Tensor<B>) -> (Tensor<B>, Tensor<B>) {
        let target = fatal(broadcast_shapes(self.shape(), other.shape()));
        (self.broadcast_to(&target), other.broadcast_to(&target))
    }

    #[track_caller]
    pub fn broadcast_to(&self, target: &[usize]) -> Self {
        if self.shape() == target {
            return self.clone();
        }
        let aligned = pad_leading(self.shape(), target.len());
        let reshaped = if aligned.as_slice() == self.shape() {
            self.clone()
        } else {
            self.reshape(&aligned)
        };
        reshaped.expand(target)
    }

    #[track_caller]
    fn binary(&self, op: BinaryOp, other: &Tensor<B>) -> Self {
        let (a, b) = self.broadcast_with(other);
        let out = fatal(B::binary_op(a.buffer(), op, b.buffer()));
        if op == BinaryOp::CmpEq {
            return Tensor::from_buffer(out, false);
        }
        let grad_fn = BinaryGradFn::<B> {
            op,
            a: a.buffer().clone(),
            b: b.buffer().clone(),
            out: out.clone(),
        };
        Tensor::from_op(out, &[&a, &b], grad_fn)
    }

    /// A constant single-element tensor that broadcasts against `self`.
    fn constant(value: f32) -> Self {
        Tensor::scalar(value, false)
    }

    #[track_caller]
    pub fn add(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    #[track_caller]
    pub fn sub(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    #[track_caller]
    pub fn mul(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    #[track_caller]
    pub fn div(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::Div, other)
    }

    #[track_caller]
    pub fn pow(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::Pow, other)
    }

    /// 1.0 where equal, 0.0 elsewhere. The result is a constant.
    #[track_caller]
    pub fn eq(&self, other: &Tensor<B>) -> Self {
        self.binary(BinaryOp::CmpEq, other)
    }

    pub fn add_scalar(&self, value: f32) -> Self {
        self.add(&Self::constant(value))
    }

    pub fn sub_scalar(&self, value: f32) -> Self {
        self.sub(&Self::constant(value))
    }

    /// `value - self`.
    pub fn rsub_scalar(&self, value: f32) -> Self {
        Self::constant(value).sub(self)
    }

    pub fn mul_scalar(&self, value: f32) -> Self {
        self.mul(&Self::constant(value))
    }

    pub fn div_scalar(&self, value: f32) -> Self {
        self.div(&Self::constant(value))
    }

    /// `value / self`.
    pub fn rdiv_scalar(&self, value: f32) -> Self {
        Self::constant(value).div(self)
    }

    pub fn pow_scalar(&self, exponent: f32) -> Self {
        self.pow(&Self::constant(exponent))
    }
}

// ===== OPERATOR OVERLOADS =====

macro_rules! impl_binary_operator {
    ($trait:ident, $method:ident, $scalar:ident, $rscalar:ident) => {
        impl<B: Backend> $trait<&Tensor<B>> for &Tensor<B> {
            type Output = Tensor<B>;
            #[track_caller]
            fn $method(self, rhs: &Tensor<B>) -> Tensor<B> {
                Tensor::$method(self, rhs)
            }
        }

        impl<B: Backend> $trait<Tensor<B>> for Tensor<B> {
            type Output = Tensor<B>;
            #[track_caller]
            fn $method(self, rhs: Tensor<B>) -> Tensor<B> {
                Tensor::$method(&self, &rhs)
            }
        }

        impl<B: Backend> $trait<&Tensor<B>> for Tensor<B> {
            type Output = Tensor<B>;
            #[track_caller]
            fn $method(self, rhs: &Tensor<B>) -> Tensor<B> {
                Tensor::$method(&self, rhs)
            }
        }

        impl<B: Backend> $trait<Tensor<B>> for &Tensor<B> {
            type Output = Tensor<B>;
            #[track_caller]
            fn $method(self, rhs: Tensor<B>) -> Tensor<B> {
                Tensor::$method(self, &rhs)
            }
        }

        impl<B: Backend> $trait<f32> for &Tensor<B> {
            type Output = Tensor<B>;
            fn $method(self, rhs: f32) -> Tensor<B> {
                self.$scalar(rhs)
            }
        }

        impl<B: Backend> $trait<f32> for Tensor<B> {
            type Output = Tensor<B>;
            fn $method(self, rhs: f32) -> Tensor<B> {
                self.$scalar(rhs)
            }
        }

        impl<B: Backend> $trait<&Tensor<B>> for f32 {
            type Output = Tensor<B>;
            fn $method(self, rhs: &Tensor<B>) -> Tensor<B> {
                rhs.$rscalar(self)
            }
        }

        impl<B: Backend> $trait<Tensor<B>> for f32 {
            type Output = Tensor<B>;
            fn $method(self, rhs: Tensor<B>) -> Tensor<B> {
                rhs.$rscalar(self)
            }
        }
    };
}

impl_binary_operator!(Add, add, add_scalar, add_scalar);
impl_binary_operator!(Sub, sub, sub_scalar, rsub_scalar);
impl_binary_operator!(Mul, mul, mul_scalar, mul_scalar);
impl_binary_operator!(Div, div, div_scalar, rdiv_scalar);

impl<B: Backend> Neg for &Tensor<B> {
    type Output = Tensor<B>;
    fn neg(self) -> Tensor<B> {
        Tensor::neg(self)
    }
}

impl<B: Backend> Neg for Tensor<B> {
    type Output = Tensor<B>;
    fn neg(self) -> Tensor<B> {
        Tensor::neg(&self)
    }
}
