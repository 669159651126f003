//! The primitive instruction set.
//!
//! Every tensor method bottoms out in one of these five categories, and they
//! are the only operations a [`Backend`](crate::backend::Backend) implements.
//! The per-category submodules hold the tensor-level entry points and the
//! gradient rule of each primitive.

pub mod binary;
pub mod conv;
pub mod movement;
pub mod processing;
pub mod reduce;
pub mod unary;

pub use conv::ConvArgs;

/// Elementwise single-input primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Noop,
    Neg,
    Relu,
    Exp,
    Log,
    Sign,
}

/// Elementwise two-input primitives. Operands must already share a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// 1.0 where equal, 0.0 elsewhere.
    CmpEq,
}

/// Reductions over the axes where the target shape has a 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Max,
}

/// Data-movement primitives. Only `Pad` (and `Strided` on a non-contiguous
/// source) copies; everything else is a view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MovementOp {
    Reshape(Vec<usize>),
    Permute(Vec<usize>),
    Flip(Vec<usize>),
    /// `(before, after)` per axis.
    Pad(Vec<(usize, usize)>),
    /// `(start, end)` per axis.
    Shrink(Vec<(usize, usize)>),
    Expand(Vec<usize>),
    /// `(size, stride)` per output axis, over contiguous storage.
    Strided(Vec<(usize, usize)>),
}

impl MovementOp {
    pub fn name(&self) -> &'static str {
        match self {
            MovementOp::Reshape(_) => "reshape",
            MovementOp::Permute(_) => "permute",
            MovementOp::Flip(_) => "flip",
            MovementOp::Pad(_) => "pad",
            MovementOp::Shrink(_) => "shrink",
            MovementOp::Expand(_) => "expand",
            MovementOp::Strided(_) => "strided",
        }
    }
}

/// Fused compute primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingOp {
    Conv,
}
