//! The backend contract.
//!
//! A backend supplies a buffer type and implements the five primitive
//! categories over it. The tensor layer, the gradient rules and every
//! composite op are written against this trait only.

pub mod cpu;

pub use cpu::{CpuBackend, CpuBuffer};

use std::fmt::Debug;

use crate::error::Result;
use crate::ops::{BinaryOp, ConvArgs, MovementOp, ProcessingOp, ReduceOp, UnaryOp};
use crate::shape;

/// Compute backend implementing the primitive operations.
///
/// All operations are pure: they return a new logical buffer, which may be a
/// view sharing storage with an input. Buffers are never mutated in place.
pub trait Backend: Clone + Debug + 'static {
    /// The buffer type for this backend. Cloning must be cheap (a view).
    type Buffer: Clone + Debug;

    // === Host transfer ===

    /// Build a buffer from row-major host data.
    fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self::Buffer>;

    /// Copy a buffer back to row-major host data.
    fn to_vec(x: &Self::Buffer) -> Vec<f32>;

    /// Logical shape of a buffer.
    fn shape(x: &Self::Buffer) -> &[usize];

    /// A buffer of `shape` filled with `value`.
    fn full(shape: &[usize], value: f32) -> Self::Buffer {
        let data = vec![value; shape::numel(shape)];
        match Self::from_vec(data, shape) {
            Ok(buffer) => buffer,
            Err(_) => unreachable!("data length always matches the shape"),
        }
    }

    // === Primitives ===

    fn unary_op(x: &Self::Buffer, op: UnaryOp) -> Self::Buffer;

    /// `x` and `y` must have identical shapes.
    fn binary_op(x: &Self::Buffer, op: BinaryOp, y: &Self::Buffer) -> Result<Self::Buffer>;

    /// `new_shape` has the rank of `x`; axes that differ must be 1 in `new_shape`.
    fn reduce_op(x: &Self::Buffer, op: ReduceOp, new_shape: &[usize]) -> Result<Self::Buffer>;

    fn movement_op(x: &Self::Buffer, op: &MovementOp) -> Result<Self::Buffer>;

    fn processing_op(
        x: &Self::Buffer,
        op: ProcessingOp,
        w: &Self::Buffer,
        args: &ConvArgs,
    ) -> Result<Self::Buffer>;
}
