//! A small reverse-mode autodiff tensor engine.
//!
//! Every tensor operation decomposes into five primitive categories
//! ([`UnaryOp`], [`BinaryOp`], [`ReduceOp`], [`MovementOp`] and
//! [`ProcessingOp`]), which are the only things a [`Backend`] implements.
//! Operations build a dynamic graph as they run; [`Tensor::backward`] walks
//! it in reverse topological order applying each primitive's gradient rule.
//!
//! ```
//! use ampere::Tensor;
//!
//! let x: Tensor = Tensor::new(vec![1.0, 2.0, 3.0], &[3], true);
//! let y = (&x * &x).sum_all();
//! y.backward();
//! assert_eq!(x.grad().unwrap(), vec![2.0, 4.0, 6.0]);
//! ```
//!
//! The reference [`CpuBackend`] stores `f32` data behind shared strided
//! views, so permute, flip, shrink and expand never copy.

pub mod autograd;
pub mod backend;
mod composite;
pub mod error;
pub mod gradcheck;
pub mod ops;
pub mod options;
pub mod shape;
pub mod tensor;

pub use autograd::GradFn;
pub use backend::{Backend, CpuBackend, CpuBuffer};
pub use error::{Result, TensorError};
pub use gradcheck::{GradCheckConfig, GradCheckReport, check_gradients};
pub use ops::{BinaryOp, ConvArgs, MovementOp, ProcessingOp, ReduceOp, UnaryOp};
pub use options::{Axes, Conv2dOptions, Padding, Pair, Pool2dOptions};
pub use tensor::{NodeId, Tensor};
