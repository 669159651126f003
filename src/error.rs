use thiserror::Error;

/// Every way a primitive or tensor-level call can violate its preconditions.
///
/// The backend reports these as values; the tensor layer treats them as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TensorError {
    #[error("Shape mismatch: shape {shape:?} has {elements} elements but data length is {len}")]
    ShapeDataMismatch {
        shape: Vec<usize>,
        elements: usize,
        len: usize,
    },

    #[error("Cannot broadcast shapes {0:?} and {1:?}")]
    Broadcast(Vec<usize>, Vec<usize>),

    #[error("{op}: expected rank {expected}, got rank {actual}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{op}: shapes {lhs:?} and {rhs:?} must be equal")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("Cannot reshape {from:?} ({from_len} elements) into {to:?} ({to_len} elements)")]
    ReshapeMismatch {
        from: Vec<usize>,
        from_len: usize,
        to: Vec<usize>,
        to_len: usize,
    },

    #[error("Cannot reduce {from:?} to {to:?}: reduced axes must become 1")]
    InvalidReduce { from: Vec<usize>, to: Vec<usize> },

    #[error("{0:?} is not a permutation of the axes")]
    InvalidPermutation(Vec<usize>),

    #[error("Cannot expand {from:?} to {to:?}")]
    InvalidExpand { from: Vec<usize>, to: Vec<usize> },

    #[error("Axis {axis} out of bounds for rank {rank}")]
    AxisOutOfBounds { axis: isize, rank: usize },

    #[error("View out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Convolution shape error: {0}")]
    ConvShape(String),

    #[error("backward() needs a single-element root, got shape {0:?}")]
    NonScalarRoot(Vec<usize>),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;

/// Unwraps a backend or shape-check result at the tensor layer.
///
/// Precondition violations are programmer errors with no recovery path, so
/// they abort the call that made them.
#[track_caller]
pub(crate) fn fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}
