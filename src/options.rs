//! Typed arguments for reductions, padding, convolution and pooling.

use crate::error::{Result, TensorError};
use crate::shape::normalize_axis;

/// Axis selection for reductions.
///
/// `Axes::All` reduces everything. Integers, arrays, slices and vectors of
/// `usize` convert into an explicit selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Axes {
    #[default]
    All,
    Only(Vec<isize>),
}

impl Axes {
    /// A single axis that may count from the end.
    pub fn from_signed(axis: isize) -> Self {
        Axes::Only(vec![axis])
    }

    /// Sorted, deduplicated, non-negative axes for a tensor of `rank`.
    pub fn resolve(&self, rank: usize) -> Result<Vec<usize>> {
        let mut axes = match self {
            Axes::All => (0..rank).collect(),
            Axes::Only(axes) => axes
                .iter()
                .map(|&a| normalize_axis(a, rank))
                .collect::<Result<Vec<_>>>()?,
        };
        axes.sort_unstable();
        axes.dedup();
        Ok(axes)
    }
}

impl From<usize> for Axes {
    fn from(axis: usize) -> Self {
        Axes::Only(vec![axis as isize])
    }
}

impl From<&[usize]> for Axes {
    fn from(axes: &[usize]) -> Self {
        Axes::Only(axes.iter().map(|&a| a as isize).collect())
    }
}

impl<const N: usize> From<[usize; N]> for Axes {
    fn from(axes: [usize; N]) -> Self {
        Axes::from(&axes[..])
    }
}

impl From<Vec<usize>> for Axes {
    fn from(axes: Vec<usize>) -> Self {
        Axes::from(axes.as_slice())
    }
}

/// Zero padding of the two spatial axes. Negative values crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub left: isize,
    pub right: isize,
    pub top: isize,
    pub bottom: isize,
}

impl Padding {
    /// `(before, after)` for the height then the width axis.
    pub fn as_pairs(&self) -> [(isize, isize); 2] {
        [(self.top, self.bottom), (self.left, self.right)]
    }

    pub fn is_zero(&self) -> bool {
        *self == Padding::default()
    }
}

/// The same amount on every side.
impl From<isize> for Padding {
    fn from(p: isize) -> Self {
        Padding {
            left: p,
            right: p,
            top: p,
            bottom: p,
        }
    }
}

/// `(y, x)`: `y` above and below, `x` left and right.
impl From<(isize, isize)> for Padding {
    fn from((y, x): (isize, isize)) -> Self {
        Padding {
            left: x,
            right: x,
            top: y,
            bottom: y,
        }
    }
}

/// `[left, right, top, bottom]`.
impl From<[isize; 4]> for Padding {
    fn from([left, right, top, bottom]: [isize; 4]) -> Self {
        Padding {
            left,
            right,
            top,
            bottom,
        }
    }
}

/// A `(y, x)` pair for stride, dilation and kernel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair(pub usize, pub usize);

impl Pair {
    pub fn y(&self) -> usize {
        self.0
    }

    pub fn x(&self) -> usize {
        self.1
    }

    pub(crate) fn tuple(&self) -> (usize, usize) {
        (self.0, self.1)
    }

    fn check_positive(&self, what: &str) -> Result<()> {
        if self.0 == 0 || self.1 == 0 {
            return Err(TensorError::InvalidParameter(format!(
                "{what} must be positive, got {self:?}"
            )));
        }
        Ok(())
    }
}

impl From<usize> for Pair {
    fn from(v: usize) -> Self {
        Pair(v, v)
    }
}

impl From<(usize, usize)> for Pair {
    fn from((y, x): (usize, usize)) -> Self {
        Pair(y, x)
    }
}

/// Options for [`Tensor::conv2d`](crate::Tensor::conv2d).
///
/// ```
/// use ampere::Conv2dOptions;
///
/// let opts = Conv2dOptions::default().stride(2).padding((1, 0)).groups(4);
/// assert_eq!(opts.groups, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dOptions {
    pub stride: Pair,
    pub padding: Padding,
    pub dilation: Pair,
    pub groups: usize,
}

impl Default for Conv2dOptions {
    fn default() -> Self {
        Conv2dOptions {
            stride: Pair(1, 1),
            padding: Padding::default(),
            dilation: Pair(1, 1),
            groups: 1,
        }
    }
}

impl Conv2dOptions {
    pub fn stride(mut self, stride: impl Into<Pair>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn padding(mut self, padding: impl Into<Padding>) -> Self {
        self.padding = padding.into();
        self
    }

    pub fn dilation(mut self, dilation: impl Into<Pair>) -> Self {
        self.dilation = dilation.into();
        self
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }
}

/// Options for [`Tensor::max_pool2d`](crate::Tensor::max_pool2d) and
/// [`Tensor::avg_pool2d`](crate::Tensor::avg_pool2d).
///
/// The stride defaults to the kernel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pool2dOptions {
    pub kernel: Pair,
    pub stride: Option<Pair>,
}

impl Pool2dOptions {
    pub fn new(kernel: impl Into<Pair>) -> Self {
        Pool2dOptions {
            kernel: kernel.into(),
            stride: None,
        }
    }

    pub fn stride(mut self, stride: impl Into<Pair>) -> Self {
        self.stride = Some(stride.into());
        self
    }

    pub(crate) fn validated(&self) -> Result<(Pair, Pair)> {
        let stride = self.stride.unwrap_or(self.kernel);
        self.kernel.check_positive("pool kernel")?;
        stride.check_positive("pool stride")?;
        Ok((self.kernel, stride))
    }
}

impl Default for Pool2dOptions {
    fn default() -> Self {
        Pool2dOptions::new(2)
    }
}

impl From<usize> for Pool2dOptions {
    fn from(kernel: usize) -> Self {
        Pool2dOptions::new(kernel)
    }
}

impl From<(usize, usize)> for Pool2dOptions {
    fn from(kernel: (usize, usize)) -> Self {
        Pool2dOptions::new(kernel)
    }
}
