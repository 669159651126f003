use crate::backend::Backend;
use crate::error::{Result, TensorError, fatal};
use crate::ops::ConvArgs;
use crate::options::{Conv2dOptions, Padding, Pool2dOptions};
use crate::tensor::Tensor;

impl<B: Backend> Tensor<B> {
    /// Pad (or, for negative amounts, crop) the last two axes.
    #[track_caller]
    pub fn pad2d(&self, padding: impl Into<Padding>) -> Self {
        let padding = padding.into();
        if padding.is_zero() {
            return self.clone();
        }
        let rank = self.ndim();
        if rank < 2 {
            panic!(
                "{}",
                TensorError::RankMismatch {
                    op: "pad2d",
                    expected: 2,
                    actual: rank,
                }
            );
        }
        let mut pairs = vec![(0, 0); rank];
        let [vertical, horizontal] = padding.as_pairs();
        pairs[rank - 2] = vertical;
        pairs[rank - 1] = horizontal;
        self.pad(&pairs)
    }

    /// 2D convolution (cross-correlation) of an `(n, c, h, w)` input.
    ///
    /// The weight is `(cout, c / groups, kh, kw)`; an optional bias of
    /// `cout` elements is added per output channel.
    #[track_caller]
    pub fn conv2d(
        &self,
        weight: &Tensor<B>,
        bias: Option<&Tensor<B>>,
        opts: Conv2dOptions,
    ) -> Self {
        let x = self.pad2d(opts.padding);
        let args = fatal(ConvArgs::new(
            x.shape(),
            weight.shape(),
            opts.stride.tuple(),
            opts.dilation.tuple(),
            opts.groups,
        ));
        let out = x.conv_with_args(weight, &args);
        match bias {
            Some(b) => out.add(&b.reshape_infer(&[1, -1, 1, 1])),
            None => out,
        }
    }

    /// Max over `(ky, kx)` windows of the last two axes.
    #[track_caller]
    pub fn max_pool2d(&self, opts: impl Into<Pool2dOptions>) -> Self {
        let windows = fatal(self.pool_windows(opts.into()));
        let rank = windows.ndim();
        windows.max([rank - 2, rank - 1])
    }

    /// Mean over `(ky, kx)` windows of the last two axes.
    #[track_caller]
    pub fn avg_pool2d(&self, opts: impl Into<Pool2dOptions>) -> Self {
        let windows = fatal(self.pool_windows(opts.into()));
        let rank = windows.ndim();
        windows.mean([rank - 2, rank - 1])
    }

    /// `(n, c, oy, ox, ky, kx)` strided view of the pooling windows.
    fn pool_windows(&self, opts: Pool2dOptions) -> Result<Self> {
        let (kernel, stride) = opts.validated()?;
        let &[n, c, h, w] = self.shape() else {
            return Err(TensorError::RankMismatch {
                op: "pool2d",
                expected: 4,
                actual: self.ndim(),
            });
        };
        let (ky, kx) = kernel.tuple();
        let (sy, sx) = stride.tuple();
        if h < ky || w < kx {
            return Err(TensorError::InvalidParameter(format!(
                "pool kernel {ky}x{kx} is larger than the {h}x{w} input"
            )));
        }
        let (oy, ox) = ((h - ky) / sy + 1, (w - kx) / sx + 1);
        Ok(self.as_strided(&[
            (n, c * h * w),
            (c, h * w),
            (oy, sy * w),
            (ox, sx),
            (ky, w),
            (kx, 1),
        ]))
    }
}
