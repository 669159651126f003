use crate::error::{Result, TensorError};

/// Everything the convolution primitive needs to know about one call.
///
/// Input is `(bs, groups*cin, iy, ix)`, weight is `(groups*rcout, cin, h, w)`
/// and the output is `(bs, groups*rcout, oy, ox)`. Padding is not part of the
/// record: it is applied to the input beforehand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvArgs {
    pub bs: usize,
    pub groups: usize,
    pub cin: usize,
    pub rcout: usize,
    pub cout: usize,
    pub iy: usize,
    pub ix: usize,
    pub oy: usize,
    pub ox: usize,
    pub h: usize,
    pub w: usize,
    pub sy: usize,
    pub sx: usize,
    pub dy: usize,
    pub dx: usize,
}

impl ConvArgs {
    /// Derive the record from input and weight shapes.
    ///
    /// `oy = (iy - dy*(h-1) - 1) / sy + 1`, and the same for `ox`.
    pub fn new(
        x_shape: &[usize],
        w_shape: &[usize],
        stride: (usize, usize),
        dilation: (usize, usize),
        groups: usize,
    ) -> Result<Self> {
        let (&[bs, cin_total, iy, ix], &[cout, cin, h, w]) = (x_shape, w_shape) else {
            return Err(TensorError::ConvShape(format!(
                "expected 4D input and weight, got {x_shape:?} and {w_shape:?}"
            )));
        };
        let (sy, sx) = stride;
        let (dy, dx) = dilation;
        if groups == 0 || sy == 0 || sx == 0 || dy == 0 || dx == 0 {
            return Err(TensorError::InvalidParameter(format!(
                "groups, stride and dilation must be positive (groups={groups}, stride={stride:?}, dilation={dilation:?})"
            )));
        }
        if h == 0 || w == 0 {
            return Err(TensorError::ConvShape(format!(
                "kernel must be non-empty, got {w_shape:?}"
            )));
        }
        if cin_total != groups * cin {
            return Err(TensorError::ConvShape(format!(
                "input has {cin_total} channels but weight {w_shape:?} with {groups} groups expects {}",
                groups * cin
            )));
        }
        if cout % groups != 0 {
            return Err(TensorError::ConvShape(format!(
                "{cout} output channels do not divide into {groups} groups"
            )));
        }
        let span_y = dy * (h - 1) + 1;
        let span_x = dx * (w - 1) + 1;
        if iy < span_y || ix < span_x {
            return Err(TensorError::ConvShape(format!(
                "input {iy}x{ix} is smaller than the dilated kernel {span_y}x{span_x}"
            )));
        }
        let args = ConvArgs {
            bs,
            groups,
            cin,
            rcout: cout / groups,
            cout,
            iy,
            ix,
            oy: (iy - span_y) / sy + 1,
            ox: (ix - span_x) / sx + 1,
            h,
            w,
            sy,
            sx,
            dy,
            dx,
        };
        log::debug!("conv args {args:?}");
        Ok(args)
    }

    /// Restrict the output to `(oy, ox)`.
    ///
    /// Used by the weight gradient, where the natural output can overhang the
    /// kernel extent. The output may only shrink.
    pub fn with_output(mut self, oy: usize, ox: usize) -> Result<Self> {
        if oy == 0 || ox == 0 || oy > self.oy || ox > self.ox {
            return Err(TensorError::ConvShape(format!(
                "cannot force output {oy}x{ox}, natural output is {}x{}",
                self.oy, self.ox
            )));
        }
        self.oy = oy;
        self.ox = ox;
        Ok(self)
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.bs, self.cout, self.oy, self.ox]
    }

    /// `(size, stride)` pairs of the window view over a contiguous input:
    /// `(bs, groups, oy, ox, cin, h, w)`.
    pub fn window_view(&self) -> Vec<(usize, usize)> {
        let plane = self.iy * self.ix;
        vec![
            (self.bs, self.groups * self.cin * plane),
            (self.groups, self.cin * plane),
            (self.oy, self.sy * self.ix),
            (self.ox, self.sx),
            (self.cin, plane),
            (self.h, self.dy * self.ix),
            (self.w, self.dx),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size() {
        let args = ConvArgs::new(&[1, 1, 9, 9], &[1, 1, 3, 3], (1, 1), (1, 1), 1).unwrap();
        assert_eq!(args.output_shape(), vec![1, 1, 7, 7]);

        let args = ConvArgs::new(&[4, 3, 11, 28], &[4, 3, 3, 3], (2, 1), (1, 1), 1).unwrap();
        assert_eq!((args.oy, args.ox), (5, 26));

        let args = ConvArgs::new(&[4, 3, 11, 28], &[4, 3, 3, 3], (1, 1), (2, 1), 1).unwrap();
        assert_eq!((args.oy, args.ox), (7, 26));
    }

    #[test]
    fn test_grouped_channels() {
        let args = ConvArgs::new(&[4, 15, 5, 5], &[35, 3, 3, 3], (1, 1), (1, 1), 5).unwrap();
        assert_eq!(args.groups, 5);
        assert_eq!(args.cin, 3);
        assert_eq!(args.rcout, 7);
        assert_eq!(args.output_shape(), vec![4, 35, 3, 3]);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(ConvArgs::new(&[1, 4, 5, 5], &[2, 3, 3, 3], (1, 1), (1, 1), 1).is_err());
        assert!(ConvArgs::new(&[1, 1, 2, 2], &[1, 1, 3, 3], (1, 1), (1, 1), 1).is_err());
        assert!(ConvArgs::new(&[1, 4, 5, 5], &[3, 2, 3, 3], (1, 1), (1, 1), 2).is_err());
        assert!(ConvArgs::new(&[1, 1, 5], &[1, 1, 3, 3], (1, 1), (1, 1), 1).is_err());
    }

    #[test]
    fn test_with_output_only_shrinks() {
        let args = ConvArgs::new(&[1, 1, 6, 6], &[1, 1, 3, 3], (1, 1), (1, 1), 1).unwrap();
        assert_eq!(args.with_output(2, 3).unwrap().output_shape(), vec![1, 1, 2, 3]);
        assert!(args.with_output(5, 1).is_err());
    }
}
