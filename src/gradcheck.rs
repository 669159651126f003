//! Numerical gradient checking.
//!
//! Compares autograd gradients of `mean(f(inputs))` against central
//! differences, one input element at a time.

use crate::backend::Backend;
use crate::error::Result;
use crate::tensor::Tensor;

/// Step size and tolerances for [`check_gradients`].
///
/// An element passes when `|analytic - numeric| <= atol + rtol * |numeric|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    pub epsilon: f32,
    pub atol: f32,
    pub rtol: f32,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        GradCheckConfig {
            epsilon: 1e-2,
            atol: 1e-3,
            rtol: 1e-2,
        }
    }
}

/// Outcome of a gradient check.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    pub max_abs_error: f32,
    /// `(input, element, analytic, numeric)` for every failing element.
    pub mismatches: Vec<(usize, usize, f32, f32)>,
}

impl GradCheckReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Check the gradients of `f` with respect to every tensor in `inputs`.
///
/// The inputs are only read: fresh leaves are built from their values for
/// every evaluation, so their own `grad` is left untouched.
pub fn check_gradients<B, F>(
    inputs: &[Tensor<B>],
    f: F,
    config: &GradCheckConfig,
) -> Result<GradCheckReport>
where
    B: Backend,
    F: Fn(&[Tensor<B>]) -> Tensor<B>,
{
    let values: Vec<Vec<f32>> = inputs.iter().map(Tensor::to_vec).collect();
    let shapes: Vec<Vec<usize>> = inputs.iter().map(|t| t.shape().to_vec()).collect();

    let leaves = values
        .iter()
        .zip(&shapes)
        .map(|(v, s)| Tensor::try_new(v.clone(), s, true))
        .collect::<Result<Vec<_>>>()?;
    f(&leaves).mean_all().try_backward()?;

    let evaluate = |which: usize, element: usize, delta: f32| -> Result<f32> {
        let perturbed = values
            .iter()
            .zip(&shapes)
            .enumerate()
            .map(|(i, (v, s))| {
                let mut v = v.clone();
                if i == which {
                    v[element] += delta;
                }
                Tensor::try_new(v, s, false)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(f(&perturbed).mean_all().item())
    };

    let mut report = GradCheckReport {
        max_abs_error: 0.0,
        mismatches: Vec::new(),
    };
    for (which, leaf) in leaves.iter().enumerate() {
        let analytic = leaf
            .grad()
            .unwrap_or_else(|| vec![0.0; values[which].len()]);
        for (element, &a) in analytic.iter().enumerate() {
            let plus = evaluate(which, element, config.epsilon)?;
            let minus = evaluate(which, element, -config.epsilon)?;
            let numeric = (plus - minus) / (2.0 * config.epsilon);
            let error = (a - numeric).abs();
            report.max_abs_error = report.max_abs_error.max(error);
            if error > config.atol + config.rtol * numeric.abs() {
                log::warn!(
                    "gradient mismatch at input {which}, element {element}: analytic={a:.6e}, numeric={numeric:.6e}"
                );
                report.mismatches.push((which, element, a, numeric));
            }
        }
    }
    log::debug!(
        "gradient check over {} inputs: max abs error {:.3e}",
        inputs.len(),
        report.max_abs_error
    );
    Ok(report)
}
