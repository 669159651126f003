use crate::backend::Backend;
use crate::tensor::Tensor;

// ===== ELEMENTWISE MATH =====

impl<B: Backend> Tensor<B> {
    /// `1 / (1 + exp(-x))`
    pub fn sigmoid(&self) -> Self {
        self.neg().exp().add_scalar(1.0).rdiv_scalar(1.0)
    }

    /// `2 * sigmoid(2x) - 1`
    pub fn tanh(&self) -> Self {
        self.mul_scalar(2.0).sigmoid().mul_scalar(2.0).sub_scalar(1.0)
    }

    pub fn sqrt(&self) -> Self {
        self.pow_scalar(0.5)
    }

    pub fn square(&self) -> Self {
        self.mul(self)
    }

    pub fn reciprocal(&self) -> Self {
        self.rdiv_scalar(1.0)
    }

    pub fn abs(&self) -> Self {
        self.relu().add(&self.neg().relu())
    }

    /// Clamp into `[min, max]`.
    pub fn clip(&self, min: f32, max: f32) -> Self {
        self.sub_scalar(min)
            .relu()
            .add_scalar(min)
            .sub(&self.sub_scalar(max).relu())
    }
}

// ===== ACTIVATIONS =====

impl<B: Backend> Tensor<B> {
    pub fn leaky_relu(&self, negative_slope: f32) -> Self {
        self.relu().sub(&self.neg().relu().mul_scalar(negative_slope))
    }

    /// `x` for `x > 0`, `alpha * (exp(x) - 1)` otherwise.
    pub fn elu(&self, alpha: f32) -> Self {
        self.relu()
            .sub(&self.exp().rsub_scalar(1.0).relu().mul_scalar(alpha))
    }

    pub fn relu6(&self) -> Self {
        self.relu().sub(&self.sub_scalar(6.0).relu())
    }

    pub fn hardswish(&self) -> Self {
        self.mul(&self.add_scalar(3.0).relu6()).div_scalar(6.0)
    }

    /// `ln(1 + exp(x))`
    pub fn softplus(&self) -> Self {
        self.exp().add_scalar(1.0).log()
    }

    pub fn mish(&self) -> Self {
        self.mul(&self.softplus().tanh())
    }

    /// Also known as SiLU.
    pub fn swish(&self) -> Self {
        self.mul(&self.sigmoid())
    }

    /// Tanh approximation of the Gaussian error linear unit.
    pub fn gelu(&self) -> Self {
        let k = (2.0 / std::f32::consts::PI).sqrt();
        let cube = self.mul(&self.square()).mul_scalar(0.044_715);
        let inner = self.add(&cube).mul_scalar(k);
        self.mul_scalar(0.5).mul(&inner.tanh().add_scalar(1.0))
    }
}
