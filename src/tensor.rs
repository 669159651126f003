use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::autograd::GradFn;
use crate::backend::{Backend, CpuBackend};
use crate::error::{Result, TensorError, fatal};
use crate::shape::numel;

/// Identity of a graph node, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Backward edge of a non-leaf node: the inputs it was computed from and
/// the rule that turns its gradient into theirs.
pub(crate) struct Edge<B: Backend> {
    pub(crate) parents: Vec<Tensor<B>>,
    pub(crate) grad_fn: Box<dyn GradFn<B>>,
}

// ===== RAW TENSOR STRUCTURE =====

/// A node of the computation graph.
///
/// The forward buffer is immutable once created. The gradient slot and the
/// `requires_grad` flag are the only interior-mutable state.
pub(crate) struct RawTensor<B: Backend> {
    pub(crate) id: NodeId,
    pub(crate) data: B::Buffer,
    pub(crate) grad: RefCell<Option<B::Buffer>>,
    pub(crate) requires_grad: Cell<bool>,
    pub(crate) edge: Option<Edge<B>>,
}

/// Handle to a graph node. Cloning shares the node.
///
/// Every operation returns a new node; nodes built from an input that
/// requires grad record a backward edge to it.
pub struct Tensor<B: Backend = CpuBackend> {
    pub(crate) inner: Rc<RawTensor<B>>,
}

impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<B: Backend> fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.inner.id)
            .field("shape", &self.shape())
            .field("requires_grad", &self.requires_grad())
            .field("has_grad", &self.inner.grad.borrow().is_some())
            .field("op", &self.inner.edge.as_ref().map(|e| e.grad_fn.name()))
            .finish()
    }
}

// ===== TENSOR CONSTRUCTORS =====

impl<B: Backend> Tensor<B> {
    /// Create a leaf tensor from row-major data.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape.
    #[track_caller]
    pub fn new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Self {
        fatal(Self::try_new(data, shape, requires_grad))
    }

    pub fn try_new(data: Vec<f32>, shape: &[usize], requires_grad: bool) -> Result<Self> {
        let buffer = B::from_vec(data, shape)?;
        Ok(Self::from_buffer(buffer, requires_grad))
    }

    /// Wrap an existing backend buffer as a leaf.
    pub fn from_buffer(buffer: B::Buffer, requires_grad: bool) -> Self {
        Tensor {
            inner: Rc::new(RawTensor {
                id: NodeId::next(),
                data: buffer,
                grad: RefCell::new(None),
                requires_grad: Cell::new(requires_grad),
                edge: None,
            }),
        }
    }

    /// Output of an operation. The edge is only kept when some parent
    /// requires grad, so constant subgraphs carry no backward state.
    pub(crate) fn from_op(
        data: B::Buffer,
        parents: &[&Tensor<B>],
        grad_fn: impl GradFn<B> + 'static,
    ) -> Self {
        let requires_grad = parents.iter().any(|p| p.requires_grad());
        let edge = requires_grad.then(|| Edge {
            parents: parents.iter().map(|&p| p.clone()).collect(),
            grad_fn: Box::new(grad_fn),
        });
        Tensor {
            inner: Rc::new(RawTensor {
                id: NodeId::next(),
                data,
                grad: RefCell::new(None),
                requires_grad: Cell::new(requires_grad),
                edge,
            }),
        }
    }

    /// A single-element tensor of shape `[1]`.
    pub fn scalar(value: f32, requires_grad: bool) -> Self {
        Self::from_buffer(B::full(&[1], value), requires_grad)
    }

    pub fn full(shape: &[usize], value: f32) -> Self {
        Self::from_buffer(B::full(shape, value), false)
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// `n x n` identity matrix.
    #[track_caller]
    pub fn eye(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self::new(data, &[n, n], false)
    }

    /// `[0, 1, ..., n-1]`.
    #[track_caller]
    pub fn arange(n: usize) -> Self {
        Self::new((0..n).map(|i| i as f32).collect(), &[n], false)
    }

    /// Uniform in `[0, 1)`.
    pub fn rand(shape: &[usize]) -> Self {
        Self::rand_with_rng(shape, &mut rand::rng())
    }

    /// Standard normal.
    pub fn randn(shape: &[usize]) -> Self {
        Self::randn_with_rng(shape, &mut rand::rng())
    }

    /// Uniform in `[-1, 1)` scaled by `1/sqrt(numel)`.
    pub fn uniform(shape: &[usize]) -> Self {
        Self::uniform_with_rng(shape, &mut rand::rng())
    }

    #[track_caller]
    pub fn rand_with_rng<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let data = (0..numel(shape)).map(|_| rng.random::<f32>()).collect();
        Self::new(data, shape, false)
    }

    #[track_caller]
    pub fn randn_with_rng<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let data = (0..numel(shape))
            .map(|_| StandardNormal.sample(rng))
            .collect();
        Self::new(data, shape, false)
    }

    #[track_caller]
    pub fn uniform_with_rng<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let n = numel(shape);
        let scale = 1.0 / (n.max(1) as f32).sqrt();
        let data = (0..n)
            .map(|_| rng.random_range(-1.0f32..1.0) * scale)
            .collect();
        Self::new(data, shape, false)
    }

    /// Builder form of [`set_requires_grad`](Self::set_requires_grad).
    pub fn requires_grad_(self, requires_grad: bool) -> Self {
        self.set_requires_grad(requires_grad);
        self
    }
}

// ===== READBACK =====

impl<B: Backend> Tensor<B> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn shape(&self) -> &[usize] {
        B::shape(&self.inner.data)
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn numel(&self) -> usize {
        numel(self.shape())
    }

    /// The forward buffer.
    pub fn buffer(&self) -> &B::Buffer {
        &self.inner.data
    }

    /// Values in row-major order.
    pub fn to_vec(&self) -> Vec<f32> {
        B::to_vec(&self.inner.data)
    }

    /// The value of a single-element tensor.
    ///
    /// # Panics
    /// Panics if the tensor holds more than one element.
    #[track_caller]
    pub fn item(&self) -> f32 {
        match self.to_vec().as_slice() {
            &[value] => value,
            _ => panic!(
                "{}",
                TensorError::InvalidParameter(format!(
                    "item() needs a single element, shape is {:?}",
                    self.shape()
                ))
            ),
        }
    }

    /// Accumulated gradient, if a backward pass has reached this node.
    pub fn grad(&self) -> Option<Vec<f32>> {
        self.inner.grad.borrow().as_ref().map(B::to_vec)
    }

    /// Accumulated gradient as a constant tensor.
    pub fn grad_tensor(&self) -> Option<Tensor<B>> {
        self.inner
            .grad
            .borrow()
            .as_ref()
            .map(|g| Tensor::from_buffer(g.clone(), false))
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad.get()
    }

    /// Only meaningful on leaves: operation outputs decide at creation.
    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.inner.requires_grad.set(requires_grad);
    }

    /// True when the node has no backward edge.
    pub fn is_leaf(&self) -> bool {
        self.inner.edge.is_none()
    }

    /// Drop the accumulated gradient. Gradients are never reset implicitly.
    pub fn zero_grad(&self) {
        self.inner.grad.borrow_mut().take();
    }

    /// A leaf sharing this node's buffer, cut from the graph.
    pub fn detach(&self) -> Self {
        Self::from_buffer(self.inner.data.clone(), false)
    }
}
