use std::collections::{HashMap, HashSet};
use std::collections::hash_map::Entry;

use crate::backend::Backend;
use crate::error::{Result, TensorError, fatal};
use crate::ops::BinaryOp;
use crate::tensor::{NodeId, Tensor};

// ===== GRADIENT FUNCTION TRAIT =====

/// Backward rule of one recorded operation.
///
/// Implementors store exactly the forward buffers their rule needs.
/// `backward` receives the gradient of the operation's output and a flag per
/// parent telling whether that parent wants a gradient; it returns one entry
/// per parent, `None` where no gradient is produced.
pub trait GradFn<B: Backend> {
    fn name(&self) -> &'static str;

    fn backward(&self, grad: &B::Buffer, needs_grad: &[bool]) -> Result<Vec<Option<B::Buffer>>>;
}

// ===== BACKPROPAGATION =====

impl<B: Backend> Tensor<B> {
    /// Reverse-mode differentiation from this single-element tensor.
    ///
    /// Gradients are added to the `grad` of every reachable leaf that
    /// requires grad.
    ///
    /// # Panics
    /// Panics if the tensor has more than one element.
    #[track_caller]
    pub fn backward(&self) {
        fatal(self.try_backward())
    }

    pub fn try_backward(&self) -> Result<()> {
        if self.numel() != 1 {
            return Err(TensorError::NonScalarRoot(self.shape().to_vec()));
        }
        if !self.requires_grad() {
            log::debug!("backward from {:?}: nothing requires grad", self.id());
            return Ok(());
        }

        let order = topological_order(self);
        let mut pending: HashMap<NodeId, B::Buffer> = HashMap::new();
        pending.insert(self.id(), B::full(self.shape(), 1.0));
        let mut leaves = 0usize;

        // consumers before producers
        for node in order.iter().rev() {
            let Some(grad) = pending.remove(&node.id()) else {
                continue;
            };
            let Some(edge) = &node.inner.edge else {
                if node.requires_grad() {
                    accumulate_leaf(node, grad)?;
                    leaves += 1;
                }
                continue;
            };

            let needs_grad: Vec<bool> = edge.parents.iter().map(|p| p.requires_grad()).collect();
            log::trace!("{:?}: {} backward", node.id(), edge.grad_fn.name());
            let parent_grads = edge.grad_fn.backward(&grad, &needs_grad)?;

            for ((parent, parent_grad), &needed) in
                edge.parents.iter().zip(parent_grads).zip(&needs_grad)
            {
                if let Some(g) = parent_grad
                    && needed
                {
                    check_grad_shape(parent, &g)?;
                    match pending.entry(parent.id()) {
                        Entry::Vacant(slot) => {
                            slot.insert(g);
                        }
                        Entry::Occupied(mut slot) => {
                            let sum = B::binary_op(slot.get(), BinaryOp::Add, &g)?;
                            slot.insert(sum);
                        }
                    }
                }
            }
        }

        log::debug!(
            "backward from {:?}: {} nodes, {} leaves updated",
            self.id(),
            order.len(),
            leaves
        );
        Ok(())
    }
}

/// Post-order DFS over backward edges with an explicit stack, so every
/// node appears after all of its parents.
fn topological_order<B: Backend>(root: &Tensor<B>) -> Vec<Tensor<B>> {
    enum Action<B: Backend> {
        Visit(Tensor<B>),
        PostVisit(Tensor<B>),
    }

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![Action::Visit(root.clone())];

    while let Some(action) = stack.pop() {
        match action {
            Action::Visit(t) => {
                if !visited.insert(t.id()) {
                    continue;
                }
                if let Some(edge) = &t.inner.edge {
                    stack.push(Action::PostVisit(t.clone()));
                    for parent in &edge.parents {
                        stack.push(Action::Visit(parent.clone()));
                    }
                } else {
                    order.push(t);
                }
            }
            Action::PostVisit(t) => order.push(t),
        }
    }
    order
}

fn check_grad_shape<B: Backend>(node: &Tensor<B>, grad: &B::Buffer) -> Result<()> {
    if B::shape(grad) != node.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "backward",
            lhs: node.shape().to_vec(),
            rhs: B::shape(grad).to_vec(),
        });
    }
    Ok(())
}

fn accumulate_leaf<B: Backend>(leaf: &Tensor<B>, grad: B::Buffer) -> Result<()> {
    let mut slot = leaf.inner.grad.borrow_mut();
    let total = match slot.take() {
        Some(existing) => B::binary_op(&existing, BinaryOp::Add, &grad)?,
        None => grad,
    };
    *slot = Some(total);
    Ok(())
}
