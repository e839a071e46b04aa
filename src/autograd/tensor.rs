//! Tensor type with gradient tracking

use super::BackwardOp;
use crate::{Error, Result};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Flat `f32` tensor with a shared gradient cell
///
/// Clones share the gradient cell, so a parameter captured by an operation
/// receives the gradient computed through that operation.
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Wrap `data` with an empty gradient cell
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        Self {
            data,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a tensor filled with zeros
    pub fn zeros(size: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(size), requires_grad)
    }

    /// Borrow the values
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutably borrow the values
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Copy of the values, used when persisting parameters
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.to_vec()
    }

    /// Overwrite the values in place, keeping the gradient cell
    pub fn assign(&mut self, values: &[f32]) -> Result<()> {
        if values.len() != self.data.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.data.len()],
                got: vec![values.len()],
            });
        }
        self.data
            .iter_mut()
            .zip(values)
            .for_each(|(dst, &src)| *dst = src);
        Ok(())
    }

    /// Scalar value of a single-element tensor (e.g. a loss)
    pub fn item(&self) -> f32 {
        self.data.first().copied().unwrap_or(0.0)
    }

    /// Copy of the gradient, if one has been computed
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Replace the gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut grad_ref = self.grad.borrow_mut();
        if let Some(existing) = grad_ref.as_mut() {
            *existing = &*existing + &grad;
        } else {
            *grad_ref = Some(grad);
        }
    }

    /// Apply `f` to the stored gradient, if any
    pub fn map_grad(&self, f: impl Fn(f32) -> f32) {
        if let Some(grad) = self.grad.borrow_mut().as_mut() {
            grad.mapv_inplace(f);
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Whether backward passes write a gradient here
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Gradient cell shared with every clone of this tensor
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        self.grad.clone()
    }

    /// Attach the operation that produced this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Operation that produced this tensor, if any
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("len", &self.data.len())
            .field("has_grad", &self.grad.borrow().is_some())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
