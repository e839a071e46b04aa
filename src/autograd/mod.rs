//! Tape-based autograd
//!
//! Just enough differentiation to train a report generator: element-wise
//! sums and scaling, matrix products, row gathers (embedding lookups) and a
//! row-wise log-softmax. Each operation records a [`BackwardOp`] that pushes
//! gradients into its inputs and recurses.

mod backward;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

/// Perform backward pass on a tensor
///
/// Without an explicit output gradient the tensor is treated as a scalar
/// loss and seeded with ones.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    let seed = grad_output.unwrap_or_else(|| ndarray::Array1::ones(tensor.len()));
    tensor.set_grad(seed);

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
