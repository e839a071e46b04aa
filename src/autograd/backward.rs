//! Backward operation trait

/// Gradient propagation step recorded by an operation
///
/// Implementations read the gradient of their output cell, accumulate the
/// input gradients and then call `backward` on the inputs' own operations.
pub trait BackwardOp {
    fn backward(&self);
}
