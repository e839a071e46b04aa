//! Differentiable operations

use super::{BackwardOp, Tensor};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

fn recurse(tensor: &Tensor) {
    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}

/// Element-wise sum of two tensors of equal length
pub fn add(a: &Tensor, b: &Tensor) -> Tensor {
    let data = a.data() + b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for AddBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad.clone());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad.clone());
            }
            recurse(&self.a);
            recurse(&self.b);
        }
    }
}

/// Multiply every element by a constant
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }
            recurse(&self.a);
        }
    }
}

/// Sum all elements into a single-element tensor
pub fn sum(a: &Tensor) -> Tensor {
    let data = Array1::from(vec![a.data().sum()]);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(Array1::from_elem(self.a.len(), grad[0]));
            }
            recurse(&self.a);
        }
    }
}

/// Matrix multiplication of row-major flattened matrices
///
/// `a` is m×k, `b` is k×n and the result is m×n.
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let mut result_data = vec![0.0; m * n];
    for i in 0..m {
        for p in 0..k {
            let a_ip = a.data()[i * k + p];
            if a_ip == 0.0 {
                continue;
            }
            for j in 0..n {
                result_data[i * n + j] += a_ip * b.data()[p * n + j];
            }
        }
    }

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(Array1::from(result_data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (m, k, n) = (self.m, self.k, self.n);

            // dA = dC @ B^T
            if self.a.requires_grad() {
                let mut grad_a = vec![0.0; m * k];
                for i in 0..m {
                    for p in 0..k {
                        grad_a[i * k + p] = (0..n)
                            .map(|j| grad_output[i * n + j] * self.b.data()[p * n + j])
                            .sum();
                    }
                }
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            // dB = A^T @ dC
            if self.b.requires_grad() {
                let mut grad_b = vec![0.0; k * n];
                for p in 0..k {
                    for j in 0..n {
                        grad_b[p * n + j] = (0..m)
                            .map(|i| self.a.data()[i * k + p] * grad_output[i * n + j])
                            .sum();
                    }
                }
                self.b.accumulate_grad(Array1::from(grad_b));
            }

            recurse(&self.a);
            recurse(&self.b);
        }
    }
}

/// Select rows of a row-major matrix with `cols` columns
///
/// Output row `r` is `src[indices[r]]`. Used for embedding lookups and for
/// broadcasting a per-sample row over every decoding position.
pub fn gather_rows(src: &Tensor, cols: usize, indices: &[usize]) -> Tensor {
    assert!(cols > 0 && src.len() % cols == 0, "Source is not a matrix");
    let rows = src.len() / cols;

    let mut data = Vec::with_capacity(indices.len() * cols);
    for &row in indices {
        assert!(row < rows, "Row index {row} out of range for {rows} rows");
        data.extend(src.data().iter().skip(row * cols).take(cols));
    }

    let requires_grad = src.requires_grad();
    let mut result = Tensor::new(Array1::from(data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(GatherRowsBackward {
            src: src.clone(),
            cols,
            indices: indices.to_vec(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct GatherRowsBackward {
    src: Tensor,
    cols: usize,
    indices: Vec<usize>,
    result_grad: GradCell,
}

impl BackwardOp for GatherRowsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let mut grad_src = Array1::zeros(self.src.len());
            for (out_row, &row) in self.indices.iter().enumerate() {
                for c in 0..self.cols {
                    grad_src[row * self.cols + c] += grad[out_row * self.cols + c];
                }
            }
            self.src.accumulate_grad(grad_src);
            recurse(&self.src);
        }
    }
}

/// Row-wise log-softmax over a row-major matrix with `cols` columns
pub fn log_softmax_rows(a: &Tensor, cols: usize) -> Tensor {
    assert!(cols > 0 && a.len() % cols == 0, "Input is not a matrix");

    let mut data = Array1::zeros(a.len());
    for (row_in, row_out) in a
        .data()
        .as_slice()
        .unwrap_or(&[])
        .chunks(cols)
        .zip(data.as_slice_mut().unwrap_or(&mut []).chunks_mut(cols))
    {
        let max = row_in.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = row_in.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
        for (out, &x) in row_out.iter_mut().zip(row_in) {
            *out = x - log_sum;
        }
    }

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LogSoftmaxRowsBackward {
            a: a.clone(),
            output: result.data().clone(),
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct LogSoftmaxRowsBackward {
    a: Tensor,
    output: Array1<f32>,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for LogSoftmaxRowsBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // dx = g - softmax(x) * sum(g), per row
                let mut grad_a = Array1::zeros(self.a.len());
                for start in (0..self.a.len()).step_by(self.cols) {
                    let end = start + self.cols;
                    let g_sum: f32 = (start..end).map(|i| grad[i]).sum();
                    for i in start..end {
                        grad_a[i] = grad[i] - self.output[i].exp() * g_sum;
                    }
                }
                self.a.accumulate_grad(grad_a);
            }
            recurse(&self.a);
        }
    }
}
