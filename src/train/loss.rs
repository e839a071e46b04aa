//! Training loss

use crate::autograd::{add, scale, BackwardOp, Tensor};
use crate::config::RunConfig;
use crate::data::SampleBatch;
use crate::model::TrainOutput;
use crate::{Error, Result};
use ndarray::Array1;
use std::cell::RefCell;
use std::rc::Rc;

/// Scalar training objective for one batch
pub trait LossFn {
    fn compute_loss(
        &self,
        output: &TrainOutput,
        batch: &SampleBatch,
        config: &RunConfig,
    ) -> Result<Tensor>;

    fn name(&self) -> &str;
}

/// Masked negative log-likelihood of `targets[:, 1:]`, plus the weighted
/// contrastive term when the model returns one
///
/// `L = -Σ mask·log p(target) / Σ mask + contras_loss_w · L_con`
pub struct LanguageModelLoss;

impl LanguageModelLoss {
    fn masked_nll(output: &TrainOutput, batch: &SampleBatch) -> Result<Tensor> {
        let expected = output.batch_size * output.positions * output.vocab_size;
        if output.log_probs.len() != expected || batch.len() != output.batch_size {
            return Err(Error::ShapeMismatch {
                expected: vec![batch.len(), output.positions, output.vocab_size],
                got: vec![output.batch_size, output.positions, output.log_probs.len()],
            });
        }

        let mut picks = Vec::new();
        let mut total_mask = 0.0f32;
        for (b, (targets, mask)) in batch.targets.iter().zip(&batch.masks).enumerate() {
            for t in 0..output.positions {
                let m = mask.get(t + 1).copied().unwrap_or(0.0);
                if m == 0.0 {
                    continue;
                }
                let token = targets[t + 1];
                if token >= output.vocab_size {
                    return Err(Error::InvalidParameter(format!(
                        "target token {token} outside vocabulary of {}",
                        output.vocab_size
                    )));
                }
                picks.push(((b * output.positions + t) * output.vocab_size + token, m));
                total_mask += m;
            }
        }
        if total_mask == 0.0 {
            return Err(Error::InvalidParameter(
                "batch has no unmasked target tokens".to_string(),
            ));
        }

        let log_probs = output.log_probs.data();
        let nll = -picks
            .iter()
            .map(|&(i, m)| log_probs[i] * m)
            .sum::<f32>()
            / total_mask;

        let requires_grad = output.log_probs.requires_grad();
        let mut loss = Tensor::from_vec(vec![nll], requires_grad);
        if requires_grad {
            let weights = picks.into_iter().map(|(i, m)| (i, -m / total_mask)).collect();
            loss.set_backward_op(Rc::new(MaskedNllBackward {
                log_probs: output.log_probs.clone(),
                weights,
                result_grad: loss.grad_cell(),
            }));
        }
        Ok(loss)
    }
}

impl LossFn for LanguageModelLoss {
    fn compute_loss(
        &self,
        output: &TrainOutput,
        batch: &SampleBatch,
        config: &RunConfig,
    ) -> Result<Tensor> {
        let nll = Self::masked_nll(output, batch)?;

        match &output.contrastive {
            Some(contrastive) => {
                if contrastive.len() != 1 {
                    return Err(Error::ShapeMismatch {
                        expected: vec![1],
                        got: vec![contrastive.len()],
                    });
                }
                Ok(add(&nll, &scale(contrastive, config.model.contras_loss_w)))
            }
            None => Ok(nll),
        }
    }

    fn name(&self) -> &str {
        "LanguageModel"
    }
}

struct MaskedNllBackward {
    log_probs: Tensor,
    weights: Vec<(usize, f32)>,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for MaskedNllBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = grad[0];
            let mut grad_in = Array1::zeros(self.log_probs.len());
            for &(i, w) in &self.weights {
                grad_in[i] += g * w;
            }
            self.log_probs.accumulate_grad(grad_in);

            if let Some(op) = self.log_probs.backward_op() {
                op.backward();
            }
        }
    }
}
