//! Feature-conditioned bigram report model

use super::{ReportModel, TrainOutput};
use crate::autograd::{add, gather_rows, log_softmax_rows, matmul, Tensor};
use crate::data::SampleBatch;
use crate::optim::VISUAL_EXTRACTOR_PREFIX;
use crate::tokenizer::TokenId;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Next-token logits are `features · proj + transition[previous token]`
///
/// `proj` belongs to the visual extractor group, `transition` to the
/// encoder-decoder group.
pub struct BigramReportModel {
    feature_dim: usize,
    vocab_size: usize,
    bos: TokenId,
    params: Vec<Tensor>,
}

impl BigramReportModel {
    pub fn new(feature_dim: usize, vocab_size: usize, bos: TokenId, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = |n: usize| {
            let values: Vec<f32> = (0..n).map(|_| rng.random::<f32>() * 0.2 - 0.1).collect();
            Tensor::from_vec(values, true)
        };

        let proj = init(feature_dim * vocab_size);
        let transition = init(vocab_size * vocab_size);

        Self {
            feature_dim,
            vocab_size,
            bos,
            params: vec![proj, transition],
        }
    }

    fn check_features(&self, features: &[f32]) -> Result<()> {
        if features.len() != self.feature_dim {
            return Err(Error::ShapeMismatch {
                expected: vec![self.feature_dim],
                got: vec![features.len()],
            });
        }
        Ok(())
    }

    fn check_token(&self, token: TokenId) -> Result<()> {
        if token >= self.vocab_size {
            return Err(Error::InvalidParameter(format!(
                "token id {token} outside vocabulary of {}",
                self.vocab_size
            )));
        }
        Ok(())
    }
}

impl ReportModel for BigramReportModel {
    fn parameter_names(&self) -> Vec<String> {
        vec![
            format!("{VISUAL_EXTRACTOR_PREFIX}.proj"),
            "encoder_decoder.transition".to_string(),
        ]
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn forward_train(&self, batch: &SampleBatch) -> Result<TrainOutput> {
        let batch_size = batch.len();
        let positions = batch.seq_len().saturating_sub(1);
        if batch_size == 0 || positions == 0 {
            return Err(Error::InvalidParameter(
                "batch needs at least one sample with two target tokens".to_string(),
            ));
        }

        let mut flat = Vec::with_capacity(batch_size * self.feature_dim);
        for features in &batch.features {
            self.check_features(features)?;
            flat.extend_from_slice(features);
        }

        let mut sample_rows = Vec::with_capacity(batch_size * positions);
        let mut previous = Vec::with_capacity(batch_size * positions);
        for (b, row) in batch.targets.iter().enumerate() {
            for &token in &row[..positions] {
                self.check_token(token)?;
                sample_rows.push(b);
                previous.push(token);
            }
        }

        let v = self.vocab_size;
        let features = Tensor::from_vec(flat, false);
        let visual = matmul(&features, &self.params[0], batch_size, self.feature_dim, v);
        let visual = gather_rows(&visual, v, &sample_rows);
        let textual = gather_rows(&self.params[1], v, &previous);
        let log_probs = log_softmax_rows(&add(&visual, &textual), v);

        Ok(TrainOutput {
            log_probs,
            batch_size,
            positions,
            vocab_size: v,
            contrastive: None,
        })
    }

    fn next_log_probs(&self, features: &[f32], prefix: &[TokenId]) -> Result<Vec<f32>> {
        self.check_features(features)?;
        let previous = prefix.last().copied().unwrap_or(self.bos);
        self.check_token(previous)?;

        let v = self.vocab_size;
        let proj = self.params[0].data();
        let transition = self.params[1].data();

        let mut logits: Vec<f32> = (0..v).map(|j| transition[previous * v + j]).collect();
        for (i, &x) in features.iter().enumerate() {
            for (j, logit) in logits.iter_mut().enumerate() {
                *logit += x * proj[i * v + j];
            }
        }

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = logits.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
        Ok(logits.into_iter().map(|x| x - log_sum).collect())
    }
}
