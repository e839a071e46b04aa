//! Model boundary
//!
//! The report generator itself (visual extractor, encoder-decoder, the
//! contrastive alignment head) is supplied by the caller through
//! [`ReportModel`]. The trainer only needs named parameters, teacher-forced
//! log-probabilities for the loss and next-token distributions for decoding.
//! [`BigramReportModel`] is a small reference implementation.

mod bigram;

pub use bigram::BigramReportModel;

use crate::autograd::Tensor;
use crate::data::SampleBatch;
use crate::decode::{BeamHypothesis, Decoder};
use crate::tokenizer::TokenId;
use crate::Result;

/// Teacher-forced output for one batch
///
/// `log_probs` is a flat `[batch, positions, vocab]` tensor where position
/// `t` predicts `targets[b][t + 1]`.
pub struct TrainOutput {
    pub log_probs: Tensor,
    pub batch_size: usize,
    pub positions: usize,
    pub vocab_size: usize,
    /// Scalar image/report alignment loss, if the model has one
    pub contrastive: Option<Tensor>,
}

impl TrainOutput {
    /// Log-probability of `token` at position `t` of sample `b`
    pub fn log_prob(&self, b: usize, t: usize, token: TokenId) -> f32 {
        self.log_probs.data()[(b * self.positions + t) * self.vocab_size + token]
    }
}

pub trait ReportModel {
    /// Names aligned with [`ReportModel::parameters`]
    fn parameter_names(&self) -> Vec<String>;

    fn parameters(&self) -> &[Tensor];

    fn parameters_mut(&mut self) -> &mut [Tensor];

    fn vocab_size(&self) -> usize;

    fn forward_train(&self, batch: &SampleBatch) -> Result<TrainOutput>;

    /// Log-probabilities over the vocabulary for the token after `prefix`
    ///
    /// `prefix` holds generated tokens only; BOS is implied.
    fn next_log_probs(&self, features: &[f32], prefix: &[TokenId]) -> Result<Vec<f32>>;
}

pub enum ForwardMode<'d> {
    Train,
    Generate(&'d mut Decoder),
}

pub enum ForwardOutput {
    Train(TrainOutput),
    Generate(Vec<Vec<BeamHypothesis>>),
}

/// Run the model in training or generation mode
pub fn forward(
    model: &dyn ReportModel,
    batch: &SampleBatch,
    mode: ForwardMode<'_>,
) -> Result<ForwardOutput> {
    match mode {
        ForwardMode::Train => model.forward_train(batch).map(ForwardOutput::Train),
        ForwardMode::Generate(decoder) => decoder
            .decode_batch(model, batch)
            .map(ForwardOutput::Generate),
    }
}
