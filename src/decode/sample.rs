//! Greedy and temperature sampling

use super::{BeamHypothesis, DecodeConfig};
use crate::model::ReportModel;
use crate::tokenizer::TokenId;
use crate::Result;
use rand::rngs::StdRng;
use rand::Rng;

/// Argmax at every step; the first maximum wins ties
pub(super) fn greedy(
    config: &DecodeConfig,
    model: &dyn ReportModel,
    features: &[f32],
) -> Result<BeamHypothesis> {
    unroll(config, model, features, |log_probs| {
        let mut best: Option<(TokenId, f32)> = None;
        for (token, &lp) in log_probs.iter().enumerate() {
            if lp.is_finite() && best.map_or(true, |(_, b)| lp > b) {
                best = Some((token, lp));
            }
        }
        best.map(|(token, _)| token)
    })
}

/// Categorical draw from `softmax(log_probs / temperature)`
pub(super) fn draw(
    config: &DecodeConfig,
    model: &dyn ReportModel,
    features: &[f32],
    rng: &mut StdRng,
) -> Result<BeamHypothesis> {
    let temperature = config.temperature;
    unroll(config, model, features, |log_probs| {
        let max = log_probs
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return None;
        }

        let weights: Vec<f32> = log_probs
            .iter()
            .map(|&lp| {
                if lp.is_finite() {
                    ((lp - max) / temperature).exp()
                } else {
                    0.0
                }
            })
            .collect();
        let total: f32 = weights.iter().sum();

        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0;
        let mut last = None;
        for (token, &w) in weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            cumulative += w;
            last = Some(token);
            if target < cumulative {
                return Some(token);
            }
        }
        last
    })
}

/// Extend one hypothesis token by token with `pick` until EOS, a dead end
/// or the length bound
fn unroll(
    config: &DecodeConfig,
    model: &dyn ReportModel,
    features: &[f32],
    mut pick: impl FnMut(&[f32]) -> Option<TokenId>,
) -> Result<BeamHypothesis> {
    let mut hyp = BeamHypothesis::empty();

    while hyp.tokens.len() < config.max_seq_length {
        let mut log_probs = model.next_log_probs(features, &hyp.tokens)?;
        for (token, lp) in log_probs.iter_mut().enumerate() {
            if !config.allows(&hyp.tokens, token) {
                *lp = f32::NEG_INFINITY;
            }
        }

        let Some(token) = pick(&log_probs) else {
            break;
        };
        hyp.log_prob += log_probs[token];
        if token == config.eos {
            break;
        }
        hyp.tokens.push(token);
    }

    hyp.finished = true;
    Ok(hyp)
}
