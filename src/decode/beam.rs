//! Beam search

use super::{normalised, BeamHypothesis, DecodeConfig};
use crate::model::ReportModel;
use crate::tokenizer::TokenId;
use crate::Result;

struct Candidate {
    beam: usize,
    token: TokenId,
    log_prob: f32,
    rank: f32,
}

/// Beam search for a single sample
///
/// Candidates are enumerated beam by beam, token by token, and sorted with a
/// stable sort, so equal scores keep that order.
pub(super) fn search(
    config: &DecodeConfig,
    model: &dyn ReportModel,
    features: &[f32],
) -> Result<Vec<BeamHypothesis>> {
    let mut active = vec![BeamHypothesis::empty()];
    let mut finished: Vec<BeamHypothesis> = Vec::new();

    while !active.is_empty() {
        let mut candidates = Vec::new();
        for (beam, hyp) in active.iter().enumerate() {
            let log_probs = model.next_log_probs(features, &hyp.tokens)?;
            let before = candidates.len();

            for (token, &lp) in log_probs.iter().enumerate() {
                if !lp.is_finite() || !config.allows(&hyp.tokens, token) {
                    continue;
                }
                let log_prob = hyp.log_prob + lp;
                let len = hyp.tokens.len() + usize::from(token != config.eos);
                candidates.push(Candidate {
                    beam,
                    token,
                    log_prob,
                    rank: normalised(log_prob, len, config.length_normalize),
                });
            }

            // no admissible continuation
            if candidates.len() == before {
                finished.push(BeamHypothesis {
                    finished: true,
                    ..hyp.clone()
                });
            }
        }

        candidates.sort_by(|a, b| b.rank.total_cmp(&a.rank));

        let mut next = Vec::with_capacity(config.beam_size);
        for candidate in candidates.into_iter().take(config.beam_size) {
            let parent = &active[candidate.beam];
            if candidate.token == config.eos {
                finished.push(BeamHypothesis {
                    tokens: parent.tokens.clone(),
                    log_prob: candidate.log_prob,
                    finished: true,
                });
                continue;
            }

            let mut tokens = parent.tokens.clone();
            tokens.push(candidate.token);
            let done = tokens.len() >= config.max_seq_length;
            let hyp = BeamHypothesis {
                tokens,
                log_prob: candidate.log_prob,
                finished: done,
            };
            if done {
                finished.push(hyp);
            } else {
                next.push(hyp);
            }
        }
        active = next;

        if !config.length_normalize && finished_beats_active(&finished, &active, config.sample_n)
        {
            break;
        }
    }

    finished.sort_by(|a, b| {
        b.score(config.length_normalize)
            .total_cmp(&a.score(config.length_normalize))
    });
    finished.truncate(config.sample_n);
    Ok(finished)
}

/// Log-probabilities only fall as tokens are added, so once the `n`-th best
/// finished hypothesis is at least as good as every active one the search
/// cannot improve.
fn finished_beats_active(finished: &[BeamHypothesis], active: &[BeamHypothesis], n: usize) -> bool {
    if finished.len() < n {
        return false;
    }
    let mut scores: Vec<f32> = finished.iter().map(|h| h.log_prob).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    let nth = scores[n - 1];

    active.iter().all(|h| nth >= h.log_prob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::Tensor;
    use crate::data::SampleBatch;
    use crate::model::TrainOutput;
    use crate::{Error, Result};

    /// Fixed next-token table indexed by the previous token
    struct TableModel {
        rows: Vec<Vec<f32>>,
    }

    impl TableModel {
        fn new(probs: Vec<Vec<f32>>) -> Self {
            Self {
                rows: probs
                    .into_iter()
                    .map(|r| r.into_iter().map(f32::ln).collect())
                    .collect(),
            }
        }
    }

    impl ReportModel for TableModel {
        fn parameter_names(&self) -> Vec<String> {
            Vec::new()
        }
        fn parameters(&self) -> &[Tensor] {
            &[]
        }
        fn parameters_mut(&mut self) -> &mut [Tensor] {
            &mut []
        }
        fn vocab_size(&self) -> usize {
            self.rows.len()
        }
        fn forward_train(&self, _batch: &SampleBatch) -> Result<TrainOutput> {
            Err(Error::InvalidParameter("generation only".to_string()))
        }
        fn next_log_probs(&self, _features: &[f32], prefix: &[TokenId]) -> Result<Vec<f32>> {
            Ok(self.rows[prefix.last().copied().unwrap_or(0)].clone())
        }
    }

    fn config(beam_size: usize) -> DecodeConfig {
        DecodeConfig {
            beam_size,
            max_seq_length: 10,
            block_trigrams: false,
            ..DecodeConfig::default()
        }
    }

    #[test]
    fn test_beam_finds_better_sequence_than_greedy() {
        // greedy takes 1 (0.6) then ends (0.5) = 0.30; beam finds 2 then end = 0.4 * 0.9 = 0.36
        let model = TableModel::new(vec![
            vec![0.0, 0.6, 0.4],
            vec![0.5, 0.25, 0.25],
            vec![0.9, 0.05, 0.05],
        ]);

        let greedy = search(&config(1), &model, &[]).unwrap();
        assert_eq!(greedy[0].tokens, vec![1]);

        let beam = search(&config(2), &model, &[]).unwrap();
        assert_eq!(beam[0].tokens, vec![2]);
        assert!((beam[0].log_prob - 0.36f32.ln()).abs() < 1e-5);
        assert!(beam[0].finished);
    }

    #[test]
    fn test_sample_n_returns_best_first() {
        let model = TableModel::new(vec![
            vec![0.0, 0.6, 0.4],
            vec![0.5, 0.25, 0.25],
            vec![0.9, 0.05, 0.05],
        ]);
        let config = DecodeConfig {
            sample_n: 2,
            ..config(3)
        };

        let hyps = search(&config, &model, &[]).unwrap();
        assert_eq!(hyps.len(), 2);
        assert!(hyps[0].log_prob >= hyps[1].log_prob);
    }

    #[test]
    fn test_ties_keep_enumeration_order() {
        let model = TableModel::new(vec![
            vec![0.0, 0.5, 0.5],
            vec![1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
        ]);
        let hyps = search(&config(2), &model, &[]).unwrap();
        assert_eq!(hyps[0].tokens, vec![1]);
    }

    #[test]
    fn test_max_length_terminates() {
        // EOS is never likely; the loop 1 -> 2 -> 1 ... must stop at the bound
        let model = TableModel::new(vec![
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
        ]);
        let hyps = search(&config(2), &model, &[]).unwrap();
        assert_eq!(hyps[0].tokens.len(), 10);
        assert!(hyps[0].finished);
    }

    #[test]
    fn test_trigram_blocking_forces_eos() {
        let model = TableModel::new(vec![
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
        ]);
        let config = DecodeConfig {
            block_trigrams: true,
            ..config(2)
        };
        let hyps = search(&config, &model, &[]).unwrap();
        assert_eq!(hyps[0].tokens, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_decoding_constraint_blocks_repeats() {
        let model = TableModel::new(vec![
            vec![0.1, 0.9, 0.0],
            vec![0.1, 0.8, 0.1],
            vec![0.8, 0.1, 0.1],
        ]);
        let config = DecodeConfig {
            decoding_constraint: true,
            ..config(1)
        };
        let hyps = search(&config, &model, &[]).unwrap();
        assert!(hyps[0].tokens.windows(2).all(|w| w[0] != w[1]));
    }
}
