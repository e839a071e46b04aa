//! Corpus-level BLEU
//!
//! Clipped n-gram matches and candidate lengths are accumulated over the
//! whole corpus before the geometric mean is taken. The effective reference
//! length of each sample is the reference length closest to the candidate
//! (shorter wins ties).

use super::ngram::{count_ngrams, max_counts};
use super::{CaptionScorer, Corpus};
use crate::{Error, Result};

const TINY: f64 = 1e-15;
const SMALL: f64 = 1e-9;

const LABELS: [&str; 4] = ["BLEU_1", "BLEU_2", "BLEU_3", "BLEU_4"];

/// Cumulative BLEU-1..BLEU-n
#[derive(Debug, Clone)]
pub struct Bleu {
    max_n: usize,
}

impl Bleu {
    /// BLEU with orders `1..=max_n` (at most 4 labels are published)
    pub fn new(max_n: usize) -> Self {
        Self {
            max_n: max_n.clamp(1, LABELS.len()),
        }
    }
}

impl Default for Bleu {
    fn default() -> Self {
        Self::new(4)
    }
}

/// Sufficient statistics accumulated over a corpus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BleuStats {
    pub test_len: usize,
    pub ref_len: usize,
    pub guess: Vec<usize>,
    pub correct: Vec<usize>,
}

impl BleuStats {
    fn new(max_n: usize) -> Self {
        Self {
            guess: vec![0; max_n],
            correct: vec![0; max_n],
            ..Default::default()
        }
    }

    /// Cumulative scores for each order, brevity penalty applied
    pub fn scores(&self) -> Vec<f64> {
        let ratio = (self.test_len as f64 + TINY) / (self.ref_len as f64 + SMALL);
        let penalty = if ratio < 1.0 {
            (1.0 - 1.0 / ratio).exp()
        } else {
            1.0
        };

        let mut product = 1.0;
        self.guess
            .iter()
            .zip(&self.correct)
            .enumerate()
            .map(|(k, (&guess, &correct))| {
                product *= (correct as f64 + TINY) / (guess as f64 + SMALL);
                product.powf(1.0 / (k + 1) as f64) * penalty
            })
            .collect()
    }
}

fn closest_ref_len(ref_lens: &[usize], test_len: usize) -> usize {
    ref_lens
        .iter()
        .copied()
        .min_by_key(|&len| (len.abs_diff(test_len), len))
        .unwrap_or(0)
}

impl Bleu {
    /// Accumulate corpus statistics
    pub fn stats(&self, corpus: &Corpus<'_>) -> Result<BleuStats> {
        let mut stats = BleuStats::new(self.max_n);

        for sample in &corpus.samples {
            if sample.references.is_empty() {
                return Err(Error::scorer(
                    self.name(),
                    format!("sample {} has no references", sample.id),
                ));
            }

            let hyp = &sample.hypothesis;
            let ref_lens: Vec<usize> = sample.references.iter().map(Vec::len).collect();
            stats.test_len += hyp.len();
            stats.ref_len += closest_ref_len(&ref_lens, hyp.len());

            let clip = max_counts(&sample.references, self.max_n);
            for (ngram, count) in count_ngrams(hyp, self.max_n) {
                let k = ngram.len() - 1;
                stats.correct[k] += count.min(clip.get(ngram).copied().unwrap_or(0));
            }
            for k in 0..self.max_n {
                stats.guess[k] += hyp.len().saturating_sub(k);
            }
        }

        Ok(stats)
    }
}

impl CaptionScorer for Bleu {
    fn name(&self) -> &str {
        "Bleu"
    }

    fn labels(&self) -> &[&'static str] {
        &LABELS[..self.max_n]
    }

    fn compute(&self, corpus: &Corpus<'_>) -> Result<Vec<f64>> {
        Ok(self.stats(corpus)?.scores())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Hypotheses, References};
    use approx::assert_abs_diff_eq;

    fn score(refs: &[(&str, &[&str])], hyps: &[(&str, &str)]) -> Vec<f64> {
        let refs: References = refs
            .iter()
            .map(|(id, rs)| (id.to_string(), rs.iter().map(|r| r.to_string()).collect()))
            .collect();
        let hyps: Hypotheses = hyps
            .iter()
            .map(|(id, h)| (id.to_string(), h.to_string()))
            .collect();
        let corpus = Corpus::aligned(&refs, &hyps).unwrap();
        Bleu::default().compute(&corpus).unwrap()
    }

    #[test]
    fn test_identical_sentence_scores_one() {
        let scores = score(
            &[("a", &["no acute cardiopulmonary abnormality"])],
            &[("a", "no acute cardiopulmonary abnormality")],
        );
        for s in scores {
            assert_abs_diff_eq!(s, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_brevity_penalty_applies_to_short_candidate() {
        let scores = score(&[("a", &["the lungs are clear"])], &[("a", "lungs clear")]);
        // Both unigrams match, brevity penalty exp(1 - 4/2)
        assert_abs_diff_eq!(scores[0], (-1.0f64).exp(), epsilon = 1e-6);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_scores_are_non_increasing_with_order() {
        let scores = score(
            &[("a", &["heart size is normal and lungs are clear"])],
            &[("a", "heart size normal lungs are clear")],
        );
        for pair in scores.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    #[test]
    fn test_clipping_limits_repeated_words() {
        let scores = score(&[("a", &["the heart"])], &[("a", "the the the the")]);
        // 1 of 4 unigrams survive clipping, no brevity penalty
        assert_abs_diff_eq!(scores[0], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_closest_reference_length_prefers_shorter_on_tie() {
        assert_eq!(closest_ref_len(&[5, 3], 4), 3);
        assert_eq!(closest_ref_len(&[7, 4], 4), 4);
    }

    #[test]
    fn test_missing_references_is_a_failure() {
        let refs: References = [("a".to_string(), vec![])].into_iter().collect();
        let hyps: Hypotheses = [("a".to_string(), "clear".to_string())].into_iter().collect();
        let corpus = Corpus::aligned(&refs, &hyps).unwrap();
        let err = Bleu::default().compute(&corpus).unwrap_err();
        assert!(matches!(err, Error::ScorerFailure { .. }));
    }
}
