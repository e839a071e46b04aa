//! ROUGE-L (longest common subsequence F-measure)

use super::{CaptionScorer, Corpus};
use crate::{Error, Result};

/// Recall weighting of the F-measure
const BETA: f64 = 1.2;

const LABELS: [&str; 1] = ["ROUGE_L"];

/// Sentence-level ROUGE-L averaged over the corpus
///
/// Precision and recall are each maximised over the references before being
/// combined. An empty candidate or an empty reference scores zero for that
/// sample; a sample without any reference fails the scorer.
#[derive(Debug, Clone, Default)]
pub struct RougeL;

/// Length of the longest common subsequence of two token sequences
pub fn lcs_length(a: &[&str], b: &[&str]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Two-row DP table
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

impl RougeL {
    /// Score one candidate against its references
    pub fn sentence_score(&self, candidate: &[&str], references: &[Vec<&str>]) -> Result<f64> {
        if references.is_empty() {
            return Err(Error::scorer(self.name(), "no references"));
        }
        if candidate.is_empty() {
            return Ok(0.0);
        }

        let mut prec_max: f64 = 0.0;
        let mut rec_max: f64 = 0.0;
        for reference in references {
            if reference.is_empty() {
                continue;
            }
            let lcs = lcs_length(reference, candidate) as f64;
            prec_max = prec_max.max(lcs / candidate.len() as f64);
            rec_max = rec_max.max(lcs / reference.len() as f64);
        }

        if prec_max == 0.0 || rec_max == 0.0 {
            return Ok(0.0);
        }
        let beta_sq = BETA * BETA;
        Ok(((1.0 + beta_sq) * prec_max * rec_max) / (rec_max + beta_sq * prec_max))
    }
}

impl CaptionScorer for RougeL {
    fn name(&self) -> &str {
        "Rouge"
    }

    fn labels(&self) -> &[&'static str] {
        &LABELS
    }

    fn compute(&self, corpus: &Corpus<'_>) -> Result<Vec<f64>> {
        let mut total = 0.0;
        for sample in &corpus.samples {
            total += self
                .sentence_score(&sample.hypothesis, &sample.references)
                .map_err(|e| match e {
                    Error::ScorerFailure { scorer, reason } => Error::ScorerFailure {
                        scorer,
                        reason: format!("sample {}: {reason}", sample.id),
                    },
                    other => other,
                })?;
        }
        let mean = if corpus.samples.is_empty() {
            0.0
        } else {
            total / corpus.samples.len() as f64
        };
        Ok(vec![mean])
    }
}
