//! CIDEr-D consensus score
//!
//! TF-IDF weighted n-gram vectors (orders 1..=4) compared by a clipped
//! cosine similarity with a Gaussian length penalty. Document frequencies
//! come from the reference sets of the scored corpus, so a single-sample
//! corpus always scores zero.

use super::ngram::{count_ngrams, NgramCounts};
use super::{CaptionScorer, Corpus};
use crate::{Error, Result};
use std::collections::HashMap;

const LABELS: [&str; 1] = ["CIDEr"];

#[derive(Debug, Clone)]
pub struct Cider {
    max_n: usize,
    scale: f64,
    /// Width of the length penalty, in bigrams
    sigma: f64,
}

impl Default for Cider {
    fn default() -> Self {
        Self {
            max_n: 4,
            scale: 10.0,
            sigma: 6.0,
        }
    }
}

/// TF-IDF weights split by n-gram order, plus per-order norms
struct TfIdf<'t, 'a> {
    weights: Vec<HashMap<&'t [&'a str], f64>>,
    norms: Vec<f64>,
    /// Number of bigrams
    length: usize,
}

impl Cider {
    fn vectorize<'t, 'a>(
        &self,
        counts: &NgramCounts<'t, 'a>,
        doc_freq: &NgramCounts<'t, 'a>,
        ref_len: f64,
    ) -> TfIdf<'t, 'a> {
        let mut weights = vec![HashMap::new(); self.max_n];
        let mut norms = vec![0.0; self.max_n];
        let mut length = 0;
        for (&ngram, &tf) in counts {
            let df = (doc_freq.get(ngram).copied().unwrap_or(0).max(1) as f64).ln();
            let n = ngram.len() - 1;
            let w = tf as f64 * (ref_len - df);
            norms[n] += w * w;
            weights[n].insert(ngram, w);
            if n == 1 {
                length += tf;
            }
        }
        for norm in &mut norms {
            *norm = norm.sqrt();
        }
        TfIdf {
            weights,
            norms,
            length,
        }
    }

    /// Per-order similarity; hypothesis weights are clipped to the reference
    fn similarity<'t, 'a>(&self, hyp: &TfIdf<'t, 'a>, reference: &TfIdf<'t, 'a>) -> Vec<f64> {
        let delta = hyp.length as f64 - reference.length as f64;
        let penalty = (-(delta * delta) / (2.0 * self.sigma * self.sigma)).exp();

        (0..self.max_n)
            .map(|n| {
                let dot: f64 = hyp.weights[n]
                    .iter()
                    .map(|(ngram, &w)| {
                        let r = reference.weights[n].get(ngram).copied().unwrap_or(0.0);
                        w.min(r) * r
                    })
                    .sum();
                let cosine = if hyp.norms[n] != 0.0 && reference.norms[n] != 0.0 {
                    dot / (hyp.norms[n] * reference.norms[n])
                } else {
                    dot
                };
                cosine * penalty
            })
            .collect()
    }

    /// Per-sample scores in corpus order
    pub fn sample_scores(&self, corpus: &Corpus<'_>) -> Result<Vec<f64>> {
        let mut ref_counts = Vec::with_capacity(corpus.samples.len());
        for sample in &corpus.samples {
            if sample.references.is_empty() {
                return Err(Error::scorer(
                    self.name(),
                    format!("sample {} has no references", sample.id),
                ));
            }
            let counts: Vec<NgramCounts<'_, '_>> = sample
                .references
                .iter()
                .map(|r| count_ngrams(r, self.max_n))
                .collect();
            ref_counts.push(counts);
        }

        // Document frequency: number of samples whose references contain the n-gram
        let mut doc_freq: NgramCounts<'_, '_> = HashMap::new();
        for counts in &ref_counts {
            let mut seen: Vec<&[&str]> = counts.iter().flat_map(|c| c.keys().copied()).collect();
            seen.sort_unstable();
            seen.dedup();
            for ngram in seen {
                *doc_freq.entry(ngram).or_insert(0) += 1;
            }
        }

        let ref_len = (corpus.samples.len().max(1) as f64).ln();

        Ok(corpus
            .samples
            .iter()
            .zip(&ref_counts)
            .map(|(sample, refs)| {
                let hyp_vec =
                    self.vectorize(&count_ngrams(&sample.hypothesis, self.max_n), &doc_freq, ref_len);
                let mut per_order = vec![0.0; self.max_n];
                for counts in refs {
                    let ref_vec = self.vectorize(counts, &doc_freq, ref_len);
                    for (acc, s) in per_order.iter_mut().zip(self.similarity(&hyp_vec, &ref_vec)) {
                        *acc += s;
                    }
                }
                let mean = per_order.iter().sum::<f64>() / self.max_n as f64;
                mean / refs.len() as f64 * self.scale
            })
            .collect())
    }
}

impl CaptionScorer for Cider {
    fn name(&self) -> &str {
        "Cider"
    }

    fn labels(&self) -> &[&'static str] {
        &LABELS
    }

    fn compute(&self, corpus: &Corpus<'_>) -> Result<Vec<f64>> {
        let scores = self.sample_scores(corpus)?;
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        Ok(vec![mean])
    }
}
