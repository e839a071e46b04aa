//! Caption metrics for generated reports
//!
//! [`MetricScorer`] scores a set of generated reports against their ground
//! truth and produces a [`MetricReport`] with `BLEU_1`..`BLEU_4`, `ROUGE_L`
//! and `CIDEr`.
//!
//! Each metric family is an independent [`CaptionScorer`]. A failing family
//! is logged and recorded as `0.0` so a long training run is never aborted
//! by an evaluation hiccup; only a reference/hypothesis key mismatch is
//! fatal.
//!
//! # Example
//!
//! ```
//! use informe::metrics::{Hypotheses, MetricScorer, References};
//!
//! let refs: References = [("p1".to_string(), vec!["the lungs are clear".to_string()])]
//!     .into_iter()
//!     .collect();
//! let hyps: Hypotheses = [("p1".to_string(), "lungs clear".to_string())]
//!     .into_iter()
//!     .collect();
//!
//! let report = MetricScorer::new().score(&refs, &hyps).unwrap();
//! assert_eq!(report.len(), 6);
//! ```

mod bleu;
mod cider;
mod ngram;
mod rouge;

pub use bleu::{Bleu, BleuStats};
pub use cider::Cider;
pub use rouge::{lcs_length, RougeL};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sample id to one or more ground-truth reports
pub type References = BTreeMap<String, Vec<String>>;

/// Sample id to generated report
pub type Hypotheses = BTreeMap<String, String>;

/// Metric names in publication order
pub const METRIC_NAMES: [&str; 6] = ["BLEU_1", "BLEU_2", "BLEU_3", "BLEU_4", "ROUGE_L", "CIDEr"];

/// One tokenized sample
#[derive(Debug, Clone)]
pub struct Sample<'a> {
    pub id: &'a str,
    pub references: Vec<Vec<&'a str>>,
    pub hypothesis: Vec<&'a str>,
}

/// Whitespace-tokenized corpus with references and hypotheses aligned by id
#[derive(Debug, Clone, Default)]
pub struct Corpus<'a> {
    pub samples: Vec<Sample<'a>>,
}

impl<'a> Corpus<'a> {
    /// Align two collections by sample id
    ///
    /// Fails with [`Error::KeyMismatch`] unless both key sets are identical.
    pub fn aligned(references: &'a References, hypotheses: &'a Hypotheses) -> Result<Self> {
        let missing_in_hypotheses: Vec<String> = references
            .keys()
            .filter(|k| !hypotheses.contains_key(*k))
            .cloned()
            .collect();
        let missing_in_references: Vec<String> = hypotheses
            .keys()
            .filter(|k| !references.contains_key(*k))
            .cloned()
            .collect();
        if !missing_in_hypotheses.is_empty() || !missing_in_references.is_empty() {
            return Err(Error::KeyMismatch {
                missing_in_hypotheses,
                missing_in_references,
            });
        }

        let samples = references
            .iter()
            .zip(hypotheses.values())
            .map(|((id, refs), hyp)| Sample {
                id: id.as_str(),
                references: refs.iter().map(|r| r.split_whitespace().collect()).collect(),
                hypothesis: hyp.split_whitespace().collect(),
            })
            .collect();

        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A metric family producing one value per label
pub trait CaptionScorer: Send + Sync {
    /// Name used in failure warnings
    fn name(&self) -> &str;

    /// Labels of the returned values, in order
    fn labels(&self) -> &[&'static str];

    /// Score a non-empty aligned corpus
    fn compute(&self, corpus: &Corpus<'_>) -> Result<Vec<f64>>;
}

/// Metric name to value
///
/// BLEU and ROUGE values lie in `[0, 1]`, CIDEr is non-negative. A family
/// that failed is stored as `0.0` like a genuine zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricReport(BTreeMap<String, f64>);

impl MetricReport {
    /// Report with every label set to zero
    pub fn zeroed<'l>(labels: impl IntoIterator<Item = &'l str>) -> Self {
        Self(labels.into_iter().map(|l| (l.to_string(), 0.0)).collect())
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.0.get(metric).copied()
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.0.contains_key(metric)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copy with every key prefixed, e.g. `val_BLEU_4`
    pub fn prefixed(&self, prefix: &str) -> BTreeMap<String, f64> {
        self.0
            .iter()
            .map(|(k, v)| (format!("{prefix}{k}"), *v))
            .collect()
    }

    fn insert(&mut self, metric: &str, value: f64) {
        self.0.insert(metric.to_string(), value);
    }
}

impl std::fmt::Display for MetricReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v:.4}")).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Runs every metric family over a corpus
pub struct MetricScorer {
    scorers: Vec<Box<dyn CaptionScorer>>,
}

impl Default for MetricScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.scorers.iter().map(|s| s.name()).collect();
        f.debug_struct("MetricScorer").field("scorers", &names).finish()
    }
}

impl MetricScorer {
    /// BLEU(4), ROUGE-L and CIDEr
    pub fn new() -> Self {
        Self::with_scorers(vec![
            Box::new(Bleu::default()),
            Box::new(RougeL),
            Box::new(Cider::default()),
        ])
    }

    pub fn with_scorers(scorers: Vec<Box<dyn CaptionScorer>>) -> Self {
        Self { scorers }
    }

    /// Every label this scorer publishes
    pub fn labels(&self) -> Vec<&'static str> {
        self.scorers
            .iter()
            .flat_map(|s| s.labels().iter().copied())
            .collect()
    }

    /// Score hypotheses against references
    ///
    /// Returns [`Error::KeyMismatch`] when the key sets differ, including
    /// when only one side is empty. An empty corpus and failing families
    /// yield zeros with a warning.
    pub fn score(&self, references: &References, hypotheses: &Hypotheses) -> Result<MetricReport> {
        let corpus = Corpus::aligned(references, hypotheses)?;
        if corpus.is_empty() {
            tracing::warn!("empty references and hypotheses, reporting zero for every metric");
            return Ok(MetricReport::zeroed(self.labels()));
        }

        let mut report = MetricReport::default();
        for scorer in &self.scorers {
            let labels = scorer.labels();
            let values = scorer.compute(&corpus).and_then(|values| {
                if values.len() == labels.len() {
                    Ok(values)
                } else {
                    Err(Error::scorer(
                        scorer.name(),
                        format!("returned {} values for {} labels", values.len(), labels.len()),
                    ))
                }
            });

            match values {
                Ok(values) => {
                    for (label, value) in labels.iter().zip(values) {
                        report.insert(label, value);
                    }
                }
                Err(e) => {
                    tracing::warn!(scorer = scorer.name(), error = %e, "scorer failed, recording zeros");
                    for label in labels {
                        report.insert(label, 0.0);
                    }
                }
            }
        }

        Ok(report)
    }
}
