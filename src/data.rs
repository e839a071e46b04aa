//! Sample batches and the loader boundary
//!
//! The dataset pipeline (image decoding, augmentation, prefetch) lives
//! outside this crate. It hands the trainer [`SampleBatch`] values through
//! the [`BatchLoader`] trait.

use crate::tokenizer::{ReportTokenizer, TokenId};
use crate::{Error, Result};
use std::collections::HashMap;

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Val => write!(f, "val"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// A batch of image features with their tokenized reports
///
/// `targets` rows start with BOS and are right-padded with PAD to a common
/// length; `masks` is 1.0 where `targets` holds a real token.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub ids: Vec<String>,
    pub features: Vec<Vec<f32>>,
    pub targets: Vec<Vec<TokenId>>,
    pub masks: Vec<Vec<f32>>,
}

impl SampleBatch {
    /// Tokenize reports and pad them into a batch
    pub fn from_reports(
        ids: Vec<String>,
        features: Vec<Vec<f32>>,
        reports: &[&str],
        tokenizer: &dyn ReportTokenizer,
        max_seq_length: usize,
        pad_idx: TokenId,
    ) -> Result<Self> {
        if ids.len() != features.len() || ids.len() != reports.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![ids.len(), ids.len()],
                got: vec![features.len(), reports.len()],
            });
        }

        let encoded: Vec<Vec<TokenId>> = reports
            .iter()
            .map(|r| tokenizer.encode(r, max_seq_length))
            .collect();
        let seq_len = encoded.iter().map(Vec::len).max().unwrap_or(0);

        let mut targets = Vec::with_capacity(encoded.len());
        let mut masks = Vec::with_capacity(encoded.len());
        for mut row in encoded {
            let mut mask = vec![1.0; row.len()];
            mask.resize(seq_len, 0.0);
            row.resize(seq_len, pad_idx);
            targets.push(row);
            masks.push(mask);
        }

        Ok(Self {
            ids,
            features,
            targets,
            masks,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Padded target length, BOS included
    pub fn seq_len(&self) -> usize {
        self.targets.first().map_or(0, Vec::len)
    }

    /// Width of the feature vectors
    pub fn feature_dim(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Ground-truth texts decoded from `targets[:, 1:]`
    pub fn reference_texts(&self, tokenizer: &dyn ReportTokenizer) -> Vec<String> {
        self.targets
            .iter()
            .map(|row| tokenizer.decode(row.get(1..).unwrap_or(&[])))
            .collect()
    }
}

/// Source of batches for each split
pub trait BatchLoader {
    fn batches(&self, split: Split) -> Result<Vec<SampleBatch>>;
}

/// Pre-built batches held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    splits: HashMap<Split, Vec<SampleBatch>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(mut self, split: Split, batch: SampleBatch) -> Self {
        self.push(split, batch);
        self
    }

    pub fn push(&mut self, split: Split, batch: SampleBatch) {
        self.splits.entry(split).or_default().push(batch);
    }

    /// Tokenize `(id, features, report)` records into batches of `batch_size`
    pub fn from_records(
        split: Split,
        records: &[(String, Vec<f32>, String)],
        tokenizer: &dyn ReportTokenizer,
        max_seq_length: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidParameter("batch size must be > 0".to_string()));
        }

        let pad = tokenizer.special().pad;
        let mut loader = Self::new();
        for chunk in records.chunks(batch_size) {
            let ids = chunk.iter().map(|(id, _, _)| id.clone()).collect();
            let features = chunk.iter().map(|(_, f, _)| f.clone()).collect();
            let reports: Vec<&str> = chunk.iter().map(|(_, _, r)| r.as_str()).collect();
            loader.push(
                split,
                SampleBatch::from_reports(ids, features, &reports, tokenizer, max_seq_length, pad)?,
            );
        }
        Ok(loader)
    }
}

impl BatchLoader for InMemoryLoader {
    fn batches(&self, split: Split) -> Result<Vec<SampleBatch>> {
        Ok(self.splits.get(&split).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{SpecialTokens, WordTokenizer};

    fn tokenizer() -> WordTokenizer {
        WordTokenizer::from_reports(
            ["the lungs are clear.", "the heart is normal."],
            1,
            SpecialTokens::default(),
        )
    }

    #[test]
    fn test_from_reports_pads_and_masks() {
        let tok = tokenizer();
        let batch = SampleBatch::from_reports(
            vec!["a".into(), "b".into()],
            vec![vec![0.0; 3], vec![1.0; 3]],
            &["the lungs are clear.", "normal."],
            &tok,
            60,
            0,
        )
        .unwrap();

        assert_eq!(batch.seq_len(), 7);
        assert_eq!(batch.targets[1].len(), 7);
        assert_eq!(batch.masks[1], vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(batch.feature_dim(), 3);
    }

    #[test]
    fn test_from_reports_length_mismatch() {
        let tok = tokenizer();
        let result = SampleBatch::from_reports(
            vec!["a".into()],
            vec![],
            &["the lungs are clear."],
            &tok,
            60,
            0,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_reference_texts_skip_bos() {
        let tok = tokenizer();
        let batch = SampleBatch::from_reports(
            vec!["a".into()],
            vec![vec![0.0]],
            &["The lungs are clear."],
            &tok,
            60,
            0,
        )
        .unwrap();
        assert_eq!(batch.reference_texts(&tok), vec!["the lungs are clear ."]);
    }

    #[test]
    fn test_loader_chunks_records() {
        let tok = tokenizer();
        let records: Vec<(String, Vec<f32>, String)> = (0..5)
            .map(|i| (format!("s{i}"), vec![i as f32], "the heart is normal.".to_string()))
            .collect();

        let loader = InMemoryLoader::from_records(Split::Val, &records, &tok, 60, 2).unwrap();
        let batches = loader.batches(Split::Val).unwrap();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);
        assert!(loader.batches(Split::Train).unwrap().is_empty());
    }
}
