//! Word-level report tokenizer
//!
//! Reports are lower-cased, stripped of punctuation and split into
//! sentences; sentence ends become a `.` token. Tokens seen fewer than
//! `threshold` times map to `<unk>`. Ids up to the largest special id
//! (BOS/EOS/PAD, all `0` by default) are reserved.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Token id type
pub type TokenId = usize;

pub const UNK_TOKEN: &str = "<unk>";

/// Reserved token ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub bos: TokenId,
    pub eos: TokenId,
    pub pad: TokenId,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos: 0,
            eos: 0,
            pad: 0,
        }
    }
}

impl SpecialTokens {
    fn reserved(&self) -> TokenId {
        self.bos.max(self.eos).max(self.pad) + 1
    }
}

/// Tokenizer used by the training loop
pub trait ReportTokenizer: Send + Sync {
    /// Ids with BOS and EOS, truncated to `max_len` ids
    fn encode(&self, report: &str, max_len: usize) -> Vec<TokenId>;

    /// Text up to the first EOS/PAD
    fn decode(&self, ids: &[TokenId]) -> String;

    /// Total number of ids, reserved ones included
    fn vocab_size(&self) -> usize;

    fn special(&self) -> SpecialTokens;
}

/// Normalise a free-text report into space separated tokens
///
/// # Example
///
/// ```
/// use informe::tokenizer::clean_report;
///
/// assert_eq!(
///     clean_report("The lungs are clear. No effusion!"),
///     "the lungs are clear . no effusion ."
/// );
/// ```
pub fn clean_report(report: &str) -> String {
    let sentences: Vec<String> = report
        .split('.')
        .map(|sentence| {
            let kept: String = sentence
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            kept.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        String::new()
    } else {
        format!("{} .", sentences.join(" . "))
    }
}

/// Frequency-thresholded word vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordTokenizer {
    token_to_id: HashMap<String, TokenId>,
    id_to_token: BTreeMap<TokenId, String>,
    special: SpecialTokens,
}

impl WordTokenizer {
    /// Build a vocabulary from training reports
    pub fn from_reports<'a>(
        reports: impl IntoIterator<Item = &'a str>,
        threshold: usize,
        special: SpecialTokens,
    ) -> Self {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for report in reports {
            for token in clean_report(report).split_whitespace() {
                *counts.entry(token.to_string()).or_insert(0) += 1;
            }
        }

        let mut vocab: Vec<String> = counts
            .into_iter()
            .filter(|(_, c)| *c >= threshold)
            .map(|(t, _)| t)
            .collect();
        vocab.push(UNK_TOKEN.to_string());
        vocab.sort();

        let offset = special.reserved();
        let token_to_id: HashMap<String, TokenId> = vocab
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i + offset))
            .collect();
        let id_to_token = token_to_id.iter().map(|(t, &i)| (i, t.clone())).collect();

        Self {
            token_to_id,
            id_to_token,
            special,
        }
    }

    pub fn token_to_id(&self, token: &str) -> Option<TokenId> {
        self.token_to_id.get(token).copied()
    }

    pub fn id_to_token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    fn unk(&self) -> Result<TokenId> {
        self.token_to_id(UNK_TOKEN)
            .ok_or_else(|| Error::InvalidParameter("vocabulary has no <unk> token".to_string()))
    }

    /// Save the vocabulary as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))
    }

    /// Load a vocabulary saved with [`WordTokenizer::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        let tokenizer: Self = serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("JSON deserialization failed: {e}")))?;
        tokenizer.unk()?;
        Ok(tokenizer)
    }
}

impl ReportTokenizer for WordTokenizer {
    fn encode(&self, report: &str, max_len: usize) -> Vec<TokenId> {
        let unk = self.token_to_id(UNK_TOKEN).unwrap_or(self.special.reserved());
        let mut ids = vec![self.special.bos];
        ids.extend(
            clean_report(report)
                .split_whitespace()
                .map(|t| self.token_to_id(t).unwrap_or(unk)),
        );
        ids.push(self.special.eos);
        ids.truncate(max_len.max(2));
        ids
    }

    fn decode(&self, ids: &[TokenId]) -> String {
        let mut words = Vec::new();
        for (i, &id) in ids.iter().enumerate() {
            if i == 0 && id == self.special.bos && id != self.special.eos {
                continue;
            }
            if id == self.special.eos || id == self.special.pad {
                break;
            }
            words.push(self.id_to_token(id).unwrap_or(UNK_TOKEN));
        }
        words.join(" ")
    }

    fn vocab_size(&self) -> usize {
        self.special.reserved() + self.token_to_id.len()
    }

    fn special(&self) -> SpecialTokens {
        self.special
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> WordTokenizer {
        WordTokenizer::from_reports(
            [
                "The lungs are clear.",
                "The heart is normal. The lungs are clear.",
                "No effusion. Lungs are clear.",
            ],
            2,
            SpecialTokens::default(),
        )
    }

    #[test]
    fn test_clean_report_strips_punctuation() {
        assert_eq!(clean_report("Heart: normal, (stable)."), "heart normal stable .");
        assert_eq!(clean_report("   "), "");
    }

    #[test]
    fn test_vocabulary_respects_threshold() {
        let tok = tokenizer();
        assert!(tok.token_to_id("lungs").is_some());
        assert!(tok.token_to_id("the").is_some());
        assert!(tok.token_to_id("effusion").is_none());
        assert!(tok.token_to_id(UNK_TOKEN).is_some());
    }

    #[test]
    fn test_ids_start_after_reserved() {
        let tok = tokenizer();
        assert!(tok.id_to_token(0).is_none());
        assert!(tok.token_to_id.values().all(|&id| id >= 1));
        assert_eq!(tok.vocab_size(), tok.token_to_id.len() + 1);
    }

    #[test]
    fn test_encode_wraps_with_bos_eos() {
        let tok = tokenizer();
        let ids = tok.encode("Lungs are clear.", 60);
        assert_eq!(ids.first(), Some(&0));
        assert_eq!(ids.last(), Some(&0));
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_encode_truncates() {
        let tok = tokenizer();
        let ids = tok.encode("the lungs are clear . the lungs are clear .", 4);
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = tokenizer();
        let ids = tok.encode("pneumothorax", 10);
        assert_eq!(ids[1], tok.token_to_id(UNK_TOKEN).unwrap());
    }

    #[test]
    fn test_decode_stops_at_eos() {
        let tok = tokenizer();
        let ids = tok.encode("The lungs are clear.", 60);
        assert_eq!(tok.decode(&ids[1..]), "the lungs are clear .");
        let mut padded = ids[1..].to_vec();
        padded.extend([0, 0, 0]);
        assert_eq!(tok.decode(&padded), "the lungs are clear .");
    }

    #[test]
    fn test_json_roundtrip() {
        let tok = tokenizer();
        let restored = WordTokenizer::from_json(&tok.to_json().unwrap()).unwrap();
        assert_eq!(restored.vocab_size(), tok.vocab_size());
        assert_eq!(restored.token_to_id("lungs"), tok.token_to_id("lungs"));
    }
}
