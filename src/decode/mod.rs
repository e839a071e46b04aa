//! Report decoding
//!
//! Turns next-token distributions into finished token sequences. Beam search
//! is the evaluation default; greedy and temperature sampling share the same
//! repetition constraints.
//!
//! # Example
//!
//! ```
//! use informe::decode::{DecodeConfig, Decoder};
//! use informe::model::BigramReportModel;
//!
//! let model = BigramReportModel::new(2, 6, 0, 42);
//! let mut decoder = Decoder::new(DecodeConfig::default()).unwrap();
//! let hyps = decoder.generate(&model, &[0.5, -0.5]).unwrap();
//! assert!(hyps[0].tokens.len() <= 60);
//! ```

mod beam;
mod sample;

use crate::config::{RunConfig, SampleMethod};
use crate::data::SampleBatch;
use crate::model::ReportModel;
use crate::tokenizer::TokenId;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Decoding settings resolved from the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    pub method: SampleMethod,
    pub beam_size: usize,
    pub sample_n: usize,
    /// Upper bound on generated tokens, EOS excluded
    pub max_seq_length: usize,
    pub temperature: f32,
    pub decoding_constraint: bool,
    pub block_trigrams: bool,
    pub length_normalize: bool,
    pub bos: TokenId,
    pub eos: TokenId,
    pub pad: TokenId,
    pub seed: u64,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            method: SampleMethod::BeamSearch,
            beam_size: 3,
            sample_n: 1,
            max_seq_length: 60,
            temperature: 1.0,
            decoding_constraint: false,
            block_trigrams: true,
            length_normalize: false,
            bos: 0,
            eos: 0,
            pad: 0,
            seed: 123,
        }
    }
}

impl DecodeConfig {
    pub fn from_run_config(config: &RunConfig) -> Self {
        let decoding = &config.decoding;
        Self {
            method: decoding.sample_method,
            beam_size: decoding.beam_size,
            sample_n: decoding.sample_n,
            max_seq_length: config.data.max_seq_length,
            temperature: decoding.temperature,
            decoding_constraint: decoding.decoding_constraint,
            block_trigrams: decoding.block_trigrams,
            length_normalize: decoding.length_normalize,
            bos: config.model.bos_idx,
            eos: config.model.eos_idx,
            pad: config.model.pad_idx,
            seed: config.training.seed,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.beam_size == 0 {
            return Err(Error::InvalidParameter("beam_size must be > 0".to_string()));
        }
        if self.sample_n == 0 {
            return Err(Error::InvalidParameter("sample_n must be > 0".to_string()));
        }
        if self.method == SampleMethod::BeamSearch && self.sample_n > self.beam_size {
            return Err(Error::InvalidParameter(format!(
                "sample_n ({}) exceeds beam_size ({})",
                self.sample_n, self.beam_size
            )));
        }
        if self.max_seq_length == 0 {
            return Err(Error::InvalidParameter(
                "max_seq_length must be > 0".to_string(),
            ));
        }
        if self.temperature <= 0.0 || self.temperature.is_nan() {
            return Err(Error::InvalidParameter(format!(
                "temperature must be > 0.0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }

    /// Whether `token` may follow `tokens`
    ///
    /// EOS is always allowed. BOS and PAD are never generated unless they
    /// double as EOS.
    fn allows(&self, tokens: &[TokenId], token: TokenId) -> bool {
        if token == self.eos {
            return true;
        }
        if token == self.bos || token == self.pad {
            return false;
        }
        if self.decoding_constraint && tokens.last() == Some(&token) {
            return false;
        }
        if self.block_trigrams && completes_seen_trigram(tokens, token) {
            return false;
        }
        true
    }
}

/// True when `(tokens[n-2], tokens[n-1], token)` already occurs in `tokens`
pub(crate) fn completes_seen_trigram(tokens: &[TokenId], token: TokenId) -> bool {
    let n = tokens.len();
    if n < 2 {
        return false;
    }
    let candidate = [tokens[n - 2], tokens[n - 1], token];
    tokens.windows(3).any(|w| w == candidate)
}

pub(crate) fn normalised(log_prob: f32, len: usize, length_normalize: bool) -> f32 {
    if length_normalize {
        log_prob / (len + 1) as f32
    } else {
        log_prob
    }
}

/// A partial or finished decoded sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamHypothesis {
    /// Generated tokens, EOS excluded
    pub tokens: Vec<TokenId>,
    /// Cumulative log-probability
    pub log_prob: f32,
    pub finished: bool,
}

impl BeamHypothesis {
    fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            log_prob: 0.0,
            finished: false,
        }
    }

    /// Ranking score: raw, or per step with the terminating step counted
    pub fn score(&self, length_normalize: bool) -> f32 {
        normalised(self.log_prob, self.tokens.len(), length_normalize)
    }
}

/// Stateful decoder; the sampling RNG lives here
pub struct Decoder {
    config: DecodeConfig,
    rng: StdRng,
}

impl Decoder {
    pub fn new(config: DecodeConfig) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Reset the sampling RNG to its seed
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.config.seed);
    }

    /// Decode one sample: `sample_n` finished hypotheses, best first
    pub fn generate(
        &mut self,
        model: &dyn ReportModel,
        features: &[f32],
    ) -> Result<Vec<BeamHypothesis>> {
        match self.config.method {
            SampleMethod::BeamSearch => beam::search(&self.config, model, features),
            SampleMethod::Greedy => (0..self.config.sample_n)
                .map(|_| sample::greedy(&self.config, model, features))
                .collect(),
            SampleMethod::Sample => (0..self.config.sample_n)
                .map(|_| sample::draw(&self.config, model, features, &mut self.rng))
                .collect(),
        }
    }

    /// Decode every sample of a batch
    pub fn decode_batch(
        &mut self,
        model: &dyn ReportModel,
        batch: &SampleBatch,
    ) -> Result<Vec<Vec<BeamHypothesis>>> {
        batch
            .features
            .iter()
            .map(|features| self.generate(model, features))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigram_detection() {
        assert!(completes_seen_trigram(&[1, 2, 3, 1, 2], 3));
        assert!(!completes_seen_trigram(&[1, 2, 3, 1, 2], 4));
        assert!(!completes_seen_trigram(&[1], 1));
    }

    #[test]
    fn test_allows_respects_constraints() {
        let config = DecodeConfig {
            decoding_constraint: true,
            bos: 1,
            eos: 0,
            pad: 0,
            ..DecodeConfig::default()
        };
        assert!(config.allows(&[2, 3], 0));
        assert!(!config.allows(&[2, 3], 3));
        assert!(!config.allows(&[2], 1));
        assert!(!config.allows(&[2, 3, 4, 2, 3], 4));
        assert!(config.allows(&[2, 3, 4, 2, 3], 5));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let too_many = DecodeConfig {
            sample_n: 4,
            ..DecodeConfig::default()
        };
        assert!(Decoder::new(too_many).is_err());

        let cold = DecodeConfig {
            temperature: 0.0,
            ..DecodeConfig::default()
        };
        assert!(Decoder::new(cold).is_err());
    }

    #[test]
    fn test_length_normalised_score() {
        let hyp = BeamHypothesis {
            tokens: vec![1, 2, 3],
            log_prob: -4.0,
            finished: true,
        };
        assert_eq!(hyp.score(false), -4.0);
        assert_eq!(hyp.score(true), -1.0);
    }

    #[test]
    fn test_from_run_config() {
        let config: RunConfig = serde_yaml::from_str(
            r#"
data:
  image_dir: images
  ann_path: annotation.json
  max_seq_length: 40
decoding:
  beam_size: 5
  sample_n: 2
"#,
        )
        .unwrap();
        let decode = DecodeConfig::from_run_config(&config);
        assert_eq!(decode.beam_size, 5);
        assert_eq!(decode.sample_n, 2);
        assert_eq!(decode.max_seq_length, 40);
        assert_eq!(decode.seed, 123);
    }
}
