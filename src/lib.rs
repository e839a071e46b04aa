//! # Informe: training core for radiology report generation
//!
//! Trains and evaluates models that write free-text chest X-ray reports.
//! The model, data pipeline and image features are supplied by the caller;
//! this crate owns the loop around them.
//!
//! ## Architecture
//!
//! - **metrics**: BLEU-1..4, ROUGE-L and CIDEr with per-family failure tolerance
//! - **optim**: Two-group Adam/AdamW, learning-rate schedules, gradient clipping
//! - **decode**: Beam search, greedy and temperature sampling
//! - **train**: Epoch loop, best-model monitor, early stopping, checkpoints
//! - **config**: Declarative YAML run configuration and CLI
//! - **tokenizer**: Word-level report vocabulary
//! - **data**: Sample batches and the loader boundary
//! - **model**: Model boundary and a reference bigram model
//! - **tracking**: Per-epoch records
//! - **autograd**: Tape-based differentiation for the loss and parameters

pub mod autograd;
pub mod config;
pub mod data;
pub mod decode;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod tokenizer;
pub mod tracking;
pub mod train;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use error::{Error, Result};
