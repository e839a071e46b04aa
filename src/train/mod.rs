//! Training orchestration
//!
//! [`Trainer`] runs the epoch state machine
//! `Initializing -> Training -> Validating -> CheckpointDecision`, repeating
//! until the epoch limit, early stopping or cancellation:
//!
//! - training steps: zero grad, forward, [`LossFn`], backward, optional
//!   gradient value clipping, optimizer step
//! - validation (and optional test) decoding scored by the metric scorer
//! - the [`Monitor`] decides whether the epoch is the new best
//! - `model_best.json` on improvement, `current_checkpoint.json` every
//!   `save_period` epochs

mod checkpoint;
mod loss;
mod monitor;
mod trainer;

pub use checkpoint::{
    atomic_write, load_checkpoint, save_checkpoint, Checkpoint, NamedParameter, BEST_CHECKPOINT,
    CURRENT_CHECKPOINT,
};
pub use loss::{LanguageModelLoss, LossFn};
pub use monitor::{Monitor, MonitorMode};
pub use trainer::{StopReason, TrainResult, Trainer, TrainerPhase, TrainingState};
