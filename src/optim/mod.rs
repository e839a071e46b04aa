//! Optimizers and learning-rate schedules
//!
//! The report generator trains two parameter groups: the visual backbone
//! (`lr_ve`) and everything else (`lr_ed`). [`ParamGroupBuilder`] performs
//! the split, [`Adam`] updates both groups and [`GroupScheduler`] decays each
//! group from its own base rate.

mod adam;
mod clip;
mod optimizer;
mod scheduler;

pub use adam::{Adam, WeightDecay};
pub use clip::clip_grad_value;
pub use optimizer::{
    Optimizer, OptimizerState, ParamGroup, ParamGroupBuilder, ENCODER_DECODER_GROUP,
    VISUAL_EXTRACTOR_GROUP, VISUAL_EXTRACTOR_PREFIX,
};
pub use scheduler::{
    CosineAnnealingLR, ExponentialLR, GroupScheduler, LRScheduler, ScheduleInterval,
    SchedulerState, StepLR,
};
