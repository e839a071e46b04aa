//! Optimizer trait and parameter groups

use crate::{Error, Result, Tensor};
use serde::{Deserialize, Serialize};

/// Parameters sharing one learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGroup {
    pub name: String,
    pub lr: f32,
    /// Indices into the parameter slice passed to `step`
    pub params: Vec<usize>,
}

/// Prefix selecting the visual backbone's parameters
pub const VISUAL_EXTRACTOR_PREFIX: &str = "visual_extractor";

/// Group holding the visual backbone (`lr_ve`)
pub const VISUAL_EXTRACTOR_GROUP: &str = "visual_extractor";

/// Group holding every other parameter (`lr_ed`)
pub const ENCODER_DECODER_GROUP: &str = "encoder_decoder";

/// Partitions named parameters into the two learning-rate groups
///
/// # Example
///
/// ```
/// use informe::optim::ParamGroupBuilder;
///
/// let names = vec![
///     "visual_extractor.conv".to_string(),
///     "decoder.embed".to_string(),
/// ];
/// let groups = ParamGroupBuilder::new(5e-5, 1e-4).build(&names);
/// assert_eq!(groups[0].params, vec![0]);
/// assert_eq!(groups[1].params, vec![1]);
/// ```
pub struct ParamGroupBuilder {
    lr_ve: f32,
    lr_ed: f32,
    is_visual: Box<dyn Fn(&str) -> bool>,
}

impl ParamGroupBuilder {
    pub fn new(lr_ve: f32, lr_ed: f32) -> Self {
        Self {
            lr_ve,
            lr_ed,
            is_visual: Box::new(|name| name.starts_with(VISUAL_EXTRACTOR_PREFIX)),
        }
    }

    /// Replace the predicate deciding membership of the visual group
    pub fn with_predicate(mut self, predicate: impl Fn(&str) -> bool + 'static) -> Self {
        self.is_visual = Box::new(predicate);
        self
    }

    /// Always returns `[visual_extractor, encoder_decoder]`, possibly empty
    pub fn build(&self, names: &[String]) -> Vec<ParamGroup> {
        let (visual, rest): (Vec<usize>, Vec<usize>) =
            (0..names.len()).partition(|&i| (self.is_visual)(&names[i]));

        vec![
            ParamGroup {
                name: VISUAL_EXTRACTOR_GROUP.to_string(),
                lr: self.lr_ve,
                params: visual,
            },
            ParamGroup {
                name: ENCODER_DECODER_GROUP.to_string(),
                lr: self.lr_ed,
                params: rest,
            },
        ]
    }
}

/// Serializable optimizer state for checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    pub kind: String,
    pub step: u64,
    pub groups: Vec<ParamGroup>,
    /// Per-parameter buffers by name (e.g. `exp_avg`), `None` until first update
    pub buffers: Vec<(String, Vec<Option<Vec<f32>>>)>,
}

/// Trait for optimization algorithms over parameter groups
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    fn groups(&self) -> &[ParamGroup];

    fn set_group_lr(&mut self, group: usize, lr: f32);

    /// Learning rate of the first group
    fn lr(&self) -> f32 {
        self.groups().first().map(|g| g.lr).unwrap_or(0.0)
    }

    fn state(&self) -> OptimizerState;

    /// Restore buffers and step count
    ///
    /// The group layout must match; learning rates are taken from the state.
    fn load_state(&mut self, state: OptimizerState) -> Result<()>;
}

/// Check that a saved group layout matches the live one
pub(crate) fn check_layout(live: &[ParamGroup], saved: &[ParamGroup]) -> Result<()> {
    let same = live.len() == saved.len()
        && live
            .iter()
            .zip(saved)
            .all(|(a, b)| a.name == b.name && a.params == b.params);
    if same {
        Ok(())
    } else {
        Err(Error::CheckpointCorrupt(
            "optimizer parameter groups do not match the model".to_string(),
        ))
    }
}
