//! Learning rate schedulers

use super::Optimizer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Learning rate scheduler trait
pub trait LRScheduler {
    /// Current learning rate
    fn get_lr(&self) -> f32;

    /// Advance by one epoch or one batch, depending on the interval
    fn step(&mut self);

    /// Number of `step` calls so far
    fn current_step(&self) -> usize;

    /// Jump to an absolute position (used on resume)
    fn set_step(&mut self, step: usize);
}

/// Decay by `gamma` every `step_size` steps
///
/// Formula: lr_t = lr_initial * gamma^(floor(t / step_size))
#[derive(Debug, Clone)]
pub struct StepLR {
    lr_initial: f32,
    step_size: usize,
    gamma: f32,
    current_step: usize,
}

impl StepLR {
    pub fn new(lr_initial: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            lr_initial,
            step_size,
            gamma,
            current_step: 0,
        }
    }
}

impl LRScheduler for StepLR {
    fn get_lr(&self) -> f32 {
        if self.step_size == 0 {
            return self.lr_initial;
        }
        let decays = self.current_step / self.step_size;
        self.lr_initial * self.gamma.powi(decays as i32)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn current_step(&self) -> usize {
        self.current_step
    }

    fn set_step(&mut self, step: usize) {
        self.current_step = step;
    }
}

/// Decay by `gamma` every step
#[derive(Debug, Clone)]
pub struct ExponentialLR {
    lr_initial: f32,
    gamma: f32,
    current_step: usize,
}

impl ExponentialLR {
    pub fn new(lr_initial: f32, gamma: f32) -> Self {
        Self {
            lr_initial,
            gamma,
            current_step: 0,
        }
    }
}

impl LRScheduler for ExponentialLR {
    fn get_lr(&self) -> f32 {
        self.lr_initial * self.gamma.powi(self.current_step as i32)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn current_step(&self) -> usize {
        self.current_step
    }

    fn set_step(&mut self, step: usize) {
        self.current_step = step;
    }
}

/// Cosine annealing from `lr_max` to `lr_min` over `t_max` steps
///
/// Formula: lr_t = lr_min + 0.5 * (lr_max - lr_min) * (1 + cos(π * t / T))
#[derive(Debug, Clone)]
pub struct CosineAnnealingLR {
    lr_max: f32,
    lr_min: f32,
    t_max: usize,
    current_step: usize,
}

impl CosineAnnealingLR {
    pub fn new(lr_max: f32, t_max: usize, lr_min: f32) -> Self {
        Self {
            lr_max,
            lr_min,
            t_max,
            current_step: 0,
        }
    }
}

impl LRScheduler for CosineAnnealingLR {
    fn get_lr(&self) -> f32 {
        if self.current_step >= self.t_max {
            return self.lr_min;
        }

        let progress = self.current_step as f32 / self.t_max as f32;
        let cosine_decay = 0.5 * (1.0 + (PI * progress).cos());
        self.lr_min + (self.lr_max - self.lr_min) * cosine_decay
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn current_step(&self) -> usize {
        self.current_step
    }

    fn set_step(&mut self, step: usize) {
        self.current_step = step;
    }
}

/// When the schedule advances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleInterval {
    /// Once per completed epoch
    #[default]
    Epoch,
    /// Once per optimizer step
    Step,
}

/// Serializable scheduler position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub step: usize,
}

/// One schedule per optimizer parameter group, advanced together
///
/// Each group decays from its own base learning rate.
pub struct GroupScheduler {
    schedulers: Vec<Box<dyn LRScheduler>>,
    interval: ScheduleInterval,
}

impl GroupScheduler {
    pub fn new(schedulers: Vec<Box<dyn LRScheduler>>, interval: ScheduleInterval) -> Self {
        Self {
            schedulers,
            interval,
        }
    }

    pub fn interval(&self) -> ScheduleInterval {
        self.interval
    }

    /// Current learning rate of every group
    pub fn lrs(&self) -> Vec<f32> {
        self.schedulers.iter().map(|s| s.get_lr()).collect()
    }

    /// Push the current learning rates into the optimizer
    pub fn apply(&self, optimizer: &mut dyn Optimizer) {
        for (group, scheduler) in self.schedulers.iter().enumerate() {
            optimizer.set_group_lr(group, scheduler.get_lr());
        }
    }

    /// Advance every group and update the optimizer
    pub fn step(&mut self, optimizer: &mut dyn Optimizer) {
        for scheduler in &mut self.schedulers {
            scheduler.step();
        }
        self.apply(optimizer);
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            step: self.schedulers.first().map_or(0, |s| s.current_step()),
        }
    }

    pub fn load_state(&mut self, state: SchedulerState, optimizer: &mut dyn Optimizer) -> Result<()> {
        if self.schedulers.len() != optimizer.groups().len() {
            return Err(Error::CheckpointCorrupt(format!(
                "scheduler drives {} groups but optimizer has {}",
                self.schedulers.len(),
                optimizer.groups().len()
            )));
        }
        for scheduler in &mut self.schedulers {
            scheduler.set_step(state.step);
        }
        self.apply(optimizer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{Adam, ParamGroupBuilder};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_step_lr_decays_every_step_size() {
        let mut scheduler = StepLR::new(1e-4, 50, 0.1);
        for _ in 0..49 {
            scheduler.step();
        }
        assert_abs_diff_eq!(scheduler.get_lr(), 1e-4, epsilon = 1e-10);
        scheduler.step();
        assert_abs_diff_eq!(scheduler.get_lr(), 1e-5, epsilon = 1e-10);
    }

    #[test]
    fn test_exponential_lr() {
        let mut scheduler = ExponentialLR::new(1.0, 0.5);
        scheduler.step();
        scheduler.step();
        assert_abs_diff_eq!(scheduler.get_lr(), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_annealing_endpoints() {
        let mut scheduler = CosineAnnealingLR::new(1.0, 100, 0.1);
        assert_abs_diff_eq!(scheduler.get_lr(), 1.0, epsilon = 1e-6);
        scheduler.set_step(50);
        assert_abs_diff_eq!(scheduler.get_lr(), 0.55, epsilon = 1e-4);
        scheduler.set_step(150);
        assert_abs_diff_eq!(scheduler.get_lr(), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_annealing_decreases_monotonically() {
        let mut scheduler = CosineAnnealingLR::new(1.0, 100, 0.0);
        let mut prev_lr = scheduler.get_lr();

        for _ in 0..100 {
            scheduler.step();
            let current_lr = scheduler.get_lr();
            assert!(current_lr <= prev_lr);
            prev_lr = current_lr;
        }
    }

    fn two_group_setup() -> (Adam, GroupScheduler) {
        let names = vec!["visual_extractor.w".to_string(), "decoder.w".to_string()];
        let optimizer = Adam::default_params(ParamGroupBuilder::new(5e-5, 1e-4).build(&names));
        let scheduler = GroupScheduler::new(
            vec![
                Box::new(StepLR::new(5e-5, 2, 0.1)),
                Box::new(StepLR::new(1e-4, 2, 0.1)),
            ],
            ScheduleInterval::Epoch,
        );
        (optimizer, scheduler)
    }

    #[test]
    fn test_group_scheduler_keeps_ratio_between_groups() {
        let (mut optimizer, mut scheduler) = two_group_setup();
        scheduler.step(&mut optimizer);
        scheduler.step(&mut optimizer);

        let lrs: Vec<f32> = optimizer.groups().iter().map(|g| g.lr).collect();
        assert_abs_diff_eq!(lrs[0], 5e-6, epsilon = 1e-12);
        assert_abs_diff_eq!(lrs[1], 1e-5, epsilon = 1e-12);
    }

    #[test]
    fn test_group_scheduler_state_restores_position() {
        let (mut optimizer, mut scheduler) = two_group_setup();
        for _ in 0..3 {
            scheduler.step(&mut optimizer);
        }
        let saved = scheduler.state();

        let (mut fresh_opt, mut fresh) = two_group_setup();
        fresh.load_state(saved, &mut fresh_opt).unwrap();

        assert_eq!(fresh.state().step, 3);
        assert_eq!(fresh.lrs(), scheduler.lrs());
        assert_abs_diff_eq!(fresh_opt.lr(), optimizer.lr(), epsilon = 1e-12);
    }
}
