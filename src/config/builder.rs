//! Build training components from configuration

use super::schema::RunConfig;
use crate::error::{Error, Result};
use crate::optim::{
    Adam, CosineAnnealingLR, ExponentialLR, GroupScheduler, LRScheduler, Optimizer,
    ParamGroupBuilder, StepLR, WeightDecay,
};

/// Build the two-group optimizer for the named parameters
///
/// Parameters whose name starts with `visual_extractor` train at `lr_ve`,
/// the rest at `lr_ed`.
pub fn build_optimizer(config: &RunConfig, param_names: &[String]) -> Result<Box<dyn Optimizer>> {
    let opt = &config.optimizer;
    let groups = ParamGroupBuilder::new(opt.lr_ve, opt.lr_ed).build(param_names);

    let decay_mode = match opt.name.to_lowercase().as_str() {
        "adam" => WeightDecay::L2,
        "adamw" => WeightDecay::Decoupled,
        name => {
            return Err(Error::ConfigError(format!(
                "Unknown optimizer: {}. Supported: Adam, AdamW",
                name
            )))
        }
    };

    Ok(Box::new(
        Adam::default_params(groups)
            .with_weight_decay(opt.weight_decay, decay_mode)
            .with_amsgrad(opt.amsgrad),
    ))
}

/// Build a schedule for every optimizer group, starting from the group's rate
pub fn build_lr_scheduler(config: &RunConfig, optimizer: &dyn Optimizer) -> Result<GroupScheduler> {
    let sched = &config.scheduler;
    let name = sched.name.to_lowercase();

    let schedulers = optimizer
        .groups()
        .iter()
        .map(|group| -> Result<Box<dyn LRScheduler>> {
            match name.as_str() {
                "steplr" => Ok(Box::new(StepLR::new(group.lr, sched.step_size, sched.gamma))),
                "exponentiallr" => Ok(Box::new(ExponentialLR::new(group.lr, sched.gamma))),
                "cosineannealinglr" => {
                    Ok(Box::new(CosineAnnealingLR::new(group.lr, sched.step_size, 0.0)))
                }
                _ => Err(Error::ConfigError(format!(
                    "Unknown lr scheduler: {}. Supported: StepLR, ExponentialLR, CosineAnnealingLR",
                    sched.name
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(GroupScheduler::new(schedulers, sched.interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{ENCODER_DECODER_GROUP, VISUAL_EXTRACTOR_GROUP};

    fn config() -> RunConfig {
        serde_yaml::from_str(
            r#"
data:
  image_dir: images
  ann_path: annotation.json
"#,
        )
        .unwrap()
    }

    fn names() -> Vec<String> {
        vec![
            "visual_extractor.proj".to_string(),
            "encoder_decoder.embed".to_string(),
        ]
    }

    #[test]
    fn test_build_optimizer_two_groups() {
        let optimizer = build_optimizer(&config(), &names()).unwrap();
        let groups = optimizer.groups();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, VISUAL_EXTRACTOR_GROUP);
        assert_eq!(groups[0].lr, 5e-5);
        assert_eq!(groups[1].name, ENCODER_DECODER_GROUP);
        assert_eq!(groups[1].lr, 1e-4);
    }

    #[test]
    fn test_build_optimizer_adamw() {
        let mut config = config();
        config.optimizer.name = "AdamW".to_string();
        let optimizer = build_optimizer(&config, &names()).unwrap();
        assert_eq!(optimizer.state().kind, "adamw");
    }

    #[test]
    fn test_build_optimizer_unknown() {
        let mut config = config();
        config.optimizer.name = "lion".to_string();
        let result = build_optimizer(&config, &names());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_build_step_lr_for_both_groups() {
        let config = config();
        let mut optimizer = build_optimizer(&config, &names()).unwrap();
        let mut scheduler = build_lr_scheduler(&config, optimizer.as_ref()).unwrap();

        for _ in 0..50 {
            scheduler.step(optimizer.as_mut());
        }

        let lrs = scheduler.lrs();
        approx::assert_abs_diff_eq!(lrs[0], 5e-6, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(lrs[1], 1e-5, epsilon = 1e-12);
    }

    #[test]
    fn test_build_unknown_scheduler() {
        let mut config = config();
        config.scheduler.name = "Plateau".to_string();
        let optimizer = build_optimizer(&config, &names()).unwrap();
        assert!(matches!(
            build_lr_scheduler(&config, optimizer.as_ref()),
            Err(Error::ConfigError(_))
        ));
    }
}
