//! Epoch loop: train, validate, keep the best model, stop early

use super::checkpoint::{
    load_checkpoint, save_checkpoint, Checkpoint, BEST_CHECKPOINT, CURRENT_CHECKPOINT,
};
use super::loss::{LanguageModelLoss, LossFn};
use super::monitor::Monitor;
use crate::autograd::backward;
use crate::config::{build_lr_scheduler, build_optimizer, validate_config, RunConfig};
use crate::data::{BatchLoader, Split};
use crate::decode::{DecodeConfig, Decoder};
use crate::metrics::{Hypotheses, MetricReport, MetricScorer, References};
use crate::model::{forward, ForwardMode, ForwardOutput, ReportModel};
use crate::optim::{
    clip_grad_value, GroupScheduler, Optimizer, OptimizerState, ScheduleInterval, SchedulerState,
};
use crate::tokenizer::ReportTokenizer;
use crate::tracking::{EpochLog, JsonLinesSink, TrackingSink};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Why the epoch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EpochLimit,
    EarlyStopped,
    Cancelled,
}

/// Where the trainer is in its epoch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerPhase {
    Initializing,
    Training(usize),
    Validating(usize),
    CheckpointDecision(usize),
    Stopped(StopReason),
}

/// Snapshot of the resumable training state
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingState {
    /// Last completed epoch, 0 before the first
    pub epoch: usize,
    pub best: Option<f64>,
    pub epochs_without_improvement: usize,
    pub optimizer: OptimizerState,
    pub scheduler: SchedulerState,
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Last completed epoch
    pub final_epoch: usize,
    /// Mean training loss of the last epoch run
    pub final_loss: f32,
    /// Best monitored value
    pub best: Option<f64>,
    pub stop_reason: StopReason,
    pub stopped_early: bool,
    pub elapsed_secs: f64,
}

/// Drives training of a [`ReportModel`]
///
/// # Example
///
/// ```no_run
/// use informe::config::load_config;
/// use informe::data::InMemoryLoader;
/// use informe::model::BigramReportModel;
/// use informe::tokenizer::{ReportTokenizer, SpecialTokens, WordTokenizer};
/// use informe::train::Trainer;
/// use std::sync::Arc;
///
/// let config = Arc::new(load_config("configs/iu_xray.yaml")?);
/// let tokenizer = Arc::new(WordTokenizer::from_reports(
///     ["the lungs are clear."],
///     config.data.threshold,
///     SpecialTokens::default(),
/// ));
/// let model = BigramReportModel::new(16, tokenizer.vocab_size(), 0, 7);
///
/// let mut trainer = Trainer::new(config, Box::new(model), tokenizer)?;
/// let result = trainer.train(&InMemoryLoader::new())?;
/// println!("stopped after epoch {} ({:?})", result.final_epoch, result.stop_reason);
/// # Ok::<(), informe::Error>(())
/// ```
pub struct Trainer {
    config: Arc<RunConfig>,
    model: Box<dyn ReportModel>,
    tokenizer: Arc<dyn ReportTokenizer>,
    loss_fn: Box<dyn LossFn>,
    optimizer: Box<dyn Optimizer>,
    scheduler: GroupScheduler,
    decoder: Decoder,
    scorer: MetricScorer,
    sink: Box<dyn TrackingSink>,
    sink_failed: bool,
    monitor: Monitor,
    phase: TrainerPhase,
    /// Last completed epoch
    epoch: usize,
    best_record: Option<EpochLog>,
    cancel: Arc<AtomicBool>,
}

impl Trainer {
    /// Build the optimizer, schedule and decoder from `config`
    ///
    /// Resumes from `training.resume` when it is set.
    pub fn new(
        config: Arc<RunConfig>,
        model: Box<dyn ReportModel>,
        tokenizer: Arc<dyn ReportTokenizer>,
    ) -> Result<Self> {
        validate_config(&config).map_err(|e| Error::ConfigError(e.to_string()))?;

        if model.vocab_size() != tokenizer.vocab_size() {
            return Err(Error::ConfigError(format!(
                "model vocabulary ({}) differs from tokenizer vocabulary ({})",
                model.vocab_size(),
                tokenizer.vocab_size()
            )));
        }

        let optimizer = build_optimizer(&config, &model.parameter_names())?;
        let scheduler = build_lr_scheduler(&config, optimizer.as_ref())?;
        let decoder = Decoder::new(DecodeConfig::from_run_config(&config))?;
        let training = &config.training;
        let monitor = Monitor::new(
            training.monitor_metric.clone(),
            training.monitor_mode,
            training.early_stop,
        );
        let sink = JsonLinesSink::for_run(&training.record_dir, &config.dataset_name);

        let mut trainer = Self {
            config: Arc::clone(&config),
            model,
            tokenizer,
            loss_fn: Box::new(LanguageModelLoss),
            optimizer,
            scheduler,
            decoder,
            scorer: MetricScorer::new(),
            sink: Box::new(sink),
            sink_failed: false,
            monitor,
            phase: TrainerPhase::Initializing,
            epoch: 0,
            best_record: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };

        if let Some(path) = &config.training.resume {
            trainer.resume(path)?;
        }
        Ok(trainer)
    }

    pub fn with_loss(mut self, loss_fn: Box<dyn LossFn>) -> Self {
        self.loss_fn = loss_fn;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn TrackingSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the metric scorer; it must publish the monitored metric
    pub fn with_scorer(mut self, scorer: MetricScorer) -> Result<Self> {
        if !scorer.labels().iter().any(|l| *l == self.monitor.metric()) {
            return Err(Error::ConfigError(format!(
                "scorer does not produce monitored metric {}",
                self.monitor.metric()
            )));
        }
        self.scorer = scorer;
        Ok(self)
    }

    /// Flag checked after every epoch's checkpoint decision
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn phase(&self) -> TrainerPhase {
        self.phase
    }

    pub fn model(&self) -> &dyn ReportModel {
        self.model.as_ref()
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Record of the best epoch so far
    pub fn best_record(&self) -> Option<&EpochLog> {
        self.best_record.as_ref()
    }

    /// Current learning rate of each group
    pub fn lrs(&self) -> Vec<f32> {
        self.optimizer.groups().iter().map(|g| g.lr).collect()
    }

    pub fn state(&self) -> TrainingState {
        TrainingState {
            epoch: self.epoch,
            best: self.monitor.best(),
            epochs_without_improvement: self.monitor.epochs_without_improvement(),
            optimizer: self.optimizer.state(),
            scheduler: self.scheduler.state(),
        }
    }

    fn save_dir(&self) -> &Path {
        &self.config.training.save_dir
    }

    /// Restore everything from a checkpoint file
    ///
    /// Nothing is modified unless the whole checkpoint is compatible.
    pub fn resume(&mut self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "loading checkpoint");
        let checkpoint = load_checkpoint(path)?;

        checkpoint.check_compatible(self.model.as_ref())?;
        if checkpoint.monitor_metric != self.monitor.metric()
            || checkpoint.monitor_mode != self.monitor.mode()
        {
            return Err(Error::CheckpointCorrupt(format!(
                "checkpoint monitors {} ({}), run monitors {} ({})",
                checkpoint.monitor_metric,
                checkpoint.monitor_mode,
                self.monitor.metric(),
                self.monitor.mode()
            )));
        }

        self.optimizer.load_state(checkpoint.optimizer.clone())?;
        self.scheduler
            .load_state(checkpoint.scheduler, self.optimizer.as_mut())?;
        checkpoint.restore_params(self.model.as_mut())?;
        self.monitor
            .restore(checkpoint.best, checkpoint.epochs_without_improvement);
        self.epoch = checkpoint.epoch;
        self.best_record = checkpoint.best_record;

        tracing::info!(
            epoch = self.epoch,
            "checkpoint loaded, resuming from epoch {}",
            self.epoch + 1
        );
        Ok(())
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            epoch: self.epoch,
            monitor_metric: self.monitor.metric().to_string(),
            monitor_mode: self.monitor.mode(),
            best: self.monitor.best(),
            epochs_without_improvement: self.monitor.epochs_without_improvement(),
            vocab_size: self.model.vocab_size(),
            params: Checkpoint::capture_params(self.model.as_ref()),
            optimizer: self.optimizer.state(),
            scheduler: self.scheduler.state(),
            best_record: self.best_record.clone(),
        }
    }

    fn save(&self, file_name: &str) -> Result<PathBuf> {
        save_checkpoint(self.save_dir(), file_name, &self.checkpoint())
    }

    /// One pass over the training split; returns the mean loss
    pub fn train_epoch(&mut self, loader: &dyn BatchLoader) -> Result<f32> {
        let batches = loader.batches(Split::Train)?;
        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for (step, batch) in batches.iter().enumerate() {
            self.optimizer.zero_grad(self.model.parameters_mut());

            let ForwardOutput::Train(output) =
                forward(self.model.as_ref(), batch, ForwardMode::Train)?
            else {
                return Err(Error::InvalidParameter(
                    "model returned generations in training mode".to_string(),
                ));
            };
            let mut loss = self.loss_fn.compute_loss(&output, batch, &self.config)?;
            let loss_val = loss.item();
            backward(&mut loss, None);

            if let Some(clip) = self.config.training.grad_clip_value {
                clip_grad_value(self.model.parameters_mut(), clip);
            }
            self.optimizer.step(self.model.parameters_mut());
            if self.scheduler.interval() == ScheduleInterval::Step {
                self.scheduler.step(self.optimizer.as_mut());
            }

            total_loss += loss_val;
            num_batches += 1;
            tracing::debug!(step, loss = loss_val, "train step");
        }

        Ok(if num_batches > 0 {
            total_loss / num_batches as f32
        } else {
            0.0
        })
    }

    /// Decode a split and score it against its reports
    pub fn evaluate(&mut self, loader: &dyn BatchLoader, split: Split) -> Result<MetricReport> {
        let batches = loader.batches(split)?;
        let mut references = References::new();
        let mut hypotheses = Hypotheses::new();
        self.decoder.reseed();

        for batch in &batches {
            let ForwardOutput::Generate(generated) = forward(
                self.model.as_ref(),
                batch,
                ForwardMode::Generate(&mut self.decoder),
            )?
            else {
                return Err(Error::InvalidParameter(
                    "model returned training output in generation mode".to_string(),
                ));
            };

            let ground_truths = batch.reference_texts(self.tokenizer.as_ref());
            for ((id, hyps), truth) in batch.ids.iter().zip(generated).zip(ground_truths) {
                let text = hyps
                    .first()
                    .map(|h| self.tokenizer.decode(&h.tokens))
                    .unwrap_or_default();
                if references.insert(id.clone(), vec![truth]).is_some() {
                    tracing::warn!(%split, id = %id, "duplicate sample id, keeping the last");
                }
                hypotheses.insert(id.clone(), text);
            }
        }

        self.scorer.score(&references, &hypotheses)
    }

    fn record(&mut self, log: &EpochLog) {
        if let Err(e) = self.sink.log_epoch(log) {
            if !self.sink_failed {
                tracing::warn!(
                    sink = self.sink.name(),
                    error = %e,
                    "tracking sink failed, further failures will not be reported"
                );
                self.sink_failed = true;
            }
        }
    }

    /// Run epochs until the limit, early stopping or cancellation
    pub fn train(&mut self, loader: &dyn BatchLoader) -> Result<TrainResult> {
        let start_time = Instant::now();
        let max_epochs = self.config.training.epochs;
        let save_period = self.config.training.save_period;
        let has_test = !loader.batches(Split::Test)?.is_empty();
        let mut final_loss = 0.0;
        let mut stop_reason = StopReason::EpochLimit;

        tracing::info!(
            start_epoch = self.epoch + 1,
            max_epochs,
            monitor = self.monitor.metric(),
            mode = %self.monitor.mode(),
            "starting training"
        );

        for epoch in self.epoch + 1..=max_epochs {
            self.phase = TrainerPhase::Training(epoch);
            let lrs = self.lrs();
            let train_loss = self.train_epoch(loader)?;
            final_loss = train_loss;

            self.phase = TrainerPhase::Validating(epoch);
            let val = self.evaluate(loader, Split::Val)?;
            let test = if has_test {
                Some(self.evaluate(loader, Split::Test)?)
            } else {
                None
            };
            if self.scheduler.interval() == ScheduleInterval::Epoch {
                self.scheduler.step(self.optimizer.as_mut());
            }

            self.phase = TrainerPhase::CheckpointDecision(epoch);
            let value = val.get(self.monitor.metric()).ok_or_else(|| {
                Error::ConfigError(format!(
                    "validation report has no {}",
                    self.monitor.metric()
                ))
            })?;
            let is_best = self.monitor.check(value);
            self.epoch = epoch;

            let log = EpochLog {
                epoch,
                train_loss,
                lrs,
                val,
                test,
                is_best,
                timestamp: chrono::Utc::now(),
            };
            for (name, value) in log.flatten() {
                tracing::info!("{name:>15}: {value}");
            }

            if is_best {
                self.best_record = Some(log.clone());
                let path = self.save(BEST_CHECKPOINT)?;
                tracing::info!(path = %path.display(), "saving current best");
            } else {
                tracing::info!(
                    metric = self.monitor.metric(),
                    epochs = self.monitor.epochs_without_improvement(),
                    "validation performance did not improve"
                );
            }
            if epoch % save_period == 0 {
                let path = self.save(CURRENT_CHECKPOINT)?;
                tracing::debug!(path = %path.display(), "saved checkpoint");
            }
            self.record(&log);

            if self.monitor.should_stop() {
                tracing::info!(
                    early_stop = self.config.training.early_stop,
                    "validation performance did not improve, training stops"
                );
                stop_reason = StopReason::EarlyStopped;
                break;
            }
            if self.cancel.load(Ordering::SeqCst) {
                tracing::info!(epoch, "training cancelled");
                stop_reason = StopReason::Cancelled;
                break;
            }
        }

        self.phase = TrainerPhase::Stopped(stop_reason);
        if let Some(best) = &self.best_record {
            tracing::info!(epoch = best.epoch, "best validation results");
            for (name, value) in best.val.prefixed("val_") {
                tracing::info!("{name:>15}: {value}");
            }
        }

        Ok(TrainResult {
            final_epoch: self.epoch,
            final_loss,
            best: self.monitor.best(),
            stop_reason,
            stopped_early: stop_reason != StopReason::EpochLimit,
            elapsed_secs: start_time.elapsed().as_secs_f64(),
        })
    }
}
