//! Best-model monitor and early stopping

use serde::{Deserialize, Serialize};

/// Direction in which the monitored metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    #[default]
    Max,
}

impl MonitorMode {
    fn comparator(self) -> fn(f64, f64) -> bool {
        match self {
            MonitorMode::Min => |value, best| value < best,
            MonitorMode::Max => |value, best| value > best,
        }
    }
}

impl std::fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorMode::Min => write!(f, "min"),
            MonitorMode::Max => write!(f, "max"),
        }
    }
}

/// Tracks the best value of one validation metric
///
/// Only strict improvement counts. `early_stop == 0` disables stopping.
#[derive(Debug, Clone)]
pub struct Monitor {
    metric: String,
    mode: MonitorMode,
    improves: fn(f64, f64) -> bool,
    early_stop: usize,
    best: Option<f64>,
    epochs_without_improvement: usize,
}

impl Monitor {
    pub fn new(metric: impl Into<String>, mode: MonitorMode, early_stop: usize) -> Self {
        Self {
            metric: metric.into(),
            mode,
            improves: mode.comparator(),
            early_stop,
            best: None,
            epochs_without_improvement: 0,
        }
    }

    /// Continue from a saved best value and counter
    pub fn restore(&mut self, best: Option<f64>, epochs_without_improvement: usize) {
        self.best = best;
        self.epochs_without_improvement = epochs_without_improvement;
    }

    /// Record this epoch's value; true if it is a new best
    pub fn check(&mut self, value: f64) -> bool {
        let improved = !value.is_nan() && self.best.map_or(true, |best| (self.improves)(value, best));
        if improved {
            self.best = Some(value);
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }
        improved
    }

    pub fn should_stop(&self) -> bool {
        self.early_stop > 0 && self.epochs_without_improvement >= self.early_stop
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn mode(&self) -> MonitorMode {
        self.mode
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}
