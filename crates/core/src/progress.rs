use std::time::Duration;

use tokio::time::Instant;

use crate::types::{ProgressEvent, Stage};

/// Cadence of the local animation tick.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Continuous time in `analyzing` before the overload advisory fires.
pub const STALL_THRESHOLD: Duration = Duration::from_secs(20);

const EASE_FACTOR: f64 = 0.08;
const MIN_STEP: f64 = 0.5;
const CREEP_STEP: f64 = 0.15;
const CATCHUP_SLACK: f64 = 0.5;
const FETCHING_CEILING: f64 = 48.0;
const ANALYZING_CEILING: f64 = 98.0;

/// Non-fatal, informational signal surfaced next to the progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// Analysis has been running long enough that the backend is probably
    /// under load; the request itself keeps going.
    Overloaded,
}

/// Maps sparse, unevenly-timed server progress events plus a fixed local
/// tick onto a monotonically non-decreasing display percentage.
///
/// Server events move a `target`; `tick` eases the displayed value toward
/// it (fast-then-slow) and, once caught up, creeps toward a stage ceiling
/// so the bar keeps signalling "still working" without claiming completion.
#[derive(Debug)]
pub struct ProgressEstimator {
    display: f64,
    target: f64,
    stage: Stage,
    analyzing_since: Option<Instant>,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self {
            display: 1.0,
            target: 1.0,
            stage: Stage::Fetching,
            analyzing_since: None,
        }
    }

    pub fn display_percent(&self) -> f64 {
        self.display
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fold a server progress event into the target percentage. The fetch
    /// phase owns the display range [1, 50] and the analyze phase [51, 100];
    /// the target never moves backwards.
    pub fn observe(&mut self, event: &ProgressEvent) {
        if event.stage != self.stage {
            self.analyzing_since = match event.stage {
                Stage::Analyzing => Some(Instant::now()),
                _ => None,
            };
            self.stage = event.stage;
        }

        let raw = if event.total > 0.0 {
            (event.current / event.total) * 100.0
        } else {
            0.0
        };

        let target = match self.stage {
            Stage::Complete => 100.0,
            _ if event.total <= 0.0 => raw.max(1.0),
            Stage::Fetching => 1.0 + (raw.clamp(0.0, 50.0) / 50.0) * 49.0,
            Stage::Analyzing => 51.0 + ((raw - 50.0).max(0.0) / 50.0) * 49.0,
            Stage::Idle | Stage::Error => self.target,
        };

        self.target = self.target.max(target).min(100.0);
    }

    /// One animation step. Behind the target: advance fast-then-slow.
    /// Caught up: creep toward the stage ceiling while waiting for the next
    /// server event. Returns the new display percentage.
    pub fn tick(&mut self) -> f64 {
        let ceiling = match self.stage {
            Stage::Analyzing => ANALYZING_CEILING,
            Stage::Complete => 100.0,
            _ => FETCHING_CEILING,
        };

        if self.display < self.target - CATCHUP_SLACK {
            let step = ((self.target - self.display) * EASE_FACTOR).max(MIN_STEP);
            self.display = (self.display + step).min(self.target);
        } else if self.display < ceiling {
            self.display = (self.display + CREEP_STEP).min(ceiling);
        }

        self.display = self.display.min(100.0);
        self.display
    }

    /// Jump straight to done, bypassing the animation.
    pub fn complete(&mut self) {
        self.stage = Stage::Complete;
        self.target = 100.0;
        self.display = 100.0;
        self.analyzing_since = None;
    }

    pub fn advisory(&self) -> Option<Advisory> {
        match self.analyzing_since {
            Some(entered)
                if self.stage == Stage::Analyzing && entered.elapsed() >= STALL_THRESHOLD =>
            {
                Some(Advisory::Overloaded)
            }
            _ => None,
        }
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}
