//! Stage timing with tracing output

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Duration of one named stage, as stored in reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub seconds: f64,
}

/// Wall-clock timer for a named stage
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    checkpoints: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    /// Record the time elapsed so far under `name`
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        let name = name.into();
        let at = self.start.elapsed();
        debug!(timer = %self.name, checkpoint = %name, seconds = at.as_secs_f64(), "checkpoint");
        self.checkpoints.push((name, at));
    }

    /// Stop and log the timer
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!("{} completed in {:.3}s", self.name, elapsed.as_secs_f64());
        elapsed
    }

    /// Stop and return the time spent between consecutive checkpoints
    pub fn stop_with_report(self) -> Vec<StageTiming> {
        let elapsed = self.start.elapsed();
        let mut prev = Duration::ZERO;
        let mut stages = Vec::with_capacity(self.checkpoints.len());
        for (name, at) in &self.checkpoints {
            let delta = at.saturating_sub(prev);
            info!("  {}: {:.3}s (+{:.3}s)", name, at.as_secs_f64(), delta.as_secs_f64());
            stages.push(StageTiming { stage: name.clone(), seconds: delta.as_secs_f64() });
            prev = *at;
        }
        info!("{} completed in {:.3}s", self.name, elapsed.as_secs_f64());
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timer() {
        let timer = Timer::start("test");
        sleep(Duration::from_millis(10));
        let elapsed = timer.stop();
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_timer_report_has_one_entry_per_checkpoint() {
        let mut timer = Timer::start("test");
        sleep(Duration::from_millis(5));
        timer.checkpoint("load");
        sleep(Duration::from_millis(5));
        timer.checkpoint("split");

        let stages = timer.stop_with_report();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1].stage, "split");
        assert!(stages.iter().all(|s| s.seconds >= 0.004));
    }
}
