//! Polling schedule and monitor callbacks

use std::time::Duration;

use agentwire_core::InterruptInfo;

use crate::error::ExecutionError;
use crate::types::{ExecutionState, HilExecutionStatusData};

/// Configuration for status polling and caching
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between polls while the thread is active
    pub poll_interval: Duration,
    /// Delay between polls once the thread has been idle for a while
    pub idle_interval: Duration,
    /// Consecutive idle ticks before switching to `idle_interval`
    pub idle_threshold: u32,
    /// How long a fetched status is reused
    pub cache_ttl: Duration,
    /// Cache entries older than `cache_ttl * cache_sweep_factor` are swept
    pub cache_sweep_factor: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            idle_interval: Duration::from_secs(10),
            idle_threshold: 3,
            cache_ttl: Duration::from_secs(2),
            cache_sweep_factor: 5,
        }
    }
}

/// Receives monitor results for one thread
///
/// All methods default to no-ops.
pub trait MonitorCallbacks: Send + Sync {
    /// Every successful poll
    fn on_status_changed(&self, _status: &HilExecutionStatusData) {}

    /// Once per interrupt of an `interrupted` status; polling stops
    fn on_interrupt_detected(&self, _thread_id: &str, _interrupt: &InterruptInfo) {}

    /// The thread reached `completed`; polling stops
    fn on_completed(&self, _status: &HilExecutionStatusData) {}

    /// A poll failed; polling stops
    fn on_error(&self, _thread_id: &str, _error: &ExecutionError) {}
}

/// Why polling stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    Completed,
    Failed,
}

/// What to do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    /// Poll again after the delay
    Continue(Duration),
    Stop(StopReason),
}

/// Adaptive polling schedule for one thread
///
/// `running` keeps the base interval and resets the idle count; `ready` and
/// unknown states count as idle, and after `idle_threshold` consecutive idle
/// ticks the idle interval is used.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    base: Duration,
    idle: Duration,
    threshold: u32,
    idle_ticks: u32,
}

impl PollSchedule {
    pub fn new(base: Duration, idle: Duration, threshold: u32) -> Self {
        Self {
            base,
            idle,
            threshold,
            idle_ticks: 0,
        }
    }

    pub fn from_config(config: &MonitorConfig, poll_interval: Option<Duration>) -> Self {
        Self::new(
            poll_interval.unwrap_or(config.poll_interval),
            config.idle_interval,
            config.idle_threshold,
        )
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Decide what follows a poll that returned `state`
    pub fn next(&mut self, state: ExecutionState) -> PollDecision {
        match state {
            ExecutionState::Interrupted => PollDecision::Stop(StopReason::Interrupted),
            ExecutionState::Completed => PollDecision::Stop(StopReason::Completed),
            ExecutionState::Error => PollDecision::Stop(StopReason::Failed),
            ExecutionState::Running => {
                self.idle_ticks = 0;
                PollDecision::Continue(self.base)
            }
            ExecutionState::Ready | ExecutionState::Unknown => {
                self.idle_ticks = self.idle_ticks.saturating_add(1);
                if self.idle_ticks >= self.threshold {
                    PollDecision::Continue(self.idle)
                } else {
                    PollDecision::Continue(self.base)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> PollSchedule {
        PollSchedule::from_config(&MonitorConfig::default(), None)
    }

    #[test]
    fn test_idle_backoff_after_three_ready() {
        let mut s = schedule();
        let base = PollDecision::Continue(Duration::from_secs(3));
        let idle = PollDecision::Continue(Duration::from_secs(10));

        assert_eq!(s.next(ExecutionState::Ready), base);
        assert_eq!(s.next(ExecutionState::Ready), base);
        // The fourth poll follows the third idle tick.
        assert_eq!(s.next(ExecutionState::Ready), idle);
        assert_eq!(s.next(ExecutionState::Unknown), idle);

        assert_eq!(s.next(ExecutionState::Running), base);
        assert_eq!(s.idle_ticks(), 0);
        assert_eq!(s.next(ExecutionState::Ready), base);
    }

    #[test]
    fn test_terminal_states_stop() {
        let mut s = schedule();
        assert_eq!(
            s.next(ExecutionState::Interrupted),
            PollDecision::Stop(StopReason::Interrupted)
        );
        assert_eq!(
            s.next(ExecutionState::Completed),
            PollDecision::Stop(StopReason::Completed)
        );
        assert_eq!(
            s.next(ExecutionState::Error),
            PollDecision::Stop(StopReason::Failed)
        );
    }

    #[test]
    fn test_custom_base_interval() {
        let mut s = PollSchedule::from_config(
            &MonitorConfig::default(),
            Some(Duration::from_millis(500)),
        );
        assert_eq!(
            s.next(ExecutionState::Running),
            PollDecision::Continue(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.idle_interval, Duration::from_secs(10));
        assert_eq!(config.idle_threshold, 3);
        assert_eq!(config.cache_ttl, Duration::from_secs(2));
        assert_eq!(config.cache_sweep_factor, 5);
    }
}
