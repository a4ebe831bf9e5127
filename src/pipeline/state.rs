//! Trigger/clear state machine governing recording sessions.
//!
//! Blob activity drives CLEARED -> TRIGGERED -> WAIT_CLEAR; the transition
//! back to CLEARED has hysteresis: the active-percent moving average must
//! fall below the clear threshold *and* a wall-clock cool-down must elapse.

use std::time::{Duration, Instant};

use crate::analysis::{BlobObserver, ImvObserver, MovingAverage};

/// Samples in the active-percent moving average.
const MOTION_AVERAGE_WINDOW: usize = 32;

/// Minimum gap between active-percent log lines.
const AVERAGE_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Cleared,
    Triggered,
    WaitClear,
}

/// Owns the recording trigger state. Driven exclusively from the analysis
/// thread through the observer callbacks.
pub struct MotionStateMachine {
    state: MotionState,
    active_average: MovingAverage,
    clear_percent: u32,
    clear_wait_period: Duration,
    wait_clear_since: Option<Instant>,
    last_average_log: Option<Instant>,
}

impl MotionStateMachine {
    pub fn new(clear_percent: u32, clear_wait_period: Duration) -> Self {
        Self {
            state: MotionState::Cleared,
            active_average: MovingAverage::new(MOTION_AVERAGE_WINDOW),
            clear_percent,
            clear_wait_period,
            wait_clear_since: None,
            last_average_log: None,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }
}

impl BlobObserver for MotionStateMachine {
    fn on_motion_triggered(&mut self, active_count: usize) {
        match self.state {
            MotionState::Cleared => log::info!(
                "Motion state CLEARED -> TRIGGERED, active blobs: {}",
                active_count
            ),
            MotionState::WaitClear => log::info!(
                "Motion state WAIT_CLEAR -> TRIGGERED, active blobs: {}",
                active_count
            ),
            MotionState::Triggered => {}
        }
        self.state = MotionState::Triggered;
    }

    fn on_motion_cleared(&mut self, last_update_peak: u32) {
        log::info!("Motion blob deactivated, update peak was {}", last_update_peak);
        match self.state {
            MotionState::Triggered => {
                log::info!("Motion state TRIGGERED -> WAIT_CLEAR");
                self.wait_clear_since = Some(Instant::now());
                self.state = MotionState::WaitClear;
            }
            // should not occur given the driving events; kept as a
            // defensive check rather than a hard failure
            MotionState::Cleared => {
                log::warn!("Invalid motion state change CLEARED to WAIT_CLEAR")
            }
            MotionState::WaitClear => {}
        }
    }
}

impl ImvObserver for MotionStateMachine {
    fn on_active_points(&mut self, total_points: usize, active_points: usize) {
        let active_percent = (active_points * 100 / total_points.max(1)) as i64;
        self.active_average.add_sample(active_percent);
        let Some(moving_average) = self.active_average.average_rounded_down() else {
            return;
        };

        let now = Instant::now();
        if self.state != MotionState::Cleared
            && self
                .last_average_log
                .map_or(true, |last| now - last > AVERAGE_LOG_INTERVAL)
        {
            self.last_average_log = Some(now);
            log::info!("Motion active percent: {}", moving_average);
        }

        if self.state == MotionState::WaitClear {
            let cooled_down = self
                .wait_clear_since
                .map_or(false, |since| now - since > self.clear_wait_period);
            if moving_average < self.clear_percent as i64 && cooled_down {
                log::info!("Motion state WAIT_CLEAR -> CLEARED");
                self.state = MotionState::Cleared;
                self.wait_clear_since = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(cool_down_ms: u64) -> MotionStateMachine {
        MotionStateMachine::new(5, Duration::from_millis(cool_down_ms))
    }

    #[test]
    fn test_initial_state_is_cleared() {
        assert_eq!(machine(50).state(), MotionState::Cleared);
    }

    #[test]
    fn test_trigger_then_wait_clear_then_cleared() {
        let mut sm = machine(20);

        sm.on_motion_triggered(1);
        assert_eq!(sm.state(), MotionState::Triggered);

        sm.on_motion_cleared(12);
        assert_eq!(sm.state(), MotionState::WaitClear);

        // average still hot: no clear even after the cool-down
        std::thread::sleep(Duration::from_millis(30));
        sm.on_active_points(100, 50);
        assert_eq!(sm.state(), MotionState::WaitClear);

        // flush the moving average below the clear threshold
        for _ in 0..64 {
            sm.on_active_points(100, 0);
        }
        assert_eq!(sm.state(), MotionState::Cleared);
    }

    #[test]
    fn test_cooldown_blocks_early_clear() {
        let mut sm = machine(5000);
        sm.on_motion_triggered(1);
        sm.on_motion_cleared(3);

        for _ in 0..64 {
            sm.on_active_points(100, 0);
        }
        // average is quiet but the cool-down has not elapsed
        assert_eq!(sm.state(), MotionState::WaitClear);
    }

    #[test]
    fn test_retrigger_cancels_pending_clear() {
        let mut sm = machine(20);
        sm.on_motion_triggered(1);
        sm.on_motion_cleared(4);
        assert_eq!(sm.state(), MotionState::WaitClear);

        sm.on_motion_triggered(2);
        assert_eq!(sm.state(), MotionState::Triggered);

        // the clear path still works afterwards
        sm.on_motion_cleared(7);
        std::thread::sleep(Duration::from_millis(30));
        for _ in 0..64 {
            sm.on_active_points(100, 0);
        }
        assert_eq!(sm.state(), MotionState::Cleared);
    }

    #[test]
    fn test_clear_event_while_cleared_is_ignored() {
        let mut sm = machine(20);
        sm.on_motion_cleared(0);
        assert_eq!(sm.state(), MotionState::Cleared);
    }
}
