//! Outcome counters and delay accounting.
//!
//! Pure side-effects of package resolution; nothing here feeds back into
//! scheduling decisions.

use std::collections::VecDeque;

use super::types::FragmentOutcome;

/// Number of recent successful deliveries the rolling delay average is
/// computed over.
pub const DELAY_HISTORY_CAPACITY: usize = 5;

/// Running outcome counters of one device.
#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    pub success_count: u64,
    pub collision_count: u64,
    pub retry_exhausted_count: u64,
    pub queue_overflow_count: u64,
    pub distance_dropped_count: u64,
    /// Tick of the most recent successful package resolution.
    pub last_success_tick: u64,
    /// Lifetime sum of successful-package delays in ticks.
    pub delay_sum_ticks: u64,
    /// Delays of the most recent successful deliveries, bounded to
    /// [`DELAY_HISTORY_CAPACITY`] entries.
    pub recent_delays: VecDeque<u64>,
}

impl DeviceStats {
    /// Record a successfully resolved package.
    pub fn record_success(&mut self, delay_ticks: u64, now_ticks: u64) {
        self.success_count += 1;
        self.last_success_tick = now_ticks;
        self.delay_sum_ticks += delay_ticks;
        if self.recent_delays.len() >= DELAY_HISTORY_CAPACITY {
            self.recent_delays.pop_front();
        }
        self.recent_delays.push_back(delay_ticks);
    }

    /// Record a failed package under its folded failure reason.
    pub fn record_failure(&mut self, reason: FragmentOutcome) {
        match reason {
            FragmentOutcome::Collided => self.collision_count += 1,
            FragmentOutcome::RetryExhausted => self.retry_exhausted_count += 1,
            FragmentOutcome::QueueOverflow => self.queue_overflow_count += 1,
            FragmentOutcome::DistanceDropped => self.distance_dropped_count += 1,
            FragmentOutcome::Delivered => {}
        }
    }

    /// Mean delay over the recent-delivery window, in ticks. `None` until
    /// the first success.
    pub fn rolling_average_delay_ticks(&self) -> Option<f64> {
        if self.recent_delays.is_empty() {
            return None;
        }
        let sum: u64 = self.recent_delays.iter().sum();
        Some(sum as f64 / self.recent_delays.len() as f64)
    }

    /// Ticks elapsed since the last successful delivery.
    pub fn ticks_since_last_success(&self, now_ticks: u64) -> u64 {
        now_ticks.saturating_sub(self.last_success_tick)
    }
}

/// Channel-wide tallies across all devices.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelTotals {
    /// Application packages generated by push calls.
    pub generated_packages: u64,
    /// Packages fully resolved as delivered.
    pub delivered_packages: u64,
    /// Packages fully resolved as failed, any reason.
    pub failed_packages: u64,
    /// Individual fragments that ran out of their attempt budget.
    pub retry_exhausted_fragments: u64,
    /// Cumulative delay of delivered packages in ticks.
    pub total_delay_ticks: u64,
}

impl ChannelTotals {
    /// Mean delivered-package delay in ticks, `None` before the first
    /// delivery.
    pub fn average_delay_ticks(&self) -> Option<f64> {
        if self.delivered_packages == 0 {
            return None;
        }
        Some(self.total_delay_ticks as f64 / self.delivered_packages as f64)
    }
}

/// Read-only per-device snapshot assembled for the host.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    pub success_count: u64,
    pub collision_count: u64,
    pub retry_exhausted_count: u64,
    pub queue_overflow_count: u64,
    pub distance_dropped_count: u64,
    /// Sub-packages currently waiting in the send queue.
    pub queue_depth: usize,
    pub ticks_since_last_success: u64,
    /// Last observed distance to the receiver, in world units.
    pub receiver_distance: f64,
    /// Rolling average delay in milliseconds including the fixed receive
    /// chain delay; `None` until the first success.
    pub average_delay_ms: Option<f64>,
}
