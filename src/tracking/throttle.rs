/**
 * ============================================================================
 * SAMPLE THROTTLE MODULE
 * ============================================================================
 *
 * PURPOSE: Minimum-interval gate on transmission frequency
 *
 * RULES:
 * - First sample of a session always passes
 * - Later samples pass once min_interval_ms has elapsed since the last
 *   transmitted sample, measured on sample timestamps
 * - Samples older than the last transmitted one are suppressed
 * - Listener delivery never goes through here
 *
 * ============================================================================
 */

use std::sync::Mutex;

/**
 * Pure eligibility check
 */
pub fn should_transmit(now_ms: i64, last_sent_at: Option<i64>, min_interval_ms: u64) -> bool {
    match last_sent_at {
        None => true,
        Some(last) => {
            let elapsed = now_ms.saturating_sub(last);
            elapsed >= 0 && elapsed as u64 >= min_interval_ms
        }
    }
}

#[derive(Debug, Default)]
pub struct SampleThrottle {
    last_sent_at: Mutex<Option<i64>>,
}

impl SampleThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /**
     * Check eligibility and record the sample as sent in one step
     * Returns false without touching state when the sample is suppressed
     */
    pub fn try_acquire(&self, now_ms: i64, min_interval_ms: u64) -> bool {
        let mut last = self.last_sent_at.lock().unwrap();
        if should_transmit(now_ms, *last, min_interval_ms) {
            *last = Some(now_ms);
            true
        } else {
            false
        }
    }

    pub fn last_sent_at(&self) -> Option<i64> {
        *self.last_sent_at.lock().unwrap()
    }

    /// Forget the last transmission so the next session starts fresh
    pub fn reset(&self) {
        *self.last_sent_at.lock().unwrap() = None;
    }
}
