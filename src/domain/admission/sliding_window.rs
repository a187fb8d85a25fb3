//! In-process sliding-window log.
//!
//! Keeps the exact timestamps (ms) of admitted requests. Entries older
//! than `now - window` fall out of the window; an entry exactly at the
//! cutoff still counts.

use std::collections::VecDeque;

use crate::domain::foundation::Timestamp;

use super::CounterOutcome;

#[derive(Debug, Clone, Default)]
pub struct SlidingLog {
    entries: VecDeque<i64>,
}

impl SlidingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries older than the cutoff. Returns the remaining count.
    pub fn prune(&mut self, cutoff_ms: i64) -> usize {
        while matches!(self.entries.front(), Some(&ts) if ts < cutoff_ms) {
            self.entries.pop_front();
        }
        self.entries.len()
    }

    /// Prunes, then records `now` if fewer than `max` entries remain.
    ///
    /// A rejected attempt is not recorded.
    pub fn try_record(&mut self, now: Timestamp, window_ms: i64, max: u32) -> CounterOutcome {
        let now_ms = now.as_unix_millis();
        let count = self.prune(now_ms - window_ms);
        if count >= max as usize {
            return CounterOutcome::rejected(count as u32, self.oldest());
        }
        self.record(now_ms);
        CounterOutcome::allowed(count as u32 + 1, self.oldest())
    }

    /// Counts entries inside the window without modifying the log.
    pub fn peek(&self, now: Timestamp, window_ms: i64, max: u32) -> CounterOutcome {
        let cutoff_ms = now.as_unix_millis() - window_ms;
        let mut live = self.entries.iter().filter(|&&ts| ts >= cutoff_ms);
        let oldest = live.next().copied();
        let count = oldest.map(|_| live.count() + 1).unwrap_or(0) as u32;
        CounterOutcome {
            allowed: count < max,
            count,
            oldest: oldest.map(Timestamp::from_unix_millis),
            retry_hint: None,
        }
    }

    /// Whether every entry has left the window.
    pub fn is_idle(&self, now: Timestamp, window_ms: i64) -> bool {
        let cutoff_ms = now.as_unix_millis() - window_ms;
        self.entries.back().map_or(true, |&newest| newest < cutoff_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, now_ms: i64) {
        // Keep the deque sorted even if the wall clock steps backwards.
        let position = self.entries.partition_point(|&ts| ts <= now_ms);
        self.entries.insert(position, now_ms);
    }

    fn oldest(&self) -> Option<Timestamp> {
        self.entries.front().copied().map(Timestamp::from_unix_millis)
    }
}
