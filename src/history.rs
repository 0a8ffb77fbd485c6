//! Diagnostic traffic log
//!
//! Keeps the last few messages seen in one direction plus a running total.
//! The engine never reads it back; it exists for monitors and tests.
//! When diagnostics are disabled the engine installs [`NullLog`], which has the
//! same interface and does nothing.

use std::collections::VecDeque;

use crate::midi::WireMessage;

/// Default number of messages retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 8;

/// Recorder for one direction of traffic
pub trait TrafficLog: Send {
    /// Append a message, evicting the oldest past capacity
    fn record(&mut self, message: WireMessage);

    /// Retained messages, oldest first
    fn recent(&self) -> Vec<WireMessage>;

    /// Messages recorded since construction
    fn total(&self) -> u64;
}

/// Fixed-capacity ring of recent messages
#[derive(Debug, Clone)]
pub struct RingLog {
    entries: VecDeque<WireMessage>,
    capacity: usize,
    total: u64,
}

impl RingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TrafficLog for RingLog {
    fn record(&mut self, message: WireMessage) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    fn recent(&self) -> Vec<WireMessage> {
        self.entries.iter().copied().collect()
    }

    fn total(&self) -> u64 {
        self.total
    }
}

/// Disabled diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl TrafficLog for NullLog {
    fn record(&mut self, _message: WireMessage) {}

    fn recent(&self) -> Vec<WireMessage> {
        Vec::new()
    }

    fn total(&self) -> u64 {
        0
    }
}

/// Build the log for one direction according to the diagnostics flag
pub fn make_log(enabled: bool, capacity: usize) -> Box<dyn TrafficLog> {
    if enabled {
        Box::new(RingLog::new(capacity))
    } else {
        Box::new(NullLog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(n: u8) -> WireMessage {
        WireMessage::new(1, 0x90, n, 100)
    }

    #[test]
    fn test_keeps_last_eight_in_order() {
        let mut log = RingLog::default();
        for n in 0..9 {
            log.record(msg(n));
        }

        let recent = log.recent();
        assert_eq!(recent.len(), 8);
        let notes: Vec<u8> = recent.iter().map(|m| m.data1).collect();
        assert_eq!(notes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(log.total(), 9);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut log = RingLog::new(3);
        for n in 0..100 {
            log.record(msg(n));
            assert!(log.recent().len() <= 3);
        }
        assert_eq!(log.total(), 100);
    }

    #[test]
    fn test_null_log_records_nothing() {
        let mut log = make_log(false, 8);
        log.record(msg(1));
        assert!(log.recent().is_empty());
        assert_eq!(log.total(), 0);
    }
}
