//! Tick sources
//!
//! The engine advances state at most once per tick. During a running session
//! the tick is the frame number, advanced by whoever drives the frame loop.
//! Outside of one (diagnostic tools, editors) a wall-clock interval stands in
//! for the frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Supplies the current tick number
pub trait TickSource: Send + Sync {
    fn current_tick(&self) -> u64;
}

/// Frame counter shared between the frame loop and the engine
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    frame: Arc<AtomicU64>,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the next frame; returns the new frame number
    pub fn advance(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }
}

impl TickSource for FrameCounter {
    fn current_tick(&self) -> u64 {
        self.frame()
    }
}

/// Wall-clock ticks of fixed length
#[derive(Debug, Clone)]
pub struct IntervalClock {
    start: Instant,
    interval: Duration,
}

impl IntervalClock {
    /// Default tick length, ~30 Hz
    pub const DEFAULT_INTERVAL: Duration = Duration::from_nanos(1_000_000_000 / 30);

    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    pub fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            start,
            interval: interval.max(Duration::from_micros(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick number containing `now`
    pub fn tick_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_nanos() / self.interval.as_nanos()) as u64
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl TickSource for IntervalClock {
    fn current_tick(&self) -> u64 {
        self.tick_at(Instant::now())
    }
}
