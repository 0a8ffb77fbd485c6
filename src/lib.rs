//! midi-frame - frame-synchronized MIDI channel state
//!
//! Tracks note and controller state for 16 MIDI channels plus an `All`
//! aggregate, advanced at most once per frame from a raw inbound queue.
//! Between frames every query sees a stable view: a key pressed this frame
//! reads as *triggered*, a key released this frame as *released*, and both
//! age out on the next frame.
//!
//! ```no_run
//! use std::sync::Arc;
//! use midi_frame::{EngineConfig, FrameCounter, MidiChannel, MidiEngine, QueueBackend};
//!
//! let backend = Arc::new(QueueBackend::new());
//! let frames = FrameCounter::new();
//! let engine = MidiEngine::new(backend, frames.clone(), EngineConfig::default())?;
//!
//! loop {
//!     frames.advance();
//!     if engine.is_triggered(MidiChannel::Ch1, 60) {
//!         println!("middle C, velocity {}", engine.note_level(MidiChannel::Ch1, 60));
//!     }
//! #   break;
//! }
//! # Ok::<(), midi_frame::EngineError>(())
//! ```

pub mod backend;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod midi;
pub mod output;
pub mod state;

pub use backend::{DeviceDirectory, Endpoint, MidiBackend, MidirBackend, QueueBackend};
pub use channel::MidiChannel;
pub use config::{AppConfig, EngineConfig, MonitorConfig};
pub use engine::{FrameCounter, IntervalClock, MidiEngine, PollReport, TickSource};
pub use error::{EngineError, Result};
pub use events::{EventDispatcher, EventKind, MidiEvent, Subscription};
pub use midi::{MessageKind, WireMessage};
pub use state::{ChannelSnapshot, NoteState};
