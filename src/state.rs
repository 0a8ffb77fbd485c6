//! Channel state module - per-channel note and controller tracking
//!
//! The table is owned by the engine; everything outside the engine reads it
//! through the engine's query methods.

mod note;
mod table;

pub use note::NoteState;
pub use table::{ChannelSnapshot, ChannelTable, MAX_CONTROLLER, NOTE_COUNT};
