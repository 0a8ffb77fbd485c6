//! Per-note state encoding
//!
//! A note is stored as one `f32` whose sign and magnitude carry a 4-state machine:
//!
//! | value        | meaning                                   |
//! |--------------|-------------------------------------------|
//! | `v > 1`      | triggered this frame, velocity `v - 1`    |
//! | `0 < v <= 1` | held, velocity `v`                        |
//! | `v == 0`     | off                                       |
//! | `v < 0`      | released this frame                       |
//!
//! The raw value never leaves the crate; callers see [`NoteState`].

use serde::{Deserialize, Serialize};

/// Stored value for a note released this frame
pub(crate) const RELEASED: f32 = -1.0;

/// Stored value for a note triggered this frame with `velocity` in `[0, 1]`
pub(crate) fn triggered(velocity: f32) -> f32 {
    velocity + 1.0
}

/// Advance one frame: triggered becomes held, released becomes off
pub(crate) fn age(value: f32) -> f32 {
    if value > 1.0 {
        value - 1.0
    } else if value < 0.0 {
        0.0
    } else {
        value
    }
}

/// Velocity level of a stored value (0 when off or released)
pub(crate) fn level(value: f32) -> f32 {
    if value > 1.0 {
        value - 1.0
    } else if value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Frame-relative view of a single note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "velocity", rename_all = "lowercase")]
pub enum NoteState {
    Off,
    /// Pressed during the current frame
    Triggered(f32),
    Held(f32),
    /// Released during the current frame
    Released,
}

impl NoteState {
    pub(crate) fn from_raw(value: f32) -> Self {
        if value > 1.0 {
            NoteState::Triggered(value - 1.0)
        } else if value > 0.0 {
            NoteState::Held(value)
        } else if value < 0.0 {
            NoteState::Released
        } else {
            NoteState::Off
        }
    }

    /// Whether the key is down (triggered or held)
    pub fn is_down(&self) -> bool {
        matches!(self, NoteState::Triggered(_) | NoteState::Held(_))
    }

    pub fn velocity(&self) -> f32 {
        match self {
            NoteState::Triggered(v) | NoteState::Held(v) => *v,
            _ => 0.0,
        }
    }
}
