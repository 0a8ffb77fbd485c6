//! MIDI channel identifiers
//!
//! Sixteen voice channels plus the synthetic `All` view that mirrors every write.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Number of addressable voice channels
pub const VOICE_CHANNELS: usize = 16;

/// Number of channel tables held by the engine (16 voice channels + All)
pub const CHANNEL_TABLES: usize = VOICE_CHANNELS + 1;

/// A MIDI channel, or the aggregate of all of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MidiChannel {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
    Ch5,
    Ch6,
    Ch7,
    Ch8,
    Ch9,
    Ch10,
    Ch11,
    Ch12,
    Ch13,
    Ch14,
    Ch15,
    Ch16,
    /// Aggregate view updated by every inbound message
    All,
}

impl MidiChannel {
    /// The sixteen voice channels in order (excludes `All`)
    pub const VOICE: [MidiChannel; VOICE_CHANNELS] = [
        MidiChannel::Ch1,
        MidiChannel::Ch2,
        MidiChannel::Ch3,
        MidiChannel::Ch4,
        MidiChannel::Ch5,
        MidiChannel::Ch6,
        MidiChannel::Ch7,
        MidiChannel::Ch8,
        MidiChannel::Ch9,
        MidiChannel::Ch10,
        MidiChannel::Ch11,
        MidiChannel::Ch12,
        MidiChannel::Ch13,
        MidiChannel::Ch14,
        MidiChannel::Ch15,
        MidiChannel::Ch16,
    ];

    /// Table index: 0-15 for voice channels, 16 for `All`
    pub fn index(self) -> usize {
        self as usize
    }

    /// Channel from the low nibble of a status byte
    pub fn from_nibble(nibble: u8) -> Self {
        Self::VOICE[(nibble & 0x0F) as usize]
    }

    /// Wire nibble for a voice channel; `None` for `All`
    pub fn nibble(self) -> Option<u8> {
        match self {
            MidiChannel::All => None,
            ch => Some(ch as u8),
        }
    }

    pub fn is_all(self) -> bool {
        self == MidiChannel::All
    }
}

impl TryFrom<u8> for MidiChannel {
    type Error = EngineError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0..=15 => Ok(Self::from_nibble(index)),
            16 => Ok(MidiChannel::All),
            _ => Err(EngineError::InvalidChannel(index)),
        }
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiChannel::All => write!(f, "All"),
            ch => write!(f, "Ch{}", *ch as u8 + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibble_round_trip() {
        for nibble in 0..16u8 {
            let ch = MidiChannel::from_nibble(nibble);
            assert_eq!(ch.nibble(), Some(nibble));
            assert_eq!(ch.index(), nibble as usize);
        }
        assert_eq!(MidiChannel::All.nibble(), None);
        assert_eq!(MidiChannel::All.index(), 16);
    }

    #[test]
    fn test_try_from_index() {
        assert_eq!(MidiChannel::try_from(0).unwrap(), MidiChannel::Ch1);
        assert_eq!(MidiChannel::try_from(16).unwrap(), MidiChannel::All);
        assert!(matches!(
            MidiChannel::try_from(17),
            Err(EngineError::InvalidChannel(17))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MidiChannel::Ch1.to_string(), "Ch1");
        assert_eq!(MidiChannel::Ch16.to_string(), "Ch16");
        assert_eq!(MidiChannel::All.to_string(), "All");
    }
}
