//! MIDI wire codec
//!
//! Packs and unpacks the fixed-width words exchanged with the backend.
//!
//! Two layouts exist and they are not symmetric:
//!
//! - **Receive words** (`u64`): source id in bits `[0:32)`, status `[32:40)`,
//!   data1 `[40:48)`, data2 `[48:56)`. The value `0` is reserved as the
//!   "queue empty" sentinel.
//! - **Send words** (`u32`): status `[16:24)`, data1 `[8:16)`, data2 `[0:8)`.
//!   The backend unpacks this order before writing bytes to the port.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::channel::MidiChannel;

/// Status nibble for Note Off
pub const STATUS_NOTE_OFF: u8 = 0x8;
/// Status nibble for Note On
pub const STATUS_NOTE_ON: u8 = 0x9;
/// Status nibble for Control Change
pub const STATUS_CONTROL_CHANGE: u8 = 0xB;

/// Largest value a data byte can carry
pub const MAX_DATA_BYTE: u8 = 0x7F;

/// One decoded wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireMessage {
    /// Source (or destination, for sent messages) endpoint id
    pub source: u32,
    /// MIDI status byte
    pub status: u8,
    /// First data byte
    pub data1: u8,
    /// Second data byte
    pub data2: u8,
}

/// Classification of a message for state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Note On with non-zero velocity
    NoteOn { note: u8, velocity: u8 },
    /// Note Off, or Note On with velocity 0
    NoteOff { note: u8 },
    /// Control Change
    ControlChange { controller: u8, value: u8 },
    /// Anything else; decoded but not tracked
    Other,
}

impl WireMessage {
    pub fn new(source: u32, status: u8, data1: u8, data2: u8) -> Self {
        Self {
            source,
            status,
            data1,
            data2,
        }
    }

    /// Decode a receive word. Returns `None` for the zero sentinel.
    pub fn decode(word: u64) -> Option<Self> {
        if word == 0 {
            return None;
        }
        Some(Self {
            source: (word & 0xFFFF_FFFF) as u32,
            status: ((word >> 32) & 0xFF) as u8,
            data1: ((word >> 40) & 0xFF) as u8,
            data2: ((word >> 48) & 0xFF) as u8,
        })
    }

    /// Pack into a receive word
    pub fn encode(&self) -> u64 {
        (self.source as u64)
            | (self.status as u64) << 32
            | (self.data1 as u64) << 40
            | (self.data2 as u64) << 48
    }

    /// Rebuild a message from a send word, tagging it with `source`
    pub fn from_send_word(source: u32, word: u32) -> Self {
        Self {
            source,
            status: ((word >> 16) & 0xFF) as u8,
            data1: ((word >> 8) & 0xFF) as u8,
            data2: (word & 0xFF) as u8,
        }
    }

    /// Pack into a send word
    pub fn send_word(&self) -> u32 {
        (self.status as u32) << 16 | (self.data1 as u32) << 8 | self.data2 as u32
    }

    /// High nibble of the status byte
    pub fn status_code(&self) -> u8 {
        self.status >> 4
    }

    /// Channel from the low nibble of the status byte
    pub fn channel(&self) -> MidiChannel {
        MidiChannel::from_nibble(self.status & 0x0F)
    }

    /// Classify for state tracking (Note On with velocity 0 counts as Note Off)
    pub fn kind(&self) -> MessageKind {
        match self.status_code() {
            STATUS_NOTE_ON if self.data2 > 0 => MessageKind::NoteOn {
                note: self.data1,
                velocity: self.data2,
            },
            STATUS_NOTE_ON | STATUS_NOTE_OFF => MessageKind::NoteOff { note: self.data1 },
            STATUS_CONTROL_CHANGE => MessageKind::ControlChange {
                controller: self.data1,
                value: self.data2,
            },
            _ => MessageKind::Other,
        }
    }

    /// The three MIDI bytes as they appear on the wire
    pub fn to_bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s({:02X}) d({:02X},{:02X}) from {:08X}",
            self.status, self.data1, self.data2, self.source
        )
    }
}

/// Build a send word from its parts.
///
/// Every field is masked to its slot; out-of-range inputs are truncated, never rejected.
pub fn encode_send(status_code: u8, channel: u8, data1: u8, data2: u8) -> u32 {
    let mut word = ((status_code as u32) << 20) & 0x00F0_0000;
    word |= ((channel as u32) << 16) & 0x000F_0000;
    word |= ((data1 as u32) << 8) & 0x0000_FF00;
    word |= (data2 as u32) & 0x0000_00FF;
    word
}

/// Scale a normalized `[0, 1]` value to a data byte.
///
/// With `clamp` unset the product is truncated into 8 bits, so values above 1
/// wrap and negative values floor at 0.
pub fn scale_to_byte(value: f32, clamp: bool) -> u8 {
    let value = if clamp { value.clamp(0.0, 1.0) } else { value };
    ((value * 127.0) as u32 & 0xFF) as u8
}

/// Normalize a 7-bit data byte to `[0, 1]`
pub fn normalize(data: u8) -> f32 {
    1.0 / 127.0 * data as f32
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_is_sentinel() {
        assert_eq!(WireMessage::decode(0), None);
    }

    #[test]
    fn test_decode_note_on() {
        // Note On, ch 1, Middle C, velocity 100, from endpoint 7
        let word = 7u64 | 0x90u64 << 32 | 60u64 << 40 | 100u64 << 48;
        let msg = WireMessage::decode(word).unwrap();

        assert_eq!(msg, WireMessage::new(7, 0x90, 60, 100));
        assert_eq!(msg.status_code(), STATUS_NOTE_ON);
        assert_eq!(msg.channel(), MidiChannel::Ch1);
        assert_eq!(
            msg.kind(),
            MessageKind::NoteOn {
                note: 60,
                velocity: 100
            }
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let msg = WireMessage::new(1, 0x93, 60, 0);
        assert_eq!(msg.kind(), MessageKind::NoteOff { note: 60 });
        assert_eq!(msg.channel(), MidiChannel::Ch4);
    }

    #[test]
    fn test_control_change() {
        let msg = WireMessage::new(1, 0xB2, 7, 100);
        assert_eq!(
            msg.kind(),
            MessageKind::ControlChange {
                controller: 7,
                value: 100
            }
        );
        assert_eq!(msg.channel(), MidiChannel::Ch3);
    }

    #[test]
    fn test_pitch_bend_is_other() {
        let msg = WireMessage::new(1, 0xE0, 0x00, 0x40);
        assert_eq!(msg.kind(), MessageKind::Other);
    }

    #[test]
    fn test_send_word_layout() {
        // Note On ch 1, A4, velocity 101
        let word = encode_send(STATUS_NOTE_ON, 0, 69, 101);
        assert_eq!(word, 0x0090_4565);

        let msg = WireMessage::from_send_word(1, word);
        assert_eq!(msg.status, 0x90);
        assert_eq!(msg.data1, 69);
        assert_eq!(msg.data2, 101);
        assert_eq!(msg.send_word(), word);
    }

    #[test]
    fn test_encode_send_masks_channel() {
        // Channel bits beyond the nibble are dropped
        let word = encode_send(STATUS_CONTROL_CHANGE, 0x1F, 7, 64);
        assert_eq!(word >> 16, 0xBF);
    }

    #[test]
    fn test_scale_to_byte() {
        assert_eq!(scale_to_byte(0.8, false), 101);
        assert_eq!(scale_to_byte(1.0, false), 127);
        assert_eq!(scale_to_byte(0.0, false), 0);
        // 3.0 * 127 = 381, truncated to the low byte
        assert_eq!(scale_to_byte(3.0, false), 125);
        assert_eq!(scale_to_byte(3.0, true), 127);
        assert_eq!(scale_to_byte(-0.5, true), 0);
    }

    #[test]
    fn test_display_format() {
        let msg = WireMessage::new(0x1234, 0x90, 0x3C, 0x64);
        assert_eq!(msg.to_string(), "s(90) d(3C,64) from 00001234");
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x90, 0x3C, 0x7F]), "90 3C 7F");
    }

    proptest! {
        #[test]
        fn prop_receive_word_round_trips(
            source in any::<u32>(),
            channel in 0u8..16,
            code in prop::sample::select(vec![STATUS_NOTE_OFF, STATUS_NOTE_ON, STATUS_CONTROL_CHANGE]),
            data1 in 0u8..128,
            data2 in 0u8..128,
        ) {
            let msg = WireMessage::new(source, code << 4 | channel, data1, data2);
            let decoded = WireMessage::decode(msg.encode()).unwrap();
            prop_assert_eq!(decoded, msg);
            prop_assert_eq!(decoded.status_code(), code);
            prop_assert_eq!(decoded.channel().nibble(), Some(channel));
        }

        #[test]
        fn prop_send_word_round_trips(
            channel in 0u8..16,
            code in prop::sample::select(vec![STATUS_NOTE_OFF, STATUS_NOTE_ON, STATUS_CONTROL_CHANGE]),
            data1 in 0u8..128,
            data2 in 0u8..128,
        ) {
            let word = encode_send(code, channel, data1, data2);
            let msg = WireMessage::from_send_word(0, word);
            prop_assert_eq!(msg.status_code(), code);
            prop_assert_eq!(msg.channel().nibble(), Some(channel));
            prop_assert_eq!(msg.data1, data1);
            prop_assert_eq!(msg.data2, data2);
        }
    }
}
