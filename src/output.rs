//! Output encoder
//!
//! Turns note/controller intents into send words. Velocities and values are
//! normalized floats; they are scaled by 127 and truncated into the data byte.
//! With clamping enabled they are first clamped to `[0, 1]`.

use crate::channel::MidiChannel;
use crate::error::{EngineError, Result};
use crate::midi::{
    encode_send, scale_to_byte, STATUS_CONTROL_CHANGE, STATUS_NOTE_OFF, STATUS_NOTE_ON,
};

/// Builds send words for outbound intents
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputEncoder {
    clamp: bool,
}

impl OutputEncoder {
    pub fn new(clamp: bool) -> Self {
        Self { clamp }
    }

    pub fn clamps(&self) -> bool {
        self.clamp
    }

    pub fn note_on(&self, channel: MidiChannel, note: u8, velocity: f32) -> Result<u32> {
        self.voice(STATUS_NOTE_ON, channel, note, velocity)
    }

    pub fn note_off(&self, channel: MidiChannel, note: u8, velocity: f32) -> Result<u32> {
        self.voice(STATUS_NOTE_OFF, channel, note, velocity)
    }

    pub fn control_change(&self, channel: MidiChannel, controller: u8, value: f32) -> Result<u32> {
        self.voice(STATUS_CONTROL_CHANGE, channel, controller, value)
    }

    /// Arbitrary channel voice/mode message.
    ///
    /// Only the high nibble of `status` is used and bit 7 is forced on, so the
    /// result is always a status byte. `data` carries data1 in its high byte and
    /// data2 in its low byte.
    pub fn channel_message(&self, status: u8, channel: MidiChannel, data: u16) -> Result<u32> {
        let nibble = wire_channel(channel)?;
        let code = (status | 0x80) >> 4;
        Ok(encode_send(code, nibble, (data >> 8) as u8, (data & 0xFF) as u8))
    }

    fn voice(&self, code: u8, channel: MidiChannel, data1: u8, level: f32) -> Result<u32> {
        let nibble = wire_channel(channel)?;
        Ok(encode_send(code, nibble, data1, scale_to_byte(level, self.clamp)))
    }
}

fn wire_channel(channel: MidiChannel) -> Result<u8> {
    channel.nibble().ok_or(EngineError::AggregateChannel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::WireMessage;

    #[test]
    fn test_note_on_word() {
        let word = OutputEncoder::default()
            .note_on(MidiChannel::Ch1, 69, 0.8)
            .unwrap();
        let msg = WireMessage::from_send_word(1, word);

        assert_eq!(msg.status_code(), STATUS_NOTE_ON);
        assert_eq!(msg.channel(), MidiChannel::Ch1);
        assert_eq!(msg.data1, 69);
        assert_eq!(msg.data2, 101);
    }

    #[test]
    fn test_note_off_and_cc_channels() {
        let encoder = OutputEncoder::default();

        let off = WireMessage::from_send_word(0, encoder.note_off(MidiChannel::Ch10, 36, 0.0).unwrap());
        assert_eq!(off.status, 0x89);
        assert_eq!(off.data2, 0);

        let cc = WireMessage::from_send_word(0, encoder.control_change(MidiChannel::Ch16, 7, 1.0).unwrap());
        assert_eq!(cc.status, 0xBF);
        assert_eq!(cc.data1, 7);
        assert_eq!(cc.data2, 127);
    }

    #[test]
    fn test_all_channel_rejected() {
        let err = OutputEncoder::default()
            .note_on(MidiChannel::All, 60, 1.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::AggregateChannel));
    }

    #[test]
    fn test_truncation_vs_clamp() {
        let loose = OutputEncoder::new(false);
        let strict = OutputEncoder::new(true);

        let wrapped = WireMessage::from_send_word(0, loose.note_on(MidiChannel::Ch1, 60, 1.5).unwrap());
        // 1.5 * 127 = 190.5 -> 190, not a valid 7-bit data byte
        assert_eq!(wrapped.data2, 190);

        let clamped = WireMessage::from_send_word(0, strict.note_on(MidiChannel::Ch1, 60, 1.5).unwrap());
        assert_eq!(clamped.data2, 127);
    }

    #[test]
    fn test_channel_message() {
        let encoder = OutputEncoder::default();

        // Program change 5 on channel 3
        let word = encoder.channel_message(0xC0, MidiChannel::Ch3, 0x0500).unwrap();
        let msg = WireMessage::from_send_word(0, word);
        assert_eq!(msg.status, 0xC2);
        assert_eq!(msg.data1, 5);
        assert_eq!(msg.data2, 0);

        // Status without bit 7 is coerced into a status byte
        let word = encoder.channel_message(0x60, MidiChannel::Ch1, 0x4000).unwrap();
        assert_eq!(WireMessage::from_send_word(0, word).status, 0xE0);
    }
}
