//! Channel state table
//!
//! Holds the note array and controller map for each of the 16 voice channels
//! plus the `All` aggregate. Only the transition engine mutates it.

use serde::Serialize;
use std::collections::BTreeMap;

use super::note::{self, NoteState};
use crate::channel::{MidiChannel, CHANNEL_TABLES};

/// Number of notes tracked per channel
pub const NOTE_COUNT: usize = 128;

/// Highest valid controller number
pub const MAX_CONTROLLER: u8 = 127;

/// State for one channel
#[derive(Debug, Clone)]
pub struct ChannelState {
    notes: [f32; NOTE_COUNT],
    knobs: BTreeMap<u8, f32>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            notes: [0.0; NOTE_COUNT],
            knobs: BTreeMap::new(),
        }
    }

    fn raw(&self, note: u8) -> f32 {
        self.notes.get(note as usize).copied().unwrap_or(0.0)
    }
}

impl Default for ChannelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Note and controller state for every channel
#[derive(Debug, Clone)]
pub struct ChannelTable {
    channels: [ChannelState; CHANNEL_TABLES],
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| ChannelState::new()),
        }
    }

    fn channel(&self, channel: MidiChannel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    /// Advance every note by one frame (triggered → held, released → off)
    pub(crate) fn age(&mut self) {
        for cs in self.channels.iter_mut() {
            for value in cs.notes.iter_mut() {
                *value = note::age(*value);
            }
        }
    }

    /// Store a raw note value on `channel` and mirror it on `All`.
    /// Returns false for note numbers outside 0-127.
    fn write_note(&mut self, channel: MidiChannel, note: u8, value: f32) -> bool {
        let index = note as usize;
        if index >= NOTE_COUNT {
            return false;
        }
        self.channels[channel.index()].notes[index] = value;
        self.channels[MidiChannel::All.index()].notes[index] = value;
        true
    }

    /// Record a key press with `velocity` in `[0, 1]`
    pub(crate) fn press(&mut self, channel: MidiChannel, note: u8, velocity: f32) -> bool {
        self.write_note(channel, note, note::triggered(velocity))
    }

    /// Record a key release
    pub(crate) fn release(&mut self, channel: MidiChannel, note: u8) -> bool {
        self.write_note(channel, note, note::RELEASED)
    }

    /// Upsert a controller level on `channel` and mirror it on `All`.
    /// Returns false for controller numbers above 127.
    pub(crate) fn set_knob(&mut self, channel: MidiChannel, controller: u8, level: f32) -> bool {
        if controller > MAX_CONTROLLER {
            return false;
        }
        self.channels[channel.index()].knobs.insert(controller, level);
        self.channels[MidiChannel::All.index()]
            .knobs
            .insert(controller, level);
        true
    }

    /// Velocity of a down key, 0 otherwise
    pub fn note_level(&self, channel: MidiChannel, note: u8) -> f32 {
        note::level(self.channel(channel).raw(note))
    }

    /// Whether the key went down during the current frame
    pub fn is_triggered(&self, channel: MidiChannel, note: u8) -> bool {
        self.channel(channel).raw(note) > 1.0
    }

    /// Whether the key went up during the current frame
    pub fn is_released(&self, channel: MidiChannel, note: u8) -> bool {
        self.channel(channel).raw(note) < 0.0
    }

    pub fn note_state(&self, channel: MidiChannel, note: u8) -> NoteState {
        NoteState::from_raw(self.channel(channel).raw(note))
    }

    /// Notes currently down (triggered or held), ascending
    pub fn held_notes(&self, channel: MidiChannel) -> Vec<u8> {
        self.channel(channel)
            .notes
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i as u8)
            .collect()
    }

    /// Last controller level, or `default` if never seen on this channel
    pub fn knob_level(&self, channel: MidiChannel, controller: u8, default: f32) -> f32 {
        self.channel(channel)
            .knobs
            .get(&controller)
            .copied()
            .unwrap_or(default)
    }

    /// Controller numbers seen on this channel, ascending
    pub fn knob_numbers(&self, channel: MidiChannel) -> Vec<u8> {
        self.channel(channel).knobs.keys().copied().collect()
    }

    /// Serializable view of one channel
    pub fn snapshot(&self, channel: MidiChannel) -> ChannelSnapshot {
        let cs = self.channel(channel);
        ChannelSnapshot {
            channel,
            notes: self
                .held_notes(channel)
                .into_iter()
                .chain(
                    cs.notes
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| **v < 0.0)
                        .map(|(i, _)| i as u8),
                )
                .map(|n| (n, NoteState::from_raw(cs.raw(n))))
                .collect(),
            knobs: cs.knobs.clone(),
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a channel's non-idle notes and controllers
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub channel: MidiChannel,
    pub notes: BTreeMap<u8, NoteState>,
    pub knobs: BTreeMap<u8, f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_mirrors_to_all() {
        let mut table = ChannelTable::new();
        assert!(table.press(MidiChannel::Ch3, 60, 0.5));

        for ch in [MidiChannel::Ch3, MidiChannel::All] {
            assert!(table.is_triggered(ch, 60));
            assert_eq!(table.note_level(ch, 60), 0.5);
        }
        assert!(!table.is_triggered(MidiChannel::Ch1, 60));
    }

    #[test]
    fn test_age_then_release() {
        let mut table = ChannelTable::new();
        table.press(MidiChannel::Ch1, 64, 0.75);
        table.age();

        assert!(!table.is_triggered(MidiChannel::Ch1, 64));
        assert_eq!(table.note_state(MidiChannel::Ch1, 64), NoteState::Held(0.75));

        table.release(MidiChannel::Ch1, 64);
        assert!(table.is_released(MidiChannel::Ch1, 64));
        assert_eq!(table.note_level(MidiChannel::Ch1, 64), 0.0);

        table.age();
        assert!(!table.is_released(MidiChannel::Ch1, 64));
        assert_eq!(table.note_state(MidiChannel::All, 64), NoteState::Off);
    }

    #[test]
    fn test_out_of_range_note_is_ignored() {
        let mut table = ChannelTable::new();
        assert!(!table.press(MidiChannel::Ch1, 200, 1.0));
        assert_eq!(table.note_level(MidiChannel::Ch1, 200), 0.0);
        assert!(!table.is_triggered(MidiChannel::Ch1, 200));
    }

    #[test]
    fn test_knobs() {
        let mut table = ChannelTable::new();
        assert_eq!(table.knob_level(MidiChannel::Ch2, 7, 0.25), 0.25);

        table.set_knob(MidiChannel::Ch2, 7, 0.5);
        table.set_knob(MidiChannel::Ch2, 1, 1.0);
        assert!(!table.set_knob(MidiChannel::Ch2, 128, 1.0));

        assert_eq!(table.knob_level(MidiChannel::Ch2, 7, 0.25), 0.5);
        assert_eq!(table.knob_numbers(MidiChannel::Ch2), vec![1, 7]);
        assert_eq!(table.knob_numbers(MidiChannel::All), vec![1, 7]);
        assert!(table.knob_numbers(MidiChannel::Ch1).is_empty());
    }

    #[test]
    fn test_held_notes_and_snapshot() {
        let mut table = ChannelTable::new();
        table.press(MidiChannel::Ch1, 67, 1.0);
        table.press(MidiChannel::Ch1, 60, 0.5);
        table.release(MidiChannel::Ch1, 62);

        assert_eq!(table.held_notes(MidiChannel::Ch1), vec![60, 67]);

        let snap = table.snapshot(MidiChannel::Ch1);
        assert_eq!(snap.notes.len(), 3);
        assert_eq!(snap.notes[&62], NoteState::Released);
        assert_eq!(snap.notes[&60], NoteState::Triggered(0.5));
    }
}
