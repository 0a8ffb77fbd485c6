//! Transition engine
//!
//! Owns the channel state table and the traffic logs, and advances them at
//! most once per tick:
//!
//! 1. **Age**: notes triggered last tick become held, notes released last tick become off.
//! 2. **Drain**: pop raw words from the backend until the zero sentinel (or the
//!    configured bound), decode, apply to the table, log, and collect events.
//! 3. **Dispatch**: once the state lock is released, deliver the collected
//!    events to observers in arrival order.
//!
//! Every query first runs this poll, so callers always see state as of the
//! current tick without having to drive the engine themselves.

pub mod clock;


use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::backend::MidiBackend;
use crate::channel::MidiChannel;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::events::{EventDispatcher, MidiEvent};
use crate::history::{make_log, TrafficLog};
use crate::midi::{normalize, MessageKind, WireMessage, MAX_DATA_BYTE};
use crate::output::OutputEncoder;
use crate::state::{ChannelSnapshot, ChannelTable, NoteState};

pub use clock::{FrameCounter, IntervalClock, TickSource};

/// Summary of one transition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Tick the transition ran at
    pub tick: u64,
    /// Words drained from the inbound queue
    pub drained: usize,
    /// Drained messages that did not change the table
    pub ignored: usize,
    /// Send acknowledgements discarded
    pub acks: usize,
    /// The drain reached `max_drain_per_poll` and stopped without checking
    /// for more. Also set when the queue held exactly that many words.
    pub saturated: bool,
}

/// Everything guarded by the engine lock
struct EngineState {
    table: ChannelTable,
    last_tick: Option<u64>,
    inbound: Box<dyn TrafficLog>,
    outbound: Box<dyn TrafficLog>,
}

/// Frame-synchronized MIDI state engine
///
/// The engine is `Send + Sync` and may be polled from several threads. Each
/// transition is atomic, but observers run after the state lock is released,
/// so when two threads poll consecutive ticks concurrently the events of the
/// later tick can reach observers first. Drive polling from one thread when
/// observer order across ticks matters.
pub struct MidiEngine {
    backend: Arc<dyn MidiBackend>,
    clock: Box<dyn TickSource>,
    config: EngineConfig,
    encoder: OutputEncoder,
    events: EventDispatcher,
    state: Mutex<EngineState>,
}

impl MidiEngine {
    /// Create an engine over `backend`, ticking with `clock`
    pub fn new(
        backend: Arc<dyn MidiBackend>,
        clock: impl TickSource + 'static,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;

        let state = EngineState {
            table: ChannelTable::new(),
            last_tick: None,
            inbound: make_log(config.diagnostics, config.history_capacity),
            outbound: make_log(config.diagnostics, config.history_capacity),
        };

        info!(
            "MIDI engine created (diagnostics: {}, drain bound: {}, clamp sends: {})",
            config.diagnostics, config.max_drain_per_poll, config.clamp_send_values
        );

        Ok(Self {
            backend,
            clock: Box::new(clock),
            encoder: OutputEncoder::new(config.clamp_send_values),
            config,
            events: EventDispatcher::new(),
            state: Mutex::new(state),
        })
    }

    /// Create an engine that ticks on the wall clock every
    /// `config.poll_interval_ms`, for hosts without a frame loop
    pub fn with_interval_clock(
        backend: Arc<dyn MidiBackend>,
        config: EngineConfig,
    ) -> Result<Self> {
        let clock = IntervalClock::new(config.poll_interval());
        Self::new(backend, clock, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Observer registry for note and controller events
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    // --- Polling -------------------------------------------------------------

    /// Advance to the current tick if not done yet.
    ///
    /// Returns `None` when the engine already ran at this tick.
    pub fn poll(&self) -> Option<PollReport> {
        let tick = self.clock.current_tick();
        let (report, events) = {
            let mut state = self.state.lock();
            if state.last_tick == Some(tick) {
                return None;
            }
            state.last_tick = Some(tick);
            self.transition(&mut state, tick)
        };
        self.dispatch(&events);
        Some(report)
    }

    /// Run a transition now, even if one already ran at this tick
    pub fn force_update(&self) -> PollReport {
        let tick = self.clock.current_tick();
        let (report, events) = {
            let mut state = self.state.lock();
            state.last_tick = Some(tick);
            self.transition(&mut state, tick)
        };
        self.dispatch(&events);
        report
    }

    /// Tick of the last transition, if any
    pub fn last_tick(&self) -> Option<u64> {
        self.state.lock().last_tick
    }

    fn transition(&self, state: &mut EngineState, tick: u64) -> (PollReport, Vec<MidiEvent>) {
        let mut report = PollReport {
            tick,
            ..PollReport::default()
        };
        let mut events = Vec::new();

        state.table.age();

        let bound = self.config.max_drain_per_poll;
        while report.drained < bound {
            let Some(message) = WireMessage::decode(self.backend.dequeue_incoming()) else {
                break;
            };
            report.drained += 1;

            match apply(&mut state.table, &message) {
                Some(event) => events.push(event),
                None => {
                    trace!("Ignored inbound message: {}", message);
                    report.ignored += 1;
                }
            }
            state.inbound.record(message);
        }

        if report.drained == bound {
            report.saturated = true;
            warn!(
                "Inbound drain reached its bound of {} messages; anything left waits for the next tick",
                bound
            );
        }

        while report.acks < bound && self.backend.dequeue_send_ack() != 0 {
            report.acks += 1;
        }

        if report.drained > 0 {
            debug!(
                "Tick {}: drained {} message(s), {} ignored, {} event(s)",
                tick,
                report.drained,
                report.ignored,
                events.len()
            );
        }

        (report, events)
    }

    fn dispatch(&self, events: &[MidiEvent]) {
        for event in events {
            self.events.dispatch(event);
        }
    }

    // --- Queries -------------------------------------------------------------

    /// Velocity of a down key in `[0, 1]`, 0 when up
    pub fn note_level(&self, channel: MidiChannel, note: u8) -> f32 {
        self.poll();
        self.state.lock().table.note_level(channel, note)
    }

    /// Whether the key went down this tick
    pub fn is_triggered(&self, channel: MidiChannel, note: u8) -> bool {
        self.poll();
        self.state.lock().table.is_triggered(channel, note)
    }

    /// Whether the key went up this tick
    pub fn is_released(&self, channel: MidiChannel, note: u8) -> bool {
        self.poll();
        self.state.lock().table.is_released(channel, note)
    }

    pub fn note_state(&self, channel: MidiChannel, note: u8) -> NoteState {
        self.poll();
        self.state.lock().table.note_state(channel, note)
    }

    /// Keys currently down on `channel`, ascending
    pub fn held_notes(&self, channel: MidiChannel) -> Vec<u8> {
        self.poll();
        self.state.lock().table.held_notes(channel)
    }

    /// Last level of `controller`, or `default` if never received
    pub fn knob_level(&self, channel: MidiChannel, controller: u8, default: f32) -> f32 {
        self.poll();
        self.state.lock().table.knob_level(channel, controller, default)
    }

    /// Controllers received on `channel`, ascending
    pub fn knob_numbers(&self, channel: MidiChannel) -> Vec<u8> {
        self.poll();
        self.state.lock().table.knob_numbers(channel)
    }

    pub fn snapshot(&self, channel: MidiChannel) -> ChannelSnapshot {
        self.poll();
        self.state.lock().table.snapshot(channel)
    }

    // --- Sending -------------------------------------------------------------

    pub fn send_note_on(
        &self,
        device: u32,
        channel: MidiChannel,
        note: u8,
        velocity: f32,
    ) -> Result<()> {
        let word = self.encoder.note_on(channel, note, velocity)?;
        self.send_raw(device, word);
        Ok(())
    }

    pub fn send_note_off(
        &self,
        device: u32,
        channel: MidiChannel,
        note: u8,
        velocity: f32,
    ) -> Result<()> {
        let word = self.encoder.note_off(channel, note, velocity)?;
        self.send_raw(device, word);
        Ok(())
    }

    pub fn send_control_change(
        &self,
        device: u32,
        channel: MidiChannel,
        controller: u8,
        value: f32,
    ) -> Result<()> {
        let word = self.encoder.control_change(channel, controller, value)?;
        self.send_raw(device, word);
        Ok(())
    }

    /// Send a channel voice/mode message; see [`OutputEncoder::channel_message`]
    pub fn send_channel_message(
        &self,
        device: u32,
        status: u8,
        channel: MidiChannel,
        data: u16,
    ) -> Result<()> {
        let word = self.encoder.channel_message(status, channel, data)?;
        self.send_raw(device, word);
        Ok(())
    }

    /// Hand a prepared send word to the backend and log it
    pub fn send_raw(&self, device: u32, word: u32) {
        let ack = self.backend.send_data(device, word);
        let message = WireMessage::from_send_word(device, word);
        trace!("Sent {} (backend returned {})", message, ack);
        self.state.lock().outbound.record(message);
    }

    // --- Diagnostics ---------------------------------------------------------

    /// Recent inbound messages, oldest first
    pub fn history(&self) -> Vec<WireMessage> {
        self.state.lock().inbound.recent()
    }

    /// Recent outbound messages, oldest first
    pub fn send_history(&self) -> Vec<WireMessage> {
        self.state.lock().outbound.recent()
    }

    /// Inbound messages processed since construction
    pub fn total_message_count(&self) -> u64 {
        self.poll();
        self.state.lock().inbound.total()
    }

    /// Outbound messages sent since construction
    pub fn total_send_count(&self) -> u64 {
        self.poll();
        self.state.lock().outbound.total()
    }
}

/// Apply one message to the table. Returns the event to dispatch, or `None`
/// if the message was not a tracked kind or carried a note, controller,
/// velocity or value byte outside 0-127.
fn apply(table: &mut ChannelTable, message: &WireMessage) -> Option<MidiEvent> {
    let channel = message.channel();
    match message.kind() {
        MessageKind::NoteOn { velocity, .. } | MessageKind::ControlChange { value: velocity, .. }
            if velocity > MAX_DATA_BYTE =>
        {
            None
        }
        MessageKind::NoteOn { note, velocity } => {
            let velocity = normalize(velocity);
            table.press(channel, note, velocity).then_some(MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            })
        }
        MessageKind::NoteOff { note } => table
            .release(channel, note)
            .then_some(MidiEvent::NoteOff { channel, note }),
        MessageKind::ControlChange { controller, value } => {
            let level = normalize(value);
            table
                .set_knob(channel, controller, level)
                .then_some(MidiEvent::Controller {
                    channel,
                    number: controller,
                    level,
                })
        }
        MessageKind::Other => None,
    }
}
