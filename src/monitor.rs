//! MIDI monitor for debugging and development
//!
//! Opens hardware ports through the engine, prints every note and controller
//! event as it is applied, and dumps the engine's diagnostics on exit.

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use midi_frame::midi::format_hex;
use midi_frame::{
    AppConfig, ChannelSnapshot, DeviceDirectory, Endpoint, FrameCounter, MidiBackend, MidiChannel,
    MidiEngine, MidiEvent, MidirBackend, Subscription, WireMessage,
};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// What the monitor prints when it stops
#[derive(Debug, Serialize)]
struct SessionSummary {
    ticks: u64,
    messages_received: u64,
    messages_sent: u64,
    history: Vec<WireMessage>,
    send_history: Vec<WireMessage>,
    channels: Vec<ChannelSnapshot>,
}

/// Run the monitor until Ctrl+C
pub async fn run_monitor(config: AppConfig, json: bool) -> Result<()> {
    let monitor = &config.monitor;

    println!("{}", "=== MIDI Frame Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let backend = Arc::new(
        MidirBackend::new(monitor.client_name.clone())
            .with_input_filter(monitor.input_filter.clone())
            .with_output_filter(
                monitor
                    .echo_output
                    .clone()
                    .or_else(|| monitor.output_filter.clone()),
            )
            .with_rescan_interval(monitor.rescan_interval()),
    );
    backend.open().context("Failed to open MIDI ports")?;

    if backend.connected_inputs().is_empty() {
        warn!("No input ports open yet; waiting for devices to appear");
    }

    let frames = FrameCounter::new();
    let engine = Arc::new(
        make_engine(backend.clone(), &frames, &config).context("Failed to create MIDI engine")?,
    );

    let mut subscriptions = print_events(&engine);
    if monitor.echo_output.is_some() {
        subscriptions.extend(echo_events(&engine, &backend));
        info!("Echoing notes and controllers to matching output");
    }

    println!("\n{}", "Monitoring MIDI traffic...".green());
    println!(
        "{}",
        "Format: [time] EVENT CHANNEL | DETAIL".dimmed()
    );
    println!("{}\n", "─".repeat(80).dimmed());

    let mut ticker = tokio::time::interval(monitor.frame_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                backend.refresh_if_due();
                frames.advance();
                engine.poll();
            }
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    for sub in subscriptions {
        engine.events().unsubscribe(sub);
    }

    println!("\n{}", "Monitor stopped".yellow());
    let summary = summarize(&engine);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    backend.close();
    Ok(())
}

/// Frame-driven engine, or a wall-clock one when `monitor.interval_clock` is set
fn make_engine(
    backend: Arc<dyn MidiBackend>,
    frames: &FrameCounter,
    config: &AppConfig,
) -> midi_frame::Result<MidiEngine> {
    if config.monitor.interval_clock {
        info!(
            "Ticking every {:?} on the wall clock",
            config.engine.poll_interval()
        );
        MidiEngine::with_interval_clock(backend, config.engine.clone())
    } else {
        MidiEngine::new(backend, frames.clone(), config.engine.clone())
    }
}

fn print_events(engine: &Arc<MidiEngine>) -> Vec<Subscription> {
    let events = engine.events();
    vec![
        events.on_note_on(|channel, note, velocity| {
            print_line(&MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            })
        }),
        events.on_note_off(|channel, note| print_line(&MidiEvent::NoteOff { channel, note })),
        events.on_controller(|channel, number, level| {
            print_line(&MidiEvent::Controller {
                channel,
                number,
                level,
            })
        }),
    ]
}

/// Forward notes and controllers to the first open output
fn echo_events(engine: &Arc<MidiEngine>, backend: &Arc<MidirBackend>) -> Vec<Subscription> {
    let events = engine.events();

    let (weak, out) = (Arc::downgrade(engine), backend.clone());
    let note_on = events.on_note_on(move |channel, note, velocity| {
        echo(&weak, &out, |engine, device| {
            engine.send_note_on(device, channel, note, velocity)
        })
    });

    let (weak, out) = (Arc::downgrade(engine), backend.clone());
    let note_off = events.on_note_off(move |channel, note| {
        echo(&weak, &out, |engine, device| {
            engine.send_note_off(device, channel, note, 0.0)
        })
    });

    let (weak, out) = (Arc::downgrade(engine), backend.clone());
    let controller = events.on_controller(move |channel, number, level| {
        echo(&weak, &out, |engine, device| {
            engine.send_control_change(device, channel, number, level)
        })
    });

    vec![note_on, note_off, controller]
}

fn echo(
    engine: &Weak<MidiEngine>,
    backend: &MidirBackend,
    send: impl FnOnce(&MidiEngine, u32) -> midi_frame::Result<()>,
) {
    let Some(engine) = engine.upgrade() else {
        return;
    };
    let Some(device) = backend.connected_outputs().into_iter().min() else {
        return;
    };
    if let Err(e) = send(&engine, device) {
        warn!("Echo to output {} failed: {}", device, e);
    }
}

fn print_line(event: &MidiEvent) {
    let time = chrono::Local::now().format("%H:%M:%S%.3f").to_string();
    println!("[{}] {}", time.dimmed(), format_event(event));
}

/// One colored line per event
fn format_event(event: &MidiEvent) -> String {
    match *event {
        MidiEvent::NoteOn {
            channel,
            note,
            velocity,
        } => format!(
            "{} {:5} | {:4} ({:3}) vel {:.3}",
            "NOTE ON ".bright_green(),
            channel.to_string(),
            note_name(note),
            note,
            velocity
        ),
        MidiEvent::NoteOff { channel, note } => format!(
            "{} {:5} | {:4} ({:3})",
            "NOTE OFF".bright_red(),
            channel.to_string(),
            note_name(note),
            note
        ),
        MidiEvent::Controller {
            channel,
            number,
            level,
        } => format!(
            "{} {:5} | cc {:3} = {:.3}",
            "CTRL    ".bright_yellow(),
            channel.to_string(),
            number,
            level
        ),
    }
}

/// Scientific pitch name, middle C (60) is C4
fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

fn summarize(engine: &MidiEngine) -> SessionSummary {
    let messages_received = engine.total_message_count();
    SessionSummary {
        ticks: engine.last_tick().unwrap_or(0),
        messages_received,
        messages_sent: engine.total_send_count(),
        history: engine.history(),
        send_history: engine.send_history(),
        channels: MidiChannel::VOICE
            .iter()
            .map(|ch| engine.snapshot(*ch))
            .filter(|snap| !snap.notes.is_empty() || !snap.knobs.is_empty())
            .collect(),
    }
}

fn print_summary(summary: &SessionSummary) {
    println!("\n{}", "Diagnostics:".bold());
    println!("  Ticks:    {}", summary.ticks.to_string().green());
    println!(
        "  Received: {}",
        summary.messages_received.to_string().green()
    );
    println!("  Sent:     {}", summary.messages_sent.to_string().green());

    print_history("Last received:", &summary.history);
    print_history("Last sent:", &summary.send_history);

    for snap in &summary.channels {
        let held: Vec<String> = snap
            .notes
            .iter()
            .filter(|(_, state)| state.is_down())
            .map(|(note, _)| note_name(*note))
            .collect();
        println!(
            "  {} held [{}] controllers {:?}",
            snap.channel.to_string().bright_white(),
            held.join(" "),
            snap.knobs.keys().collect::<Vec<_>>()
        );
    }
    println!();
}

fn print_history(title: &str, messages: &[WireMessage]) {
    println!("\n{}", title.bold());
    if messages.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for msg in messages {
        println!("  {} {}", format_hex(&msg.to_bytes()).bright_blue(), msg);
    }
}

/// List all ports in a formatted way
pub fn list_ports_formatted(directory: &dyn DeviceDirectory) -> Result<()> {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    let inputs = directory
        .input_endpoints()
        .context("Failed to enumerate input ports")?;
    print_endpoints("Input Ports:", &inputs);

    let outputs = directory
        .output_endpoints()
        .context("Failed to enumerate output ports")?;
    print_endpoints("Output Ports:", &outputs);

    println!();
    Ok(())
}

fn print_endpoints(title: &str, endpoints: &[Endpoint]) {
    println!("\n{}", title.bold());
    if endpoints.is_empty() {
        println!("  {}", "No ports found".dimmed());
        return;
    }
    for endpoint in endpoints {
        let marker = if endpoint.is_virtual {
            "[VIRTUAL]".yellow()
        } else {
            "[PHYSICAL]".green()
        };
        println!("  {} {:3} {}", marker, endpoint.id, endpoint.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midi_frame::{EngineConfig, QueueBackend};

    #[test]
    fn test_note_name() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_format_event() {
        colored::control::set_override(false);

        let line = format_event(&MidiEvent::NoteOn {
            channel: MidiChannel::Ch2,
            note: 60,
            velocity: 0.5,
        });
        assert!(line.starts_with("NOTE ON"));
        assert!(line.contains("Ch2"));
        assert!(line.contains("C4"));
        assert!(line.contains("0.500"));

        let line = format_event(&MidiEvent::Controller {
            channel: MidiChannel::Ch1,
            number: 7,
            level: 1.0,
        });
        assert!(line.contains("cc   7 = 1.000"));
    }

    #[test]
    fn test_summary_lists_active_channels() {
        let backend = Arc::new(QueueBackend::new());
        let frames = FrameCounter::new();
        let engine =
            MidiEngine::new(backend.clone(), frames.clone(), EngineConfig::default()).unwrap();

        backend.push(WireMessage::new(1, 0x92, 64, 90));
        backend.push(WireMessage::new(1, 0xB0, 1, 10));

        let summary = summarize(&engine);
        assert_eq!(summary.messages_received, 2);
        let channels: Vec<MidiChannel> = summary.channels.iter().map(|s| s.channel).collect();
        assert_eq!(channels, vec![MidiChannel::Ch1, MidiChannel::Ch3]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_make_engine_clock_modes() {
        let backend = Arc::new(QueueBackend::new());
        let frames = FrameCounter::new();
        let mut config = AppConfig::default();

        let framed = make_engine(backend.clone(), &frames, &config).unwrap();
        assert!(framed.poll().is_some());
        frames.advance();
        assert!(framed.poll().is_some());

        // An hour-long interval keeps the wall clock on tick 0 whatever the frame counter does
        config.monitor.interval_clock = true;
        config.engine.poll_interval_ms = 3_600_000;
        let timed = make_engine(backend, &frames, &config).unwrap();
        assert_eq!(timed.poll().map(|r| r.tick), Some(0));
        frames.advance();
        assert!(timed.poll().is_none());
    }

    #[test]
    fn test_list_ports_with_queue_directory() {
        let directory = QueueBackend::new().with_endpoint(1, "Keys");
        assert!(list_ports_formatted(&directory).is_ok());
    }
}
