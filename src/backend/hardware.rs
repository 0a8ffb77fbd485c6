//! Hardware backend built on `midir`
//!
//! Opens every visible input (optionally filtered by name), packs each
//! incoming short message into a receive word tagged with the port's id, and
//! pushes it onto a lock-free queue the engine drains on its own schedule.
//! Outputs are opened the same way and addressed by id.
//!
//! Devices plugged in while running are picked up by [`MidirBackend::refresh_if_due`],
//! which the host calls from its frame loop outside of `MidiEngine::poll`. The
//! drain path only pops the queue.

use crossbeam::queue::SegQueue;
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::{looks_virtual, DeviceDirectory, Endpoint, MidiBackend};
use crate::error::{EngineError, Result};
use crate::midi::{format_hex, WireMessage};

/// Default delay between port rescans
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PortDirection {
    Input,
    Output,
}

/// Stable ids for port names, starting at 1
#[derive(Default)]
struct PortIds {
    ids: HashMap<(PortDirection, String), u32>,
    next: u32,
}

impl PortIds {
    fn id_for(&mut self, direction: PortDirection, name: &str) -> u32 {
        if let Some(id) = self.ids.get(&(direction, name.to_string())) {
            return *id;
        }
        self.next += 1;
        self.ids.insert((direction, name.to_string()), self.next);
        self.next
    }

    fn name_of(&self, id: u32) -> Option<String> {
        self.ids
            .iter()
            .find(|(_, v)| **v == id)
            .map(|((_, name), _)| name.clone())
    }
}

/// `midir`-backed transport and device directory
pub struct MidirBackend {
    client_name: String,
    input_filter: Option<String>,
    output_filter: Option<String>,
    rescan_interval: Duration,

    incoming: Arc<SegQueue<u64>>,
    ids: Mutex<PortIds>,
    inputs: Mutex<HashMap<u32, MidiInputConnection<()>>>,
    outputs: Mutex<HashMap<u32, MidiOutputConnection>>,
    last_scan: Mutex<Option<Instant>>,
}

impl MidirBackend {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            input_filter: None,
            output_filter: None,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            incoming: Arc::new(SegQueue::new()),
            ids: Mutex::new(PortIds::default()),
            inputs: Mutex::new(HashMap::new()),
            outputs: Mutex::new(HashMap::new()),
            last_scan: Mutex::new(None),
        }
    }

    /// Only open inputs whose name contains `pattern` (case-insensitive)
    pub fn with_input_filter(mut self, pattern: Option<String>) -> Self {
        self.input_filter = pattern.filter(|p| !p.is_empty());
        self
    }

    /// Only open outputs whose name contains `pattern` (case-insensitive)
    pub fn with_output_filter(mut self, pattern: Option<String>) -> Self {
        self.output_filter = pattern.filter(|p| !p.is_empty());
        self
    }

    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Open all matching ports now
    pub fn open(&self) -> Result<()> {
        self.refresh()?;
        info!(
            "MIDI backend open: {} input(s), {} output(s)",
            self.inputs.lock().len(),
            self.outputs.lock().len()
        );
        Ok(())
    }

    /// Close every connection
    pub fn close(&self) {
        self.inputs.lock().clear();
        self.outputs.lock().clear();
        info!("MIDI backend closed");
    }

    pub fn connected_inputs(&self) -> Vec<u32> {
        self.inputs.lock().keys().copied().collect()
    }

    pub fn connected_outputs(&self) -> Vec<u32> {
        self.outputs.lock().keys().copied().collect()
    }

    /// Close connections to vanished ports and open newly visible ones
    pub fn refresh(&self) -> Result<()> {
        *self.last_scan.lock() = Some(Instant::now());
        self.refresh_inputs()?;
        self.refresh_outputs()?;
        Ok(())
    }

    fn refresh_inputs(&self) -> Result<()> {
        let visible = self.input_endpoints()?;
        let mut inputs = self.inputs.lock();

        inputs.retain(|id, _| {
            let keep = visible.iter().any(|e| e.id == *id);
            if !keep {
                info!("Input {} disappeared, closing", id);
            }
            keep
        });

        for endpoint in visible {
            if inputs.contains_key(&endpoint.id)
                || !matches_filter(&self.input_filter, &endpoint.name)
            {
                continue;
            }
            match self.connect_input(&endpoint) {
                Ok(conn) => {
                    info!("Opened input {}: {}", endpoint.id, endpoint.name);
                    inputs.insert(endpoint.id, conn);
                }
                Err(e) => warn!("Failed to open input '{}': {}", endpoint.name, e),
            }
        }
        Ok(())
    }

    fn refresh_outputs(&self) -> Result<()> {
        let visible = self.output_endpoints()?;
        let mut outputs = self.outputs.lock();

        outputs.retain(|id, _| visible.iter().any(|e| e.id == *id));

        for endpoint in visible {
            if outputs.contains_key(&endpoint.id)
                || !matches_filter(&self.output_filter, &endpoint.name)
            {
                continue;
            }
            match self.connect_output(&endpoint) {
                Ok(conn) => {
                    info!("Opened output {}: {}", endpoint.id, endpoint.name);
                    outputs.insert(endpoint.id, conn);
                }
                Err(e) => warn!("Failed to open output '{}': {}", endpoint.name, e),
            }
        }
        Ok(())
    }

    fn connect_input(&self, endpoint: &Endpoint) -> Result<MidiInputConnection<()>> {
        let mut midi_in = MidiInput::new(&format!("{}-in-{}", self.client_name, endpoint.id))
            .map_err(backend_err)?;
        midi_in.ignore(Ignore::None);

        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).ok().as_deref() == Some(endpoint.name.as_str()))
            .ok_or_else(|| EngineError::Backend(format!("port '{}' vanished", endpoint.name)))?;

        let queue = self.incoming.clone();
        let source = endpoint.id;

        midi_in
            .connect(
                &port,
                &self.client_name,
                move |_timestamp, data, _| match pack_incoming(source, data) {
                    Some(word) => queue.push(word),
                    None => trace!("Dropped empty MIDI packet from {}", source),
                },
                (),
            )
            .map_err(backend_err)
    }

    fn connect_output(&self, endpoint: &Endpoint) -> Result<MidiOutputConnection> {
        let midi_out = MidiOutput::new(&format!("{}-out-{}", self.client_name, endpoint.id))
            .map_err(backend_err)?;

        let port = midi_out
            .ports()
            .into_iter()
            .find(|p| midi_out.port_name(p).ok().as_deref() == Some(endpoint.name.as_str()))
            .ok_or_else(|| EngineError::Backend(format!("port '{}' vanished", endpoint.name)))?;

        midi_out
            .connect(&port, &self.client_name)
            .map_err(backend_err)
    }

    /// Rescan ports if the rescan interval has elapsed since the last scan.
    ///
    /// Returns true when a rescan ran. Does nothing before [`open`](Self::open).
    pub fn refresh_if_due(&self) -> bool {
        if !self.rescan_due(Instant::now()) {
            return false;
        }
        if let Err(e) = self.refresh() {
            warn!("Port rescan failed: {}", e);
        }
        true
    }

    fn rescan_due(&self, now: Instant) -> bool {
        self.last_scan
            .lock()
            .map(|t| now.saturating_duration_since(t) >= self.rescan_interval)
            .unwrap_or(false)
    }
}

impl MidiBackend for MidirBackend {
    fn dequeue_incoming(&self) -> u64 {
        self.incoming.pop().unwrap_or(0)
    }

    fn send_data(&self, device: u32, word: u32) -> u32 {
        let bytes = WireMessage::from_send_word(device, word).to_bytes();
        let mut outputs = self.outputs.lock();
        match outputs.get_mut(&device) {
            Some(conn) => match conn.send(&bytes) {
                Ok(()) => {
                    debug!("Sent to {}: {}", device, format_hex(&bytes));
                    0
                }
                Err(e) => {
                    warn!("Failed to send to output {}: {}", device, e);
                    1
                }
            },
            None => {
                debug!("No open output with id {}", device);
                1
            }
        }
    }
}

impl DeviceDirectory for MidirBackend {
    fn input_endpoints(&self) -> Result<Vec<Endpoint>> {
        let midi_in =
            MidiInput::new(&format!("{}-scan", self.client_name)).map_err(backend_err)?;
        let mut ids = self.ids.lock();
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .map(|name| Endpoint {
                id: ids.id_for(PortDirection::Input, &name),
                is_virtual: looks_virtual(&name),
                name,
            })
            .collect())
    }

    fn output_endpoints(&self) -> Result<Vec<Endpoint>> {
        let midi_out =
            MidiOutput::new(&format!("{}-scan", self.client_name)).map_err(backend_err)?;
        let mut ids = self.ids.lock();
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .map(|name| Endpoint {
                id: ids.id_for(PortDirection::Output, &name),
                is_virtual: looks_virtual(&name),
                name,
            })
            .collect())
    }

    fn endpoint_name(&self, id: u32) -> Option<String> {
        self.ids.lock().name_of(id)
    }
}

impl Drop for MidirBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Pack a raw MIDI packet into a receive word. Missing data bytes read as 0.
fn pack_incoming(source: u32, data: &[u8]) -> Option<u64> {
    let status = *data.first()?;
    let data1 = data.get(1).copied().unwrap_or(0);
    let data2 = data.get(2).copied().unwrap_or(0);
    Some(WireMessage::new(source, status, data1, data2).encode())
}

/// Case-insensitive substring match; no filter matches everything
fn matches_filter(filter: &Option<String>, name: &str) -> bool {
    filter
        .as_ref()
        .map(|p| name.to_lowercase().contains(&p.to_lowercase()))
        .unwrap_or(true)
}

fn backend_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(e.to_string())
}
