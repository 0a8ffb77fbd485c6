//! Backend collaborators
//!
//! The engine only needs two operations from whatever talks to MIDI devices:
//! pop one raw inbound word, and deliver one raw outbound word. Device listing
//! is a separate, read-only concern used by front ends.

pub mod hardware;
pub mod queue;

use serde::Serialize;

use crate::error::Result;

pub use hardware::MidirBackend;
pub use queue::QueueBackend;

/// Raw message transport consumed by the engine
pub trait MidiBackend: Send + Sync {
    /// Pop one pending inbound word, or 0 when the queue is empty
    fn dequeue_incoming(&self) -> u64;

    /// Deliver one send word to `device`. The return value is backend-specific
    /// and not interpreted by the engine.
    fn send_data(&self, device: u32, word: u32) -> u32;

    /// Pop one pending send acknowledgement, or 0 when there are none.
    ///
    /// Backends that do not report acknowledgements keep the default.
    fn dequeue_send_ack(&self) -> u64 {
        0
    }
}

/// A visible MIDI endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Id used as the source of inbound words and as the send target
    pub id: u32,
    pub name: String,
    pub is_virtual: bool,
}

/// Enumeration of currently visible endpoints
pub trait DeviceDirectory {
    fn input_endpoints(&self) -> Result<Vec<Endpoint>>;

    fn output_endpoints(&self) -> Result<Vec<Endpoint>>;

    /// Display name for an endpoint id
    fn endpoint_name(&self, id: u32) -> Option<String> {
        self.input_endpoints()
            .ok()
            .into_iter()
            .chain(self.output_endpoints().ok())
            .flatten()
            .find(|e| e.id == id)
            .map(|e| e.name)
    }
}

/// Heuristic used when listing ports
pub(crate) fn looks_virtual(name: &str) -> bool {
    name.contains("Virtual") || name.contains("loopMIDI") || name.contains("IAC")
}
