//! In-memory backend
//!
//! A lock-free inbound queue and a recorded outbound log. Used for loopback
//! setups and as the test harness for the engine.

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;

use super::{DeviceDirectory, Endpoint, MidiBackend};
use crate::error::Result;
use crate::midi::WireMessage;

/// Queue-backed transport
#[derive(Default)]
pub struct QueueBackend {
    incoming: SegQueue<u64>,
    acks: SegQueue<u64>,
    sent: Mutex<Vec<(u32, u32)>>,
    endpoints: Vec<Endpoint>,
    ack_sends: bool,
}

impl QueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every delivered send word on the acknowledgement queue
    pub fn with_send_acks(mut self) -> Self {
        self.ack_sends = true;
        self
    }

    /// Advertise an endpoint through the device directory
    pub fn with_endpoint(mut self, id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        self.endpoints.push(Endpoint {
            id,
            is_virtual: super::looks_virtual(&name),
            name,
        });
        self
    }

    /// Queue an inbound message
    pub fn push(&self, message: WireMessage) {
        self.push_word(message.encode());
    }

    /// Queue a raw inbound word; the zero sentinel is dropped
    pub fn push_word(&self, word: u64) {
        if word != 0 {
            self.incoming.push(word);
        }
    }

    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Every (device, word) pair delivered so far
    pub fn sent(&self) -> Vec<(u32, u32)> {
        self.sent.lock().clone()
    }

    pub fn take_sent(&self) -> Vec<(u32, u32)> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl MidiBackend for QueueBackend {
    fn dequeue_incoming(&self) -> u64 {
        self.incoming.pop().unwrap_or(0)
    }

    fn send_data(&self, device: u32, word: u32) -> u32 {
        self.sent.lock().push((device, word));
        if self.ack_sends {
            self.acks.push((device as u64) << 32 | word as u64 | 1u64 << 63);
        }
        0
    }

    fn dequeue_send_ack(&self) -> u64 {
        self.acks.pop().unwrap_or(0)
    }
}

impl DeviceDirectory for QueueBackend {
    fn input_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.endpoints.clone())
    }

    fn output_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.endpoints.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_and_sentinel() {
        let backend = QueueBackend::new();
        backend.push(WireMessage::new(1, 0x90, 60, 100));
        backend.push(WireMessage::new(1, 0x80, 60, 0));
        backend.push_word(0);
        assert_eq!(backend.pending(), 2);

        let first = WireMessage::decode(backend.dequeue_incoming()).unwrap();
        let second = WireMessage::decode(backend.dequeue_incoming()).unwrap();
        assert_eq!(first.status, 0x90);
        assert_eq!(second.status, 0x80);
        assert_eq!(backend.dequeue_incoming(), 0);
    }

    #[test]
    fn test_send_acks() {
        let backend = QueueBackend::new().with_send_acks();
        backend.send_data(3, 0x0090_4565);

        assert_eq!(backend.sent(), vec![(3, 0x0090_4565)]);
        assert_ne!(backend.dequeue_send_ack(), 0);
        assert_eq!(backend.dequeue_send_ack(), 0);
        assert_eq!(backend.take_sent().len(), 1);
        assert!(backend.sent().is_empty());
    }

    #[test]
    fn test_directory() {
        let backend = QueueBackend::new()
            .with_endpoint(1, "Keystation 49")
            .with_endpoint(2, "loopMIDI Port");

        let inputs = backend.input_endpoints().unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(!inputs[0].is_virtual);
        assert!(inputs[1].is_virtual);
        assert_eq!(backend.endpoint_name(2).as_deref(), Some("loopMIDI Port"));
        assert_eq!(backend.endpoint_name(9), None);
    }
}
