use crate::{
    HarpBus, HarpMessage, MessageType, PayloadType, PortInfo, Result, Timestamp, TransportError,
};
use std::collections::{HashMap, VecDeque};
use time::OffsetDateTime;
use tracing::debug;

/// A simple in-process mock device. Each bus instance is independent.
///
/// Register values are held in memory; reads and writes are answered the way
/// a device would, by queueing a reply that the next `recv` returns.
pub struct MockBus {
    name: String,
    registers: HashMap<u8, (PayloadType, Vec<u8>)>,
    inbox: VecDeque<HarpMessage>,
}

impl MockBus {
    /// Seed a register value that reads will report.
    pub fn set_register(&mut self, address: u8, payload_type: PayloadType, payload: Vec<u8>) {
        self.registers.insert(address, (payload_type, payload));
    }

    /// Queue a message as if the device had sent it unprompted.
    pub fn push(&mut self, message: HarpMessage) {
        self.inbox.push_back(message);
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    fn reply(&self, request: &HarpMessage) -> HarpMessage {
        let stored = self.registers.get(&request.address);
        match (request.message_type, stored) {
            (MessageType::Read, Some((ptype, payload))) => HarpMessage::new(
                MessageType::Read,
                request.address,
                *ptype,
                payload.clone(),
            ),
            (MessageType::Write, Some((ptype, _))) if *ptype == request.payload_type => {
                HarpMessage::new(
                    MessageType::Write,
                    request.address,
                    request.payload_type,
                    request.payload.clone(),
                )
            }
            (MessageType::Write, _) => HarpMessage::new(
                MessageType::WriteError,
                request.address,
                request.payload_type,
                Vec::new(),
            ),
            _ => HarpMessage::new(
                MessageType::ReadError,
                request.address,
                request.payload_type,
                Vec::new(),
            ),
        }
    }
}

impl HarpBus for MockBus {
    fn open(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            registers: HashMap::new(),
            inbox: VecDeque::new(),
        })
    }

    fn list() -> Result<Vec<PortInfo>> {
        Ok(vec![PortInfo {
            name: "mock0".to_string(),
            driver: "mock".to_string(),
        }])
    }

    fn recv(&mut self, _timeout_ms: Option<u64>) -> Result<HarpMessage> {
        let mut message = self.inbox.pop_front().ok_or(TransportError::Timeout)?;
        message.received_at = Some(Timestamp(OffsetDateTime::now_utc()));
        Ok(message)
    }

    fn send(&mut self, message: &HarpMessage) -> Result<()> {
        let reply = self.reply(message);
        if message.message_type == MessageType::Write && !reply.is_error() {
            self.registers.insert(
                message.address,
                (message.payload_type, message.payload.clone()),
            );
        }
        debug!(bus = %self.name, address = message.address, "mock reply queued");
        self.inbox.push_back(reply);
        Ok(())
    }
}
