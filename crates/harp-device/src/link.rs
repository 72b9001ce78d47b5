use crate::{ClockSynchronizer, DeviceError, RegisterType, Result};
use harp_transport::{HarpBus, HarpMessage, MessageType, TransportError};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Default wait for a device reply, in milliseconds.
pub const REPLY_TIMEOUT_MS: u64 = 500;

/// An open link to a ClockSynchronizer whose identity has been checked.
///
/// Iterating yields every message the device sends, in arrival order, and
/// ends at the first receive timeout.
pub struct DeviceLink<B> {
    bus: B,
    pending: VecDeque<HarpMessage>,
    timeout_ms: u64,
}

impl ClockSynchronizer {
    /// Open a link over `bus`, reading WhoAmI and rejecting any other device.
    pub fn open<B: HarpBus>(bus: B) -> Result<DeviceLink<B>> {
        Self::open_with(bus, REPLY_TIMEOUT_MS)
    }

    pub fn open_with<B: HarpBus>(bus: B, timeout_ms: u64) -> Result<DeviceLink<B>> {
        let mut link = DeviceLink {
            bus,
            pending: VecDeque::new(),
            timeout_ms,
        };
        let reply = link.read_register(RegisterType::WhoAmI)?;
        let who_am_i = reply
            .payload_u16()
            .and_then(|v| v.first().copied())
            .ok_or(DeviceError::EmptyPayload(RegisterType::WhoAmI))?;
        if who_am_i != Self::WHO_AM_I {
            return Err(DeviceError::IdentityMismatch {
                expected: Self::WHO_AM_I,
                actual: who_am_i,
            });
        }
        info!(who_am_i, "device identity confirmed");
        Ok(link)
    }
}

impl<B: HarpBus> DeviceLink<B> {
    pub fn send(&mut self, message: &HarpMessage) -> Result<()> {
        self.bus.send(message)?;
        Ok(())
    }

    /// Receive the next message, including any set aside while waiting for a reply.
    pub fn recv(&mut self) -> Result<HarpMessage> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(msg);
        }
        Ok(self.bus.recv(Some(self.timeout_ms))?)
    }

    /// Read a register and wait for its reply.
    ///
    /// Unrelated messages that arrive first are kept for [`recv`](Self::recv).
    pub fn read_register(&mut self, register: RegisterType) -> Result<HarpMessage> {
        let address = register.address();
        self.bus
            .send(&HarpMessage::read(address, register.payload_type()))?;
        loop {
            let msg = self.bus.recv(Some(self.timeout_ms))?;
            let is_reply = msg.address == address
                && matches!(msg.message_type, MessageType::Read | MessageType::ReadError);
            if !is_reply {
                debug!(address = msg.address, "holding message received before reply");
                self.pending.push_back(msg);
                continue;
            }
            if msg.is_error() {
                return Err(DeviceError::ReadRejected(register));
            }
            return Ok(msg);
        }
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: HarpBus> Iterator for DeviceLink<B> {
    type Item = Result<HarpMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.recv() {
            Err(DeviceError::Transport(TransportError::Timeout)) => None,
            other => Some(other),
        }
    }
}
