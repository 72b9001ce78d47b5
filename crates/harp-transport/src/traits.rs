use crate::{HarpMessage, PortInfo, Result};

/// A minimal blocking Harp device link.
pub trait HarpBus {
    /// Open a device link by name (e.g., "/dev/ttyUSB0", "COM3", "mock0").
    fn open(name: &str) -> Result<Self>
    where
        Self: Sized;

    /// Attempt to list available ports for this backend.
    fn list() -> Result<Vec<PortInfo>>;

    /// Receive one message (blocking with optional timeout in milliseconds).
    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<HarpMessage>;

    /// Send one message.
    fn send(&mut self, message: &HarpMessage) -> Result<()>;
}
