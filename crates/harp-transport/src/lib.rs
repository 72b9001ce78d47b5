//! harp-transport: Harp binary protocol messages and device links
//!
//! This crate provides the Harp message type, its wire encoding and a blocking
//! [`HarpBus`] trait with feature-gated backends. The default build enables a
//! `mock` backend so that binaries can compile and run without hardware.

mod types;
pub use types::{
    checksum, DeviceTimestamp, HarpMessage, MessageType, PayloadType, PortInfo, Timestamp,
    DEFAULT_PORT,
};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::HarpBus;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockBus;

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialBus, HARP_BAUD_RATE};
