use crate::RegisterType;
use harp_transport::{PayloadType, TransportError};
use thiserror::Error;

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no register at address {0}")]
    UnknownAddress(u8),
    #[error("payload type mismatch for {register}: expected {expected:?}, got {actual:?}")]
    PayloadMismatch {
        register: RegisterType,
        expected: PayloadType,
        actual: PayloadType,
    },
    #[error("empty payload for {0}")]
    EmptyPayload(RegisterType),
    #[error("metadata parse error: {0}")]
    Metadata(#[from] serde_yaml::Error),
    #[error("metadata describes whoAmI {actual}, expected {expected}")]
    IdentityMismatch { expected: u16, actual: u16 },
    #[error("invalid register {name}: {reason}")]
    InvalidRegister { name: String, reason: &'static str },
    #[error("device rejected read of {0}")]
    ReadRejected(RegisterType),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("metrics init error: {0}")]
    Metrics(#[from] prometheus::Error),
}
