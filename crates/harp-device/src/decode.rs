use crate::{DeviceError, RegisterMap, RegisterType, Result};
use harp_transport::{HarpMessage, MessageType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    Bytes(Vec<u8>),
    Text(String),
    OperationControl(OperationControl),
    ClockConfiguration(ClockConfiguration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMode {
    Standby,
    Active,
    Reserved,
    Speed,
}

/// Bit fields of the OperationControl register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationControl {
    pub mode: OperationMode,
    pub dump_registers: bool,
    pub mute_replies: bool,
    pub visual_indicators: bool,
    pub operation_led: bool,
    pub heartbeat: bool,
}

impl From<u8> for OperationControl {
    fn from(bits: u8) -> Self {
        let mode = match bits & 0x03 {
            0 => OperationMode::Standby,
            1 => OperationMode::Active,
            2 => OperationMode::Reserved,
            _ => OperationMode::Speed,
        };
        Self {
            mode,
            dump_registers: bits & 0x08 != 0,
            mute_replies: bits & 0x10 != 0,
            visual_indicators: bits & 0x20 != 0,
            operation_led: bits & 0x40 != 0,
            heartbeat: bits & 0x80 != 0,
        }
    }
}

/// Bit fields of the ClockConfiguration register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfiguration {
    pub repeater: bool,
    pub generator: bool,
    pub repeater_capable: bool,
    pub generator_capable: bool,
    pub unlocked: bool,
    pub locked: bool,
}

impl From<u8> for ClockConfiguration {
    fn from(bits: u8) -> Self {
        Self {
            repeater: bits & 0x01 != 0,
            generator: bits & 0x02 != 0,
            repeater_capable: bits & 0x08 != 0,
            generator_capable: bits & 0x10 != 0,
            unlocked: bits & 0x40 != 0,
            locked: bits & 0x80 != 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRecord {
    pub register: RegisterType,
    pub address: u8,
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
    pub value: RegisterValue,
}

/// Decode the payload of a message addressed to a core register.
pub fn decode_register(map: &RegisterMap, msg: &HarpMessage) -> Result<RegisterRecord> {
    let register = map.lookup(msg.address)?;
    let expected = register.payload_type();
    if msg.payload_type != expected {
        return Err(DeviceError::PayloadMismatch {
            register,
            expected,
            actual: msg.payload_type,
        });
    }
    let value = decode_value(register, msg)?;
    Ok(RegisterRecord {
        register,
        address: msg.address,
        message_type: msg.message_type,
        ts: msg.timestamp.map(|t| t.as_secs_f64()),
        value,
    })
}

fn decode_value(register: RegisterType, msg: &HarpMessage) -> Result<RegisterValue> {
    let empty = || DeviceError::EmptyPayload(register);
    let value = match register {
        RegisterType::DeviceName => {
            let raw = msg.payload_u8().ok_or_else(empty)?;
            let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
            RegisterValue::Text(String::from_utf8_lossy(&raw[..end]).into_owned())
        }
        RegisterType::UniqueId | RegisterType::Tag | RegisterType::Version => {
            RegisterValue::Bytes(msg.payload_u8().ok_or_else(empty)?.to_vec())
        }
        RegisterType::OperationControl => {
            let b = first(msg.payload_u8()).ok_or_else(empty)?;
            RegisterValue::OperationControl(b.into())
        }
        RegisterType::ClockConfiguration => {
            let b = first(msg.payload_u8()).ok_or_else(empty)?;
            RegisterValue::ClockConfiguration(b.into())
        }
        RegisterType::TimestampSeconds => {
            let v = msg.payload_u32().and_then(|v| v.first().copied());
            RegisterValue::U32(v.ok_or_else(empty)?)
        }
        RegisterType::WhoAmI
        | RegisterType::TimestampMicroseconds
        | RegisterType::SerialNumber
        | RegisterType::Heartbeat => {
            let v = msg.payload_u16().and_then(|v| v.first().copied());
            RegisterValue::U16(v.ok_or_else(empty)?)
        }
        _ => RegisterValue::U8(first(msg.payload_u8()).ok_or_else(empty)?),
    };
    Ok(value)
}

fn first(payload: Option<&[u8]>) -> Option<u8> {
    payload.and_then(|p| p.first().copied())
}
