use crate::{Result, TransportError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Port value used when a message is not routed through a hub.
pub const DEFAULT_PORT: u8 = 255;

const ERROR_FLAG: u8 = 0x08;
const TIMESTAMP_FLAG: u8 = 0x10;
const EXTENDED_LENGTH: u8 = 255;
/// Device timestamp ticks are 32 microseconds wide.
const TICK_SECONDS: f64 = 32e-6;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Read,
    Write,
    Event,
    ReadError,
    WriteError,
}

impl MessageType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            3 => Ok(Self::Event),
            c if c == 1 | ERROR_FLAG => Ok(Self::ReadError),
            c if c == 2 | ERROR_FLAG => Ok(Self::WriteError),
            other => Err(TransportError::UnknownMessageType(other)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 2,
            Self::Event => 3,
            Self::ReadError => 1 | ERROR_FLAG,
            Self::WriteError => 2 | ERROR_FLAG,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Self::ReadError | Self::WriteError)
    }
}

/// Element type of a message payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
    Float,
}

impl PayloadType {
    /// Decode a payload type code, ignoring the timestamp flag.
    pub fn from_code(code: u8) -> Result<Self> {
        match code & !TIMESTAMP_FLAG {
            0x01 => Ok(Self::U8),
            0x81 => Ok(Self::S8),
            0x02 => Ok(Self::U16),
            0x82 => Ok(Self::S16),
            0x04 => Ok(Self::U32),
            0x84 => Ok(Self::S32),
            0x08 => Ok(Self::U64),
            0x88 => Ok(Self::S64),
            0x44 => Ok(Self::Float),
            _ => Err(TransportError::UnknownPayloadType(code)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::U8 => 0x01,
            Self::S8 => 0x81,
            Self::U16 => 0x02,
            Self::S16 => 0x82,
            Self::U32 => 0x04,
            Self::S32 => 0x84,
            Self::U64 => 0x08,
            Self::S64 => 0x88,
            Self::Float => 0x44,
        }
    }

    /// Size in bytes of a single payload element.
    pub fn element_size(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 | Self::Float => 4,
            Self::U64 | Self::S64 => 8,
        }
    }
}

/// Timestamp carried inside a message, as counted by the device clock.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeviceTimestamp {
    pub seconds: u32,
    pub ticks: u16,
}

impl DeviceTimestamp {
    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.ticks) * TICK_SECONDS
    }
}

/// Host-side receive time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timestamp(pub OffsetDateTime);

/// A single Harp protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarpMessage {
    pub message_type: MessageType,
    pub address: u8,
    pub port: u8,
    pub payload_type: PayloadType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DeviceTimestamp>,
    pub payload: Vec<u8>,
    #[serde(skip)]
    pub received_at: Option<Timestamp>,
}

impl HarpMessage {
    pub fn new(
        message_type: MessageType,
        address: u8,
        payload_type: PayloadType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            message_type,
            address,
            port: DEFAULT_PORT,
            payload_type,
            timestamp: None,
            payload,
            received_at: None,
        }
    }

    /// A read request for `address`; requests carry no payload.
    pub fn read(address: u8, payload_type: PayloadType) -> Self {
        Self::new(MessageType::Read, address, payload_type, Vec::new())
    }

    pub fn write_u8(address: u8, values: &[u8]) -> Self {
        Self::new(MessageType::Write, address, PayloadType::U8, values.to_vec())
    }

    pub fn write_u16(address: u8, values: &[u16]) -> Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(MessageType::Write, address, PayloadType::U16, payload)
    }

    pub fn write_u32(address: u8, values: &[u32]) -> Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(MessageType::Write, address, PayloadType::U32, payload)
    }

    pub fn with_timestamp(mut self, timestamp: DeviceTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_error(&self) -> bool {
        self.message_type.is_error()
    }

    pub fn payload_u8(&self) -> Option<&[u8]> {
        (self.payload_type == PayloadType::U8).then_some(self.payload.as_slice())
    }

    pub fn payload_u16(&self) -> Option<Vec<u16>> {
        if self.payload_type != PayloadType::U16 {
            return None;
        }
        Some(
            self.payload
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        )
    }

    pub fn payload_u32(&self) -> Option<Vec<u32>> {
        if self.payload_type != PayloadType::U32 {
            return None;
        }
        Some(
            self.payload
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    /// Encode into wire bytes, appending the checksum.
    ///
    /// Frames whose length does not fit the extended `u16` length field are
    /// rejected with `InvalidFrame("payload too long")`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let ts_len = if self.timestamp.is_some() { 6 } else { 0 };
        // address + port + payload type + timestamp + payload + checksum
        let length = 3 + ts_len + self.payload.len() + 1;
        let mut out = Vec::with_capacity(length + 4);
        out.push(self.message_type.code());
        if length < usize::from(EXTENDED_LENGTH) {
            out.push(length as u8);
        } else {
            let length = u16::try_from(length)
                .map_err(|_| TransportError::InvalidFrame("payload too long"))?;
            out.push(EXTENDED_LENGTH);
            out.extend_from_slice(&length.to_le_bytes());
        }
        out.push(self.address);
        out.push(self.port);
        let mut ptype = self.payload_type.code();
        if let Some(ts) = &self.timestamp {
            ptype |= TIMESTAMP_FLAG;
            out.push(ptype);
            out.extend_from_slice(&ts.seconds.to_le_bytes());
            out.extend_from_slice(&ts.ticks.to_le_bytes());
        } else {
            out.push(ptype);
        }
        out.extend_from_slice(&self.payload);
        out.push(checksum(&out));
        Ok(out)
    }

    /// Parse one message from the start of `buf`.
    ///
    /// Returns the message and the number of bytes it occupied. A buffer that
    /// holds only part of a frame yields `InvalidFrame("short frame")`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < 2 {
            return Err(TransportError::InvalidFrame("short header"));
        }
        let message_type = MessageType::from_code(buf[0])?;
        let (length, header) = if buf[1] == EXTENDED_LENGTH {
            if buf.len() < 4 {
                return Err(TransportError::InvalidFrame("short header"));
            }
            (usize::from(u16::from_le_bytes([buf[2], buf[3]])), 4)
        } else {
            (usize::from(buf[1]), 2)
        };
        if length < 4 {
            return Err(TransportError::InvalidFrame("length"));
        }
        let total = header + length;
        if buf.len() < total {
            return Err(TransportError::InvalidFrame("short frame"));
        }
        let expected = checksum(&buf[..total - 1]);
        let actual = buf[total - 1];
        if expected != actual {
            return Err(TransportError::Checksum { expected, actual });
        }

        let address = buf[header];
        let port = buf[header + 1];
        let raw_type = buf[header + 2];
        let payload_type = PayloadType::from_code(raw_type)?;
        let mut idx = header + 3;
        let timestamp = if raw_type & TIMESTAMP_FLAG != 0 {
            if idx + 6 > total - 1 {
                return Err(TransportError::InvalidFrame("short timestamp"));
            }
            let seconds = u32::from_le_bytes([buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]]);
            let ticks = u16::from_le_bytes([buf[idx + 4], buf[idx + 5]]);
            idx += 6;
            Some(DeviceTimestamp { seconds, ticks })
        } else {
            None
        };
        let payload = buf[idx..total - 1].to_vec();
        if payload.len() % payload_type.element_size() != 0 {
            return Err(TransportError::InvalidFrame("payload size"));
        }
        Ok((
            Self {
                message_type,
                address,
                port,
                payload_type,
                timestamp,
                payload,
                received_at: None,
            },
            total,
        ))
    }
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[derive(Clone, Debug)]
pub struct PortInfo {
    pub name: String,
    pub driver: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamped_event() {
        // Event on register 8 (timestamp seconds), U32 with timestamp.
        let mut frame = vec![0x03, 14, 8, 255, 0x14, 10, 0, 0, 0, 3, 0, 42, 0, 0, 0];
        frame.push(checksum(&frame));
        let (msg, used) = HarpMessage::parse(&frame).unwrap();
        assert_eq!(used, frame.len());
        assert_eq!(msg.message_type, MessageType::Event);
        assert_eq!(msg.address, 8);
        assert_eq!(msg.port, DEFAULT_PORT);
        assert_eq!(msg.payload_u32(), Some(vec![42]));
        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.seconds, 10);
        assert!((ts.as_secs_f64() - 10.000096).abs() < 1e-9);
        assert_eq!(msg.to_bytes().unwrap(), frame);
    }

    #[test]
    fn encodes_read_request() {
        let bytes = HarpMessage::read(0, PayloadType::U16).to_bytes().unwrap();
        assert_eq!(bytes, vec![0x01, 4, 0, 255, 0x02, 0x06]);
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut bytes = HarpMessage::write_u8(10, &[1]).to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        assert!(matches!(
            HarpMessage::parse(&bytes),
            Err(TransportError::Checksum { .. })
        ));
    }

    #[test]
    fn rejects_partial_frame() {
        let bytes = HarpMessage::write_u16(13, &[7]).to_bytes().unwrap();
        assert!(matches!(
            HarpMessage::parse(&bytes[..bytes.len() - 1]),
            Err(TransportError::InvalidFrame("short frame"))
        ));
    }

    #[test]
    fn rejects_misaligned_payload() {
        let mut frame = vec![0x02, 5, 13, 255, 0x02, 1];
        frame.push(checksum(&frame));
        assert!(matches!(
            HarpMessage::parse(&frame),
            Err(TransportError::InvalidFrame("payload size"))
        ));
    }

    #[test]
    fn extended_length_frames() {
        let msg = HarpMessage::write_u8(12, &[b'x'; 300]);
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes[1], 255);
        let (back, used) = HarpMessage::parse(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back.payload.len(), 300);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let msg = HarpMessage::write_u8(12, &vec![0u8; 70_000]);
        assert!(matches!(
            msg.to_bytes(),
            Err(TransportError::InvalidFrame("payload too long"))
        ));
        let largest = HarpMessage::write_u8(12, &vec![0u8; usize::from(u16::MAX) - 4]);
        assert_eq!(largest.to_bytes().unwrap().len(), usize::from(u16::MAX) + 4);
    }

    #[test]
    fn error_flag_round_trip() {
        assert_eq!(MessageType::from_code(9).unwrap(), MessageType::ReadError);
        assert!(MessageType::WriteError.is_error());
        assert!(MessageType::from_code(7).is_err());
    }
}
