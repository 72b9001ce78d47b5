use crate::{HarpBus, HarpMessage, PortInfo, Result, Timestamp, TransportError};
use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::warn;

/// Harp devices talk over a virtual serial port at 1 Mbaud.
pub const HARP_BAUD_RATE: u32 = 1_000_000;

/// Harp protocol over a serial port.
pub struct SerialBus {
    _port_path: String,
    port: Box<dyn SerialPort>,
    acc: Vec<u8>,
}

impl SerialBus {
    pub fn open_with(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => TransportError::InterfaceNotFound(path.into()),
                _ => TransportError::Io(e.to_string()),
            })?;
        Ok(SerialBus {
            _port_path: path.to_string(),
            port,
            acc: Vec::with_capacity(256),
        })
    }
}

impl HarpBus for SerialBus {
    fn open(path: &str) -> Result<Self>
    where
        Self: Sized,
    {
        Self::open_with(path, HARP_BAUD_RATE)
    }

    fn list() -> Result<Vec<PortInfo>> {
        let mut out = Vec::new();
        for p in serialport::available_ports().map_err(|e| TransportError::Io(e.to_string()))? {
            let driver = match p.port_type {
                SerialPortType::UsbPort(_) => "usb-serial",
                _ => "serial",
            };
            out.push(PortInfo {
                name: p.port_name,
                driver: driver.to_string(),
            });
        }
        Ok(out)
    }

    fn recv(&mut self, timeout_ms: Option<u64>) -> Result<HarpMessage> {
        if let Some(ms) = timeout_ms {
            if let Err(e) = self.port.set_timeout(Duration::from_millis(ms)) {
                warn!(error = %e, timeout_ms = ms, "failed to set serial timeout");
            }
        }
        loop {
            if let Some(res) = take_frame(&mut self.acc) {
                let mut msg = res?;
                msg.received_at = Some(Timestamp(OffsetDateTime::now_utc()));
                return Ok(msg);
            }
            fill_from(&mut self.port, &mut self.acc)?;
        }
    }

    fn send(&mut self, message: &HarpMessage) -> Result<()> {
        self.port
            .write_all(&message.to_bytes()?)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Read one chunk from `reader` into `acc`.
///
/// A read that returns no bytes means the port timeout elapsed.
fn fill_from<R: Read + ?Sized>(reader: &mut R, acc: &mut Vec<u8>) -> Result<()> {
    let mut buf = [0u8; 256];
    match reader.read(&mut buf) {
        Ok(0) => Err(TransportError::Timeout),
        Ok(n) => {
            acc.extend_from_slice(&buf[..n]);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::TimedOut => Err(TransportError::Timeout),
        Err(e) => Err(TransportError::Io(e.to_string())),
    }
}

/// Try to take one complete frame off the front of the accumulator.
fn take_frame(acc: &mut Vec<u8>) -> Option<Result<HarpMessage>> {
    loop {
        if acc.is_empty() {
            return None;
        }
        match HarpMessage::parse(acc) {
            Ok((msg, used)) => {
                acc.drain(..used);
                return Some(Ok(msg));
            }
            Err(TransportError::InvalidFrame("short header" | "short frame")) => return None,
            Err(e) => {
                // Resync by dropping one byte; the stream may have started mid-frame.
                warn!(error = %e, "discarding byte while resyncing");
                acc.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PayloadType;
    use std::io;

    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::TimedOut, "stalled"))
        }
    }

    #[test]
    fn empty_read_is_a_timeout() {
        let mut acc = Vec::new();
        let mut drained: &[u8] = &[];
        assert!(matches!(
            fill_from(&mut drained, &mut acc),
            Err(TransportError::Timeout)
        ));
        assert!(matches!(
            fill_from(&mut Stalled, &mut acc),
            Err(TransportError::Timeout)
        ));
        assert!(acc.is_empty());
    }

    #[test]
    fn frames_reassemble_across_reads() {
        let frame = HarpMessage::write_u16(13, &[7]).to_bytes().unwrap();
        let mut wire = vec![0x00];
        wire.extend_from_slice(&frame);
        let (first, rest) = wire.split_at(3);

        let mut acc = Vec::new();
        let mut reader = first;
        fill_from(&mut reader, &mut acc).unwrap();
        assert!(take_frame(&mut acc).is_none());

        let mut reader = rest;
        fill_from(&mut reader, &mut acc).unwrap();
        let msg = take_frame(&mut acc).unwrap().unwrap();
        assert_eq!(msg.address, 13);
        assert_eq!(msg.payload_type, PayloadType::U16);
        assert!(acc.is_empty());
    }
}
