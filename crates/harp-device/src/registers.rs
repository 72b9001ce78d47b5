use crate::{DeviceError, Result};
use core::fmt;
use harp_transport::PayloadType;
use serde::{Deserialize, Serialize};

/// How a register can be touched on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    Event,
}

const R: &[Access] = &[Access::Read];
const RW: &[Access] = &[Access::Read, Access::Write];
const RWE: &[Access] = &[Access::Read, Access::Write, Access::Event];
const RE: &[Access] = &[Access::Read, Access::Event];

/// Registers shared by every Harp device (addresses 0..=19).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegisterType {
    WhoAmI,
    HardwareVersionHigh,
    HardwareVersionLow,
    AssemblyVersion,
    CoreVersionHigh,
    CoreVersionLow,
    FirmwareVersionHigh,
    FirmwareVersionLow,
    TimestampSeconds,
    TimestampMicroseconds,
    OperationControl,
    ResetDevice,
    DeviceName,
    SerialNumber,
    ClockConfiguration,
    TimestampOffset,
    UniqueId,
    Tag,
    Heartbeat,
    Version,
}

impl RegisterType {
    pub fn address(self) -> u8 {
        self as u8
    }

    pub fn payload_type(self) -> PayloadType {
        match self {
            Self::WhoAmI
            | Self::TimestampMicroseconds
            | Self::SerialNumber
            | Self::Heartbeat => PayloadType::U16,
            Self::TimestampSeconds => PayloadType::U32,
            _ => PayloadType::U8,
        }
    }

    /// Number of payload elements the register holds.
    pub fn length(self) -> usize {
        match self {
            Self::DeviceName => 25,
            Self::UniqueId => 16,
            Self::Tag => 8,
            Self::Version => 32,
            _ => 1,
        }
    }

    pub fn access(self) -> &'static [Access] {
        match self {
            Self::TimestampSeconds => RWE,
            Self::Heartbeat => RE,
            Self::OperationControl
            | Self::ResetDevice
            | Self::DeviceName
            | Self::SerialNumber
            | Self::ClockConfiguration
            | Self::TimestampOffset => RW,
            _ => R,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WhoAmI => "WhoAmI",
            Self::HardwareVersionHigh => "HardwareVersionHigh",
            Self::HardwareVersionLow => "HardwareVersionLow",
            Self::AssemblyVersion => "AssemblyVersion",
            Self::CoreVersionHigh => "CoreVersionHigh",
            Self::CoreVersionLow => "CoreVersionLow",
            Self::FirmwareVersionHigh => "FirmwareVersionHigh",
            Self::FirmwareVersionLow => "FirmwareVersionLow",
            Self::TimestampSeconds => "TimestampSeconds",
            Self::TimestampMicroseconds => "TimestampMicroseconds",
            Self::OperationControl => "OperationControl",
            Self::ResetDevice => "ResetDevice",
            Self::DeviceName => "DeviceName",
            Self::SerialNumber => "SerialNumber",
            Self::ClockConfiguration => "ClockConfiguration",
            Self::TimestampOffset => "TimestampOffset",
            Self::UniqueId => "UniqueId",
            Self::Tag => "Tag",
            Self::Heartbeat => "Heartbeat",
            Self::Version => "Version",
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Ordered by address; `RegisterType as u8` is the address.
const CORE_REGISTERS: &[RegisterType] = &[
    RegisterType::WhoAmI,
    RegisterType::HardwareVersionHigh,
    RegisterType::HardwareVersionLow,
    RegisterType::AssemblyVersion,
    RegisterType::CoreVersionHigh,
    RegisterType::CoreVersionLow,
    RegisterType::FirmwareVersionHigh,
    RegisterType::FirmwareVersionLow,
    RegisterType::TimestampSeconds,
    RegisterType::TimestampMicroseconds,
    RegisterType::OperationControl,
    RegisterType::ResetDevice,
    RegisterType::DeviceName,
    RegisterType::SerialNumber,
    RegisterType::ClockConfiguration,
    RegisterType::TimestampOffset,
    RegisterType::UniqueId,
    RegisterType::Tag,
    RegisterType::Heartbeat,
    RegisterType::Version,
];

/// Read-only mapping from register address to register type.
///
/// Backed by a static table sorted by address, so it can never change after
/// compilation.
#[derive(Clone, Copy, Debug)]
pub struct RegisterMap {
    entries: &'static [RegisterType],
}

impl RegisterMap {
    /// The registers every Harp device implements.
    pub const fn core() -> Self {
        Self {
            entries: CORE_REGISTERS,
        }
    }

    pub fn get(&self, address: u8) -> Option<RegisterType> {
        self.entries
            .binary_search_by_key(&address, |r| r.address())
            .ok()
            .map(|i| self.entries[i])
    }

    /// Like [`get`](Self::get) but an absent address is an error.
    pub fn lookup(&self, address: u8) -> Result<RegisterType> {
        self.get(address).ok_or(DeviceError::UnknownAddress(address))
    }

    pub fn contains(&self, address: u8) -> bool {
        self.get(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, RegisterType)> + '_ {
        self.entries.iter().map(|r| (r.address(), *r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_and_dense() {
        for (i, (addr, reg)) in RegisterMap::core().iter().enumerate() {
            assert_eq!(usize::from(addr), i);
            assert_eq!(reg.address(), addr);
        }
        assert_eq!(RegisterMap::core().len(), 20);
    }

    #[test]
    fn lookup_known_and_unknown() {
        let map = RegisterMap::core();
        assert_eq!(map.get(8), Some(RegisterType::TimestampSeconds));
        assert_eq!(map.lookup(18).unwrap(), RegisterType::Heartbeat);
        assert!(matches!(map.lookup(32), Err(DeviceError::UnknownAddress(32))));
    }

    #[test]
    fn register_shapes() {
        assert_eq!(RegisterType::WhoAmI.payload_type(), PayloadType::U16);
        assert_eq!(RegisterType::DeviceName.length(), 25);
        assert!(RegisterType::Heartbeat.access().contains(&Access::Event));
        assert_eq!(RegisterType::Version.to_string(), "Version");
    }
}
