use crate::{DeviceError, DeviceMetadata, RegisterMap, Result};
use futures_util::future::{self, Ready};
use futures_util::stream::{self, Once};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

/// Harp application registers start after the reserved core block.
pub const FIRST_APP_ADDRESS: u8 = 32;

/// Contents of the `device.yml` file describing the ClockSynchronizer registers.
pub const METADATA: &str = include_str!("../device.yml");

/// The Harp ClockSynchronizer device.
///
/// It adds no registers of its own; the register map is the Harp core set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockSynchronizer;

impl ClockSynchronizer {
    /// Unique identity class of the ClockSynchronizer device.
    pub const WHO_AM_I: u16 = 1152;

    pub const NAME: &'static str = "ClockSynchronizer";

    pub const REGISTER_MAP: RegisterMap = RegisterMap::core();

    pub fn register_map() -> RegisterMap {
        Self::REGISTER_MAP
    }

    pub fn metadata() -> &'static str {
        METADATA
    }

    /// Parsed metadata, validated against the identity constant on first use.
    pub fn descriptor() -> Result<&'static DeviceMetadata> {
        static DESCRIPTOR: OnceLock<DeviceMetadata> = OnceLock::new();
        if let Some(desc) = DESCRIPTOR.get() {
            return Ok(desc);
        }
        let desc: DeviceMetadata = serde_yaml::from_str(METADATA)?;
        validate_metadata(&desc, Self::WHO_AM_I)?;
        debug!(device = %desc.device, "parsed embedded metadata");
        Ok(DESCRIPTOR.get_or_init(|| desc))
    }
}

/// A stream yielding the metadata text exactly once.
///
/// Each call returns a fresh stream, so every subscriber sees the full text.
pub fn get_metadata() -> Once<Ready<&'static str>> {
    stream::once(future::ready(METADATA))
}

/// Check a parsed descriptor for identity and register address sanity.
pub fn validate_metadata(desc: &DeviceMetadata, who_am_i: u16) -> Result<()> {
    if desc.who_am_i != who_am_i {
        return Err(DeviceError::IdentityMismatch {
            expected: who_am_i,
            actual: desc.who_am_i,
        });
    }
    let mut seen = std::collections::HashSet::new();
    for (name, reg) in &desc.registers {
        if reg.address < FIRST_APP_ADDRESS {
            return Err(DeviceError::InvalidRegister {
                name: name.clone(),
                reason: "address overlaps core registers",
            });
        }
        if !seen.insert(reg.address) {
            return Err(DeviceError::InvalidRegister {
                name: name.clone(),
                reason: "duplicate address",
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ElementCategory {
    Source,
    Combinator,
}

/// A discoverable building block a host can list and instantiate.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ElementInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub category: ElementCategory,
}

pub const ELEMENTS: &[ElementInfo] = &[
    ElementInfo {
        name: "Device",
        description: "Generates events and processes commands for the ClockSynchronizer device.",
        category: ElementCategory::Source,
    },
    ElementInfo {
        name: "GetMetadata",
        description: "Returns the contents of the metadata file describing the ClockSynchronizer device registers.",
        category: ElementCategory::Source,
    },
    ElementInfo {
        name: "GroupByRegister",
        description: "Groups the sequence of ClockSynchronizer messages by register type.",
        category: ElementCategory::Combinator,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn identity_constant() {
        assert_eq!(ClockSynchronizer::WHO_AM_I, 1152);
    }

    #[test]
    fn elements_serialize_for_listing() {
        let json = serde_json::to_value(ELEMENTS).unwrap();
        assert_eq!(json[0]["name"], "Device");
        assert_eq!(json[2]["category"], "Combinator");
    }

    #[test]
    fn embedded_descriptor_parses() {
        let desc = ClockSynchronizer::descriptor().unwrap();
        assert_eq!(desc.device, ClockSynchronizer::NAME);
        assert_eq!(desc.who_am_i, ClockSynchronizer::WHO_AM_I);
        assert!(desc.registers.is_empty());
    }

    #[tokio::test]
    async fn metadata_emits_once_per_subscription() {
        for _ in 0..2 {
            let items: Vec<&str> = get_metadata().collect().await;
            assert_eq!(items, vec![METADATA]);
        }
    }

    #[test]
    fn mismatched_identity_rejected() {
        let desc: DeviceMetadata =
            serde_yaml::from_str("device: Other\nwhoAmI: 1\nfirmwareVersion: \"0.1\"\nhardwareTargets: \"1.0\"\n")
                .unwrap();
        assert!(matches!(
            validate_metadata(&desc, ClockSynchronizer::WHO_AM_I),
            Err(DeviceError::IdentityMismatch { actual: 1, .. })
        ));
    }
}
