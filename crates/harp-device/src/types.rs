use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parsed form of a Harp `device.yml` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    pub device: String,
    pub who_am_i: u16,
    pub firmware_version: String,
    pub hardware_targets: String,
    #[serde(default)]
    pub registers: BTreeMap<String, RegisterSpec>,
    #[serde(default)]
    pub bit_masks: BTreeMap<String, MaskSpec>,
    #[serde(default)]
    pub group_masks: BTreeMap<String, MaskSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpec {
    pub address: u8,
    #[serde(rename = "type")]
    pub payload_type: String,
    #[serde(default)]
    pub length: Option<u32>,
    pub access: AccessSpec,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mask_type: Option<String>,
}

/// `access: Read` or `access: [Read, Event]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum AccessSpec {
    One(String),
    Many(Vec<String>),
}

impl AccessSpec {
    pub fn modes(&self) -> Vec<&str> {
        match self {
            AccessSpec::One(s) => vec![s.as_str()],
            AccessSpec::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MaskSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bits: BTreeMap<String, MaskBit>,
    #[serde(default)]
    pub values: BTreeMap<String, MaskBit>,
}

/// `DI0: 0x1` or `DI0: { value: 0x1, description: ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum MaskBit {
    Value(u64),
    Detailed {
        value: u64,
        #[serde(default)]
        description: Option<String>,
    },
}

impl MaskBit {
    pub fn value(&self) -> u64 {
        match self {
            MaskBit::Value(v) | MaskBit::Detailed { value: v, .. } => *v,
        }
    }
}
