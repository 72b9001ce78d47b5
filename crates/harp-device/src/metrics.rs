use crate::Result;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

#[derive(Clone)]
pub struct DeviceMetrics {
    pub messages_grouped: IntCounter,
    pub groups_opened: IntCounter,
    pub unknown_addresses: IntCounter,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub dev: DeviceMetrics,
}

impl MetricsHub {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let dev = DeviceMetrics {
            messages_grouped: IntCounter::new(
                "harp_messages_grouped",
                "Messages routed into a register group",
            )?,
            groups_opened: IntCounter::new("harp_groups_opened", "Register groups opened")?,
            unknown_addresses: IntCounter::new(
                "harp_unknown_addresses",
                "Messages rejected for an address missing from the register map",
            )?,
        };
        registry.register(Box::new(dev.messages_grouped.clone()))?;
        registry.register(Box::new(dev.groups_opened.clone()))?;
        registry.register(Box::new(dev.unknown_addresses.clone()))?;
        Ok(Self { registry, dev })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
