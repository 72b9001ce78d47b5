use crate::types::DeviceMetadata;
use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone)]
pub struct MetadataRegistry {
    pub devices: HashMap<String, DeviceMetadata>,
}

impl MetadataRegistry {
    pub fn insert(&mut self, desc: DeviceMetadata) {
        self.devices.insert(desc.device.clone(), desc);
    }

    pub fn by_who_am_i(&self, who_am_i: u16) -> Option<&DeviceMetadata> {
        self.devices.values().find(|d| d.who_am_i == who_am_i)
    }
}

pub fn load_metadata_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceMetadata> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading metadata: {}", path.display()))?;
    let desc: DeviceMetadata = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing metadata: {}", path.display()))?;
    crate::validate_metadata(&desc, desc.who_am_i)
        .with_context(|| format!("validating metadata: {}", path.display()))?;
    Ok(desc)
}

pub fn load_metadata_dir(dir: impl AsRef<Path>) -> anyhow::Result<MetadataRegistry> {
    let mut reg = MetadataRegistry::default();
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        let desc = load_metadata_file(&p)?;
        reg.insert(desc);
    }
    Ok(reg)
}
