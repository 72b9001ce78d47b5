//! harp-device: register map, metadata and message grouping for the Harp
//! ClockSynchronizer device

mod error;
pub use error::{DeviceError, Result};

mod registers;
pub use registers::{Access, RegisterMap, RegisterType};

mod types;
pub use types::*;

mod device;
pub use device::{
    get_metadata, validate_metadata, ClockSynchronizer, ElementCategory, ElementInfo, ELEMENTS,
    FIRST_APP_ADDRESS, METADATA,
};

mod link;
pub use link::{DeviceLink, REPLY_TIMEOUT_MS};

mod loader;
pub use loader::{load_metadata_file, load_metadata_dir, MetadataRegistry};

mod metrics;
pub use metrics::{DeviceMetrics, MetricsHub};

mod group;
pub use group::{group_by_register, group_messages, GroupByRegister, RegisterGroup};

mod decode;
pub use decode::{
    decode_register, ClockConfiguration, OperationControl, OperationMode, RegisterRecord,
    RegisterValue,
};
