//! The driver connection envelope.

use serde::Deserialize;
use serde_json::value::RawValue;

/// Connection info for a node's OBM: a driver type tag plus an opaque,
/// driver-specific payload.
///
/// The `info` payload is kept as raw JSON and handed to the driver verbatim;
/// nothing outside the driver interprets it.
#[derive(Debug, Deserialize)]
pub struct ConnInfo {
    /// The name of the driver to use.
    #[serde(rename = "type")]
    pub driver_type: String,

    /// Driver-specific connection info, uninterpreted.
    pub info: Box<RawValue>,
}

impl ConnInfo {
    /// Parse an envelope from its serialized form.
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// The raw bytes of the driver-specific payload.
    pub fn info_bytes(&self) -> &[u8] {
        self.info.get().as_bytes()
    }
}
