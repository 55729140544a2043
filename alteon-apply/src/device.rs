//! Parsing of device descriptors.
use std::path::PathBuf;

use alteon_device_local::LocalDevice;
use anyhow::{bail, Context, Result};
use serde_json::Value;

/// A `type: "local"` device: a journal file on this machine.
#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct DeviceLocal {
    #[serde(rename = "type")]
    type_: String,
    pub(crate) path: PathBuf,
}

impl DeviceLocal {
    pub(crate) fn at(path: PathBuf) -> Self {
        DeviceLocal {
            type_: "local".to_string(),
            path,
        }
    }

    pub(crate) fn open(&self) -> Result<LocalDevice> {
        LocalDevice::open(&self.path)
            .with_context(|| format!("opening local device {}", self.path.display()))
    }
}

pub(crate) fn parse_device(device_value: &Value) -> Result<DeviceLocal> {
    let device = device_value
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("Device must be an object"))?;
    let type_ = device
        .get("type")
        .ok_or_else(|| anyhow::anyhow!("Device must have a type"))?;
    let type_ = type_
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Device type must be a string"))?;
    match type_ {
        "local" => serde_json::from_value(device_value.clone()).map_err(|e| e.into()),
        _ => {
            bail!("Unknown device type: {}", type_);
        }
    }
}
