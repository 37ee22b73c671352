//! Compute device names as they appear in `device:` fields.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named compute device. Only the syntax is checked; whether the device
/// exists on this machine is up to the stage that uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    Cpu,
    /// `cuda` or `cuda:<index>`.
    Cuda(Option<u32>),
    Mps,
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(None)),
            "mps" => Ok(Device::Mps),
            _ => name
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse::<u32>().ok())
                .map(|idx| Device::Cuda(Some(idx)))
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "device",
                        format!("unknown device `{}` (expected cpu, cuda, cuda:<index> or mps)", s),
                    )
                }),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(None) => f.write_str("cuda"),
            Device::Cuda(Some(idx)) => write!(f, "cuda:{}", idx),
            Device::Mps => f.write_str("mps"),
        }
    }
}
