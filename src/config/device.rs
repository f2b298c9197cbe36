//! Per-device configuration.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::ConfigError;
use crate::device::Device;
use crate::lorawan::{AesKey, DevAddr, Eui64, KEY_SIZE};

/// Join type string for over-the-air activation (the default).
pub const JOIN_TYPE_OTAA: &str = "OTAA";

/// Join type string for activation by personalization.
pub const JOIN_TYPE_ABP: &str = "ABP";

/// One device entry from the configuration file.
///
/// Keys and identifiers are hex strings in big-endian order, as printed on
/// device labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    /// `"OTAA"`, `"ABP"`, or empty for OTAA.
    #[serde(default)]
    pub join_type: String,
    #[serde(default)]
    pub decoder_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_eui: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_s_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_s_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_addr: Option<String>,
}

impl DeviceConfig {
    /// Check the entry without building a device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_device().map(|_| ())
    }

    /// Build the device this entry describes.
    pub fn to_device(&self) -> Result<Device, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.decoder_path.is_empty() {
            return Err(ConfigError::MissingDecoderPath {
                device: self.name.clone(),
            });
        }

        match self.join_type.as_str() {
            "" | JOIN_TYPE_OTAA => {
                let dev_eui: [u8; 8] = self.hex_field("dev_eui", self.dev_eui.as_deref())?;
                let app_key = self.key_field("app_key", self.app_key.as_deref())?;
                Ok(Device::otaa(
                    &self.name,
                    &self.decoder_path,
                    Eui64::new(dev_eui),
                    app_key,
                ))
            }
            JOIN_TYPE_ABP => {
                let app_s_key = self.key_field("app_s_key", self.app_s_key.as_deref())?;
                let nwk_s_key = self.key_field("network_s_key", self.network_s_key.as_deref())?;
                let dev_addr: [u8; 4] = self.hex_field("dev_addr", self.dev_addr.as_deref())?;
                let device = Device::abp(
                    &self.name,
                    &self.decoder_path,
                    DevAddr::new(dev_addr),
                    app_s_key,
                    nwk_s_key,
                );
                match self.dev_eui.as_deref() {
                    Some(eui) => {
                        let eui: [u8; 8] = self.hex_field("dev_eui", Some(eui))?;
                        Ok(device.with_dev_eui(Eui64::new(eui)))
                    }
                    None => Ok(device),
                }
            }
            other => Err(ConfigError::UnknownJoinType {
                device: self.name.clone(),
                value: other.to_string(),
            }),
        }
    }

    fn hex_field<const N: usize>(
        &self,
        field: &'static str,
        value: Option<&str>,
    ) -> Result<[u8; N], ConfigError> {
        let value = value.ok_or_else(|| ConfigError::MissingField {
            device: self.name.clone(),
            field,
        })?;
        if value.len() != N * 2 {
            return Err(ConfigError::InvalidLength {
                device: self.name.clone(),
                field,
                expected: N * 2,
                actual: value.len(),
            });
        }
        let mut out = [0u8; N];
        hex::decode_to_slice(value, &mut out).map_err(|_| ConfigError::InvalidHex {
            device: self.name.clone(),
            field,
        })?;
        Ok(out)
    }

    fn key_field(&self, field: &'static str, value: Option<&str>) -> Result<AesKey, ConfigError> {
        let mut bytes: [u8; KEY_SIZE] = self.hex_field(field, value)?;
        let key = AesKey::new(bytes);
        bytes.zeroize();
        Ok(key)
    }
}
