//! Configured end devices and their session state.

mod registry;

pub use registry::{DeviceEntry, DeviceRegistry, RegistryError};

use crate::lorawan::{AesKey, DevAddr, Eui64};

/// How a device obtains its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinMode {
    /// Over-the-air activation: the session is derived from `app_key` on join.
    Otaa { app_key: AesKey },
    /// Activation by personalization: the session is provisioned up front.
    Abp {
        dev_addr: DevAddr,
        app_s_key: AesKey,
        nwk_s_key: AesKey,
    },
}

/// Session established by a join (or provisioned for ABP).
///
/// Always replaced as a whole so readers never see fields from two joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub dev_addr: DevAddr,
    pub app_s_key: AesKey,
    pub nwk_s_key: AesKey,
}

/// One configured end device. Identity and keys are immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub decoder_path: String,
    pub dev_eui: Option<Eui64>,
    pub mode: JoinMode,
}

impl Device {
    /// An OTAA device, joinable by its DevEUI.
    pub fn otaa(
        name: impl Into<String>,
        decoder_path: impl Into<String>,
        dev_eui: Eui64,
        app_key: AesKey,
    ) -> Self {
        Self {
            name: name.into(),
            decoder_path: decoder_path.into(),
            dev_eui: Some(dev_eui),
            mode: JoinMode::Otaa { app_key },
        }
    }

    /// An ABP device with a provisioned session.
    pub fn abp(
        name: impl Into<String>,
        decoder_path: impl Into<String>,
        dev_addr: DevAddr,
        app_s_key: AesKey,
        nwk_s_key: AesKey,
    ) -> Self {
        Self {
            name: name.into(),
            decoder_path: decoder_path.into(),
            dev_eui: None,
            mode: JoinMode::Abp {
                dev_addr,
                app_s_key,
                nwk_s_key,
            },
        }
    }

    /// Attach a DevEUI (optional for ABP devices).
    pub fn with_dev_eui(mut self, dev_eui: Eui64) -> Self {
        self.dev_eui = Some(dev_eui);
        self
    }

    /// AppKey for OTAA devices.
    pub fn app_key(&self) -> Option<&AesKey> {
        match &self.mode {
            JoinMode::Otaa { app_key } => Some(app_key),
            JoinMode::Abp { .. } => None,
        }
    }

    pub fn is_otaa(&self) -> bool {
        matches!(self.mode, JoinMode::Otaa { .. })
    }

    /// The session a device starts with: none for OTAA, the provisioned one for ABP.
    pub(crate) fn initial_session(&self) -> Option<Session> {
        match &self.mode {
            JoinMode::Otaa { .. } => None,
            JoinMode::Abp {
                dev_addr,
                app_s_key,
                nwk_s_key,
            } => Some(Session {
                dev_addr: *dev_addr,
                app_s_key: app_s_key.clone(),
                nwk_s_key: nwk_s_key.clone(),
            }),
        }
    }
}
