//! Device registry.
//!
//! The device set is fixed at start-up. Lookups are linear scans, which is
//! fine for the tens of devices a single gateway serves.

use log::warn;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Device, Session};
use crate::lorawan::{DevAddr, Eui64};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two devices share a name.
    DuplicateName(String),
    /// No device matches the lookup key.
    UnknownDevice(String),
    /// Join result applied to a device that does not use OTAA.
    NotOtaa(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => write!(f, "duplicate device name: {}", name),
            RegistryError::UnknownDevice(key) => write!(f, "unknown device: {}", key),
            RegistryError::NotOtaa(name) => write!(f, "device {} is not an OTAA device", name),
        }
    }
}

impl std::error::Error for RegistryError {}

/// A registered device with its mutable session state.
#[derive(Debug)]
pub struct DeviceEntry {
    device: Device,
    session: RwLock<Option<Session>>,
    // Held across derive, build and commit of one join transaction.
    join_lock: tokio::sync::Mutex<()>,
}

impl DeviceEntry {
    fn new(device: Device) -> Self {
        let session = device.initial_session();
        Self {
            device,
            session: RwLock::new(session),
            join_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.device.name
    }

    /// Current session, if the device has joined (or is ABP).
    pub fn session(&self) -> Option<Session> {
        self.read_session().clone()
    }

    pub(crate) fn join_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.join_lock
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        match self.session.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Session lock for {} was poisoned, recovering", self.device.name);
                poisoned.into_inner()
            }
        }
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        match self.session.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Session lock for {} was poisoned, recovering", self.device.name);
                poisoned.into_inner()
            }
        }
    }
}

/// The set of configured devices.
#[derive(Debug)]
pub struct DeviceRegistry {
    entries: Vec<DeviceEntry>,
}

impl DeviceRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new(devices: Vec<Device>) -> Result<Self, RegistryError> {
        let mut entries: Vec<DeviceEntry> = Vec::with_capacity(devices.len());
        for device in devices {
            if entries.iter().any(|e| e.device.name == device.name) {
                return Err(RegistryError::DuplicateName(device.name));
            }
            entries.push(DeviceEntry::new(device));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find a device by its big-endian DevEUI.
    ///
    /// Callers holding wire bytes convert with [`Eui64::from_wire`] first.
    pub fn lookup_by_dev_eui(&self, dev_eui: &Eui64) -> Result<&DeviceEntry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.device.dev_eui.as_ref() == Some(dev_eui))
            .ok_or_else(|| RegistryError::UnknownDevice(dev_eui.to_string()))
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<&DeviceEntry, RegistryError> {
        self.entries
            .iter()
            .find(|e| e.device.name == name)
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
    }

    /// Find the device currently holding `dev_addr`, with a copy of its session.
    ///
    /// Addresses are not guaranteed unique; the first match wins.
    pub fn lookup_by_dev_addr(&self, dev_addr: &DevAddr) -> Option<(&DeviceEntry, Session)> {
        self.entries.iter().find_map(|e| {
            let session = e.session()?;
            (session.dev_addr == *dev_addr).then_some((e, session))
        })
    }

    /// Replace an OTAA device's session with the result of a join.
    pub fn apply_join_result(&self, name: &str, session: Session) -> Result<(), RegistryError> {
        let entry = self.lookup_by_name(name)?;
        if !entry.device.is_otaa() {
            return Err(RegistryError::NotOtaa(name.to_string()));
        }
        *entry.write_session() = Some(session);
        Ok(())
    }

    /// Current session of a device.
    pub fn session(&self, name: &str) -> Result<Option<Session>, RegistryError> {
        Ok(self.lookup_by_name(name)?.session())
    }
}
