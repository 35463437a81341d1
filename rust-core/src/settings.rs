//! User settings record and the stores that hold it.
//!
//! The record is small and flat. It is read at startup and again at every
//! arming (the result is snapshotted into a [`UserProfile`] for the cycle),
//! and written back when the user edits it or toggles detection.

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::channel::ChannelKind;
use crate::error::{SosError, SosResult, ValidationError};
use crate::types::{SenderCredential, UserProfile};

/// Minimum length of a phone-number contact.
pub const MIN_PHONE_LEN: usize = 10;

/// The persisted settings record.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsRecord {
    pub display_name: String,
    /// Phone number (SMS) or email address (email) of the contact.
    pub emergency_contact: String,
    /// Address alerts are sent from. Email only.
    pub sender_email: String,
    /// App password for the sender address. Email only.
    pub sender_credential: String,
    /// Whether shake detection should run.
    pub service_enabled: bool,
}

impl SettingsRecord {
    /// Validate the record for `kind` and build the cycle's profile.
    ///
    /// Values are trimmed first. Rules:
    /// - name is non-empty
    /// - SMS: contact is at least [`MIN_PHONE_LEN`] characters
    /// - Email: contact contains `@`, sender address and credential are present
    pub fn profile(&self, kind: ChannelKind) -> Result<UserProfile, ValidationError> {
        let name = self.display_name.trim();
        let contact = self.emergency_contact.trim();

        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if contact.is_empty() {
            return Err(ValidationError::EmptyContact);
        }

        let sender = match kind {
            ChannelKind::Sms => {
                if contact.chars().count() < MIN_PHONE_LEN {
                    return Err(ValidationError::InvalidPhone(contact.to_string()));
                }
                None
            }
            ChannelKind::Email => {
                if !is_email_like(contact) {
                    return Err(ValidationError::InvalidEmail(contact.to_string()));
                }
                let address = self.sender_email.trim();
                if address.is_empty() {
                    return Err(ValidationError::MissingSender);
                }
                if !is_email_like(address) {
                    return Err(ValidationError::InvalidEmail(address.to_string()));
                }
                let secret = self.sender_credential.trim();
                if secret.is_empty() {
                    return Err(ValidationError::MissingCredential);
                }
                Some(SenderCredential {
                    address: address.to_string(),
                    secret: secret.to_string(),
                })
            }
        };

        Ok(UserProfile {
            display_name: name.to_string(),
            emergency_contact: contact.to_string(),
            sender,
        })
    }
}

impl fmt::Debug for SettingsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsRecord")
            .field("display_name", &self.display_name)
            .field("emergency_contact", &self.emergency_contact)
            .field("sender_email", &self.sender_email)
            .field("sender_credential", &"<redacted>")
            .field("service_enabled", &self.service_enabled)
            .finish()
    }
}

fn is_email_like(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

/// Source of the settings record.
///
/// `load` returns a copy; callers never hold a reference into the store.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> SosResult<SettingsRecord>;
    fn save(&self, record: &SettingsRecord) -> SosResult<()>;
}

/// In-memory store. Used by tests and the demo binary.
#[derive(Debug, Default)]
pub struct MemorySettings {
    record: RwLock<SettingsRecord>,
}

impl MemorySettings {
    pub fn new(record: SettingsRecord) -> Self {
        Self {
            record: RwLock::new(record),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> SosResult<SettingsRecord> {
        Ok(self.record.read().clone())
    }

    fn save(&self, record: &SettingsRecord) -> SosResult<()> {
        *self.record.write() = record.clone();
        Ok(())
    }
}

/// JSON file store. A missing file loads as the default record.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettings {
    fn load(&self) -> SosResult<SettingsRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no settings file, using defaults");
                return Ok(SettingsRecord::default());
            }
            Err(e) => {
                return Err(SosError::Settings(format!(
                    "read {}: {e}",
                    self.path.display()
                )))
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| SosError::Settings(format!("parse {}: {e}", self.path.display())))
    }

    fn save(&self, record: &SettingsRecord) -> SosResult<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| SosError::Settings(format!("encode settings: {e}")))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SosError::Settings(format!("create {}: {e}", parent.display())))?;
            }
        }
        std::fs::write(&self.path, json)
            .map_err(|e| SosError::Settings(format!("write {}: {e}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}
