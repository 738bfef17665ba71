// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License provider seam and the file-backed default.
//!
//! The provider hides where license truth lives. The default reads and
//! writes a single JSON file; its format is opaque to everything above
//! this module.

use crate::status::{LicenseInfo, LicenseStatus};
use async_trait::async_trait;
use pulse_core::{ErrorKind, SharedClock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const LICENSE_TERM_DAYS: i64 = 365;
const MS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("license service unreachable: {0}")]
    Unreachable(String),

    #[error("invalid license key: {0}")]
    InvalidKey(String),

    #[error("license already activated with this key")]
    AlreadyActivated,

    #[error("license storage error: {0}")]
    Storage(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Unreachable(_) => ErrorKind::Unavailable,
            ProviderError::InvalidKey(_) => ErrorKind::Validation,
            ProviderError::AlreadyActivated => ErrorKind::Conflict,
            ProviderError::Storage(_) => ErrorKind::Unavailable,
        }
    }
}

/// Source of license truth.
#[async_trait]
pub trait LicenseProvider: Send + Sync {
    /// Fresh status for the given machine.
    async fn check(&self, machine_id: &str) -> Result<LicenseInfo, ProviderError>;

    /// Activate a license key; returns the resulting status.
    async fn activate(&self, key: &str, email: Option<&str>)
        -> Result<LicenseInfo, ProviderError>;
}

/// On-disk license record. Opaque outside this module.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LicenseFile {
    license_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    activated_at_ms: u64,
    expires_at_ms: u64,
    #[serde(default)]
    revoked: bool,
}

/// File-backed provider for a single-machine install.
pub struct FileProvider {
    path: PathBuf,
    clock: SharedClock,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        Self { path: path.into(), clock }
    }

    async fn read(&self) -> Result<Option<LicenseFile>, ProviderError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ProviderError::Storage(format!("corrupt license file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProviderError::Storage(e.to_string())),
        }
    }

    async fn write(&self, file: &LicenseFile) -> Result<(), ProviderError> {
        let bytes = serde_json::to_vec_pretty(file)
            .map_err(|e| ProviderError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::Storage(e.to_string()))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| ProviderError::Storage(e.to_string()))
    }

    fn info_for(&self, file: &LicenseFile) -> LicenseInfo {
        if file.revoked {
            return LicenseInfo::new(LicenseStatus::Revoked, None, "license has been revoked");
        }
        let now = self.clock.epoch_ms() as i64;
        let days_left = (file.expires_at_ms as i64 - now).div_euclid(MS_PER_DAY);
        LicenseInfo::from_days_left(days_left)
    }
}

/// Key shape: dash-separated alphanumeric groups, 16 chars minimum.
fn validate_key(key: &str) -> Result<(), ProviderError> {
    let ok = key.len() >= 16
        && key.split('-').count() >= 3
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !key.split('-').any(str::is_empty);
    if ok {
        Ok(())
    } else {
        Err(ProviderError::InvalidKey("expected dash-separated alphanumeric groups".to_string()))
    }
}

#[async_trait]
impl LicenseProvider for FileProvider {
    async fn check(&self, _machine_id: &str) -> Result<LicenseInfo, ProviderError> {
        match self.read().await? {
            Some(file) => Ok(self.info_for(&file)),
            None => Ok(LicenseInfo::new(
                LicenseStatus::NotActivated,
                None,
                "no license on this machine",
            )),
        }
    }

    async fn activate(
        &self,
        key: &str,
        email: Option<&str>,
    ) -> Result<LicenseInfo, ProviderError> {
        validate_key(key)?;

        if let Some(existing) = self.read().await? {
            if existing.license_key == key && !existing.revoked {
                return Err(ProviderError::AlreadyActivated);
            }
        }

        let now = self.clock.epoch_ms();
        let file = LicenseFile {
            license_key: key.to_string(),
            email: email.map(str::to_string),
            activated_at_ms: now,
            expires_at_ms: now + (LICENSE_TERM_DAYS * MS_PER_DAY) as u64,
            revoked: false,
        };
        self.write(&file).await?;
        tracing::info!(path = %self.path.display(), "license activated");
        Ok(self.info_for(&file))
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
