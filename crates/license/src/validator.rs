// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! License validation with a short-lived cache, single-flight probes,
//! and graceful degradation.
//!
//! Hot path: one mutex-guarded map lookup. A stale or missing entry
//! triggers one provider probe no matter how many requests arrive at
//! once; probe failure falls back to the last-success grace window.

use crate::provider::{LicenseProvider, ProviderError};
use crate::status::{LicenseInfo, LicenseStatus};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use pulse_core::SharedClock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Validation cache and probe tunables.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// How long a cached verdict stays fresh.
    pub cache_ttl: Duration,
    /// After a probe failure, admit as long as the last successful check
    /// is within this window.
    pub grace_window: Duration,
    /// Upper bound on one provider probe.
    pub probe_timeout: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            grace_window: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Why a request was not admitted. The code lands in redirect query
/// strings and problem bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Expired,
    NotActivated,
    Revoked,
    Unknown,
    NetworkUnavailable,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::Expired => "expired",
            DenyReason::NotActivated => "not_activated",
            DenyReason::Revoked => "revoked",
            DenyReason::Unknown => "unknown",
            DenyReason::NetworkUnavailable => "network_unavailable",
        }
    }

    fn from_status(status: LicenseStatus) -> Self {
        match status {
            LicenseStatus::Expired => DenyReason::Expired,
            LicenseStatus::NotActivated => DenyReason::NotActivated,
            LicenseStatus::Revoked => DenyReason::Revoked,
            // admitting statuses never reach here
            _ => DenyReason::Unknown,
        }
    }
}

/// Outcome of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Deny(DenyReason),
}

impl Decision {
    fn from_status(status: LicenseStatus) -> Self {
        if status.admits() {
            Decision::Admit
        } else {
            Decision::Deny(DenyReason::from_status(status))
        }
    }
}

struct CacheEntry {
    info: LicenseInfo,
    checked_at: Instant,
    last_success_at: Option<Instant>,
}

type ProbeFuture = Shared<BoxFuture<'static, Result<LicenseInfo, ProviderError>>>;

struct ValidatorInner {
    provider: Arc<dyn LicenseProvider>,
    clock: SharedClock,
    config: ValidatorConfig,
    cache: Mutex<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, ProbeFuture>>,
    probes: AtomicU64,
}

/// Cloneable validator handle.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<ValidatorInner>,
}

impl Validator {
    pub fn new(
        provider: Arc<dyn LicenseProvider>,
        clock: SharedClock,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ValidatorInner {
                provider,
                clock,
                config,
                cache: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
                probes: AtomicU64::new(0),
            }),
        }
    }

    /// Admit or deny a request for the given machine identity.
    pub async fn decide(&self, machine_id: &str) -> Decision {
        let now = self.inner.clock.now();

        if let Some(info) = self.fresh_cached(machine_id, now) {
            return Decision::from_status(info.status);
        }

        match self.probe(machine_id).await {
            Ok(info) => {
                let status = info.status;
                self.store(machine_id, info);
                Decision::from_status(status)
            }
            Err(err) => {
                let last_success = {
                    let cache = self.inner.cache.lock();
                    cache.get(machine_id).and_then(|e| e.last_success_at)
                };
                match last_success {
                    Some(at)
                        if self.inner.clock.now().duration_since(at)
                            < self.inner.config.grace_window =>
                    {
                        warn!(%err, "license probe failed, admitting within grace window");
                        Decision::Admit
                    }
                    _ => {
                        warn!(%err, "license probe failed outside grace window");
                        Decision::Deny(DenyReason::NetworkUnavailable)
                    }
                }
            }
        }
    }

    /// Current license info for the status endpoint. Never denies; an
    /// unreachable provider reports `Unknown`.
    pub async fn status(&self, machine_id: &str) -> LicenseInfo {
        let now = self.inner.clock.now();
        if let Some(info) = self.fresh_cached(machine_id, now) {
            return info;
        }
        match self.probe(machine_id).await {
            Ok(info) => {
                self.store(machine_id, info.clone());
                info
            }
            Err(err) => {
                debug!(%err, "license status probe failed");
                LicenseInfo::new(LicenseStatus::Unknown, None, "license service unreachable")
            }
        }
    }

    /// Activate a key and seed the cache with the fresh verdict.
    pub async fn activate(
        &self,
        machine_id: &str,
        key: &str,
        email: Option<&str>,
    ) -> Result<LicenseInfo, ProviderError> {
        let info = self.inner.provider.activate(key, email).await?;
        self.store(machine_id, info.clone());
        Ok(info)
    }

    /// Provider probes issued so far.
    pub fn probe_count(&self) -> u64 {
        self.inner.probes.load(Ordering::Relaxed)
    }

    fn fresh_cached(&self, machine_id: &str, now: Instant) -> Option<LicenseInfo> {
        let cache = self.inner.cache.lock();
        let entry = cache.get(machine_id)?;
        (now.duration_since(entry.checked_at) < self.inner.config.cache_ttl)
            .then(|| entry.info.clone())
    }

    fn store(&self, machine_id: &str, info: LicenseInfo) {
        let now = self.inner.clock.now();
        let mut cache = self.inner.cache.lock();
        let last_success_at = Some(now);
        cache.insert(
            machine_id.to_string(),
            CacheEntry { info, checked_at: now, last_success_at },
        );
    }

    /// One probe per key at a time: concurrent callers share the same
    /// in-flight future.
    fn probe(&self, machine_id: &str) -> ProbeFuture {
        let mut inflight = self.inner.inflight.lock();
        if let Some(existing) = inflight.get(machine_id) {
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let key = machine_id.to_string();
        let fut: ProbeFuture = async move {
            inner.probes.fetch_add(1, Ordering::Relaxed);
            let result =
                tokio::time::timeout(inner.config.probe_timeout, inner.provider.check(&key)).await;
            inner.inflight.lock().remove(&key);
            match result {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Unreachable("probe timed out".to_string())),
            }
        }
        .boxed()
        .shared();

        inflight.insert(machine_id.to_string(), fut.clone());
        fut
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
