// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable storage of per-tenant credential bundles.
//!
//! Bundles live under `<base_dir>/<tenant_id>/creds.json`. Writes are
//! crash-safe (write to a temp file, then rename); purge removes the whole
//! tenant directory recursively and is idempotent. Tenant ids are already
//! filesystem-safe by construction ([`TenantId::new`]).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use wabridge_core::{BridgeError, CredentialBundle, TenantId};

const CREDS_FILE: &str = "creds.json";
const CREDS_TMP_FILE: &str = "creds.json.tmp";

/// Filesystem store for per-tenant credential bundles.
#[derive(Debug)]
pub struct CredentialStore {
    base_dir: PathBuf,
}

impl CredentialStore {
    /// Opens the store, creating the base directory.
    ///
    /// Failure here blocks every tenant and is fatal at process start.
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| BridgeError::Credential {
                message: format!(
                    "cannot create session directory `{}`",
                    base_dir.display()
                ),
                source: Some(e),
            })?;
        Ok(Self { base_dir })
    }

    /// The directory holding one tenant's bundle.
    pub fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.base_dir.join(tenant.as_str())
    }

    /// Loads the stored bundle, or `None` when the tenant has never paired.
    pub async fn load(&self, tenant: &TenantId) -> Result<Option<CredentialBundle>, BridgeError> {
        let path = self.tenant_dir(tenant).join(CREDS_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(CredentialBundle(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(read_error(&path, e)),
        }
    }

    /// Persists the bundle atomically (temp file + rename).
    pub async fn save(
        &self,
        tenant: &TenantId,
        bundle: &CredentialBundle,
    ) -> Result<(), BridgeError> {
        let dir = self.tenant_dir(tenant);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| write_error(&dir, e))?;

        let tmp = dir.join(CREDS_TMP_FILE);
        let path = dir.join(CREDS_FILE);
        tokio::fs::write(&tmp, bundle.as_bytes())
            .await
            .map_err(|e| write_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| write_error(&path, e))?;

        debug!(tenant = %tenant, bytes = bundle.as_bytes().len(), "credentials saved");
        Ok(())
    }

    /// Removes the tenant's entire directory. Idempotent: purging a tenant
    /// that was never stored succeeds.
    pub async fn purge(&self, tenant: &TenantId) -> Result<(), BridgeError> {
        let dir = self.tenant_dir(tenant);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(tenant = %tenant, "credentials purged");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Credential {
                message: format!("cannot purge `{}`", dir.display()),
                source: Some(e),
            }),
        }
    }

    /// Whether a bundle exists on disk for this tenant.
    pub async fn has_credentials(&self, tenant: &TenantId) -> bool {
        tokio::fs::try_exists(self.tenant_dir(tenant).join(CREDS_FILE))
            .await
            .unwrap_or(false)
    }
}

fn read_error(path: &Path, e: std::io::Error) -> BridgeError {
    BridgeError::Credential {
        message: format!("cannot read `{}`", path.display()),
        source: Some(e),
    }
}

fn write_error(path: &Path, e: std::io::Error) -> BridgeError {
    BridgeError::Credential {
        message: format!("cannot write `{}`", path.display()),
        source: Some(e),
    }
}
