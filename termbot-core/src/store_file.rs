//! JSON file backend for [`AccessStore`].
//!
//! Writes go to a temp file in the target's directory which is flushed,
//! synced and then renamed over the target, so a crash mid-write leaves the
//! previous file in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::store::AccessStore;
use crate::types::GatewayConfig;

/// Access configuration stored as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct FileAccessStore {
    path: PathBuf,
}

impl FileAccessStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AccessStore for FileAccessStore {
    async fn load(&self) -> Result<GatewayConfig, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_config(&path))
            .await
            .map_err(|e| StoreError::ConfigCorrupt {
                reason: format!("load task failed: {e}"),
            })?
    }

    async fn persist(&self, config: &GatewayConfig) -> Result<(), StoreError> {
        let bytes = encode(config)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::PersistFailure {
                reason: format!("persist task failed: {e}"),
            })?
    }
}

fn read_config(path: &Path) -> Result<GatewayConfig, StoreError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::ConfigMissing {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(StoreError::ConfigCorrupt {
                reason: format!("{}: {e}", path.display()),
            })
        }
    };

    let config: GatewayConfig =
        serde_json::from_slice(&raw).map_err(|e| StoreError::ConfigCorrupt {
            reason: format!("{}: {e}", path.display()),
        })?;
    config
        .validate()
        .map_err(|reason| StoreError::ConfigCorrupt { reason })?;
    Ok(config)
}

/// Serialize with 4-space indentation, matching files written by the installer.
fn encode(config: &GatewayConfig) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    config
        .serialize(&mut ser)
        .map_err(|e| StoreError::PersistFailure {
            reason: format!("encode failed: {e}"),
        })?;
    buf.push(b'\n');
    Ok(buf)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let fail = |stage: &str, e: &dyn std::fmt::Display| StoreError::PersistFailure {
        reason: format!("{stage} {}: {e}", path.display()),
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut temp =
        tempfile::NamedTempFile::new_in(parent).map_err(|e| fail("create temp for", &e))?;
    temp.write_all(bytes)
        .map_err(|e| fail("write temp for", &e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| fail("sync temp for", &e))?;
    temp.persist(path)
        .map_err(|e| fail("rename temp over", &e.error))?;

    sync_dir(parent);
    Ok(())
}

/// Make the rename itself durable. Best effort.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
