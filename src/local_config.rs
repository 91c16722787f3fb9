//! Local failover and snapshot files for disaster recovery
//!
//! Failover files are placed by an operator to pin a value; snapshot files
//! are best-effort copies of the last value the server returned.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use crate::model::{ConfigKey, LocalConfigData, PUBLIC_TENANT};

/// Reads and writes the per-key failover and snapshot files.
pub struct LocalConfigInfoProcessor {
    base_path: PathBuf,
    enabled: bool,
}

impl LocalConfigInfoProcessor {
    pub fn new(base_path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            base_path: base_path.into(),
            enabled,
        }
    }

    /// Operator-placed override for a config. `None` when absent or disabled.
    pub fn get_failover(&self, key: &ConfigKey) -> Option<LocalConfigData> {
        if !self.enabled {
            return None;
        }
        read_local(&self.failover_file(key))
    }

    /// Last server value persisted for a config. `None` when absent or disabled.
    pub fn get_snapshot(&self, key: &ConfigKey) -> Option<LocalConfigData> {
        if !self.enabled {
            return None;
        }
        read_local(&self.snapshot_file(key))
    }

    /// Persist the snapshot for a config.
    ///
    /// `None` content clears the snapshot by writing an empty file, so later
    /// reads see "absent" without the storage layer ever unlinking.
    /// Failures are logged and swallowed: persistence is best-effort.
    pub fn save_snapshot(&self, key: &ConfigKey, content: Option<&str>) {
        if !self.enabled {
            return;
        }
        let file = self.snapshot_file(key);
        if let Some(parent) = file.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "snapshot directory creation failed");
                return;
            }
        }
        if let Err(e) = fs::write(&file, content.unwrap_or_default()) {
            warn!(path = %file.display(), error = %e, "snapshot write failed");
        } else {
            debug!(key = %key, path = %file.display(), "snapshot saved");
        }
    }

    fn failover_file(&self, key: &ConfigKey) -> PathBuf {
        self.base_path
            .join("data")
            .join("config-data")
            .join(tenant_dir(&key.tenant))
            .join(&key.group)
            .join(&key.data_id)
    }

    fn snapshot_file(&self, key: &ConfigKey) -> PathBuf {
        self.base_path
            .join("snapshot")
            .join(tenant_dir(&key.tenant))
            .join(&key.group)
            .join(&key.data_id)
    }
}

fn tenant_dir(tenant: &str) -> &str {
    if tenant.is_empty() {
        PUBLIC_TENANT
    } else {
        tenant
    }
}

/// Read a local config file; missing files and read errors yield `None`.
fn read_local(path: &Path) -> Option<LocalConfigData> {
    if !path.exists() {
        return None;
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "local config read failed");
            return None;
        }
    };
    let last_modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Some(LocalConfigData {
        content,
        last_modified,
    })
}
