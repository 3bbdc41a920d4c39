//! Free-trial / premium entitlement flags.
//!
//! Reads never fail: a store that cannot be read reports the flag as unset,
//! which blocks nobody on a first run and never grants premium.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Persisted entitlement flags.
pub trait EntitlementStore: Send + Sync {
    fn has_used_free_trial(&self) -> bool;

    fn is_premium(&self) -> bool;

    /// Idempotent; the flag only ever goes false → true.
    fn mark_free_trial_used(&self);

    /// Idempotent. Called only after an external payment confirmation.
    fn mark_premium(&self);

    /// Premium users always may; everyone else until the trial is spent.
    fn can_start_analysis(&self) -> bool {
        self.is_premium() || !self.has_used_free_trial()
    }
}

/// Process-local flags, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryEntitlements {
    used_free_trial: AtomicBool,
    premium: AtomicBool,
}

impl MemoryEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(used_free_trial: bool, premium: bool) -> Self {
        Self {
            used_free_trial: AtomicBool::new(used_free_trial),
            premium: AtomicBool::new(premium),
        }
    }
}

impl EntitlementStore for MemoryEntitlements {
    fn has_used_free_trial(&self) -> bool {
        self.used_free_trial.load(Ordering::Acquire)
    }

    fn is_premium(&self) -> bool {
        self.premium.load(Ordering::Acquire)
    }

    fn mark_free_trial_used(&self) {
        self.used_free_trial.store(true, Ordering::Release);
    }

    fn mark_premium(&self) {
        self.premium.store(true, Ordering::Release);
    }
}

/// On-disk layout of the flag file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FlagFile {
    used_free_trial: bool,
    is_premium: bool,
    updated_at: Option<DateTime<Utc>>,
}

/// Flags persisted as a small JSON document.
///
/// The file is read once on open and written through on every change.
/// Write failures are logged; the in-process flag still changes.
pub struct FileEntitlements {
    path: PathBuf,
    flags: Mutex<FlagFile>,
}

impl FileEntitlements {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let flags = read_flags(&path);
        tracing::debug!(
            path = %path.display(),
            used_free_trial = flags.used_free_trial,
            is_premium = flags.is_premium,
            "entitlements loaded"
        );
        Self {
            path,
            flags: Mutex::new(flags),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, apply: impl FnOnce(&mut FlagFile) -> bool) {
        let mut flags = self.flags.lock().unwrap_or_else(|e| e.into_inner());
        if !apply(&mut flags) {
            return;
        }
        flags.updated_at = Some(Utc::now());
        if let Err(e) = write_flags(&self.path, &flags) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist entitlements");
        }
    }

    fn read(&self) -> FlagFile {
        self.flags.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EntitlementStore for FileEntitlements {
    fn has_used_free_trial(&self) -> bool {
        self.read().used_free_trial
    }

    fn is_premium(&self) -> bool {
        self.read().is_premium
    }

    fn mark_free_trial_used(&self) {
        self.update(|flags| !std::mem::replace(&mut flags.used_free_trial, true));
    }

    fn mark_premium(&self) {
        self.update(|flags| !std::mem::replace(&mut flags.is_premium, true));
        tracing::info!(path = %self.path.display(), "premium entitlement recorded");
    }
}

fn read_flags(path: &Path) -> FlagFile {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FlagFile::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read entitlements; treating flags as unset");
            return FlagFile::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "corrupt entitlements; treating flags as unset");
        FlagFile::default()
    })
}

fn write_flags(path: &Path, flags: &FlagFile) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(flags)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_truth_table() {
        let cases = [
            (false, false, true),
            (true, false, false),
            (false, true, true),
            (true, true, true),
        ];
        for (used, premium, allowed) in cases {
            let store = MemoryEntitlements::with_flags(used, premium);
            assert_eq!(store.can_start_analysis(), allowed, "used={used} premium={premium}");
        }
    }

    #[test]
    fn test_marks_are_idempotent() {
        let store = MemoryEntitlements::new();
        store.mark_free_trial_used();
        store.mark_free_trial_used();
        assert!(store.has_used_free_trial());
        assert!(!store.can_start_analysis());

        store.mark_premium();
        store.mark_premium();
        assert!(store.is_premium());
        assert!(store.can_start_analysis());
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/entitlements.json");

        let store = FileEntitlements::open(&path);
        assert!(!store.has_used_free_trial());
        store.mark_free_trial_used();
        drop(store);

        let reopened = FileEntitlements::open(&path);
        assert!(reopened.has_used_free_trial());
        assert!(!reopened.is_premium());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["usedFreeTrial"], true);
        assert_eq!(raw["isPremium"], false);
        assert!(raw["updatedAt"].is_string());
    }

    #[test]
    fn test_file_store_missing_file_is_fresh_user() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEntitlements::open(dir.path().join("absent.json"));
        assert!(store.can_start_analysis());
        assert!(!store.is_premium());
    }

    #[test]
    fn test_file_store_corrupt_file_never_grants_premium() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileEntitlements::open(&path);
        assert!(!store.is_premium());
        assert!(!store.has_used_free_trial());
    }

    #[test]
    fn test_file_store_second_mark_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entitlements.json");
        let store = FileEntitlements::open(&path);

        store.mark_premium();
        let first = std::fs::read_to_string(&path).unwrap();
        store.mark_premium();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }
}
