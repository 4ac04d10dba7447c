//! C2: on-disk profile directory layout and the advisory lock that ensures
//! at-most-one live session per config dir (§4.2).
//!
//! ```text
//! <appDir>/
//!   version
//!   log.txt
//!   profiles/
//!     version
//!     <ProfileId>/
//!       version
//!       lock
//!       state.json      (adapter-private durable state)
//!       cache/
//! ```
//!
//! Modeled on the teacher's `dc_open`/`dc_close` (`context.rs`) for the
//! create/open half and on `constants.rs`'s version-constant style for the
//! schema markers.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ids::ProfileId;

/// Current app-dir schema version (§4.2, §6).
pub const APP_DIR_VERSION: u32 = 1;
/// Current per-profile schema version.
pub const PROFILE_DIR_VERSION: u32 = 1;

const VERSION_FILE: &str = "version";
const LOCK_FILE: &str = "lock";
const LOG_FILE: &str = "log.txt";
const PROFILES_DIR: &str = "profiles";
const STATE_FILE: &str = "state.json";
const CACHE_DIR: &str = "cache";

/// A lock held for the process lifetime; dropping it releases the advisory
/// lock on the profile directory (§4.2) by removing the lock file.
pub struct ScopedLock {
    path: PathBuf,
}

impl Drop for ScopedLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Creates the app dir layout if absent, or validates an existing one.
///
/// Mismatched versions refuse to load unless `allow_setup` is set (the
/// `--setup` CLI flag, parsed by the external collaborator per §6) —
/// matching §4.2's "Profile-dir creation writes the schema version
/// atomically; mismatched versions refuse to load unless the process was
/// invoked with `--setup`."
pub fn init(app_dir: &Path, allow_setup: bool) -> Result<()> {
    fs::create_dir_all(app_dir)?;
    fs::create_dir_all(app_dir.join(PROFILES_DIR))?;

    check_or_write_version(&app_dir.join(VERSION_FILE), APP_DIR_VERSION, allow_setup)?;
    check_or_write_version(
        &app_dir.join(PROFILES_DIR).join(VERSION_FILE),
        PROFILE_DIR_VERSION,
        allow_setup,
    )?;

    let log_path = app_dir.join(LOG_FILE);
    if !log_path.exists() {
        File::create(&log_path)?;
    }
    Ok(())
}

fn check_or_write_version(path: &Path, expected: u32, allow_setup: bool) -> Result<()> {
    if !path.exists() {
        fs::write(path, expected.to_string())?;
        return Ok(());
    }
    let found: u32 = fs::read_to_string(path)?
        .trim()
        .parse()
        .map_err(|_| Error::VersionMismatch {
            expected,
            found: 0,
        })?;
    if found != expected {
        if allow_setup {
            fs::write(path, expected.to_string())?;
            return Ok(());
        }
        return Err(Error::VersionMismatch { expected, found });
    }
    Ok(())
}

/// Creates (if absent) and opens the directory for `profile_id`, acquiring
/// its advisory lock. Held for the process's lifetime by the returned
/// [`ScopedLock`].
pub fn open_profile_dir(app_dir: &Path, profile_id: &ProfileId) -> Result<(PathBuf, ScopedLock)> {
    let dir = profile_dir_path(app_dir, profile_id);
    fs::create_dir_all(&dir)?;
    fs::create_dir_all(dir.join(CACHE_DIR))?;

    let version_path = dir.join(VERSION_FILE);
    check_or_write_version(&version_path, PROFILE_DIR_VERSION, false)?;

    let lock = acquire_dir_lock(&dir)?;
    Ok((dir, lock))
}

pub fn profile_dir_path(app_dir: &Path, profile_id: &ProfileId) -> PathBuf {
    app_dir.join(PROFILES_DIR).join(profile_id.dir_name())
}

pub fn cache_dir_path(profile_dir: &Path) -> PathBuf {
    profile_dir.join(CACHE_DIR)
}

pub fn state_file_path(profile_dir: &Path) -> PathBuf {
    profile_dir.join(STATE_FILE)
}

/// Acquires the advisory lock on `dir`'s lock file. Failure is fatal to the
/// caller with "only one session per confdir" (§4.2) — modeled as
/// `Error::AlreadyLocked`, which the binary entrypoint (outside this crate's
/// scope, §1) is expected to treat as a fatal startup error.
///
/// Implemented as an atomic exclusive file creation rather than a
/// platform-specific `flock`: the spec mandates advisory locking without
/// committing to POSIX-specific details (§9's open question on session-lock
/// semantics), and `create_new` gives that without a new dependency. The
/// lock file is removed when the returned [`ScopedLock`] drops.
pub fn acquire_dir_lock(dir: &Path) -> Result<ScopedLock> {
    let path = dir.join(LOCK_FILE);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(ref err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(Error::AlreadyLocked)
        }
        Err(err) => return Err(Error::Io(err)),
    };
    let _ = write!(file, "{}", std::process::id());
    Ok(ScopedLock { path })
}

/// Lists the `ProfileId`s of every profile directory under `app_dir`.
pub fn list_profiles(app_dir: &Path) -> Result<Vec<ProfileId>> {
    let profiles_dir = app_dir.join(PROFILES_DIR);
    if !profiles_dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(&profiles_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                ids.push(ProfileId::from(name.to_string()));
            }
        }
    }
    ids.sort();
    Ok(ids)
}

/// Persists `state` (adapter-private durable settings) as a JSON blob in the
/// profile directory (§3's "adapter-private state").
pub fn write_adapter_state(profile_dir: &Path, state: &serde_json::Value) -> Result<()> {
    let mut file = File::create(state_file_path(profile_dir))?;
    file.write_all(serde_json::to_vec_pretty(state)?.as_slice())?;
    Ok(())
}

pub fn read_adapter_state(profile_dir: &Path) -> Result<Option<serde_json::Value>> {
    let path = state_file_path(profile_dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_is_idempotent() {
        let dir = tempdir().unwrap();
        init(dir.path(), false).unwrap();
        init(dir.path(), false).unwrap();
        assert!(dir.path().join(VERSION_FILE).exists());
        assert!(dir.path().join(LOG_FILE).exists());
    }

    #[test]
    fn version_mismatch_without_setup_is_rejected() {
        let dir = tempdir().unwrap();
        init(dir.path(), false).unwrap();
        fs::write(dir.path().join(VERSION_FILE), "2").unwrap();
        match init(dir.path(), false) {
            Err(Error::VersionMismatch { expected: 1, found: 2 }) => {}
            other => panic!("expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn version_mismatch_with_setup_migrates() {
        let dir = tempdir().unwrap();
        init(dir.path(), false).unwrap();
        fs::write(dir.path().join(VERSION_FILE), "2").unwrap();
        init(dir.path(), true).unwrap();
        let found: u32 = fs::read_to_string(dir.path().join(VERSION_FILE))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(found, APP_DIR_VERSION);
    }

    #[test]
    fn second_lock_on_same_dir_fails() {
        let dir = tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let profile_id = ProfileId::from("Dummy_1");
        let (profile_dir, _lock) = open_profile_dir(dir.path(), &profile_id).unwrap();
        match acquire_dir_lock(&profile_dir) {
            Err(Error::AlreadyLocked) => {}
            other => panic!("expected AlreadyLocked, got {:?}", other),
        }
    }

    #[test]
    fn list_profiles_returns_created_dirs() {
        let dir = tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let a = ProfileId::from("Dummy_1");
        let b = ProfileId::from("Dummy_2");
        let (_d1, _l1) = open_profile_dir(dir.path(), &a).unwrap();
        let (_d2, _l2) = open_profile_dir(dir.path(), &b).unwrap();
        let mut ids = list_profiles(dir.path()).unwrap();
        ids.sort();
        assert_eq!(ids, vec![a, b]);
    }
}
