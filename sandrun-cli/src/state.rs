//! On-disk record of a created sandbox's id/pid/chroot, so that later CLI
//! invocations (a new process each time) can rehydrate a
//! [`sandrun::SandboxHandle`] without re-running Create.
//!
//! This mirrors the `state.json` convention this family of OCI runtimes
//! uses to survive across separate CLI invocations of `create`/`start`/
//! `kill`/`delete`; we keep one JSON file per sandbox id under the CLI's
//! home directory instead of a shared daemon.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleState {
    pub id: String,
    pub pid: i32,
    pub chroot: Option<PathBuf>,
}

fn state_path(home: &Path, id: &str) -> PathBuf {
    home.join(format!("{id}.json"))
}

pub fn save(home: &Path, state: &HandleState) -> anyhow::Result<()> {
    std::fs::create_dir_all(home)?;
    let path = state_path(home, &state.id);
    let body = serde_json::to_vec_pretty(state)?;
    std::fs::write(&path, body)?;
    Ok(())
}

pub fn load(home: &Path, id: &str) -> anyhow::Result<HandleState> {
    let path = state_path(home, id);
    let body = std::fs::read(&path)
        .map_err(|e| anyhow::anyhow!("no state recorded for sandbox {id} at {path:?}: {e}"))?;
    Ok(serde_json::from_slice(&body)?)
}

pub fn remove(home: &Path, id: &str) -> anyhow::Result<()> {
    let path = state_path(home, id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Rehydrate a [`sandrun::SandboxHandle`] for an id recorded by a previous
/// `create` invocation.
pub fn attach(home: &Path, id: &str) -> anyhow::Result<sandrun::SandboxHandle> {
    let state = load(home, id)?;
    Ok(sandrun::SandboxHandle::attach(state.id, state.pid, state.chroot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() {
        let home = tempdir().unwrap();
        let state = HandleState {
            id: "alpha".to_string(),
            pid: 1234,
            chroot: Some(PathBuf::from("/tmp/sandrun-chroots/alpha")),
        };
        save(home.path(), &state).unwrap();
        let loaded = load(home.path(), "alpha").unwrap();
        assert_eq!(loaded.pid, 1234);
        assert_eq!(loaded.id, "alpha");
    }

    #[test]
    fn load_missing_state_is_an_error() {
        let home = tempdir().unwrap();
        assert!(load(home.path(), "nonexistent").is_err());
    }

    #[test]
    fn remove_is_idempotent() {
        let home = tempdir().unwrap();
        remove(home.path(), "alpha").unwrap();
        remove(home.path(), "alpha").unwrap();
    }
}
