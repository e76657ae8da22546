use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use dedupfs::{OpenOptions, VirtualFileSystem};
use tempfile::TempDir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that touch process environment.
fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run `f` with XDG and DEDUPFS variables pointed into `temp_dir`.
pub fn with_xdg_env<F: FnOnce()>(temp_dir: &TempDir, f: F) {
    let _guard = env_lock();
    let config_home = temp_dir.path().join("xdg-config");
    let data_home = temp_dir.path().join("xdg-data");
    fs::create_dir_all(&config_home).unwrap();
    fs::create_dir_all(&data_home).unwrap();

    let saved: Vec<(&str, Option<String>)> = ["XDG_CONFIG_HOME", "XDG_DATA_HOME"]
        .into_iter()
        .map(|k| (k, std::env::var(k).ok()))
        .collect();
    std::env::set_var("XDG_CONFIG_HOME", &config_home);
    std::env::set_var("XDG_DATA_HOME", &data_home);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (key, value) in saved {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}

/// A fresh, initialized root with an open session for `user`.
pub fn fresh_session(user: &str) -> (TempDir, VirtualFileSystem) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    let vfs = VirtualFileSystem::open(&root, user, &OpenOptions::init()).unwrap();
    (temp_dir, vfs)
}

pub fn root_of(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("root")
}

/// Digest-named blobs in the entity directory.
pub fn entity_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root.join("EntityFiles"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with(".dedupfs-tmp"))
        .collect();
    names.sort();
    names
}

pub fn names(vfs: &VirtualFileSystem, path: &str) -> Vec<String> {
    vfs.list(path)
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}
