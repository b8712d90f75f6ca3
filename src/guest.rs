//! Guest identity
//!
//! Unauthenticated users get a locally generated UUID persisted in the
//! config directory. When real auth arrives, guest data can be migrated
//! by rewriting `user_id` columns.

use std::path::PathBuf;

use uuid::Uuid;

const GUEST_ID_FILE_NAME: &str = "guest_id";

fn guest_id_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("life-review").join(GUEST_ID_FILE_NAME))
}

/// Load the persisted guest id, creating one on first use.
///
/// Falls back to an ephemeral id when the config directory is unusable;
/// the session still works, it just won't be linked across runs.
pub fn get_or_create_guest_id() -> Uuid {
    let path = match guest_id_path() {
        Some(p) => p,
        None => {
            log::warn!("Guest: no config directory, using ephemeral id");
            return Uuid::new_v4();
        }
    };

    if let Ok(contents) = std::fs::read_to_string(&path) {
        if let Ok(id) = Uuid::parse_str(contents.trim()) {
            return id;
        }
        log::warn!("Guest: invalid id in {:?}, regenerating", path);
    }

    let id = Uuid::new_v4();
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            log::warn!("Guest: failed to create {:?}: {}", parent, e);
            return id;
        }
    }
    if let Err(e) = std::fs::write(&path, id.to_string()) {
        log::warn!("Guest: failed to persist id to {:?}: {}", path, e);
    }
    id
}

/// Remove the persisted guest id. Useful for testing a fresh identity.
pub fn clear_guest_id() {
    if let Some(path) = guest_id_path() {
        match std::fs::remove_file(&path) {
            Ok(()) => log::info!("Guest: cleared id at {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Guest: failed to remove {:?}: {}", path, e),
        }
    }
}
