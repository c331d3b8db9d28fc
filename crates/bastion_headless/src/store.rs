//! File-backed save slots and replay files.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<player>/<slot>.snap
//! ```
//!
//! Player and slot names are restricted to `[A-Za-z0-9_-]` so they can never
//! escape the root directory.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use bastion_core::prelude::*;

const SNAPSHOT_EXTENSION: &str = "snap";

/// [`SnapshotStore`] writing one file per slot.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`. The directory is created on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn player_dir(&self, player: &PlayerId) -> Result<PathBuf> {
        Ok(self.root.join(checked_name(&player.0)?))
    }

    fn slot_path(&self, player: &PlayerId, slot: &SlotId) -> Result<PathBuf> {
        let file = format!("{}.{SNAPSHOT_EXTENSION}", checked_name(&slot.0)?);
        Ok(self.player_dir(player)?.join(file))
    }
}

fn checked_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(name)
    } else {
        Err(GameError::Storage(format!("invalid slot or player name '{name}'")))
    }
}

fn storage_error(action: &str, path: &Path, err: &std::io::Error) -> GameError {
    GameError::Storage(format!("Failed to {action} {}: {err}", path.display()))
}

impl SnapshotStore for FileStore {
    fn save(&mut self, player: &PlayerId, slot: &SlotId, blob: &[u8]) -> Result<()> {
        let dir = self.player_dir(player)?;
        fs::create_dir_all(&dir).map_err(|e| storage_error("create", &dir, &e))?;
        let path = self.slot_path(player, slot)?;
        // Atomic replace via rename.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, blob).map_err(|e| storage_error("write", &tmp, &e))?;
        fs::rename(&tmp, &path).map_err(|e| storage_error("replace", &path, &e))?;
        tracing::debug!(path = %path.display(), bytes = blob.len(), "Slot written");
        Ok(())
    }

    fn load(&self, player: &PlayerId, slot: &SlotId) -> Result<Option<Vec<u8>>> {
        let path = self.slot_path(player, slot)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, &e)),
        }
    }

    fn list(&self, player: &PlayerId) -> Result<Vec<SlotId>> {
        let dir = self.player_dir(player)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("list", &dir, &e)),
        };

        let mut slots = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| storage_error("list", &dir, &e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                slots.push(SlotId::new(stem));
            }
        }
        slots.sort();
        Ok(slots)
    }

    fn delete(&mut self, player: &PlayerId, slot: &SlotId) -> Result<()> {
        let path = self.slot_path(player, slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("delete", &path, &e)),
        }
    }
}

/// Write a replay to disk.
///
/// # Errors
///
/// `Serialization` if encoding fails, `Storage` on IO failure.
pub fn save_replay(path: &Path, replay: &Replay) -> Result<()> {
    let bytes = replay.to_bytes()?;
    fs::write(path, &bytes).map_err(|e| storage_error("write", path, &e))?;
    tracing::info!(
        path = %path.display(),
        commands = replay.commands.len(),
        final_tick = replay.final_tick,
        "Replay saved"
    );
    Ok(())
}

/// Read a replay from disk.
///
/// # Errors
///
/// `Storage` on IO failure, `Serialization` on malformed data.
pub fn load_replay(path: &Path) -> Result<Replay> {
    let bytes = fs::read(path).map_err(|e| storage_error("read", path, &e))?;
    Replay::from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::snapshot::{load_snapshot, save_snapshot};
    use std::sync::Arc;

    fn snapshot(player: &str) -> GameSnapshot {
        let config = ClockConfig {
            player: PlayerId::new(player),
            ..ClockConfig::default()
        };
        SimulationClock::new(Arc::new(Ruleset::standard()), &MapDef::standard(), config)
            .unwrap()
            .capture()
    }

    #[test]
    fn test_save_load_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let player = PlayerId::new("alice");
        let snap = snapshot("alice");

        save_snapshot(&mut store, &SlotId::new("b"), &snap).unwrap();
        save_snapshot(&mut store, &SlotId::new("a"), &snap).unwrap();
        assert_eq!(
            store.list(&player).unwrap(),
            vec![SlotId::new("a"), SlotId::new("b")]
        );

        let loaded = load_snapshot(&store, &player, &SlotId::new("a")).unwrap();
        assert_eq!(loaded, snap);

        store.delete(&player, &SlotId::new("a")).unwrap();
        store.delete(&player, &SlotId::new("a")).unwrap();
        assert_eq!(store.list(&player).unwrap(), vec![SlotId::new("b")]);
        assert!(store.load(&player, &SlotId::new("a")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_player_has_no_slots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.list(&PlayerId::new("nobody")).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        let result = store.save(&PlayerId::new("p"), &SlotId::new("../escape"), b"x");
        assert!(matches!(result, Err(GameError::Storage(_))));
        let result = store.save(&PlayerId::new("a/b"), &SlotId::new("ok"), b"x");
        assert!(matches!(result, Err(GameError::Storage(_))));
    }

    #[test]
    fn test_replay_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.replay");
        let config = ClockConfig {
            record_replay: true,
            ..ClockConfig::default()
        };
        let mut clock =
            SimulationClock::new(Arc::new(Ruleset::standard()), &MapDef::standard(), config)
                .unwrap();
        clock.submit(Command::StartWave).unwrap();
        clock.run_ticks(30).unwrap();
        let replay = clock.finish_replay().unwrap();

        save_replay(&path, &replay).unwrap();
        let loaded = load_replay(&path).unwrap();
        assert_eq!(loaded, replay);
        assert!(load_replay(&dir.path().join("missing")).is_err());
    }
}
