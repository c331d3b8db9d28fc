//! Snapshots, binary encoding, undo history and save slots.
//!
//! A [`GameSnapshot`] is an immutable, cheaply cloneable view of a
//! [`GameState`]. Snapshots are what subscribers receive after each tick,
//! what the undo buffer stores, and what gets encoded into save slots.
//!
//! # Encoding
//!
//! `bincode` of `(SNAPSHOT_VERSION, GameState)`. The version is read first so
//! a blob from an incompatible build fails with a clear error instead of a
//! garbled decode.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entities::PlayerId;
use crate::error::{GameError, Result};
use crate::state::GameState;

/// Snapshot encoding version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Immutable view of the state at a tick boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot(Arc<GameState>);

impl GameSnapshot {
    /// Wrap a state.
    #[must_use]
    pub fn new(state: GameState) -> Self {
        Self(Arc::new(state))
    }

    /// The captured state.
    #[must_use]
    pub fn state(&self) -> &GameState {
        &self.0
    }

    /// Tick the snapshot was taken at.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.0.tick()
    }

    /// Owning player.
    #[must_use]
    pub fn player(&self) -> &PlayerId {
        self.0.player()
    }

    /// Deterministic hash of the captured state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.0.state_hash()
    }

    /// Encode to bytes.
    ///
    /// # Errors
    ///
    /// `Serialization` if bincode fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(&(SNAPSHOT_VERSION, &*self.0))
            .map_err(|e| GameError::Serialization(format!("Failed to encode snapshot: {e}")))
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// `Serialization` on a version mismatch or malformed data.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let version: u32 = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to read snapshot header: {e}")))?;
        if version != SNAPSHOT_VERSION {
            return Err(GameError::Serialization(format!(
                "Snapshot version mismatch: expected {SNAPSHOT_VERSION}, got {version}"
            )));
        }
        let (_, state): (u32, GameState) = bincode::deserialize(bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to decode snapshot: {e}")))?;
        Ok(Self::new(state))
    }
}

/// Bounded history of snapshots; the oldest entry is dropped when full.
#[derive(Debug, Clone)]
pub struct UndoBuffer {
    entries: VecDeque<GameSnapshot>,
    capacity: usize,
}

impl UndoBuffer {
    /// Buffer holding at most `capacity` snapshots. Zero disables undo.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a checkpoint.
    pub fn push(&mut self, snapshot: GameSnapshot) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    /// Take the most recent checkpoint.
    pub fn pop(&mut self) -> Option<GameSnapshot> {
        self.entries.pop_back()
    }
}

/// Name of a save slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub String);

impl SlotId {
    /// Create a slot id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for encoded snapshots, keyed by player and slot.
///
/// Called by the embedding application outside the tick; implementations
/// may block on IO.
pub trait SnapshotStore {
    /// Write a blob, replacing any previous content of the slot.
    ///
    /// # Errors
    ///
    /// `Storage` on write failure.
    fn save(&mut self, player: &PlayerId, slot: &SlotId, blob: &[u8]) -> Result<()>;

    /// Read a blob; `None` if the slot is empty.
    ///
    /// # Errors
    ///
    /// `Storage` on read failure.
    fn load(&self, player: &PlayerId, slot: &SlotId) -> Result<Option<Vec<u8>>>;

    /// Slots the player has written, sorted.
    ///
    /// # Errors
    ///
    /// `Storage` on read failure.
    fn list(&self, player: &PlayerId) -> Result<Vec<SlotId>>;

    /// Remove a slot. Removing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// `Storage` on failure.
    fn delete(&mut self, player: &PlayerId, slot: &SlotId) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: BTreeMap<(PlayerId, SlotId), Vec<u8>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&mut self, player: &PlayerId, slot: &SlotId, blob: &[u8]) -> Result<()> {
        self.slots
            .insert((player.clone(), slot.clone()), blob.to_vec());
        Ok(())
    }

    fn load(&self, player: &PlayerId, slot: &SlotId) -> Result<Option<Vec<u8>>> {
        Ok(self.slots.get(&(player.clone(), slot.clone())).cloned())
    }

    fn list(&self, player: &PlayerId) -> Result<Vec<SlotId>> {
        Ok(self
            .slots
            .keys()
            .filter(|(owner, _)| owner == player)
            .map(|(_, slot)| slot.clone())
            .collect())
    }

    fn delete(&mut self, player: &PlayerId, slot: &SlotId) -> Result<()> {
        self.slots.remove(&(player.clone(), slot.clone()));
        Ok(())
    }
}

/// Encode a snapshot and write it to the player's slot.
///
/// # Errors
///
/// Propagates encoding and store errors.
pub fn save_snapshot(
    store: &mut dyn SnapshotStore,
    slot: &SlotId,
    snapshot: &GameSnapshot,
) -> Result<()> {
    let bytes = snapshot.encode()?;
    store.save(snapshot.player(), slot, &bytes)?;
    tracing::debug!(
        player = %snapshot.player(),
        %slot,
        bytes = bytes.len(),
        tick = snapshot.tick(),
        "Snapshot saved"
    );
    Ok(())
}

/// Read and decode a snapshot from a slot.
///
/// # Errors
///
/// `Storage` if the slot is empty, plus store and decoding errors.
pub fn load_snapshot(
    store: &dyn SnapshotStore,
    player: &PlayerId,
    slot: &SlotId,
) -> Result<GameSnapshot> {
    let bytes = store.load(player, slot)?.ok_or_else(|| {
        GameError::Storage(format!("slot '{slot}' is empty for player '{player}'"))
    })?;
    GameSnapshot::decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{GameMap, MapDef};
    use crate::ruleset::Ruleset;

    fn snapshot(player: &str) -> GameSnapshot {
        let rules = Ruleset::standard();
        let map = GameMap::parse(&MapDef::standard()).unwrap();
        GameSnapshot::new(GameState::new(PlayerId::new(player), &rules, Arc::new(map)))
    }

    #[test]
    fn test_encode_decode_preserves_state() {
        let snap = snapshot("p1");
        let bytes = snap.encode().unwrap();
        let decoded = GameSnapshot::decode(&bytes).unwrap();
        assert_eq!(decoded, snap);
        assert_eq!(decoded.state_hash(), snap.state_hash());
    }

    #[test]
    fn test_decode_rejects_other_version() {
        let snap = snapshot("p1");
        let mut bytes = snap.encode().unwrap();
        bytes[0] = bytes[0].wrapping_add(1);
        assert!(matches!(
            GameSnapshot::decode(&bytes),
            Err(GameError::Serialization(_))
        ));
        assert!(GameSnapshot::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_undo_buffer_is_bounded() {
        let mut buffer = UndoBuffer::new(2);
        let a = snapshot("a");
        let b = snapshot("b");
        let c = snapshot("c");
        buffer.push(a);
        buffer.push(b.clone());
        buffer.push(c.clone());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pop(), Some(c));
        assert_eq!(buffer.pop(), Some(b));
        assert_eq!(buffer.pop(), None);

        let mut disabled = UndoBuffer::new(0);
        disabled.push(snapshot("a"));
        assert!(disabled.is_empty());
    }

    #[test]
    fn test_memory_store_slots() {
        let mut store = MemoryStore::new();
        let snap = snapshot("alice");
        let slot = SlotId::new("autosave");
        save_snapshot(&mut store, &slot, &snap).unwrap();

        let loaded = load_snapshot(&store, &PlayerId::new("alice"), &slot).unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(store.list(&PlayerId::new("alice")).unwrap(), vec![slot.clone()]);
        assert!(store.list(&PlayerId::new("bob")).unwrap().is_empty());

        store.delete(&PlayerId::new("alice"), &slot).unwrap();
        assert!(matches!(
            load_snapshot(&store, &PlayerId::new("alice"), &slot),
            Err(GameError::Storage(_))
        ));
    }
}
