//! Chunk replication through partial synchronization.
//!
//! A [`ChunkStore`] holds dense 16³ voxel chunks keyed by chunk coordinate.
//! Whole-value replication of the store would resend every chunk on every
//! change, so it opts into the partial interface instead: per remote, the
//! difference between the chunks that *should* be mirrored (the interest
//! set) and the chunks already mirrored (the loaded set) travels as
//! [`LoadChunk`] / [`UnloadChunk`] messages, and individual voxel edits
//! within a loaded chunk travel as [`SetVoxel`].
//!
//! The serde derive skips every field: the synchronizer may create the
//! mirror component, but all content flows through partial messages.

use std::collections::{HashMap, HashSet};

use glam::IVec3;
use serde::{Deserialize, Serialize};

use voxel_ecs::{Component, Entity};

use crate::error::SyncError;
use crate::instance::{Instance, InstanceId};
use crate::partial::{
    register_partial_message, PartialMessage, PartiallySynchronizable,
};

/// Chunk edge length in voxels.
pub const CHUNK_EDGE: i32 = 16;
/// Voxels per chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_EDGE * CHUNK_EDGE * CHUNK_EDGE) as usize;

/// A dense cube of voxel block IDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    blocks: Vec<u16>,
}

impl Chunk {
    /// Creates a chunk filled with air (block 0).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            blocks: vec![0; CHUNK_VOLUME],
        }
    }

    fn offset_index(offset: IVec3) -> Option<usize> {
        let in_bounds = offset
            .to_array()
            .iter()
            .all(|&axis| (0..CHUNK_EDGE).contains(&axis));
        in_bounds.then(|| {
            (offset.x + offset.y * CHUNK_EDGE + offset.z * CHUNK_EDGE * CHUNK_EDGE) as usize
        })
    }

    /// Reads the voxel at an in-chunk offset.
    #[must_use]
    pub fn get(&self, offset: IVec3) -> Option<u16> {
        Self::offset_index(offset).map(|index| self.blocks[index])
    }

    /// Writes the voxel at an in-chunk offset. Returns `false` when the
    /// offset is out of bounds.
    pub fn set(&mut self, offset: IVec3, value: u16) -> bool {
        match Self::offset_index(offset) {
            Some(index) => {
                self.blocks[index] = value;
                true
            }
            None => false,
        }
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::empty()
    }
}

/// Voxel storage with per-remote replication bookkeeping.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChunkStore {
    /// Chunk data by chunk coordinate.
    #[serde(skip)]
    chunks: HashMap<IVec3, Chunk>,
    /// Chunks each remote should be mirroring.
    #[serde(skip)]
    interest: HashMap<InstanceId, HashSet<IVec3>>,
    /// Chunks each remote is mirroring right now.
    #[serde(skip)]
    loaded: HashMap<InstanceId, HashSet<IVec3>>,
}

impl ChunkStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Reads a chunk.
    #[must_use]
    pub fn chunk(&self, position: IVec3) -> Option<&Chunk> {
        self.chunks.get(&position)
    }

    /// Inserts or replaces a chunk.
    pub fn insert_chunk(&mut self, position: IVec3, chunk: Chunk) {
        self.chunks.insert(position, chunk);
    }

    /// Removes a chunk.
    pub fn remove_chunk(&mut self, position: IVec3) -> Option<Chunk> {
        self.chunks.remove(&position)
    }

    /// Reads one voxel.
    #[must_use]
    pub fn voxel(&self, chunk: IVec3, offset: IVec3) -> Option<u16> {
        self.chunks.get(&chunk)?.get(offset)
    }

    /// Writes one voxel in an existing chunk.
    pub fn set_voxel(&mut self, chunk: IVec3, offset: IVec3, value: u16) -> bool {
        self.chunks
            .get_mut(&chunk)
            .is_some_and(|chunk| chunk.set(offset, value))
    }

    /// Declares which chunks a remote should mirror.
    pub fn set_interest(&mut self, remote: InstanceId, chunks: HashSet<IVec3>) {
        self.interest.insert(remote, chunks);
    }

    /// Drops all bookkeeping for a remote.
    pub fn forget_remote(&mut self, remote: InstanceId) {
        self.interest.remove(&remote);
        self.loaded.remove(&remote);
    }

    /// The remotes currently mirroring a chunk.
    #[must_use]
    pub fn remotes_with_chunk(&self, chunk: IVec3) -> Vec<InstanceId> {
        self.loaded
            .iter()
            .filter(|(_, set)| set.contains(&chunk))
            .map(|(&remote, _)| remote)
            .collect()
    }

    /// Diffs a remote's interest set against its loaded set, updating the
    /// loaded set and returning the loads and unloads to transmit.
    pub fn diff_remote(&mut self, remote: InstanceId) -> (Vec<LoadChunk>, Vec<UnloadChunk>) {
        let interest = self.interest.get(&remote).cloned().unwrap_or_default();
        let loaded = self.loaded.entry(remote).or_default();

        let mut loads = Vec::new();
        for position in &interest {
            if !loaded.contains(position) {
                if let Some(chunk) = self.chunks.get(position) {
                    loads.push(LoadChunk {
                        position: *position,
                        chunk: chunk.clone(),
                    });
                    loaded.insert(*position);
                }
            }
        }

        let mut unloads = Vec::new();
        loaded.retain(|position| {
            // Unload chunks the remote lost interest in or that no longer
            // exist.
            let keep = interest.contains(position) && self.chunks.contains_key(position);
            if !keep {
                unloads.push(UnloadChunk {
                    position: *position,
                });
            }
            keep
        });

        (loads, unloads)
    }
}

impl Component for ChunkStore {
    fn type_name() -> &'static str {
        "voxel::ChunkStore"
    }
}

/// Mirror a chunk's full contents on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadChunk {
    /// Chunk coordinate.
    pub position: IVec3,
    /// The chunk contents.
    pub chunk: Chunk,
}

impl PartialMessage for LoadChunk {
    fn message_name() -> &'static str {
        "voxel::LoadChunk"
    }
}

/// Drop a mirrored chunk on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnloadChunk {
    /// Chunk coordinate.
    pub position: IVec3,
}

impl PartialMessage for UnloadChunk {
    fn message_name() -> &'static str {
        "voxel::UnloadChunk"
    }
}

/// Apply one voxel edit inside a mirrored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVoxel {
    /// Chunk coordinate.
    pub chunk: IVec3,
    /// Offset within the chunk.
    pub offset: IVec3,
    /// New block value.
    pub value: u16,
}

impl PartialMessage for SetVoxel {
    fn message_name() -> &'static str {
        "voxel::SetVoxel"
    }
}

impl PartiallySynchronizable for ChunkStore {
    fn register_messages() {
        register_partial_message::<ChunkStore, LoadChunk>(|store, _entity, _remote, message| {
            store.insert_chunk(message.position, message.chunk);
        });
        register_partial_message::<ChunkStore, UnloadChunk>(|store, _entity, _remote, message| {
            store.remove_chunk(message.position);
        });
        register_partial_message::<ChunkStore, SetVoxel>(|store, _entity, _remote, message| {
            if !store.set_voxel(message.chunk, message.offset, message.value) {
                tracing::debug!(chunk = ?message.chunk, "voxel edit for unloaded chunk dropped");
            }
        });
    }
}

impl Instance {
    /// One chunk-replication pass for the entity's [`ChunkStore`]: per
    /// visible remote, transmit the interest/loaded difference as
    /// load/unload messages.
    pub fn replicate_chunks(&mut self, entity: Entity) -> Result<(), SyncError> {
        for remote in self.visible_remotes(entity) {
            let Some(store) = self.get_mut::<ChunkStore>(entity) else {
                return Ok(());
            };
            let (loads, unloads) = store.diff_remote(remote);
            for load in loads {
                self.send_partial_message::<ChunkStore, LoadChunk>(remote, entity, &load)?;
            }
            for unload in unloads {
                self.send_partial_message::<ChunkStore, UnloadChunk>(remote, entity, &unload)?;
            }
        }
        Ok(())
    }

    /// Applies a voxel edit locally and forwards it to every remote with
    /// the chunk loaded. Returns whether the edit applied.
    pub fn set_replicated_voxel(
        &mut self,
        entity: Entity,
        chunk: IVec3,
        offset: IVec3,
        value: u16,
    ) -> Result<bool, SyncError> {
        let remotes = {
            let Some(store) = self.get_mut::<ChunkStore>(entity) else {
                return Ok(false);
            };
            if !store.set_voxel(chunk, offset, value) {
                return Ok(false);
            }
            store.remotes_with_chunk(chunk)
        };

        let message = SetVoxel {
            chunk,
            offset,
            value,
        };
        for remote in remotes {
            self.send_partial_message::<ChunkStore, SetVoxel>(remote, entity, &message)?;
        }
        Ok(true)
    }
}
