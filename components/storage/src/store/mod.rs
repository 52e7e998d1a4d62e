// Copyright 2024 ledgerfs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{str::FromStr, sync::Arc};

use bytes::Bytes;
use ledgerfs_common::{ChunkIndex, LEDGERFS_DEBUG_LOCAL_STORE};
use ledgerfs_types::{bitmap::OccupancyBitmap, chunk::ChunkKey, file_id::FileId, meta::FileMeta};
use snafu::{ensure, OptionExt};
use strum_macros::EnumString;
use tracing::debug;

use crate::{
    codec::ChunkCodec,
    config::StorageConfig,
    err::{
        ChunkIndexOutOfRangeSnafu, ChunkSizeMismatchSnafu, EntryKind, GroupTooLargeSnafu,
        InsufficientReservationSnafu, NotFoundSnafu, Result, UnsupportedStoreDSNSnafu,
    },
};

pub mod ledger;
mod local;
mod memory;

pub use local::LocalChunkStore;
pub use memory::MemoryChunkStore;

/// Opens the backend named by `config.dsn`, e.g. `memory://:` or
/// `local://:/var/lib/ledgerfs`.
pub fn open_store(config: &StorageConfig) -> Result<ChunkStoreRef> {
    let dsn = config.dsn.as_str();
    let x = dsn.splitn(2, "://:").collect::<Vec<_>>();
    ensure!(x.len() == 2, UnsupportedStoreDSNSnafu { dsn });
    let store_kind = x[0];
    let path = x[1];

    let kind = StoreKinds::from_str(store_kind)
        .ok()
        .context(UnsupportedStoreDSNSnafu { dsn })?;
    kind.build(path, config)
}

#[derive(Debug, EnumString)]
enum StoreKinds {
    #[strum(serialize = "memory", serialize = "Memory")]
    Memory,
    #[strum(serialize = "local", serialize = "Local")]
    Local,
}

impl StoreKinds {
    fn build(&self, path: &str, config: &StorageConfig) -> Result<ChunkStoreRef> {
        match self {
            StoreKinds::Memory => {
                debug!("store [memory] is built");
                Ok(Arc::new(MemoryChunkStore::new(config)))
            }
            StoreKinds::Local => {
                let path = if path.is_empty() {
                    LEDGERFS_DEBUG_LOCAL_STORE
                } else {
                    path
                };
                debug!("store [local] is built with path: {}", path);
                Ok(Arc::new(LocalChunkStore::open(path, config)?))
            }
        }
    }
}

pub type ChunkStoreRef = Arc<dyn ChunkStore>;

/// One mutation inside an atomic group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOp {
    Write { index: ChunkIndex, payload: Bytes },
    Delete { index: ChunkIndex },
}

impl GroupOp {
    pub fn index(&self) -> ChunkIndex {
        match self {
            GroupOp::Write { index, .. } | GroupOp::Delete { index } => *index,
        }
    }
}

/// [ChunkStore] is the capability set of a chunk backend.
///
/// Every mutation that touches chunks also keeps the file's occupancy bitmap
/// in step, inside the same backend call.
pub trait ChunkStore: Send + Sync + 'static {
    fn chunk_size(&self) -> usize;
    /// Upper bound on the ops of one [ChunkStore::commit_group] call.
    fn max_group_ops(&self) -> usize;

    /// Creates the metadata entry of `name`, paying `payment` from the
    /// balance into the file's deposit.
    fn create_file(&self, payment: u64, file_id: &FileId, name: &str) -> Result<()>;
    /// Adds `amount` from the balance to the file's deposit.
    fn deposit(&self, file_id: &FileId, amount: u64) -> Result<()>;
    fn reservation(&self, file_id: &FileId) -> Result<u64>;
    fn balance(&self) -> Result<u64>;

    fn get_meta(&self, file_id: &FileId) -> Result<Option<Vec<u8>>>;
    fn list_meta(&self) -> Result<Vec<(FileId, Vec<u8>)>>;
    fn get_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>>;

    /// Upserts one chunk and sets its bit.
    fn write_chunk(&self, file_id: &FileId, index: ChunkIndex, data: Bytes) -> Result<()>;
    /// Removes one chunk and clears its bit.
    fn delete_chunk(&self, key: &ChunkKey) -> Result<()>;
    /// Applies `ops` all-or-nothing.
    fn commit_group(&self, file_id: &FileId, ops: &[GroupOp]) -> Result<()>;
    /// Removes an empty file's entry and returns the refunded deposit.
    fn delete_file(&self, file_id: &FileId) -> Result<u64>;
}

/// Checks a creation payment against the minimum a file entry costs.
pub(crate) fn check_creation_payment(codec: &ChunkCodec, payment: u64) -> Result<()> {
    let required = codec.file_reservation_cost(0);
    ensure!(
        payment >= required,
        InsufficientReservationSnafu {
            required,
            available: payment,
        }
    );
    Ok(())
}

/// Validates `ops` against the file's current state without touching it and
/// returns the occupancy the file has once they are applied.
///
/// Backends call this before any mutation, so a rejected group leaves no
/// trace.
pub(crate) fn stage_group(
    codec: &ChunkCodec,
    limit: usize,
    meta: &FileMeta,
    deposit: u64,
    ops: &[GroupOp],
) -> Result<OccupancyBitmap> {
    ensure!(
        ops.len() <= limit,
        GroupTooLargeSnafu {
            len: ops.len(),
            limit,
        }
    );
    let mut staged = meta.occupancy;
    for op in ops {
        let index = op.index();
        ensure!(
            OccupancyBitmap::in_range(index),
            ChunkIndexOutOfRangeSnafu {
                index,
                capacity: OccupancyBitmap::CAPACITY,
            }
        );
        match op {
            GroupOp::Write { payload, .. } => {
                ensure!(
                    payload.len() == codec.chunk_size,
                    ChunkSizeMismatchSnafu {
                        len:        payload.len(),
                        chunk_size: codec.chunk_size,
                    }
                );
                staged.set(index)?;
            }
            GroupOp::Delete { .. } => {
                ensure!(
                    staged.test(index),
                    NotFoundSnafu {
                        kind: EntryKind::Chunk,
                        key:  ChunkKey::new(meta.id, index).to_hex(),
                    }
                );
                staged.clear(index)?;
            }
        }
    }
    if staged.count() > meta.occupancy.count() {
        let required = codec.occupancy_cost(staged.count());
        ensure!(
            deposit >= required,
            InsufficientReservationSnafu {
                required,
                available: deposit,
            }
        );
    }
    Ok(staged)
}
