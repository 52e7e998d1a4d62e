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

use std::cmp::min;

use bytes::Bytes;
use ledgerfs_common::ChunkIndex;
use ledgerfs_types::{
    bitmap::OccupancyBitmap, chunk::ChunkKey, file_id::FileId, meta::validate_name,
};
use snafu::{ensure, IntoError};
use tracing::{debug, info, instrument, warn};

use crate::{
    codec::ChunkCodec,
    config::StorageConfig,
    err::{
        ChunkIndexOutOfRangeSnafu, ChunkSizeMismatchSnafu, FileExistsSnafu, InvalidConfigSnafu,
        PartialBatchFailureSnafu, Result,
    },
    mapper::ChunkOp,
    registry::FileRegistry,
    store::{open_store, ChunkStore, ChunkStoreRef, GroupOp},
};

/// Outcome of a batch that committed every group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of atomic groups committed.
    pub groups:    usize,
    /// Chunk indices touched, in commit order.
    pub committed: Vec<ChunkIndex>,
}

/// [StorageAdapter] is the only way chunk state is changed.
///
/// It holds no authoritative state of its own: occupancy and reservations
/// are always read back from the store.
#[derive(Clone)]
pub struct StorageAdapter {
    store:       ChunkStoreRef,
    codec:       ChunkCodec,
    group_limit: usize,
}

impl StorageAdapter {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let store = open_store(config)?;
        Self::new(store, config)
    }

    pub fn new(store: ChunkStoreRef, config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let codec = ChunkCodec::new(config);
        ensure!(
            store.chunk_size() == codec.chunk_size,
            InvalidConfigSnafu {
                reason: format!(
                    "store chunk size {} differs from configured {}",
                    store.chunk_size(),
                    codec.chunk_size
                ),
            }
        );
        let group_limit = min(config.group_limit, store.max_group_ops());
        Ok(Self {
            store,
            codec,
            group_limit,
        })
    }

    pub fn codec(&self) -> &ChunkCodec { &self.codec }

    pub fn store(&self) -> &ChunkStoreRef { &self.store }

    pub fn group_limit(&self) -> usize { self.group_limit }

    pub fn registry(&self) -> FileRegistry { FileRegistry::new(self.store.clone(), self.codec) }

    /// Creates the metadata entry for `name`, paying the reservation a file of
    /// `size` bytes needs.
    #[instrument(skip_all, fields(name = %name, size = size))]
    pub fn create_file(&self, name: &str, size: u64) -> Result<FileId> {
        validate_name(name)?;
        let id = FileId::from_name(name);
        ensure!(self.store.get_meta(&id)?.is_none(), FileExistsSnafu { name });

        let payment = self.codec.file_reservation_cost(size);
        self.store.create_file(payment, &id, name)?;
        info!("created file {name:?} ({id}) with reservation {payment}");
        Ok(id)
    }

    /// Tops the deposit of `file_id` up to what `size` bytes need. Returns the
    /// amount paid, 0 when the deposit already covers it.
    #[instrument(skip_all, fields(file_id = %file_id, size = size))]
    pub fn reserve(&self, file_id: &FileId, size: u64) -> Result<u64> {
        let required = self.codec.file_reservation_cost(size);
        let current = self.store.reservation(file_id)?;
        if current >= required {
            return Ok(0);
        }
        let amount = required - current;
        self.store.deposit(file_id, amount)?;
        debug!("topped up reservation of {file_id} by {amount} to {required}");
        Ok(amount)
    }

    /// Stores one full chunk and marks it occupied. Idempotent.
    pub fn write_chunk(&self, file_id: &FileId, index: ChunkIndex, payload: Bytes) -> Result<()> {
        ensure!(
            payload.len() == self.codec.chunk_size,
            ChunkSizeMismatchSnafu {
                len:        payload.len(),
                chunk_size: self.codec.chunk_size,
            }
        );
        self.check_index(index)?;
        self.store.write_chunk(file_id, index, payload)
    }

    /// Reads one chunk; chunks that were never written read as zeros.
    pub fn read_chunk(&self, file_id: &FileId, index: ChunkIndex) -> Result<Bytes> {
        match self.store.get_chunk(&ChunkKey::new(*file_id, index))? {
            Some(chunk) => self.codec.pad(&chunk),
            None => Ok(self.codec.zero_chunk()),
        }
    }

    pub fn delete_chunk(&self, file_id: &FileId, index: ChunkIndex) -> Result<()> {
        self.store.delete_chunk(&ChunkKey::new(*file_id, index))
    }

    /// Removes the entry of an empty file; returns the refunded deposit.
    #[instrument(skip_all, fields(file_id = %file_id))]
    pub fn delete_file(&self, file_id: &FileId) -> Result<u64> {
        let refund = self.store.delete_file(file_id)?;
        info!("deleted file {file_id}, refunded {refund}");
        Ok(refund)
    }

    /// Commits `ops` in sequential atomic groups of at most `group_limit`
    /// chunks.
    ///
    /// Read-modify-write ops read the chunk right before their group is
    /// committed. A failure in the first group comes back as is; a failure
    /// later comes back as `PartialBatchFailure` naming what stayed committed.
    #[instrument(skip_all, fields(file_id = %file_id, ops = ops.len()))]
    pub fn submit_batch(&self, file_id: &FileId, ops: Vec<ChunkOp>) -> Result<BatchReport> {
        for op in &ops {
            self.check_index(op.index)?;
        }
        self.run_groups(file_id, &ops, |op| op.index, |op| {
            let prior = if op.requires_read_before_write {
                self.store.get_chunk(&ChunkKey::new(*file_id, op.index))?
            } else {
                None
            };
            Ok(GroupOp::Write {
                index:   op.index,
                payload: op.materialize(&self.codec, prior.as_deref())?,
            })
        })
    }

    /// Deletes `indices` with the same grouping and failure reporting as
    /// [StorageAdapter::submit_batch].
    #[instrument(skip_all, fields(file_id = %file_id, chunks = indices.len()))]
    pub fn delete_chunks(&self, file_id: &FileId, indices: &[ChunkIndex]) -> Result<BatchReport> {
        self.run_groups(file_id, indices, |index| *index, |index| {
            Ok(GroupOp::Delete { index: *index })
        })
    }

    fn run_groups<T>(
        &self,
        file_id: &FileId,
        items: &[T],
        index_of: impl Fn(&T) -> ChunkIndex,
        materialize: impl Fn(&T) -> Result<GroupOp>,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for (k, group) in items.chunks(self.group_limit).enumerate() {
            let committed = group
                .iter()
                .map(&materialize)
                .collect::<Result<Vec<_>>>()
                .and_then(|ops| self.store.commit_group(file_id, &ops));
            if let Err(e) = committed {
                if k == 0 {
                    return Err(e);
                }
                warn!(
                    "batch on {file_id} failed at group {k}, {} chunks stay committed: {e}",
                    report.committed.len()
                );
                return Err(PartialBatchFailureSnafu {
                    committed_groups:  report.groups,
                    committed_indices: report.committed,
                }
                .into_error(Box::new(e)));
            }
            debug!("committed group {k} of {} chunks", group.len());
            report.groups += 1;
            report.committed.extend(group.iter().map(&index_of));
        }
        Ok(report)
    }

    fn check_index(&self, index: ChunkIndex) -> Result<()> {
        ensure!(
            OccupancyBitmap::in_range(index),
            ChunkIndexOutOfRangeSnafu {
                index,
                capacity: OccupancyBitmap::CAPACITY,
            }
        );
        Ok(())
    }
}
