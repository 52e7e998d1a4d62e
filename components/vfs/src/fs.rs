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

use std::fmt::{Debug, Formatter};

use bytes::{Bytes, BytesMut};
use ledgerfs_common::MAX_CHUNKS;
use ledgerfs_storage::{
    config::StorageConfig,
    mapper::{OffsetMapper, ReadPlan},
    registry::FileRegistry,
    store::ChunkStoreRef,
    StorageAdapter,
};
use ledgerfs_types::{
    file_id::FileId,
    meta::{validate_name, FileMeta},
    stat::FileStat,
};
use libc::{EEXIST, EFBIG, EINVAL, ENOENT};
use snafu::{ensure, OptionExt};
use tracing::{debug, info, instrument};

use crate::{
    err::{LibcSnafu, Result},
    locks::FileLocks,
};

/// [LedgerFs] is a flat namespace of byte-addressable files kept in a chunk
/// store.
///
/// Every operation on a file holds that file's lock for its whole duration,
/// so the read-modify-write of partial chunks and the occupancy bookkeeping
/// of one file never interleave.
pub struct LedgerFs {
    adapter:  StorageAdapter,
    registry: FileRegistry,
    mapper:   OffsetMapper,
    locks:    FileLocks,
}

impl Debug for LedgerFs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerFs")
            .field("chunk_size", &self.mapper.chunk_size())
            .field("group_limit", &self.adapter.group_limit())
            .field("locked_files", &self.locks.len())
            .finish()
    }
}

impl LedgerFs {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self::with_adapter(StorageAdapter::open(config)?))
    }

    pub fn with_store(store: ChunkStoreRef, config: &StorageConfig) -> Result<Self> {
        Ok(Self::with_adapter(StorageAdapter::new(store, config)?))
    }

    pub fn with_adapter(adapter: StorageAdapter) -> Self {
        let mapper = OffsetMapper::new(adapter.codec().chunk_size);
        Self {
            registry: adapter.registry(),
            adapter,
            mapper,
            locks: FileLocks::default(),
        }
    }

    pub fn adapter(&self) -> &StorageAdapter { &self.adapter }

    /// Largest file the occupancy bitmap can describe.
    pub fn max_file_size(&self) -> u64 { MAX_CHUNKS as u64 * self.mapper.chunk_size() as u64 }

    /// Creates an empty file, reserving room for `size_hint` bytes up front.
    #[instrument(skip(self))]
    pub fn create(&self, name: &str, size_hint: u64) -> Result<FileStat> {
        let id = self.check_name(name)?;
        ensure!(
            size_hint <= self.max_file_size(),
            LibcSnafu { errno: EFBIG }
        );
        self.locks.with_lock(&id, || -> Result<FileStat> {
            ensure!(
                self.registry.lookup(name)?.is_none(),
                LibcSnafu { errno: EEXIST }
            );
            self.adapter.create_file(name, size_hint)?;
            info!("created {name:?}");
            Ok(FileStat::from_meta(
                &FileMeta::new(name),
                self.mapper.chunk_size(),
            ))
        })
    }

    /// All files, sorted by name.
    pub fn readdir(&self) -> Result<Vec<FileStat>> {
        Ok(self.registry.list_files()?.into_values().collect())
    }

    pub fn getattr(&self, name: &str) -> Result<FileStat> {
        self.check_name(name)?;
        Ok(self.registry.stat(name)?)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        self.check_name(name)?;
        Ok(self.registry.exists(name)?)
    }

    /// Reads up to `size` bytes at `offset`. Reading at or past the end of the
    /// file yields `size` zero bytes; a read running over the end is cut at it.
    #[instrument(skip(self))]
    pub fn read(&self, name: &str, offset: u64, size: usize) -> Result<Bytes> {
        let id = self.check_name(name)?;
        self.locks.with_lock(&id, || -> Result<Bytes> {
            let meta = self.lookup(name)?;
            let extent = FileStat::from_meta(&meta, self.mapper.chunk_size()).extent;
            match self.mapper.read_plan(extent, offset, size) {
                ReadPlan::Empty => Ok(Bytes::new()),
                ReadPlan::Zeroes(len) => Ok(Bytes::from(vec![0u8; len])),
                ReadPlan::Chunks(spans) => {
                    let mut buf = BytesMut::with_capacity(size);
                    for span in spans {
                        if meta.occupancy.test(span.index) {
                            let chunk = self.adapter.read_chunk(&id, span.index)?;
                            buf.extend_from_slice(&chunk[span.sub_range]);
                        } else {
                            buf.resize(buf.len() + span.sub_range.len(), 0);
                        }
                    }
                    Ok(buf.freeze())
                }
            }
        })
    }

    /// Writes `data` at `offset`, growing the reservation first when the
    /// write creates new chunks. Returns the number of bytes written.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn write(&self, name: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let id = self.check_name(name)?;
        let end = offset
            .checked_add(data.len() as u64)
            .context(LibcSnafu { errno: EFBIG })?;
        ensure!(end <= self.max_file_size(), LibcSnafu { errno: EFBIG });

        self.locks.with_lock(&id, || -> Result<usize> {
            let meta = self.lookup(name)?;
            if data.is_empty() {
                return Ok(0);
            }
            let span = self.mapper.chunk_span(offset, data.len() as u64);
            let new_chunks = span.clone().filter(|i| !meta.occupancy.test(*i)).count();
            let chunks_after = meta.occupancy.count() + new_chunks;
            if new_chunks > 0 {
                self.adapter
                    .reserve(&id, chunks_after as u64 * self.mapper.chunk_size() as u64)?;
            }

            let ops = self.mapper.write_ops(offset, Bytes::copy_from_slice(data))?;
            let report = self.adapter.submit_batch(&id, ops)?;
            debug!(
                "wrote {} bytes to {name:?} over chunks {span:?} in {} groups",
                data.len(),
                report.groups
            );
            Ok(data.len())
        })
    }

    /// Deletes every chunk of the file, then its entry. Returns the refunded
    /// deposit.
    #[instrument(skip(self))]
    pub fn unlink(&self, name: &str) -> Result<u64> {
        let id = self.check_name(name)?;
        let refund = self.locks.with_lock(&id, || -> Result<u64> {
            let meta = self.lookup(name)?;
            let indices = meta.occupancy.iter().collect::<Vec<_>>();
            if !indices.is_empty() {
                self.adapter.delete_chunks(&id, &indices)?;
            }
            let refund = self.adapter.delete_file(&id)?;
            info!("unlinked {name:?}, refunded {refund}");
            Ok(refund)
        });
        self.locks.forget(&id);
        refund
    }

    fn check_name(&self, name: &str) -> Result<FileId> {
        ensure!(validate_name(name).is_ok(), LibcSnafu { errno: EINVAL });
        Ok(FileId::from_name(name))
    }

    fn lookup(&self, name: &str) -> Result<FileMeta> {
        self.registry
            .lookup(name)?
            .context(LibcSnafu { errno: ENOENT })
    }
}
