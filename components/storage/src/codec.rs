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

use bytes::{Bytes, BytesMut};
use ledgerfs_common::{cal_chunk_count, ChunkIndex, CHUNK_KEY_LEN};
use ledgerfs_types::{chunk::ChunkKey, file_id::FileId};
use snafu::ensure;

use crate::{
    config::StorageConfig,
    err::{ChunkTooLargeSnafu, Result},
};

/// [ChunkCodec] owns the fixed-size encoding of chunks and the reservation
/// pricing of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCodec {
    pub chunk_size:       usize,
    pub base_entry_cost:  u64,
    pub chunk_entry_cost: u64,
}

impl ChunkCodec {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            chunk_size:       config.chunk_size(),
            base_entry_cost:  config.base_entry_cost,
            chunk_entry_cost: config.chunk_entry_cost(),
        }
    }

    /// Zero-pads `payload` on the right up to `chunk_size`.
    ///
    /// Longer payloads fail with `ChunkTooLarge`; they are never truncated.
    pub fn pad(&self, payload: &[u8]) -> Result<Bytes> {
        ensure!(
            payload.len() <= self.chunk_size,
            ChunkTooLargeSnafu {
                len:        payload.len(),
                chunk_size: self.chunk_size,
            }
        );
        if payload.len() == self.chunk_size {
            return Ok(Bytes::copy_from_slice(payload));
        }
        let mut buf = BytesMut::zeroed(self.chunk_size);
        buf[..payload.len()].copy_from_slice(payload);
        Ok(buf.freeze())
    }

    pub fn zero_chunk(&self) -> Bytes { Bytes::from(vec![0u8; self.chunk_size]) }

    pub fn key(&self, file_id: &FileId, index: ChunkIndex) -> [u8; CHUNK_KEY_LEN] {
        ChunkKey::new(*file_id, index).encode()
    }

    /// Reservation a file of `size` bytes requires. The extra entry is the
    /// metadata entry itself.
    pub fn file_reservation_cost(&self, size: u64) -> u64 {
        let chunks = cal_chunk_count(size, self.chunk_size);
        self.base_entry_cost + self.chunk_entry_cost * (chunks + 1)
    }

    /// What the backend charges for a file currently holding `chunks` chunks.
    pub fn occupancy_cost(&self, chunks: usize) -> u64 {
        self.file_reservation_cost(chunks as u64 * self.chunk_size as u64)
    }

    /// Payload bytes a deposit pays for, in whole chunks.
    pub fn reserved_capacity(&self, deposit: u64) -> u64 {
        let floor = self.file_reservation_cost(0);
        if deposit < floor || self.chunk_entry_cost == 0 {
            return 0;
        }
        (deposit - floor) / self.chunk_entry_cost * self.chunk_size as u64
    }
}
