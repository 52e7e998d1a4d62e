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

use std::ops::Range;

pub const LEDGERFS: &str = "ledgerfs";
pub const LEDGERFS_DEBUG_STORE_ADDR: &str = "memory://:";
pub const LEDGERFS_DEBUG_LOCAL_STORE: &str = "/tmp/ledgerfs.data";

// Flat namespace, no '/' allowed.
pub const MAX_NAME_LENGTH: usize = 128;

pub const FILE_ID_LEN: usize = 32;
pub const CHUNK_INDEX_LEN: usize = 8;
// file_id || big-endian(index)
pub const CHUNK_KEY_LEN: usize = FILE_ID_LEN + CHUNK_INDEX_LEN;

// The occupancy bitmap is 32 bytes, so a file holds at most 256 chunks.
pub const BITMAP_BYTES: usize = 32;
pub const MAX_CHUNKS: usize = BITMAP_BYTES * 8;

pub const DEFAULT_CHUNK_SIZE: usize = 512;
// Max number of operations one atomic group may carry.
pub const DEFAULT_GROUP_LIMIT: usize = 16;

// Reservation pricing, in the smallest unit of the ledger's currency.
pub const DEFAULT_BASE_ENTRY_COST: u64 = 100_000;
pub const ENTRY_FLAT_COST: u64 = 2_500;
pub const ENTRY_BYTE_COST: u64 = 400;
pub const DEFAULT_INITIAL_BALANCE: u64 = 1_000_000_000;

/// Price of one chunk entry: a flat fee plus a per-byte fee over key and
/// payload.
pub const fn chunk_entry_cost(chunk_size: usize) -> u64 {
    ENTRY_FLAT_COST + ENTRY_BYTE_COST * (CHUNK_KEY_LEN + chunk_size) as u64
}

pub fn cal_chunk_idx(offset: u64, chunk_size: usize) -> ChunkIndex { offset / chunk_size as u64 }

pub fn cal_chunk_offset(offset: u64, chunk_size: usize) -> ChunkOffset {
    (offset % chunk_size as u64) as usize
}

/// Number of chunks needed to hold `size` bytes.
pub fn cal_chunk_count(size: u64, chunk_size: usize) -> u64 { size.div_ceil(chunk_size as u64) }

/// The chunk indices touched by `[offset, offset + length)`, half-open. The
/// end saturates at `u64::MAX`.
pub fn cal_chunk_span(offset: u64, length: u64, chunk_size: usize) -> Range<ChunkIndex> {
    if length == 0 {
        let idx = cal_chunk_idx(offset, chunk_size);
        return idx..idx;
    }
    cal_chunk_idx(offset, chunk_size)..cal_chunk_count(offset.saturating_add(length), chunk_size)
}

pub type ChunkIndex = u64;
pub type ChunkOffset = usize;
pub type ChunkSize = usize;
pub type FileOffset = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_math() {
        assert_eq!(cal_chunk_idx(0, 512), 0);
        assert_eq!(cal_chunk_idx(511, 512), 0);
        assert_eq!(cal_chunk_idx(512, 512), 1);
        assert_eq!(cal_chunk_offset(1100, 512), 76);
        assert_eq!(cal_chunk_count(0, 512), 0);
        assert_eq!(cal_chunk_count(1, 512), 1);
        assert_eq!(cal_chunk_count(1024, 512), 2);
        assert_eq!(cal_chunk_count(1025, 512), 3);
    }

    #[test]
    fn chunk_span_is_half_open() {
        assert_eq!(cal_chunk_span(100, 1000, 512), 0..3);
        assert_eq!(cal_chunk_span(0, 1024, 512), 0..2);
        assert_eq!(cal_chunk_span(512, 1, 512), 1..2);
        assert!(cal_chunk_span(700, 0, 512).is_empty());
        let last = u64::MAX / 512;
        assert_eq!(cal_chunk_span(u64::MAX - 3, 10, 512), last..last + 1);
    }

    #[test]
    fn entry_cost_follows_key_and_payload() {
        assert_eq!(chunk_entry_cost(512), 2_500 + 400 * 552);
        assert_eq!(MAX_CHUNKS, 256);
    }
}
