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

use ledgerfs_common::{ChunkIndex, BITMAP_BYTES, MAX_CHUNKS};
use snafu::ensure;

use crate::err::{BitOutOfRangeSnafu, Result};

/// [OccupancyBitmap] records which chunk indices of a file exist in the
/// backend. Chunk `i` maps to byte `i / 8`, bit `i % 8`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OccupancyBitmap([u8; BITMAP_BYTES]);

impl OccupancyBitmap {
    pub const CAPACITY: usize = MAX_CHUNKS;

    pub fn from_bytes(bytes: [u8; BITMAP_BYTES]) -> Self { OccupancyBitmap(bytes) }

    pub fn as_bytes(&self) -> &[u8; BITMAP_BYTES] { &self.0 }

    pub fn in_range(index: ChunkIndex) -> bool { index < Self::CAPACITY as u64 }

    pub fn set(&mut self, index: ChunkIndex) -> Result<()> {
        let (byte, bit) = Self::locate(index)?;
        self.0[byte] |= 1 << bit;
        Ok(())
    }

    pub fn clear(&mut self, index: ChunkIndex) -> Result<()> {
        let (byte, bit) = Self::locate(index)?;
        self.0[byte] &= !(1 << bit);
        Ok(())
    }

    /// Out-of-range indices are never occupied.
    pub fn test(&self, index: ChunkIndex) -> bool {
        match Self::locate(index) {
            Ok((byte, bit)) => self.0[byte] & (1 << bit) != 0,
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool { self.0.iter().all(|b| *b == 0) }

    pub fn count(&self) -> usize { self.0.iter().map(|b| b.count_ones() as usize).sum() }

    pub fn highest(&self) -> Option<ChunkIndex> {
        self.0.iter().enumerate().rev().find_map(|(byte, b)| {
            (*b != 0).then(|| (byte * 8 + 7 - b.leading_zeros() as usize) as ChunkIndex)
        })
    }

    /// Occupied indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ChunkIndex> + '_ {
        (0..Self::CAPACITY as ChunkIndex).filter(|i| self.test(*i))
    }

    fn locate(index: ChunkIndex) -> Result<(usize, u8)> {
        ensure!(
            Self::in_range(index),
            BitOutOfRangeSnafu {
                index,
                capacity: Self::CAPACITY,
            }
        );
        Ok(((index / 8) as usize, (index % 8) as u8))
    }
}

impl Debug for OccupancyBitmap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
