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

use std::{cmp::min, ops::Range};

use bytes::{Bytes, BytesMut};
use ledgerfs_common::{
    cal_chunk_count, cal_chunk_idx, cal_chunk_offset, cal_chunk_span, ChunkIndex, FileOffset,
};

use snafu::OptionExt;

use crate::{
    codec::ChunkCodec,
    err::{RangeOverflowSnafu, Result},
};

/// One chunk-level piece of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOp {
    pub index: ChunkIndex,
    /// The bytes of the chunk this op overwrites.
    pub sub_range: Range<usize>,
    /// Set when `sub_range` is not the whole chunk: the prior content (or
    /// zeros) must be fetched and only `sub_range` replaced.
    pub requires_read_before_write: bool,
    /// The input bytes landing in `sub_range`.
    pub source: Bytes,
}

impl ChunkOp {
    /// Builds the full `chunk_size` payload this op stores.
    ///
    /// `prior` is the current chunk content; it is only consulted for
    /// read-modify-write ops and `None` means the chunk does not exist yet.
    pub fn materialize(&self, codec: &ChunkCodec, prior: Option<&[u8]>) -> Result<Bytes> {
        if !self.requires_read_before_write {
            return codec.pad(&self.source);
        }
        let mut buf = match prior {
            Some(prior) => BytesMut::from(codec.pad(prior)?.as_ref()),
            None => BytesMut::zeroed(codec.chunk_size),
        };
        buf[self.sub_range.clone()].copy_from_slice(&self.source);
        Ok(buf.freeze())
    }
}

/// One chunk-level piece of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSpan {
    pub index:     ChunkIndex,
    pub sub_range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// Nothing to read, nothing to return.
    Empty,
    /// The whole request lies past the end of the file.
    Zeroes(usize),
    /// Fetch these chunks in order and concatenate the sub-ranges.
    Chunks(Vec<ReadSpan>),
}

impl ReadPlan {
    pub fn len(&self) -> usize {
        match self {
            ReadPlan::Empty => 0,
            ReadPlan::Zeroes(n) => *n,
            ReadPlan::Chunks(spans) => spans.iter().map(|s| s.sub_range.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[derive(Debug, Clone)]
struct ChunkSlot {
    index:     ChunkIndex,
    sub_range: Range<usize>,
    // where this slot starts in the caller's buffer
    buf_start: usize,
}

/// [OffsetMapper] turns byte ranges into ordered chunk operations. It does no
/// I/O.
#[derive(Debug, Clone, Copy)]
pub struct OffsetMapper {
    chunk_size: usize,
}

impl OffsetMapper {
    pub fn new(chunk_size: usize) -> Self {
        debug_assert!(chunk_size > 0);
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    /// Chunk indices touched by `[offset, offset + length)`.
    pub fn chunk_span(&self, offset: FileOffset, length: u64) -> Range<ChunkIndex> {
        cal_chunk_span(offset, length, self.chunk_size)
    }

    /// Splits a write of `data` at `offset` into per-chunk ops, ascending.
    ///
    /// Head and tail chunks that are only partly covered are marked for
    /// read-modify-write; a tail ending exactly on a chunk boundary produces
    /// no extra op. A range whose end does not fit in a `u64` fails with
    /// `RangeOverflow`.
    pub fn write_ops(&self, offset: FileOffset, data: Bytes) -> Result<Vec<ChunkOp>> {
        let length = data.len() as u64;
        let end = offset
            .checked_add(length)
            .context(RangeOverflowSnafu { offset, length })?;
        Ok(self
            .locate(offset, end)
            .into_iter()
            .map(|slot| {
                let len = slot.sub_range.len();
                ChunkOp {
                    index: slot.index,
                    requires_read_before_write: len < self.chunk_size,
                    source: data.slice(slot.buf_start..slot.buf_start + len),
                    sub_range: slot.sub_range,
                }
            })
            .collect())
    }

    /// Plans a read of `length` bytes at `offset` from a file of `size` bytes.
    ///
    /// Reads starting at or past `size` return `length` zeros; reads running
    /// over `size` are clamped to it.
    pub fn read_plan(&self, size: u64, offset: FileOffset, length: usize) -> ReadPlan {
        if length == 0 {
            return ReadPlan::Empty;
        }
        if offset >= size {
            return ReadPlan::Zeroes(length);
        }
        // never past `size`, so the end cannot overflow.
        let end = offset + min(length as u64, size - offset);
        ReadPlan::Chunks(
            self.locate(offset, end)
                .into_iter()
                .map(|slot| ReadSpan {
                    index:     slot.index,
                    sub_range: slot.sub_range,
                })
                .collect(),
        )
    }

    /// Slots covering `[offset, end)`.
    fn locate(&self, offset: FileOffset, end: FileOffset) -> Vec<ChunkSlot> {
        if end <= offset {
            return Vec::new();
        }
        let start_chunk_idx = cal_chunk_idx(offset, self.chunk_size);
        // exclusive, so a range ending on a boundary stops before the next chunk.
        let end_chunk_idx = cal_chunk_count(end, self.chunk_size);

        let mut chunk_pos = cal_chunk_offset(offset, self.chunk_size);
        let mut buf_start = 0;
        let mut left = end - offset;

        (start_chunk_idx..end_chunk_idx)
            .map(|index| {
                let take = min((self.chunk_size - chunk_pos) as u64, left) as usize;
                let slot = ChunkSlot {
                    index,
                    sub_range: chunk_pos..chunk_pos + take,
                    buf_start,
                };
                chunk_pos = 0;
                buf_start += take;
                left -= take as u64;
                slot
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn input(len: usize) -> Bytes { Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>()) }

    #[test]
    fn write_crossing_two_boundaries() {
        let mapper = OffsetMapper::new(512);
        let data = input(1000);
        let ops = mapper.write_ops(100, data.clone()).unwrap();
        assert_eq!(ops.len(), 3);

        assert_eq!(ops[0].index, 0);
        assert_eq!(ops[0].sub_range, 100..512);
        assert!(ops[0].requires_read_before_write);
        assert_eq!(ops[0].source, data.slice(0..412));

        assert_eq!(ops[1].index, 1);
        assert_eq!(ops[1].sub_range, 0..512);
        assert!(!ops[1].requires_read_before_write);
        assert_eq!(ops[1].source, data.slice(412..924));

        assert_eq!(ops[2].index, 2);
        assert_eq!(ops[2].sub_range, 0..76);
        assert!(ops[2].requires_read_before_write);
        assert_eq!(ops[2].source, data.slice(924..1000));
    }

    #[test]
    fn aligned_write_needs_no_reads() {
        let mapper = OffsetMapper::new(512);
        let ops = mapper.write_ops(512, input(1024)).unwrap();
        assert_eq!(ops.iter().map(|o| o.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(ops.iter().all(|o| !o.requires_read_before_write));
    }

    #[test]
    fn write_inside_one_chunk() {
        let mapper = OffsetMapper::new(512);
        let ops = mapper.write_ops(600, input(10)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].index, 1);
        assert_eq!(ops[0].sub_range, 88..98);
        assert!(ops[0].requires_read_before_write);
    }

    #[test]
    fn write_ending_on_boundary_has_no_empty_tail() {
        let mapper = OffsetMapper::new(512);
        let ops = mapper.write_ops(100, input(412)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].sub_range, 100..512);
        assert!(mapper.write_ops(100, Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn write_near_the_end_of_the_offset_space() {
        let mapper = OffsetMapper::new(512);
        let err = mapper.write_ops(u64::MAX - 3, input(10)).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::RangeOverflow {
                offset: o,
                length: 10,
                ..
            } if o == u64::MAX - 3
        ));

        // ends exactly at u64::MAX, still representable.
        let ops = mapper.write_ops(u64::MAX - 4, input(4)).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].index, u64::MAX / 512);
        assert_eq!(ops[0].sub_range.len(), 4);
        assert!(ops[0].requires_read_before_write);

        assert!(mapper.write_ops(u64::MAX, Bytes::new()).unwrap().is_empty());
    }

    #[test]
    fn materialize_keeps_prior_bytes() {
        let codec = ChunkCodec {
            chunk_size:       8,
            base_entry_cost:  0,
            chunk_entry_cost: 0,
        };
        let mapper = OffsetMapper::new(8);
        let ops = mapper.write_ops(10, Bytes::from_static(b"xyz")).unwrap();
        assert_eq!(ops.len(), 1);

        let prior = b"abcdefgh";
        let chunk = ops[0].materialize(&codec, Some(prior)).unwrap();
        assert_eq!(chunk.as_ref(), b"abxyzfgh");

        let fresh = ops[0].materialize(&codec, None).unwrap();
        assert_eq!(fresh.as_ref(), b"\0\0xyz\0\0\0");

        let full = mapper.write_ops(8, Bytes::from_static(b"12345678")).unwrap();
        assert_eq!(
            full[0].materialize(&codec, Some(prior)).unwrap().as_ref(),
            b"12345678"
        );
    }

    #[test]
    fn read_plans() {
        let mapper = OffsetMapper::new(512);
        assert_eq!(mapper.read_plan(1024, 0, 0), ReadPlan::Empty);
        assert_eq!(mapper.read_plan(1024, 1024, 50), ReadPlan::Zeroes(50));
        assert_eq!(mapper.read_plan(0, 0, 10), ReadPlan::Zeroes(10));

        let plan = mapper.read_plan(1024, 1000, 100);
        assert_eq!(plan.len(), 24);
        assert_eq!(
            plan,
            ReadPlan::Chunks(vec![ReadSpan {
                index:     1,
                sub_range: 488..512,
            }])
        );

        let plan = mapper.read_plan(2048, 100, 1000);
        assert_eq!(
            plan,
            ReadPlan::Chunks(vec![
                ReadSpan {
                    index:     0,
                    sub_range: 100..512,
                },
                ReadSpan {
                    index:     1,
                    sub_range: 0..512,
                },
                ReadSpan {
                    index:     2,
                    sub_range: 0..76,
                },
            ])
        );
    }

    proptest! {
        #[test]
        fn write_ops_tile_the_range(
            chunk_size in 1usize..64,
            offset in 0u64..1000,
            len in 0usize..500,
        ) {
            let mapper = OffsetMapper::new(chunk_size);
            let data = input(len);
            let ops = mapper.write_ops(offset, data.clone()).unwrap();

            let mut pos = offset;
            let mut joined = Vec::with_capacity(len);
            for op in &ops {
                prop_assert_eq!(op.index * chunk_size as u64 + op.sub_range.start as u64, pos);
                prop_assert!(op.sub_range.end <= chunk_size);
                prop_assert!(!op.sub_range.is_empty());
                prop_assert_eq!(op.source.len(), op.sub_range.len());
                prop_assert_eq!(op.requires_read_before_write, op.sub_range.len() < chunk_size);
                pos += op.sub_range.len() as u64;
                joined.extend_from_slice(&op.source);
            }
            prop_assert_eq!(pos, offset + len as u64);
            prop_assert_eq!(joined, data.to_vec());
            prop_assert_eq!(ops.len() as u64, mapper.chunk_span(offset, len as u64).count() as u64);
        }

        #[test]
        fn read_plan_never_exceeds_request(
            size in 0u64..2000,
            offset in 0u64..2500,
            len in 0usize..700,
        ) {
            let mapper = OffsetMapper::new(128);
            let plan = mapper.read_plan(size, offset, len);
            prop_assert!(plan.len() <= len);
            if offset < size {
                prop_assert_eq!(plan.len() as u64, min(len as u64, size - offset));
            } else {
                prop_assert_eq!(plan.len(), len);
            }
        }
    }
}
