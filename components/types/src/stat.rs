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

use ledgerfs_utils::readable_size::ReadableSize;

use crate::{file_id::FileId, meta::FileMeta};

pub const FILE_MODE: u32 = libc::S_IFREG as u32 | 0o666;

/// [FileStat] is what the registry reports for one file.
#[derive(Clone, PartialEq, Eq)]
pub struct FileStat {
    pub id:     FileId,
    pub name:   String,
    /// Apparent size: occupied chunks times chunk size.
    pub size:   u64,
    /// One past the highest occupied chunk, in bytes.
    pub extent: u64,
    pub chunks: usize,
    pub mode:   u32,
    pub nlink:  u32,
}

impl FileStat {
    pub fn from_meta(meta: &FileMeta, chunk_size: usize) -> Self {
        let chunks = meta.occupancy.count();
        FileStat {
            id: meta.id,
            name: meta.name.clone(),
            size: chunks as u64 * chunk_size as u64,
            extent: meta
                .occupancy
                .highest()
                .map_or(0, |i| (i + 1) * chunk_size as u64),
            chunks,
            mode: FILE_MODE,
            nlink: 1,
        }
    }
}

impl Debug for FileStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStat")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &ReadableSize(self.size))
            .field("extent", &ReadableSize(self.extent))
            .field("chunks", &self.chunks)
            .field("mode", &format_args!("{:o}", self.mode))
            .finish()
    }
}
