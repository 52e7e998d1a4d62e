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

use ledgerfs_common::{BITMAP_BYTES, MAX_NAME_LENGTH};
use snafu::{ensure, ResultExt};

use crate::{
    bitmap::OccupancyBitmap,
    err::{InvalidMetaBufSnafu, InvalidNameSnafu, MetaIdMismatchSnafu, MetaNameNotUtf8Snafu, Result},
    file_id::FileId,
};

/// Checks a name against the flat namespace rules.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("empty")
    } else if name.len() > MAX_NAME_LENGTH {
        Some("too long")
    } else if name.contains('/') {
        Some("contains '/'")
    } else if name.contains('\0') {
        Some("contains NUL")
    } else if name == "." || name == ".." {
        Some("reserved")
    } else {
        None
    };
    match reason {
        Some(reason) => InvalidNameSnafu {
            name: name.to_string(),
            reason,
        }
        .fail(),
        None => Ok(()),
    }
}

/// [FileMeta] is the decoded metadata entry of one file.
///
/// The persisted layout is `occupancy_bitmap(32 bytes) || name(utf-8)`;
/// `size_hint` is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub id:        FileId,
    pub name:      String,
    pub occupancy: OccupancyBitmap,
    /// Bytes of payload the file's current reservation covers, when known.
    pub size_hint: Option<u64>,
}

impl FileMeta {
    pub fn new(name: &str) -> Self {
        FileMeta {
            id:        FileId::from_name(name),
            name:      name.to_string(),
            occupancy: OccupancyBitmap::default(),
            size_hint: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BITMAP_BYTES + self.name.len());
        buf.extend_from_slice(self.occupancy.as_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }

    /// Decodes the entry stored under `id`, rejecting entries whose name does
    /// not hash back to the key.
    pub fn decode(id: FileId, buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() >= BITMAP_BYTES,
            InvalidMetaBufSnafu { len: buf.len() }
        );
        let mut bits = [0u8; BITMAP_BYTES];
        bits.copy_from_slice(&buf[..BITMAP_BYTES]);
        let name = String::from_utf8(buf[BITMAP_BYTES..].to_vec()).context(MetaNameNotUtf8Snafu)?;
        ensure!(
            FileId::from_name(&name) == id,
            MetaIdMismatchSnafu {
                key: id.to_hex(),
                name,
            }
        );
        Ok(FileMeta {
            id,
            name,
            occupancy: OccupancyBitmap::from_bytes(bits),
            size_hint: None,
        })
    }

    pub fn state(&self) -> FileState { FileState::of(Some(self)) }
}

/// Lifecycle of a file's backend state.
///
/// `Absent -> Empty -> Populated(n) -> ... -> Empty -> Absent`. A freshly
/// created entry starts `Empty`; only an `Empty` entry may be deleted.
/// Transitions for one file must be serialized by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Absent,
    Empty,
    Populated(usize),
}

impl FileState {
    pub fn of(meta: Option<&FileMeta>) -> Self {
        match meta {
            None => FileState::Absent,
            Some(m) if m.occupancy.is_empty() => FileState::Empty,
            Some(m) => FileState::Populated(m.occupancy.count()),
        }
    }

    pub fn can_delete(&self) -> bool { matches!(self, FileState::Empty) }
}
