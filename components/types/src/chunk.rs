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

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use byteorder::{BigEndian, ByteOrder};
use ledgerfs_common::{ChunkIndex, CHUNK_KEY_LEN, FILE_ID_LEN};
use snafu::ensure;

use crate::{
    err::{Error, InvalidChunkKeySnafu, Result},
    file_id::FileId,
};

pub type RawChunkKey = [u8; CHUNK_KEY_LEN];

/// The backend lookup key of one chunk: `file_id || big-endian(index)`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ChunkKey {
    pub file_id: FileId,
    pub index:   ChunkIndex,
}

impl ChunkKey {
    pub fn new(file_id: FileId, index: ChunkIndex) -> Self { Self { file_id, index } }

    pub fn encode(&self) -> RawChunkKey {
        let mut buf = [0u8; CHUNK_KEY_LEN];
        buf[..FILE_ID_LEN].copy_from_slice(self.file_id.as_bytes());
        BigEndian::write_u64(&mut buf[FILE_ID_LEN..], self.index);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() == CHUNK_KEY_LEN,
            InvalidChunkKeySnafu { len: buf.len() }
        );
        Ok(ChunkKey {
            file_id: FileId::from_slice(&buf[..FILE_ID_LEN])?,
            index:   BigEndian::read_u64(&buf[FILE_ID_LEN..]),
        })
    }

    /// The hex form is what path-based backends use as the object name.
    pub fn to_hex(&self) -> String { hex::encode(self.encode()) }
}

impl Display for ChunkKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_id, self.index)
    }
}

impl FromStr for ChunkKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let buf = hex::decode(s).map_err(|_| InvalidChunkKeySnafu { len: s.len() / 2 }.build())?;
        ChunkKey::decode(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_id_then_big_endian_index() {
        let id = FileId::from_name("a");
        let key = ChunkKey::new(id, 0x0102_0304_0506_0708).encode();
        assert_eq!(key.len(), 40);
        assert_eq!(&key[..32], id.as_bytes());
        assert_eq!(&key[32..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn key_from_hex() {
        let key = ChunkKey::new(FileId::from_name("b"), 255);
        let parsed: ChunkKey = key.to_hex().parse().unwrap();
        assert_eq!(parsed, key);
        assert!(ChunkKey::decode(&[0u8; 39]).is_err());
    }
}
