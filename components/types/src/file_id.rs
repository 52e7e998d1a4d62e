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

use std::fmt::{Debug, Display, Formatter};

use ledgerfs_common::FILE_ID_LEN;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ensure;

use crate::err::{InvalidFileIdSnafu, Result};

/// [FileId] is the primary key of every piece of per-file backend state.
///
/// It is the SHA-256 of the file name, so the same name always lands on the
/// same metadata entry and the same chunk keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId([u8; FILE_ID_LEN]);

impl FileId {
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut id = [0u8; FILE_ID_LEN];
        id.copy_from_slice(&digest);
        FileId(id)
    }

    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        ensure!(
            buf.len() == FILE_ID_LEN,
            InvalidFileIdSnafu { len: buf.len() }
        );
        let mut id = [0u8; FILE_ID_LEN];
        id.copy_from_slice(buf);
        Ok(FileId(id))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let buf = hex::decode(s).map_err(|_| InvalidFileIdSnafu { len: s.len() }.build())?;
        Self::from_slice(&buf)
    }

    pub fn as_bytes(&self) -> &[u8; FILE_ID_LEN] { &self.0 }

    pub fn to_hex(&self) -> String { hex::encode(self.0) }
}

impl From<[u8; FILE_ID_LEN]> for FileId {
    fn from(value: [u8; FILE_ID_LEN]) -> Self { FileId(value) }
}

impl AsRef<[u8]> for FileId {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.to_hex()) }
}

impl Debug for FileId {
    // the first 8 bytes are plenty to tell files apart in logs.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileId({})", hex::encode(&self.0[..8]))
    }
}
