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

use ledgerfs_common::ChunkIndex;
use ledgerfs_types::{file_id::FileId, ToErrno};
use snafu::{Location, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    FileMeta,
    Chunk,
    File,
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{kind:?} {key} not found"))]
    NotFound {
        kind:     EntryKind,
        key:      String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("file {name:?} already exists"))]
    FileExists {
        name:     String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("reservation of {available} does not cover required {required}"))]
    InsufficientReservation {
        required:  u64,
        available: u64,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("file {id} still holds {occupied} chunks"))]
    NonEmptyFile {
        id:       FileId,
        occupied: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "batch failed after committing {committed_groups} groups ({} chunks): {source}",
        committed_indices.len()
    ))]
    PartialBatchFailure {
        committed_groups:  usize,
        committed_indices: Vec<ChunkIndex>,
        #[snafu(implicit)]
        location:          Location,
        source:            Box<Error>,
    },

    #[snafu(display("backend unavailable: {reason}"))]
    BackendUnavailable {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("payload of {len} bytes exceeds chunk size {chunk_size}"))]
    ChunkTooLarge {
        len:        usize,
        chunk_size: usize,
        #[snafu(implicit)]
        location:   Location,
    },

    #[snafu(display("payload of {len} bytes is not exactly chunk size {chunk_size}"))]
    ChunkSizeMismatch {
        len:        usize,
        chunk_size: usize,
        #[snafu(implicit)]
        location:   Location,
    },

    #[snafu(display("range of {length} bytes at offset {offset} overflows the file offset space"))]
    RangeOverflow {
        offset:   u64,
        length:   u64,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("chunk index {index} beyond capacity {capacity}"))]
    ChunkIndexOutOfRange {
        index:    ChunkIndex,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("group of {len} ops exceeds limit {limit}"))]
    GroupTooLarge {
        len:      usize,
        limit:    usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid config: {reason}"))]
    InvalidConfig {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    UnsupportedStoreDSN {
        dsn:      String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("model error: {source}"))]
    ModelError {
        #[snafu(implicit)]
        location: Location,
        source:   ledgerfs_types::Error,
    },

    #[snafu(display("local store io on {path}: {source}"))]
    LocalIo {
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   std::io::Error,
    },

    LedgerCodec {
        #[snafu(implicit)]
        location: Location,
        source:   bincode::Error,
    },

    ConfigParse {
        #[snafu(implicit)]
        location: Location,
        source:   toml::de::Error,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool { matches!(self, Error::NotFound { .. }) }

    pub fn is_partial(&self) -> bool { matches!(self, Error::PartialBatchFailure { .. }) }
}

impl From<ledgerfs_types::Error> for Error {
    fn from(source: ledgerfs_types::Error) -> Self {
        Error::ModelError {
            location: snafu::location!(),
            source,
        }
    }
}

impl ToErrno for Error {
    fn to_errno(&self) -> libc::c_int {
        match self {
            Error::NotFound { .. } => libc::ENOENT,
            Error::RangeOverflow { .. } => libc::EFBIG,
            _ => libc::EIO,
        }
    }
}
