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

use snafu::{Location, Snafu};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("metadata entry too short: {len} bytes"))]
    InvalidMetaBuf {
        len:      usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("metadata name is not valid utf-8"))]
    MetaNameNotUtf8 {
        #[snafu(implicit)]
        location: Location,
        source:   std::string::FromUtf8Error,
    },

    #[snafu(display("metadata entry {key} holds name {name:?} that hashes elsewhere"))]
    MetaIdMismatch {
        key:      String,
        name:     String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid file name {name:?}: {reason}"))]
    InvalidName {
        name:     String,
        reason:   &'static str,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid file id length: {len}"))]
    InvalidFileId {
        len:      usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("invalid chunk key length: {len}"))]
    InvalidChunkKey {
        len:      usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("chunk index {index} exceeds bitmap capacity {capacity}"))]
    BitOutOfRange {
        index:    u64,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
}
