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

use ledgerfs_types::{Errno, ToErrno};
use snafu::{Location, Snafu};
use tracing::error;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("storage: {source}"))]
    StorageError { source: ledgerfs_storage::Error },

    // ====VFS====
    #[snafu(display("libc error {errno}"))]
    LibcError {
        errno:    libc::c_int,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ledgerfs_storage::Error> for Error {
    fn from(value: ledgerfs_storage::Error) -> Self { Self::StorageError { source: value } }
}

impl Error {
    pub fn storage(&self) -> Option<&ledgerfs_storage::Error> {
        match self {
            Self::StorageError { source } => Some(source),
            Self::LibcError { .. } => None,
        }
    }
}

impl ToErrno for Error {
    fn to_errno(&self) -> Errno {
        match self {
            Self::LibcError { errno, .. } => *errno,
            Self::StorageError { source } => {
                let errno = source.to_errno();
                if errno != libc::ENOENT {
                    error!("storage error: {}", source);
                }
                errno
            }
        }
    }
}
