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

pub mod bitmap;
pub mod chunk;
pub mod err;
pub mod file_id;
pub mod meta;
pub mod stat;

pub use err::{Error, Result};

pub type Errno = libc::c_int;

/// Maps an error onto the errno a POSIX binding should report.
pub trait ToErrno {
    fn to_errno(&self) -> Errno;
}
