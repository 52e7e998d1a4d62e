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

//! Maps byte-addressed files onto a backend of fixed-size, individually keyed
//! chunks with per-entry storage cost and bounded atomic groups.

pub mod adapter;
pub mod codec;
pub mod config;
pub mod err;
pub mod mapper;
pub mod registry;
pub mod store;

pub use adapter::{BatchReport, StorageAdapter};
pub use err::{Error, Result};
