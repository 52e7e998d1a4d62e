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

use std::path::Path;

use ledgerfs_common::{
    chunk_entry_cost, DEFAULT_BASE_ENTRY_COST, DEFAULT_CHUNK_SIZE, DEFAULT_GROUP_LIMIT,
    DEFAULT_INITIAL_BALANCE, LEDGERFS_DEBUG_STORE_ADDR,
};
use ledgerfs_utils::{
    env::{env_key, override_from_env, var_parsed},
    readable_size::ReadableSize,
};
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};

use crate::err::{ConfigParseSnafu, InvalidConfigSnafu, LocalIoSnafu, Result};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend to talk to, e.g. `memory://:` or `local://:/tmp/ledgerfs.data`.
    pub dsn: String,

    /// Size of one storage unit. Fixed for the lifetime of a deployment.
    pub chunk_size: ReadableSize,
    /// Max number of chunk operations per atomic group.
    pub group_limit: usize,

    // ========Reservation pricing ===>
    pub base_entry_cost:  u64,
    /// Price of one chunk entry. Derived from `chunk_size` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_entry_cost: Option<u64>,
    /// Payer balance a fresh backend starts with.
    pub initial_balance:  u64,
}

impl StorageConfig {
    pub fn with_dsn(&mut self, dsn: &str) -> &mut Self {
        self.dsn = dsn.to_string();
        self
    }

    pub fn with_chunk_size(&mut self, chunk_size: usize) -> &mut Self {
        self.chunk_size = ReadableSize(chunk_size as u64);
        self
    }

    /// Pins the chunk entry price instead of deriving it from the chunk size.
    pub fn with_chunk_entry_cost(&mut self, cost: u64) -> &mut Self {
        self.chunk_entry_cost = Some(cost);
        self
    }

    pub fn with_group_limit(&mut self, group_limit: usize) -> &mut Self {
        self.group_limit = group_limit;
        self
    }

    pub fn with_initial_balance(&mut self, balance: u64) -> &mut Self {
        self.initial_balance = balance;
        self
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size.as_bytes_usize() }

    pub fn chunk_entry_cost(&self) -> u64 {
        self.chunk_entry_cost
            .unwrap_or_else(|| chunk_entry_cost(self.chunk_size()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StorageConfig = toml::from_str(s).context(ConfigParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(LocalIoSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `LEDGERFS_*` environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        let to_config_err = |e: snafu::Whatever| {
            InvalidConfigSnafu {
                reason: e.to_string(),
            }
            .build()
        };
        override_from_env("dsn", &mut self.dsn).map_err(to_config_err)?;
        override_from_env("chunk_size", &mut self.chunk_size).map_err(to_config_err)?;
        override_from_env("group_limit", &mut self.group_limit).map_err(to_config_err)?;
        override_from_env("base_entry_cost", &mut self.base_entry_cost).map_err(to_config_err)?;
        if let Some(cost) = var_parsed(&env_key("chunk_entry_cost")).map_err(to_config_err)? {
            self.chunk_entry_cost = Some(cost);
        }
        override_from_env("initial_balance", &mut self.initial_balance).map_err(to_config_err)?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.chunk_size() > 0,
            InvalidConfigSnafu {
                reason: "chunk_size must be positive",
            }
        );
        ensure!(
            self.group_limit > 0,
            InvalidConfigSnafu {
                reason: "group_limit must be positive",
            }
        );
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn:              LEDGERFS_DEBUG_STORE_ADDR.to_string(),
            chunk_size:       ReadableSize(DEFAULT_CHUNK_SIZE as u64),
            group_limit:      DEFAULT_GROUP_LIMIT,
            base_entry_cost:  DEFAULT_BASE_ENTRY_COST,
            chunk_entry_cost: None,
            initial_balance:  DEFAULT_INITIAL_BALANCE,
        }
    }
}
