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

use std::{error::Error, str::FromStr};

use snafu::{whatever, ResultExt, Whatever};

/// Prefix shared by every ledgerfs environment variable.
pub const ENV_PREFIX: &str = "LEDGERFS_";

/// `dsn` -> `LEDGERFS_DSN`.
pub fn env_key(name: &str) -> String { format!("{ENV_PREFIX}{}", name.to_ascii_uppercase()) }

/// Reads an environment variable, loading `.env` from the current or parent
/// directories first. An unset variable is `Ok(None)`, not an error.
#[track_caller]
pub fn var(key: &str) -> Result<Option<String>, Whatever> {
    match dotenvy::var(key) {
        Ok(content) => Ok(Some(content)),
        Err(dotenvy::Error::EnvVar(std::env::VarError::NotPresent)) => Ok(None),
        Err(error) => whatever!(Err(error), "Failed to read {key} environment variable"),
    }
}

/// Like [var], and parses the value when it is set.
#[track_caller]
pub fn var_parsed<R>(key: &str) -> Result<Option<R>, Whatever>
where
    R: FromStr,
    R::Err: Error + Send + Sync + 'static,
{
    var(key)?
        .map(|content| {
            content
                .parse()
                .with_whatever_context(|e| format!("Failed to parse {key} environment variable; {e}"))
        })
        .transpose()
}

/// Overwrites `slot` with the parsed value of `LEDGERFS_<NAME>` when present.
pub fn override_from_env<R>(name: &str, slot: &mut R) -> Result<(), Whatever>
where
    R: FromStr,
    R::Err: Error + Send + Sync + 'static,
{
    if let Some(v) = var_parsed(&env_key(name))? {
        *slot = v;
    }
    Ok(())
}
