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

use std::collections::BTreeMap;

use ledgerfs_types::file_id::FileId;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};

use crate::err::{
    EntryKind, InsufficientReservationSnafu, LedgerCodecSnafu, NotFoundSnafu, Result,
};

/// [Ledger] tracks the payer balance and the deposit held for every file.
///
/// Moving value between the two is the only thing it does; pricing lives in
/// [crate::codec::ChunkCodec].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    balance:  u64,
    deposits: BTreeMap<FileId, u64>,
}

impl Ledger {
    pub fn new(initial_balance: u64) -> Self {
        Self {
            balance:  initial_balance,
            deposits: BTreeMap::new(),
        }
    }

    pub fn balance(&self) -> u64 { self.balance }

    pub fn deposit_of(&self, id: &FileId) -> Option<u64> { self.deposits.get(id).copied() }

    /// Moves `payment` from the balance into a fresh deposit for `id`.
    pub fn open_account(&mut self, id: &FileId, payment: u64) -> Result<()> {
        self.withdraw(payment)?;
        self.deposits.insert(*id, payment);
        Ok(())
    }

    pub fn top_up(&mut self, id: &FileId, amount: u64) -> Result<()> {
        ensure!(
            self.deposits.contains_key(id),
            NotFoundSnafu {
                kind: EntryKind::File,
                key:  id.to_hex(),
            }
        );
        self.withdraw(amount)?;
        if let Some(deposit) = self.deposits.get_mut(id) {
            *deposit += amount;
        }
        Ok(())
    }

    /// Closes the account of `id` and returns its deposit to the balance.
    pub fn close_account(&mut self, id: &FileId) -> Result<u64> {
        let refund = self.deposits.remove(id).context(NotFoundSnafu {
            kind: EntryKind::File,
            key:  id.to_hex(),
        })?;
        self.balance += refund;
        Ok(refund)
    }

    pub fn encode(&self) -> Result<Vec<u8>> { bincode::serialize(self).context(LedgerCodecSnafu) }

    pub fn decode(buf: &[u8]) -> Result<Self> { bincode::deserialize(buf).context(LedgerCodecSnafu) }

    fn withdraw(&mut self, amount: u64) -> Result<()> {
        ensure!(
            self.balance >= amount,
            InsufficientReservationSnafu {
                required:  amount,
                available: self.balance,
            }
        );
        self.balance -= amount;
        Ok(())
    }
}
