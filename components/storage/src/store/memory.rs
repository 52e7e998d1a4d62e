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
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use ledgerfs_common::ChunkIndex;
use ledgerfs_types::{
    chunk::{ChunkKey, RawChunkKey},
    file_id::FileId,
    meta::FileMeta,
};
use snafu::{ensure, OptionExt};
use tracing::debug;

use super::{check_creation_payment, ledger::Ledger, stage_group, ChunkStore, GroupOp};
use crate::{
    codec::ChunkCodec,
    config::StorageConfig,
    err::{
        BackendUnavailableSnafu, EntryKind, FileExistsSnafu, NonEmptyFileSnafu, NotFoundSnafu,
        Result,
    },
};

#[derive(Debug, Default)]
struct Faults {
    unavailable:    bool,
    // fail the commit_group call with this sequence number
    fail_commit_at: Option<usize>,
    commits:        usize,
    group_sizes:    Vec<usize>,
}

#[derive(Debug)]
struct State {
    metas:  BTreeMap<FileId, Vec<u8>>,
    chunks: HashMap<RawChunkKey, Bytes>,
    ledger: Ledger,
    faults: Faults,
}

/// [MemoryChunkStore] emulates a chunk backend, ledger included, inside the
/// process. It can also be told to fail, which is what the tests use it for.
#[derive(Debug)]
pub struct MemoryChunkStore {
    codec: ChunkCodec,
    limit: usize,
    state: Mutex<State>,
}

impl MemoryChunkStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            codec: ChunkCodec::new(config),
            limit: config.group_limit,
            state: Mutex::new(State {
                metas:  BTreeMap::new(),
                chunks: HashMap::new(),
                ledger: Ledger::new(config.initial_balance),
                faults: Faults::default(),
            }),
        }
    }

    /// Makes the `n`-th upcoming `commit_group` call fail, counting from 0.
    pub fn fail_nth_commit(&self, n: usize) {
        let mut state = self.lock();
        state.faults.fail_commit_at = Some(state.faults.commits + n);
    }

    /// While unavailable every call fails with `BackendUnavailable`.
    pub fn set_available(&self, available: bool) { self.lock().faults.unavailable = !available; }

    /// Sizes of every `commit_group` call so far, failed ones included.
    pub fn group_sizes(&self) -> Vec<usize> { self.lock().faults.group_sizes.clone() }

    pub fn chunk_count(&self) -> usize { self.lock().chunks.len() }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn available(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        ensure!(
            !state.faults.unavailable,
            BackendUnavailableSnafu {
                reason: "memory store switched off",
            }
        );
        Ok(state)
    }

    fn apply(&self, state: &mut State, file_id: &FileId, ops: &[GroupOp]) -> Result<()> {
        let buf = state.metas.get(file_id).context(NotFoundSnafu {
            kind: EntryKind::FileMeta,
            key:  file_id.to_hex(),
        })?;
        let mut meta = FileMeta::decode(*file_id, buf)?;
        let deposit = state.ledger.deposit_of(file_id).unwrap_or_default();
        meta.occupancy = stage_group(&self.codec, self.limit, &meta, deposit, ops)?;

        for op in ops {
            let key = ChunkKey::new(*file_id, op.index()).encode();
            match op {
                GroupOp::Write { payload, .. } => {
                    state.chunks.insert(key, payload.clone());
                }
                GroupOp::Delete { .. } => {
                    state.chunks.remove(&key);
                }
            }
        }
        state.metas.insert(*file_id, meta.encode());
        Ok(())
    }
}

impl ChunkStore for MemoryChunkStore {
    fn chunk_size(&self) -> usize { self.codec.chunk_size }

    fn max_group_ops(&self) -> usize { self.limit }

    fn create_file(&self, payment: u64, file_id: &FileId, name: &str) -> Result<()> {
        let mut state = self.available()?;
        check_creation_payment(&self.codec, payment)?;
        ensure!(
            !state.metas.contains_key(file_id),
            FileExistsSnafu { name }
        );
        let meta = FileMeta::new(name);
        state.ledger.open_account(file_id, payment)?;
        state.metas.insert(*file_id, meta.encode());
        debug!("memory store created file {name:?} ({file_id}) paying {payment}");
        Ok(())
    }

    fn deposit(&self, file_id: &FileId, amount: u64) -> Result<()> {
        self.available()?.ledger.top_up(file_id, amount)
    }

    fn reservation(&self, file_id: &FileId) -> Result<u64> {
        self.available()?
            .ledger
            .deposit_of(file_id)
            .context(NotFoundSnafu {
                kind: EntryKind::File,
                key:  file_id.to_hex(),
            })
    }

    fn balance(&self) -> Result<u64> { Ok(self.available()?.ledger.balance()) }

    fn get_meta(&self, file_id: &FileId) -> Result<Option<Vec<u8>>> {
        Ok(self.available()?.metas.get(file_id).cloned())
    }

    fn list_meta(&self) -> Result<Vec<(FileId, Vec<u8>)>> {
        Ok(self
            .available()?
            .metas
            .iter()
            .map(|(id, buf)| (*id, buf.clone()))
            .collect())
    }

    fn get_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>> {
        Ok(self.available()?.chunks.get(&key.encode()).cloned())
    }

    fn write_chunk(&self, file_id: &FileId, index: ChunkIndex, data: Bytes) -> Result<()> {
        let mut state = self.available()?;
        self.apply(
            &mut state,
            file_id,
            &[GroupOp::Write {
                index,
                payload: data,
            }],
        )
    }

    fn delete_chunk(&self, key: &ChunkKey) -> Result<()> {
        let mut state = self.available()?;
        self.apply(&mut state, &key.file_id, &[GroupOp::Delete { index: key.index }])
    }

    fn commit_group(&self, file_id: &FileId, ops: &[GroupOp]) -> Result<()> {
        let mut state = self.available()?;
        let seq = state.faults.commits;
        state.faults.commits += 1;
        state.faults.group_sizes.push(ops.len());
        if state.faults.fail_commit_at == Some(seq) {
            state.faults.fail_commit_at = None;
            return BackendUnavailableSnafu {
                reason: format!("injected failure of group commit #{seq}"),
            }
            .fail();
        }
        self.apply(&mut state, file_id, ops)
    }

    fn delete_file(&self, file_id: &FileId) -> Result<u64> {
        let mut state = self.available()?;
        let buf = state.metas.get(file_id).context(NotFoundSnafu {
            kind: EntryKind::FileMeta,
            key:  file_id.to_hex(),
        })?;
        let meta = FileMeta::decode(*file_id, buf)?;
        ensure!(
            meta.occupancy.is_empty(),
            NonEmptyFileSnafu {
                id:       *file_id,
                occupied: meta.occupancy.count(),
            }
        );
        let refund = state.ledger.close_account(file_id)?;
        state.metas.remove(file_id);
        debug!("memory store deleted file {file_id}, refunded {refund}");
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::err::Error;

    fn store() -> MemoryChunkStore {
        let mut config = StorageConfig::default();
        config.with_chunk_size(8).with_group_limit(4);
        MemoryChunkStore::new(&config)
    }

    fn chunk(b: u8) -> Bytes { Bytes::from(vec![b; 8]) }

    fn funded(store: &MemoryChunkStore, name: &str) -> FileId {
        let id = FileId::from_name(name);
        let cost = store.codec.file_reservation_cost(8 * 256);
        store.create_file(cost, &id, name).unwrap();
        id
    }

    #[test]
    fn chunk_and_bit_move_together() {
        let store = store();
        let id = funded(&store, "a");
        store.write_chunk(&id, 2, chunk(7)).unwrap();

        let meta = FileMeta::decode(id, &store.get_meta(&id).unwrap().unwrap()).unwrap();
        assert!(meta.occupancy.test(2));
        assert_eq!(store.get_chunk(&ChunkKey::new(id, 2)).unwrap(), Some(chunk(7)));

        store.delete_chunk(&ChunkKey::new(id, 2)).unwrap();
        let meta = FileMeta::decode(id, &store.get_meta(&id).unwrap().unwrap()).unwrap();
        assert!(meta.occupancy.is_empty());
        assert_eq!(store.get_chunk(&ChunkKey::new(id, 2)).unwrap(), None);
        assert!(store
            .delete_chunk(&ChunkKey::new(id, 2))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn create_twice_fails() {
        let store = store();
        let id = funded(&store, "a");
        let err = store.create_file(1 << 20, &id, "a").unwrap_err();
        assert!(matches!(err, Error::FileExists { .. }));
    }

    #[test]
    fn rejected_group_leaves_no_trace() {
        let store = store();
        let id = funded(&store, "a");
        let ops = vec![
            GroupOp::Write {
                index:   0,
                payload: chunk(1),
            },
            GroupOp::Delete { index: 5 },
        ];
        assert!(store.commit_group(&id, &ops).unwrap_err().is_not_found());
        assert_eq!(store.chunk_count(), 0);
        assert_eq!(store.group_sizes(), vec![2]);
    }

    #[test]
    fn injected_commit_failure() {
        let store = store();
        let id = funded(&store, "a");
        let op = |i| GroupOp::Write {
            index:   i,
            payload: chunk(1),
        };
        store.fail_nth_commit(1);
        store.commit_group(&id, &[op(0)]).unwrap();
        assert!(matches!(
            store.commit_group(&id, &[op(1)]),
            Err(Error::BackendUnavailable { .. })
        ));
        store.commit_group(&id, &[op(1)]).unwrap();
        assert_eq!(store.group_sizes(), vec![1, 1, 1]);
        assert_eq!(store.chunk_count(), 2);
    }

    #[test]
    fn outage_blocks_everything() {
        let store = store();
        let id = funded(&store, "a");
        store.set_available(false);
        assert!(matches!(
            store.get_meta(&id),
            Err(Error::BackendUnavailable { .. })
        ));
        assert!(store.write_chunk(&id, 0, chunk(0)).is_err());
        store.set_available(true);
        assert!(store.get_meta(&id).unwrap().is_some());
    }

    #[test]
    fn delete_file_refunds_only_when_empty() {
        let store = store();
        let before = store.balance().unwrap();
        let id = funded(&store, "a");
        let deposit = store.reservation(&id).unwrap();
        store.write_chunk(&id, 0, chunk(1)).unwrap();

        assert!(matches!(
            store.delete_file(&id),
            Err(Error::NonEmptyFile { occupied: 1, .. })
        ));
        store.delete_chunk(&ChunkKey::new(id, 0)).unwrap();
        assert_eq!(store.delete_file(&id).unwrap(), deposit);
        assert_eq!(store.balance().unwrap(), before);
        assert!(store.delete_file(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn unfunded_growth_is_rejected() {
        let store = store();
        let id = FileId::from_name("poor");
        let floor = store.codec.file_reservation_cost(0);
        store.create_file(floor, &id, "poor").unwrap();
        assert!(matches!(
            store.write_chunk(&id, 0, chunk(1)),
            Err(Error::InsufficientReservation { .. })
        ));
        store
            .deposit(&id, store.codec.chunk_entry_cost)
            .unwrap();
        store.write_chunk(&id, 0, chunk(1)).unwrap();
        assert!(store
            .create_file(floor - 1, &FileId::from_name("x"), "x")
            .is_err());
    }
}
