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

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use ledgerfs_types::file_id::FileId;

/// Per-file mutual exclusion. Operations on one file run one at a time,
/// different files do not wait for each other.
#[derive(Debug, Default)]
pub(crate) struct FileLocks {
    table: DashMap<FileId, Arc<Mutex<()>>>,
}

impl FileLocks {
    /// Runs `f` while holding the lock of `id`.
    pub(crate) fn with_lock<R>(&self, id: &FileId, f: impl FnOnce() -> R) -> R {
        // clone the handle out so the dashmap shard is not held while waiting.
        let handle = self.table.entry(*id).or_default().clone();
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drops the table entry of `id` unless someone else holds or waits on it.
    pub(crate) fn forget(&self, id: &FileId) {
        self.table.remove_if(id, |_, handle| Arc::strong_count(handle) == 1);
    }

    pub(crate) fn len(&self) -> usize { self.table.len() }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn serializes_one_file() {
        let locks = Arc::new(FileLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let id = FileId::from_name("f");

        let handles = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        locks.with_lock(&id, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect::<Vec<_>>();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn forget_removes_idle_entries() {
        let locks = FileLocks::default();
        let a = FileId::from_name("a");
        locks.with_lock(&a, || ());
        assert_eq!(locks.len(), 1);
        locks.forget(&a);
        assert_eq!(locks.len(), 0);
    }
}
