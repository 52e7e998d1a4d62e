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

use ledgerfs_types::{
    file_id::FileId,
    meta::{FileMeta, FileState},
    stat::FileStat,
};
use snafu::OptionExt;
use tracing::warn;

use crate::{
    codec::ChunkCodec,
    err::{EntryKind, NotFoundSnafu, Result},
    store::{ChunkStore, ChunkStoreRef},
};

/// [FileRegistry] answers namespace queries by scanning the store.
///
/// Nothing is cached: every call goes back to the backend.
#[derive(Clone)]
pub struct FileRegistry {
    store: ChunkStoreRef,
    codec: ChunkCodec,
}

impl FileRegistry {
    pub fn new(store: ChunkStoreRef, codec: ChunkCodec) -> Self { Self { store, codec } }

    /// Every file in the store keyed by name. Entries whose name does not
    /// hash back to their key are skipped.
    pub fn list_files(&self) -> Result<BTreeMap<String, FileStat>> {
        let mut files = BTreeMap::new();
        for (id, buf) in self.store.list_meta()? {
            match FileMeta::decode(id, &buf) {
                Ok(meta) => {
                    files.insert(
                        meta.name.clone(),
                        FileStat::from_meta(&meta, self.codec.chunk_size),
                    );
                }
                Err(e) => warn!("skipping metadata entry {id}: {e}"),
            }
        }
        Ok(files)
    }

    pub fn exists(&self, name: &str) -> Result<bool> { Ok(self.list_files()?.contains_key(name)) }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        self.list_files()?.remove(name).context(NotFoundSnafu {
            kind: EntryKind::File,
            key:  name,
        })
    }

    /// Fetches the entry of `name` directly, with `size_hint` set to the
    /// payload bytes its reservation covers.
    pub fn lookup(&self, name: &str) -> Result<Option<FileMeta>> {
        let id = FileId::from_name(name);
        let Some(buf) = self.store.get_meta(&id)? else {
            return Ok(None);
        };
        let mut meta = FileMeta::decode(id, &buf)?;
        let deposit = self.store.reservation(&id)?;
        meta.size_hint = Some(self.codec.reserved_capacity(deposit));
        Ok(Some(meta))
    }

    pub fn state(&self, name: &str) -> Result<FileState> {
        Ok(FileState::of(self.lookup(name)?.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use rstest::rstest;

    use super::*;
    use crate::{config::StorageConfig, store::MemoryChunkStore};

    fn setup() -> (Arc<MemoryChunkStore>, FileRegistry) {
        let mut config = StorageConfig::default();
        config.with_chunk_size(8);
        let store = Arc::new(MemoryChunkStore::new(&config));
        let registry = FileRegistry::new(store.clone(), ChunkCodec::new(&config));
        (store, registry)
    }

    fn create(store: &MemoryChunkStore, name: &str, chunks: &[u64]) -> FileId {
        let id = FileId::from_name(name);
        store.create_file(1 << 24, &id, name).unwrap();
        for i in chunks {
            store.write_chunk(&id, *i, Bytes::from(vec![1u8; 8])).unwrap();
        }
        id
    }

    #[test]
    fn lists_sorted_by_name_with_popcount_size() {
        let (store, registry) = setup();
        create(&store, "b", &[0, 1, 2]);
        create(&store, "a", &[5]);

        let files = registry.list_files().unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(files["a"].size, 8);
        assert_eq!(files["a"].extent, 48);
        assert_eq!(files["b"].size, 24);
        assert_eq!(files["b"].chunks, 3);
    }

    #[test]
    fn always_sees_fresh_state() {
        let (store, registry) = setup();
        assert!(!registry.exists("a").unwrap());
        let id = create(&store, "a", &[]);
        assert!(registry.exists("a").unwrap());
        assert_eq!(registry.stat("a").unwrap().size, 0);

        store.write_chunk(&id, 0, Bytes::from(vec![2u8; 8])).unwrap();
        assert_eq!(registry.stat("a").unwrap().size, 8);
        assert!(registry.stat("missing").unwrap_err().is_not_found());
    }

    #[rstest]
    #[case(&[], FileState::Empty)]
    #[case(&[0], FileState::Populated(1))]
    #[case(&[1, 7, 9], FileState::Populated(3))]
    fn state_follows_occupancy(#[case] chunks: &[u64], #[case] expected: FileState) {
        let (store, registry) = setup();
        assert_eq!(registry.state("f").unwrap(), FileState::Absent);
        create(&store, "f", chunks);
        assert_eq!(registry.state("f").unwrap(), expected);
    }

    #[test]
    fn lookup_reports_reserved_capacity() {
        let (store, registry) = setup();
        let codec = registry.codec;
        let id = FileId::from_name("f");
        store
            .create_file(codec.file_reservation_cost(64), &id, "f")
            .unwrap();
        let meta = registry.lookup("f").unwrap().unwrap();
        assert_eq!(meta.size_hint, Some(64));
        assert!(registry.lookup("nope").unwrap().is_none());
    }
}
