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

//! End-to-end scenarios that drive `LedgerFs` against every backend.

#[cfg(test)]
mod scenarios {
    use std::sync::Arc;

    use bytes::Bytes;
    use ledgerfs_common::{chunk_entry_cost, MAX_CHUNKS};
    use ledgerfs_storage::{
        config::StorageConfig,
        mapper::OffsetMapper,
        store::{ChunkStore, MemoryChunkStore},
        Error as StorageError, StorageAdapter,
    };
    use ledgerfs_types::{chunk::ChunkKey, file_id::FileId, ToErrno};
    use ledgerfs_utils::logger::init_test_logging;
    use ledgerfs_vfs::LedgerFs;
    use rand::RngCore;
    use rstest::rstest;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Copy)]
    enum Backend {
        Memory,
        Local,
    }

    struct Mounted {
        fs:     LedgerFs,
        config: StorageConfig,
        // keeps the local store's directory alive
        _dir:   Option<TempDir>,
    }

    fn mount(backend: Backend, chunk_size: usize) -> Mounted {
        init_test_logging();
        let mut config = StorageConfig::default();
        config.with_chunk_size(chunk_size);
        let dir = match backend {
            Backend::Memory => None,
            Backend::Local => {
                let dir = tempfile::tempdir().unwrap();
                config.with_dsn(&format!("local://:{}", dir.path().display()));
                Some(dir)
            }
        };
        Mounted {
            fs: LedgerFs::open(&config).unwrap(),
            config,
            _dir: dir,
        }
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut buf);
        buf
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::local(Backend::Local)]
    fn file_lifecycle(#[case] backend: Backend) {
        let Mounted { fs, _dir, .. } = mount(backend, 512);
        let start = fs.adapter().store().balance().unwrap();

        fs.create("notes.txt", 0).unwrap();
        let data = random_bytes(1000);
        fs.write("notes.txt", 100, &data).unwrap();

        let stat = fs.getattr("notes.txt").unwrap();
        assert_eq!(stat.size, 3 * 512);
        assert_eq!(stat.chunks, 3);
        assert_eq!(fs.read("notes.txt", 100, 1000).unwrap().as_ref(), &data[..]);
        assert_eq!(
            fs.read("notes.txt", stat.size, 50).unwrap().as_ref(),
            &[0u8; 50][..]
        );

        let names = fs
            .readdir()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["notes.txt"]);

        fs.unlink("notes.txt").unwrap();
        assert!(fs.readdir().unwrap().is_empty());
        assert_eq!(fs.adapter().store().balance().unwrap(), start);
    }

    #[rstest]
    #[case::memory(Backend::Memory)]
    #[case::local(Backend::Local)]
    fn every_stored_chunk_is_full_size(#[case] backend: Backend) {
        let Mounted { fs, _dir, .. } = mount(backend, 64);
        fs.create("f", 0).unwrap();
        fs.write("f", 3, b"tiny").unwrap();
        fs.write("f", 64 * 7 + 60, &random_bytes(10)).unwrap();

        let id = FileId::from_name("f");
        let meta = fs.adapter().registry().lookup("f").unwrap().unwrap();
        let occupied = meta.occupancy.iter().collect::<Vec<_>>();
        assert_eq!(occupied, vec![0, 7, 8]);
        for index in 0..16 {
            let key = ChunkKey::new(id, index);
            let chunk = fs.adapter().store().get_chunk(&key).unwrap();
            assert_eq!(chunk.is_some(), occupied.contains(&index), "chunk {index}");
            if let Some(chunk) = chunk {
                assert_eq!(chunk.len(), 64);
            }
        }
    }

    #[test]
    fn local_store_survives_remount() {
        let Mounted { fs, config, _dir } = mount(Backend::Local, 128);
        fs.create("keep", 0).unwrap();
        let data = random_bytes(777);
        fs.write("keep", 55, &data).unwrap();
        let balance = fs.adapter().store().balance().unwrap();
        drop(fs);

        let fs = LedgerFs::open(&config).unwrap();
        assert_eq!(fs.adapter().store().balance().unwrap(), balance);
        assert_eq!(fs.read("keep", 55, 777).unwrap().as_ref(), &data[..]);
        assert_eq!(fs.create("keep", 0).unwrap_err().to_errno(), libc::EEXIST);
    }

    #[test]
    fn partial_failure_then_retry() {
        init_test_logging();
        let mut config = StorageConfig::default();
        config.with_chunk_size(8).with_group_limit(16);
        let store = Arc::new(MemoryChunkStore::new(&config));
        let fs = LedgerFs::with_store(store.clone(), &config).unwrap();
        fs.create("big", 0).unwrap();

        let data = random_bytes(8 * 20);
        store.fail_nth_commit(1);
        let err = fs.write("big", 0, &data).unwrap_err();
        match err.storage() {
            Some(StorageError::PartialBatchFailure {
                committed_groups,
                committed_indices,
                ..
            }) => {
                assert_eq!(*committed_groups, 1);
                assert_eq!(committed_indices.len(), 16);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.group_sizes(), vec![16, 4]);
        assert_eq!(&fs.read("big", 0, 128).unwrap()[..], &data[..128]);

        // nothing is resumed implicitly; writing again converges.
        fs.write("big", 0, &data).unwrap();
        assert_eq!(fs.read("big", 0, data.len()).unwrap().as_ref(), &data[..]);
        assert_eq!(fs.getattr("big").unwrap().chunks, 20);
    }

    #[test]
    fn adapter_level_batch_grouping() {
        init_test_logging();
        let mut config = StorageConfig::default();
        config.with_chunk_size(1024);
        let store = Arc::new(MemoryChunkStore::new(&config));
        let adapter = StorageAdapter::new(store.clone(), &config).unwrap();
        let id = adapter.create_file("raw", 20 * 1024).unwrap();

        let ops = OffsetMapper::new(1024)
            .write_ops(0, Bytes::from(random_bytes(20 * 1024)))
            .unwrap();
        let report = adapter.submit_batch(&id, ops).unwrap();
        assert_eq!(report.groups, 2);
        assert_eq!(store.group_sizes(), vec![16, 4]);

        assert!(matches!(
            adapter.delete_file(&id),
            Err(StorageError::NonEmptyFile { occupied: 20, .. })
        ));
        adapter.delete_chunks(&id, &report.committed).unwrap();
        adapter.delete_file(&id).unwrap();
    }

    #[test]
    fn config_file_drives_mount() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let path = dir.path().join("ledgerfs.toml");
        std::fs::write(
            &path,
            format!(
                "dsn = \"local://:{}\"\nchunk_size = \"1KiB\"\ngroup_limit = 4\n",
                data_dir.display()
            ),
        )
        .unwrap();

        let config = StorageConfig::load(&path).unwrap();
        assert_eq!(config.chunk_entry_cost(), chunk_entry_cost(1024));
        let fs = LedgerFs::open(&config).unwrap();
        assert_eq!(fs.adapter().group_limit(), 4);
        assert_eq!(fs.adapter().codec().chunk_entry_cost, chunk_entry_cost(1024));
        assert_eq!(fs.max_file_size(), MAX_CHUNKS as u64 * 1024);
        fs.create("x", 0).unwrap();
        fs.write("x", 0, &random_bytes(5 * 1024)).unwrap();
        assert_eq!(fs.getattr("x").unwrap().size, 5 * 1024);
        assert!(data_dir.join("ledger").exists());
    }
}
