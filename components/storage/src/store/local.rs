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
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use ledgerfs_common::ChunkIndex;
use ledgerfs_types::{chunk::ChunkKey, file_id::FileId, meta::FileMeta};
use scopeguard::ScopeGuard;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, info, warn};

use super::{check_creation_payment, ledger::Ledger, stage_group, ChunkStore, GroupOp};
use crate::{
    codec::ChunkCodec,
    config::StorageConfig,
    err::{
        EntryKind, FileExistsSnafu, LocalIoSnafu, NonEmptyFileSnafu, NotFoundSnafu, Result,
    },
};

const META_DIR: &str = "meta";
const CHUNK_DIR: &str = "chunks";
const LEDGER_FILE: &str = "ledger";
const TMP_EXT: &str = "tmp";

/// [LocalChunkStore] keeps every backend entry as a file under one directory:
///
/// ```text
/// <root>/meta/<hex file id>
/// <root>/chunks/<hex chunk key>
/// <root>/ledger
/// ```
///
/// Each file is replaced through a temp file and a rename. A group is staged
/// and checked before the first file is touched, but applying it spans several
/// renames, so a crash in the middle can leave a group half applied.
#[derive(Debug)]
pub struct LocalChunkStore {
    root:   PathBuf,
    codec:  ChunkCodec,
    limit:  usize,
    // serializes every mutation; the ledger is mirrored to disk on change.
    ledger: Mutex<Ledger>,
}

impl LocalChunkStore {
    pub fn open<P: AsRef<Path>>(root: P, config: &StorageConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join(META_DIR), root.join(CHUNK_DIR)] {
            fs::create_dir_all(&dir).context(LocalIoSnafu {
                path: dir.display().to_string(),
            })?;
        }

        let ledger_path = root.join(LEDGER_FILE);
        let ledger = match read_optional(&ledger_path)? {
            Some(buf) => Ledger::decode(&buf)?,
            None => {
                let ledger = Ledger::new(config.initial_balance);
                write_atomic(&ledger_path, &ledger.encode()?)?;
                ledger
            }
        };
        info!(
            "local store opened at {} with balance {}",
            root.display(),
            ledger.balance()
        );

        Ok(Self {
            root,
            codec: ChunkCodec::new(config),
            limit: config.group_limit,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta_path(&self, id: &FileId) -> PathBuf { self.root.join(META_DIR).join(id.to_hex()) }

    fn chunk_path(&self, key: &ChunkKey) -> PathBuf { self.root.join(CHUNK_DIR).join(key.to_hex()) }

    fn save_ledger(&self, ledger: &Ledger) -> Result<()> {
        write_atomic(&self.root.join(LEDGER_FILE), &ledger.encode()?)
    }

    fn load_meta(&self, id: &FileId) -> Result<FileMeta> {
        let buf = read_optional(&self.meta_path(id))?.context(NotFoundSnafu {
            kind: EntryKind::FileMeta,
            key:  id.to_hex(),
        })?;
        Ok(FileMeta::decode(*id, &buf)?)
    }

    fn apply(&self, ledger: &Ledger, file_id: &FileId, ops: &[GroupOp]) -> Result<()> {
        let mut meta = self.load_meta(file_id)?;
        let deposit = ledger.deposit_of(file_id).unwrap_or_default();
        meta.occupancy = stage_group(&self.codec, self.limit, &meta, deposit, ops)?;

        for op in ops {
            let path = self.chunk_path(&ChunkKey::new(*file_id, op.index()));
            match op {
                GroupOp::Write { payload, .. } => write_atomic(&path, payload)?,
                GroupOp::Delete { .. } => remove_if_exists(&path)?,
            }
        }
        write_atomic(&self.meta_path(file_id), &meta.encode())
    }
}

impl ChunkStore for LocalChunkStore {
    fn chunk_size(&self) -> usize { self.codec.chunk_size }

    fn max_group_ops(&self) -> usize { self.limit }

    fn create_file(&self, payment: u64, file_id: &FileId, name: &str) -> Result<()> {
        let mut ledger = self.lock();
        check_creation_payment(&self.codec, payment)?;
        let path = self.meta_path(file_id);
        ensure!(!path.exists(), FileExistsSnafu { name });

        let mut next = ledger.clone();
        next.open_account(file_id, payment)?;
        write_atomic(&path, &FileMeta::new(name).encode())?;
        self.save_ledger(&next)?;
        *ledger = next;
        debug!("local store created file {name:?} ({file_id}) paying {payment}");
        Ok(())
    }

    fn deposit(&self, file_id: &FileId, amount: u64) -> Result<()> {
        let mut ledger = self.lock();
        let mut next = ledger.clone();
        next.top_up(file_id, amount)?;
        self.save_ledger(&next)?;
        *ledger = next;
        Ok(())
    }

    fn reservation(&self, file_id: &FileId) -> Result<u64> {
        self.lock().deposit_of(file_id).context(NotFoundSnafu {
            kind: EntryKind::File,
            key:  file_id.to_hex(),
        })
    }

    fn balance(&self) -> Result<u64> { Ok(self.lock().balance()) }

    fn get_meta(&self, file_id: &FileId) -> Result<Option<Vec<u8>>> {
        let _ledger = self.lock();
        read_optional(&self.meta_path(file_id))
    }

    fn list_meta(&self) -> Result<Vec<(FileId, Vec<u8>)>> {
        let _ledger = self.lock();
        let dir = self.root.join(META_DIR);
        let entries = fs::read_dir(&dir).context(LocalIoSnafu {
            path: dir.display().to_string(),
        })?;

        let mut metas = Vec::new();
        for entry in entries {
            let entry = entry.context(LocalIoSnafu {
                path: dir.display().to_string(),
            })?;
            let path = entry.path();
            if path.extension() == Some(OsStr::new(TMP_EXT)) {
                continue;
            }
            let id = match path.file_name().and_then(|n| n.to_str()).map(FileId::from_hex) {
                Some(Ok(id)) => id,
                _ => {
                    warn!("ignoring stray file {} in metadata dir", path.display());
                    continue;
                }
            };
            if let Some(buf) = read_optional(&path)? {
                metas.push((id, buf));
            }
        }
        metas.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(metas)
    }

    fn get_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>> {
        let _ledger = self.lock();
        Ok(read_optional(&self.chunk_path(key))?.map(Bytes::from))
    }

    fn write_chunk(&self, file_id: &FileId, index: ChunkIndex, data: Bytes) -> Result<()> {
        let ledger = self.lock();
        self.apply(
            &ledger,
            file_id,
            &[GroupOp::Write {
                index,
                payload: data,
            }],
        )
    }

    fn delete_chunk(&self, key: &ChunkKey) -> Result<()> {
        let ledger = self.lock();
        self.apply(&ledger, &key.file_id, &[GroupOp::Delete { index: key.index }])
    }

    fn commit_group(&self, file_id: &FileId, ops: &[GroupOp]) -> Result<()> {
        let ledger = self.lock();
        self.apply(&ledger, file_id, ops)
    }

    fn delete_file(&self, file_id: &FileId) -> Result<u64> {
        let mut ledger = self.lock();
        let meta = self.load_meta(file_id)?;
        ensure!(
            meta.occupancy.is_empty(),
            NonEmptyFileSnafu {
                id:       *file_id,
                occupied: meta.occupancy.count(),
            }
        );
        let mut next = ledger.clone();
        let refund = next.close_account(file_id)?;
        remove_if_exists(&self.meta_path(file_id))?;
        self.save_ledger(&next)?;
        *ledger = next;
        debug!("local store deleted file {file_id}, refunded {refund}");
        Ok(refund)
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(buf) => Ok(Some(buf)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context(LocalIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).context(LocalIoSnafu {
            path: path.display().to_string(),
        }),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = scopeguard::guard(path.with_extension(TMP_EXT), |tmp| {
        let _ = fs::remove_file(tmp);
    });
    fs::write(&*tmp, data).context(LocalIoSnafu {
        path: tmp.display().to_string(),
    })?;
    fs::rename(&*tmp, path).context(LocalIoSnafu {
        path: path.display().to_string(),
    })?;
    // renamed away, nothing left to clean up
    ScopeGuard::into_inner(tmp);
    Ok(())
}
