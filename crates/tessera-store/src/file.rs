use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tessera_types::ObjectId;
use tracing::{debug, warn};

use crate::codec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::{normalize_prefix, ObjectDatabase};

/// Size of the CRC32 header in front of every loose object.
const CRC_LEN: usize = 4;

/// Loose-object database on the local filesystem.
///
/// On-disk layout:
/// ```text
/// <root>/<first 2 hex digits>/<remaining 62 hex digits>
///
/// [4 bytes: CRC32 of the compressed payload (little-endian u32)]
/// [N bytes: zstd-compressed canonical encoding]
/// ```
///
/// Objects are written to a temporary file in the target directory and
/// linked into place without clobbering, so racing writers of one id leave
/// exactly one complete file behind.
pub struct FileObjectDatabase {
    root: PathBuf,
    config: StoreConfig,
}

impl FileObjectDatabase {
    /// Open (or create) a database rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened file object database");
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

impl ObjectDatabase for FileObjectDatabase {
    fn read_raw(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        let bytes = match fs::read(self.object_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < CRC_LEN {
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: "truncated object file".into(),
            });
        }
        let (header, payload) = bytes.split_at(CRC_LEN);
        let stored = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let actual = crc32fast::hash(payload);
        if stored != actual {
            warn!(id = %id.short_hex(), stored, actual, "object file failed CRC check");
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: format!("crc mismatch: stored {stored:#010x}, computed {actual:#010x}"),
            });
        }
        codec::decompress(payload, id).map(Some)
    }

    fn put_raw(&self, id: &ObjectId, data: &[u8]) -> StoreResult<bool> {
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(id);
        if path.exists() {
            return Ok(false);
        }
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::InvalidObject(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let payload = codec::compress(data, self.config.compression_level)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
        tmp.write_all(&payload)?;
        if self.config.fsync {
            tmp.as_file().sync_all()?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(id = %id.short_hex(), size = data.len(), stored = payload.len() + CRC_LEN, "inserted object");
                Ok(true)
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn lookup(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        let prefix = normalize_prefix(prefix)?;
        let dir = self.root.join(&prefix[..2]);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(rest) = name.to_str() else {
                continue;
            };
            // Temp files and anything else that is not a loose object fail to parse.
            let Ok(id) = ObjectId::from_hex(&format!("{}{rest}", &prefix[..2])) else {
                continue;
            };
            if id.matches_hex_prefix(&prefix) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn verifies_hashes(&self) -> bool {
        self.config.verify_hashes
    }
}

impl std::fmt::Debug for FileObjectDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileObjectDatabase")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::CountingListener;
    use crate::object::*;

    fn temp_db() -> (tempfile::TempDir, FileObjectDatabase) {
        let dir = tempfile::tempdir().unwrap();
        let db = FileObjectDatabase::open(dir.path().join("objects"), StoreConfig::default())
            .unwrap();
        (dir, db)
    }

    fn feature(n: i64) -> RevFeature {
        RevFeature::new(vec![Some(Value::Long(n))]).unwrap()
    }

    #[test]
    fn put_get_and_layout() {
        let (_dir, db) = temp_db();
        let f = feature(1);
        assert!(db.put_feature(&f).unwrap());
        assert!(!db.put_feature(&f).unwrap());

        let hex = f.id().to_hex();
        let path = db.root().join(&hex[..2]).join(&hex[2..]);
        assert!(path.is_file());
        assert!(db.exists(&f.id()).unwrap());
        assert_eq!(db.get_feature(&f.id()).unwrap(), f);
    }

    #[test]
    fn reopen_sees_existing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let tree = RevTree::leaf(vec![Node::record("a", feature(1).id())], vec![]).unwrap();
        {
            let db = FileObjectDatabase::open(dir.path(), StoreConfig::default()).unwrap();
            db.put_tree(&tree).unwrap();
        }
        let db = FileObjectDatabase::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(db.get_tree(&tree.id()).unwrap(), tree);
    }

    #[test]
    fn missing_object() {
        let (_dir, db) = temp_db();
        let id = ObjectId::from_bytes(b"nope");
        assert!(db.read_raw(&id).unwrap().is_none());
        assert!(matches!(db.get_object(&id).unwrap_err(), StoreError::NotFound(_)));
        assert!(!db.delete(&id).unwrap());
    }

    #[test]
    fn corrupted_file_is_detected() {
        let (_dir, db) = temp_db();
        let f = feature(5);
        db.put_feature(&f).unwrap();

        let path = db.object_path(&f.id());
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            db.get_object(&f.id()).unwrap_err(),
            StoreError::CorruptObject { id, .. } if id == f.id()
        ));

        fs::write(&path, [1u8, 2]).unwrap();
        assert!(matches!(
            db.read_raw(&f.id()).unwrap_err(),
            StoreError::CorruptObject { .. }
        ));
    }

    #[test]
    fn lookup_scans_fanout_directory() {
        let (_dir, db) = temp_db();
        let features: Vec<RevFeature> = (0..30).map(feature).collect();
        for f in &features {
            db.put_feature(f).unwrap();
        }
        let target = features[11].id();
        let hex = target.to_hex();
        assert_eq!(db.lookup(&hex[..10]).unwrap(), vec![target]);

        let short = db.lookup(&hex[..3]).unwrap();
        assert!(short.contains(&target));
        assert!(short.iter().all(|id| id.to_hex().starts_with(&hex[..3])));
        assert!(matches!(db.lookup("x").unwrap_err(), StoreError::InvalidPrefix(_)));
    }

    #[test]
    fn delete_removes_file() {
        let (_dir, db) = temp_db();
        let f = feature(8);
        db.put_feature(&f).unwrap();
        assert!(db.delete(&f.id()).unwrap());
        assert!(!db.exists(&f.id()).unwrap());
        assert!(db.put_feature(&f).unwrap());
    }

    #[test]
    fn racing_writers_leave_one_object() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::thread;

        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let wins = Arc::new(AtomicUsize::new(0));
        let f = feature(99);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                let wins = Arc::clone(&wins);
                let f = f.clone();
                thread::spawn(move || {
                    if db.put_feature(&f).unwrap() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(db.get_feature(&f.id()).unwrap(), f);

        let hex = f.id().to_hex();
        let files = fs::read_dir(db.root().join(&hex[..2])).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn bulk_put_with_fsync() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            fsync: true,
            ..StoreConfig::default()
        };
        let db = FileObjectDatabase::open(dir.path(), config).unwrap();
        let listener = CountingListener::new();
        let mut objects = (0..10).map(|n| RevObject::from(feature(n)));
        db.put_all(&mut objects, &listener).unwrap();
        assert_eq!(listener.inserted_count(), 10);
    }
}
