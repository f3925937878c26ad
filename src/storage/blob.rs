//!  Object file operations.
//!
//! This module handles reading & writing one logical object per file as a JSON
//! blob. Objects addressed by oid live in a two-level sharded layout
//! (`<root>/ab/cd/abcd...`), singletons such as the root B-tree live at a
//! plain relative path (`<root>/root`).
//!
//! Compression is per file and self-describing: a zstd frame starts with the
//! zstd magic number, a plain JSON document never does.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::is_hex_oid;

/// little-endian 0xFD2FB528
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// zstd level used for compressed objects
const COMPRESSION_LEVEL: i32 = 3;

/// Byte-level persistence for JSON objects.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// create a storage rooted at the given directory
    ///
    /// the directory is created lazily on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// the metadata root directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// resolve a key to a file path
    ///
    /// hex oids get sharded, anything else is a path
    /// relative to the root unless `absolute` is set
    pub fn resolve(&self, key: &str, absolute: bool) -> StorageResult<PathBuf> {
        if absolute {
            return Ok(PathBuf::from(key));
        }
        if key.is_empty() || key.contains("..") || Path::new(key).is_absolute() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if is_hex_oid(key) {
            Ok(self.path.join(&key[0..2]).join(&key[2..4]).join(key))
        } else {
            Ok(self.path.join(key))
        }
    }

    /// check whether an object file exists for the key
    pub fn exists(&self, key: &str, absolute: bool) -> bool {
        self.resolve(key, absolute).map(|p| p.is_file()).unwrap_or(false)
    }

    /// write a JSON value, optionally zstd-compressed
    pub fn store(&self, key: &str, data: &Value, compress: bool, absolute: bool) -> StorageResult<()> {
        let path = self.resolve(key, absolute)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = BufWriter::new(File::create(&path)?);
        if compress {
            let mut encoder = zstd::stream::Encoder::new(file, COMPRESSION_LEVEL)?;
            serde_json::to_writer(&mut encoder, data)?;
            let mut file = encoder.finish()?;
            file.flush()?;
        } else {
            let mut file = file;
            serde_json::to_writer(&mut file, data)?;
            file.flush()?;
        }

        tracing::trace!(path = %path.display(), compress, "stored object");
        Ok(())
    }

    /// read a JSON value, sniffing the zstd magic number
    pub fn load(&self, key: &str, absolute: bool) -> StorageResult<Value> {
        let path = self.resolve(key, absolute)?;
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound { path })
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let value = if is_compressed(&bytes) {
            let raw = zstd::decode_all(bytes.as_slice())?;
            serde_json::from_slice(&raw)?
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok(value)
    }
}

/// check the first four bytes for the zstd frame magic number
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.len() >= ZSTD_MAGIC.len() && bytes[..ZSTD_MAGIC.len()] == ZSTD_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        (dir, storage)
    }

    fn oid_key() -> String {
        format!("abcd{}", "1".repeat(60))
    }

    #[test]
    fn test_sharded_layout() {
        let (dir, storage) = setup();
        let key = oid_key();
        storage.store(&key, &json!({"a": 1}), false, false).unwrap();

        let expected = dir.path().join("ab").join("cd").join(&key);
        assert!(expected.is_file());
    }

    #[test]
    fn test_plain_and_compressed_roundtrip() {
        let (_dir, storage) = setup();
        let value = json!({"name": "data", "keywords": ["x", "y"], "n": 3});

        storage.store("root", &value, false, false).unwrap();
        assert_eq!(storage.load("root", false).unwrap(), value);

        let key = oid_key();
        storage.store(&key, &value, true, false).unwrap();
        assert_eq!(storage.load(&key, false).unwrap(), value);
    }

    #[test]
    fn test_compression_is_sniffed() {
        let (_dir, storage) = setup();
        let key = oid_key();

        storage.store(&key, &json!({"k": "v"}), true, false).unwrap();
        let bytes = fs::read(storage.resolve(&key, false).unwrap()).unwrap();
        assert!(is_compressed(&bytes));

        storage.store(&key, &json!({"k": "v"}), false, false).unwrap();
        let bytes = fs::read(storage.resolve(&key, false).unwrap()).unwrap();
        assert!(!is_compressed(&bytes));
        assert_eq!(bytes[0], b'{');
    }

    #[test]
    fn test_missing_object() {
        let (_dir, storage) = setup();
        let result = storage.load(&oid_key(), false);
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn test_absolute_paths() {
        let (dir, storage) = setup();
        let other = TempDir::new().unwrap();
        let path = other.path().join("merged");
        let key = path.to_str().unwrap();

        storage.store(key, &json!([1, 2]), true, true).unwrap();
        assert_eq!(storage.load(key, true).unwrap(), json!([1, 2]));
        assert!(!dir.path().join("merged").exists());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let (_dir, storage) = setup();
        assert!(matches!(storage.resolve("../x", false), Err(StorageError::InvalidKey(_))));
        assert!(matches!(storage.resolve("", false), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn test_only_hex_oids_are_sharded() {
        let (dir, storage) = setup();
        // 64 bytes, with a two byte character straddling the shard boundary
        let key = format!("a\u{e9}{}", "a".repeat(61));
        assert_eq!(key.len(), 64);
        assert_eq!(storage.resolve(&key, false).unwrap(), dir.path().join(&key));

        let upper = "A".repeat(64);
        assert_eq!(storage.resolve(&upper, false).unwrap(), dir.path().join(&upper));
    }
}
