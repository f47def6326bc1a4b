//! Key-value store contract and the file-backed implementation.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::CacheError;
use crate::serialization::TransformFlags;

/// An opaque stored payload plus the metadata every backend must preserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
  /// Fully-qualified response type identifier.
  pub type_name: String,
  /// The serialized (possibly compressed/encrypted) payload bytes.
  pub payload: Vec<u8>,
  /// Transform flags, when the backend persists them. The file backend does
  /// not; readers fall back to the configured pipeline's flags.
  pub flags: Option<TransformFlags>,
}

/// Durable mapping from string key to opaque payload.
///
/// All methods are synchronous; the host decides whether to await them on a
/// blocking pool. `values()` has snapshot-at-call semantics and is not
/// required to reflect mutations made during iteration.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<StoredValue>, CacheError>;

  /// Upsert.
  fn save(&self, key: &str, value: &StoredValue) -> Result<(), CacheError>;

  /// Idempotent; removing an absent key is a no-op.
  fn delete(&self, key: &str) -> Result<(), CacheError>;

  /// Move a value to a new key, removing the old one.
  fn rename(&self, old_key: &str, new_key: &str) -> Result<(), CacheError>;

  /// All stored entries, unordered.
  fn values(&self) -> Result<Vec<(String, StoredValue)>, CacheError>;
}

/// File-backed store: one file per key, named by the key itself. File
/// content is the type identifier header line followed by the raw payload
/// bytes.
pub struct FileStore {
  dir: PathBuf,
}

impl FileStore {
  /// Open a store rooted at the given directory, creating it if needed.
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
    let dir = dir.into();
    fs::create_dir_all(&dir)
      .map_err(|e| CacheError::store("open", &dir.display().to_string(), e))?;
    Ok(Self { dir })
  }

  /// Open a store at the platform data directory.
  pub fn open_default() -> Result<Self, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        CacheError::store("open", "", "could not determine data directory")
      })?;
    Self::open(data_dir.join("recache"))
  }

  fn path_for(&self, key: &str) -> PathBuf {
    self.dir.join(key)
  }

  fn parse_content(key: &str, content: Vec<u8>) -> Result<StoredValue, CacheError> {
    let newline = content
      .iter()
      .position(|&b| b == b'\n')
      .ok_or_else(|| CacheError::store("get", key, "missing type header line"))?;
    let type_name = String::from_utf8(content[..newline].to_vec())
      .map_err(|e| CacheError::store("get", key, e))?;
    Ok(StoredValue {
      type_name,
      payload: content[newline + 1..].to_vec(),
      flags: None,
    })
  }
}

impl KeyValueStore for FileStore {
  fn get(&self, key: &str) -> Result<Option<StoredValue>, CacheError> {
    match fs::read(self.path_for(key)) {
      Ok(content) => Self::parse_content(key, content).map(Some),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
      Err(e) => Err(CacheError::store("get", key, e)),
    }
  }

  fn save(&self, key: &str, value: &StoredValue) -> Result<(), CacheError> {
    let mut content = Vec::with_capacity(value.type_name.len() + 1 + value.payload.len());
    content.extend_from_slice(value.type_name.as_bytes());
    content.push(b'\n');
    content.extend_from_slice(&value.payload);
    fs::write(self.path_for(key), content).map_err(|e| CacheError::store("save", key, e))
  }

  fn delete(&self, key: &str) -> Result<(), CacheError> {
    match fs::remove_file(self.path_for(key)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(CacheError::store("delete", key, e)),
    }
  }

  fn rename(&self, old_key: &str, new_key: &str) -> Result<(), CacheError> {
    fs::rename(self.path_for(old_key), self.path_for(new_key))
      .map_err(|e| CacheError::store("rename", old_key, e))
  }

  fn values(&self) -> Result<Vec<(String, StoredValue)>, CacheError> {
    let entries = fs::read_dir(&self.dir)
      .map_err(|e| CacheError::store("values", &self.dir.display().to_string(), e))?;

    let mut result = Vec::new();
    for entry in entries {
      let entry =
        entry.map_err(|e| CacheError::store("values", &self.dir.display().to_string(), e))?;
      if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
        continue;
      }
      let Ok(key) = entry.file_name().into_string() else {
        continue;
      };
      if let Some(value) = self.get(&key)? {
        result.push((key, value));
      }
    }
    Ok(result)
  }
}
