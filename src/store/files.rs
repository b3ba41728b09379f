//! File storage for uploaded images.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::types::DocType;
use crate::error::StoreError;

/// Stores raw bytes and returns a retrievable URL.
pub trait FileStore: Send + Sync {
    /// Save `bytes` as `file_name`, returning its URL.
    fn save(&self, bytes: &[u8], file_name: &str) -> Result<String, StoreError>;
}

fn check_file_name(file_name: &str) -> Result<(), StoreError> {
    if file_name.is_empty()
        || file_name.contains(['/', '\\'])
        || file_name.starts_with('.')
    {
        return Err(StoreError::Validation {
            doctype: DocType::File,
            reason: format!("unsafe file name {file_name:?}"),
        });
    }
    Ok(())
}

/// Writes files into a directory served under a URL prefix.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalFileStore {
    /// Create a store rooted at `dir`, serving under `url_prefix`.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, bytes: &[u8], file_name: &str) -> Result<String, StoreError> {
        check_file_name(file_name)?;
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), size = bytes.len(), "Stored file");
        Ok(format!("{}/{}", self.url_prefix.trim_end_matches('/'), file_name))
    }
}

/// Keeps files in memory. Useful for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored under a URL.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        self.files.get(url).map(|f| f.value().clone())
    }

    /// Number of stored files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files are stored.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileStore for MemoryFileStore {
    fn save(&self, bytes: &[u8], file_name: &str) -> Result<String, StoreError> {
        check_file_name(file_name)?;
        let url = format!("/files/{file_name}");
        self.files.insert(url.clone(), bytes.to_vec());
        Ok(url)
    }
}

/// Random 10-character lowercase hex name.
pub fn short_hash() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(10);
    id
}

/// Random file name with the given extension.
pub fn unique_file_name(extension: &str) -> String {
    format!("{}.{extension}", short_hash())
}

/// Detect the image type from leading bytes.
pub fn sniff_image_extension(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("jpeg"),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("png"),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some("gif"),
        [b'B', b'M', ..] => Some("bmp"),
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some("tiff"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("webp"),
        _ => None,
    }
}
