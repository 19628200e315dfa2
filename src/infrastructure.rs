pub mod codec;
pub mod export;
pub mod repository;

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::domain::{BlobStore, DataAccessError};

/// プロセス内で完結するストア
#[derive(Clone, Debug, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn load_blob(&self, key: &str) -> Result<Option<String>, DataAccessError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn save_blob(&mut self, key: &str, value: &str) -> Result<(), DataAccessError> {
        self.blobs.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// ディレクトリ内にキーごとのファイルとして保存するストア
#[derive(Clone, Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, DataAccessError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| DataAccessError::ConnectionError(Box::new(e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl BlobStore for FileBlobStore {
    fn load_blob(&self, key: &str) -> Result<Option<String>, DataAccessError> {
        match fs::read_to_string(self.path(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DataAccessError::ReadError(Box::new(e))),
        }
    }

    fn save_blob(&mut self, key: &str, value: &str) -> Result<(), DataAccessError> {
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        debug!("{} を保存しました", path.display());
        Ok(())
    }
}
