use crate::cache::error::CacheError;
use log::debug;
use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::{fs, task};

/// Backing storage for [`crate::ResultCache`].
///
/// Keys are the relative paths produced by [`crate::CacheKey::path`]. A store must make
/// a result visible either completely or not at all.
pub trait CacheStore {
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, CacheError>>;

    fn store(&self, key: &str, bytes: Vec<u8>) -> impl Future<Output = Result<(), CacheError>>;
}

/// Stores each result as a file below a root directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl CacheStore for FsStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Read(path, e)),
        }
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| CacheError::DirCreation(parent.clone(), e))?;

        debug!("Writing {} bytes to cache file {:?}", bytes.len(), path);
        task::spawn_blocking(move || {
            let mut temp_file =
                NamedTempFile::new_in(&parent).map_err(|e| CacheError::Write(path.clone(), e))?;
            temp_file
                .write_all(&bytes)
                .map_err(|e| CacheError::Write(path.clone(), e))?;
            temp_file
                .flush()
                .map_err(|e| CacheError::Write(path.clone(), e))?;
            temp_file
                .persist(&path)
                .map_err(|e| CacheError::Write(path.clone(), e.error))?;
            Ok::<(), CacheError>(())
        })
        .await??;
        Ok(())
    }
}

/// Keeps results in memory; used for tests and one-shot runs that must not touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl CacheStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, bytes: Vec<u8>) -> Result<(), CacheError> {
        self.entries.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }
}
