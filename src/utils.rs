use log::info;
use std::io;
use std::path::{Path, PathBuf};

const CACHE_DIR_NAME: &str = "ocems_harvest_cache";

pub fn get_cache_dir() -> io::Result<PathBuf> {
    dirs::cache_dir()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine system cache directory",
            )
        })
        .map(|p| p.join(CACHE_DIR_NAME))
}

/// Creates `path` unless it already is a directory.
pub async fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => {
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("Path exists but is not a directory: {}", path.display()),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating directory: {}", path.display());
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_is_namespaced() {
        if let Ok(dir) = get_cache_dir() {
            assert!(dir.ends_with(CACHE_DIR_NAME));
        }
    }

    #[tokio::test]
    async fn test_ensure_dir_exists() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        ensure_dir_exists(&nested).await?;
        assert!(nested.is_dir());
        ensure_dir_exists(&nested).await?;

        let file = dir.path().join("file");
        std::fs::write(&file, b"x")?;
        assert!(ensure_dir_exists(&file).await.is_err());
        Ok(())
    }
}
