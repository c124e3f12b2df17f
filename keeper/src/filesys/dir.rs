//! Directories holding keeper state

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::KeeperError;
use crate::filesys::file::File;

/// Directory that keeper files are resolved against
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and any missing parents
    pub async fn create(&self) -> Result<(), KeeperError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Remove the directory tree; one that is already gone is not an error
    pub async fn delete(&self) -> Result<(), KeeperError> {
        match fs::remove_dir_all(&self.path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Regular files directly inside the directory, sorted by path
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, KeeperError> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Fresh `<prefix>-<uuid>` directory under the system temp dir
    pub async fn create_temp_dir(prefix: &str) -> Result<Self, KeeperError> {
        let dir = Self::new(
            std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())),
        );
        dir.create().await?;
        Ok(dir)
    }
}
