//! JSON documents on disk

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::KeeperError;

/// A settings or history document addressed by path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Parse the whole file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, KeeperError> {
        let contents = fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Rename the file to `<name>.<suffix>` next to itself and return the new
    /// location
    pub async fn move_aside(&self, suffix: &str) -> Result<File, KeeperError> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let target = self.path.with_file_name(format!("{}.{}", file_name, suffix));
        fs::rename(&self.path, &target).await?;
        Ok(File::new(target))
    }

    /// Write JSON through [`File::write_atomic`]
    pub async fn write_json_atomic<T: Serialize>(&self, value: &T) -> Result<(), KeeperError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Atomic write using a temporary sibling file.
    ///
    /// The temp file is fsynced and then renamed over the target, so readers
    /// and crash recovery only ever observe the old or the new contents.
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), KeeperError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
