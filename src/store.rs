use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::{info, warn};

use crate::atomic::is_temp_file_name;
use crate::config::ALLOWED_EXTENSIONS;

/// The photo directory. Names handed to it must be a single plain file name.
#[derive(Clone, Debug)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Joins `name` onto the photo directory, rejecting anything that could
    /// escape it. With `allow_missing` a non-existent file resolves fine.
    pub async fn resolve_photo(
        &self,
        name: &str,
        allow_missing: bool,
    ) -> Result<PathBuf, StoreError> {
        let target = self.resolve(name)?;
        match fs::symlink_metadata(&target).await {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                Err(StoreError::InvalidName(name.to_string()))
            }
            Ok(_) => Ok(target),
            Err(err) if err.kind() == ErrorKind::NotFound && allow_missing => Ok(target),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.contains('\\') {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) => Ok(self.root.join(segment)),
            _ => Err(StoreError::InvalidName(name.to_string())),
        }
    }

    /// Lists regular files with an allowed photo extension, sorted by name.
    pub async fn list_photos(&self) -> Result<Vec<PhotoEntry>, StoreError> {
        let mut dir = fs::read_dir(&self.root).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_photo_filename(&name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(PhotoEntry {
                name,
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by_key(|entry| entry.name.to_lowercase());
        Ok(entries)
    }

    /// Removes temp files left behind by interrupted writes that are older than `ttl`.
    pub async fn remove_stale_temp_files(&self, ttl: Duration, now: SystemTime) -> io::Result<usize> {
        if ttl.is_zero() {
            return Ok(0);
        }

        let mut removed = 0;
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !is_temp_file_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let Ok(age) = now.duration_since(modified) else {
                continue;
            };
            if age < ttl {
                continue;
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!(path = ?path, "removed stale temp file");
                    removed += 1;
                }
                Err(err) => warn!(path = ?path, error = %err, "failed to remove stale temp file"),
            }
        }

        Ok(removed)
    }
}

/// Case-insensitive check against the allowed photo extensions.
pub fn is_photo_filename(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// File name without its extension, used as a default title.
pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string())
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid photo name {0:?}")]
    InvalidName(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Serialize)]
pub struct PhotoEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<String>,
}
