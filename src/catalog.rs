//! 照片清单的单写者守护：串行化 读取-修改-写回。

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use crate::photo_list::{
    Photo, PhotoList, PhotoListError, read_photo_list_or_default, write_photo_list,
};

/// Owns the photo list file. Every mutation holds the writer lock for the full
/// load, modify and save cycle.
#[derive(Debug)]
pub struct PhotoCatalog {
    list_path: PathBuf,
    default_path: String,
    writer: Mutex<()>,
}

impl PhotoCatalog {
    /// `photo_dir` is recorded in the `path` field of newly created lists.
    pub fn new(list_path: PathBuf, photo_dir: &Path) -> Self {
        Self {
            list_path,
            default_path: photo_dir.to_string_lossy().to_string(),
            writer: Mutex::new(()),
        }
    }

    pub fn list_path(&self) -> &Path {
        &self.list_path
    }

    /// 读取当前清单，文件不存在时视为空清单。
    pub async fn load(&self) -> Result<PhotoList, PhotoListError> {
        read_photo_list_or_default(&self.list_path, &self.default_path).await
    }

    /// 插入或覆盖单个条目。
    pub async fn upsert(&self, photo: Photo) -> Result<(), PhotoListError> {
        self.modify(|list| {
            list.upsert(photo);
            Ok(())
        })
        .await
    }

    /// 批量插入或覆盖条目。
    pub async fn upsert_all(&self, photos: Vec<Photo>) -> Result<(), PhotoListError> {
        self.modify(|list| {
            list.upsert_all(photos);
            Ok(())
        })
        .await
    }

    /// 删除条目（不删除照片文件）。
    pub async fn remove(&self, filename: &str) -> Result<Photo, PhotoListError> {
        self.modify(|list| list.delete(filename)).await
    }

    async fn modify<T>(
        &self,
        change: impl FnOnce(&mut PhotoList) -> Result<T, PhotoListError>,
    ) -> Result<T, PhotoListError> {
        let _guard = self.writer.lock().await;
        let mut list = self.load().await?;
        let output = change(&mut list)?;
        write_photo_list(&self.list_path, &list).await?;
        debug!(path = ?self.list_path, count = list.photos.len(), "photo list saved");
        Ok(output)
    }
}
