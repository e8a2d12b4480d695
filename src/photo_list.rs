//! 照片元数据清单（JSON 侧车文件）的读写与增删改。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::atomic::AtomicFile;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoList {
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub photos: Vec<Photo>,
}

#[derive(Debug, Error)]
pub enum PhotoListError {
    #[error("cannot read photo list {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to decode photo list from {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode photo list: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot write photo list {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("photo with filename {0} not found")]
    NotFound(String),
}

impl PhotoList {
    pub fn get(&self, filename: &str) -> Option<&Photo> {
        self.photos.iter().find(|photo| photo.filename == filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.get(filename).is_some()
    }

    /// Replaces the entry with the same filename in place, or appends.
    pub fn upsert(&mut self, photo: Photo) {
        match self
            .photos
            .iter_mut()
            .find(|existing| existing.filename == photo.filename)
        {
            Some(existing) => *existing = photo,
            None => self.photos.push(photo),
        }
    }

    pub fn upsert_all(&mut self, photos: impl IntoIterator<Item = Photo>) {
        for photo in photos {
            self.upsert(photo);
        }
    }

    /// Removes the first entry named `filename`. The list is untouched when absent.
    pub fn delete(&mut self, filename: &str) -> Result<Photo, PhotoListError> {
        let index = self
            .photos
            .iter()
            .position(|photo| photo.filename == filename)
            .ok_or_else(|| PhotoListError::NotFound(filename.to_string()))?;
        Ok(self.photos.remove(index))
    }
}

/// 读取并解析清单文件，错误原样向上传递。
pub async fn read_photo_list(path: &Path) -> Result<PhotoList, PhotoListError> {
    let bytes = fs::read(path).await.map_err(|source| PhotoListError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| PhotoListError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// 读取清单；文件不存在时返回以 `default_path` 为路径的空清单。
pub async fn read_photo_list_or_default(
    path: &Path,
    default_path: &str,
) -> Result<PhotoList, PhotoListError> {
    match read_photo_list(path).await {
        Err(PhotoListError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
            Ok(PhotoList {
                path: default_path.to_string(),
                photos: Vec::new(),
            })
        }
        result => result,
    }
}

/// 以 tab 缩进编码并原子替换清单文件。
pub async fn write_photo_list(path: &Path, list: &PhotoList) -> Result<(), PhotoListError> {
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"\t"));
    list.serialize(&mut serializer)
        .map_err(PhotoListError::Encode)?;
    buffer.push(b'\n');

    let write_error = |source| PhotoListError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut atomic = AtomicFile::new(path).await.map_err(write_error)?;
    if let Err(err) = atomic.write_all(&buffer).await {
        atomic.cleanup().await;
        return Err(write_error(err));
    }
    atomic.finalize().await.map_err(write_error)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Photo>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Photo>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn photo(filename: &str, title: &str, description: &str) -> Photo {
        Photo {
            filename: filename.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    #[test]
    fn upsert_appends_then_replaces() {
        let mut list = PhotoList::default();
        list.upsert(photo("cat.jpg", "Cat", "A cat"));
        assert_eq!(list.photos.len(), 1);

        list.upsert(photo("dog.jpg", "Dog", "A dog"));
        list.upsert(photo("cat.jpg", "Kitty", "Still a cat"));
        assert_eq!(list.photos.len(), 2);
        assert_eq!(list.photos[0], photo("cat.jpg", "Kitty", "Still a cat"));
        assert_eq!(list.photos[1].filename, "dog.jpg");
    }

    #[test]
    fn upsert_all_keeps_filenames_unique() {
        let mut list = PhotoList::default();
        list.upsert_all([
            photo("a.jpg", "A", ""),
            photo("b.jpg", "B", ""),
            photo("a.jpg", "A2", "again"),
        ]);
        assert_eq!(list.photos.len(), 2);
        assert_eq!(list.get("a.jpg").map(|p| p.title.as_str()), Some("A2"));
    }

    #[test]
    fn delete_missing_reports_not_found() {
        let mut list = PhotoList::default();
        list.upsert(photo("cat.jpg", "Cat", "A cat"));
        let before = list.clone();

        let result = list.delete("dog.jpg");
        assert!(matches!(result, Err(PhotoListError::NotFound(name)) if name == "dog.jpg"));
        assert_eq!(list, before);
    }

    #[test]
    fn delete_removes_first_match() {
        let mut list = PhotoList::default();
        list.upsert_all([photo("a.jpg", "A", ""), photo("b.jpg", "B", "")]);
        let removed = list.delete("a.jpg").expect("delete");
        assert_eq!(removed.title, "A");
        assert!(!list.contains("a.jpg"));
        assert!(list.contains("b.jpg"));
    }

    #[test]
    fn decode_tolerates_null_and_missing_fields() {
        let list: PhotoList = serde_json::from_str(r#"{"path": "", "photos": null}"#).expect("null");
        assert!(list.photos.is_empty());
        let list: PhotoList = serde_json::from_str("{}").expect("empty object");
        assert_eq!(list, PhotoList::default());
    }

    #[tokio::test]
    async fn write_then_read_preserves_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("photo_list.json");
        let mut list = PhotoList {
            path: "./photos".into(),
            photos: Vec::new(),
        };
        list.upsert_all([photo("z.jpg", "Z", "last"), photo("a.jpg", "A", "first")]);

        write_photo_list(&path, &list).await.expect("write");
        let raw = std::fs::read_to_string(&path).expect("read raw");
        assert!(raw.contains("\n\t\"photos\": ["), "tab indented: {raw}");
        assert!(raw.ends_with('\n'));

        let loaded = read_photo_list(&path).await.expect("read");
        assert_eq!(loaded, list);
    }

    #[tokio::test]
    async fn read_missing_file_is_an_error_unless_defaulted() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("missing.json");

        assert!(matches!(
            read_photo_list(&path).await,
            Err(PhotoListError::Read { .. })
        ));
        let list = read_photo_list_or_default(&path, "./photos")
            .await
            .expect("default");
        assert_eq!(list.path, "./photos");
        assert!(list.photos.is_empty());
    }

    #[tokio::test]
    async fn read_corrupt_file_reports_decode_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("photo_list.json");
        std::fs::write(&path, b"{not json").expect("write");

        let result = read_photo_list_or_default(&path, "").await;
        assert!(matches!(result, Err(PhotoListError::Decode { .. })));
    }
}
