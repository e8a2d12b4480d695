//! 交互式批量补全照片元数据（控制台输入，而非 HTTP）。
//!
//! 待补全的照片来自可替换的 [`PhotoSource`]：扫描照片目录中尚未登记的图片，
//! 或者逐行读取 URL 并下载到照片目录。随后逐张询问标题与描述，最后一次性写回清单。

use futures_util::stream::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::{Client, StatusCode, Url};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{info, warn};

use crate::atomic::AtomicFile;
use crate::catalog::PhotoCatalog;
use crate::config::FETCH_DONE_KEYWORD;
use crate::photo_list::{Photo, PhotoList, PhotoListError};
use crate::store::{PhotoStore, StoreError, file_stem, is_photo_filename};

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("input closed before all answers were given")]
    InputClosed,
    #[error("console i/o failed: {0}")]
    Console(#[from] io::Error),
    #[error(transparent)]
    PhotoList(#[from] PhotoListError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{0} is not a supported photo type")]
    UnsupportedType(String),
    #[error("failed to download photo from {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to download photo from {url}: HTTP {status}")]
    HttpStatus { url: String, status: StatusCode },
    #[error("failed to save photo to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 按行读取回答、向输出写提示的控制台封装。
pub struct Prompter<R, W> {
    lines: Lines<R>,
    output: W,
}

impl<R, W> Prompter<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: input.lines(),
            output,
        }
    }

    pub async fn say(&mut self, message: &str) -> Result<(), AnnotateError> {
        self.output.write_all(message.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    /// 输出提示并读取一行；输入结束视为不可恢复的错误。
    pub async fn ask(&mut self, prompt: &str) -> Result<String, AnnotateError> {
        self.output.write_all(prompt.as_bytes()).await?;
        self.output.flush().await?;
        match self.lines.next_line().await? {
            Some(line) => Ok(line.trim_end_matches('\r').to_string()),
            None => Err(AnnotateError::InputClosed),
        }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }
}

/// 产出待补全元数据的照片。
pub(crate) trait PhotoSource {
    async fn collect<R, W>(
        &mut self,
        prompter: &mut Prompter<R, W>,
        list: &PhotoList,
    ) -> Result<Vec<Photo>, AnnotateError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin;
}

/// 照片目录中尚未出现在清单里的图片。
pub struct UnlistedPhotos<'a> {
    store: &'a PhotoStore,
}

impl<'a> UnlistedPhotos<'a> {
    pub fn new(store: &'a PhotoStore) -> Self {
        Self { store }
    }
}

impl PhotoSource for UnlistedPhotos<'_> {
    async fn collect<R, W>(
        &mut self,
        _prompter: &mut Prompter<R, W>,
        list: &PhotoList,
    ) -> Result<Vec<Photo>, AnnotateError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let photos = self
            .store
            .list_photos()
            .await?
            .into_iter()
            .filter(|entry| !list.contains(&entry.name))
            .map(|entry| Photo {
                title: file_stem(&entry.name),
                filename: entry.name,
                description: String::new(),
            })
            .collect();
        Ok(photos)
    }
}

/// 逐行读取 URL 并下载到照片目录，直到输入 `done`。
pub struct RemoteDownloads<'a> {
    store: &'a PhotoStore,
    client: Client,
}

impl<'a> RemoteDownloads<'a> {
    pub fn new(store: &'a PhotoStore, client: Client) -> Self {
        Self { store, client }
    }
}

impl PhotoSource for RemoteDownloads<'_> {
    async fn collect<R, W>(
        &mut self,
        prompter: &mut Prompter<R, W>,
        _list: &PhotoList,
    ) -> Result<Vec<Photo>, AnnotateError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        prompter
            .say(&format!(
                "Enter photo URLs one by one. Type '{FETCH_DONE_KEYWORD}' when finished:"
            ))
            .await?;

        let mut photos: Vec<Photo> = Vec::new();
        loop {
            let url = prompter.ask("Enter photo URL: ").await?;
            let url = url.trim();
            if url == FETCH_DONE_KEYWORD {
                break;
            }
            if url.is_empty() {
                continue;
            }

            match download_photo(&self.client, self.store, url).await {
                Ok(filename) => {
                    if !photos.iter().any(|photo| photo.filename == filename) {
                        photos.push(Photo {
                            title: file_stem(&filename),
                            filename,
                            description: String::new(),
                        });
                    }
                }
                Err(err) => {
                    warn!(url, error = %err, "download failed");
                    prompter
                        .say(&format!("Error downloading photo from {url}: {err}"))
                        .await?;
                }
            }
        }
        Ok(photos)
    }
}

/// 下载单张照片，文件名取 URL 路径最后一段解码后的结果。
pub async fn download_photo(
    client: &Client,
    store: &PhotoStore,
    url: &str,
) -> Result<String, AnnotateError> {
    let parsed = Url::parse(url).map_err(|err| AnnotateError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })?;
    let filename = parsed
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AnnotateError::InvalidUrl {
            url: url.to_string(),
            reason: "cannot determine filename".into(),
        })?;
    let filename = percent_decode_str(filename)
        .decode_utf8()
        .map_err(|err| AnnotateError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?
        .into_owned();
    if !is_photo_filename(&filename) {
        return Err(AnnotateError::UnsupportedType(filename));
    }
    let target = store.resolve_photo(&filename, true).await?;

    let response = client
        .get(parsed)
        .send()
        .await
        .map_err(|source| AnnotateError::Http {
            url: url.to_string(),
            source,
        })?;
    if response.status() != StatusCode::OK {
        return Err(AnnotateError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let save_error = |source| AnnotateError::Save {
        path: target.clone(),
        source,
    };
    let mut file = AtomicFile::new(&target).await.map_err(save_error)?;
    let mut body = response.bytes_stream();
    let write_result: Result<(), AnnotateError> = async {
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| AnnotateError::Http {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(save_error)?;
        }
        Ok(())
    }
    .await;
    if let Err(err) = write_result {
        file.cleanup().await;
        return Err(err);
    }
    file.finalize().await.map_err(save_error)?;

    info!(url, %filename, "downloaded photo");
    Ok(filename)
}

/// 询问每张候选照片的标题与描述并写回清单，返回更新的条目数。
pub(crate) async fn annotate<S, R, W>(
    source: &mut S,
    prompter: &mut Prompter<R, W>,
    catalog: &PhotoCatalog,
) -> Result<usize, AnnotateError>
where
    S: PhotoSource,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let list = catalog.load().await?;
    let candidates = source.collect(prompter, &list).await?;
    if candidates.is_empty() {
        prompter.say("No photos need metadata.").await?;
        return Ok(0);
    }

    let total = candidates.len();
    let mut photos = Vec::with_capacity(total);
    for (index, mut photo) in candidates.into_iter().enumerate() {
        let position = index + 1;
        let title = prompter
            .ask(&format!(
                "Enter title for photo {position}/{total} ({}) [{}]: ",
                photo.filename, photo.title
            ))
            .await?;
        let title = title.trim();
        if !title.is_empty() {
            photo.title = title.to_string();
        }

        let description = prompter
            .ask(&format!(
                "Enter description for photo {position}/{total} ({}): ",
                photo.title
            ))
            .await?;
        photo.description = description.trim().to_string();
        photos.push(photo);
    }

    catalog.upsert_all(photos).await?;
    prompter.say("Photo list updated successfully!").await?;
    info!(count = total, path = ?catalog.list_path(), "photo list annotated");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use tempfile::tempdir;

    use crate::config::PHOTO_LIST_FILE;
    use crate::photo_list::read_photo_list;

    fn make_env() -> (tempfile::TempDir, PhotoStore, PhotoCatalog) {
        let temp = tempdir().expect("tempdir");
        let photo_dir = temp.path().join("photos");
        std::fs::create_dir_all(&photo_dir).expect("create photo dir");
        let catalog = PhotoCatalog::new(photo_dir.join(PHOTO_LIST_FILE), &photo_dir);
        (temp, PhotoStore::new(photo_dir), catalog)
    }

    fn prompter(input: &str) -> Prompter<&[u8], Vec<u8>> {
        Prompter::new(input.as_bytes(), Vec::new())
    }

    async fn spawn_photo_host() -> String {
        let app = Router::new()
            .route("/img/cat.jpg", get(|| async { "meow" }))
            .route("/raw/{*rest}", get(|| async { "purr" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn annotates_only_unlisted_photos() {
        let (_temp, store, catalog) = make_env();
        let root = store.root_path();
        for name in ["alpha.jpg", "beta.png", "notes.txt"] {
            std::fs::write(root.join(name), b"data").expect("write");
        }
        catalog
            .upsert(Photo {
                filename: "beta.png".into(),
                title: "Beta".into(),
                description: "already known".into(),
            })
            .await
            .expect("seed");

        let mut console = prompter("Alpha\nfirst photo\n");
        let updated = annotate(&mut UnlistedPhotos::new(&store), &mut console, &catalog)
            .await
            .expect("annotate");
        assert_eq!(updated, 1);

        let list = read_photo_list(catalog.list_path()).await.expect("list");
        assert_eq!(list.photos.len(), 2);
        assert_eq!(list.get("beta.png").map(|p| p.description.as_str()), Some("already known"));
        let alpha = list.get("alpha.jpg").expect("alpha entry");
        assert_eq!(alpha.title, "Alpha");
        assert_eq!(alpha.description, "first photo");

        let output = String::from_utf8(console.into_output()).expect("utf-8");
        assert!(output.contains("(alpha.jpg) [alpha]"));
        assert!(output.contains("Photo list updated successfully!"));
    }

    #[tokio::test]
    async fn empty_title_keeps_default() {
        let (_temp, store, catalog) = make_env();
        std::fs::write(store.root_path().join("sunset.jpeg"), b"data").expect("write");

        let mut console = prompter("\r\n  evening sky \r\n");
        annotate(&mut UnlistedPhotos::new(&store), &mut console, &catalog)
            .await
            .expect("annotate");

        let list = catalog.load().await.expect("list");
        assert_eq!(list.photos[0].title, "sunset");
        assert_eq!(list.photos[0].description, "evening sky");
    }

    #[tokio::test]
    async fn closed_input_aborts_without_writing() {
        let (_temp, store, catalog) = make_env();
        std::fs::write(store.root_path().join("a.jpg"), b"data").expect("write");
        std::fs::write(store.root_path().join("b.jpg"), b"data").expect("write");

        let mut console = prompter("A\nfirst\nB\n");
        let result = annotate(&mut UnlistedPhotos::new(&store), &mut console, &catalog).await;
        assert!(matches!(result, Err(AnnotateError::InputClosed)));
        assert!(!catalog.list_path().exists());
    }

    #[tokio::test]
    async fn nothing_to_annotate() {
        let (_temp, store, catalog) = make_env();
        let mut console = prompter("");
        let updated = annotate(&mut UnlistedPhotos::new(&store), &mut console, &catalog)
            .await
            .expect("annotate");
        assert_eq!(updated, 0);
        assert!(!catalog.list_path().exists());
    }

    #[tokio::test]
    async fn fetches_remote_photos_and_skips_failures() {
        let (_temp, store, catalog) = make_env();
        let host = spawn_photo_host().await;
        let input = format!(
            "{host}/img/cat.jpg\n{host}/img/missing.jpg\n{host}/img/notes.txt\nnot a url\n\ndone\nMy Cat\nfluffy\n"
        );

        let mut source = RemoteDownloads::new(&store, Client::new());
        let mut console = prompter(&input);
        let updated = annotate(&mut source, &mut console, &catalog)
            .await
            .expect("annotate");
        assert_eq!(updated, 1);

        let root = store.root_path();
        assert_eq!(std::fs::read(root.join("cat.jpg")).expect("read"), b"meow");
        assert!(!root.join("missing.jpg").exists());

        let list = catalog.load().await.expect("list");
        assert_eq!(list.photos.len(), 1);
        assert_eq!(list.photos[0].filename, "cat.jpg");
        assert_eq!(list.photos[0].title, "My Cat");
        assert_eq!(list.photos[0].description, "fluffy");

        let output = String::from_utf8(console.into_output()).expect("utf-8");
        assert_eq!(output.matches("Error downloading photo").count(), 3);
    }

    #[tokio::test]
    async fn download_rejects_urls_without_photo_name() {
        let (_temp, store, _catalog) = make_env();
        let client = Client::new();
        let result = download_photo(&client, &store, "http://127.0.0.1:9/").await;
        assert!(matches!(result, Err(AnnotateError::InvalidUrl { .. })));
        let result = download_photo(&client, &store, "http://127.0.0.1:9/readme.txt").await;
        assert!(matches!(result, Err(AnnotateError::UnsupportedType(name)) if name == "readme.txt"));
        assert!(std::fs::read_dir(store.root_path()).expect("read dir").next().is_none());
    }

    #[tokio::test]
    async fn download_decodes_percent_encoded_names() {
        let (temp, store, _catalog) = make_env();
        let host = spawn_photo_host().await;
        let client = Client::new();

        let saved = download_photo(&client, &store, &format!("{host}/raw/my%20cat.jpg"))
            .await
            .expect("download");
        assert_eq!(saved, "my cat.jpg");
        assert_eq!(std::fs::read(store.root_path().join("my cat.jpg")).expect("read"), b"purr");

        let result = download_photo(&client, &store, &format!("{host}/raw/..%2Fescape.jpg")).await;
        assert!(matches!(result, Err(AnnotateError::Store(StoreError::InvalidName(_)))));
        assert!(!temp.path().join("escape.jpg").exists());
    }
}
