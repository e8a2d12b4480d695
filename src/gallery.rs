//! 画廊首页：列出照片目录中的有效图片。

use axum::extract::Extension;
use axum::response::Html;
use serde::Serialize;
use std::sync::Arc;
use tera::Context;
use tracing::{info, warn};

use crate::catalog::PhotoCatalog;
use crate::error::ApiError;
use crate::photo_list::PhotoList;
use crate::store::{PhotoEntry, PhotoStore};
use crate::templates::Templates;

pub const GALLERY_TEMPLATE: &str = "gallery.html";

#[derive(Debug, Serialize)]
struct GalleryItem {
    name: String,
    label: String,
    description: String,
    size: u64,
    modified: Option<String>,
}

/// 渲染画廊页面；清单读取失败只影响标题与描述的展示。
pub async fn list_photos(
    Extension(store): Extension<Arc<PhotoStore>>,
    Extension(catalog): Extension<Arc<PhotoCatalog>>,
    Extension(templates): Extension<Arc<Templates>>,
) -> Result<Html<String>, ApiError> {
    let entries = store
        .list_photos()
        .await
        .map_err(ApiError::internal("failed to read photo directory"))?;
    let list = catalog.load().await.unwrap_or_else(|err| {
        warn!(error = %err, "photo list unavailable, rendering without metadata");
        PhotoList::default()
    });

    let items: Vec<GalleryItem> = entries
        .into_iter()
        .map(|entry| gallery_item(entry, &list))
        .collect();
    info!(count = items.len(), "list photos");

    let mut context = Context::new();
    context.insert("photos", &items);
    let page = templates
        .render(GALLERY_TEMPLATE, &context)
        .map_err(ApiError::internal("failed to render gallery"))?;
    Ok(Html(page))
}

fn gallery_item(entry: PhotoEntry, list: &PhotoList) -> GalleryItem {
    let photo = list.get(&entry.name);
    let label = photo
        .map(|photo| photo.title.trim())
        .filter(|title| !title.is_empty())
        .unwrap_or(entry.name.as_str())
        .to_string();
    let description = photo
        .map(|photo| photo.description.clone())
        .unwrap_or_default();
    GalleryItem {
        name: entry.name,
        label,
        description,
        size: entry.size,
        modified: entry.modified,
    }
}
