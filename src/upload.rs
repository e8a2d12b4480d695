//! 上传表单与 multipart 照片上传处理器。

use axum::extract::multipart::Field;
use axum::extract::{Extension, Multipart};
use axum::response::{Html, Redirect};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::info;

use crate::atomic::AtomicFile;
use crate::catalog::PhotoCatalog;
use crate::error::ApiError;
use crate::photo_list::Photo;
use crate::store::{PhotoStore, is_photo_filename};
use crate::templates::Templates;

const PHOTO_FIELD: &str = "photo";
const TITLE_FIELD: &str = "title";
const DESCRIPTION_FIELD: &str = "description";

/// 已写入临时文件、尚未替换目标的照片。
struct StagedPhoto {
    filename: String,
    file: AtomicFile,
    size: u64,
}

#[derive(Default)]
struct UploadForm {
    title: String,
    description: String,
    photo: Option<StagedPhoto>,
}

/// 返回上传表单页面。
pub async fn upload_form(
    Extension(templates): Extension<Arc<Templates>>,
) -> Result<Html<Cow<'static, [u8]>>, ApiError> {
    let form = templates
        .upload_form()
        .await
        .map_err(ApiError::internal("failed to load upload form"))?;
    Ok(Html(form))
}

/// 保存上传的照片并更新照片清单，成功后重定向回画廊。
pub async fn upload_photo(
    Extension(store): Extension<Arc<PhotoStore>>,
    Extension(catalog): Extension<Arc<PhotoCatalog>>,
    mut multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let mut form = UploadForm::default();
    if let Err(err) = read_form(&store, &mut multipart, &mut form).await {
        if let Some(staged) = form.photo.take() {
            staged.file.cleanup().await;
        }
        return Err(err);
    }

    let Some(StagedPhoto {
        filename,
        file,
        size,
    }) = form.photo
    else {
        return Err(ApiError::BadRequest("failed to retrieve file".into()));
    };
    file.finalize()
        .await
        .map_err(ApiError::internal("failed to save photo"))?;

    catalog
        .upsert(Photo {
            filename: filename.clone(),
            title: form.title.clone(),
            description: form.description.clone(),
        })
        .await
        .map_err(ApiError::internal("failed to update photo list"))?;

    info!(
        %filename,
        title = %form.title,
        description = %form.description,
        size,
        "uploaded photo"
    );
    Ok(Redirect::to("/"))
}

async fn read_form(
    store: &PhotoStore,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(TITLE_FIELD) => form.title = field.text().await?,
            Some(DESCRIPTION_FIELD) => form.description = field.text().await?,
            Some(PHOTO_FIELD) if form.photo.is_none() => {
                form.photo = Some(stage_photo(store, field).await?);
            }
            _ => {}
        }
    }
    Ok(())
}

async fn stage_photo(store: &PhotoStore, mut field: Field<'_>) -> Result<StagedPhoto, ApiError> {
    let filename = field
        .file_name()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::BadRequest("failed to retrieve file".into()))?;
    if !is_photo_filename(&filename) {
        return Err(ApiError::BadRequest("invalid file type".into()));
    }
    let target = store.resolve_photo(&filename, true).await?;

    let mut file = AtomicFile::new(&target)
        .await
        .map_err(ApiError::internal("failed to save photo"))?;
    let mut size: u64 = 0;
    let write_result: Result<(), ApiError> = async {
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(ApiError::internal("failed to save photo"))?;
        }
        Ok(())
    }
    .await;
    if let Err(err) = write_result {
        file.cleanup().await;
        return Err(err);
    }

    Ok(StagedPhoto {
        filename,
        file,
        size,
    })
}
