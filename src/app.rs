//! 应用状态与路由装配。

use axum::Router;
use axum::body::Body as AxumBody;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::middleware;
use axum::routing::get;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::catalog::PhotoCatalog;
use crate::store::PhotoStore;
use crate::templates::Templates;
use crate::{gallery, http, photos, upload};

/// 处理器共享的状态，路由构建时以 Extension 注入。
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PhotoStore>,
    pub catalog: Arc<PhotoCatalog>,
    pub templates: Arc<Templates>,
    pub upload_max_size: usize,
}

impl AppState {
    pub fn new(
        photo_dir: PathBuf,
        photo_list: PathBuf,
        static_dir: PathBuf,
        upload_max_size: usize,
    ) -> Result<Self, tera::Error> {
        let catalog = PhotoCatalog::new(photo_list, &photo_dir);
        Ok(Self {
            store: Arc::new(PhotoStore::new(photo_dir)),
            catalog: Arc::new(catalog),
            templates: Arc::new(Templates::new(static_dir)?),
            upload_max_size,
        })
    }
}

pub fn build_router(state: &AppState) -> Router {
    Router::new()
        .route("/", get(gallery::list_photos))
        .route("/photos", get(photos::photo_not_specified))
        .route("/photos/", get(photos::photo_not_specified))
        .route("/photos/{*name}", get(photos::serve_photo))
        .route(
            "/upload",
            get(upload::upload_form)
                .post(upload::upload_photo)
                .layer(DefaultBodyLimit::max(state.upload_max_size)),
        )
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(http::make_request_span::<AxumBody>)
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(state.store.clone()))
        .layer(Extension(state.catalog.clone()))
        .layer(Extension(state.templates.clone()))
}
