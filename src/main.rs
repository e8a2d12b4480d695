//! Photo gallery server binary.
//!
//! Serves a directory of photos over HTTP, accepts uploads with a title and a
//! description, and keeps that metadata in a JSON photo list next to the
//! photos. The `annotate`, `fetch` and `forget` subcommands edit the same
//! photo list from the console.

mod annotate;
mod app;
mod atomic;
mod background;
mod catalog;
mod config;
mod error;
mod etag;
mod gallery;
mod http;
mod logging;
mod photo_list;
mod photos;
mod store;
mod templates;
mod upload;

use anyhow::Context;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{BufReader, stdin, stdout};
use tokio::signal;
use tracing::info;

use crate::annotate::{PhotoSource, Prompter, RemoteDownloads, UnlistedPhotos, annotate};
use crate::app::{AppState, build_router};
use crate::background::spawn_background_tasks;
use crate::config::{Args, Command};
use crate::http::build_cors_layer;

shadow!(build);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let args = Args::parse();
    let state = AppState::new(
        args.photo_dir.clone(),
        args.photo_list_path(),
        args.static_dir.clone(),
        args.upload_max_size,
    )
    .context("failed to load page templates")?;
    state.store.ensure_root().await.with_context(|| {
        format!(
            "cannot create photo directory {}",
            args.photo_dir.display()
        )
    })?;

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(&args, state).await,
        Command::Annotate => {
            let mut source = UnlistedPhotos::new(&state.store);
            run_console(&mut source, &state).await
        }
        Command::Fetch => {
            let mut source = RemoteDownloads::new(&state.store, reqwest::Client::new());
            run_console(&mut source, &state).await
        }
        Command::Forget { filename } => {
            let removed = state.catalog.remove(&filename).await?;
            info!(
                filename = %removed.filename,
                title = %removed.title,
                path = ?state.catalog.list_path(),
                "removed photo list entry"
            );
            Ok(())
        }
    }
}

async fn serve(args: &Args, state: AppState) -> anyhow::Result<()> {
    let mut app = build_router(&state);
    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("invalid bind address {}", args.host))?;
    let http_addr = SocketAddr::new(host, args.http_port);
    let handle = Handle::new();

    info!(
        photo_dir = ?state.store.root_path(),
        photo_list = ?state.catalog.list_path(),
        "Starting server at http://{}",
        http_addr
    );

    spawn_background_tasks(
        state.store.clone(),
        Duration::from_secs(args.temp_ttl_secs),
    );
    tokio::spawn(shutdown_signal(handle.clone()));
    axum_server::bind(http_addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn run_console<S: PhotoSource>(source: &mut S, state: &AppState) -> anyhow::Result<()> {
    let mut prompter = Prompter::new(BufReader::new(stdin()), stdout());
    let updated = annotate(source, &mut prompter, &state.catalog).await?;
    info!(updated, "annotation finished");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
