//! CLI arguments and server configuration defaults.

use clap::{Parser, Subcommand};
use shadow_rs::formatcp;
use std::path::PathBuf;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
pub const PHOTO_LIST_FILE: &str = "photo_list.json";
pub const UPLOAD_FORM_FILE: &str = "upload.html";
pub const DEFAULT_PHOTO_DIR: &str = "./photos";
pub const DEFAULT_STATIC_DIR: &str = "./static";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_MAX_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_TEMP_TTL_SECS: u64 = 24 * 60 * 60;
pub const TEMP_SWEEP_INTERVAL_SECS: u64 = 900;
pub const FETCH_DONE_KEYWORD: &str = "done";

/// CLI arguments and environment configuration.
#[derive(Parser, Debug)]
#[command(name = "photo-gallery", version = VERSION_INFO, about = "Photo gallery server")]
pub struct Args {
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "GALLERY_PHOTO_DIR",
        default_value = DEFAULT_PHOTO_DIR,
        help = "Directory holding the photo files"
    )]
    pub photo_dir: PathBuf,
    #[arg(
        short = 'l',
        long,
        global = true,
        env = "GALLERY_PHOTO_LIST",
        help = "Photo list JSON path (defaults to <photo-dir>/photo_list.json)"
    )]
    pub photo_list: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "GALLERY_STATIC_DIR",
        default_value = DEFAULT_STATIC_DIR,
        help = "Directory holding upload.html"
    )]
    pub static_dir: PathBuf,
    #[arg(
        short = 'b',
        long,
        global = true,
        env = "GALLERY_BIND",
        default_value = "0.0.0.0",
        help = "Bind address for HTTP"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "GALLERY_HTTP_PORT",
        default_value_t = DEFAULT_HTTP_PORT,
        help = "HTTP port"
    )]
    pub http_port: u16,
    #[arg(
        long,
        global = true,
        env = "GALLERY_UPLOAD_MAX_SIZE",
        default_value_t = DEFAULT_UPLOAD_MAX_SIZE,
        help = "Max upload request size in bytes"
    )]
    pub upload_max_size: usize,
    #[arg(
        long,
        global = true,
        env = "GALLERY_CORS_ORIGINS",
        help = "Comma separated CORS origins"
    )]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GALLERY_TEMP_TTL_SECS",
        default_value_t = DEFAULT_TEMP_TTL_SECS,
        help = "Stale temp file cleanup threshold in seconds (0 to disable)"
    )]
    pub temp_ttl_secs: u64,
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Args {
    /// Location of the photo list, falling back to a file inside the photo directory.
    pub fn photo_list_path(&self) -> PathBuf {
        self.photo_list
            .clone()
            .unwrap_or_else(|| self.photo_dir.join(PHOTO_LIST_FILE))
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the gallery over HTTP (default).
    Serve,
    /// Prompt for titles and descriptions of photos missing from the photo list.
    Annotate,
    /// Download photos from URLs read on stdin, then prompt for their metadata.
    Fetch,
    /// Remove a photo list entry. The photo file is kept.
    Forget {
        #[arg(help = "File name of the entry to remove")]
        filename: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photo_list_defaults_into_photo_dir() {
        let args = Args::parse_from(["photo-gallery", "--photo-dir", "/srv/pics"]);
        assert_eq!(args.photo_list_path(), PathBuf::from("/srv/pics/photo_list.json"));
        assert_eq!(args.command, None);
        assert_eq!(args.upload_max_size, DEFAULT_UPLOAD_MAX_SIZE);
    }

    #[test]
    fn global_options_follow_subcommand() {
        let args = Args::parse_from([
            "photo-gallery",
            "forget",
            "cat.jpg",
            "--photo-list",
            "/tmp/photos.json",
        ]);
        assert_eq!(args.photo_list_path(), PathBuf::from("/tmp/photos.json"));
        assert_eq!(
            args.command,
            Some(Command::Forget {
                filename: "cat.jpg".into()
            })
        );
    }
}
