//! 嵌入式页面资源：画廊模板与上传表单。

use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use tera::{Context, Tera};
use tokio::fs;

use crate::config::UPLOAD_FORM_FILE;

#[derive(RustEmbed)]
#[folder = "static"]
/// 内置的静态页面，磁盘上缺失时作为回退。
pub struct StaticAssets;

#[derive(RustEmbed)]
#[folder = "templates"]
struct TemplateAssets;

pub struct Templates {
    tera: Tera,
    static_dir: PathBuf,
}

impl Templates {
    /// 编译全部内置模板。
    pub fn new(static_dir: PathBuf) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        for name in TemplateAssets::iter() {
            let Some(asset) = TemplateAssets::get(&name) else {
                continue;
            };
            let source = std::str::from_utf8(&asset.data)
                .map_err(|err| tera::Error::msg(format!("template {name} is not utf-8: {err}")))?;
            tera.add_raw_template(&name, source)?;
        }
        Ok(Self { tera, static_dir })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String, tera::Error> {
        self.tera.render(name, context)
    }

    /// 优先读取静态目录中的上传表单，不存在时返回内置版本。
    pub async fn upload_form(&self) -> io::Result<Cow<'static, [u8]>> {
        let path = self.static_dir.join(UPLOAD_FORM_FILE);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Cow::Owned(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => StaticAssets::get(UPLOAD_FORM_FILE)
                .map(|asset| asset.data)
                .ok_or(err),
            Err(err) => Err(err),
        }
    }
}
