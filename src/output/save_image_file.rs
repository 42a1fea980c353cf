// 该文件是 Tricheck 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use image::{ImageFormat, RgbImage};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Persist},
  url_to_path,
};

/// 已保存的标注图像：文件名与对外访问路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImage {
  pub output_image: String,
  pub result_image: String,
}

/// 将标注图像保存到目录中，每次调用使用新的随机文件名。
///
/// URL 形如 `folder:///srv/static/uploads?public=/static/uploads&dated`：
/// `public` 为对外访问路径前缀，`dated` 表示按 `年/月/日` 分子目录。
#[derive(Debug, Clone)]
pub struct DirectoryImageStore {
  directory: PathBuf,
  public_prefix: String,
  dated: bool,
}

impl FromUrlWithScheme for DirectoryImageStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryImageStore {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let directory = url_to_path(uri);
    let public_prefix = uri
      .query_pairs()
      .find(|(k, _)| k == "public")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| directory.to_string_lossy().into_owned());
    let dated = uri.query_pairs().any(|(k, _)| k == "dated");

    Ok(DirectoryImageStore {
      directory,
      public_prefix,
      dated,
    })
  }
}

impl DirectoryImageStore {
  pub fn new(directory: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
    Self {
      directory: directory.into(),
      public_prefix: public_prefix.into(),
      dated: false,
    }
  }

  pub fn dated(mut self, dated: bool) -> Self {
    self.dated = dated;
    self
  }

  fn relative_dir(&self) -> Option<String> {
    if !self.dated {
      return None;
    }
    let now = Utc::now();
    Some(format!(
      "{}/{:02}/{:02}",
      now.year(),
      now.month(),
      now.day()
    ))
  }
}

/// 以 create_new 创建文件并写入；写入或刷新失败时删除该文件
fn write_new_file<F>(path: &Path, write: F) -> Result<(), OutputError>
where
  F: FnOnce(&mut BufWriter<File>) -> Result<(), OutputError>,
{
  let file = OpenOptions::new().write(true).create_new(true).open(path)?;
  let mut writer = BufWriter::new(file);
  let written = write(&mut writer).and_then(|()| Ok(writer.flush()?));
  drop(writer);

  if let Err(e) = written {
    warn!("写入失败，删除不完整的文件: {}", path.display());
    if let Err(rm) = std::fs::remove_file(path) {
      warn!("删除文件失败: {}", rm);
    }
    return Err(e);
  }
  Ok(())
}

impl Persist for DirectoryImageStore {
  type Handle = StoredImage;
  type Error = OutputError;

  fn persist(&self, image: &RgbImage, prefix: &str) -> Result<StoredImage, OutputError> {
    let relative = self.relative_dir();
    let directory = match &relative {
      Some(sub) => self.directory.join(sub),
      None => self.directory.clone(),
    };
    std::fs::create_dir_all(&directory)?;

    let file_name = format!("{}{}.jpg", prefix, Uuid::new_v4().simple());
    let path = directory.join(&file_name);

    write_new_file(&path, |writer| Ok(image.write_to(writer, ImageFormat::Jpeg)?))?;

    info!("保存标注图像到文件: {}", path.display());

    let output_image = match relative {
      Some(sub) => format!("{}/{}", sub, file_name),
      None => file_name,
    };
    let result_image = format!(
      "{}/{}",
      self.public_prefix.trim_end_matches('/'),
      output_image
    );

    Ok(StoredImage {
      output_image,
      result_image,
    })
  }
}
