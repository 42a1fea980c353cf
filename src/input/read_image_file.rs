// 该文件是 Tricheck 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_to_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid image file: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 已解码的 RGB 图像
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  image: RgbImage,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_to_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    debug!("读取图像文件: {}", path.display());
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(ImageFileInput {
      image: image.into_rgb8(),
    })
  }

  /// 从上传的字节数据解码
  pub fn from_bytes(data: &[u8]) -> Result<Self, ImageFileInputError> {
    let image = image::load_from_memory(data)?;
    Ok(ImageFileInput {
      image: image.into_rgb8(),
    })
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn garbage_bytes_are_rejected() {
    let result = ImageFileInput::from_bytes(b"definitely not an image");
    assert!(matches!(result, Err(ImageFileInputError::ImageLoadError(_))));
  }

  #[test]
  fn png_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(8, 6, image::Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let input = ImageFileInput::open(&path).unwrap();
    assert_eq!(input.image().dimensions(), (8, 6));
    assert_eq!(input.image().get_pixel(3, 3), &image::Rgb([10, 20, 30]));
  }
}
