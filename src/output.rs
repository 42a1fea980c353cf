// 该文件是 Tricheck 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbImage;
use thiserror::Error;

/// 保存或编码标注后的图像，返回可交给上游的引用
pub trait Persist {
  type Handle;
  type Error;
  fn persist(&self, image: &RgbImage, prefix: &str) -> Result<Self::Handle, Self::Error>;
}

pub mod draw;

mod inline_image;
mod save_image_file;

pub use self::inline_image::InlineImageEncoder;
pub use self::save_image_file::{DirectoryImageStore, StoredImage};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("字体加载错误: {0}")]
  FontError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}
