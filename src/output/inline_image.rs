// 该文件是 Tricheck 项目的一部分。
// src/output/inline_image.rs - 内嵌 base64 标注图像
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

use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::output::{OutputError, Persist};

/// 将标注图像编码为 JPEG 后以 base64 直接放入结果，不写文件
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineImageEncoder;

impl Persist for InlineImageEncoder {
  type Handle = String;
  type Error = OutputError;

  fn persist(&self, image: &RgbImage, _prefix: &str) -> Result<String, OutputError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;
    let bytes = buffer.into_inner();
    debug!("标注图像编码大小: {} 字节", bytes.len());
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
  }
}
