// 该文件是 Tricheck 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::info;

use crate::{
  model::{ClassTable, DetectItem, DetectResult},
  output::OutputError,
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

// 按类别编号循环取色
const PALETTE: [[u8; 3]; 8] = [
  [255, 56, 56],
  [255, 157, 151],
  [255, 112, 31],
  [255, 178, 29],
  [207, 210, 49],
  [72, 249, 10],
  [0, 194, 255],
  [52, 69, 147],
];

pub struct Draw {
  font_size: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
    }
  }
}

impl Draw {
  /// 从 TTF/OTF 文件加载标签字体；未加载字体时只绘制边框
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, OutputError> {
    let path = path.as_ref();
    info!("加载标签字体: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|e| OutputError::FontError(e.to_string()))?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn font_size(mut self, size: f32) -> Self {
    self.font_size = size;
    self
  }

  fn color_for(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, label: &str) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = item.bbox.x1.clamp(0, w - 1);
    let y_min = item.bbox.y1.clamp(0, h - 1);
    let x_max = item.bbox.x2.clamp(0, w - 1);
    let y_max = item.bbox.y2.clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Self::color_for(item.class_id);

    // 绘制边框（加粗）
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, label);
    let label_height = text_height as i32 + 2 * self.label_text_vertical_padding;

    // 标签背景放在边框上方，空间不够时放在框内
    let label_x = x_min;
    let label_y = if y_min >= label_height {
      y_min - label_height
    } else {
      y_min
    };
    let label_width = (text_width as i32).min(w - label_x);

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        label,
      );
    }
  }

  /// 在图像副本上绘制检测框与类别标签
  pub fn draw_detections(
    &self,
    image: &RgbImage,
    result: &DetectResult,
    classes: &ClassTable,
  ) -> RgbImage {
    let mut canvas = image.clone();
    for item in result.iter() {
      let name = classes
        .resolve(item.class_id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("class {}", item.class_id));
      let label = format!("{} {:.2}", name, item.score);
      self.draw_bbox_with_label(&mut canvas, item, &label);
    }
    canvas
  }
}
