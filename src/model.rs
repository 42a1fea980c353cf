// 该文件是 Tricheck 项目的一部分。
// src/model.rs - 模型
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
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, audio::MelSpectrogram};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 像素坐标边框 (x1, y1) - (x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x1: i32,
  pub y1: i32,
  pub x2: i32,
  pub y2: i32,
}

impl BoundingBox {
  pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 边框像素面积，(x2 - x1) * (y2 - y1)
  pub fn area(&self) -> i64 {
    (self.x2 as i64 - self.x1 as i64) * (self.y2 as i64 - self.y1 as i64)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  #[serde(default)]
  pub score: f32,
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 模型类别表：类别编号到类别名称的有序映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTable(Vec<String>);

impl ClassTable {
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self(names.into_iter().map(Into::into).collect())
  }

  pub fn resolve(&self, class_id: u32) -> Option<&str> {
    self.0.get(class_id as usize).map(String::as_str)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.iter().any(|n| n == name)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// 分类器输出的概率分布
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probabilities(pub Vec<f32>);

impl Probabilities {
  /// 返回 (最大概率下标, 最大概率)，并列时取第一个
  pub fn argmax(&self) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &p) in self.0.iter().enumerate() {
      match best {
        Some((_, max)) if p <= max => {}
        _ => best = Some((idx, p)),
      }
    }
    best
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型不可用: {0}")]
  Unavailable(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型记录解析错误: {0}")]
  FixtureParseError(#[from] serde_json::Error),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状错误: {0}")]
  OutputShapeError(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[cfg(feature = "model_onnx")]
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
}

mod fixture;
pub use self::fixture::{FixtureClassifier, FixtureDetector};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxDetector};

/// 按 URL 方案选择的目标检测模型
pub enum DetectorWrapper {
  Fixture(FixtureDetector),
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FixtureDetector::SCHEME => Ok(DetectorWrapper::Fixture(FixtureDetector::from_url(url)?)),
      #[cfg(feature = "model_onnx")]
      OnnxDetector::SCHEME => Ok(DetectorWrapper::Onnx(OnnxDetector::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(format!(
        "不支持的检测模型方案 '{}'",
        other
      ))),
    }
  }
}

impl Model for DetectorWrapper {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      DetectorWrapper::Fixture(model) => model.infer(input),
      #[cfg(feature = "model_onnx")]
      DetectorWrapper::Onnx(model) => model.infer(input),
    }
  }
}

/// 按 URL 方案选择的音频分类模型
pub enum ClassifierWrapper {
  Fixture(FixtureClassifier),
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxClassifier),
}

impl FromUrl for ClassifierWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      FixtureClassifier::SCHEME => Ok(ClassifierWrapper::Fixture(FixtureClassifier::from_url(
        url,
      )?)),
      #[cfg(feature = "model_onnx")]
      OnnxClassifier::SCHEME => Ok(ClassifierWrapper::Onnx(OnnxClassifier::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(format!(
        "不支持的分类模型方案 '{}'",
        other
      ))),
    }
  }
}

impl Model for ClassifierWrapper {
  type Input = MelSpectrogram;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      ClassifierWrapper::Fixture(model) => model.infer(input),
      #[cfg(feature = "model_onnx")]
      ClassifierWrapper::Onnx(model) => model.infer(input),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn area_uses_corner_difference() {
    assert_eq!(BoundingBox::new(10, 20, 60, 40).area(), 1000);
    assert_eq!(BoundingBox::new(5, 5, 5, 30).area(), 0);
  }

  #[test]
  fn class_table_resolves_in_range_only() {
    let table = ClassTable::new(["windshield", "sticker"]);
    assert_eq!(table.resolve(0), Some("windshield"));
    assert_eq!(table.resolve(1), Some("sticker"));
    assert_eq!(table.resolve(2), None);
    assert!(!table.contains("Sticker"));
  }

  #[test]
  fn argmax_prefers_first_on_tie() {
    let probs = Probabilities(vec![0.2, 0.4, 0.4]);
    assert_eq!(probs.argmax(), Some((1, 0.4)));
    assert_eq!(Probabilities(vec![]).argmax(), None);
  }
}
