// 该文件是 Tricheck 项目的一部分。
// src/model/fixture.rs - 记录回放模型
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

//! 从 JSON 记录中回放推理结果的模型，用于离线复核与测试。
//!
//! 检测记录格式为 `DetectItem` 数组：
//!
//! ```json
//! [{ "class_id": 0, "score": 0.91, "bbox": { "x1": 10, "y1": 10, "x2": 60, "y2": 30 } }]
//! ```
//!
//! 分类记录格式为概率数组，例如 `[0.05, 0.95]`。

use image::RgbImage;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  audio::MelSpectrogram,
  model::{DetectItem, DetectResult, Model, ModelError, Probabilities},
  url_to_path,
};

const FIXTURE_SCHEME: &str = "fixture";

fn check_scheme(url: &Url) -> Result<(), ModelError> {
  if url.scheme() != FIXTURE_SCHEME {
    return Err(ModelError::SchemeMismatch(format!(
      "期望方案 '{}', 实际方案 '{}'",
      FIXTURE_SCHEME,
      url.scheme()
    )));
  }
  Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct FixtureDetector {
  items: Vec<DetectItem>,
}

impl FromUrlWithScheme for FixtureDetector {
  const SCHEME: &'static str = FIXTURE_SCHEME;
}

impl FromUrl for FixtureDetector {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url)?;
    let path = url_to_path(url);
    info!("加载检测记录: {}", path.display());
    let data = std::fs::read(&path)?;
    let items: Vec<DetectItem> = serde_json::from_slice(&data)?;
    debug!("检测记录条目数: {}", items.len());
    Ok(Self { items })
  }
}

impl Model for FixtureDetector {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(DetectResult::from(self.items.clone()))
  }
}

#[derive(Debug, Clone)]
pub struct FixtureClassifier {
  probabilities: Probabilities,
}

impl FromUrlWithScheme for FixtureClassifier {
  const SCHEME: &'static str = FIXTURE_SCHEME;
}

impl FromUrl for FixtureClassifier {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url)?;
    let path = url_to_path(url);
    info!("加载分类记录: {}", path.display());
    let data = std::fs::read(&path)?;
    let probabilities: Probabilities = serde_json::from_slice(&data)?;
    if probabilities.0.is_empty() {
      return Err(ModelError::OutputShapeError("分类记录为空".to_string()));
    }
    Ok(Self { probabilities })
  }
}

impl Model for FixtureClassifier {
  type Input = MelSpectrogram;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(self.probabilities.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  #[test]
  fn loads_detections_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("detections.json");
    std::fs::write(
      &path,
      r#"[{"class_id": 2, "bbox": {"x1": 1, "y1": 2, "x2": 11, "y2": 12}}]"#,
    )
    .unwrap();

    let url = Url::parse(&format!("fixture://{}", path.display())).unwrap();
    let detector = FixtureDetector::from_url(&url).unwrap();
    let result = detector.infer(&RgbImage::new(4, 4)).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id, 2);
    assert_eq!(result.items[0].score, 0.0);
    assert_eq!(result.items[0].bbox, BoundingBox::new(1, 2, 11, 12));
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("onnx:///tmp/model.onnx").unwrap();
    assert!(matches!(
      FixtureDetector::from_url(&url),
      Err(ModelError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn rejects_empty_probabilities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probs.json");
    std::fs::write(&path, "[]").unwrap();
    let url = Url::parse(&format!("fixture://{}", path.display())).unwrap();
    assert!(FixtureClassifier::from_url(&url).is_err());
  }
}
