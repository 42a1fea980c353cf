// 该文件是 Tricheck 项目的一部分。
// src/check/modification.rs - 非法改装检查
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

use std::sync::Arc;

use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
  check::{Check, InspectionError, resolve_classes},
  model::{DetectResult, Model},
  output::{Persist, StoredImage, draw::Draw},
  rules::{ModificationRules, RuleBook},
};

const OUTPUT_PREFIX: &str = "det_";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModificationVerdict {
  pub illegal_detected: bool,
  pub detected_classes: Vec<String>,
  pub violation_message: String,
  #[serde(flatten)]
  pub image: StoredImage,
}

/// 任一检测类别属于违规类别即判定违规；违规文本固定，与具体类别无关
pub fn assess_modification<'r>(
  rules: &'r ModificationRules,
  detected_classes: &[String],
) -> (bool, &'r str) {
  let illegal = detected_classes.iter().any(|c| rules.is_illegal(c));
  let message = if illegal {
    rules.violation_message.as_str()
  } else {
    rules.clean_message.as_str()
  };
  (illegal, message)
}

pub struct VehicleModificationChecker<M, S> {
  model: Arc<M>,
  rules: Arc<RuleBook>,
  draw: Arc<Draw>,
  store: S,
}

impl<M, S> VehicleModificationChecker<M, S> {
  pub fn new(model: Arc<M>, rules: Arc<RuleBook>, draw: Arc<Draw>, store: S) -> Self {
    Self {
      model,
      rules,
      draw,
      store,
    }
  }
}

impl<M, ME, S, SE> Check for VehicleModificationChecker<M, S>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  S: Persist<Handle = StoredImage, Error = SE>,
  SE: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Verdict = ModificationVerdict;

  fn run_check(&self, image: &RgbImage) -> Result<ModificationVerdict, InspectionError> {
    let rules = &self.rules.modification;

    let detections = self.model.infer(image).map_err(InspectionError::inference)?;
    debug!("改装检测: {} 个物体", detections.len());

    let detected_classes = resolve_classes(&detections, &rules.classes)?;
    let (illegal_detected, message) = assess_modification(rules, &detected_classes);

    let annotated = self.draw.draw_detections(image, &detections, &rules.classes);
    let stored = self
      .store
      .persist(&annotated, OUTPUT_PREFIX)
      .map_err(InspectionError::output)?;

    info!(
      "改装检查完成: 违规={}, 类别={:?}, 图像={}",
      illegal_detected, detected_classes, stored.output_image
    );

    Ok(ModificationVerdict {
      illegal_detected,
      detected_classes,
      violation_message: message.to_string(),
      image: stored,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn empty_detection_is_clean() {
    let rules = ModificationRules::default();
    let (illegal, message) = assess_modification(&rules, &[]);
    assert!(!illegal);
    assert_eq!(message, "✅ No illegal modification detected.");
  }

  #[test]
  fn benign_classes_only_are_clean() {
    let rules = ModificationRules::default();
    let (illegal, _) = assess_modification(
      &rules,
      &classes(&["orginal_three_wheeler", "other_vehical", "orginal_three_wheeler"]),
    );
    assert!(!illegal);
  }

  #[test]
  fn any_illegal_class_flags_violation() {
    let rules = ModificationRules::default();
    for name in &rules.illegal_classes {
      let (illegal, message) =
        assess_modification(&rules, &classes(&["orginal_three_wheeler", name]));
      assert!(illegal, "{} should be illegal", name);
      assert!(message.contains("Illegal Vehicle Modification"));
    }
  }

  #[test]
  fn matching_is_case_sensitive() {
    let rules = ModificationRules::default();
    let (illegal, _) = assess_modification(&rules, &classes(&["RIM_CAP", "Air_Cleaner"]));
    assert!(!illegal);
  }
}
