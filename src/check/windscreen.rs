// 该文件是 Tricheck 项目的一部分。
// src/check/windscreen.rs - 挡风玻璃可视率检查
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
  check::{Check, InspectionError},
  model::{DetectResult, Model},
  output::{Persist, StoredImage, draw::Draw},
  round2,
  rules::{RuleBook, WindscreenRules},
};

const OUTPUT_PREFIX: &str = "wind_";

/// 按类别累加的边框面积，重叠部分不去重
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaAggregate {
  pub windshield_area: i64,
  pub sticker_area: i64,
}

impl AreaAggregate {
  /// 直接使用原始类别编号，其他类别忽略
  pub fn from_detections(result: &DetectResult, rules: &WindscreenRules) -> Self {
    result.iter().fold(AreaAggregate::default(), |mut agg, item| {
      if item.class_id == rules.windshield_class {
        agg.windshield_area += item.bbox.area();
      } else if item.class_id == rules.sticker_class {
        agg.sticker_area += item.bbox.area();
      }
      agg
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindscreenAssessment {
  NoWindshield,
  /// 可视率未裁剪，贴纸面积超过挡风玻璃面积时为负
  Measured { visibility: f64, legal: bool },
}

impl WindscreenAssessment {
  pub fn evaluate(aggregate: &AreaAggregate, min_visibility: f64) -> Self {
    if aggregate.windshield_area == 0 {
      return WindscreenAssessment::NoWindshield;
    }
    let visible = aggregate.windshield_area - aggregate.sticker_area;
    let visibility = 100.0 * visible as f64 / aggregate.windshield_area as f64;
    WindscreenAssessment::Measured {
      visibility,
      legal: visibility >= min_visibility,
    }
  }

  pub fn legal(&self) -> bool {
    match self {
      WindscreenAssessment::NoWindshield => false,
      WindscreenAssessment::Measured { legal, .. } => *legal,
    }
  }

  pub fn visibility(&self) -> f64 {
    match self {
      WindscreenAssessment::NoWindshield => 0.0,
      WindscreenAssessment::Measured { visibility, .. } => *visibility,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindscreenVerdict {
  pub legal: bool,
  pub visibility: f64,
  pub windshield_area: i64,
  pub sticker_area: i64,
  pub message: String,
  pub violation_message: String,
  #[serde(flatten)]
  pub image: StoredImage,
}

impl WindscreenVerdict {
  fn build(
    rules: &WindscreenRules,
    aggregate: AreaAggregate,
    assessment: WindscreenAssessment,
    image: StoredImage,
  ) -> Self {
    let (message, violation_message) = match assessment {
      WindscreenAssessment::NoWindshield => (
        &rules.no_windshield_message,
        &rules.no_windshield_detail,
      ),
      WindscreenAssessment::Measured { legal: true, .. } => {
        (&rules.legal_message, &rules.legal_detail)
      }
      WindscreenAssessment::Measured { legal: false, .. } => {
        (&rules.illegal_message, &rules.illegal_detail)
      }
    };

    WindscreenVerdict {
      legal: assessment.legal(),
      visibility: round2(assessment.visibility()),
      windshield_area: aggregate.windshield_area,
      sticker_area: aggregate.sticker_area,
      message: message.clone(),
      violation_message: violation_message.clone(),
      image,
    }
  }
}

pub struct WindscreenVisibilityChecker<M, S> {
  model: Arc<M>,
  rules: Arc<RuleBook>,
  draw: Arc<Draw>,
  store: S,
}

impl<M, S> WindscreenVisibilityChecker<M, S> {
  pub fn new(model: Arc<M>, rules: Arc<RuleBook>, draw: Arc<Draw>, store: S) -> Self {
    Self {
      model,
      rules,
      draw,
      store,
    }
  }
}

impl<M, ME, S, SE> Check for WindscreenVisibilityChecker<M, S>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  S: Persist<Handle = StoredImage, Error = SE>,
  SE: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Verdict = WindscreenVerdict;

  fn run_check(&self, image: &RgbImage) -> Result<WindscreenVerdict, InspectionError> {
    let rules = &self.rules.windscreen;

    let detections = self.model.infer(image).map_err(InspectionError::inference)?;
    let aggregate = AreaAggregate::from_detections(&detections, rules);
    debug!(
      "挡风玻璃面积: {}, 贴纸面积: {}",
      aggregate.windshield_area, aggregate.sticker_area
    );

    let assessment = WindscreenAssessment::evaluate(&aggregate, rules.min_visibility);

    let annotated = self.draw.draw_detections(image, &detections, &rules.classes);
    let stored = self
      .store
      .persist(&annotated, OUTPUT_PREFIX)
      .map_err(InspectionError::output)?;

    info!(
      "挡风玻璃检查完成: 合法={}, 可视率={:.2}, 图像={}",
      assessment.legal(),
      assessment.visibility(),
      stored.output_image
    );

    Ok(WindscreenVerdict::build(rules, aggregate, assessment, stored))
  }
}
