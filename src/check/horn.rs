// 该文件是 Tricheck 项目的一部分。
// src/check/horn.rs - 喇叭声音合法性判定
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

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
  audio::{HornPreprocessor, MelSpectrogram, Waveform},
  check::{Check, InspectionError},
  model::{Model, Probabilities},
  round2,
  rules::{HornRules, RuleBook, UnmappedLabelPolicy},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HornVerdict {
  pub horn_type: String,
  pub label: String,
  pub confidence: f64,
  pub legal: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub law: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub violation_message: Option<String>,
}

impl HornVerdict {
  fn uncertain(rules: &HornRules, label: &str, confidence: f64, message: String) -> Self {
    HornVerdict {
      horn_type: rules.uncertain_horn_type.clone(),
      label: label.to_string(),
      confidence: round2(confidence),
      legal: false,
      message: Some(message),
      law: None,
      violation_message: None,
    }
  }
}

/// 按置信度门限与法规表将标签映射为判定，`confidence` 为百分比。
///
/// 置信度低于门限时不论标签都给出不确定结果；门限本身不被抑制。
pub fn assess_horn(
  rules: &HornRules,
  label: &str,
  confidence: f64,
) -> Result<HornVerdict, InspectionError> {
  if confidence < rules.confidence_threshold {
    debug!("置信度 {:.2} 低于门限，抑制预测 {}", confidence, label);
    return Ok(HornVerdict::uncertain(
      rules,
      label,
      confidence,
      rules.suppressed_message.clone(),
    ));
  }

  match rules.law_for(label) {
    Some(entry) => Ok(HornVerdict {
      horn_type: entry.horn_type.clone(),
      label: label.to_string(),
      confidence: round2(confidence),
      legal: entry.legal,
      message: None,
      law: Some(entry.law.clone()),
      violation_message: Some(entry.violation_message.clone()),
    }),
    None => match rules.unmapped_label_policy {
      UnmappedLabelPolicy::Uncertain => {
        warn!("标签 '{}' 没有对应的法规条目，按不确定处理", label);
        Ok(HornVerdict::uncertain(
          rules,
          label,
          confidence,
          format!("No legal rule is defined for predicted label '{}'", label),
        ))
      }
      UnmappedLabelPolicy::Reject => Err(InspectionError::UnmappedLabel(label.to_string())),
    },
  }
}

pub struct HornLegalityClassifier<M> {
  model: Arc<M>,
  rules: Arc<RuleBook>,
  preprocessor: HornPreprocessor,
}

impl<M> HornLegalityClassifier<M> {
  pub fn new(model: Arc<M>, rules: Arc<RuleBook>) -> Self {
    Self {
      model,
      rules,
      preprocessor: HornPreprocessor::default(),
    }
  }

  fn top_label<'r>(
    rules: &'r HornRules,
    probabilities: &Probabilities,
  ) -> Result<(&'r str, f64), InspectionError> {
    let (idx, max) = probabilities.argmax().ok_or(InspectionError::EmptyOutput)?;
    let label = rules
      .labels
      .resolve(idx as u32)
      .ok_or(InspectionError::UnknownClass {
        class_id: idx as u32,
        table_len: rules.labels.len(),
      })?;
    Ok((label, max as f64 * 100.0))
  }
}

impl<M, ME> Check for HornLegalityClassifier<M>
where
  M: Model<Input = MelSpectrogram, Output = Probabilities, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
{
  type Input = Waveform;
  type Verdict = HornVerdict;

  fn run_check(&self, waveform: &Waveform) -> Result<HornVerdict, InspectionError> {
    let rules = &self.rules.horn;

    debug!(
      "音频时长 {:.2} 秒, 采样率 {} Hz",
      waveform.duration_secs(),
      waveform.sample_rate
    );
    let features = self.preprocessor.process(waveform.clone());
    let probabilities = self
      .model
      .infer(&features)
      .map_err(InspectionError::inference)?;

    let (label, confidence) = Self::top_label(rules, &probabilities)?;
    let verdict = assess_horn(rules, label, confidence)?;

    info!(
      "喇叭检查完成: {} ({:.2}%), 合法={}",
      verdict.horn_type, verdict.confidence, verdict.legal
    );
    Ok(verdict)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_threshold_is_not_suppressed() {
    let rules = HornRules::default();
    let verdict = assess_horn(&rules, "single_tone", 70.0).unwrap();
    assert_eq!(verdict.horn_type, "Single-tone horn");
    assert!(verdict.legal);
  }

  #[test]
  fn just_below_threshold_is_suppressed_for_any_label() {
    let rules = HornRules::default();
    for label in ["single_tone", "multi_tone", "siren"] {
      let verdict = assess_horn(&rules, label, 69.99).unwrap();
      assert_eq!(verdict.horn_type, "Uncertain / Non-horn");
      assert!(!verdict.legal);
      assert_eq!(
        verdict.message.as_deref(),
        Some("Prediction suppressed due to low confidence")
      );
      assert!(verdict.law.is_none());
    }
  }

  #[test]
  fn single_tone_is_legal() {
    let verdict = assess_horn(&HornRules::default(), "single_tone", 85.0).unwrap();
    assert!(verdict.legal);
    assert_eq!(verdict.confidence, 85.0);
    assert!(verdict.law.unwrap().contains("155(3)"));
  }

  #[test]
  fn multi_tone_is_illegal() {
    let verdict = assess_horn(&HornRules::default(), "multi_tone", 90.0).unwrap();
    assert!(!verdict.legal);
    assert_eq!(verdict.horn_type, "Multi-tone horn");
    assert!(
      verdict
        .violation_message
        .unwrap()
        .contains("except for emergency vehicles")
    );
  }

  #[test]
  fn unmapped_label_follows_policy() {
    let mut rules = HornRules::default();
    let verdict = assess_horn(&rules, "air_horn", 99.0).unwrap();
    assert_eq!(verdict.horn_type, "Uncertain / Non-horn");
    assert!(!verdict.legal);
    assert!(verdict.message.unwrap().contains("air_horn"));

    rules.unmapped_label_policy = UnmappedLabelPolicy::Reject;
    assert!(matches!(
      assess_horn(&rules, "air_horn", 99.0),
      Err(InspectionError::UnmappedLabel(label)) if label == "air_horn"
    ));
  }

  #[test]
  fn top_label_uses_encoder_order() {
    let rules = HornRules::default();
    let (label, confidence) =
      HornLegalityClassifier::<()>::top_label(&rules, &Probabilities(vec![0.05, 0.95])).unwrap();
    assert_eq!(label, "single_tone");
    assert!((confidence - 95.0).abs() < 1e-4);

    assert!(matches!(
      HornLegalityClassifier::<()>::top_label(&rules, &Probabilities(vec![0.1, 0.1, 0.8])),
      Err(InspectionError::UnknownClass { class_id: 2, .. })
    ));
  }
}
