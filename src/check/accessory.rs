// 该文件是 Tricheck 项目的一部分。
// src/check/accessory.rs - 合法改装收费计算
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
use tracing::info;

use crate::{
  check::{Check, InspectionError, resolve_classes},
  model::{DetectResult, Model},
  output::{InlineImageEncoder, Persist, draw::Draw},
  rules::{AccessoryRules, RuleBook},
};

/// 配件是否出现；只看有无，不计数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessoryPresence {
  pub led_headlight: bool,
  pub wind_deflector: bool,
}

impl AccessoryPresence {
  pub fn from_classes(rules: &AccessoryRules, detected_classes: &[String]) -> Self {
    let present = |name: &str| detected_classes.iter().any(|c| c == name);
    Self {
      led_headlight: present(&rules.led_headlight.class_name),
      wind_deflector: present(&rules.wind_deflector.class_name),
    }
  }

  pub fn charges(&self, rules: &AccessoryRules) -> AccessoryCharges {
    AccessoryCharges {
      led_headlight: if self.led_headlight {
        rules.led_headlight.amount
      } else {
        0
      },
      wind_deflector: if self.wind_deflector {
        rules.wind_deflector.amount
      } else {
        0
      },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessoryCharges {
  #[serde(rename = "LED_HeadLight")]
  pub led_headlight: u32,
  #[serde(rename = "Wind_Deflector")]
  pub wind_deflector: u32,
}

impl AccessoryCharges {
  /// 合计按 u64 计算，两项均为 u32 时不会溢出
  pub fn total(&self) -> u64 {
    u64::from(self.led_headlight) + u64::from(self.wind_deflector)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LawReference {
  pub authority: String,
  pub approval_year: String,
  pub regulations: Vec<String>,
}

impl LawReference {
  fn from_rules(rules: &AccessoryRules) -> Self {
    Self {
      authority: rules.authority.clone(),
      approval_year: rules.approval_year.clone(),
      regulations: vec![
        rules.led_headlight.regulation.clone(),
        rules.wind_deflector.regulation.clone(),
      ],
    }
  }
}

fn yes_no(flag: bool) -> String {
  if flag { "YES" } else { "NO" }.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessoryVerdict {
  #[serde(rename = "LED_HeadLights_detected")]
  pub led_headlights_detected: String,
  #[serde(rename = "Wind_Deflectors_detected")]
  pub wind_deflectors_detected: String,
  pub charges: AccessoryCharges,
  pub total_charge_rs: u64,
  pub law_reference: LawReference,
  /// base64 编码的 JPEG 标注图像
  pub annotated_image: String,
}

impl AccessoryVerdict {
  fn build(rules: &AccessoryRules, presence: AccessoryPresence, annotated_image: String) -> Self {
    let charges = presence.charges(rules);
    AccessoryVerdict {
      led_headlights_detected: yes_no(presence.led_headlight),
      wind_deflectors_detected: yes_no(presence.wind_deflector),
      total_charge_rs: charges.total(),
      charges,
      law_reference: LawReference::from_rules(rules),
      annotated_image,
    }
  }
}

pub struct AccessoryChargeCalculator<M, S = InlineImageEncoder> {
  model: Arc<M>,
  rules: Arc<RuleBook>,
  draw: Arc<Draw>,
  encoder: S,
}

impl<M> AccessoryChargeCalculator<M> {
  pub fn new(model: Arc<M>, rules: Arc<RuleBook>, draw: Arc<Draw>) -> Self {
    Self {
      model,
      rules,
      draw,
      encoder: InlineImageEncoder,
    }
  }
}

impl<M, ME, S, SE> Check for AccessoryChargeCalculator<M, S>
where
  M: Model<Input = RgbImage, Output = DetectResult, Error = ME>,
  ME: std::error::Error + Send + Sync + 'static,
  S: Persist<Handle = String, Error = SE>,
  SE: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Verdict = AccessoryVerdict;

  fn run_check(&self, image: &RgbImage) -> Result<AccessoryVerdict, InspectionError> {
    let rules = &self.rules.accessory;

    let detections = self.model.infer(image).map_err(InspectionError::inference)?;
    let detected_classes = resolve_classes(&detections, &rules.classes)?;
    let presence = AccessoryPresence::from_classes(rules, &detected_classes);

    let annotated = self.draw.draw_detections(image, &detections, &rules.classes);
    let encoded = self
      .encoder
      .persist(&annotated, "")
      .map_err(InspectionError::output)?;

    let verdict = AccessoryVerdict::build(rules, presence, encoded);
    info!(
      "收费计算完成: LED={}, 导风板={}, 合计 Rs. {}",
      verdict.led_headlights_detected, verdict.wind_deflectors_detected, verdict.total_charge_rs
    );
    Ok(verdict)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn presence_not_count_drives_charge() {
    let rules = AccessoryRules::default();
    let presence = AccessoryPresence::from_classes(&rules, &classes(&["Wind_Deflector"; 5]));
    assert!(!presence.led_headlight);
    assert!(presence.wind_deflector);
    assert_eq!(presence.charges(&rules).total(), 1000);
  }

  #[test]
  fn total_is_sum_of_present_items() {
    let rules = AccessoryRules::default();
    let cases = [
      (vec![], 0),
      (classes(&["LED_HeadLight"]), 1000),
      (classes(&["LED_HeadLight", "Wind_Deflector", "LED_HeadLight"]), 2000),
    ];
    for (detected, total) in cases {
      let charges = AccessoryPresence::from_classes(&rules, &detected).charges(&rules);
      assert_eq!(charges.total(), total);
    }
  }

  #[test]
  fn large_configured_amounts_do_not_overflow() {
    let rules = RuleBook::from_toml_str(
      r#"
      [accessory.led_headlight]
      class_name = "LED_HeadLight"
      amount = 4294967295
      regulation = "LED"

      [accessory.wind_deflector]
      class_name = "Wind_Deflector"
      amount = 1
      regulation = "Deflector"
      "#,
    )
    .unwrap();
    let presence = AccessoryPresence {
      led_headlight: true,
      wind_deflector: true,
    };
    let verdict = AccessoryVerdict::build(&rules.accessory, presence, String::new());
    assert_eq!(verdict.total_charge_rs, 4_294_967_296);
    assert_eq!(verdict.charges.led_headlight, u32::MAX);
  }

  #[test]
  fn verdict_strings_and_law_reference() {
    let rules = AccessoryRules::default();
    let presence = AccessoryPresence {
      led_headlight: true,
      wind_deflector: false,
    };
    let verdict = AccessoryVerdict::build(&rules, presence, String::new());
    assert_eq!(verdict.led_headlights_detected, "YES");
    assert_eq!(verdict.wind_deflectors_detected, "NO");
    assert_eq!(verdict.charges.led_headlight, 1000);
    assert_eq!(verdict.charges.wind_deflector, 0);
    assert_eq!(verdict.total_charge_rs, 1000);
    assert_eq!(
      verdict.law_reference.authority,
      "Department of Motor Traffic (Sri Lanka)"
    );
    assert_eq!(verdict.law_reference.regulations.len(), 2);

    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["Wind_Deflectors_detected"], "NO");
    assert_eq!(json["charges"]["LED_HeadLight"], 1000);
  }
}
