// 该文件是 Tricheck 项目的一部分。
// src/rules.rs - 法规规则表
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

//! 每个法规领域唯一的规则表：类别表、违规类别、阈值、收费标准与法规条文。
//!
//! 内置规则对应 2021 年第 2240/37 号公报、2009 年第 8 号《机动车交通（修正）法》
//! 第 155(3) 条以及机动车交通部 2022–2023 年的改装收费标准。
//! 可以用 TOML 文件覆盖其中任意部分，未出现的字段保持内置值。

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::ClassTable;

pub const RULEBOOK_VERSION: &str = "2021.08-gazette-2240-37";

const GAZETTE_HEADER: &str = "Gazette No: 2240/37\n\
Date: Saturday, August 14, 2021\n\
Link: https://www.documents.gov.lk/view/extra-gazettes/2021/8/2240-37_E.pdf\n";

const HORN_LAW: &str = "Motor Traffic (Amendment) Act No. 8 of 2009, Section 155(3)";

#[derive(Error, Debug)]
pub enum RuleBookError {
  #[error("规则文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("规则文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("规则文件序列化错误: {0}")]
  SerializeError(#[from] toml::ser::Error),
  #[error("规则无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleBook {
  pub version: String,
  pub modification: ModificationRules,
  pub windscreen: WindscreenRules,
  pub horn: HornRules,
  pub accessory: AccessoryRules,
}

impl Default for RuleBook {
  fn default() -> Self {
    Self {
      version: RULEBOOK_VERSION.to_string(),
      modification: ModificationRules::default(),
      windscreen: WindscreenRules::default(),
      horn: HornRules::default(),
      accessory: AccessoryRules::default(),
    }
  }
}

impl RuleBook {
  pub fn from_toml_str(text: &str) -> Result<Self, RuleBookError> {
    let rules: RuleBook = toml::from_str(text)?;
    rules.validate()?;
    Ok(rules)
  }

  pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, RuleBookError> {
    let path = path.as_ref();
    info!("加载规则文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let rules = Self::from_toml_str(&text)?;
    info!("规则版本: {}", rules.version);
    Ok(rules)
  }

  pub fn to_toml_string(&self) -> Result<String, RuleBookError> {
    Ok(toml::to_string_pretty(self)?)
  }

  pub fn validate(&self) -> Result<(), RuleBookError> {
    self.modification.validate()?;
    self.windscreen.validate()?;
    self.horn.validate()?;
    self.accessory.validate()?;
    debug!("规则校验通过: {}", self.version);
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModificationRules {
  pub classes: ClassTable,
  pub benign_classes: BTreeSet<String>,
  pub illegal_classes: BTreeSet<String>,
  pub violation_message: String,
  pub clean_message: String,
}

impl Default for ModificationRules {
  fn default() -> Self {
    Self {
      classes: ClassTable::new([
        "orginal_three_wheeler",
        "other_vehical",
        "modify_three_Wheeler",
        "air_cleaner",
        "fire_extinguisher",
        "front_aerial",
        "rim_cap",
      ]),
      benign_classes: ["orginal_three_wheeler", "other_vehical"]
        .into_iter()
        .map(String::from)
        .collect(),
      illegal_classes: [
        "modify_three_Wheeler",
        "air_cleaner",
        "fire_extinguisher",
        "front_aerial",
        "rim_cap",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      violation_message: format!(
        "⚠️ Detected Illegal Vehicle Modification!\n\
--------------------------------------------\n\
{GAZETTE_HEADER}\n\
Violation of REGULATIONS:\n \
1) (a) exceed the weight, dimensions or limitations of its prototype;\n    \
(b) alter its shape, design or external appearance;\n    \
(d) loose its equilibrium;\n\n \
2) Sharp-edged accessories causing danger/obstruction are prohibited.\n\n \
6) Tyres, mud guards, or wheel covers must NOT protrude.\n\
--------------------------------------------"
      ),
      clean_message: "✅ No illegal modification detected.".to_string(),
    }
  }
}

impl ModificationRules {
  /// 违规类别判断，大小写敏感的精确匹配
  pub fn is_illegal(&self, class_name: &str) -> bool {
    self.illegal_classes.contains(class_name)
  }

  fn validate(&self) -> Result<(), RuleBookError> {
    if let Some(name) = self.illegal_classes.intersection(&self.benign_classes).next() {
      return Err(RuleBookError::Invalid(format!(
        "类别 '{}' 同时属于违规类别与正常类别",
        name
      )));
    }
    for name in self.illegal_classes.iter().chain(&self.benign_classes) {
      if !self.classes.contains(name) {
        return Err(RuleBookError::Invalid(format!(
          "类别 '{}' 不在改装类别表中",
          name
        )));
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindscreenRules {
  pub classes: ClassTable,
  pub windshield_class: u32,
  pub sticker_class: u32,
  /// 最低可视率（百分比，含边界）
  pub min_visibility: f64,
  pub legal_message: String,
  pub legal_detail: String,
  pub illegal_message: String,
  pub illegal_detail: String,
  pub no_windshield_message: String,
  pub no_windshield_detail: String,
}

impl Default for WindscreenRules {
  fn default() -> Self {
    Self {
      classes: ClassTable::new(["windshield", "sticker"]),
      windshield_class: 0,
      sticker_class: 1,
      min_visibility: 70.0,
      legal_message: "✅ LEGAL".to_string(),
      legal_detail: "✅ LEGAL – Visibility is acceptable.".to_string(),
      illegal_message: "❌ ILLEGAL – Visibility below 70%".to_string(),
      illegal_detail: format!(
        "❌ ILLEGAL – Visibility below 70%\n\
--------------------------------------------\n\
{GAZETTE_HEADER}\n\
Regulations:\n \
1) Windscreen must maintain at least 70% visibility;\n \
2) Stickers or accessories must not obstruct view;\n\
--------------------------------------------"
      ),
      no_windshield_message: "❌ No windshield detected".to_string(),
      no_windshield_detail:
        "⚠️ No windshield detected – vehicle may not comply with safety regulations.\n"
          .to_string(),
    }
  }
}

impl WindscreenRules {
  fn validate(&self) -> Result<(), RuleBookError> {
    if self.windshield_class == self.sticker_class {
      return Err(RuleBookError::Invalid(
        "挡风玻璃与贴纸类别编号相同".to_string(),
      ));
    }
    for id in [self.windshield_class, self.sticker_class] {
      if self.classes.resolve(id).is_none() {
        return Err(RuleBookError::Invalid(format!(
          "挡风玻璃类别编号 {} 超出类别表范围",
          id
        )));
      }
    }
    if !self.min_visibility.is_finite() {
      return Err(RuleBookError::Invalid("最低可视率无效".to_string()));
    }
    Ok(())
  }
}

/// 模型给出规则表之外的标签时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedLabelPolicy {
  /// 按不确定结果处理，判定为不合法并说明原因
  #[default]
  Uncertain,
  /// 作为错误返回
  Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HornLawEntry {
  pub label: String,
  pub horn_type: String,
  pub legal: bool,
  pub law: String,
  pub violation_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HornRules {
  /// 标签编码器的类别顺序
  pub labels: ClassTable,
  /// 置信度门限（百分比），低于该值不给出具体类型
  pub confidence_threshold: f64,
  pub uncertain_horn_type: String,
  pub suppressed_message: String,
  pub unmapped_label_policy: UnmappedLabelPolicy,
  pub laws: Vec<HornLawEntry>,
}

impl Default for HornRules {
  fn default() -> Self {
    Self {
      labels: ClassTable::new(["multi_tone", "single_tone"]),
      confidence_threshold: 70.0,
      uncertain_horn_type: "Uncertain / Non-horn".to_string(),
      suppressed_message: "Prediction suppressed due to low confidence".to_string(),
      unmapped_label_policy: UnmappedLabelPolicy::default(),
      laws: vec![
        HornLawEntry {
          label: "multi_tone".to_string(),
          horn_type: "Multi-tone horn".to_string(),
          legal: false,
          law: HORN_LAW.to_string(),
          violation_message: "No person shall use a motor vehicle that has been equipped with a \
multi-tone horn sounding a succession of different notes, or with any other sound-producing \
device giving a harsh, shrill, loud or alarming noise, except for emergency vehicles."
            .to_string(),
        },
        HornLawEntry {
          label: "single_tone".to_string(),
          horn_type: "Single-tone horn".to_string(),
          legal: true,
          law: HORN_LAW.to_string(),
          violation_message: "Single-tone horns are permitted provided they do not produce \
harsh, shrill, or alarming noise."
            .to_string(),
        },
      ],
    }
  }
}

impl HornRules {
  /// 标签查找不区分大小写
  pub fn law_for(&self, label: &str) -> Option<&HornLawEntry> {
    self
      .laws
      .iter()
      .find(|entry| entry.label.eq_ignore_ascii_case(label))
  }

  fn validate(&self) -> Result<(), RuleBookError> {
    if !(0.0..=100.0).contains(&self.confidence_threshold) {
      return Err(RuleBookError::Invalid(format!(
        "置信度门限 {} 不在 [0, 100] 范围内",
        self.confidence_threshold
      )));
    }
    if self.labels.is_empty() {
      return Err(RuleBookError::Invalid("喇叭标签表为空".to_string()));
    }
    for (i, entry) in self.laws.iter().enumerate() {
      if self.laws[..i]
        .iter()
        .any(|other| other.label.eq_ignore_ascii_case(&entry.label))
      {
        return Err(RuleBookError::Invalid(format!(
          "喇叭标签 '{}' 重复定义",
          entry.label
        )));
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeEntry {
  pub class_name: String,
  pub amount: u32,
  pub regulation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessoryRules {
  pub classes: ClassTable,
  pub authority: String,
  pub approval_year: String,
  pub led_headlight: ChargeEntry,
  pub wind_deflector: ChargeEntry,
}

impl Default for AccessoryRules {
  fn default() -> Self {
    Self {
      classes: ClassTable::new(["LED_HeadLight", "Wind_Deflector"]),
      authority: "Department of Motor Traffic (Sri Lanka)".to_string(),
      approval_year: "2022–2023".to_string(),
      led_headlight: ChargeEntry {
        class_name: "LED_HeadLight".to_string(),
        amount: 1000,
        regulation: "Replacing main lights with LED lights – Rs. 1000".to_string(),
      },
      wind_deflector: ChargeEntry {
        class_name: "Wind_Deflector".to_string(),
        amount: 1000,
        regulation: "Installing wind deflectors – Rs. 1000".to_string(),
      },
    }
  }
}

impl AccessoryRules {
  fn validate(&self) -> Result<(), RuleBookError> {
    for entry in [&self.led_headlight, &self.wind_deflector] {
      if !self.classes.contains(&entry.class_name) {
        return Err(RuleBookError::Invalid(format!(
          "收费项目 '{}' 不在配件类别表中",
          entry.class_name
        )));
      }
    }
    if self.led_headlight.class_name == self.wind_deflector.class_name {
      return Err(RuleBookError::Invalid("两个收费项目类别相同".to_string()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_rules_are_valid() {
    let rules = RuleBook::default();
    rules.validate().unwrap();
    assert_eq!(rules.modification.classes.len(), 7);
    assert_eq!(rules.windscreen.classes.len(), 2);
    assert_eq!(rules.accessory.classes.len(), 2);
  }

  #[test]
  fn illegal_set_is_disjoint_from_benign_and_case_sensitive() {
    let rules = ModificationRules::default();
    assert!(rules.illegal_classes.is_disjoint(&rules.benign_classes));
    assert!(rules.is_illegal("modify_three_Wheeler"));
    assert!(!rules.is_illegal("modify_three_wheeler"));
    assert!(!rules.is_illegal("orginal_three_wheeler"));
  }

  #[test]
  fn violation_text_cites_gazette() {
    let rules = ModificationRules::default();
    assert!(rules.violation_message.contains("Illegal Vehicle Modification"));
    assert!(rules.violation_message.contains("Gazette No: 2240/37"));
    assert!(rules.violation_message.contains("(d) loose its equilibrium;"));
    assert!(WindscreenRules::default().illegal_detail.contains("2240/37"));
  }

  #[test]
  fn partial_toml_keeps_builtin_values() {
    let rules = RuleBook::from_toml_str(
      r#"
      version = "local-test"

      [windscreen]
      min_visibility = 75.0

      [horn]
      unmapped_label_policy = "reject"
      "#,
    )
    .unwrap();
    assert_eq!(rules.version, "local-test");
    assert_eq!(rules.windscreen.min_visibility, 75.0);
    assert_eq!(rules.windscreen.sticker_class, 1);
    assert_eq!(rules.horn.unmapped_label_policy, UnmappedLabelPolicy::Reject);
    assert_eq!(rules.accessory.led_headlight.amount, 1000);
  }

  #[test]
  fn overlapping_illegal_and_benign_is_rejected() {
    let result = RuleBook::from_toml_str(
      r#"
      [modification]
      benign_classes = ["orginal_three_wheeler", "rim_cap"]
      "#,
    );
    assert!(matches!(result, Err(RuleBookError::Invalid(_))));
  }

  #[test]
  fn dumped_rules_load_back_identically() {
    let rules = RuleBook::default();
    let text = rules.to_toml_string().unwrap();
    assert_eq!(RuleBook::from_toml_str(&text).unwrap(), rules);
  }

  #[test]
  fn horn_law_lookup_ignores_case() {
    let rules = HornRules::default();
    assert!(!rules.law_for("MULTI_TONE").unwrap().legal);
    assert!(rules.law_for("single_tone").unwrap().legal);
    assert!(rules.law_for("siren").is_none());
  }
}
