// 该文件是 Tricheck 项目的一部分。
// src/check.rs - 检查任务定义
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

use thiserror::Error;

use crate::{
  input::InputError,
  model::{ClassTable, DetectResult},
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 一次检查：对一份媒体执行一次推理并给出判定
pub trait Check {
  type Input;
  type Verdict;

  fn run_check(&self, input: &Self::Input) -> Result<Self::Verdict, InspectionError>;
}

#[derive(Error, Debug)]
pub enum InspectionError {
  #[error("{0}")]
  InvalidMedia(#[from] InputError),
  #[error("推理失败: {0}")]
  Inference(#[source] BoxError),
  #[error("未知类别编号 {class_id}，类别表共 {table_len} 项")]
  UnknownClass { class_id: u32, table_len: usize },
  #[error("模型输出为空")]
  EmptyOutput,
  #[error("标签 '{0}' 没有对应的法规条目")]
  UnmappedLabel(String),
  #[error("标注图像输出失败: {0}")]
  Output(#[source] BoxError),
  #[error("{0} 检查未配置模型")]
  NotConfigured(&'static str),
}

impl InspectionError {
  pub fn inference<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    InspectionError::Inference(Box::new(err))
  }

  pub fn output<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    InspectionError::Output(Box::new(err))
  }
}

/// 按检测顺序将类别编号解析为类别名称，保留重复项
pub fn resolve_classes(
  result: &DetectResult,
  classes: &ClassTable,
) -> Result<Vec<String>, InspectionError> {
  result
    .iter()
    .map(|item| {
      classes
        .resolve(item.class_id)
        .map(str::to_string)
        .ok_or(InspectionError::UnknownClass {
          class_id: item.class_id,
          table_len: classes.len(),
        })
    })
    .collect()
}

mod accessory;
mod horn;
mod modification;
mod windscreen;

pub use self::accessory::{
  AccessoryChargeCalculator, AccessoryCharges, AccessoryPresence, AccessoryVerdict, LawReference,
};
pub use self::horn::{HornLegalityClassifier, HornVerdict, assess_horn};
pub use self::modification::{
  ModificationVerdict, VehicleModificationChecker, assess_modification,
};
pub use self::windscreen::{
  AreaAggregate, WindscreenAssessment, WindscreenVerdict, WindscreenVisibilityChecker,
};

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BoundingBox, DetectItem};

  fn item(class_id: u32) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.8,
      bbox: BoundingBox::new(0, 0, 1, 1),
    }
  }

  #[test]
  fn resolve_keeps_order_and_duplicates() {
    let table = ClassTable::new(["a", "b", "c"]);
    let result = DetectResult::from(vec![item(2), item(0), item(2)]);
    assert_eq!(resolve_classes(&result, &table).unwrap(), ["c", "a", "c"]);
  }

  #[test]
  fn resolve_rejects_out_of_range_id() {
    let table = ClassTable::new(["a"]);
    let result = DetectResult::from(vec![item(0), item(7)]);
    assert!(matches!(
      resolve_classes(&result, &table),
      Err(InspectionError::UnknownClass {
        class_id: 7,
        table_len: 1
      })
    ));
  }
}
