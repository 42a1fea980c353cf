// 该文件是 Tricheck 项目的一部分。
// src/inspector.rs - 检查服务
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
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl,
  audio::Waveform,
  check::{
    AccessoryChargeCalculator, AccessoryVerdict, Check, HornLegalityClassifier, HornVerdict,
    InspectionError, ModificationVerdict, VehicleModificationChecker, WindscreenVerdict,
    WindscreenVisibilityChecker,
  },
  input::{AudioFileInput, ImageFileInput, InputError},
  model::{ClassifierWrapper, DetectorWrapper, ModelError},
  output::{DirectoryImageStore, draw::Draw},
  rules::{RuleBook, RuleBookError},
};

#[derive(Error, Debug)]
pub enum InspectorError {
  #[error("模型加载失败: {0}")]
  Model(#[from] ModelError),
  #[error("规则表无效: {0}")]
  Rules(#[from] RuleBookError),
  #[error("{0} 检查需要标注图像保存位置")]
  MissingStore(&'static str),
}

/// 持有四个检查及其模型；模型在构建时加载一次，之后只读共享
pub struct Inspector {
  modification: Option<VehicleModificationChecker<DetectorWrapper, DirectoryImageStore>>,
  windscreen: Option<WindscreenVisibilityChecker<DetectorWrapper, DirectoryImageStore>>,
  horn: Option<HornLegalityClassifier<ClassifierWrapper>>,
  accessory: Option<AccessoryChargeCalculator<DetectorWrapper>>,
}

#[derive(Default)]
pub struct InspectorBuilder {
  rules: Option<RuleBook>,
  draw: Option<Draw>,
  store: Option<DirectoryImageStore>,
  modification_model: Option<Url>,
  windscreen_model: Option<Url>,
  horn_model: Option<Url>,
  accessory_model: Option<Url>,
}

impl InspectorBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn rules(mut self, rules: RuleBook) -> Self {
    self.rules = Some(rules);
    self
  }

  pub fn draw(mut self, draw: Draw) -> Self {
    self.draw = Some(draw);
    self
  }

  pub fn store(mut self, store: DirectoryImageStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn modification_model(mut self, url: Url) -> Self {
    self.modification_model = Some(url);
    self
  }

  pub fn windscreen_model(mut self, url: Url) -> Self {
    self.windscreen_model = Some(url);
    self
  }

  pub fn horn_model(mut self, url: Url) -> Self {
    self.horn_model = Some(url);
    self
  }

  pub fn accessory_model(mut self, url: Url) -> Self {
    self.accessory_model = Some(url);
    self
  }

  fn load_detector(url: &Url) -> Result<Arc<DetectorWrapper>, ModelError> {
    info!("加载检测模型: {}", url);
    Ok(Arc::new(DetectorWrapper::from_url(url)?))
  }

  pub fn build(self) -> Result<Inspector, InspectorError> {
    let InspectorBuilder {
      rules,
      draw,
      store,
      modification_model,
      windscreen_model,
      horn_model,
      accessory_model,
    } = self;

    let rules = rules.unwrap_or_default();
    rules.validate()?;
    info!("规则表版本: {}", rules.version);
    let rules = Arc::new(rules);
    let draw = Arc::new(draw.unwrap_or_default());

    let require_store = |name| store.clone().ok_or(InspectorError::MissingStore(name));

    let modification = match modification_model {
      Some(url) => {
        let store = require_store("modification")?;
        Some(VehicleModificationChecker::new(
          Self::load_detector(&url)?,
          rules.clone(),
          draw.clone(),
          store,
        ))
      }
      None => None,
    };

    let windscreen = match windscreen_model {
      Some(url) => {
        let store = require_store("windscreen")?;
        Some(WindscreenVisibilityChecker::new(
          Self::load_detector(&url)?,
          rules.clone(),
          draw.clone(),
          store,
        ))
      }
      None => None,
    };

    let horn = match horn_model {
      Some(url) => {
        info!("加载分类模型: {}", url);
        Some(HornLegalityClassifier::new(
          Arc::new(ClassifierWrapper::from_url(&url)?),
          rules.clone(),
        ))
      }
      None => None,
    };

    let accessory = match accessory_model {
      Some(url) => Some(AccessoryChargeCalculator::new(
        Self::load_detector(&url)?,
        rules.clone(),
        draw,
      )),
      None => None,
    };

    Ok(Inspector {
      modification,
      windscreen,
      horn,
      accessory,
    })
  }
}

fn decode_image(media: Option<&[u8]>) -> Result<RgbImage, InputError> {
  let data = media.ok_or(InputError::NoMedia)?;
  Ok(ImageFileInput::from_bytes(data)?.into_image())
}

fn decode_audio(media: Option<&[u8]>) -> Result<Waveform, InputError> {
  let data = media.ok_or(InputError::NoMedia)?;
  Ok(AudioFileInput::from_bytes(data)?.into_waveform())
}

impl Inspector {
  pub fn builder() -> InspectorBuilder {
    InspectorBuilder::new()
  }

  pub fn inspect_modification(
    &self,
    media: Option<&[u8]>,
  ) -> Result<ModificationVerdict, InspectionError> {
    let image = decode_image(media)?;
    let checker = self
      .modification
      .as_ref()
      .ok_or(InspectionError::NotConfigured("modification"))?;
    checker.run_check(&image)
  }

  pub fn inspect_windscreen(
    &self,
    media: Option<&[u8]>,
  ) -> Result<WindscreenVerdict, InspectionError> {
    let image = decode_image(media)?;
    let checker = self
      .windscreen
      .as_ref()
      .ok_or(InspectionError::NotConfigured("windscreen"))?;
    checker.run_check(&image)
  }

  pub fn inspect_horn(&self, media: Option<&[u8]>) -> Result<HornVerdict, InspectionError> {
    let waveform = decode_audio(media)?;
    let checker = self
      .horn
      .as_ref()
      .ok_or(InspectionError::NotConfigured("horn"))?;
    checker.run_check(&waveform)
  }

  pub fn inspect_accessory(
    &self,
    media: Option<&[u8]>,
  ) -> Result<AccessoryVerdict, InspectionError> {
    let image = decode_image(media)?;
    let checker = self
      .accessory
      .as_ref()
      .ok_or(InspectionError::NotConfigured("accessory"))?;
    checker.run_check(&image)
  }
}

/// 请求边界：判定序列化为 JSON，任何错误都变成 `{"error": "<message>"}`
pub fn respond<T: Serialize>(result: Result<T, InspectionError>) -> Value {
  match result {
    Ok(verdict) => serde_json::to_value(verdict).unwrap_or_else(|e| {
      warn!("判定序列化失败: {}", e);
      json!({ "error": e.to_string() })
    }),
    Err(e) => {
      warn!("检查失败: {}", e);
      json!({ "error": e.to_string() })
    }
  }
}
