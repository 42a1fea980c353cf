// 该文件是 Tricheck 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 模型后端
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

use std::sync::Mutex;

use image::{Rgb, RgbImage, imageops::FilterType};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  audio::MelSpectrogram,
  model::{BoundingBox, DetectItem, DetectResult, Model, ModelError, Probabilities},
  url_to_path,
};

const ONNX_SCHEME: &str = "onnx";
const YOLO_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLO_DEFAULT_CONF_THRESH: f32 = 0.25;
const YOLO_DEFAULT_IOU_THRESH: f32 = 0.7;
const YOLO_PAD_VALUE: u8 = 114;
const SESSION_INTRA_THREADS: usize = 4;

fn open_session(url: &Url) -> Result<Session, ModelError> {
  if url.scheme() != ONNX_SCHEME {
    return Err(ModelError::SchemeMismatch(format!(
      "期望方案 '{}', 实际方案 '{}'",
      ONNX_SCHEME,
      url.scheme()
    )));
  }

  let path = url_to_path(url);
  info!("加载 ONNX 模型: {}", path.display());
  if !path.exists() {
    return Err(ModelError::Unavailable(format!(
      "模型文件不存在: {}",
      path.display()
    )));
  }

  let session = Session::builder()?
    .with_optimization_level(GraphOptimizationLevel::Level3)?
    .with_intra_threads(SESSION_INTRA_THREADS)?
    .commit_from_file(&path)?;
  info!("模型加载完成");
  Ok(session)
}

fn query_value<T: std::str::FromStr>(url: &Url, key: &str) -> Option<T> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .and_then(|(_, v)| v.parse().ok())
}

/// YOLOv8 导出的目标检测模型，输出形状为 `[1, 4 + 类别数, 候选数]`
pub struct OnnxDetector {
  session: Mutex<Session>,
  input_name: String,
  input_size: u32,
  conf_thresh: f32,
  iou_thresh: f32,
}

impl FromUrlWithScheme for OnnxDetector {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for OnnxDetector {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let session = open_session(url)?;
    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ModelError::Unavailable("模型没有输入".to_string()))?;

    let detector = OnnxDetector {
      session: Mutex::new(session),
      input_name,
      input_size: query_value(url, "size").unwrap_or(YOLO_DEFAULT_INPUT_SIZE),
      conf_thresh: query_value(url, "conf").unwrap_or(YOLO_DEFAULT_CONF_THRESH),
      iou_thresh: query_value(url, "iou").unwrap_or(YOLO_DEFAULT_IOU_THRESH),
    };
    debug!(
      "检测模型输入 {} ({}x{}), 置信度阈值 {}, NMS 阈值 {}",
      detector.input_name,
      detector.input_size,
      detector.input_size,
      detector.conf_thresh,
      detector.iou_thresh
    );
    Ok(detector)
  }
}

struct Letterbox {
  scale: f32,
  pad_x: f32,
  pad_y: f32,
}

impl OnnxDetector {
  fn preprocess(&self, image: &RgbImage) -> (Vec<f32>, Letterbox) {
    let size = self.input_size;
    let (src_w, src_h) = image.dimensions();

    let scale = (size as f32 / src_w as f32).min(size as f32 / src_h as f32);
    let scaled_w = ((src_w as f32 * scale).round() as u32).clamp(1, size);
    let scaled_h = ((src_h as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - scaled_w) as f32 / 2.0;
    let pad_y = (size - scaled_h) as f32 / 2.0;

    let resized = image::imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([YOLO_PAD_VALUE; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    // HWC -> CHW，归一化到 [0, 1]
    let plane = (size * size) as usize;
    let mut input = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
      let idx = (y * size + x) as usize;
      for c in 0..3 {
        input[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }

    (input, Letterbox { scale, pad_x, pad_y })
  }

  fn postprocess(
    &self,
    dims: &[i64],
    output: &[f32],
    letterbox: &Letterbox,
    width: u32,
    height: u32,
  ) -> Result<DetectResult, ModelError> {
    if dims.len() != 3 || dims[1] < 5 {
      return Err(ModelError::OutputShapeError(format!(
        "期望 [1, 4 + 类别数, 候选数], 实际 {:?}",
        dims
      )));
    }
    let rows = dims[1] as usize;
    let anchors = dims[2] as usize;
    let num_classes = rows - 4;
    if output.len() < rows * anchors {
      return Err(ModelError::OutputShapeError(format!(
        "输出长度 {} 小于 {}",
        output.len(),
        rows * anchors
      )));
    }

    let mut candidates = Vec::new();
    for i in 0..anchors {
      let mut best_class = 0usize;
      let mut best_conf = 0.0f32;
      for c in 0..num_classes {
        let conf = output[(4 + c) * anchors + i];
        if conf > best_conf {
          best_conf = conf;
          best_class = c;
        }
      }
      if best_conf < self.conf_thresh {
        continue;
      }

      let cx = output[i];
      let cy = output[anchors + i];
      let w = output[2 * anchors + i];
      let h = output[3 * anchors + i];

      // 还原 letterbox 变换并裁剪到原图范围
      let unmap_x = |v: f32| ((v - letterbox.pad_x) / letterbox.scale).clamp(0.0, width as f32);
      let unmap_y = |v: f32| ((v - letterbox.pad_y) / letterbox.scale).clamp(0.0, height as f32);
      candidates.push((
        best_class as u32,
        best_conf,
        [
          unmap_x(cx - w / 2.0),
          unmap_y(cy - h / 2.0),
          unmap_x(cx + w / 2.0),
          unmap_y(cy + h / 2.0),
        ],
      ));
    }

    let kept = nms(candidates, self.iou_thresh);
    let items: Vec<DetectItem> = kept
      .into_iter()
      .map(|(class_id, score, b)| DetectItem {
        class_id,
        score,
        bbox: BoundingBox::new(b[0] as i32, b[1] as i32, b[2] as i32, b[3] as i32),
      })
      .collect();
    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult::from(items))
  }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = ix * iy;
  let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别进行非极大值抑制，结果按置信度降序排列
fn nms(mut candidates: Vec<(u32, f32, [f32; 4])>, iou_thresh: f32) -> Vec<(u32, f32, [f32; 4])> {
  candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
  let mut kept: Vec<(u32, f32, [f32; 4])> = Vec::new();
  for cand in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.0 == cand.0 && iou(&k.2, &cand.2) > iou_thresh);
    if !suppressed {
      kept.push(cand);
    }
  }
  kept
}

impl Model for OnnxDetector {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (data, letterbox) = self.preprocess(input);
    let size = self.input_size as usize;
    let tensor = Tensor::from_array(([1usize, 3, size, size], data.into_boxed_slice()))?;

    debug!("执行检测模型推理");
    let mut session = self
      .session
      .lock()
      .map_err(|_| ModelError::InferenceError("推理会话锁已损坏".to_string()))?;
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;
    let (shape, output) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.iter().copied().collect();

    self.postprocess(&dims, output, &letterbox, input.width(), input.height())
  }
}

/// Keras 导出的喇叭声音分类模型，输入形状 `[1, 梅尔带数, 帧数, 1]`
pub struct OnnxClassifier {
  session: Mutex<Session>,
  input_name: String,
}

impl FromUrlWithScheme for OnnxClassifier {
  const SCHEME: &'static str = ONNX_SCHEME;
}

impl FromUrl for OnnxClassifier {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let session = open_session(url)?;
    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ModelError::Unavailable("模型没有输入".to_string()))?;
    debug!("分类模型输入: {}", input_name);
    Ok(OnnxClassifier {
      session: Mutex::new(session),
      input_name,
    })
  }
}

impl Model for OnnxClassifier {
  type Input = MelSpectrogram;
  type Output = Probabilities;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let shape = [1usize, input.n_mels(), input.n_frames(), 1];
    let tensor = Tensor::from_array((shape, input.data().to_vec().into_boxed_slice()))?;

    debug!("执行分类模型推理");
    let mut session = self
      .session
      .lock()
      .map_err(|_| ModelError::InferenceError("推理会话锁已损坏".to_string()))?;
    let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor])?;
    let (_, output) = outputs[0].try_extract_tensor::<f32>()?;
    if output.is_empty() {
      return Err(ModelError::OutputShapeError("分类输出为空".to_string()));
    }

    Ok(Probabilities(output.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn nms_keeps_best_per_overlap_and_class() {
    let kept = nms(
      vec![
        (0, 0.6, [0.0, 0.0, 10.0, 10.0]),
        (0, 0.9, [1.0, 1.0, 10.0, 10.0]),
        (1, 0.5, [0.0, 0.0, 10.0, 10.0]),
      ],
      0.5,
    );
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].1, 0.9);
    assert_eq!(kept[1].0, 1);
  }
}
