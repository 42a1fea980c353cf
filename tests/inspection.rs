// 该文件是 Tricheck 项目的一部分。
// tests/inspection.rs - 检查服务集成测试
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

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;

use tricheck::{
  inspector::{Inspector, respond},
  output::DirectoryImageStore,
  rules::RuleBook,
};

fn fixture(dir: &Path, name: &str, content: Value) -> Url {
  let path = dir.join(name);
  std::fs::write(&path, content.to_string()).unwrap();
  Url::parse(&format!("fixture://{}", path.display())).unwrap()
}

fn detection(class_id: u32, bbox: [i32; 4]) -> Value {
  json!({
    "class_id": class_id,
    "score": 0.9,
    "bbox": { "x1": bbox[0], "y1": bbox[1], "x2": bbox[2], "y2": bbox[3] },
  })
}

fn png_bytes() -> Vec<u8> {
  let mut buf = Cursor::new(Vec::new());
  RgbImage::from_pixel(64, 48, image::Rgb([90, 120, 150]))
    .write_to(&mut buf, ImageFormat::Png)
    .unwrap();
  buf.into_inner()
}

fn wav_bytes(sample_rate: u32, seconds: f32) -> Vec<u8> {
  let spec = hound::WavSpec {
    channels: 1,
    sample_rate,
    bits_per_sample: 16,
    sample_format: hound::SampleFormat::Int,
  };
  let mut buf = Cursor::new(Vec::new());
  {
    let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
    let n = (sample_rate as f32 * seconds) as usize;
    for i in 0..n {
      let t = i as f32 / sample_rate as f32;
      let v = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
      writer.write_sample((v * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
  }
  buf.into_inner()
}

fn store(dir: &Path) -> DirectoryImageStore {
  DirectoryImageStore::new(dir.join("uploads"), "/static/uploads")
}

#[test]
fn modified_three_wheeler_is_flagged_and_image_is_stored() {
  let dir = TempDir::new().unwrap();
  let model = fixture(
    dir.path(),
    "det.json",
    json!([detection(2, [4, 4, 40, 30])]),
  );
  let inspector = Inspector::builder()
    .store(store(dir.path()))
    .modification_model(model)
    .build()
    .unwrap();

  let value = respond(inspector.inspect_modification(Some(&png_bytes())));
  assert_eq!(value["illegal_detected"], true);
  assert_eq!(value["detected_classes"], json!(["modify_three_Wheeler"]));
  assert!(
    value["violation_message"]
      .as_str()
      .unwrap()
      .contains("Illegal Vehicle Modification")
  );

  let output_image = value["output_image"].as_str().unwrap();
  assert!(output_image.starts_with("det_"));
  assert!(output_image.ends_with(".jpg"));
  assert_eq!(
    value["result_image"],
    format!("/static/uploads/{}", output_image)
  );
  assert!(dir.path().join("uploads").join(output_image).is_file());
}

#[test]
fn each_request_writes_a_new_file() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "det.json", json!([]));
  let inspector = Inspector::builder()
    .store(store(dir.path()))
    .modification_model(model)
    .build()
    .unwrap();

  let png = png_bytes();
  let first = respond(inspector.inspect_modification(Some(&png)));
  let second = respond(inspector.inspect_modification(Some(&png)));
  assert_eq!(first["illegal_detected"], false);
  assert_eq!(first["detected_classes"], json!([]));
  assert_ne!(first["output_image"], second["output_image"]);
  assert_eq!(
    std::fs::read_dir(dir.path().join("uploads")).unwrap().count(),
    2
  );
}

#[test]
fn covered_windscreen_is_illegal() {
  let dir = TempDir::new().unwrap();
  let model = fixture(
    dir.path(),
    "wind.json",
    json!([
      detection(0, [0, 0, 100, 10]),
      detection(1, [0, 0, 40, 10]),
    ]),
  );
  let inspector = Inspector::builder()
    .store(store(dir.path()))
    .windscreen_model(model)
    .build()
    .unwrap();

  let value = respond(inspector.inspect_windscreen(Some(&png_bytes())));
  assert_eq!(value["legal"], false);
  assert_eq!(value["visibility"], 60.0);
  assert_eq!(value["windshield_area"], 1000);
  assert_eq!(value["sticker_area"], 400);
  assert_eq!(value["message"], "❌ ILLEGAL – Visibility below 70%");
  assert!(value["output_image"].as_str().unwrap().starts_with("wind_"));
}

#[test]
fn windscreen_without_windshield() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "wind.json", json!([detection(1, [0, 0, 5, 5])]));
  let inspector = Inspector::builder()
    .store(store(dir.path()))
    .windscreen_model(model)
    .build()
    .unwrap();

  let value = respond(inspector.inspect_windscreen(Some(&png_bytes())));
  assert_eq!(value["legal"], false);
  assert_eq!(value["visibility"], 0.0);
  assert_eq!(value["message"], "❌ No windshield detected");
}

#[test]
fn confident_multi_tone_horn_is_illegal() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "horn.json", json!([0.95, 0.05]));
  let inspector = Inspector::builder().horn_model(model).build().unwrap();

  let value = respond(inspector.inspect_horn(Some(&wav_bytes(22050, 1.0))));
  assert_eq!(value["horn_type"], "Multi-tone horn");
  assert_eq!(value["label"], "multi_tone");
  assert_eq!(value["confidence"], 95.0);
  assert_eq!(value["legal"], false);
  assert!(value["law"].as_str().unwrap().contains("155(3)"));
  assert!(value.get("message").is_none());
}

#[test]
fn unsure_horn_is_suppressed() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "horn.json", json!([0.4, 0.6]));
  let inspector = Inspector::builder().horn_model(model).build().unwrap();

  let value = respond(inspector.inspect_horn(Some(&wav_bytes(44100, 4.0))));
  assert_eq!(value["horn_type"], "Uncertain / Non-horn");
  assert_eq!(value["label"], "single_tone");
  assert_eq!(value["legal"], false);
  assert_eq!(
    value["message"],
    "Prediction suppressed due to low confidence"
  );
  assert!(value.get("law").is_none());
}

#[test]
fn single_led_headlight_is_charged() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "acc.json", json!([detection(0, [2, 2, 20, 20])]));
  let inspector = Inspector::builder().accessory_model(model).build().unwrap();

  let value = respond(inspector.inspect_accessory(Some(&png_bytes())));
  assert_eq!(value["LED_HeadLights_detected"], "YES");
  assert_eq!(value["Wind_Deflectors_detected"], "NO");
  assert_eq!(
    value["charges"],
    json!({ "LED_HeadLight": 1000, "Wind_Deflector": 0 })
  );
  assert_eq!(value["total_charge_rs"], 1000);
  assert_eq!(value["law_reference"]["approval_year"], "2022–2023");

  let jpeg = STANDARD
    .decode(value["annotated_image"].as_str().unwrap())
    .unwrap();
  assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
}

#[test]
fn repeated_deflectors_are_charged_once() {
  let dir = TempDir::new().unwrap();
  let items: Vec<Value> = (0..5).map(|i| detection(1, [i, i, i + 8, i + 8])).collect();
  let model = fixture(dir.path(), "acc.json", Value::Array(items));
  let inspector = Inspector::builder().accessory_model(model).build().unwrap();

  let value = respond(inspector.inspect_accessory(Some(&png_bytes())));
  assert_eq!(value["Wind_Deflectors_detected"], "YES");
  assert_eq!(value["total_charge_rs"], 1000);
}

#[test]
fn missing_upload_is_an_error_payload() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "acc.json", json!([]));
  let inspector = Inspector::builder().accessory_model(model).build().unwrap();

  let value = respond(inspector.inspect_accessory(None));
  assert_eq!(value, json!({ "error": "No file uploaded" }));
}

#[test]
fn unknown_class_id_is_an_error_payload() {
  let dir = TempDir::new().unwrap();
  let model = fixture(dir.path(), "det.json", json!([detection(9, [0, 0, 1, 1])]));
  let inspector = Inspector::builder()
    .store(store(dir.path()))
    .modification_model(model)
    .build()
    .unwrap();

  let value = respond(inspector.inspect_modification(Some(&png_bytes())));
  assert!(value["error"].as_str().unwrap().contains('9'));
  assert!(!dir.path().join("uploads").exists());
}

#[test]
fn rule_book_overrides_threshold() {
  let dir = TempDir::new().unwrap();
  let model = fixture(
    dir.path(),
    "wind.json",
    json!([
      detection(0, [0, 0, 100, 10]),
      detection(1, [0, 0, 40, 10]),
    ]),
  );
  let rules = RuleBook::from_toml_str("[windscreen]\nmin_visibility = 50.0\n").unwrap();
  let inspector = Inspector::builder()
    .rules(rules)
    .store(store(dir.path()))
    .windscreen_model(model)
    .build()
    .unwrap();

  let value = respond(inspector.inspect_windscreen(Some(&png_bytes())));
  assert_eq!(value["visibility"], 60.0);
  assert_eq!(value["legal"], true);
}

#[test]
fn missing_model_file_fails_at_startup() {
  let dir = TempDir::new().unwrap();
  let url = Url::parse(&format!("fixture://{}/absent.json", dir.path().display())).unwrap();
  assert!(Inspector::builder().horn_model(url).build().is_err());
}
