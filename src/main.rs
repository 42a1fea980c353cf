// 该文件是 Tricheck 项目的一部分。
// src/main.rs - 命令行主程序
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

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use tricheck::{
  FromUrl,
  inspector::{Inspector, InspectorBuilder, respond},
  output::{DirectoryImageStore, draw::Draw},
  rules::RuleBook,
};

/// 三轮车检查：改装、挡风玻璃、喇叭与配件收费
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 规则表 TOML 文件，缺省使用内置规则
  #[arg(long, global = true, value_name = "FILE")]
  rules: Option<PathBuf>,

  /// 标注标签字体（TTF/OTF），缺省只绘制边框
  #[arg(long, global = true, value_name = "FILE")]
  font: Option<PathBuf>,

  /// 标签字体大小
  #[arg(long, global = true, value_name = "PX")]
  font_size: Option<f32>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// 非法改装检查
  Modification {
    /// 检测模型，例如 onnx:///models/best.onnx 或 fixture:///path/detections.json
    #[arg(long, value_name = "MODEL")]
    model: Url,
    /// 标注图像保存位置，例如 folder:///srv/static/uploads?public=/static/uploads
    #[arg(long, value_name = "OUTPUT")]
    output: Url,
    /// 待检查图像
    #[arg(long, value_name = "IMAGE")]
    image: Option<PathBuf>,
  },
  /// 挡风玻璃可视率检查
  Windscreen {
    #[arg(long, value_name = "MODEL")]
    model: Url,
    #[arg(long, value_name = "OUTPUT")]
    output: Url,
    #[arg(long, value_name = "IMAGE")]
    image: Option<PathBuf>,
  },
  /// 喇叭声音合法性判定
  Horn {
    /// 音频分类模型
    #[arg(long, value_name = "MODEL")]
    model: Url,
    /// WAV 录音
    #[arg(long, value_name = "AUDIO")]
    audio: Option<PathBuf>,
  },
  /// 合法改装收费计算
  Accessory {
    #[arg(long, value_name = "MODEL")]
    model: Url,
    #[arg(long, value_name = "IMAGE")]
    image: Option<PathBuf>,
  },
  /// 输出当前生效的规则表
  Rules,
}

fn read_media(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
  path
    .map(|p| std::fs::read(p).with_context(|| format!("无法读取 {}", p.display())))
    .transpose()
}

fn store_from(url: &Url) -> Result<DirectoryImageStore> {
  DirectoryImageStore::from_url(url).with_context(|| format!("无效的保存位置 {}", url))
}

fn inspector_builder(rules: RuleBook, args: &Args) -> Result<InspectorBuilder> {
  let mut draw = match &args.font {
    Some(path) => Draw::with_font_file(path)?,
    None => Draw::default(),
  };
  if let Some(size) = args.font_size {
    draw = draw.font_size(size);
  }
  Ok(Inspector::builder().rules(rules).draw(draw))
}

fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let rules = match &args.rules {
    Some(path) => RuleBook::from_toml_file(path)?,
    None => RuleBook::default(),
  };

  info!("开始检查...");
  let now = std::time::Instant::now();
  let payload = match &args.command {
    Command::Rules => {
      print!("{}", rules.to_toml_string()?);
      return Ok(ExitCode::SUCCESS);
    }
    Command::Modification {
      model,
      output,
      image,
    } => {
      let inspector = inspector_builder(rules, &args)?
        .store(store_from(output)?)
        .modification_model(model.clone())
        .build()?;
      let media = read_media(image.as_deref())?;
      respond(inspector.inspect_modification(media.as_deref()))
    }
    Command::Windscreen {
      model,
      output,
      image,
    } => {
      let inspector = inspector_builder(rules, &args)?
        .store(store_from(output)?)
        .windscreen_model(model.clone())
        .build()?;
      let media = read_media(image.as_deref())?;
      respond(inspector.inspect_windscreen(media.as_deref()))
    }
    Command::Horn { model, audio } => {
      let inspector = inspector_builder(rules, &args)?.horn_model(model.clone()).build()?;
      let media = read_media(audio.as_deref())?;
      respond(inspector.inspect_horn(media.as_deref()))
    }
    Command::Accessory { model, image } => {
      let inspector = inspector_builder(rules, &args)?.accessory_model(model.clone()).build()?;
      let media = read_media(image.as_deref())?;
      respond(inspector.inspect_accessory(media.as_deref()))
    }
  };
  info!("检查完成，耗时: {:.2?}", now.elapsed());

  println!("{}", serde_json::to_string_pretty(&payload)?);

  if payload.get("error").is_some() {
    Ok(ExitCode::FAILURE)
  } else {
    Ok(ExitCode::SUCCESS)
  }
}
