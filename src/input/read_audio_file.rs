// 该文件是 Tricheck 项目的一部分。
// src/input/read_audio_file.rs - WAV 音频文件输入
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

use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, audio::Waveform, url_to_path};

#[derive(Error, Debug)]
pub enum AudioFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Invalid audio file: {0}")]
  WavError(#[from] hound::Error),
  #[error("Unsupported audio format: {0}")]
  Unsupported(String),
}

/// 解码后的单声道波形
#[derive(Debug, Clone)]
pub struct AudioFileInput {
  waveform: Waveform,
}

impl FromUrlWithScheme for AudioFileInput {
  const SCHEME: &'static str = "audio";
}

impl FromUrl for AudioFileInput {
  type Error = AudioFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(AudioFileInputError::SchemaMismatch);
    }

    Self::open(url_to_path(url))
  }
}

impl AudioFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioFileInputError> {
    let path = path.as_ref();
    debug!("读取音频文件: {}", path.display());
    Self::decode(WavReader::open(path)?)
  }

  pub fn from_bytes(data: &[u8]) -> Result<Self, AudioFileInputError> {
    Self::decode(WavReader::new(std::io::Cursor::new(data))?)
  }

  fn decode<R: Read>(mut reader: WavReader<R>) -> Result<Self, AudioFileInputError> {
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
      return Err(AudioFileInputError::Unsupported(format!(
        "{} 声道, {} Hz",
        spec.channels, spec.sample_rate
      )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
      SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
      SampleFormat::Int => {
        if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
          return Err(AudioFileInputError::Unsupported(format!(
            "{} 位整数采样",
            spec.bits_per_sample
          )));
        }
        let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
        reader
          .samples::<i32>()
          .map(|s| s.map(|v| v as f32 / full_scale))
          .collect::<Result<_, _>>()?
      }
    };

    // 多声道取平均混为单声道
    let channels = spec.channels as usize;
    let samples = interleaved
      .chunks(channels)
      .map(|frame| frame.iter().sum::<f32>() / channels as f32)
      .collect::<Vec<_>>();

    debug!(
      "音频: {} Hz, {} 声道, {} 个采样点",
      spec.sample_rate,
      spec.channels,
      samples.len()
    );

    Ok(AudioFileInput {
      waveform: Waveform::new(samples, spec.sample_rate),
    })
  }

  pub fn waveform(&self) -> &Waveform {
    &self.waveform
  }

  pub fn into_waveform(self) -> Waveform {
    self.waveform
  }
}
