// 该文件是 Tricheck 项目的一部分。
// src/audio.rs - 音频定长处理与梅尔频谱
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

//! 喇叭分类器的特征提取。参数必须与模型训练时一致：
//! 44100 Hz、3 秒定长窗口、2048 点 FFT、512 点帧移、64 个梅尔带、
//! 以最大值为参考的对数功率谱（下限 80 dB）。

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use tracing::debug;

pub const HORN_SAMPLE_RATE: u32 = 44100;
pub const HORN_DURATION_SECS: u32 = 3;
pub const HORN_N_FFT: usize = 2048;
pub const HORN_HOP_LENGTH: usize = 512;
pub const HORN_N_MELS: usize = 64;

const POWER_DB_AMIN: f64 = 1e-10;
const POWER_DB_TOP_DB: f64 = 80.0;

/// 单声道波形
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
  pub samples: Vec<f32>,
  pub sample_rate: u32,
}

impl Waveform {
  pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
    Self {
      samples,
      sample_rate,
    }
  }

  pub fn duration_secs(&self) -> f64 {
    if self.sample_rate == 0 {
      return 0.0;
    }
    self.samples.len() as f64 / self.sample_rate as f64
  }

  /// 线性插值重采样到目标采样率
  pub fn resample(self, target_rate: u32) -> Waveform {
    if self.sample_rate == target_rate || self.sample_rate == 0 || self.samples.is_empty() {
      return Waveform {
        samples: self.samples,
        sample_rate: target_rate,
      };
    }

    let ratio = self.sample_rate as f64 / target_rate as f64;
    let out_len = (self.samples.len() as f64 / ratio).round() as usize;
    let last = self.samples.len() - 1;
    let samples = (0..out_len)
      .map(|i| {
        let pos = i as f64 * ratio;
        let idx = (pos.floor() as usize).min(last);
        let next = (idx + 1).min(last);
        let frac = (pos - idx as f64) as f32;
        self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
      })
      .collect();

    Waveform {
      samples,
      sample_rate: target_rate,
    }
  }

  /// 截断或在末尾补零到恰好 `len` 个采样点
  pub fn fix_length(mut self, len: usize) -> Waveform {
    self.samples.resize(len, 0.0);
    self
  }
}

/// 对数功率梅尔频谱，按 `[梅尔带][帧]` 行优先存储
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
  data: Vec<f32>,
  n_mels: usize,
  n_frames: usize,
}

impl MelSpectrogram {
  pub fn n_mels(&self) -> usize {
    self.n_mels
  }

  pub fn n_frames(&self) -> usize {
    self.n_frames
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn get(&self, mel: usize, frame: usize) -> f32 {
    self.data[mel * self.n_frames + frame]
  }
}

/// Slaney 尺度的 Hz 到 Mel 转换
fn hz_to_mel(hz: f64) -> f64 {
  const F_SP: f64 = 200.0 / 3.0;
  const MIN_LOG_HZ: f64 = 1000.0;
  let min_log_mel = MIN_LOG_HZ / F_SP;
  let logstep = 6.4f64.ln() / 27.0;
  if hz >= MIN_LOG_HZ {
    min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
  } else {
    hz / F_SP
  }
}

fn mel_to_hz(mel: f64) -> f64 {
  const F_SP: f64 = 200.0 / 3.0;
  const MIN_LOG_HZ: f64 = 1000.0;
  let min_log_mel = MIN_LOG_HZ / F_SP;
  let logstep = 6.4f64.ln() / 27.0;
  if mel >= min_log_mel {
    MIN_LOG_HZ * (logstep * (mel - min_log_mel)).exp()
  } else {
    F_SP * mel
  }
}

/// 三角形梅尔滤波器组，Slaney 面积归一化，形状 `[n_mels][n_fft / 2 + 1]`
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<Vec<f64>> {
  let n_bins = n_fft / 2 + 1;
  let nyquist = sample_rate as f64 / 2.0;
  let fft_freqs: Vec<f64> = (0..n_bins)
    .map(|i| i as f64 * nyquist / (n_bins - 1) as f64)
    .collect();

  let mel_max = hz_to_mel(nyquist);
  let mel_points: Vec<f64> = (0..n_mels + 2)
    .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
    .collect();

  (0..n_mels)
    .map(|m| {
      let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
      let enorm = 2.0 / (right - left);
      fft_freqs
        .iter()
        .map(|&f| {
          let lower = (f - left) / (center - left);
          let upper = (right - f) / (right - center);
          lower.min(upper).max(0.0) * enorm
        })
        .collect()
    })
    .collect()
}

pub struct MelExtractor {
  n_fft: usize,
  hop_length: usize,
  window: Vec<f64>,
  filters: Vec<Vec<f64>>,
  fft: Arc<dyn Fft<f64>>,
}

impl Default for MelExtractor {
  fn default() -> Self {
    Self::new(HORN_SAMPLE_RATE, HORN_N_FFT, HORN_HOP_LENGTH, HORN_N_MELS)
  }
}

impl MelExtractor {
  pub fn new(sample_rate: u32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
    // 周期 Hann 窗
    let window = (0..n_fft)
      .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / n_fft as f64).cos())
      .collect();
    let fft = FftPlanner::<f64>::new().plan_fft_forward(n_fft);

    Self {
      n_fft,
      hop_length,
      window,
      filters: mel_filterbank(sample_rate, n_fft, n_mels),
      fft,
    }
  }

  fn power_spectrogram(&self, samples: &[f32]) -> Vec<Vec<f64>> {
    // 居中分帧，两端各补 n_fft / 2 个零
    let pad = self.n_fft / 2;
    let mut padded = vec![0.0f64; samples.len() + 2 * pad];
    for (dst, &src) in padded[pad..].iter_mut().zip(samples) {
      *dst = src as f64;
    }

    let n_frames = 1 + samples.len() / self.hop_length;
    let n_bins = self.n_fft / 2 + 1;
    let mut buffer = vec![Complex::new(0.0, 0.0); self.n_fft];

    (0..n_frames)
      .map(|t| {
        let start = t * self.hop_length;
        for (i, slot) in buffer.iter_mut().enumerate() {
          *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
        }
        self.fft.process(&mut buffer);
        buffer[..n_bins].iter().map(|c| c.norm_sqr()).collect()
      })
      .collect()
  }

  pub fn extract(&self, waveform: &Waveform) -> MelSpectrogram {
    let power = self.power_spectrogram(&waveform.samples);
    let n_frames = power.len();
    let n_mels = self.filters.len();

    let mut mel = vec![0.0f64; n_mels * n_frames];
    for (m, filter) in self.filters.iter().enumerate() {
      for (t, frame) in power.iter().enumerate() {
        mel[m * n_frames + t] = filter.iter().zip(frame).map(|(w, p)| w * p).sum();
      }
    }

    let reference = mel.iter().copied().fold(0.0f64, f64::max);
    let ref_db = 10.0 * reference.max(POWER_DB_AMIN).log10();
    let mut db: Vec<f64> = mel
      .iter()
      .map(|&p| 10.0 * p.max(POWER_DB_AMIN).log10() - ref_db)
      .collect();
    let floor = db.iter().copied().fold(f64::NEG_INFINITY, f64::max) - POWER_DB_TOP_DB;
    for v in db.iter_mut() {
      *v = v.max(floor);
    }

    debug!("梅尔频谱形状: {}x{}", n_mels, n_frames);
    MelSpectrogram {
      data: db.into_iter().map(|v| v as f32).collect(),
      n_mels,
      n_frames,
    }
  }
}

/// 喇叭分类器的完整预处理：重采样、定长、梅尔频谱
pub struct HornPreprocessor {
  sample_rate: u32,
  num_samples: usize,
  extractor: MelExtractor,
}

impl Default for HornPreprocessor {
  fn default() -> Self {
    Self {
      sample_rate: HORN_SAMPLE_RATE,
      num_samples: (HORN_SAMPLE_RATE * HORN_DURATION_SECS) as usize,
      extractor: MelExtractor::default(),
    }
  }
}

impl HornPreprocessor {
  pub fn num_samples(&self) -> usize {
    self.num_samples
  }

  pub fn prepare(&self, waveform: Waveform) -> Waveform {
    waveform
      .resample(self.sample_rate)
      .fix_length(self.num_samples)
  }

  pub fn process(&self, waveform: Waveform) -> MelSpectrogram {
    let fixed = self.prepare(waveform);
    self.extractor.extract(&fixed)
  }
}
