//! 音频规格与样本缓冲区
//!
//! 定义会话在整个生命周期内保持一致的 [`AudioSpec`]，以及库内统一的交错
//! PCM表示 [`SampleBuffer`]。

use crate::error::{self, AudioResult};
use serde::{Deserialize, Serialize};

/// 支持的最大声道数
pub const MAX_CHANNELS: u16 = 32;

/// 支持的最高采样率 (Hz)
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// 缓冲区一次预分配的最大帧数
pub const MAX_PREALLOC_FRAMES: usize = 1 << 16;

/// 样本表示方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleFormat {
    /// 有符号整数PCM（8位在WAV中按无符号存储，由后端处理）
    #[default]
    Int,
    /// IEEE浮点
    Float,
}

/// 音频规格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// 源（或目标）格式的位深度
    ///
    /// 库内部统一使用 f32 交错样本，这里记录的是容器/编解码器层面的位深。
    pub bits_per_sample: u16,
    pub sample_format: SampleFormat,
    /// 总帧数；流式来源或未知长度时为 `None`
    pub total_frames: Option<u64>,
}

impl AudioSpec {
    /// 创建整数PCM规格
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            sample_format: SampleFormat::Int,
            total_frames: None,
        }
    }

    /// 创建32位浮点规格
    pub fn float(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_format: SampleFormat::Float,
            ..Self::new(sample_rate, channels, 32)
        }
    }

    pub fn with_total_frames(mut self, total_frames: Option<u64>) -> Self {
        self.total_frames = total_frames;
        self
    }

    /// 验证规格的基本不变式
    pub fn validate(&self) -> AudioResult<()> {
        if self.channels == 0 {
            return Err(error::malformed("声道数不能为0"));
        }

        if self.channels > MAX_CHANNELS {
            return Err(error::unsupported(format!(
                "声道数({})超出支持范围(最大{MAX_CHANNELS})",
                self.channels
            )));
        }

        if self.sample_rate == 0 {
            return Err(error::malformed("采样率不能为0"));
        }

        if self.sample_rate > MAX_SAMPLE_RATE {
            return Err(error::unsupported(format!(
                "采样率({})超出支持范围(最大{MAX_SAMPLE_RATE}Hz)",
                self.sample_rate
            )));
        }

        match (self.sample_format, self.bits_per_sample) {
            (SampleFormat::Int, 8 | 16 | 24 | 32) | (SampleFormat::Float, 32 | 64) => Ok(()),
            (format, bits) => Err(error::unsupported(format!(
                "不支持的样本格式: {format:?} {bits}位"
            ))),
        }
    }

    /// 每个样本在打包存储时占用的字节数
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// 每帧字节数（所有声道）
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// 时长（秒），总帧数未知时返回 `None`
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.total_frames, self.sample_rate) {
            (Some(frames), rate) if rate > 0 => Some(frames as f64 / rate as f64),
            _ => None,
        }
    }
}

/// 交错样本缓冲区
///
/// 样本为库内统一表示：整数PCM按 `value / 2^(bits-1)` 归一化到 [-1.0, 1.0)，
/// 浮点样本原样保留。样本数始终是声道数的整数倍。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleBuffer {
    channels: u16,
    samples: Vec<f32>,
}

impl SampleBuffer {
    /// 从交错样本创建缓冲区
    ///
    /// 样本数不是声道数整数倍时返回 `InvalidArgument`。
    pub fn from_interleaved(channels: u16, samples: Vec<f32>) -> AudioResult<Self> {
        if channels == 0 {
            return Err(error::invalid_argument("声道数不能为0"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(error::invalid_argument(format!(
                "样本数({})不是声道数({channels})的整数倍",
                samples.len()
            )));
        }
        Ok(Self { channels, samples })
    }

    /// 预分配容量的空缓冲区
    ///
    /// 预分配最多 [`MAX_PREALLOC_FRAMES`] 帧，超出部分随写入增长。
    pub fn with_capacity(channels: u16, frames: usize) -> Self {
        let frames = frames.min(MAX_PREALLOC_FRAMES);
        Self {
            channels,
            samples: Vec::with_capacity(frames.saturating_mul(channels as usize)),
        }
    }

    /// 从非交错（按声道分组）的数据创建
    pub fn from_planar(planes: &[Vec<f32>]) -> AudioResult<Self> {
        let channels = planes.len();
        if channels == 0 || channels > MAX_CHANNELS as usize {
            return Err(error::invalid_argument(format!("无效的声道数: {channels}")));
        }
        let frames = planes[0].len();
        if planes.iter().any(|p| p.len() != frames) {
            return Err(error::invalid_argument("各声道长度不一致"));
        }
        Ok(Self {
            channels: channels as u16,
            samples: interleave(planes),
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// 单个声道的样本迭代器
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channels.max(1) as usize)
            .copied()
    }

    /// 转为非交错数据
    pub fn to_planar(&self) -> Vec<Vec<f32>> {
        deinterleave(&self.samples, self.channels as usize)
    }

    /// 追加另一个同声道数的缓冲区
    pub fn append(&mut self, other: &SampleBuffer) -> AudioResult<()> {
        if other.channels != self.channels {
            return Err(error::invalid_argument(format!(
                "声道数不一致: {} vs {}",
                self.channels, other.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    pub(crate) fn samples_mut(&mut self) -> &mut Vec<f32> {
        &mut self.samples
    }
}

/// 把按声道分组的数据交错
pub fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    let channels = planes.len();
    let frames = planes.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(channels * frames);
    for frame in 0..frames {
        for plane in planes {
            out.push(plane[frame]);
        }
    }
    out
}

/// 把交错数据拆分为按声道分组的数据
pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;

    #[test]
    fn spec_validation() {
        assert!(AudioSpec::new(44100, 2, 16).validate().is_ok());
        assert!(AudioSpec::float(48000, 1).validate().is_ok());
        assert!(matches!(
            AudioSpec::new(44100, 0, 16).validate(),
            Err(AudioError::Malformed(_))
        ));
        assert!(matches!(
            AudioSpec::new(0, 2, 16).validate(),
            Err(AudioError::Malformed(_))
        ));
        assert!(matches!(
            AudioSpec::new(44100, 2, 12).validate(),
            Err(AudioError::Unsupported(_))
        ));
    }

    #[test]
    fn duration_and_frame_size() {
        let spec = AudioSpec::new(44100, 2, 24).with_total_frames(Some(88200));
        assert_eq!(spec.duration_seconds(), Some(2.0));
        assert_eq!(spec.bytes_per_frame(), 6);
        assert_eq!(AudioSpec::new(8000, 1, 8).duration_seconds(), None);
    }

    #[test]
    fn buffer_rejects_partial_frames() {
        let err = SampleBuffer::from_interleaved(2, vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, AudioError::InvalidArgument(_)));
    }

    #[test]
    fn huge_capacity_request_is_clamped() {
        let buf = SampleBuffer::with_capacity(8, usize::MAX);
        assert!(buf.is_empty());
        assert!(buf.samples.capacity() >= MAX_PREALLOC_FRAMES * 8);
        assert!(buf.samples.capacity() < usize::MAX / 2);
    }

    #[test]
    fn planar_conversion() {
        let buf = SampleBuffer::from_planar(&[vec![1.0, 2.0], vec![-1.0, -2.0]]).unwrap();
        assert_eq!(buf.samples(), &[1.0, -1.0, 2.0, -2.0]);
        assert_eq!(buf.frames(), 2);
        assert_eq!(buf.channel(1).collect::<Vec<_>>(), vec![-1.0, -2.0]);
        assert_eq!(buf.to_planar(), vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
    }
}
