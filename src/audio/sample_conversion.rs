//! 样本表示转换
//!
//! 后端原生的整数/浮点样本与库内统一的 f32 交错表示之间的所有转换都集中在这里，
//! 后端只在自己的边界处调用这些函数。
//!
//! 整数PCM的归一化因子为 `2^(bits-1)`，编码时四舍五入并截断到目标位宽，
//! 因此 8/16/24 位整数和32位浮点可以无损往返。

use super::format::{AudioSpec, SampleFormat};
use crate::error::{self, AudioResult};

/// 整数样本的归一化因子
#[inline]
fn scale_for(bits: u16) -> f64 {
    (1u64 << (bits.clamp(1, 32) - 1)) as f64
}

/// 整数样本 → 统一表示
#[inline]
pub fn int_to_f32(value: i32, bits: u16) -> f32 {
    (value as f64 / scale_for(bits)) as f32
}

/// 统一表示 → 整数样本（四舍五入并截断）
#[inline]
pub fn f32_to_int(sample: f32, bits: u16) -> i32 {
    let scale = scale_for(bits);
    let value = (sample as f64 * scale).round();
    value.clamp(-scale, scale - 1.0) as i32
}

/// 按规格解码小端序打包样本（无头部PCM使用）
///
/// 8位整数按有符号处理。`bytes` 长度必须是样本字节数的整数倍。
pub fn unpack_le(bytes: &[u8], spec: &AudioSpec, out: &mut Vec<f32>) -> AudioResult<()> {
    let width = spec.bytes_per_sample();
    if width == 0 || bytes.len() % width != 0 {
        return Err(error::corrupt(format!(
            "数据长度({})不是样本宽度({width})的整数倍",
            bytes.len()
        )));
    }
    out.reserve(bytes.len() / width);

    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => {
            out.extend(bytes.iter().map(|&b| int_to_f32(b as i8 as i32, 8)));
        }
        (SampleFormat::Int, 16) => {
            out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|c| int_to_f32(i16::from_le_bytes([c[0], c[1]]) as i32, 16)),
            );
        }
        (SampleFormat::Int, 24) => {
            out.extend(bytes.chunks_exact(3).map(|c| {
                // 放到高24位后算术右移完成符号扩展
                let value = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                int_to_f32(value, 24)
            }));
        }
        (SampleFormat::Int, 32) => {
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| int_to_f32(i32::from_le_bytes([c[0], c[1], c[2], c[3]]), 32)),
            );
        }
        (SampleFormat::Float, 32) => {
            out.extend(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }
        (SampleFormat::Float, 64) => {
            out.extend(bytes.chunks_exact(8).map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                f64::from_le_bytes(raw) as f32
            }));
        }
        (format, bits) => {
            return Err(error::unsupported(format!(
                "无法解包 {format:?} {bits}位样本"
            )));
        }
    }
    Ok(())
}

/// 按规格把统一表示样本打包为小端序字节
pub fn pack_le(samples: &[f32], spec: &AudioSpec, out: &mut Vec<u8>) -> AudioResult<()> {
    let bits = spec.bits_per_sample;
    out.reserve(samples.len() * spec.bytes_per_sample());

    match (spec.sample_format, bits) {
        (SampleFormat::Int, 8) => {
            out.extend(samples.iter().map(|&s| f32_to_int(s, 8) as i8 as u8));
        }
        (SampleFormat::Int, 16) => {
            for &s in samples {
                out.extend_from_slice(&(f32_to_int(s, 16) as i16).to_le_bytes());
            }
        }
        (SampleFormat::Int, 24) => {
            for &s in samples {
                out.extend_from_slice(&f32_to_int(s, 24).to_le_bytes()[..3]);
            }
        }
        (SampleFormat::Int, 32) => {
            for &s in samples {
                out.extend_from_slice(&f32_to_int(s, 32).to_le_bytes());
            }
        }
        (SampleFormat::Float, 32) => {
            for &s in samples {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
        (SampleFormat::Float, 64) => {
            for &s in samples {
                out.extend_from_slice(&(s as f64).to_le_bytes());
            }
        }
        (format, bits) => {
            return Err(error::unsupported(format!(
                "无法打包 {format:?} {bits}位样本"
            )));
        }
    }
    Ok(())
}

/// 把symphonia的解码缓冲区追加为交错的统一表示
#[cfg(any(feature = "flac", feature = "mp3"))]
pub fn append_symphonia_buffer(
    audio_buf: &symphonia::core::audio::AudioBufferRef,
    samples: &mut Vec<f32>,
) {
    use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
    use symphonia::core::sample::Sample;

    fn interleave_with<S: Sample>(
        buf: &AudioBuffer<S>,
        samples: &mut Vec<f32>,
        convert: impl Fn(S) -> f32,
    ) {
        let channels = buf.spec().channels.count();
        let frames = buf.frames();
        samples.reserve(channels * frames);
        for frame in 0..frames {
            for ch in 0..channels {
                samples.push(convert(buf.chan(ch)[frame]));
            }
        }
    }

    match audio_buf {
        AudioBufferRef::F32(buf) => interleave_with(&**buf, samples, |s| s),
        AudioBufferRef::F64(buf) => interleave_with(&**buf, samples, |s| s as f32),
        AudioBufferRef::S8(buf) => interleave_with(&**buf, samples, |s| s as f32 / 128.0),
        AudioBufferRef::S16(buf) => interleave_with(&**buf, samples, |s| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            interleave_with(&**buf, samples, |s| s.inner() as f32 / 8_388_608.0)
        }
        AudioBufferRef::S32(buf) => {
            interleave_with(&**buf, samples, |s| (s as f64 / 2_147_483_648.0) as f32)
        }
        AudioBufferRef::U8(buf) => {
            interleave_with(&**buf, samples, |s| (s as f32 - 128.0) / 128.0)
        }
        AudioBufferRef::U16(buf) => {
            interleave_with(&**buf, samples, |s| (s as f32 - 32768.0) / 32768.0)
        }
        AudioBufferRef::U24(buf) => {
            interleave_with(&**buf, samples, |s| (s.inner() as f32 - 8_388_608.0) / 8_388_608.0)
        }
        AudioBufferRef::U32(buf) => interleave_with(&**buf, samples, |s| {
            ((s as f64 - 2_147_483_648.0) / 2_147_483_648.0) as f32
        }),
    }
}
