//! 音频测试固件生成器
//!
//! 在内存中生成各格式的测试流：WAV由hound写出，FLAC由一个只输出
//! VERBATIM子帧的小编码器写出，MP3为手工拼接的静音帧。

#![allow(dead_code)]

use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub fn log(msg_zh: impl AsRef<str>, msg_en: impl AsRef<str>) {
    println!("{} / {}", msg_zh.as_ref(), msg_en.as_ref());
}

/// WavPack经由外部FFmpeg编解码，找不到时跳过相关测试
#[cfg(feature = "wavpack")]
pub fn skip_without_ffmpeg() -> bool {
    if audioport::audio::ffmpeg_available() {
        return false;
    }
    log("未找到FFmpeg，跳过", "FFmpeg not found, skipping");
    true
}

/// 确定性的测试信号（正弦 + 伪随机噪声），按交错顺序返回整数样本
pub fn test_signal(frames: usize, channels: u16, bits: u16) -> Vec<i32> {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let mut seed = 0x2545_f491_u32;
    let mut samples = Vec::with_capacity(frames * channels as usize);
    for frame in 0..frames {
        for ch in 0..channels {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let noise = ((seed >> 8) as f64 / (1u32 << 24) as f64 - 0.5) * 0.1;
            let phase = frame as f64 * (0.013 + ch as f64 * 0.007);
            let value = (phase.sin() * 0.8 + noise) * max;
            samples.push(value.round().clamp(-max - 1.0, max) as i32);
        }
    }
    samples
}

/// 整数样本的统一表示（与库的归一化规则一致）
pub fn normalize(samples: &[i32], bits: u16) -> Vec<f32> {
    let scale = (1u64 << (bits - 1)) as f64;
    samples.iter().map(|&s| (s as f64 / scale) as f32).collect()
}

// ==================== WAV ====================

pub fn wav_bytes(sample_rate: u32, channels: u16, bits: u16, samples: &[i32]) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: bits,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("创建WAV写入器失败");
        for &sample in samples {
            if bits == 8 {
                writer.write_sample(sample as i8).expect("写入样本失败");
            } else {
                writer.write_sample(sample).expect("写入样本失败");
            }
        }
        writer.finalize().expect("WAV收尾失败");
    }
    cursor.into_inner()
}

pub fn wav_float_bytes(sample_rate: u32, channels: u16, samples: &[f32]) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("创建WAV写入器失败");
        for &sample in samples {
            writer.write_sample(sample).expect("写入样本失败");
        }
        writer.finalize().expect("WAV收尾失败");
    }
    cursor.into_inner()
}

/// 2秒、44.1kHz、立体声、16位的WAV（缓存）
pub fn two_second_stereo_wav() -> &'static [u8] {
    static WAV: OnceLock<Vec<u8>> = OnceLock::new();
    WAV.get_or_init(|| {
        let samples = test_signal(88_200, 2, 16);
        wav_bytes(44_100, 2, 16, &samples)
    })
}

// ==================== FLAC ====================

fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x8005
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// FLAC帧号的类UTF-8编码
fn utf8_frame_number(n: u32, out: &mut Vec<u8>) {
    if n < 0x80 {
        out.push(n as u8);
    } else if n < 0x800 {
        out.push(0xC0 | (n >> 6) as u8);
        out.push(0x80 | (n & 0x3F) as u8);
    } else {
        out.push(0xE0 | (n >> 12) as u8);
        out.push(0x80 | ((n >> 6) & 0x3F) as u8);
        out.push(0x80 | (n & 0x3F) as u8);
    }
}

pub const FLAC_BLOCK_SIZE: usize = 4096;

/// 只使用VERBATIM子帧的FLAC编码（8/16/24位）
pub fn flac_bytes(sample_rate: u32, channels: u16, bits: u16, samples: &[i32]) -> Vec<u8> {
    assert!(matches!(bits, 8 | 16 | 24), "固件只支持8/16/24位");
    let ch = channels as usize;
    let total_frames = (samples.len() / ch) as u64;

    let mut out = b"fLaC".to_vec();
    // STREAMINFO，最后一个元数据块
    out.push(0x80);
    out.extend_from_slice(&[0, 0, 34]);
    out.extend_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    out.extend_from_slice(&(FLAC_BLOCK_SIZE as u16).to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    let packed = ((sample_rate as u64) << 44)
        | (((channels - 1) as u64) << 41)
        | (((bits - 1) as u64) << 36)
        | total_frames;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);

    let size_code: u8 = match bits {
        8 => 0b001,
        16 => 0b100,
        _ => 0b110,
    };
    let bytes_per_sample = bits as usize / 8;
    // 常见采样率直接编码在帧头，其余从STREAMINFO读取
    let rate_code: u8 = match sample_rate {
        44_100 => 0b1001,
        48_000 => 0b1010,
        96_000 => 0b1011,
        _ => 0b0000,
    };

    for (index, block) in samples.chunks(FLAC_BLOCK_SIZE * ch).enumerate() {
        let frames = block.len() / ch;
        let mut frame = vec![
            0xFF,
            0xF8,
            0x70 | rate_code,
            (((channels - 1) as u8) << 4) | (size_code << 1),
        ];
        utf8_frame_number(index as u32, &mut frame);
        frame.extend_from_slice(&((frames - 1) as u16).to_be_bytes());
        frame.push(crc8(&frame));

        for c in 0..ch {
            frame.push(0x02);
            for i in 0..frames {
                let value = block[i * ch + c].to_be_bytes();
                frame.extend_from_slice(&value[4 - bytes_per_sample..]);
            }
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&frame);
    }
    out
}

// ==================== MP3 ====================

/// MPEG-1 Layer III, 128kbps, 44.1kHz, 联合立体声的静音帧
pub const MP3_SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];
pub const MP3_FRAME_BYTES: usize = 417;
pub const MP3_FRAME_SAMPLES: usize = 1152;

pub fn silent_mp3_bytes(frame_count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(frame_count * MP3_FRAME_BYTES);
    for _ in 0..frame_count {
        out.extend_from_slice(&MP3_SILENT_FRAME_HEADER);
        out.resize(out.len() + MP3_FRAME_BYTES - 4, 0);
    }
    out
}

// ==================== 文件 ====================

/// 把字节写入临时目录中的文件
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("写入固件文件失败");
    path
}
