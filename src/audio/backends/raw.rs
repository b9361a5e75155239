//! 无头部PCM后端
//!
//! 读写交错的小端序样本，规格完全由调用方提供。8位整数按有符号存储。
//! 流末尾不足一帧的残余字节视为数据损坏。

use crate::audio::format::{AudioSpec, MAX_PREALLOC_FRAMES, SampleBuffer};
use crate::audio::sample_conversion::{pack_le, unpack_le};
use crate::audio::stream::{AudioStream, read_exact_or_eof};
use crate::error::{self, AudioResult};
use std::io::{Seek, SeekFrom, Write};

/// 无头部PCM解码器
pub struct RawDecoder {
    stream: AudioStream,
    spec: AudioSpec,
    bytes: Vec<u8>,
    /// 末尾残余的字节数，下一次读取时报告
    truncated: Option<usize>,
}

impl RawDecoder {
    /// 以调用方规格打开；流长度已知时推算总帧数
    pub fn open(stream: AudioStream, spec: &AudioSpec) -> AudioResult<(Self, AudioSpec)> {
        spec.validate()?;
        let frame_bytes = spec.bytes_per_frame() as u64;
        let total_frames = stream.remaining().map(|bytes| bytes / frame_bytes);
        let spec = spec.with_total_frames(total_frames.or(spec.total_frames));

        Ok((
            Self {
                stream,
                spec,
                bytes: Vec::new(),
                truncated: None,
            },
            spec,
        ))
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        if let Some(dangling) = self.truncated.take() {
            return Err(error::corrupt(format!(
                "无头部PCM末尾存在不完整的帧({dangling}字节)"
            )));
        }

        let frame_bytes = self.spec.bytes_per_frame();
        let mut buffer = SampleBuffer::with_capacity(self.spec.channels, max_frames);
        let mut remaining = max_frames;

        // 分块读取，单块不超过预分配上限
        while remaining > 0 {
            let chunk = remaining.min(MAX_PREALLOC_FRAMES);
            self.bytes.resize(chunk * frame_bytes, 0);
            let filled = read_exact_or_eof(&mut self.stream, &mut self.bytes)?;
            let whole = filled - filled % frame_bytes;
            unpack_le(&self.bytes[..whole], &self.spec, buffer.samples_mut())?;

            if whole != filled {
                tracing::warn!(dangling = filled - whole, "无头部PCM末尾存在不完整的帧");
                self.truncated = Some(filled - whole);
            }
            if filled < self.bytes.len() {
                break;
            }
            remaining -= chunk;
        }

        if buffer.is_empty() {
            if let Some(dangling) = self.truncated.take() {
                return Err(error::corrupt(format!(
                    "无头部PCM末尾存在不完整的帧({dangling}字节)"
                )));
            }
        }
        Ok(buffer)
    }

    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        if !self.stream.is_seekable() {
            return Err(error::unsupported("流不支持定位"));
        }
        if let Some(total) = self.spec.total_frames {
            if frame > total {
                return Err(error::invalid_argument(format!(
                    "定位帧({frame})超出总帧数({total})"
                )));
            }
        }
        let offset = frame * self.spec.bytes_per_frame() as u64;
        self.stream.seek(SeekFrom::Start(offset))?;
        self.truncated = None;
        Ok(())
    }
}

/// 无头部PCM编码器
pub struct RawEncoder {
    stream: AudioStream,
    spec: AudioSpec,
    bytes: Vec<u8>,
}

impl RawEncoder {
    pub fn open(stream: AudioStream, spec: &AudioSpec) -> AudioResult<Self> {
        spec.validate()?;
        Ok(Self {
            stream,
            spec: *spec,
            bytes: Vec::new(),
        })
    }

    pub fn write_frames(&mut self, buffer: &SampleBuffer) -> AudioResult<()> {
        self.bytes.clear();
        pack_le(buffer.samples(), &self.spec, &mut self.bytes)?;
        self.stream.write_all(&self.bytes)?;
        Ok(())
    }

    pub fn finalize(&mut self) -> AudioResult<()> {
        self.stream.flush()?;
        Ok(())
    }
}
