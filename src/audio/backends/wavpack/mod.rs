//! WavPack后端
//!
//! 块头与块内元数据在本库中解析，用于报告音频规格和定位；样本的压缩与
//! 解压交给外部FFmpeg进程（见 `ffmpeg` 子模块）。运行时找不到ffmpeg时，
//! 打开会话返回 `UnsupportedFormat`。
//!
//! 流由一系列块组成，每组块（INITIAL..FINAL）覆盖同一段时间内的全部声道。
//! 定位时扫描块头找到包含目标帧的块组，从该组起重新启动解码进程。

mod ffmpeg;
mod header;
mod metadata;

pub use self::ffmpeg::ffmpeg_available;

use self::ffmpeg::{PipeDecoder, PipeEncoder};
use self::header::{BLOCK_HEADER_LEN, BLOCK_MAGIC, BlockHeader};
use crate::audio::format::{AudioSpec, MAX_CHANNELS, MAX_PREALLOC_FRAMES, SampleBuffer, SampleFormat};
use crate::audio::sample_conversion::{pack_le, unpack_le};
use crate::audio::stream::{AudioStream, read_exact_or_eof};
use crate::error::{self, AudioResult};
use std::io::{Seek, SeekFrom, Write};

/// 解码进程输出的单个样本字节数（s32le / f32le）
const TRANSPORT_BYTES: usize = 4;

fn read_le(data: &[u8]) -> u32 {
    data.iter()
        .rev()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32)
}

/// 首个块组的概要
#[derive(Debug)]
struct GroupInfo {
    first: BlockHeader,
    channels: usize,
    sample_rate: u32,
}

/// 预读首个块组的块头与首块元数据，不推进流位置
fn peek_first_group(stream: &mut AudioStream) -> AudioResult<GroupInfo> {
    let mut offset = 0usize;
    let mut first: Option<BlockHeader> = None;
    let mut walked = 0usize;
    let mut declared: Option<usize> = None;
    let mut custom_rate: Option<u32> = None;

    loop {
        let peeked = stream.peek(offset + BLOCK_HEADER_LEN)?;
        let raw: [u8; BLOCK_HEADER_LEN] = peeked
            .get(offset..offset + BLOCK_HEADER_LEN)
            .and_then(|raw| raw.try_into().ok())
            .ok_or_else(|| error::malformed("WavPack块头被截断"))?;
        if &raw[..4] != BLOCK_MAGIC {
            return Err(error::malformed("WavPack块缺少wvpk标记"));
        }
        let header = BlockHeader::parse(&raw)?;
        header.check_supported()?;
        let body_start = offset + BLOCK_HEADER_LEN;
        let body_end = body_start + header.body_len();

        match first {
            None => {
                if !header.is_initial() {
                    return Err(error::malformed("WavPack流的第一个块不是起始块"));
                }
                let peeked = stream.peek(body_end)?;
                let body = peeked
                    .get(body_start..body_end)
                    .ok_or_else(|| error::malformed("WavPack首块数据被截断"))?;

                let mut has_audio = false;
                for sub in metadata::parse_sub_blocks(body)? {
                    match sub.function() {
                        metadata::ID_CHANNEL_INFO => {
                            declared = sub.data.first().map(|&count| count as usize);
                        }
                        metadata::ID_SAMPLE_RATE if (3..=4).contains(&sub.data.len()) => {
                            custom_rate = Some(read_le(sub.data));
                        }
                        metadata::ID_WV_BITSTREAM => has_audio = true,
                        _ => {}
                    }
                }
                if header.block_samples > 0 && !has_audio {
                    return Err(error::malformed("WavPack首块缺少音频数据"));
                }
                first = Some(header);
            }
            Some(first) => {
                if header.block_index != first.block_index
                    || header.block_samples != first.block_samples
                {
                    return Err(error::malformed("WavPack块组内的块时间范围不一致"));
                }
            }
        }

        walked += header.output_channels();
        if walked > MAX_CHANNELS as usize {
            return Err(error::unsupported("WavPack块组声道数超出上限"));
        }
        if header.is_final() {
            break;
        }
        offset = body_end;
    }

    let first = first.ok_or_else(|| error::malformed("WavPack流中没有音频块"))?;

    let channels = match declared {
        Some(declared) if first.block_samples > 0 && declared != walked => {
            return Err(error::malformed(format!(
                "WavPack声明{declared}个声道，但块组包含{walked}个"
            )));
        }
        Some(declared) => declared,
        None => walked,
    };

    let sample_rate = match header::SAMPLE_RATES.get(first.rate_index() as usize) {
        Some(&rate) => rate,
        None => custom_rate
            .ok_or_else(|| error::malformed("WavPack自定义采样率缺少SAMPLE_RATE元数据"))?,
    };

    Ok(GroupInfo {
        first,
        channels,
        sample_rate,
    })
}

/// 从 `start` 起扫描块头，找到包含 `frame` 的块组
///
/// 返回块组起点与组内需要丢弃的帧数；`frame` 恰好等于流末尾时返回 `None`。
fn locate_group(stream: &mut AudioStream, start: u64, frame: u64) -> AudioResult<Option<(u64, u64)>> {
    stream.seek(SeekFrom::Start(start))?;
    let mut end_of_stream = 0u64;

    loop {
        let group_start = stream.position();
        let mut raw = [0u8; BLOCK_HEADER_LEN];
        let filled = read_exact_or_eof(stream, &mut raw)?;
        if filled == 0 {
            if frame > end_of_stream {
                return Err(error::invalid_argument(format!(
                    "定位帧({frame})超出流末尾({end_of_stream})"
                )));
            }
            return Ok(None);
        }
        if filled < BLOCK_HEADER_LEN {
            return Err(error::corrupt("WavPack块头被截断"));
        }

        let header = BlockHeader::parse(&raw)?;
        let block_end = header.block_index + header.block_samples as u64;
        if header.is_initial() && frame < block_end {
            return Ok(Some((group_start, frame.saturating_sub(header.block_index))));
        }

        end_of_stream = end_of_stream.max(block_end);
        stream.seek(SeekFrom::Current(header.body_len() as i64))?;
    }
}

/// WavPack解码器
///
/// 解码进程在第一次读取时才启动。
pub struct WavPackDecoder {
    /// 解码进程运行期间由输入线程持有
    stream: Option<AudioStream>,
    spec: AudioSpec,
    transport: AudioSpec,
    data_start: u64,
    seekable: bool,
    process: Option<PipeDecoder>,
    /// 定位后需要丢弃的帧数（目标帧落在块组中间时）
    skip_frames: u64,
    finished: bool,
    bytes: Vec<u8>,
}

impl WavPackDecoder {
    pub fn open(mut stream: AudioStream) -> AudioResult<(Self, AudioSpec)> {
        let data_start = stream.position();
        let seekable = stream.is_seekable();
        let group = peek_first_group(&mut stream)?;
        let first = group.first;

        let sample_format = if first.is_float() {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        };
        let spec = AudioSpec {
            sample_rate: group.sample_rate,
            channels: group.channels as u16,
            bits_per_sample: (first.bytes_per_sample() * 8) as u16,
            sample_format,
            total_frames: first.total_samples,
        };
        spec.validate()?;
        ffmpeg::ensure_ffmpeg()?;

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            float = first.is_float(),
            frames = ?spec.total_frames,
            version = format_args!("0x{:x}", first.version),
            "打开WavPack流"
        );

        let transport = AudioSpec {
            bits_per_sample: 32,
            total_frames: None,
            ..spec
        };

        Ok((
            Self {
                stream: Some(stream),
                spec,
                transport,
                data_start,
                seekable,
                process: None,
                skip_frames: 0,
                finished: spec.total_frames == Some(0),
                bytes: Vec::new(),
            },
            spec,
        ))
    }

    fn launch(&mut self) -> AudioResult<()> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| error::corrupt("WavPack输入流已丢失"))?;
        let mut process = match PipeDecoder::start(self.spec.sample_format == SampleFormat::Float) {
            Ok(process) => process,
            Err(err) => {
                self.stream = Some(stream);
                return Err(err);
            }
        };
        process.feed(stream)?;
        tracing::trace!(skip = self.skip_frames, "启动WavPack解码进程");
        self.process = Some(process);
        Ok(())
    }

    /// 从解码进程读取最多 `frames` 帧到 `self.bytes`，返回完整帧数
    fn pull(&mut self, frames: usize) -> AudioResult<usize> {
        let frame_bytes = TRANSPORT_BYTES * self.spec.channels as usize;
        self.bytes.resize(frames * frame_bytes, 0);
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| error::corrupt("WavPack解码进程未启动"))?;
        let filled = process.read(&mut self.bytes)?;

        if filled < self.bytes.len() {
            let stream = process.finish()?;
            self.process = None;
            self.stream = Some(stream);
            self.finished = true;
            if filled % frame_bytes != 0 {
                return Err(error::corrupt("WavPack解码输出在帧中途结束"));
            }
        }
        Ok(filled / frame_bytes)
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        let mut buffer = SampleBuffer::with_capacity(self.spec.channels, max_frames);
        if self.finished {
            return Ok(buffer);
        }
        if self.process.is_none() {
            self.launch()?;
        }

        while self.skip_frames > 0 && !self.finished {
            let chunk = self.skip_frames.min(MAX_PREALLOC_FRAMES as u64) as usize;
            let got = self.pull(chunk)?;
            self.skip_frames -= got as u64;
        }

        let frame_bytes = TRANSPORT_BYTES * self.spec.channels as usize;
        let mut remaining = max_frames;
        while remaining > 0 && !self.finished {
            let got = self.pull(remaining.min(MAX_PREALLOC_FRAMES))?;
            unpack_le(&self.bytes[..got * frame_bytes], &self.transport, buffer.samples_mut())?;
            remaining -= got;
        }
        Ok(buffer)
    }

    /// 扫描块头定位到包含目标帧的块组，下一次读取时从该组重新解码
    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        if !self.seekable {
            return Err(error::unsupported("WavPack定位需要可定位的输入流"));
        }
        if let Some(total) = self.spec.total_frames {
            if frame > total {
                return Err(error::invalid_argument(format!(
                    "定位帧({frame})超出总帧数({total})"
                )));
            }
        }

        if let Some(mut process) = self.process.take() {
            self.stream = Some(process.abort()?);
        }
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| error::corrupt("WavPack输入流已丢失"))?;

        match locate_group(stream, self.data_start, frame)? {
            Some((group_start, skip)) => {
                stream.seek(SeekFrom::Start(group_start))?;
                self.skip_frames = skip;
                self.finished = false;
                tracing::trace!(target_frame = frame, group_start, skip, "WavPack定位完成");
            }
            None => {
                self.skip_frames = 0;
                self.finished = true;
            }
        }
        Ok(())
    }
}

/// 只有头部、不含样本的块，供零帧输出使用
fn header_only_block(spec: &AudioSpec, total: Option<u64>) -> Vec<u8> {
    let rate_index = header::sample_rate_index(spec.sample_rate);
    let mut flags = (spec.bytes_per_sample() as u32 - 1)
        | (rate_index << header::SRATE_LSB)
        | header::INITIAL_BLOCK
        | header::FINAL_BLOCK;
    if spec.channels == 1 {
        flags |= header::MONO_FLAG;
    }
    if spec.sample_format == SampleFormat::Float {
        flags |= header::FLOAT_DATA;
    }

    let mut body = Vec::new();
    if spec.channels > 2 {
        let mut info = vec![spec.channels as u8];
        info.extend_from_slice(&0u32.to_le_bytes());
        metadata::write_sub_block(&mut body, metadata::ID_CHANNEL_INFO, &info);
    }
    if rate_index == header::CUSTOM_RATE_INDEX {
        metadata::write_sub_block(
            &mut body,
            metadata::ID_SAMPLE_RATE,
            &spec.sample_rate.to_le_bytes()[..3],
        );
    }

    let block = BlockHeader {
        ck_size: (BLOCK_HEADER_LEN - 8 + body.len()) as u32,
        version: header::STREAM_VERSION,
        total_samples: total,
        block_index: 0,
        block_samples: 0,
        flags,
        crc: u32::MAX,
    };
    let mut out = Vec::with_capacity(BLOCK_HEADER_LEN + body.len());
    block.write(&mut out);
    out.extend_from_slice(&body);
    out
}

/// WavPack编码器
///
/// 样本以小端PCM写入ffmpeg，生成的块由后台线程写入输出流。输出流可定位时
/// 在 `finalize` 中回填首块的总帧数，否则使用规格中声明的帧数或"未知"。
pub struct WavPackEncoder {
    process: Option<PipeEncoder>,
    spec: AudioSpec,
    seekable: bool,
    declared_total: Option<u64>,
    frames_written: u64,
    bytes: Vec<u8>,
}

impl WavPackEncoder {
    pub fn open(stream: AudioStream, spec: &AudioSpec) -> AudioResult<Self> {
        spec.validate()?;
        let seekable = stream.is_seekable();
        let declared_total = if seekable { None } else { spec.total_frames };
        let process = PipeEncoder::start(stream, spec, declared_total)?;

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            seekable,
            "WavPack编码进程已启动"
        );

        Ok(Self {
            process: Some(process),
            spec: *spec,
            seekable,
            declared_total,
            frames_written: 0,
            bytes: Vec::new(),
        })
    }

    pub fn write_frames(&mut self, buffer: &SampleBuffer) -> AudioResult<()> {
        self.bytes.clear();
        pack_le(buffer.samples(), &self.spec, &mut self.bytes)?;
        self.process
            .as_mut()
            .ok_or_else(|| error::invalid_argument("WavPack编码已完成"))?
            .write(&self.bytes)?;
        self.frames_written += buffer.frames() as u64;
        Ok(())
    }

    pub fn finalize(&mut self) -> AudioResult<()> {
        let mut process = self
            .process
            .take()
            .ok_or_else(|| error::invalid_argument("WavPack编码已完成"))?;

        let mut stream = if self.frames_written == 0 {
            // 零帧时ffmpeg不产生任何块，直接写出只有头部的块
            let mut stream = process.abort()?;
            stream.write_all(&header_only_block(&self.spec, Some(0)))?;
            stream
        } else {
            let (mut stream, first_block) = process.finish()?;
            let first = first_block.ok_or_else(|| error::corrupt("FFmpeg没有输出任何WavPack块"))?;
            if self.seekable {
                let end = stream.position();
                let (total_u8, total) = header::split_total(Some(self.frames_written));
                stream.seek(SeekFrom::Start(first + 11))?;
                stream.write_all(&[total_u8])?;
                stream.write_all(&total.to_le_bytes())?;
                stream.seek(SeekFrom::Start(end))?;
            } else if let Some(declared) = self.declared_total {
                if declared != self.frames_written {
                    tracing::warn!(
                        declared,
                        written = self.frames_written,
                        "WavPack输出不可定位，块头中的总帧数与实际写入不符"
                    );
                }
            }
            stream
        };

        stream.flush()?;
        tracing::trace!(frames = self.frames_written, "WavPack编码完成");
        Ok(())
    }
}
