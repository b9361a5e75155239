//! symphonia解码公共层
//!
//! FLAC和MP3后端共享的探测、逐包解码与定位逻辑。解码得到的包按需拆分，
//! 使每次 `read_frames` 返回的帧数不超过调用方的上限。

use crate::audio::error_handling::handle_symphonia_error;
use crate::audio::format::{AudioSpec, SampleBuffer, SampleFormat};
use crate::audio::sample_conversion::append_symphonia_buffer;
use crate::audio::stream::AudioStream;
use crate::error::{self, AudioError, AudioResult};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// 基于symphonia的流式解码器
pub struct SymphoniaDecoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    /// 已解码但尚未交给调用方的交错样本
    pending: Vec<f32>,
    /// 定位后需要丢弃的帧数（精确定位落在包中间时）
    discard_frames: u64,
    finished: bool,
    seekable: bool,
}

/// 探测阶段的错误一律视为头部错误（I/O失败除外）
fn probe_error(codec: &str, err: SymphoniaError) -> AudioError {
    match err {
        SymphoniaError::IoError(e) if e.kind() != std::io::ErrorKind::UnexpectedEof => {
            AudioError::from(e)
        }
        other => error::format_error(&format!("{codec}头部解析失败"), other),
    }
}

impl SymphoniaDecoder {
    /// 探测流并创建解码器
    ///
    /// `extension` 作为探测提示；`native_format` 决定报告给调用方的样本表示。
    pub fn open(
        stream: AudioStream,
        codec: &str,
        extension: &str,
        native_format: SampleFormat,
    ) -> AudioResult<(Self, AudioSpec)> {
        let seekable = stream.is_seekable();
        let mss = MediaSourceStream::new(Box::new(stream), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(extension);

        let meta_opts = MetadataOptions::default();
        let fmt_opts = FormatOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| probe_error(codec, e))?;

        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| error::malformed(format!("{codec}: 未找到音频轨道")))?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| error::malformed(format!("{codec}: 缺少采样率")))?;
        let channels = codec_params
            .channels
            .map(|ch| ch.count())
            .ok_or_else(|| error::malformed(format!("{codec}: 无法获取声道数信息")))?
            as u16;

        let bits_per_sample = match native_format {
            SampleFormat::Int => codec_params
                .bits_per_sample
                .ok_or_else(|| error::malformed(format!("{codec}: 缺少位深度")))?
                as u16,
            SampleFormat::Float => 32,
        };

        let spec = AudioSpec {
            sample_rate,
            channels,
            bits_per_sample,
            sample_format: native_format,
            total_frames: codec_params.n_frames,
        };
        spec.validate()?;

        let dec_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &dec_opts)
            .map_err(AudioError::from)?;

        tracing::debug!(
            codec,
            sample_rate,
            channels,
            bits = bits_per_sample,
            frames = ?spec.total_frames,
            "symphonia解码器就绪"
        );

        Ok((
            Self {
                format_reader,
                decoder,
                track_id,
                channels,
                pending: Vec::new(),
                discard_frames: 0,
                finished: false,
                seekable,
            },
            spec,
        ))
    }

    /// 解码下一个包并追加到待交付样本；流结束时返回 `false`
    fn decode_next_packet(&mut self) -> AudioResult<bool> {
        loop {
            let Some(packet) = handle_symphonia_error!(self.format_reader.next_packet()) else {
                return Ok(false);
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let Some(decoded) = handle_symphonia_error!(self.decoder.decode(&packet)) else {
                return Ok(false);
            };

            let decoded_channels = decoded.spec().channels.count();
            if decoded_channels != self.channels as usize {
                return Err(error::corrupt(format!(
                    "解码出的声道数({decoded_channels})与流头部({})不一致",
                    self.channels
                )));
            }

            let start = self.pending.len();
            append_symphonia_buffer(&decoded, &mut self.pending);

            if self.discard_frames > 0 {
                let available = ((self.pending.len() - start) / self.channels as usize) as u64;
                let drop_frames = self.discard_frames.min(available);
                let drop_samples = drop_frames as usize * self.channels as usize;
                self.pending.drain(start..start + drop_samples);
                self.discard_frames -= drop_frames;
            }
            return Ok(true);
        }
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        let channels = self.channels as usize;
        let wanted = max_frames.saturating_mul(channels);

        while self.pending.len() < wanted && !self.finished {
            if !self.decode_next_packet()? {
                self.finished = true;
            }
        }

        let take = wanted.min(self.pending.len());
        let samples: Vec<f32> = self.pending.drain(..take).collect();
        SampleBuffer::from_interleaved(self.channels, samples)
    }

    /// 精确定位到指定帧
    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        if !self.seekable {
            return Err(error::unsupported("输入流不支持定位"));
        }
        let seeked = self
            .format_reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(AudioError::from)?;

        self.decoder.reset();
        self.pending.clear();
        self.finished = false;
        self.discard_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);

        tracing::trace!(
            target_frame = frame,
            actual = seeked.actual_ts,
            discard = self.discard_frames,
            "symphonia定位完成"
        );
        Ok(())
    }
}
