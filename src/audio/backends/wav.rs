//! WAV后端
//!
//! 基于hound库读写RIFF/WAVE（PCM、IEEE浮点以及WAVE_FORMAT_EXTENSIBLE）。

use crate::audio::format::{AudioSpec, SampleBuffer, SampleFormat};
use crate::audio::sample_conversion::{f32_to_int, int_to_f32};
use crate::audio::stream::AudioStream;
use crate::error::{self, AudioError, AudioResult};
use std::io::{self, BufWriter};

/// hound错误中的截断读取视为数据损坏而不是I/O失败
fn map_read_error(err: hound::Error) -> AudioError {
    match err {
        hound::Error::IoError(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            error::corrupt("WAV数据块被截断")
        }
        other => AudioError::from(other),
    }
}

fn spec_from_hound(spec: hound::WavSpec, total_frames: u64) -> AudioSpec {
    AudioSpec {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        sample_format: match spec.sample_format {
            hound::SampleFormat::Int => SampleFormat::Int,
            hound::SampleFormat::Float => SampleFormat::Float,
        },
        total_frames: Some(total_frames),
    }
}

/// WAV解码器
pub struct WavDecoder {
    reader: hound::WavReader<AudioStream>,
    spec: AudioSpec,
    seekable: bool,
}

impl WavDecoder {
    /// 解析RIFF头并返回音频规格
    pub fn open(stream: AudioStream) -> AudioResult<(Self, AudioSpec)> {
        let seekable = stream.is_seekable();
        let reader = hound::WavReader::new(stream).map_err(map_read_error)?;
        let spec = spec_from_hound(reader.spec(), reader.duration() as u64);
        spec.validate()?;

        if spec.sample_format == SampleFormat::Float && spec.bits_per_sample != 32 {
            return Err(error::unsupported(format!(
                "WAV: 不支持{}位浮点",
                spec.bits_per_sample
            )));
        }

        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            frames = reader.duration(),
            "打开WAV流"
        );

        Ok((
            Self {
                reader,
                spec,
                seekable,
            },
            spec,
        ))
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        let channels = self.spec.channels as usize;
        let wanted = max_frames.saturating_mul(channels);
        let mut buffer = SampleBuffer::with_capacity(self.spec.channels, max_frames);
        let out = buffer.samples_mut();

        match self.spec.sample_format {
            SampleFormat::Int => {
                let bits = self.spec.bits_per_sample;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    out.push(int_to_f32(sample.map_err(map_read_error)?, bits));
                }
            }
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    out.push(sample.map_err(map_read_error)?);
                }
            }
        }

        if out.len() % channels != 0 {
            return Err(error::corrupt("WAV数据块在帧中途结束"));
        }

        Ok(buffer)
    }

    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        if !self.seekable {
            return Err(error::unsupported("WAV: 输入流不支持定位"));
        }
        let total = self.reader.duration() as u64;
        if frame > total {
            return Err(error::invalid_argument(format!(
                "定位帧({frame})超出总帧数({total})"
            )));
        }
        self.reader.seek(frame as u32)?;
        Ok(())
    }
}

/// WAV编码器
///
/// RIFF头中的长度字段在 `finalize` 时回填，因此输出流必须可定位。
pub struct WavEncoder {
    writer: Option<hound::WavWriter<BufWriter<AudioStream>>>,
    spec: AudioSpec,
}

impl WavEncoder {
    pub fn open(stream: AudioStream, spec: &AudioSpec) -> AudioResult<Self> {
        if !stream.is_seekable() {
            return Err(error::unsupported(
                "WAV编码需要可定位的输出流以回填长度字段",
            ));
        }

        let sample_format = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 8 | 16 | 24 | 32) => hound::SampleFormat::Int,
            (SampleFormat::Float, 32) => hound::SampleFormat::Float,
            (format, bits) => {
                return Err(error::unsupported(format!(
                    "WAV无法表示 {format:?} {bits}位样本"
                )));
            }
        };

        let wav_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format,
        };
        let writer = hound::WavWriter::new(BufWriter::new(stream), wav_spec)?;

        Ok(Self {
            writer: Some(writer),
            spec: *spec,
        })
    }

    pub fn write_frames(&mut self, buffer: &SampleBuffer) -> AudioResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| error::invalid_argument("WAV编码器已完成"))?;

        match self.spec.sample_format {
            SampleFormat::Int => {
                let bits = self.spec.bits_per_sample;
                for &sample in buffer.samples() {
                    writer.write_sample(f32_to_int(sample, bits))?;
                }
            }
            SampleFormat::Float => {
                for &sample in buffer.samples() {
                    writer.write_sample(sample)?;
                }
            }
        }
        Ok(())
    }

    /// 回填RIFF/data长度并刷新
    pub fn finalize(&mut self) -> AudioResult<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| error::invalid_argument("WAV编码器已完成"))?;
        writer.finalize()?;
        Ok(())
    }
}
