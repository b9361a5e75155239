//! 后端适配层
//!
//! 每个格式一个适配器，按Cargo特性编译。会话层只通过下面两个封闭枚举
//! 与后端交互：选定后端之后不会再切换或回退。

#[cfg(feature = "flac")]
pub mod flac;
#[cfg(feature = "mp3")]
pub mod mp3;
pub mod raw;
#[cfg(any(feature = "flac", feature = "mp3"))]
mod symphonia_glue;
#[cfg(feature = "wav")]
pub mod wav;
#[cfg(feature = "wavpack")]
pub mod wavpack;

use super::detect::FormatTag;
use super::format::{AudioSpec, SampleBuffer};
use super::stream::AudioStream;
use crate::error::{self, AudioError, AudioResult};

fn not_compiled(tag: FormatTag) -> AudioError {
    match tag {
        FormatTag::Unknown => AudioError::UnsupportedFormat("无法识别的音频格式".to_string()),
        other => AudioError::UnsupportedFormat(format!("{other}后端未编译进本库")),
    }
}

/// 已打开的解码后端
pub enum DecoderBackend {
    #[cfg(feature = "wav")]
    Wav(wav::WavDecoder),
    #[cfg(feature = "flac")]
    Flac(flac::FlacDecoder),
    #[cfg(feature = "mp3")]
    Mp3(mp3::Mp3Decoder),
    #[cfg(feature = "wavpack")]
    WavPack(wavpack::WavPackDecoder),
    Raw(raw::RawDecoder),
}

impl DecoderBackend {
    /// 为已确定的格式创建解码器并解析头部
    ///
    /// `raw_spec` 只对无头部PCM有意义。
    pub fn open(
        tag: FormatTag,
        stream: AudioStream,
        raw_spec: Option<&AudioSpec>,
    ) -> AudioResult<(Self, AudioSpec)> {
        match tag {
            #[cfg(feature = "wav")]
            FormatTag::Wav => wav::WavDecoder::open(stream).map(|(d, spec)| (Self::Wav(d), spec)),
            #[cfg(feature = "flac")]
            FormatTag::Flac => {
                flac::FlacDecoder::open(stream).map(|(d, spec)| (Self::Flac(d), spec))
            }
            #[cfg(feature = "mp3")]
            FormatTag::Mp3 => mp3::Mp3Decoder::open(stream).map(|(d, spec)| (Self::Mp3(d), spec)),
            #[cfg(feature = "wavpack")]
            FormatTag::WavPack => {
                wavpack::WavPackDecoder::open(stream).map(|(d, spec)| (Self::WavPack(d), spec))
            }
            FormatTag::Raw => {
                let spec = raw_spec
                    .ok_or_else(|| error::invalid_argument("无头部PCM需要调用方提供音频规格"))?;
                raw::RawDecoder::open(stream, spec).map(|(d, spec)| (Self::Raw(d), spec))
            }
            #[allow(unreachable_patterns)]
            other => Err(not_compiled(other)),
        }
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        match self {
            #[cfg(feature = "wav")]
            Self::Wav(d) => d.read_frames(max_frames),
            #[cfg(feature = "flac")]
            Self::Flac(d) => d.read_frames(max_frames),
            #[cfg(feature = "mp3")]
            Self::Mp3(d) => d.read_frames(max_frames),
            #[cfg(feature = "wavpack")]
            Self::WavPack(d) => d.read_frames(max_frames),
            Self::Raw(d) => d.read_frames(max_frames),
        }
    }

    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        match self {
            #[cfg(feature = "wav")]
            Self::Wav(d) => d.seek_to_frame(frame),
            #[cfg(feature = "flac")]
            Self::Flac(d) => d.seek_to_frame(frame),
            #[cfg(feature = "mp3")]
            Self::Mp3(d) => d.seek_to_frame(frame),
            #[cfg(feature = "wavpack")]
            Self::WavPack(d) => d.seek_to_frame(frame),
            Self::Raw(d) => d.seek_to_frame(frame),
        }
    }
}

/// 已打开的编码后端
pub enum EncoderBackend {
    #[cfg(feature = "wav")]
    Wav(wav::WavEncoder),
    #[cfg(feature = "wavpack")]
    WavPack(wavpack::WavPackEncoder),
    Raw(raw::RawEncoder),
}

impl EncoderBackend {
    pub fn open(tag: FormatTag, stream: AudioStream, spec: &AudioSpec) -> AudioResult<Self> {
        match tag {
            #[cfg(feature = "wav")]
            FormatTag::Wav => wav::WavEncoder::open(stream, spec).map(Self::Wav),
            #[cfg(feature = "wavpack")]
            FormatTag::WavPack => wavpack::WavPackEncoder::open(stream, spec).map(Self::WavPack),
            FormatTag::Raw => raw::RawEncoder::open(stream, spec).map(Self::Raw),
            FormatTag::Flac | FormatTag::Mp3 if tag.is_enabled() => Err(error::unsupported(
                format!("{tag}后端只支持解码"),
            )),
            #[allow(unreachable_patterns)]
            other => Err(not_compiled(other)),
        }
    }

    pub fn write_frames(&mut self, buffer: &SampleBuffer) -> AudioResult<()> {
        match self {
            #[cfg(feature = "wav")]
            Self::Wav(e) => e.write_frames(buffer),
            #[cfg(feature = "wavpack")]
            Self::WavPack(e) => e.write_frames(buffer),
            Self::Raw(e) => e.write_frames(buffer),
        }
    }

    pub fn finalize(&mut self) -> AudioResult<()> {
        match self {
            #[cfg(feature = "wav")]
            Self::Wav(e) => e.finalize(),
            #[cfg(feature = "wavpack")]
            Self::WavPack(e) => e.finalize(),
            Self::Raw(e) => e.finalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_reports_unrecognized_format() {
        let err = not_compiled(FormatTag::Unknown);
        assert!(matches!(&err, AudioError::UnsupportedFormat(msg) if msg.contains("无法识别")));

        let stream = AudioStream::from_bytes(vec![0u8; 64]);
        let err = DecoderBackend::open(FormatTag::Unknown, stream, None).err();
        assert!(matches!(err, Some(AudioError::UnsupportedFormat(_))));

        let spec = AudioSpec::new(44_100, 2, 16);
        let err = EncoderBackend::open(FormatTag::Unknown, AudioStream::from_bytes(Vec::new()), &spec).err();
        assert!(matches!(err, Some(AudioError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_backend_names_the_format() {
        for tag in [FormatTag::Wav, FormatTag::Flac, FormatTag::Mp3, FormatTag::WavPack] {
            let err = not_compiled(tag);
            assert!(
                matches!(&err, AudioError::UnsupportedFormat(msg) if msg.contains(tag.name())),
                "{tag}: {err}"
            );
        }
    }

    #[test]
    fn decode_only_backends_refuse_encoding() {
        let spec = AudioSpec::new(44_100, 2, 16);
        for tag in [FormatTag::Flac, FormatTag::Mp3] {
            let err = EncoderBackend::open(tag, AudioStream::from_bytes(Vec::new()), &spec).err();
            assert!(matches!(
                err,
                Some(AudioError::Unsupported(_)) | Some(AudioError::UnsupportedFormat(_))
            ));
        }
    }
}
