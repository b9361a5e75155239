//! MP3后端
//!
//! MPEG-1/2 Layer III 解码委托给symphonia，输出为32位浮点。
//! 有损格式的解码结果以symphonia的输出为准。MP3编码不在支持范围内。

use super::symphonia_glue::SymphoniaDecoder;
use crate::audio::format::{AudioSpec, SampleBuffer, SampleFormat};
use crate::audio::stream::AudioStream;
use crate::error::AudioResult;

/// MP3解码器
pub struct Mp3Decoder {
    inner: SymphoniaDecoder,
}

impl Mp3Decoder {
    pub fn open(stream: AudioStream) -> AudioResult<(Self, AudioSpec)> {
        let (inner, spec) = SymphoniaDecoder::open(stream, "MP3", "mp3", SampleFormat::Float)?;
        Ok((Self { inner }, spec))
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        self.inner.read_frames(max_frames)
    }

    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        self.inner.seek_to_frame(frame)
    }
}
