//! FLAC后端
//!
//! 解码委托给symphonia；流标记由本后端先行校验，损坏的标记在产生任何
//! 音频规格之前就以 `Malformed` 失败。FLAC编码不在支持范围内。

use super::symphonia_glue::SymphoniaDecoder;
use crate::audio::format::{AudioSpec, SampleBuffer, SampleFormat};
use crate::audio::stream::AudioStream;
use crate::error::{self, AudioResult};

/// FLAC流标记
pub const FLAC_STREAM_MARKER: &[u8; 4] = b"fLaC";

/// FLAC解码器
pub struct FlacDecoder {
    inner: SymphoniaDecoder,
}

impl FlacDecoder {
    pub fn open(mut stream: AudioStream) -> AudioResult<(Self, AudioSpec)> {
        let marker = stream.peek(FLAC_STREAM_MARKER.len())?;
        if marker != FLAC_STREAM_MARKER {
            return Err(error::malformed(format!(
                "FLAC流标记损坏: {marker:02x?}"
            )));
        }

        let (inner, spec) = SymphoniaDecoder::open(stream, "FLAC", "flac", SampleFormat::Int)?;
        Ok((Self { inner }, spec))
    }

    pub fn read_frames(&mut self, max_frames: usize) -> AudioResult<SampleBuffer> {
        self.inner.read_frames(max_frames)
    }

    pub fn seek_to_frame(&mut self, frame: u64) -> AudioResult<()> {
        self.inner.seek_to_frame(frame)
    }
}
