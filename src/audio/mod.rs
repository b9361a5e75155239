//! 音频读写模块
//!
//! 提供多格式音频的解码与编码支持。
//!
//! **使用 `DecodeSession` / `EncodeSession`** - 统一会话入口，按检测结果选择后端

// 内部子模块
#[cfg(any(feature = "flac", feature = "mp3"))]
mod error_handling;
mod sample_conversion;

pub mod backends;
pub mod detect;
pub mod format;
pub mod session;
pub mod stream;

#[cfg(feature = "wavpack")]
pub use backends::wavpack::ffmpeg_available;
pub use detect::{DETECT_PEEK_LEN, FormatHint, FormatTag, detect_format, sniff_magic};
pub use format::{
    AudioSpec, MAX_CHANNELS, MAX_SAMPLE_RATE, SampleBuffer, SampleFormat, deinterleave,
    interleave,
};
pub use sample_conversion::{f32_to_int, int_to_f32};
pub use session::{
    DEFAULT_CHUNK_FRAMES, DecodeOptions, DecodeSession, EncodeSession, SessionState, probe,
    read_file, write_file,
};
pub use stream::{AudioStream, CallbackSource, MemoryBuffer, StreamCapabilities, StreamSource};
