//! audioport: 统一的多格式音频文件读写库
//!
//! 通过同一套API读写 FLAC、MP3、WAV 和 WavPack，后端在编译时按Cargo特性选择。
//!
//! ## 核心特性
//! - 按头部魔数检测格式，检测无结论时才使用扩展名提示
//! - 封闭的后端枚举：WAV（hound）、FLAC/MP3（symphonia）、WavPack（外部FFmpeg进程）、无头部PCM
//! - 统一的交错 f32 样本表示，位宽/布局转换只发生在后端边界
//! - 会话状态机：失败后粘滞，重复返回原始错误
//! - 文件、共享内存和回调三种流来源，后端只看到 `AudioStream`
//!
//! ```no_run
//! use audioport::{DecodeSession, EncodeSession, FormatTag};
//!
//! # fn main() -> audioport::AudioResult<()> {
//! let mut input = DecodeSession::open_path("input.flac")?;
//! let spec = *input.spec();
//! let mut output = EncodeSession::create_path("output.wv", FormatTag::WavPack, spec)?;
//! loop {
//!     let chunk = input.read_frames(4096)?;
//!     if chunk.is_empty() {
//!         break;
//!     }
//!     output.write_frames(&chunk)?;
//! }
//! output.finalize()?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod error;
pub mod info;
pub mod tools;

// 重新导出核心类型
pub use audio::{
    AudioSpec, AudioStream, CallbackSource, DecodeOptions, DecodeSession, EncodeSession,
    FormatHint, FormatTag, MemoryBuffer, SampleBuffer, SampleFormat, SessionState,
    StreamCapabilities, StreamSource, detect_format, probe, read_file, write_file,
};
pub use error::{AudioError, AudioResult, ErrorCategory};
pub use info::{LibraryInfo, library_info, supported_formats};
