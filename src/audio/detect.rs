//! 格式检测模块
//!
//! 通过预读流的头部字节识别格式，字节检测无结论时才退回到扩展名提示。
//! 检测不会消耗流的读取位置。

use super::stream::AudioStream;
use crate::error::{AudioError, AudioResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// 判断格式所需的最少头部字节数（RIFF....WAVE）
pub const DETECT_PEEK_LEN: usize = 12;

/// 格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    Flac,
    Mp3,
    Wav,
    WavPack,
    /// 无头部的交错PCM，只能通过显式提示选择，需要调用方提供规格
    Raw,
    Unknown,
}

impl FormatTag {
    /// 所有具体格式（不含 `Unknown`）
    pub const ALL: [FormatTag; 5] = [
        FormatTag::Wav,
        FormatTag::Mp3,
        FormatTag::Flac,
        FormatTag::WavPack,
        FormatTag::Raw,
    ];

    /// 根据文件扩展名（不区分大小写，可带前导点）得到格式标签
    pub fn from_extension(ext: &str) -> FormatTag {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" | "wave" => FormatTag::Wav,
            "flac" => FormatTag::Flac,
            "mp3" => FormatTag::Mp3,
            "wv" => FormatTag::WavPack,
            "bin" | "raw" | "pcm" => FormatTag::Raw,
            _ => FormatTag::Unknown,
        }
    }

    /// 该格式的规范扩展名
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            FormatTag::Wav => Some("wav"),
            FormatTag::Flac => Some("flac"),
            FormatTag::Mp3 => Some("mp3"),
            FormatTag::WavPack => Some("wv"),
            FormatTag::Raw => Some("bin"),
            FormatTag::Unknown => None,
        }
    }

    /// 对应后端是否在编译时启用
    pub fn is_enabled(&self) -> bool {
        match self {
            FormatTag::Wav => cfg!(feature = "wav"),
            FormatTag::Flac => cfg!(feature = "flac"),
            FormatTag::Mp3 => cfg!(feature = "mp3"),
            FormatTag::WavPack => cfg!(feature = "wavpack"),
            FormatTag::Raw => true,
            FormatTag::Unknown => false,
        }
    }

    /// 是否支持编码
    pub fn can_encode(&self) -> bool {
        matches!(self, FormatTag::Wav | FormatTag::WavPack | FormatTag::Raw) && self.is_enabled()
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatTag::Flac => "FLAC",
            FormatTag::Mp3 => "MP3",
            FormatTag::Wav => "WAV",
            FormatTag::WavPack => "WavPack",
            FormatTag::Raw => "Raw PCM",
            FormatTag::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 调用方提供的格式提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatHint {
    /// 文件扩展名（不含点）
    Extension(String),
    /// 明确指定的格式
    Tag(FormatTag),
}

impl FormatHint {
    /// 从路径的扩展名构造提示
    pub fn from_path(path: &Path) -> Option<FormatHint> {
        path.extension()
            .map(|ext| FormatHint::Extension(ext.to_string_lossy().into_owned()))
    }

    pub fn tag(&self) -> FormatTag {
        match self {
            FormatHint::Extension(ext) => FormatTag::from_extension(ext),
            FormatHint::Tag(tag) => *tag,
        }
    }
}

/// 仅凭头部字节识别格式；无结论时返回 `None`
pub fn sniff_magic(header: &[u8]) -> Option<FormatTag> {
    if header.len() >= 12
        && (&header[0..4] == b"RIFF" || &header[0..4] == b"RF64")
        && &header[8..12] == b"WAVE"
    {
        return Some(FormatTag::Wav);
    }
    if header.starts_with(b"fLaC") {
        return Some(FormatTag::Flac);
    }
    if header.starts_with(b"wvpk") {
        return Some(FormatTag::WavPack);
    }
    if header.starts_with(b"ID3") || is_mpeg_layer3_sync(header) {
        return Some(FormatTag::Mp3);
    }
    None
}

/// MPEG音频帧同步字 + Layer III + 合法的码率/采样率索引
fn is_mpeg_layer3_sync(header: &[u8]) -> bool {
    if header.len() < 4 {
        return false;
    }
    let (b1, b2) = (header[1], header[2]);
    let sync = header[0] == 0xFF && (b1 & 0xE0) == 0xE0;
    let version = (b1 >> 3) & 0x03;
    let layer = (b1 >> 1) & 0x03;
    let bitrate_index = b2 >> 4;
    let rate_index = (b2 >> 2) & 0x03;
    sync && version != 0x01 && layer == 0x01 && bitrate_index != 0x0F && rate_index != 0x03
}

/// 检测流的格式
///
/// - 可读字节少于 [`DETECT_PEEK_LEN`] 或流不可读 → `DetectionFailed`
/// - 字节检测无结论 → 使用提示；无提示 → `FormatTag::Unknown`
///
/// 返回后流的逻辑位置保持不变。
pub fn detect_format(stream: &mut AudioStream, hint: Option<&FormatHint>) -> AudioResult<FormatTag> {
    let header = stream
        .peek(DETECT_PEEK_LEN)
        .map_err(|e| AudioError::DetectionFailed(format!("无法读取头部: {e}")))?;

    if header.len() < DETECT_PEEK_LEN {
        return Err(AudioError::DetectionFailed(format!(
            "流过短（{}字节），不足以包含格式头部",
            header.len()
        )));
    }

    if let Some(tag) = sniff_magic(header) {
        tracing::debug!(format = %tag, "通过魔数识别格式");
        return Ok(tag);
    }

    let fallback = hint.map(FormatHint::tag).unwrap_or(FormatTag::Unknown);
    tracing::debug!(format = %fallback, "魔数无结论，使用扩展名提示");
    Ok(fallback)
}
