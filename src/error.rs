//! 统一错误处理框架
//!
//! 所有后端（hound、symphonia、外部FFmpeg进程）和流层的错误都归一化为
//! [`AudioError`]，通过 [`AudioResult`] 显式返回，不做静默吞掉或自动重试。

use std::fmt;
use std::io;
use std::sync::Arc;

/// 音频读写相关的统一错误类型
///
/// 实现 `Clone`，以便失败的会话可以重复返回同一个原始错误。
#[derive(Debug, Clone)]
pub enum AudioError {
    /// 没有匹配的后端，或对应后端在编译时被关闭
    UnsupportedFormat(String),

    /// 头部字段不一致或缺失（如声道数为0、魔数损坏）
    Malformed(String),

    /// 流内容在解码过程中被后端判定为损坏
    CorruptData(String),

    /// 底层流读写失败
    Io(Arc<io::Error>),

    /// 调用方违反前置条件
    InvalidArgument(String),

    /// 后端无法表达请求的特性或规格
    Unsupported(String),

    /// 流不可读或过短，无法判断格式（区别于"未知格式"）
    DetectionFailed(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::UnsupportedFormat(msg) => write!(f, "不支持的音频格式: {msg}"),
            AudioError::Malformed(msg) => write!(f, "音频头部格式错误: {msg}"),
            AudioError::CorruptData(msg) => write!(f, "音频数据损坏: {msg}"),
            AudioError::Io(err) => write!(f, "流I/O错误: {err}"),
            AudioError::InvalidArgument(msg) => write!(f, "参数无效: {msg}"),
            AudioError::Unsupported(msg) => write!(f, "后端不支持: {msg}"),
            AudioError::DetectionFailed(msg) => write!(f, "格式检测失败: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AudioError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for AudioError {
    fn from(err: io::Error) -> Self {
        AudioError::Io(Arc::new(err))
    }
}

#[cfg(feature = "wav")]
impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => AudioError::from(e),
            hound::Error::FormatError(msg) => AudioError::Malformed(format!("WAV: {msg}")),
            hound::Error::TooWide => {
                AudioError::Unsupported("WAV: 样本位宽超出目标类型".to_string())
            }
            hound::Error::UnfinishedSample => {
                AudioError::CorruptData("WAV: 数据块在样本中途结束".to_string())
            }
            hound::Error::Unsupported => AudioError::Unsupported("WAV: 不支持的子格式".to_string()),
            hound::Error::InvalidSampleFormat => {
                AudioError::Unsupported("WAV: 无效的样本格式".to_string())
            }
        }
    }
}

#[cfg(any(feature = "flac", feature = "mp3"))]
impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::{Error as SymphoniaError, SeekErrorKind};
        match err {
            SymphoniaError::IoError(e) => AudioError::from(e),
            SymphoniaError::DecodeError(msg) => AudioError::CorruptData(msg.to_string()),
            SymphoniaError::Unsupported(msg) => AudioError::Unsupported(msg.to_string()),
            SymphoniaError::SeekError(kind) => match kind {
                SeekErrorKind::Unseekable | SeekErrorKind::ForwardOnly => {
                    AudioError::Unsupported(format!("流不支持定位: {kind:?}"))
                }
                _ => AudioError::InvalidArgument(format!("定位失败: {kind:?}")),
            },
            SymphoniaError::LimitError(msg) => AudioError::Unsupported(msg.to_string()),
            SymphoniaError::ResetRequired => {
                AudioError::Unsupported("流中途改变了编码参数".to_string())
            }
        }
    }
}

/// 音频处理操作的标准Result类型
pub type AudioResult<T> = Result<T, AudioError>;

// ==================== 错误转换Helper函数 ====================
// 消除重复的 AudioError::XXX(format!(...)) 模式

/// 创建头部格式错误
#[inline]
pub fn malformed(msg: impl Into<String>) -> AudioError {
    AudioError::Malformed(msg.into())
}

/// 创建数据损坏错误
#[inline]
pub fn corrupt(msg: impl Into<String>) -> AudioError {
    AudioError::CorruptData(msg.into())
}

/// 创建后端不支持错误
#[inline]
pub fn unsupported(msg: impl Into<String>) -> AudioError {
    AudioError::Unsupported(msg.into())
}

/// 创建参数无效错误
#[inline]
pub fn invalid_argument(msg: impl Into<String>) -> AudioError {
    AudioError::InvalidArgument(msg.into())
}

/// 带上下文的格式错误
#[inline]
pub fn format_error<E: fmt::Display>(context: &str, err: E) -> AudioError {
    AudioError::Malformed(format!("{context}: {err}"))
}

// ==================== 错误分类系统 ====================
// 用于命令行的退出码和批量统计

/// 错误类别枚举
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ErrorCategory {
    /// 格式相关错误（不支持的格式、头部损坏、检测失败等）
    Format,
    /// 解码相关错误（数据损坏、后端不支持的特性）
    Decoding,
    /// I/O相关错误（文件不存在、权限不足等）
    Io,
    /// 调用方参数错误
    Argument,
}

impl ErrorCategory {
    /// 从AudioError提取错误类别
    pub fn from_audio_error(e: &AudioError) -> Self {
        match e {
            AudioError::UnsupportedFormat(_)
            | AudioError::Malformed(_)
            | AudioError::DetectionFailed(_) => Self::Format,
            AudioError::CorruptData(_) | AudioError::Unsupported(_) => Self::Decoding,
            AudioError::Io(_) => Self::Io,
            AudioError::InvalidArgument(_) => Self::Argument,
        }
    }

    /// 获取错误类别的显示名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Format => "格式错误",
            Self::Decoding => "解码错误",
            Self::Io => "I/O错误",
            Self::Argument => "参数错误",
        }
    }
}
