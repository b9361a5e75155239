//! 库信息查询
//!
//! 编译进本库的后端、可识别的扩展名，以及按路径推断的尝试顺序。

use crate::audio::FormatTag;
use serde::Serialize;
use std::path::Path;

/// 库的基本信息
#[derive(Debug, Clone, Serialize)]
pub struct LibraryInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// 已编译的后端
    pub formats: Vec<FormatSupport>,
    /// WavPack后端运行时依赖的ffmpeg是否可用
    pub ffmpeg_available: bool,
}

/// 单个后端的能力
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormatSupport {
    pub format: FormatTag,
    pub extension: &'static str,
    pub decode: bool,
    pub encode: bool,
}

pub fn library_info() -> LibraryInfo {
    LibraryInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        formats: supported_formats(),
        ffmpeg_available: ffmpeg_available(),
    }
}

#[cfg(feature = "wavpack")]
fn ffmpeg_available() -> bool {
    crate::audio::ffmpeg_available()
}

#[cfg(not(feature = "wavpack"))]
fn ffmpeg_available() -> bool {
    false
}

/// 已编译的后端及其编解码能力
pub fn supported_formats() -> Vec<FormatSupport> {
    FormatTag::ALL
        .iter()
        .filter(|tag| tag.is_enabled())
        .filter_map(|&tag| {
            tag.extension().map(|extension| FormatSupport {
                format: tag,
                extension,
                decode: true,
                encode: tag.can_encode(),
            })
        })
        .collect()
}

/// 已编译后端可识别的所有扩展名（不含点）
pub fn known_file_extensions() -> Vec<&'static str> {
    const CANDIDATES: [&str; 8] = ["wav", "wave", "flac", "mp3", "wv", "bin", "raw", "pcm"];
    CANDIDATES
        .into_iter()
        .filter(|ext| FormatTag::from_extension(ext).is_enabled())
        .collect()
}

/// 按路径推断应尝试的后端顺序
///
/// 扩展名对应的后端排在最前；`try_all` 时再追加其余带头部的已编译后端
/// （无头部PCM需要调用方提供规格，不参与盲试）。
pub fn type_hint_for_path(path: &Path, try_all: bool) -> Vec<FormatTag> {
    let explicit = path
        .extension()
        .map(|ext| FormatTag::from_extension(&ext.to_string_lossy()))
        .filter(|tag| tag.is_enabled());

    let mut order: Vec<FormatTag> = explicit.into_iter().collect();
    if try_all {
        order.extend(
            FormatTag::ALL
                .into_iter()
                .filter(|tag| tag.is_enabled() && *tag != FormatTag::Raw)
                .filter(|tag| Some(*tag) != explicit),
        );
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_extension_comes_first() {
        let order = type_hint_for_path(Path::new("music/Track.WV"), true);
        if FormatTag::WavPack.is_enabled() {
            assert_eq!(order[0], FormatTag::WavPack);
            assert_eq!(order.iter().filter(|t| **t == FormatTag::WavPack).count(), 1);
        }
        assert!(!order.contains(&FormatTag::Raw));
    }

    #[test]
    fn unknown_extension_without_try_all_is_empty() {
        assert!(type_hint_for_path(Path::new("notes.txt"), false).is_empty());
        assert_eq!(
            type_hint_for_path(Path::new("dump.pcm"), false),
            vec![FormatTag::Raw]
        );
    }

    #[test]
    fn info_lists_only_enabled_backends() {
        let info = library_info();
        assert_eq!(info.name, "audioport");
        assert!(info.formats.iter().all(|f| f.format.is_enabled()));
        assert!(info.formats.iter().any(|f| f.format == FormatTag::Raw && f.encode));
        assert!(known_file_extensions().contains(&"pcm"));
    }
}
