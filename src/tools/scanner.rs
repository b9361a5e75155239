//! 文件扫描模块
//!
//! 把命令行给出的文件和目录展开为待处理的音频文件列表。

use crate::audio::FormatTag;
use crate::{AudioError, AudioResult};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 是否为可盲扫的音频文件（无头部PCM需要规格，不参与目录扫描）
fn is_scannable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(FormatTag::from_extension)
        .map(|tag| tag.is_enabled() && tag != FormatTag::Raw)
        .unwrap_or(false)
}

/// 递归扫描目录中的音频文件，按路径排序
pub fn scan_audio_files(dir_path: &Path) -> AudioResult<Vec<PathBuf>> {
    if !dir_path.is_dir() {
        return Err(AudioError::from(io::Error::new(
            io::ErrorKind::NotFound,
            format!("目录不存在: {}", dir_path.display()),
        )));
    }

    let mut audio_files: Vec<PathBuf> = WalkDir::new(dir_path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_scannable(path))
        .collect();

    audio_files.sort();
    tracing::debug!(dir = %dir_path.display(), count = audio_files.len(), "目录扫描完成");
    Ok(audio_files)
}

/// 展开输入：文件原样保留，目录递归扫描
pub fn collect_inputs(inputs: &[PathBuf]) -> AudioResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(scan_audio_files(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// 文件名（非UTF-8时有损转换）
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
