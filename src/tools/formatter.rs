//! 输出格式化模块
//!
//! probe/formats 子命令的表格（comfy-table）与JSON（serde_json）输出。

use crate::audio::{AudioSpec, FormatTag, SampleFormat};
use crate::error::{AudioError, ErrorCategory};
use crate::info::LibraryInfo;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::path::Path;

/// 单个文件的探测结果
#[derive(Debug, Clone, Serialize)]
pub struct ProbeRecord {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<AudioSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeRecord {
    pub fn from_result(path: &Path, result: Result<(FormatTag, AudioSpec), AudioError>) -> Self {
        let path = path.display().to_string();
        match result {
            Ok((format, spec)) => Self {
                path,
                format: Some(format),
                duration_seconds: spec.duration_seconds(),
                spec: Some(spec),
                error: None,
            },
            Err(e) => Self {
                path,
                format: None,
                spec: None,
                duration_seconds: None,
                error: Some(format!(
                    "[{}] {e}",
                    ErrorCategory::from_audio_error(&e).display_name()
                )),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// 时长格式化为 mm:ss.mmm
fn format_duration(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    format!(
        "{}:{:02}.{:03}",
        total_ms / 60_000,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}

fn format_sample_type(spec: &AudioSpec) -> String {
    match spec.sample_format {
        SampleFormat::Int => format!("{}-bit int", spec.bits_per_sample),
        SampleFormat::Float => format!("{}-bit float", spec.bits_per_sample),
    }
}

/// 探测结果表格
pub fn probe_table(records: &[ProbeRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "File / 文件",
        "Format / 格式",
        "Rate / 采样率",
        "Ch / 声道",
        "Sample / 样本",
        "Frames / 帧数",
        "Duration / 时长",
    ]);

    for record in records {
        match (&record.format, &record.spec) {
            (Some(format), Some(spec)) => {
                table.add_row(vec![
                    Cell::new(&record.path),
                    Cell::new(format.name()),
                    Cell::new(spec.sample_rate).set_alignment(CellAlignment::Right),
                    Cell::new(spec.channels).set_alignment(CellAlignment::Right),
                    Cell::new(format_sample_type(spec)),
                    Cell::new(
                        spec.total_frames
                            .map_or_else(|| "-".to_string(), |f| f.to_string()),
                    )
                    .set_alignment(CellAlignment::Right),
                    Cell::new(
                        record
                            .duration_seconds
                            .map_or_else(|| "-".to_string(), format_duration),
                    )
                    .set_alignment(CellAlignment::Right),
                ]);
            }
            _ => {
                table.add_row(vec![
                    Cell::new(&record.path),
                    Cell::new(record.error.as_deref().unwrap_or("-")),
                ]);
            }
        }
    }
    table
}

/// 已编译后端表格
pub fn formats_table(info: &LibraryInfo) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Format / 格式",
        "Extension / 扩展名",
        "Decode / 解码",
        "Encode / 编码",
    ]);
    let mark = |yes: bool| if yes { "yes" } else { "-" };
    for support in &info.formats {
        table.add_row(vec![
            support.format.name(),
            support.extension,
            mark(support.decode),
            mark(support.encode),
        ]);
    }
    table
}

pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
