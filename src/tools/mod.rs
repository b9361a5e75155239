//! 工具模块集合
//!
//! 包含CLI、文件扫描、格式转换和输出格式化，支持main.rs的流程控制。

pub mod batch_state;
pub mod cli;
pub mod constants;
pub mod converter;
pub mod formatter;
pub mod scanner;

// 重新导出主要的公共接口
pub use batch_state::{BatchStats, BatchStatsSnapshot};
pub use cli::{AppConfig, CliCommand, ConvertOptions, init_logging, parse_args};
pub use converter::{ConvertSummary, convert_directory, convert_file};
pub use formatter::{ProbeRecord, formats_table, probe_table, to_json};
pub use scanner::{collect_inputs, scan_audio_files};
