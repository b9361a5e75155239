//! audioport 命令行工具 - 主程序入口
//!
//! 纯流程控制器，负责协调各个工具模块完成 probe / convert / formats。

use audioport::{
    audio::FormatTag,
    error::{AudioError, ErrorCategory},
    info,
    tools::{self, AppConfig, CliCommand, ConvertOptions, constants::exit_codes},
};
use std::process;

/// 获取错误建议文本
fn get_error_suggestion(error: &AudioError) -> &'static str {
    match error {
        AudioError::DetectionFailed(_) => {
            "文件为空或过短，无法识别格式 / File is empty or too short to detect its format"
        }
        AudioError::Unsupported(_) => {
            "后端不支持该特性，尝试 --bits 或其他目标格式 / Backend cannot represent this, try --bits or another target format"
        }
        _ => match ErrorCategory::from_audio_error(error) {
            ErrorCategory::Io => {
                "检查文件路径是否正确，文件是否存在且可读写 / Check if file path is correct, file exists and is accessible"
            }
            ErrorCategory::Format => {
                "确保输入文件为支持的格式 / Ensure input file is in a supported format"
            }
            ErrorCategory::Decoding => {
                "文件可能损坏或使用不支持的音频编码 / File may be corrupted or use unsupported audio encoding"
            }
            ErrorCategory::Argument => {
                "检查命令行参数是否正确，使用 --help 查看完整用法 / Check command-line arguments, use --help to see full usage"
            }
        },
    }
}

fn exit_code_for(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Format => exit_codes::FORMAT_ERROR,
        ErrorCategory::Decoding => exit_codes::DECODING_ERROR,
        ErrorCategory::Argument => exit_codes::ARGUMENT_ERROR,
        ErrorCategory::Io => exit_codes::GENERAL_ERROR,
    }
}

/// 错误处理和建议
fn handle_error(error: anyhow::Error) -> ! {
    eprintln!("[ERROR] 错误 / Error: {error:#}");

    let Some(audio_error) = error.downcast_ref::<AudioError>() else {
        process::exit(exit_codes::GENERAL_ERROR);
    };

    let category = ErrorCategory::from_audio_error(audio_error);
    eprintln!("[INFO] 建议 / Suggestion: {}", get_error_suggestion(audio_error));

    // 对于格式错误，额外显示支持的格式列表
    if matches!(category, ErrorCategory::Format) {
        let extensions: Vec<String> = info::known_file_extensions()
            .iter()
            .map(|s| s.to_uppercase())
            .collect();
        eprintln!(
            "   Supported formats / 支持的格式: {}",
            extensions.join(", ")
        );
    }

    process::exit(exit_code_for(category));
}

/// 返回失败的文件数
fn run_probe(inputs: &[std::path::PathBuf], json: bool) -> anyhow::Result<usize> {
    let files = tools::collect_inputs(inputs)?;
    let records: Vec<tools::ProbeRecord> = files
        .iter()
        .map(|path| tools::ProbeRecord::from_result(path, audioport::probe(path)))
        .collect();

    if json {
        println!("{}", tools::to_json(&records)?);
    } else {
        println!("{}", tools::probe_table(&records));
    }
    Ok(records.iter().filter(|r| !r.is_ok()).count())
}

fn run_convert(options: &ConvertOptions, verbose: bool) -> anyhow::Result<usize> {
    if options.input.is_dir() {
        let snapshot = tools::convert_directory(options, verbose)?;
        println!(
            "[INFO] 完成 / Done: {} 成功 / succeeded, {} 失败 / failed",
            snapshot.processed, snapshot.failed
        );
        for (category, files) in &snapshot.error_stats {
            println!("   {}: {}", category.display_name(), files.join(", "));
        }
        return Ok(snapshot.failed);
    }

    let summary = tools::convert_file(&options.input, &options.output, options).map_err(|e| {
        anyhow::Error::new(e).context(format!("转换失败 / Conversion failed: {}", options.input.display()))
    })?;
    println!(
        "[OK] {} -> {} ({} -> {}, {} Hz, {} ch, {} frames)",
        options.input.display(),
        options.output.display(),
        summary.source_format,
        summary.target_format,
        summary.spec.sample_rate,
        summary.spec.channels,
        summary.frames
    );
    Ok(0)
}

fn run_formats(json: bool) -> anyhow::Result<usize> {
    let library = info::library_info();
    if json {
        println!("{}", tools::to_json(&library)?);
    } else {
        println!("{} v{}", library.name, library.version);
        println!("{}", tools::formats_table(&library));
        let missing: Vec<&str> = FormatTag::ALL
            .iter()
            .filter(|tag| !tag.is_enabled())
            .map(|tag| tag.name())
            .collect();
        if !missing.is_empty() {
            println!("[INFO] 未编译的后端 / Disabled backends: {}", missing.join(", "));
        }
        if FormatTag::WavPack.is_enabled() && !library.ffmpeg_available {
            println!("[WARN] 未找到FFmpeg，WavPack不可用 / FFmpeg not found, WavPack unavailable");
        }
    }
    Ok(0)
}

/// 应用程序主逻辑，返回失败的文件数
fn run(config: &AppConfig) -> anyhow::Result<usize> {
    match &config.command {
        CliCommand::Probe { inputs, json } => run_probe(inputs, *json),
        CliCommand::Convert(options) => run_convert(options, config.verbose),
        CliCommand::Formats { json } => run_formats(*json),
    }
}

fn main() {
    let config = tools::parse_args();
    tools::init_logging(config.verbose);

    match run(&config) {
        Ok(0) => {}
        Ok(failed) => {
            eprintln!("[WARNING] {failed} 个文件处理失败 / file(s) failed");
            process::exit(exit_codes::PARTIAL_FAILURE);
        }
        Err(error) => handle_error(error),
    }
}
