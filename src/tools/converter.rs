//! 格式转换模块
//!
//! 单文件转换按块流式进行（解码一块写一块）；目录转换使用rayon线程池
//! 做文件级并行，并保证输出顺序与输入一致。

use super::batch_state::{BatchStats, BatchStatsSnapshot};
use super::cli::ConvertOptions;
use super::constants::defaults;
use super::scanner::{display_name, scan_audio_files};
use crate::audio::{AudioSpec, DecodeSession, EncodeSession, FormatTag, SampleFormat};
use crate::error::{self, AudioError, AudioResult, ErrorCategory};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// 单文件转换结果
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    pub source_format: FormatTag,
    pub target_format: FormatTag,
    pub spec: AudioSpec,
    pub frames: u64,
}

/// 确定目标格式：显式参数优先，否则按输出扩展名
pub fn resolve_target_format(options: &ConvertOptions, output: &Path) -> AudioResult<FormatTag> {
    let tag = options.format.unwrap_or_else(|| {
        output
            .extension()
            .map(|ext| FormatTag::from_extension(&ext.to_string_lossy()))
            .unwrap_or(FormatTag::Unknown)
    });

    if tag == FormatTag::Unknown {
        return Err(error::invalid_argument(format!(
            "无法从输出路径推断目标格式: {}",
            output.display()
        )));
    }
    if !tag.can_encode() {
        return Err(error::unsupported(format!("{tag}不支持编码")));
    }
    Ok(tag)
}

/// 根据源规格与参数推导目标规格
pub fn resolve_target_spec(source: &AudioSpec, options: &ConvertOptions) -> AudioSpec {
    let mut spec = *source;
    if options.float {
        spec.sample_format = SampleFormat::Float;
        spec.bits_per_sample = 32;
    } else if let Some(bits) = options.bits {
        spec.sample_format = SampleFormat::Int;
        spec.bits_per_sample = bits;
    } else if spec.sample_format == SampleFormat::Float && spec.bits_per_sample != 32 {
        spec.bits_per_sample = 32;
    }
    spec
}

/// 转换单个文件
pub fn convert_file(input: &Path, output: &Path, options: &ConvertOptions) -> AudioResult<ConvertSummary> {
    let target_format = resolve_target_format(options, output)?;

    let mut decoder = DecodeSession::open_path(input)?;
    let spec = resolve_target_spec(decoder.spec(), options);
    tracing::debug!(
        input = %input.display(),
        output = %output.display(),
        from = %decoder.format(),
        to = %target_format,
        "开始转换"
    );

    let mut encoder = EncodeSession::create_path(output, target_format, spec)?;
    loop {
        let chunk = decoder.read_frames(defaults::CHUNK_FRAMES)?;
        if chunk.is_empty() {
            break;
        }
        encoder.write_frames(&chunk)?;
    }
    encoder.finalize()?;

    Ok(ConvertSummary {
        source_format: decoder.format(),
        target_format,
        spec,
        frames: encoder.frames_written(),
    })
}

/// 目录转换时的输出路径：保持相对目录结构，替换扩展名
pub fn output_path_for(
    input_root: &Path,
    output_root: &Path,
    file: &Path,
    target: FormatTag,
) -> PathBuf {
    let relative = file.strip_prefix(input_root).unwrap_or(file);
    let mut out = output_root.join(relative);
    if let Some(ext) = target.extension() {
        out.set_extension(ext);
    }
    out
}

/// 有序结果容器（保证输出顺序）
struct OrderedResult {
    index: usize,
    input: PathBuf,
    result: AudioResult<ConvertSummary>,
}

/// 目录批量转换
pub fn convert_directory(options: &ConvertOptions, verbose: bool) -> AudioResult<BatchStatsSnapshot> {
    let files = scan_audio_files(&options.input)?;
    if files.is_empty() {
        println!(
            "[WARNING] 目录中没有可转换的音频文件 / No audio files found in {}",
            options.input.display()
        );
        return Ok(BatchStatsSnapshot::default());
    }

    let target = match options.format {
        Some(tag) => tag,
        None => FormatTag::Wav,
    };
    let per_file = ConvertOptions {
        format: Some(target),
        ..options.clone()
    };

    let degree = options.jobs.min(files.len()).max(1);
    println!(
        "[INFO] 转换 {} 个文件，并发度 {degree} / Converting {} files with {degree} jobs",
        files.len(),
        files.len()
    );

    let stats = BatchStats::new();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(degree)
        .thread_name(|i| format!("convert-worker-{i}"))
        .build()
        .map_err(|e| error::unsupported(format!("线程池创建失败: {e}")))?;

    let mut results: Vec<OrderedResult> = pool.install(|| {
        files
            .par_iter()
            .enumerate()
            .map(|(index, file)| {
                let output = output_path_for(&options.input, &options.output, file, target);
                let result = output
                    .parent()
                    .map_or(Ok(()), fs::create_dir_all)
                    .map_err(AudioError::from)
                    .and_then(|()| convert_file(file, &output, &per_file));

                match &result {
                    Ok(_) => {
                        stats.inc_processed();
                    }
                    Err(e) => {
                        stats.inc_failed(ErrorCategory::from_audio_error(e), display_name(file));
                    }
                }
                OrderedResult {
                    index,
                    input: file.clone(),
                    result,
                }
            })
            .collect()
    });

    results.sort_by_key(|r| r.index);
    for (position, entry) in results.iter().enumerate() {
        match &entry.result {
            Ok(summary) if verbose => println!(
                "[OK] [{}/{}] {} ({} -> {}, {} frames)",
                position + 1,
                results.len(),
                display_name(&entry.input),
                summary.source_format,
                summary.target_format,
                summary.frames
            ),
            Ok(_) => {}
            Err(e) => println!(
                "[FAIL] [{}/{}] {} - [{}] {e}",
                position + 1,
                results.len(),
                display_name(&entry.input),
                ErrorCategory::from_audio_error(e).display_name()
            ),
        }
    }

    Ok(stats.snapshot())
}
