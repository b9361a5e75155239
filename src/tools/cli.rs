//! 命令行接口模块
//!
//! 负责命令行参数解析、配置管理和日志初始化。

use super::constants::{defaults, parallel_limits};
use crate::audio::FormatTag;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::ffi::OsString;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// 应用程序版本信息
const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// 应用程序配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub command: CliCommand,

    /// 是否显示详细信息（同时提高日志级别）
    pub verbose: bool,
}

/// 子命令
#[derive(Debug, Clone)]
pub enum CliCommand {
    /// 打印文件的格式与音频规格
    Probe { inputs: Vec<PathBuf>, json: bool },
    /// 解码并重新编码
    Convert(ConvertOptions),
    /// 列出已编译的后端
    Formats { json: bool },
}

/// 转换参数
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// 目标格式；未指定时按输出扩展名推断
    pub format: Option<FormatTag>,
    /// 目标整数位深
    pub bits: Option<u16>,
    /// 输出32位浮点
    pub float: bool,
    /// 目录批量转换的并发度
    pub jobs: usize,
}

fn build_command() -> Command {
    Command::new("audioport")
        .version(VERSION)
        .about(DESCRIPTION)
        .author("audioport Team")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .help("显示详细处理信息（日志级别提升为debug，RUST_LOG优先）")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("probe")
                .about("显示音频文件的格式与规格")
                .arg(
                    Arg::new("INPUT")
                        .help("音频文件或目录（目录会递归扫描）")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("以JSON输出")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("把任意支持的格式转换为 WAV / WavPack / 无头部PCM")
                .arg(
                    Arg::new("INPUT")
                        .help("输入文件或目录")
                        .required(true)
                        .index(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("OUTPUT")
                        .help("输出文件；输入为目录时为输出目录")
                        .required(true)
                        .index(2)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("目标格式（默认按输出扩展名推断）")
                        .value_parser(["wav", "wv", "raw"]),
                )
                .arg(
                    Arg::new("bits")
                        .long("bits")
                        .short('b')
                        .help("目标整数位深")
                        .value_parser(value_parser!(u16).range(8..=32))
                        .conflicts_with("float"),
                )
                .arg(
                    Arg::new("float")
                        .long("float")
                        .help("输出32位浮点样本")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("jobs")
                        .long("jobs")
                        .short('j')
                        .help("目录批量转换的并发度（默认4）")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("formats").about("列出已编译的后端").arg(
                Arg::new("json")
                    .long("json")
                    .help("以JSON输出")
                    .action(ArgAction::SetTrue),
            ),
        )
}

fn config_from_matches(matches: &ArgMatches) -> AppConfig {
    let command = match matches.subcommand() {
        Some(("probe", sub)) => CliCommand::Probe {
            inputs: sub
                .get_many::<PathBuf>("INPUT")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            json: sub.get_flag("json"),
        },
        Some(("convert", sub)) => {
            let jobs = sub
                .get_one::<usize>("jobs")
                .copied()
                .unwrap_or(defaults::PARALLEL_FILES_DEGREE)
                .clamp(
                    parallel_limits::MIN_PARALLEL_DEGREE,
                    parallel_limits::MAX_PARALLEL_DEGREE,
                );
            CliCommand::Convert(ConvertOptions {
                input: sub.get_one::<PathBuf>("INPUT").cloned().unwrap_or_default(),
                output: sub.get_one::<PathBuf>("OUTPUT").cloned().unwrap_or_default(),
                format: sub
                    .get_one::<String>("format")
                    .map(|ext| FormatTag::from_extension(ext)),
                bits: sub.get_one::<u16>("bits").copied(),
                float: sub.get_flag("float"),
                jobs,
            })
        }
        Some(("formats", sub)) => CliCommand::Formats {
            json: sub.get_flag("json"),
        },
        // subcommand_required 保证不会走到这里
        _ => CliCommand::Formats { json: false },
    };

    AppConfig {
        command,
        verbose: matches.get_flag("verbose"),
    }
}

/// 解析命令行参数并创建配置（参数错误时由clap打印用法并退出）
pub fn parse_args() -> AppConfig {
    config_from_matches(&build_command().get_matches())
}

/// 从给定参数解析，便于测试
pub fn try_parse_from<I, T>(args: I) -> Result<AppConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    build_command()
        .try_get_matches_from(args)
        .map(|matches| config_from_matches(&matches))
}

/// 安装 tracing 订阅器，日志写到stderr
///
/// 设置了 `RUST_LOG` 时以其为准。
pub fn init_logging(verbose: bool) {
    let fallback = if verbose {
        defaults::VERBOSE_LOG_FILTER
    } else {
        defaults::LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // 重复初始化（例如测试中）时忽略
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
