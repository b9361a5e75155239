//! 常量和默认配置集中管理
//!
//! 将命令行工具的默认值集中定义，避免"默认值漂移"和重复定义

/// 默认配置值
pub mod defaults {
    /// 转换时每次读写的帧数
    pub const CHUNK_FRAMES: usize = 4096;

    /// 默认多文件并行并发度
    pub const PARALLEL_FILES_DEGREE: usize = 4;

    /// 默认日志过滤（未设置 RUST_LOG 时）
    pub const LOG_FILTER: &str = "audioport=warn";

    /// `--verbose` 时的日志过滤
    pub const VERBOSE_LOG_FILTER: &str = "audioport=debug";
}

/// 并发度限制常量
pub mod parallel_limits {
    /// 最小并发度
    pub const MIN_PARALLEL_DEGREE: usize = 1;

    /// 最大并发度
    ///
    /// 转换以I/O为主，超过16并发收益有限
    pub const MAX_PARALLEL_DEGREE: usize = 16;
}

/// 进程退出码
pub mod exit_codes {
    /// 通用错误
    pub const GENERAL_ERROR: i32 = 1;
    /// 格式/输入错误
    pub const FORMAT_ERROR: i32 = 2;
    /// 解码失败
    pub const DECODING_ERROR: i32 = 3;
    /// 参数错误
    pub const ARGUMENT_ERROR: i32 = 4;
    /// 批量处理中有文件失败
    pub const PARTIAL_FAILURE: i32 = 5;
}
