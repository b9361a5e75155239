//! symphonia错误处理宏
//!
//! 流结束（`UnexpectedEof`）是正常的终止信号，其余错误一律原样上抛，
//! 不跳过损坏的包，也不自动重置解码器。
//! 注意：此模块仅供symphonia后端内部使用

/// 统一的symphonia结果处理宏
///
/// - `Ok(v)` → `Some(v)`
/// - 流结束 → `None`
/// - 其他错误 → 从当前函数返回归一化后的 `AudioError`
macro_rules! handle_symphonia_error {
    ($result:expr) => {
        match $result {
            Ok(value) => Some(value),
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                None
            }
            Err(e) => return Err($crate::error::AudioError::from(e)),
        }
    };
}

pub(crate) use handle_symphonia_error;
