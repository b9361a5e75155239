//! 批处理状态管理模块
//!
//! 批量转换的统计，串行与rayon并行共用同一实现。

use crate::error::ErrorCategory;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 批处理统计快照
#[derive(Debug, Clone, Default)]
pub struct BatchStatsSnapshot {
    /// 成功处理的文件数
    pub processed: usize,
    /// 失败的文件数
    pub failed: usize,
    /// 错误分类统计（错误类型 -> 失败文件列表）
    pub error_stats: HashMap<ErrorCategory, Vec<String>>,
}

/// 批处理统计（多线程安全）
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    processed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    error_stats: Arc<Mutex<HashMap<ErrorCategory, Vec<String>>>>,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 增加成功处理计数
    #[inline]
    pub fn inc_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 增加失败计数并记录错误分类
    pub fn inc_failed(&self, category: ErrorCategory, filename: String) -> usize {
        let count = self.failed.fetch_add(1, Ordering::Relaxed) + 1;
        self.error_stats
            .lock()
            .entry(category)
            .or_default()
            .push(filename);
        count
    }

    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            error_stats: self.error_stats.lock().clone(),
        }
    }
}
