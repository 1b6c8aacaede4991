//! 任务运行上下文
//!
//! 封装"我正在处理第几个任务"这一信息，用于日志前缀

use std::fmt::Display;

#[derive(Debug, Clone)]
pub struct RunCtx {
    /// 任务 ID
    pub task_id: u64,

    /// 任务在本批次中的序号（从 1 开始，仅用于日志显示）
    pub index: usize,

    /// 本批次任务总数
    pub total: usize,
}

impl RunCtx {
    pub fn new(task_id: u64, index: usize, total: usize) -> Self {
        Self {
            task_id,
            index,
            total,
        }
    }

    /// 单任务运行
    pub fn single(task_id: u64) -> Self {
        Self::new(task_id, 1, 1)
    }
}

impl Display for RunCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.total > 1 {
            write!(f, "[任务 #{} ({}/{})]", self.task_id, self.index, self.total)
        } else {
            write!(f, "[任务 #{}]", self.task_id)
        }
    }
}
