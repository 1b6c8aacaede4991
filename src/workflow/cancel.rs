//! 协作式取消
//!
//! 只在阶段边界检查，阶段内部的网关调用不会被打断

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// 在 `CancellationToken` 之上附带阶段名的取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancelToken(CancellationToken);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// 进入 `stage` 之前调用；已取消时返回 `Cancelled`
    pub fn check(&self, stage: &str) -> AppResult<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled {
                stage: stage.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
