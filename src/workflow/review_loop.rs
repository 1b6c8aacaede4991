//! 审核-修复循环 - 流程层
//!
//! 一个小型状态机：
//!
//! ```text
//! Reviewing ──accepted──────────────▶ Accepted
//!     │
//!     └─rejected─┬─ attempts < max ─▶ Repairing ──▶ Reviewing
//!                └─ attempts = max ─▶ Exhausted
//! ```
//!
//! 每次进入 Repairing 计数加一，因此审核最多执行 `max_attempts + 1` 次。
//! 耗尽不是错误：返回最后一次审核过的状态，由调用方继续执行确定性规则。

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::report::{LoopTermination, LoopTrace};
use crate::models::review::ReviewVerdict;

/// 一种具体的审核/修复实现（分组或标签）
#[async_trait]
pub trait ReviewCycle: Send {
    type State: Clone + Send + Sync;

    fn name(&self) -> &'static str;

    async fn review(&mut self, state: &Self::State) -> AppResult<ReviewVerdict>;

    async fn repair(
        &mut self,
        state: &Self::State,
        verdict: &ReviewVerdict,
    ) -> AppResult<Self::State>;

    /// 取走循环过程中吸收的格式错误说明
    fn take_notes(&mut self) -> Vec<String> {
        Vec::new()
    }
}

enum LoopState<S> {
    Reviewing(S),
    Repairing(S, ReviewVerdict),
    Accepted(S, ReviewVerdict),
    Exhausted(S, ReviewVerdict),
}

/// 循环结果
#[derive(Debug, Clone)]
pub struct LoopResult<S> {
    pub state: S,
    /// 最后一次审核的结论
    pub verdict: ReviewVerdict,
    pub trace: LoopTrace,
}

impl<S> LoopResult<S> {
    pub fn accepted(&self) -> bool {
        self.trace.termination == LoopTermination::Accepted
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReviewLoop {
    max_attempts: u32,
}

impl ReviewLoop {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 运行循环直到接受或耗尽
    ///
    /// review/repair 返回的错误原样向上传播
    pub async fn run<C: ReviewCycle>(
        &self,
        cycle: &mut C,
        initial: C::State,
    ) -> AppResult<LoopResult<C::State>> {
        let name = cycle.name();
        let mut attempts: u32 = 0;
        let mut reviews: u32 = 0;
        let mut state = LoopState::Reviewing(initial);

        let (final_state, verdict, termination) = loop {
            state = match state {
                LoopState::Reviewing(current) => {
                    reviews += 1;
                    let verdict = cycle.review(&current).await?;
                    if verdict.is_accepted() {
                        LoopState::Accepted(current, verdict)
                    } else if attempts < self.max_attempts {
                        LoopState::Repairing(current, verdict)
                    } else {
                        LoopState::Exhausted(current, verdict)
                    }
                }
                LoopState::Repairing(current, verdict) => {
                    attempts += 1;
                    info!(
                        "🔧 [{}] 第 {}/{} 次修复: {} 个问题",
                        name,
                        attempts,
                        self.max_attempts,
                        verdict.issues.len()
                    );
                    let next = cycle.repair(&current, &verdict).await?;
                    LoopState::Reviewing(next)
                }
                LoopState::Accepted(current, verdict) => {
                    break (current, verdict, LoopTermination::Accepted);
                }
                LoopState::Exhausted(current, verdict) => {
                    break (current, verdict, LoopTermination::Exhausted);
                }
            };
        };

        match termination {
            LoopTermination::Accepted => {
                info!("✅ [{}] 审核通过 (审核 {} 次)", name, reviews)
            }
            LoopTermination::Exhausted => {
                warn!("⚠️ [{}] 修复次数耗尽 ({} 次)，保留最后的结果", name, attempts)
            }
        }
        debug!("[{}] 最终反馈: {}", name, verdict.feedback);

        Ok(LoopResult {
            state: final_state,
            verdict,
            trace: LoopTrace {
                name: name.to_string(),
                max_attempts: self.max_attempts,
                reviews,
                repairs: attempts,
                termination,
                absorbed: cycle.take_notes(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use tokio_test::{assert_err, assert_ok};

    /// 状态是修复次数；`accept_at` 次修复后接受
    struct Counting {
        accept_at: Option<u32>,
        fail_repair: bool,
    }

    #[async_trait]
    impl ReviewCycle for Counting {
        type State = u32;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn review(&mut self, state: &u32) -> AppResult<ReviewVerdict> {
            if Some(*state) == self.accept_at {
                Ok(ReviewVerdict::accepted("ok"))
            } else {
                Ok(ReviewVerdict::rejected("again", vec![format!("state {}", state)]))
            }
        }

        async fn repair(&mut self, state: &u32, _verdict: &ReviewVerdict) -> AppResult<u32> {
            if self.fail_repair {
                return Err(AppError::gateway_unavailable("repair", "down"));
            }
            Ok(state + 1)
        }

        fn take_notes(&mut self) -> Vec<String> {
            vec!["note".to_string()]
        }
    }

    #[tokio::test]
    async fn test_always_reject_terminates_after_max_plus_one_reviews() {
        for max in 0..=3 {
            let mut cycle = Counting {
                accept_at: None,
                fail_repair: false,
            };
            let result = assert_ok!(ReviewLoop::new(max).run(&mut cycle, 0).await);
            assert_eq!(result.trace.reviews, max + 1);
            assert_eq!(result.trace.repairs, max);
            assert_eq!(result.state, max);
            assert!(result.trace.exhausted());
            assert!(!result.verdict.is_accepted());
        }
    }

    #[tokio::test]
    async fn test_accept_on_first_review_skips_repair() {
        let mut cycle = Counting {
            accept_at: Some(0),
            fail_repair: true,
        };
        let result = assert_ok!(ReviewLoop::new(3).run(&mut cycle, 0).await);
        assert!(result.accepted());
        assert_eq!(result.trace.reviews, 1);
        assert_eq!(result.trace.repairs, 0);
        assert_eq!(result.trace.absorbed, vec!["note"]);
    }

    #[tokio::test]
    async fn test_accept_after_repairs() {
        let mut cycle = Counting {
            accept_at: Some(2),
            fail_repair: false,
        };
        let result = assert_ok!(ReviewLoop::new(3).run(&mut cycle, 0).await);
        assert!(result.accepted());
        assert_eq!(result.state, 2);
        assert_eq!(result.trace.reviews, 3);
    }

    #[tokio::test]
    async fn test_repair_error_propagates() {
        let mut cycle = Counting {
            accept_at: None,
            fail_repair: true,
        };
        let err = assert_err!(ReviewLoop::new(2).run(&mut cycle, 0).await);
        assert!(err.is_retryable());
    }
}
