//! 超时与重试装饰器
//!
//! 每次调用都受 `timeout` 约束，超时视为网关不可用。
//! 只有 `GatewayUnavailable` 会重试（指数退避），格式错误原样返回。

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::RunParams;
use crate::error::{AppError, AppResult};
use crate::infrastructure::gateway::{GatewayRequest, GenerationGateway};

pub struct RetryingGateway {
    inner: Arc<dyn GenerationGateway>,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingGateway {
    pub fn new(
        inner: Arc<dyn GenerationGateway>,
        timeout: Duration,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            inner,
            timeout,
            max_retries,
            retry_delay,
        }
    }

    pub fn from_params(inner: Arc<dyn GenerationGateway>, params: &RunParams) -> Self {
        Self::new(
            inner,
            Duration::from_secs(params.gateway_timeout_secs),
            params.gateway_max_retries,
            Duration::from_millis(params.retry_delay_ms),
        )
    }

    async fn call_once(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
        match timeout(self.timeout, self.inner.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::gateway_unavailable(
                request.stage.as_str(),
                format!("调用超时 ({:?})", self.timeout),
            )),
        }
    }
}

#[async_trait]
impl GenerationGateway for RetryingGateway {
    async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(request).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "⚠️ 网关不可用 (尝试 {}/{}), {:?} 后重试: {}",
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::gateway::StageKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    /// 前 `failures` 次返回指定错误，之后成功
    struct FlakyGateway {
        calls: AtomicU32,
        failures: u32,
        malformed: bool,
    }

    #[async_trait]
    impl GenerationGateway for FlakyGateway {
        async fn generate(&self, request: &GatewayRequest) -> AppResult<JsonValue> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.malformed {
                    return Err(AppError::malformed(request.stage.as_str(), "bad"));
                }
                return Err(AppError::gateway_unavailable(request.stage.as_str(), "down"));
            }
            Ok(serde_json::json!({"ok": true}))
        }
    }

    struct SlowGateway;

    #[async_trait]
    impl GenerationGateway for SlowGateway {
        async fn generate(&self, _request: &GatewayRequest) -> AppResult<JsonValue> {
            sleep(Duration::from_secs(5)).await;
            Ok(JsonValue::Null)
        }
    }

    fn request() -> GatewayRequest {
        GatewayRequest::new(StageKind::Filter, "task", vec![])
    }

    fn wrap(inner: Arc<dyn GenerationGateway>, retries: u32) -> RetryingGateway {
        RetryingGateway::new(
            inner,
            Duration::from_millis(200),
            retries,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_unavailable_is_retried_until_success() {
        let inner = Arc::new(FlakyGateway {
            calls: AtomicU32::new(0),
            failures: 2,
            malformed: false,
        });
        let gateway = wrap(inner.clone(), 3);
        assert_ok!(gateway.generate(&request()).await);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let inner = Arc::new(FlakyGateway {
            calls: AtomicU32::new(0),
            failures: 10,
            malformed: false,
        });
        let gateway = wrap(inner.clone(), 2);
        let err = assert_err!(gateway.generate(&request()).await);
        assert!(err.is_retryable());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_is_not_retried() {
        let inner = Arc::new(FlakyGateway {
            calls: AtomicU32::new(0),
            failures: 1,
            malformed: true,
        });
        let gateway = wrap(inner.clone(), 3);
        let err = assert_err!(gateway.generate(&request()).await);
        assert!(err.is_malformed());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_gateway_unavailable() {
        let gateway = wrap(Arc::new(SlowGateway), 0);
        let err = assert_err!(gateway.generate(&request()).await);
        assert!(matches!(err, AppError::GatewayUnavailable { .. }));
    }
}
