//! The executor port and the function-backed driver.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use weft_core::TokenId;

use crate::invocation::{ExecutorReply, TaskInvocation};

/// Transport-level failure of the executor RPC itself.
///
/// Distinct from a task failure: the task's outcome is unknown. The
/// coordinator treats transport failures as retryable by default.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("executor transport: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub message: String,
}

impl TransportError {
    /// Create a transport error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The executor consumed by the coordinator.
///
/// Task execution is atomic and opaque: the coordinator hands over a
/// [`TaskInvocation`] and receives an [`ExecutorReply`]. Cancellation is
/// advisory — the executor may ignore it, and the coordinator discards
/// any reply for a token it has already cancelled.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one task invocation to completion.
    async fn invoke(&self, invocation: TaskInvocation) -> Result<ExecutorReply, TransportError>;

    /// Advise the executor that a token's invocation is no longer wanted.
    /// Best-effort; the default implementation does nothing.
    async fn cancel(&self, token_id: TokenId) {
        let _ = token_id;
    }
}

/// Future type returned by [`FnExecutor`] closures.
pub type BoxedReply = Pin<Box<dyn Future<Output = Result<ExecutorReply, TransportError>> + Send>>;

/// A [`TaskExecutor`] backed by an async closure.
///
/// The embedding driver for tests and in-process executors: behavior is
/// whatever the closure does with the invocation.
pub struct FnExecutor {
    invoke: Arc<dyn Fn(TaskInvocation) -> BoxedReply + Send + Sync>,
}

impl FnExecutor {
    /// Wrap an async closure.
    pub fn new<F>(invoke: F) -> Self
    where
        F: Fn(TaskInvocation) -> BoxedReply + Send + Sync + 'static,
    {
        Self {
            invoke: Arc::new(invoke),
        }
    }

    /// An executor that replies to every invocation with `reply`.
    #[must_use]
    pub fn always(reply: ExecutorReply) -> Self {
        Self::new(move |_invocation| {
            let reply = reply.clone();
            Box::pin(async move { Ok(reply) })
        })
    }
}

#[async_trait]
impl TaskExecutor for FnExecutor {
    async fn invoke(&self, invocation: TaskInvocation) -> Result<ExecutorReply, TransportError> {
        (self.invoke)(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::TaskFailure;
    use serde_json::json;
    use weft_core::{Revision, RunId, TaskRef};

    fn invocation() -> TaskInvocation {
        TaskInvocation {
            task_ref: TaskRef::new("t").unwrap(),
            task_revision: Revision::INITIAL,
            input: json!({ "n": 2 }),
            token_id: TokenId::v4(),
            run_id: RunId::v4(),
            deadline: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn fn_executor_sees_the_invocation() {
        let executor = FnExecutor::new(|invocation| {
            Box::pin(async move {
                Ok(ExecutorReply::Completed {
                    output: invocation.input,
                })
            })
        });
        let reply = executor.invoke(invocation()).await.unwrap();
        assert_eq!(
            reply,
            ExecutorReply::Completed {
                output: json!({ "n": 2 })
            }
        );
    }

    #[tokio::test]
    async fn always_repeats_its_reply() {
        let executor = FnExecutor::always(ExecutorReply::Failed {
            error: TaskFailure::fatal("step_failure", "boom"),
        });
        for _ in 0..2 {
            let reply = executor.invoke(invocation()).await.unwrap();
            assert!(matches!(reply, ExecutorReply::Failed { .. }));
        }
    }

    #[tokio::test]
    async fn default_cancel_is_a_no_op() {
        let executor = FnExecutor::always(ExecutorReply::Completed { output: json!(null) });
        executor.cancel(TokenId::v4()).await;
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::new("connection refused");
        assert_eq!(err.to_string(), "executor transport: connection refused");
    }
}
