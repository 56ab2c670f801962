//! The check/apply contract every resource kind implements.
//!
//! `check` compares desired state with actual state and reports what
//! would change, without changing anything. `apply` converges the actual
//! state and reports what did change.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DriverError, Result, TaskError};
use crate::render::Renderer;
use crate::status::TaskStatus;

/// A single reconcilable resource.
#[async_trait]
pub trait Task: Send {
    /// Inspect current state and plan. Must not mutate anything.
    async fn check(
        &mut self,
        cancel: &CancellationToken,
        renderer: &dyn Renderer,
    ) -> Result<Box<dyn TaskStatus>>;

    /// Converge to the desired state. Safe to run again after success.
    async fn apply(&mut self, cancel: &CancellationToken) -> Result<Box<dyn TaskStatus>>;
}

/// Builds a [`Task`] from declared configuration.
#[async_trait]
pub trait Preparer: Send + Sync {
    async fn prepare(
        &self,
        cancel: &CancellationToken,
        renderer: &dyn Renderer,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Task>>;
}

/// Run `fut`, aborting with [`DriverError::Cancelled`] as soon as `cancel`
/// fires. The future is dropped on cancellation.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> std::result::Result<T, DriverError>
where
    F: Future<Output = std::result::Result<T, DriverError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DriverError::Cancelled),
        res = fut => res,
    }
}

/// Fail fast if the token already fired.
pub fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(TaskError::Cancelled);
    }
    Ok(())
}
