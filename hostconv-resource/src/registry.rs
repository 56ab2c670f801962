//! Resource kind registry.
//!
//! Maps a kind name (e.g. `lvm.logicalvolume`) to the [`Preparer`] that
//! builds tasks of that kind. The registry is assembled once at start-up
//! through [`RegistryBuilder`] and is read-only afterwards; callers share it
//! behind an `Arc` instead of reaching for global state.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TaskError};
use crate::render::Renderer;
use crate::task::{Preparer, Task};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("resource kind '{0}' is already registered")]
    Duplicate(String),

    #[error("resource kind name must not be empty")]
    EmptyKind,
}

/// Collects kind registrations before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    kinds: BTreeMap<String, Arc<dyn Preparer>>,
}

impl RegistryBuilder {
    /// Register `preparer` under `kind`. Each kind may be registered once.
    pub fn register(
        mut self,
        kind: impl Into<String>,
        preparer: Arc<dyn Preparer>,
    ) -> std::result::Result<Self, RegistryError> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(RegistryError::EmptyKind);
        }
        if self.kinds.contains_key(&kind) {
            return Err(RegistryError::Duplicate(kind));
        }
        self.kinds.insert(kind, preparer);
        Ok(self)
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry { kinds: self.kinds }
    }
}

/// Immutable kind lookup table.
pub struct TypeRegistry {
    kinds: BTreeMap<String, Arc<dyn Preparer>>,
}

impl TypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Preparer>> {
        self.kinds.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Look up `kind` and prepare a task from `config`.
    pub async fn prepare(
        &self,
        kind: &str,
        cancel: &CancellationToken,
        renderer: &dyn Renderer,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Task>> {
        let preparer = self
            .get(kind)
            .ok_or_else(|| TaskError::UnknownKind(kind.to_string()))?;
        preparer.prepare(cancel, renderer, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ParamRenderer;
    use crate::status::{Status, TaskStatus};
    use async_trait::async_trait;

    struct NoopTask;

    #[async_trait]
    impl Task for NoopTask {
        async fn check(
            &mut self,
            _cancel: &CancellationToken,
            _renderer: &dyn Renderer,
        ) -> Result<Box<dyn TaskStatus>> {
            Ok(Box::new(Status::new()))
        }

        async fn apply(&mut self, _cancel: &CancellationToken) -> Result<Box<dyn TaskStatus>> {
            Ok(Box::new(Status::new()))
        }
    }

    struct NoopPreparer;

    #[async_trait]
    impl Preparer for NoopPreparer {
        async fn prepare(
            &self,
            _cancel: &CancellationToken,
            _renderer: &dyn Renderer,
            _config: &serde_json::Value,
        ) -> Result<Box<dyn Task>> {
            Ok(Box::new(NoopTask))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = TypeRegistry::builder()
            .register("noop", Arc::new(NoopPreparer))
            .unwrap()
            .build();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("noop"));
        assert!(registry.get("other").is_none());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["noop"]);
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = TypeRegistry::builder()
            .register("noop", Arc::new(NoopPreparer))
            .unwrap()
            .register("noop", Arc::new(NoopPreparer))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::Duplicate("noop".to_string()));
    }

    #[test]
    fn test_empty_kind_rejected() {
        let err = TypeRegistry::builder()
            .register("", Arc::new(NoopPreparer))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::EmptyKind);
    }

    #[tokio::test]
    async fn test_prepare_unknown_kind() {
        let registry = TypeRegistry::builder().build();
        let res = registry
            .prepare(
                "missing",
                &CancellationToken::new(),
                &ParamRenderer::default(),
                &serde_json::Value::Null,
            )
            .await;
        assert!(matches!(res, Err(TaskError::UnknownKind(kind)) if kind == "missing"));
    }

    #[tokio::test]
    async fn test_prepare_dispatches_to_preparer() {
        let registry = TypeRegistry::builder()
            .register("noop", Arc::new(NoopPreparer))
            .unwrap()
            .build();
        let cancel = CancellationToken::new();
        let renderer = ParamRenderer::default();

        let mut task = registry
            .prepare("noop", &cancel, &renderer, &serde_json::Value::Null)
            .await
            .unwrap();
        let status = task.check(&cancel, &renderer).await.unwrap();
        assert!(!status.report().has_changes());
    }
}
