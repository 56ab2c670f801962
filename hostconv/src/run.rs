//! Sequential plan/apply over declared resources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hostconv_resource::{Renderer, Status, StatusLevel, TaskError, TaskStatus, TypeRegistry};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ResourceDecl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Check only.
    Plan,
    /// Check, then apply whatever check says will change.
    Apply,
}

/// Which phase produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    Check,
    Apply,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub id: String,
    pub kind: String,
    pub phase: Phase,
    pub status: Status,
    pub details: BTreeMap<String, String>,
    pub error: Option<String>,
}

impl Outcome {
    fn new(decl: &ResourceDecl, phase: Phase, status: &dyn TaskStatus) -> Self {
        Self {
            id: decl.id.clone(),
            kind: decl.kind.clone(),
            phase,
            status: status.report().clone(),
            details: status.details(),
            error: None,
        }
    }

    fn failed(decl: &ResourceDecl, phase: Phase, err: &TaskError) -> Self {
        let mut status = err.report().cloned().unwrap_or_default();
        status.raise_level(StatusLevel::Fatal);
        Self {
            id: decl.id.clone(),
            kind: decl.kind.clone(),
            phase,
            status,
            details: BTreeMap::new(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn failed(&self) -> bool {
        self.cancelled || self.outcomes.iter().any(|o| o.error.is_some())
    }

    pub fn pending_changes(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_none() && o.status.level == StatusLevel::WillChange)
            .count()
    }
}

/// Drives resources one at a time through prepare, check and apply.
pub struct Runner<'a> {
    registry: &'a TypeRegistry,
    renderer: &'a dyn Renderer,
    cancel: CancellationToken,
    host: String,
}

impl<'a> Runner<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        renderer: &'a dyn Renderer,
        cancel: CancellationToken,
        host: String,
    ) -> Self {
        Self {
            registry,
            renderer,
            cancel,
            host,
        }
    }

    pub async fn run(&self, resources: &[ResourceDecl], mode: Mode) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(resources.len());
        let mut cancelled = false;

        for decl in resources {
            let span = info_span!("resource", run = %run_id, id = %decl.id, kind = %decl.kind);
            match self.reconcile(decl, mode).instrument(span).await {
                Ok(outcome) => outcomes.push(outcome),
                Err((phase, TaskError::Cancelled)) => {
                    warn!(id = %decl.id, "Run cancelled");
                    outcomes.push(Outcome::failed(decl, phase, &TaskError::Cancelled));
                    cancelled = true;
                    break;
                }
                Err((phase, e)) => {
                    error!(id = %decl.id, error = %e, "Resource failed");
                    outcomes.push(Outcome::failed(decl, phase, &e));
                }
            }
        }

        RunSummary {
            run_id,
            host: self.host.clone(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
            outcomes,
        }
    }

    async fn reconcile(
        &self,
        decl: &ResourceDecl,
        mode: Mode,
    ) -> Result<Outcome, (Phase, TaskError)> {
        let mut task = self
            .registry
            .prepare(&decl.kind, &self.cancel, self.renderer, &decl.config)
            .await
            .map_err(|e| (Phase::Prepare, e))?;

        let checked = task
            .check(&self.cancel, self.renderer)
            .await
            .map_err(|e| (Phase::Check, e))?;
        let level = checked.report().level;
        info!(level = %level, "Checked");

        if mode == Mode::Plan || level != StatusLevel::WillChange {
            return Ok(Outcome::new(decl, Phase::Check, &*checked));
        }

        let applied = task
            .apply(&self.cancel)
            .await
            .map_err(|e| (Phase::Apply, e))?;
        info!(level = %applied.report().level, "Applied");
        Ok(Outcome::new(decl, Phase::Apply, &*applied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceFile;
    use hostconv_resource::lvm::LvmDriver;
    use hostconv_resource::testing::FakeLvm;
    use hostconv_resource::{ParamRenderer, default_registry};
    use std::sync::Arc;

    const FILE: &str = r#"{
        "params": { "vg": "vg0" },
        "resources": [
            { "id": "data", "kind": "lvm.logicalvolume",
              "config": { "group": "{{param \"vg\"}}", "name": "data", "size": "10G" } },
            { "id": "swap", "kind": "lvm.logicalvolume",
              "config": { "group": "{{param \"vg\"}}", "name": "swap", "size": "2G" } }
        ]
    }"#;

    fn setup(lvm: &Arc<FakeLvm>) -> (TypeRegistry, ParamRenderer, ResourceFile) {
        let registry = default_registry(Arc::clone(lvm) as Arc<dyn LvmDriver>).unwrap();
        let file = ResourceFile::parse(FILE).unwrap();
        let renderer = ParamRenderer::new(file.params.clone());
        (registry, renderer, file)
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let lvm = Arc::new(FakeLvm::new().with_volume("vg0", "swap"));
        let (registry, renderer, file) = setup(&lvm);
        let runner = Runner::new(&registry, &renderer, CancellationToken::new(), "h".into());

        let summary = runner.run(&file.resources, Mode::Plan).await;

        assert!(!summary.failed());
        assert_eq!(summary.pending_changes(), 1);
        assert_eq!(summary.outcomes[0].phase, Phase::Check);
        assert_eq!(summary.outcomes[0].status.level, StatusLevel::WillChange);
        assert_eq!(summary.outcomes[1].status.level, StatusLevel::NoChange);
        assert!(lvm.creates().is_empty());
    }

    #[tokio::test]
    async fn test_apply_only_touches_changed_resources() {
        let lvm = Arc::new(FakeLvm::new().with_volume("vg0", "swap"));
        let (registry, renderer, file) = setup(&lvm);
        let runner = Runner::new(&registry, &renderer, CancellationToken::new(), "h".into());

        let summary = runner.run(&file.resources, Mode::Apply).await;

        assert!(!summary.failed());
        assert_eq!(summary.outcomes[0].phase, Phase::Apply);
        assert_eq!(
            summary.outcomes[0].details["device_path"],
            "/dev/mapper/vg0-data"
        );
        assert_eq!(summary.outcomes[1].phase, Phase::Check);
        assert_eq!(lvm.creates().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_run_continues() {
        let lvm = Arc::new(FakeLvm::new());
        let (registry, renderer, mut file) = setup(&lvm);
        file.resources.insert(
            0,
            ResourceDecl {
                id: "bogus".to_string(),
                kind: "lvm.thinpool".to_string(),
                config: serde_json::Value::Null,
            },
        );
        let runner = Runner::new(&registry, &renderer, CancellationToken::new(), "h".into());

        let summary = runner.run(&file.resources, Mode::Apply).await;

        assert!(summary.failed());
        assert_eq!(summary.outcomes.len(), 3);
        assert_eq!(summary.outcomes[0].phase, Phase::Prepare);
        assert!(
            summary.outcomes[0]
                .error
                .as_deref()
                .unwrap()
                .contains("unknown resource kind")
        );
        assert_eq!(summary.outcomes[1].phase, Phase::Apply);
        assert_eq!(summary.outcomes[1].status.level, StatusLevel::Fatal);
        assert!(
            summary.outcomes[1]
                .error
                .as_deref()
                .unwrap()
                .contains("volume group vg0 does not exist")
        );
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let lvm = Arc::new(FakeLvm::new().with_group("vg0"));
        let (registry, renderer, file) = setup(&lvm);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = Runner::new(&registry, &renderer, cancel, "h".into());

        let summary = runner.run(&file.resources, Mode::Apply).await;

        assert!(summary.cancelled);
        assert!(summary.failed());
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.outcomes[0].phase, Phase::Prepare);
        assert!(lvm.creates().is_empty());
    }
}
