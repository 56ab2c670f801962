//! Logical volume resource.
//!
//! `check` tolerates a missing volume group: it assumes an earlier step will
//! create the group and plans the volume anyway. `apply` has no later step
//! to wait for, so a missing group is fatal there.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LvmDriver, LvmSize, device_mapper_path};
use crate::error::{DriverError, Result, TaskError};
use crate::render::Renderer;
use crate::status::{Status, StatusLevel, TaskStatus};
use crate::task::{Preparer, Task, ensure_active};

/// Registered kind name.
pub const KIND: &str = "lvm.logicalvolume";

/// What `apply` does when LVM reports a device path other than the planned
/// one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergencePolicy {
    /// Record a warning line and continue.
    #[default]
    Warn,
    /// Fail the apply with [`TaskError::PathDivergence`].
    Fatal,
}

/// Where the resource is in its check/apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LvPhase {
    Unchecked,
    /// Group absent at check time; volume planned on the assumption it
    /// will be created first.
    GroupMissingPlanned,
    NeedsCreate,
    AlreadyExists,
    Applied,
}

/// Logical volume report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LvStatus {
    pub status: Status,
    pub device_path: String,
}

impl TaskStatus for LvStatus {
    fn report(&self) -> &Status {
        &self.status
    }

    fn details(&self) -> BTreeMap<String, String> {
        let mut details = BTreeMap::new();
        details.insert("device_path".to_string(), self.device_path.clone());
        details
    }
}

/// A logical volume `group/name` reconciled against an [`LvmDriver`].
pub struct LogicalVolume {
    group: String,
    name: String,
    size: LvmSize,
    lvm: Arc<dyn LvmDriver>,
    on_divergence: DivergencePolicy,
    planned_path: String,
    needs_create: bool,
    device_path: Option<String>,
    phase: LvPhase,
}

impl LogicalVolume {
    /// Volume with the default [`DivergencePolicy`]; the planned path is fixed here.
    pub fn new(lvm: Arc<dyn LvmDriver>, group: &str, name: &str, size: LvmSize) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            size,
            lvm,
            on_divergence: DivergencePolicy::default(),
            planned_path: device_mapper_path(group, name),
            needs_create: false,
            device_path: None,
            phase: LvPhase::Unchecked,
        }
    }

    /// Override how `apply` treats a device path other than the planned one.
    pub fn with_divergence_policy(mut self, policy: DivergencePolicy) -> Self {
        self.on_divergence = policy;
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> LvPhase {
        self.phase
    }

    pub fn needs_create(&self) -> bool {
        self.needs_create
    }

    pub fn planned_device_path(&self) -> &str {
        &self.planned_path
    }

    /// Device path resolved by the last successful `apply`.
    pub fn device_path(&self) -> Option<&str> {
        self.device_path.as_deref()
    }

    /// Plan the volume without touching it.
    pub async fn check_volume(&mut self, cancel: &CancellationToken) -> Result<LvStatus> {
        ensure_active(cancel)?;
        let mut report = LvStatus::default();

        self.lvm
            .check_prerequisites(cancel)
            .await
            .map_err(|e| match e {
                DriverError::Cancelled => TaskError::Cancelled,
                other => TaskError::Prerequisites(other),
            })?;

        if self.group_exists(cancel, false).await? {
            let volumes = self.lvm.list_logical_volumes(cancel, &self.group).await?;
            self.needs_create = !volumes.contains_key(&self.name);
            self.phase = if self.needs_create {
                LvPhase::NeedsCreate
            } else {
                LvPhase::AlreadyExists
            };
        } else {
            report.status.add_message(format!(
                "group {} does not exist, assuming it will be created",
                self.group
            ));
            self.needs_create = true;
            self.phase = LvPhase::GroupMissingPlanned;
        }

        report.device_path = self.planned_path.clone();
        if self.needs_create {
            report.status.raise_level(StatusLevel::WillChange);
            report.status.add_difference(
                self.name.clone(),
                "<not exists>",
                format!("created {}", self.planned_path),
                "",
            );
        }

        debug!(
            group = %self.group,
            name = %self.name,
            needs_create = self.needs_create,
            "Checked logical volume"
        );
        Ok(report)
    }

    /// Create the volume if it is still missing and wait for its device.
    pub async fn apply_volume(&mut self, cancel: &CancellationToken) -> Result<LvStatus> {
        ensure_active(cancel)?;
        let mut report = LvStatus::default();

        self.group_exists(cancel, true).await?;

        let volumes = self.lvm.list_logical_volumes(cancel, &self.group).await?;
        let exists = volumes.contains_key(&self.name);
        if exists && self.needs_create {
            report.status.add_message(format!(
                "volume {}/{} already exists, skipping creation",
                self.group, self.name
            ));
        }
        self.needs_create = !exists;

        if self.needs_create {
            info!(group = %self.group, name = %self.name, size = %self.size, "Creating logical volume");
            report.status.add_message(format!(
                "creating volume {}/{} ({})",
                self.group, self.name, self.size
            ));
            self.lvm
                .create_logical_volume(cancel, &self.group, &self.name, &self.size)
                .await?;
            self.needs_create = false;
            report.status.raise_level(StatusLevel::WillChange);
            report.status.add_difference(
                self.name.clone(),
                "<not exists>",
                format!("created {}", self.planned_path),
                "",
            );
        }

        let device_path = self.resolve_device_path(cancel).await?;
        if device_path != self.planned_path {
            match self.on_divergence {
                DivergencePolicy::Warn => {
                    warn!(
                        planned = %self.planned_path,
                        actual = %device_path,
                        "Device path diverges from plan"
                    );
                    report.status.add_message(format!(
                        "WARN: real device path '{}' diverges from planned '{}'",
                        device_path, self.planned_path
                    ));
                }
                DivergencePolicy::Fatal => {
                    report.status.raise_level(StatusLevel::Fatal);
                    return Err(TaskError::PathDivergence {
                        planned: self.planned_path.clone(),
                        actual: device_path,
                        report: report.status,
                    });
                }
            }
        }
        report.device_path = device_path.clone();
        self.device_path = Some(device_path.clone());

        match self.lvm.wait_for_device(cancel, &device_path).await {
            Ok(()) => {}
            Err(DriverError::Cancelled) => return Err(TaskError::Cancelled),
            Err(source) => {
                report.status.add_message(format!(
                    "device {} did not become ready: {}",
                    device_path, source
                ));
                report.status.raise_level(StatusLevel::Fatal);
                return Err(TaskError::NotReady {
                    device_path,
                    source,
                    report: report.status,
                });
            }
        }

        self.phase = LvPhase::Applied;
        Ok(report)
    }

    /// Look the group up. With `escalate`, absence is an error.
    async fn group_exists(&self, cancel: &CancellationToken, escalate: bool) -> Result<bool> {
        let groups = self.lvm.list_volume_groups(cancel).await?;
        let found = groups.contains_key(&self.group);
        if !found && escalate {
            return Err(TaskError::GroupMissing {
                group: self.group.clone(),
            });
        }
        Ok(found)
    }

    async fn resolve_device_path(&self, cancel: &CancellationToken) -> Result<String> {
        let volumes = self.lvm.list_logical_volumes(cancel, &self.group).await?;
        volumes
            .get(&self.name)
            .map(|lv| lv.device_path.clone())
            .ok_or_else(|| TaskError::DevicePathUnresolved {
                group: self.group.clone(),
                name: self.name.clone(),
            })
    }
}

#[async_trait]
impl Task for LogicalVolume {
    async fn check(
        &mut self,
        cancel: &CancellationToken,
        _renderer: &dyn Renderer,
    ) -> Result<Box<dyn TaskStatus>> {
        Ok(Box::new(self.check_volume(cancel).await?))
    }

    async fn apply(&mut self, cancel: &CancellationToken) -> Result<Box<dyn TaskStatus>> {
        Ok(Box::new(self.apply_volume(cancel).await?))
    }
}

/// Declared configuration for [`KIND`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogicalVolumeConfig {
    pub group: String,
    pub name: String,
    pub size: String,
    #[serde(default)]
    pub on_path_divergence: DivergencePolicy,
}

/// Builds [`LogicalVolume`] tasks against a shared driver.
pub struct LogicalVolumePreparer {
    lvm: Arc<dyn LvmDriver>,
}

impl LogicalVolumePreparer {
    pub fn new(lvm: Arc<dyn LvmDriver>) -> Self {
        Self { lvm }
    }
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TaskError::InvalidConfig(format!("{}: {} is required", KIND, field)));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(TaskError::InvalidConfig(format!(
            "{}: {} '{}' must not contain '/' or whitespace",
            KIND, field, value
        )));
    }
    Ok(())
}

#[async_trait]
impl Preparer for LogicalVolumePreparer {
    async fn prepare(
        &self,
        cancel: &CancellationToken,
        renderer: &dyn Renderer,
        config: &serde_json::Value,
    ) -> Result<Box<dyn Task>> {
        ensure_active(cancel)?;

        let config: LogicalVolumeConfig = serde_json::from_value(config.clone())
            .map_err(|e| TaskError::InvalidConfig(format!("{}: {}", KIND, e)))?;

        let group = renderer.render("group", &config.group)?;
        let name = renderer.render("name", &config.name)?;
        let size = renderer.render("size", &config.size)?;

        validate_name("group", &group)?;
        validate_name("name", &name)?;
        let size: LvmSize = size
            .parse()
            .map_err(|e| TaskError::InvalidConfig(format!("{}: {}", KIND, e)))?;

        Ok(Box::new(
            LogicalVolume::new(Arc::clone(&self.lvm), &group, &name, size)
                .with_divergence_policy(config.on_path_divergence),
        ))
    }
}
