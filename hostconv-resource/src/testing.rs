//! In-memory LVM driver for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;
use crate::lvm::{LogicalVolumeInfo, LvmDriver, LvmSize, VolumeGroupInfo, device_mapper_path};
use crate::task::cancellable;

/// A `create_logical_volume` call as the fake saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    pub group: String,
    pub name: String,
    pub size: String,
}

#[derive(Debug, Default)]
struct State {
    groups: BTreeSet<String>,
    volumes: BTreeMap<(String, String), LogicalVolumeInfo>,
    creates: Vec<CreateCall>,
    path_override: Option<String>,
    prerequisites_error: Option<String>,
    query_error: Option<String>,
    wait_timeout: bool,
    create_delay: Option<Duration>,
    create_error: Option<String>,
    hide_created: bool,
    waits: Vec<String>,
}

/// Fake [`LvmDriver`] keeping groups and volumes in memory.
#[derive(Debug, Default)]
pub struct FakeLvm {
    state: Mutex<State>,
}

impl FakeLvm {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_group(self, group: &str) -> Self {
        self.add_group(group);
        self
    }

    pub fn with_volume(self, group: &str, name: &str) -> Self {
        self.add_group(group);
        self.insert_volume(group, name, device_mapper_path(group, name));
        self
    }

    /// Report `path` for every volume created from now on.
    pub fn with_device_path(self, path: &str) -> Self {
        self.state().path_override = Some(path.to_string());
        self
    }

    pub fn with_prerequisites_error(self, message: &str) -> Self {
        self.state().prerequisites_error = Some(message.to_string());
        self
    }

    pub fn with_query_error(self, message: &str) -> Self {
        self.state().query_error = Some(message.to_string());
        self
    }

    /// Make `wait_for_device` time out.
    pub fn with_wait_timeout(self) -> Self {
        self.state().wait_timeout = true;
        self
    }

    /// Make `create_logical_volume` block for `delay` before creating.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.state().create_delay = Some(delay);
        self
    }

    /// Make `create_logical_volume` fail with `message` as lvcreate stderr.
    pub fn with_create_error(self, message: &str) -> Self {
        self.state().create_error = Some(message.to_string());
        self
    }

    /// Report created volumes as success but never list them.
    pub fn with_unlisted_creates(self) -> Self {
        self.state().hide_created = true;
        self
    }

    /// Simulate another actor creating the group.
    pub fn add_group(&self, group: &str) {
        self.state().groups.insert(group.to_string());
    }

    /// Simulate another actor creating a volume.
    pub fn add_volume(&self, group: &str, name: &str) {
        self.add_group(group);
        self.insert_volume(group, name, device_mapper_path(group, name));
    }

    fn insert_volume(&self, group: &str, name: &str, device_path: String) {
        self.state().volumes.insert(
            (group.to_string(), name.to_string()),
            LogicalVolumeInfo {
                name: name.to_string(),
                group: group.to_string(),
                device_path,
                size_bytes: 0,
            },
        );
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        self.state().creates.clone()
    }

    pub fn volume_count(&self) -> usize {
        self.state().volumes.len()
    }

    /// Paths passed to `wait_for_device`, in call order.
    pub fn waits(&self) -> Vec<String> {
        self.state().waits.clone()
    }
}

#[async_trait]
impl LvmDriver for FakeLvm {
    async fn check_prerequisites(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        match &self.state().prerequisites_error {
            Some(message) => Err(DriverError::CommandFailed {
                command: "lvm version".to_string(),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn list_volume_groups(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, VolumeGroupInfo>, DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let state = self.state();
        if let Some(message) = &state.query_error {
            return Err(DriverError::CommandFailed {
                command: "vgs".to_string(),
                stderr: message.clone(),
            });
        }
        Ok(state
            .groups
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    VolumeGroupInfo {
                        name: name.clone(),
                        size_bytes: 0,
                        free_bytes: 0,
                    },
                )
            })
            .collect())
    }

    async fn list_logical_volumes(
        &self,
        cancel: &CancellationToken,
        group: &str,
    ) -> Result<BTreeMap<String, LogicalVolumeInfo>, DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let state = self.state();
        if !state.groups.contains(group) {
            return Err(DriverError::NotFound(format!("volume group {}", group)));
        }
        Ok(state
            .volumes
            .values()
            .filter(|lv| lv.group == group)
            .map(|lv| (lv.name.clone(), lv.clone()))
            .collect())
    }

    async fn create_logical_volume(
        &self,
        cancel: &CancellationToken,
        group: &str,
        name: &str,
        size: &LvmSize,
    ) -> Result<(), DriverError> {
        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            cancellable(cancel, async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }

        let device_path = {
            let mut state = self.state();
            if !state.groups.contains(group) {
                return Err(DriverError::NotFound(format!("volume group {}", group)));
            }
            state.creates.push(CreateCall {
                group: group.to_string(),
                name: name.to_string(),
                size: size.to_string(),
            });
            if let Some(message) = &state.create_error {
                return Err(DriverError::CommandFailed {
                    command: "lvcreate".to_string(),
                    stderr: message.clone(),
                });
            }
            if state.hide_created {
                return Ok(());
            }
            state
                .path_override
                .clone()
                .unwrap_or_else(|| device_mapper_path(group, name))
        };
        self.insert_volume(group, name, device_path);
        Ok(())
    }

    async fn wait_for_device(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<(), DriverError> {
        if cancel.is_cancelled() {
            return Err(DriverError::Cancelled);
        }
        let mut state = self.state();
        state.waits.push(path.to_string());
        if state.wait_timeout {
            return Err(DriverError::Timeout {
                path: path.to_string(),
                waited: Duration::from_secs(30),
            });
        }
        if state.volumes.values().any(|lv| lv.device_path == path) {
            Ok(())
        } else {
            Err(DriverError::NotFound(format!("device {}", path)))
        }
    }
}
