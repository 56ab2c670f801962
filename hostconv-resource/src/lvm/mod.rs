//! LVM resources and the driver they run against.
//!
//! The [`LvmDriver`] trait is the only way resources touch the volume
//! manager. [`LvmCli`] implements it with the `lvm` command-line tools.

pub mod cli;
pub mod lv;
pub mod size;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DriverError;

pub use cli::LvmCli;
pub use lv::{DivergencePolicy, LogicalVolume, LogicalVolumePreparer, LvPhase, LvStatus};
pub use size::LvmSize;

/// Volume group snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeGroupInfo {
    pub name: String,
    pub size_bytes: u64,
    pub free_bytes: u64,
}

/// Logical volume snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalVolumeInfo {
    pub name: String,
    pub group: String,
    /// Device path as reported by LVM (e.g. "/dev/mapper/vg0-data").
    pub device_path: String,
    pub size_bytes: u64,
}

/// Volume manager capability consumed by LVM resources.
///
/// Every call may block and must honor `cancel`, returning
/// [`DriverError::Cancelled`] once it fires.
#[async_trait]
pub trait LvmDriver: Send + Sync {
    /// Verify the volume manager itself is usable.
    async fn check_prerequisites(&self, cancel: &CancellationToken) -> Result<(), DriverError>;

    async fn list_volume_groups(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, VolumeGroupInfo>, DriverError>;

    async fn list_logical_volumes(
        &self,
        cancel: &CancellationToken,
        group: &str,
    ) -> Result<BTreeMap<String, LogicalVolumeInfo>, DriverError>;

    async fn create_logical_volume(
        &self,
        cancel: &CancellationToken,
        group: &str,
        name: &str,
        size: &LvmSize,
    ) -> Result<(), DriverError>;

    /// Block until `path` is usable as a block device.
    async fn wait_for_device(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<(), DriverError>;
}

/// Device-mapper path for `group/name`.
///
/// Device-mapper joins the two with a single `-` and doubles any `-` inside
/// either name.
pub fn device_mapper_path(group: &str, name: &str) -> String {
    format!(
        "/dev/mapper/{}-{}",
        group.replace('-', "--"),
        name.replace('-', "--")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_mapper_path() {
        assert_eq!(device_mapper_path("vg0", "data"), "/dev/mapper/vg0-data");
        assert_eq!(
            device_mapper_path("vg-main", "db-data"),
            "/dev/mapper/vg--main-db--data"
        );
    }
}
