//! LVM driver backed by the `lvm` command-line tools.

use std::collections::BTreeMap;
use std::os::unix::fs::FileTypeExt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{LogicalVolumeInfo, LvmDriver, LvmSize, VolumeGroupInfo};
use crate::error::DriverError;
use crate::task::cancellable;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Driver that shells out to `lvm`, `vgs`, `lvs` and `lvcreate`.
#[derive(Debug, Clone)]
pub struct LvmCli {
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl Default for LvmCli {
    fn default() -> Self {
        Self::new()
    }
}

impl LvmCli {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Override how long `wait_for_device` polls and how often.
    pub fn with_wait(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<String, DriverError> {
        let command = format!("{} {}", program, args.join(" "));
        debug!(command = %command, "Running lvm command");

        let output = cancellable(cancel, async {
            Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|source| DriverError::Io {
                    command: command.clone(),
                    source,
                })
        })
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::CommandFailed {
                command,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LvmDriver for LvmCli {
    async fn check_prerequisites(&self, cancel: &CancellationToken) -> Result<(), DriverError> {
        self.run(cancel, "lvm", &["version"]).await?;
        Ok(())
    }

    async fn list_volume_groups(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, VolumeGroupInfo>, DriverError> {
        let stdout = self
            .run(
                cancel,
                "vgs",
                &[
                    "--noheadings",
                    "--units",
                    "b",
                    "--nosuffix",
                    "--separator",
                    "\t",
                    "-o",
                    "vg_name,vg_size,vg_free",
                ],
            )
            .await?;

        parse_vgs(&stdout)
    }

    async fn list_logical_volumes(
        &self,
        cancel: &CancellationToken,
        group: &str,
    ) -> Result<BTreeMap<String, LogicalVolumeInfo>, DriverError> {
        let stdout = self
            .run(
                cancel,
                "lvs",
                &[
                    "--noheadings",
                    "--units",
                    "b",
                    "--nosuffix",
                    "--separator",
                    "\t",
                    "-o",
                    "lv_name,vg_name,lv_dm_path,lv_size",
                    group,
                ],
            )
            .await?;

        parse_lvs(&stdout)
    }

    async fn create_logical_volume(
        &self,
        cancel: &CancellationToken,
        group: &str,
        name: &str,
        size: &LvmSize,
    ) -> Result<(), DriverError> {
        let size_option = size.option();
        info!(group = %group, name = %name, size = %size, "Creating logical volume");

        self.run(cancel, "lvcreate", &["-n", name, &size_option, group])
            .await?;
        Ok(())
    }

    async fn wait_for_device(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        loop {
            let ready = match tokio::fs::metadata(path).await {
                Ok(meta) => meta.file_type().is_block_device(),
                Err(_) => false,
            };
            if ready {
                debug!(path = %path, waited = ?started.elapsed(), "Device ready");
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.wait_timeout {
                return Err(DriverError::Timeout {
                    path: path.to_string(),
                    waited,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DriverError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

fn split_row(line: &str) -> Vec<&str> {
    line.split('\t').map(str::trim).collect()
}

fn parse_bytes(command: &str, line: &str, value: &str) -> Result<u64, DriverError> {
    value.parse().map_err(|_| DriverError::Parse {
        command: command.to_string(),
        line: line.to_string(),
    })
}

/// Parse `vgs --noheadings --separator '\t' -o vg_name,vg_size,vg_free`.
fn parse_vgs(output: &str) -> Result<BTreeMap<String, VolumeGroupInfo>, DriverError> {
    let mut groups = BTreeMap::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let cols = split_row(line);
        if cols.len() < 3 || cols[0].is_empty() {
            return Err(DriverError::Parse {
                command: "vgs".to_string(),
                line: line.to_string(),
            });
        }

        let info = VolumeGroupInfo {
            name: cols[0].to_string(),
            size_bytes: parse_bytes("vgs", line, cols[1])?,
            free_bytes: parse_bytes("vgs", line, cols[2])?,
        };
        groups.insert(info.name.clone(), info);
    }

    Ok(groups)
}

/// Parse `lvs --noheadings --separator '\t' -o lv_name,vg_name,lv_dm_path,lv_size`.
fn parse_lvs(output: &str) -> Result<BTreeMap<String, LogicalVolumeInfo>, DriverError> {
    let mut volumes = BTreeMap::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let cols = split_row(line);
        if cols.len() < 4 || cols[0].is_empty() {
            return Err(DriverError::Parse {
                command: "lvs".to_string(),
                line: line.to_string(),
            });
        }

        let info = LogicalVolumeInfo {
            name: cols[0].to_string(),
            group: cols[1].to_string(),
            device_path: cols[2].to_string(),
            size_bytes: parse_bytes("lvs", line, cols[3])?,
        };
        volumes.insert(info.name.clone(), info);
    }

    Ok(volumes)
}
