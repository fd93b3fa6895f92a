//! Device transport: running commands and capturing UI dumps.
//!
//! The farm talks to devices through two narrow traits so sessions can be
//! driven by a fake in tests. [`AdbTransport`] implements both over the
//! `adb` executable.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use dialfarm_core::device::{parse_device_list, DeviceId};
use dialfarm_core::elements::hierarchy::{parse_hierarchy, UiSnapshot};
use dialfarm_core::error::ApiError;
use tokio::process::Command;
use tracing::debug;

/// Failures running the bridge executable.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
}

/// Request/response command execution against attached devices.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serials of devices ready for commands.
    async fn list_devices(&self) -> Result<Vec<DeviceId>, ApiError>;

    /// Run a shell command on a device and return its stdout.
    async fn shell(&self, device: &DeviceId, command: &str) -> Result<String, ApiError>;
}

/// Source of on-screen element trees.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn capture(&self, device: &DeviceId) -> Result<UiSnapshot, ApiError>;
}

/// [`Transport`] and [`SnapshotProvider`] backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    program: PathBuf,
}

impl AdbTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run adb with the given arguments and return stdout.
    ///
    /// The child is killed if the returned future is dropped, so abandoning
    /// a session doesn't leave adb processes behind.
    async fn run(&self, args: &[&str]) -> Result<String, TransportError> {
        debug!("adb {}", args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| TransportError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(TransportError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Transport for AdbTransport {
    async fn list_devices(&self) -> Result<Vec<DeviceId>, ApiError> {
        let out = self
            .run(&["devices"])
            .await
            .map_err(|e| ApiError::transport_failed("adb devices", e.to_string()))?;
        Ok(parse_device_list(&out))
    }

    async fn shell(&self, device: &DeviceId, command: &str) -> Result<String, ApiError> {
        self.run(&["-s", device.as_str(), "shell", command])
            .await
            .map_err(|e| ApiError::transport_failed(command, e.to_string()))
    }
}

#[async_trait]
impl SnapshotProvider for AdbTransport {
    async fn capture(&self, device: &DeviceId) -> Result<UiSnapshot, ApiError> {
        let xml = self
            .run(&[
                "-s",
                device.as_str(),
                "exec-out",
                "uiautomator",
                "dump",
                "/dev/tty",
            ])
            .await
            .map_err(|e| ApiError::transport_failed("uiautomator dump", e.to_string()))?;
        parse_hierarchy(&xml)
    }
}
