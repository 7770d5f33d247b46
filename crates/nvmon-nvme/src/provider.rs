//! Device discovery, identity attributes and type classification.
//!
//! [`DeviceInfoProvider`] is the seam between the collector and the
//! operating system: the Linux implementation reads `/dev` and sysfs and
//! issues ioctls, while tests substitute an in-memory provider.

use std::path::{Path, PathBuf};

use nvmon_common::types::DeviceType;

use crate::device::{parse_device_file_name, DeviceFileAttributes, NVME_DEVICE_PREFIX};
use crate::error::{NvmeError, Result};
use crate::logpage::{EbsMetrics, InstanceStoreMetrics};

/// Model string EBS volumes report through sysfs.
pub const EBS_DEVICE_MODEL: &str = "Amazon Elastic Block Store";

/// Model string Instance Store volumes report through sysfs.
pub const INSTANCE_STORE_DEVICE_MODEL: &str = "Amazon EC2 NVMe Instance Storage";

/// Access to NVMe device enumeration, identity attributes and log pages.
pub trait DeviceInfoProvider {
    /// Enumerate NVMe namespace/partition device files.
    fn all_devices(&self) -> Result<Vec<DeviceFileAttributes>>;

    /// Model string for the device's controller, trimmed.
    fn device_model(&self, device: &DeviceFileAttributes) -> Result<String>;

    /// Serial number for the device's controller, trimmed.
    fn device_serial(&self, device: &DeviceFileAttributes) -> Result<String>;

    /// Sanitized absolute path to the device node.
    fn device_path(&self, device_name: &str) -> Result<PathBuf>;

    /// Fetch and decode the EBS log page from a device node.
    fn ebs_metrics(&self, path: &Path) -> Result<EbsMetrics>;

    /// Fetch and decode the Instance Store log page from a device node.
    fn instance_store_metrics(&self, path: &Path) -> Result<InstanceStoreMetrics>;

    /// Whether the device is an EBS volume. Model comparison only; EBS
    /// devices are not probed with an ioctl here.
    fn is_ebs_device(&self, device: &DeviceFileAttributes) -> Result<bool> {
        Ok(self.device_model(device)? == EBS_DEVICE_MODEL)
    }

    /// Whether the device is an Instance Store volume.
    ///
    /// Two stages: the model string must match, and a live log-page read
    /// must return the Instance Store magic number. A present-but-wrong
    /// magic is escalated as an error; any other probe failure classifies
    /// the device as "not Instance Store" without error.
    fn is_instance_store_device(&self, device: &DeviceFileAttributes) -> Result<bool> {
        let model = self.device_model(device)?;
        if model != INSTANCE_STORE_DEVICE_MODEL {
            return Ok(false);
        }

        let path = self.device_path(device.device_name())?;
        match self.instance_store_metrics(&path) {
            Ok(_) => Ok(true),
            Err(e) => {
                if matches!(e.root_cause(), NvmeError::InvalidInstanceStoreMagic { .. }) {
                    return Err(e.wrap(
                        "instance store confirmation",
                        device.device_name(),
                        &[
                            ("step", "magic number verification"),
                            ("model", &model),
                            ("issue", "device model matches but magic number does not"),
                        ],
                    ));
                }
                Ok(false)
            }
        }
    }

    /// Classify the device as EBS or Instance Store.
    ///
    /// EBS wins when both model strings would match (they cannot on real
    /// hardware). Recoverable probe failures propagate so the caller can
    /// retry; unrecoverable ones fall through to the unclassified error.
    fn detect_device_type(&self, device: &DeviceFileAttributes) -> Result<DeviceType> {
        let model = self.device_model(device).map_err(|e| {
            e.wrap(
                "device type detection",
                device.device_name(),
                &[("step", "model lookup")],
            )
        })?;

        if model == EBS_DEVICE_MODEL {
            return Ok(DeviceType::Ebs);
        }

        match self.is_instance_store_device(device) {
            Ok(true) => return Ok(DeviceType::InstanceStore),
            Ok(false) => {}
            Err(e) if e.is_recoverable() => {
                return Err(e.wrap(
                    "device type detection",
                    device.device_name(),
                    &[("step", "instance store check")],
                ));
            }
            Err(e) => {
                tracing::debug!(
                    device = device.device_name(),
                    error = %e,
                    "unrecoverable error during instance store check"
                );
            }
        }

        Err(NvmeError::InvalidDeviceState {
            device: device.device_name().to_string(),
            detail: format!("unable to determine device type for model '{model}'"),
        })
    }
}

/// Provider backed by `/dev`, sysfs and the NVMe admin ioctl.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct LinuxDeviceInfo {
    sysfs_root: PathBuf,
    dev_root: PathBuf,
}

#[cfg(target_os = "linux")]
impl Default for LinuxDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
impl LinuxDeviceInfo {
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/nvme"),
            dev_root: PathBuf::from(crate::path::DEV_DIRECTORY),
        }
    }

    /// Provider rooted at explicit directories, for tests.
    pub fn with_roots(sysfs_root: impl Into<PathBuf>, dev_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
            dev_root: dev_root.into(),
        }
    }

    fn read_sysfs_attribute(
        &self,
        device: &DeviceFileAttributes,
        attribute: &str,
    ) -> Result<String> {
        let path = self
            .sysfs_root
            .join(device.base_device_name())
            .join(attribute);
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => NvmeError::AccessDenied { path: display },
            std::io::ErrorKind::NotFound => NvmeError::NotFound { path: display },
            _ => NvmeError::Access {
                path: display,
                source: e,
            },
        })?;
        let value = raw.trim();
        if value.is_empty() {
            return Err(NvmeError::CorruptedData {
                detail: format!("sysfs attribute {attribute} is empty for {}", path.display()),
            });
        }
        Ok(value.to_string())
    }
}

#[cfg(target_os = "linux")]
impl DeviceInfoProvider for LinuxDeviceInfo {
    fn all_devices(&self) -> Result<Vec<DeviceFileAttributes>> {
        let entries = std::fs::read_dir(&self.dev_root).map_err(|e| NvmeError::Access {
            path: self.dev_root.display().to_string(),
            source: e,
        })?;

        let mut devices = Vec::new();
        let mut skipped = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(NVME_DEVICE_PREFIX) {
                continue;
            }
            // Bare controller nodes (nvme0) and malformed names are not
            // metric sources; count and move on.
            match parse_device_file_name(name) {
                Ok(dev) => devices.push(dev),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(name, error = %e, "skipping unparseable nvme entry");
                }
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "skipped nvme directory entries during discovery");
        }
        Ok(devices)
    }

    fn device_model(&self, device: &DeviceFileAttributes) -> Result<String> {
        self.read_sysfs_attribute(device, "model")
    }

    fn device_serial(&self, device: &DeviceFileAttributes) -> Result<String> {
        self.read_sysfs_attribute(device, "serial")
    }

    fn device_path(&self, device_name: &str) -> Result<PathBuf> {
        crate::path::device_path_in(&self.dev_root, device_name)
    }

    fn ebs_metrics(&self, path: &Path) -> Result<EbsMetrics> {
        crate::ioctl::get_ebs_metrics(path)
    }

    fn instance_store_metrics(&self, path: &Path) -> Result<InstanceStoreMetrics> {
        crate::ioctl::get_instance_store_metrics(path)
    }
}

/// Provider for platforms without NVMe admin passthrough. Every operation
/// fails with [`NvmeError::PlatformUnsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedDeviceInfo;

impl DeviceInfoProvider for UnsupportedDeviceInfo {
    fn all_devices(&self) -> Result<Vec<DeviceFileAttributes>> {
        Err(NvmeError::PlatformUnsupported)
    }

    fn device_model(&self, _device: &DeviceFileAttributes) -> Result<String> {
        Err(NvmeError::PlatformUnsupported)
    }

    fn device_serial(&self, _device: &DeviceFileAttributes) -> Result<String> {
        Err(NvmeError::PlatformUnsupported)
    }

    fn device_path(&self, _device_name: &str) -> Result<PathBuf> {
        Err(NvmeError::PlatformUnsupported)
    }

    fn ebs_metrics(&self, _path: &Path) -> Result<EbsMetrics> {
        Err(NvmeError::PlatformUnsupported)
    }

    fn instance_store_metrics(&self, _path: &Path) -> Result<InstanceStoreMetrics> {
        Err(NvmeError::PlatformUnsupported)
    }
}
