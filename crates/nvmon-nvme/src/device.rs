use crate::error::{NvmeError, Result};

/// Prefix every NVMe device node name carries under `/dev`.
pub const NVME_DEVICE_PREFIX: &str = "nvme";

/// Identity of one NVMe device file, parsed from its `/dev` entry name.
///
/// Devices sharing a controller index are namespaces/partitions of the same
/// physical device: they expose the same serial, model and log-page metrics
/// and must be processed as one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFileAttributes {
    controller: u32,
    namespace: u32,
    partition: Option<u32>,
    device_name: String,
}

impl DeviceFileAttributes {
    pub fn controller(&self) -> u32 {
        self.controller
    }

    pub fn namespace(&self) -> u32 {
        self.namespace
    }

    pub fn partition(&self) -> Option<u32> {
        self.partition
    }

    /// Full device file name, e.g. `nvme0n1p2`.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Controller device name, e.g. `nvme0`. This is the name sysfs keys
    /// model/serial attributes by.
    pub fn base_device_name(&self) -> String {
        format!("{}{}", NVME_DEVICE_PREFIX, self.controller)
    }
}

/// Parse an NVMe device file name of the form
/// `nvme<controller>n<namespace>[p<partition>]`.
///
/// # Examples
///
/// ```
/// use nvmon_nvme::device::parse_device_file_name;
///
/// let dev = parse_device_file_name("nvme0n1p2").unwrap();
/// assert_eq!(dev.controller(), 0);
/// assert_eq!(dev.namespace(), 1);
/// assert_eq!(dev.partition(), Some(2));
/// assert_eq!(dev.base_device_name(), "nvme0");
/// ```
pub fn parse_device_file_name(name: &str) -> Result<DeviceFileAttributes> {
    let rest = name
        .strip_prefix(NVME_DEVICE_PREFIX)
        .ok_or_else(|| NvmeError::InvalidDeviceName {
            reason: format!("device name '{name}' does not start with '{NVME_DEVICE_PREFIX}'"),
        })?;

    let (controller, namespace, partition) = crate::path::parse_name_pattern(rest)?;

    Ok(DeviceFileAttributes {
        controller,
        namespace,
        partition,
        device_name: name.to_string(),
    })
}
