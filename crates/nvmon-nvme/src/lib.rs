//! NVMe device metrics acquisition for EBS and Instance Store volumes.
//!
//! Pipeline: discover NVMe device files, sanitize their names into `/dev`
//! paths, classify each controller as EBS or Instance Store, fetch the
//! vendor log page over the admin ioctl, decode the fixed binary layout
//! and validate every field before anything is surfaced as a metric.
//!
//! All I/O lives behind [`provider::DeviceInfoProvider`]; decoding and
//! validation are pure functions over byte buffers and decode fresh values
//! on every call.

pub mod device;
pub mod error;
#[cfg(target_os = "linux")]
pub mod ioctl;
pub mod logpage;
pub mod path;
pub mod provider;
pub mod validate;

pub use device::{parse_device_file_name, DeviceFileAttributes};
pub use error::{ErrorCategory, ErrorInfo, NvmeError};
pub use logpage::{
    parse_ebs_log_page, parse_instance_store_log_page, safe_u64_to_i64, EbsMetrics,
    InstanceStoreMetrics,
};
pub use path::device_path;
pub use provider::{DeviceInfoProvider, UnsupportedDeviceInfo};
#[cfg(target_os = "linux")]
pub use provider::LinuxDeviceInfo;
pub use validate::ValidationLimits;

#[cfg(test)]
mod tests;
