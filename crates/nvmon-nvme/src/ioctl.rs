//! NVMe admin passthrough via `ioctl(NVME_IOCTL_ADMIN_CMD)`.
//!
//! Linux only. Issues Get Log Page against namespace 1 and hands the raw
//! 4096-byte buffer to the decoders in [`crate::logpage`]. Requires
//! CAP_SYS_ADMIN (or root) on the opened device node.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::Path;

use crate::error::{NvmeError, Result};
use crate::logpage::{
    self, EbsMetrics, InstanceStoreMetrics, EBS_LOG_PAGE_ID, INSTANCE_STORE_LOG_PAGE_ID,
    LOG_PAGE_SIZE,
};

/// `_IOWR('N', 0x41, struct nvme_admin_cmd)` from `linux/nvme_ioctl.h`.
const NVME_IOCTL_ADMIN_CMD: libc::c_ulong = 0xC048_4E41;

/// NVMe admin opcode for Get Log Page.
const NVME_GET_LOG_PAGE: u8 = 0x02;

/// Mirror of `struct nvme_admin_cmd` from `linux/nvme_ioctl.h`. Field
/// order and sizes must match the kernel ABI exactly.
#[repr(C)]
#[derive(Debug, Default)]
struct NvmeAdminCmd {
    opcode: u8,
    flags: u8,
    rsvd1: u16,
    nsid: u32,
    cdw2: u32,
    cdw3: u32,
    metadata: u64,
    addr: u64,
    metadata_len: u32,
    data_len: u32,
    cdw10: u32,
    cdw11: u32,
    cdw12: u32,
    cdw13: u32,
    cdw14: u32,
    cdw15: u32,
    timeout_ms: u32,
    result: u32,
}

/// Issue Get Log Page for `log_id` on an open device fd, returning the raw
/// 4096-byte page.
fn read_log_page(fd: libc::c_int, log_id: u8, path: &str) -> Result<Vec<u8>> {
    let mut data = vec![0u8; LOG_PAGE_SIZE];

    // cdw10: log page identifier in bits 0..8, number of dwords minus one
    // in bits 16..28. 4096 bytes = 1024 dwords.
    let num_dwords = (LOG_PAGE_SIZE / 4) as u32;
    let mut cmd = NvmeAdminCmd {
        opcode: NVME_GET_LOG_PAGE,
        nsid: 1,
        addr: data.as_mut_ptr() as u64,
        data_len: LOG_PAGE_SIZE as u32,
        cdw10: u32::from(log_id) | ((num_dwords - 1) << 16),
        ..Default::default()
    };

    // SAFETY: fd is an open NVMe character device, cmd matches the kernel's
    // struct nvme_admin_cmd layout, and addr/data_len point at a live buffer
    // of LOG_PAGE_SIZE bytes that outlives the call.
    let status = unsafe { libc::ioctl(fd, NVME_IOCTL_ADMIN_CMD, &mut cmd) };

    if status < 0 {
        let errno = std::io::Error::last_os_error();
        return Err(map_errno(errno, path));
    }
    if status != 0 {
        return Err(map_nvme_status(status, path));
    }
    Ok(data)
}

fn map_errno(err: std::io::Error, path: &str) -> NvmeError {
    match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => NvmeError::AccessDenied {
            path: path.to_string(),
        },
        Some(libc::ENODEV) | Some(libc::ENOENT) => NvmeError::NotFound {
            path: path.to_string(),
        },
        Some(libc::EBUSY) => NvmeError::Busy {
            path: path.to_string(),
        },
        Some(libc::ETIMEDOUT) => NvmeError::Timeout {
            path: path.to_string(),
        },
        _ => NvmeError::Ioctl {
            path: path.to_string(),
            detail: format!("admin command failed: {err}"),
        },
    }
}

/// Map a non-zero NVMe completion status (returned as a positive ioctl
/// result) to an error. Status code lives in the low byte.
fn map_nvme_status(status: libc::c_int, path: &str) -> NvmeError {
    match status & 0xFF {
        0x02 => NvmeError::Ioctl {
            path: path.to_string(),
            detail: format!("invalid log page (status 0x{status:X})"),
        },
        0x0A => NvmeError::Ioctl {
            path: path.to_string(),
            detail: format!("log page not supported by device (status 0x{status:X})"),
        },
        0x16 => NvmeError::AccessDenied {
            path: path.to_string(),
        },
        _ => NvmeError::Ioctl {
            path: path.to_string(),
            detail: format!("admin command completed with status 0x{status:X}"),
        },
    }
}

fn open_device(path: &Path) -> Result<std::fs::File> {
    let display = path.display().to_string();
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => NvmeError::AccessDenied { path: display },
            std::io::ErrorKind::NotFound => NvmeError::NotFound { path: display },
            _ => NvmeError::Access {
                path: display,
                source: e,
            },
        })
}

/// Fetch and decode the EBS vendor log page from a device node.
pub fn get_ebs_metrics(path: &Path) -> Result<EbsMetrics> {
    let file = open_device(path)?;
    let display = path.display().to_string();
    let data = read_log_page(file.as_raw_fd(), EBS_LOG_PAGE_ID, &display)?;
    logpage::parse_ebs_log_page(&data)
}

/// Fetch and decode the Instance Store vendor log page from a device node.
pub fn get_instance_store_metrics(path: &Path) -> Result<InstanceStoreMetrics> {
    let file = open_device(path)?;
    let display = path.display().to_string();
    let data = read_log_page(file.as_raw_fd(), INSTANCE_STORE_LOG_PAGE_ID, &display)?;
    logpage::parse_instance_store_log_page(&data)
}
