//! Cross-module scenarios exercising the discovery, classification,
//! decode and validation pipeline against an in-memory provider.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nvmon_common::types::DeviceType;

use crate::device::{parse_device_file_name, DeviceFileAttributes};
use crate::error::{ErrorCategory, NvmeError, Result};
use crate::logpage::{self, encode, EbsMetrics, Histogram, HistogramBin, InstanceStoreMetrics};
use crate::provider::{DeviceInfoProvider, EBS_DEVICE_MODEL, INSTANCE_STORE_DEVICE_MODEL};

/// Provider with canned sysfs attributes and raw log-page buffers,
/// keyed by controller name and device name respectively.
#[derive(Default)]
struct FakeProvider {
    devices: Vec<String>,
    models: HashMap<String, String>,
    serials: HashMap<String, String>,
    ebs_pages: HashMap<String, Vec<u8>>,
    instance_store_pages: HashMap<String, Vec<u8>>,
}

impl FakeProvider {
    fn add_controller(&mut self, controller: &str, model: &str, serial: &str) {
        self.models.insert(controller.into(), model.into());
        self.serials.insert(controller.into(), serial.into());
    }

    fn add_device(&mut self, name: &str) {
        self.devices.push(name.into());
    }

    fn device_key(path: &Path) -> String {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    }
}

impl DeviceInfoProvider for FakeProvider {
    fn all_devices(&self) -> Result<Vec<DeviceFileAttributes>> {
        self.devices
            .iter()
            .map(|name| parse_device_file_name(name))
            .collect()
    }

    fn device_model(&self, device: &DeviceFileAttributes) -> Result<String> {
        self.models
            .get(&device.base_device_name())
            .cloned()
            .ok_or_else(|| NvmeError::NotFound {
                path: device.base_device_name(),
            })
    }

    fn device_serial(&self, device: &DeviceFileAttributes) -> Result<String> {
        self.serials
            .get(&device.base_device_name())
            .cloned()
            .ok_or_else(|| NvmeError::NotFound {
                path: device.base_device_name(),
            })
    }

    fn device_path(&self, device_name: &str) -> Result<PathBuf> {
        crate::path::device_path(device_name)
    }

    fn ebs_metrics(&self, path: &Path) -> Result<EbsMetrics> {
        let key = Self::device_key(path);
        let page = self.ebs_pages.get(&key).ok_or_else(|| NvmeError::NotFound {
            path: path.display().to_string(),
        })?;
        logpage::parse_ebs_log_page(page)
    }

    fn instance_store_metrics(&self, path: &Path) -> Result<InstanceStoreMetrics> {
        let key = Self::device_key(path);
        let page = self
            .instance_store_pages
            .get(&key)
            .ok_or_else(|| NvmeError::Busy {
                path: path.display().to_string(),
            })?;
        logpage::parse_instance_store_log_page(page)
    }
}

fn histogram_with(bins: &[(u64, u64, u64)]) -> Histogram {
    let mut h = Histogram {
        bin_count: bins.len() as u64,
        bins: vec![HistogramBin::default(); logpage::HISTOGRAM_BINS],
    };
    for (i, &(lower, upper, count)) in bins.iter().enumerate() {
        h.bins[i] = HistogramBin { lower, upper, count };
    }
    h
}

fn healthy_ebs_page() -> Vec<u8> {
    encode::ebs_log_page(&EbsMetrics {
        magic: logpage::EBS_MAGIC_NUMBER,
        read_ops: 1_000,
        write_ops: 500,
        read_bytes: 4_096_000,
        write_bytes: 2_048_000,
        total_read_time: 12_000_000,
        total_write_time: 9_000_000,
        ebs_iops_exceeded: 0,
        ebs_throughput_exceeded: 0,
        ec2_iops_exceeded: 0,
        ec2_throughput_exceeded: 0,
        queue_length: 4,
        read_latency: histogram_with(&[(0, 100, 900), (100, 200, 100)]),
        write_latency: histogram_with(&[(0, 100, 500)]),
    })
}

fn healthy_instance_store_page() -> Vec<u8> {
    encode::instance_store_log_page(&InstanceStoreMetrics {
        magic: logpage::INSTANCE_STORE_MAGIC_NUMBER,
        read_ops: 42,
        write_ops: 21,
        read_bytes: 84_000,
        write_bytes: 42_000,
        total_read_time: 1_000,
        total_write_time: 2_000,
        ec2_iops_exceeded: 0,
        ec2_throughput_exceeded: 0,
        queue_length: 2,
        num_histograms: 2,
        num_bins: 64,
        io_size_range: 4096,
        bounds: vec![0; logpage::HISTOGRAM_BINS],
        read_latency: histogram_with(&[]),
        write_latency: histogram_with(&[]),
    })
}

#[test]
fn ebs_device_end_to_end() {
    let mut p = FakeProvider::default();
    p.add_controller("nvme0", EBS_DEVICE_MODEL, "vol0123456789abcdef0");
    p.add_device("nvme0n1");
    p.ebs_pages.insert("nvme0n1".into(), healthy_ebs_page());

    let devices = p.all_devices().unwrap();
    assert_eq!(devices.len(), 1);
    let dev = &devices[0];

    assert_eq!(p.detect_device_type(dev).unwrap(), DeviceType::Ebs);

    let path = p.device_path(dev.device_name()).unwrap();
    let metrics = p.ebs_metrics(&path).unwrap();
    assert_eq!(metrics.read_ops, 1_000);
    assert_eq!(metrics.queue_length, 4);
    assert_eq!(metrics.read_latency.bin_count, 2);
    assert_eq!(metrics.read_latency.bins[1].count, 100);
}

#[test]
fn instance_store_confirmation_requires_live_magic() {
    let mut p = FakeProvider::default();
    p.add_controller("nvme1", INSTANCE_STORE_DEVICE_MODEL, "AWS123456789");
    p.add_device("nvme1n1");
    p.instance_store_pages
        .insert("nvme1n1".into(), healthy_instance_store_page());

    let dev = parse_device_file_name("nvme1n1").unwrap();
    assert!(p.is_instance_store_device(&dev).unwrap());
    assert_eq!(
        p.detect_device_type(&dev).unwrap(),
        DeviceType::InstanceStore
    );
}

#[test]
fn instance_store_model_with_wrong_magic_escalates() {
    let mut page = healthy_instance_store_page();
    page[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

    let mut p = FakeProvider::default();
    p.add_controller("nvme1", INSTANCE_STORE_DEVICE_MODEL, "AWS123456789");
    p.add_device("nvme1n1");
    p.instance_store_pages.insert("nvme1n1".into(), page);

    let dev = parse_device_file_name("nvme1n1").unwrap();
    let err = p.is_instance_store_device(&dev).unwrap_err();
    assert!(matches!(
        err.root_cause(),
        NvmeError::InvalidInstanceStoreMagic { .. }
    ));
    let msg = err.to_string();
    assert!(msg.contains("instance store confirmation"), "{msg}");
}

#[test]
fn instance_store_probe_failure_is_not_instance_store() {
    // Model matches but the log page read fails with a recoverable device
    // error; the device is conservatively not Instance Store.
    let mut p = FakeProvider::default();
    p.add_controller("nvme1", INSTANCE_STORE_DEVICE_MODEL, "AWS123456789");
    p.add_device("nvme1n1");
    // No page registered: the fake returns Busy.

    let dev = parse_device_file_name("nvme1n1").unwrap();
    assert!(!p.is_instance_store_device(&dev).unwrap());
}

#[test]
fn corrupted_page_is_rejected_with_data_category() {
    let mut m = EbsMetrics {
        magic: logpage::EBS_MAGIC_NUMBER,
        ..Default::default()
    };
    m.read_bytes = 1_024_000; // bytes with zero ops
    let err = logpage::parse_ebs_log_page(&encode::ebs_log_page(&m)).unwrap_err();
    assert!(err
        .to_string()
        .contains("read bytes without read operations"));
    let info = err.classify();
    assert_eq!(info.category, ErrorCategory::Data);
    assert!(info.recoverable);
    assert_eq!(info.retry_after_secs, 5);
}

#[test]
fn hostile_device_names_never_reach_the_provider() {
    let p = FakeProvider::default();
    for name in ["../../etc/passwd", "nvme0n1/../nvme1n1", "nvme0n1\0", ""] {
        assert!(p.device_path(name).is_err(), "{name:?} was accepted");
    }
}

#[test]
fn counter_overflow_is_isolated_per_value() {
    // 2^63 - 1 converts; 2^63 fails without affecting other conversions.
    let ok = logpage::safe_u64_to_i64((1u64 << 63) - 1).unwrap();
    assert_eq!(ok, i64::MAX);
    let err = logpage::safe_u64_to_i64(1u64 << 63).unwrap_err();
    assert!(matches!(err, NvmeError::MetricOverflow { .. }));
    assert!(!err.is_recoverable());
    assert_eq!(logpage::safe_u64_to_i64(0).unwrap(), 0);
}

#[test]
fn every_error_maps_to_exactly_one_category() {
    let errors = [
        NvmeError::PlatformUnsupported,
        NvmeError::AccessDenied { path: "/dev/nvme0n1".into() },
        NvmeError::NotFound { path: "/dev/nvme0n1".into() },
        NvmeError::Busy { path: "/dev/nvme0n1".into() },
        NvmeError::InvalidEbsMagic { expected: 1, actual: 2 },
        NvmeError::MetricOverflow { value: u64::MAX },
        NvmeError::TemporaryFailure { detail: "transient".into() },
        NvmeError::InvalidDeviceName { reason: "bad".into() },
    ];
    for err in errors {
        let info = err.classify();
        // Non-recoverable failures never carry a retry delay.
        if !info.recoverable {
            assert_eq!(info.retry_after_secs, 0, "{err}");
        } else {
            assert!(info.retry_after_secs > 0, "{err}");
        }
    }
}
