use crate::Collector;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use nvmon_common::types::{DeviceType, MetricDataPoint};
use nvmon_nvme::device::DeviceFileAttributes;
use nvmon_nvme::error::NvmeError;
use nvmon_nvme::logpage::{safe_u64_to_i64, EbsMetrics, InstanceStoreMetrics};
use nvmon_nvme::provider::DeviceInfoProvider;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Serial prefix identifying an EBS volume serial (`vol0123...`).
const EBS_SERIAL_PREFIX: &str = "vol";

/// Retry bookkeeping for one controller.
#[derive(Debug, Clone)]
struct RetryState {
    not_before: DateTime<Utc>,
    permanent: bool,
}

/// Collects EBS and Instance Store metrics from NVMe vendor log pages.
///
/// Devices are grouped by controller: namespaces and partitions of one
/// controller expose identical log-page counters, so each controller is
/// read once per cycle through the first device that works. Controllers
/// that fail are backed off individually per the error's retry policy;
/// one broken device never blocks the others.
pub struct NvmeCollector<P> {
    provider: P,
    /// Device names to collect from; `None` means all devices.
    allowed_devices: Option<HashSet<String>>,
    collect_ebs: bool,
    collect_instance_store: bool,
    backoff: HashMap<u32, RetryState>,
}

impl<P: DeviceInfoProvider> NvmeCollector<P> {
    /// Create a collector over `provider`. `devices` is the configured
    /// allow-list; a `"*"` entry allows every discovered device.
    pub fn new(
        provider: P,
        devices: &[String],
        collect_ebs: bool,
        collect_instance_store: bool,
    ) -> Self {
        let allowed_devices = if devices.iter().any(|d| d == "*") {
            None
        } else {
            Some(devices.iter().cloned().collect())
        };
        Self {
            provider,
            allowed_devices,
            collect_ebs,
            collect_instance_store,
            backoff: HashMap::new(),
        }
    }

    fn is_allowed(&self, device: &DeviceFileAttributes) -> bool {
        match &self.allowed_devices {
            None => true,
            Some(allowed) => {
                allowed.contains(device.device_name())
                    || allowed.contains(&device.base_device_name())
            }
        }
    }

    fn in_backoff(&self, controller: u32, now: DateTime<Utc>) -> bool {
        match self.backoff.get(&controller) {
            Some(state) => state.permanent || now < state.not_before,
            None => false,
        }
    }

    fn note_failure(&mut self, controller: u32, err: &NvmeError, now: DateTime<Utc>) {
        let info = err.classify();
        if info.recoverable {
            tracing::warn!(
                controller,
                category = %info.category,
                retry_after_secs = info.retry_after_secs,
                error = %err,
                "nvme controller collection failed, will retry"
            );
        } else {
            tracing::warn!(
                controller,
                category = %info.category,
                error = %err,
                "nvme controller collection failed permanently, disabling"
            );
        }
        self.backoff.insert(
            controller,
            RetryState {
                not_before: now + Duration::seconds(info.retry_after_secs as i64),
                permanent: !info.recoverable,
            },
        );
    }

    /// Collect from one controller group through the first device that
    /// yields metrics. Devices in the group share one log page; trying
    /// them in order tolerates individually broken namespace nodes.
    fn collect_controller(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        group: &[DeviceFileAttributes],
        points: &mut Vec<MetricDataPoint>,
    ) -> std::result::Result<(), NvmeError> {
        let mut last_err = None;
        for device in group {
            match self.collect_device(agent_id, now, device, points) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(
                        device = device.device_name(),
                        error = %e,
                        "device in controller group failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn collect_device(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        device: &DeviceFileAttributes,
        points: &mut Vec<MetricDataPoint>,
    ) -> std::result::Result<(), NvmeError> {
        let device_type = self.provider.detect_device_type(device)?;
        match device_type {
            DeviceType::Ebs if self.collect_ebs => self.collect_ebs_device(agent_id, now, device, points),
            DeviceType::InstanceStore if self.collect_instance_store => {
                self.collect_instance_store_device(agent_id, now, device, points)
            }
            _ => {
                tracing::debug!(
                    device = device.device_name(),
                    device_type = %device_type,
                    "device family disabled by configuration"
                );
                Ok(())
            }
        }
    }

    fn collect_ebs_device(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        device: &DeviceFileAttributes,
        points: &mut Vec<MetricDataPoint>,
    ) -> std::result::Result<(), NvmeError> {
        let serial = self.provider.device_serial(device)?;
        if !serial.starts_with(EBS_SERIAL_PREFIX) {
            tracing::warn!(
                device = device.device_name(),
                serial,
                "EBS device serial does not carry volume prefix, skipping"
            );
            return Ok(());
        }
        let volume_id = format!("vol-{}", serial.trim_start_matches(EBS_SERIAL_PREFIX));

        let path = self.provider.device_path(device.device_name())?;
        let metrics = self.provider.ebs_metrics(&path)?;

        let mut labels = HashMap::new();
        labels.insert("device".to_string(), device.device_name().to_string());
        labels.insert("volume_id".to_string(), volume_id);

        for (name, value) in ebs_metric_values(&metrics) {
            record(points, now, agent_id, device, name, value, &labels);
        }
        Ok(())
    }

    fn collect_instance_store_device(
        &self,
        agent_id: &str,
        now: DateTime<Utc>,
        device: &DeviceFileAttributes,
        points: &mut Vec<MetricDataPoint>,
    ) -> std::result::Result<(), NvmeError> {
        let serial = self.provider.device_serial(device)?;
        let path = self.provider.device_path(device.device_name())?;
        let metrics = self.provider.instance_store_metrics(&path)?;

        let mut labels = HashMap::new();
        labels.insert("device".to_string(), device.device_name().to_string());
        labels.insert("serial_id".to_string(), serial);

        for (name, value) in instance_store_metric_values(&metrics) {
            record(points, now, agent_id, device, name, value, &labels);
        }
        Ok(())
    }
}

fn ebs_metric_values(m: &EbsMetrics) -> [(&'static str, u64); 11] {
    [
        ("diskio.ebs.total_read_ops", m.read_ops),
        ("diskio.ebs.total_write_ops", m.write_ops),
        ("diskio.ebs.total_read_bytes", m.read_bytes),
        ("diskio.ebs.total_write_bytes", m.write_bytes),
        ("diskio.ebs.total_read_time", m.total_read_time),
        ("diskio.ebs.total_write_time", m.total_write_time),
        ("diskio.ebs.volume_performance_exceeded_iops", m.ebs_iops_exceeded),
        ("diskio.ebs.volume_performance_exceeded_tp", m.ebs_throughput_exceeded),
        ("diskio.ebs.ec2_instance_performance_exceeded_iops", m.ec2_iops_exceeded),
        ("diskio.ebs.ec2_instance_performance_exceeded_tp", m.ec2_throughput_exceeded),
        ("diskio.ebs.volume_queue_length", m.queue_length),
    ]
}

fn instance_store_metric_values(m: &InstanceStoreMetrics) -> [(&'static str, u64); 9] {
    [
        ("diskio.instance_store.total_read_ops", m.read_ops),
        ("diskio.instance_store.total_write_ops", m.write_ops),
        ("diskio.instance_store.total_read_bytes", m.read_bytes),
        ("diskio.instance_store.total_write_bytes", m.write_bytes),
        ("diskio.instance_store.total_read_time", m.total_read_time),
        ("diskio.instance_store.total_write_time", m.total_write_time),
        ("diskio.instance_store.performance_exceeded_iops", m.ec2_iops_exceeded),
        ("diskio.instance_store.performance_exceeded_tp", m.ec2_throughput_exceeded),
        ("diskio.instance_store.volume_queue_length", m.queue_length),
    ]
}

/// Append one metric point, skipping values that do not fit in a signed
/// 64-bit integer. Overflow affects only the single metric, never the
/// device or the cycle.
fn record(
    points: &mut Vec<MetricDataPoint>,
    now: DateTime<Utc>,
    agent_id: &str,
    device: &DeviceFileAttributes,
    metric_name: &'static str,
    value: u64,
    labels: &HashMap<String, String>,
) {
    let value = match safe_u64_to_i64(value) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(
                device = device.device_name(),
                metric_name,
                error = %e,
                "skipping metric value that overflows int64"
            );
            return;
        }
    };
    points.push(MetricDataPoint {
        timestamp: now,
        agent_id: agent_id.to_string(),
        metric_name: metric_name.to_string(),
        value,
        labels: labels.clone(),
    });
}

impl<P: DeviceInfoProvider + Send + Sync> Collector for NvmeCollector<P> {
    fn name(&self) -> &str {
        "nvme"
    }

    fn collect(&mut self, agent_id: &str) -> Result<Vec<MetricDataPoint>> {
        let devices = self.provider.all_devices()?;
        let now = Utc::now();

        // Group by controller; BTreeMap keeps cycle order deterministic.
        let mut groups: BTreeMap<u32, Vec<DeviceFileAttributes>> = BTreeMap::new();
        for device in devices {
            if !self.is_allowed(&device) {
                tracing::debug!(
                    device = device.device_name(),
                    "device not in configured allow-list, skipping"
                );
                continue;
            }
            groups.entry(device.controller()).or_default().push(device);
        }

        let mut points = Vec::new();
        for (controller, group) in &groups {
            if self.in_backoff(*controller, now) {
                tracing::debug!(controller, "controller in backoff, skipping this cycle");
                continue;
            }
            match self.collect_controller(agent_id, now, group, &mut points) {
                Ok(()) => {
                    self.backoff.remove(controller);
                }
                Err(e) => self.note_failure(*controller, &e, now),
            }
        }
        Ok(points)
    }
}
