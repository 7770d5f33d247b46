use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single metric sample emitted for one device.
///
/// Values are signed 64-bit integers: every counter read from hardware is
/// an unsigned 64-bit value that has already passed an overflow-checked
/// conversion before it reaches this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub metric_name: String,
    pub value: i64,
    pub labels: HashMap<String, String>,
}

/// The storage family a discovered NVMe device belongs to.
///
/// Classification is mutually exclusive: a device is EBS, Instance Store,
/// or the classification step fails with an error. There is no default.
///
/// # Examples
///
/// ```
/// use nvmon_common::types::DeviceType;
///
/// let dt: DeviceType = "ebs".parse().unwrap();
/// assert_eq!(dt, DeviceType::Ebs);
/// assert_eq!(dt.to_string(), "ebs");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ebs,
    InstanceStore,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Ebs => write!(f, "ebs"),
            DeviceType::InstanceStore => write!(f, "instance_store"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ebs" => Ok(DeviceType::Ebs),
            "instance_store" => Ok(DeviceType::InstanceStore),
            _ => Err(format!("unknown device type: {s}")),
        }
    }
}

/// Format labels map into a human-readable string.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use nvmon_common::types::format_labels;
///
/// let mut labels = HashMap::new();
/// labels.insert("device".to_string(), "nvme0n1".to_string());
/// labels.insert("volume_id".to_string(), "vol-0abc".to_string());
/// let s = format_labels(&labels);
/// assert!(s.contains("device=nvme0n1"));
/// assert!(s.contains("volume_id=vol-0abc"));
/// ```
pub fn format_labels(labels: &HashMap<String, String>) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(", ")
}
