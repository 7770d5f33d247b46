//! Bounds and corruption validation for decoded log-page metrics.
//!
//! The decoder invokes these checks on every successful structural decode;
//! they are not optional and not skippable by callers. Ceilings are
//! heuristic policy rather than protocol invariants, so they live in
//! [`ValidationLimits`] and can be tuned per deployment.

use crate::error::{NvmeError, Result};
use crate::logpage::{EbsMetrics, Histogram, InstanceStoreMetrics, HISTOGRAM_BINS};

/// Largest plausible average transfer size per operation (100 MiB). Real
/// NVMe I/O sizes are orders of magnitude smaller.
const MAX_AVG_IO_SIZE: u64 = 100 * 1024 * 1024;

/// Plausibility ceilings applied to every decoded field.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    /// Read/write operation counters.
    pub max_operations: u64,
    /// Read/write byte counters (1 exabyte).
    pub max_bytes: u64,
    /// Cumulative time counters in nanoseconds (~31 years).
    pub max_time_ns: u64,
    /// Threshold-exceeded event counters.
    pub max_exceeded: u64,
    /// Queue-length gauge.
    pub max_queue_length: u64,
    /// Histograms declared per log page.
    pub max_histograms: u64,
    /// Bins declared per histogram.
    pub max_bin_count: u64,
    /// Individual histogram bound/count values.
    pub max_bin_value: u64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000_000_000,
            max_bytes: 1_000_000_000_000_000_000,
            max_time_ns: 1_000_000_000_000_000_000,
            max_exceeded: 1_000_000_000_000,
            max_queue_length: 1_000_000,
            max_histograms: 10,
            max_bin_count: 256,
            max_bin_value: 1_000_000_000_000_000_000,
        }
    }
}

fn check(field: &'static str, value: u64, max: u64) -> Result<()> {
    if value > max {
        return Err(NvmeError::ExceedsMaximum { field, value, max });
    }
    Ok(())
}

/// Validate every EBS field against its ceiling and the cross-field
/// consistency rules.
pub fn validate_ebs_metrics(m: &EbsMetrics, limits: &ValidationLimits) -> Result<()> {
    check("read_ops", m.read_ops, limits.max_operations)?;
    check("write_ops", m.write_ops, limits.max_operations)?;
    check("read_bytes", m.read_bytes, limits.max_bytes)?;
    check("write_bytes", m.write_bytes, limits.max_bytes)?;
    check("total_read_time", m.total_read_time, limits.max_time_ns)?;
    check("total_write_time", m.total_write_time, limits.max_time_ns)?;
    check("ebs_iops_exceeded", m.ebs_iops_exceeded, limits.max_exceeded)?;
    check(
        "ebs_throughput_exceeded",
        m.ebs_throughput_exceeded,
        limits.max_exceeded,
    )?;
    check("ec2_iops_exceeded", m.ec2_iops_exceeded, limits.max_exceeded)?;
    check(
        "ec2_throughput_exceeded",
        m.ec2_throughput_exceeded,
        limits.max_exceeded,
    )?;
    check("queue_length", m.queue_length, limits.max_queue_length)?;

    consistency_check(m.read_ops, m.write_ops, m.read_bytes, m.write_bytes)?;

    validate_histogram("read_latency", &m.read_latency, limits)?;
    validate_histogram("write_latency", &m.write_latency, limits)?;
    Ok(())
}

/// Validate every Instance Store field against its ceiling and the
/// cross-field consistency rules. The EBS-only exceeded counters are not
/// present on this struct and are not checked.
pub fn validate_instance_store_metrics(
    m: &InstanceStoreMetrics,
    limits: &ValidationLimits,
) -> Result<()> {
    check("read_ops", m.read_ops, limits.max_operations)?;
    check("write_ops", m.write_ops, limits.max_operations)?;
    check("read_bytes", m.read_bytes, limits.max_bytes)?;
    check("write_bytes", m.write_bytes, limits.max_bytes)?;
    check("total_read_time", m.total_read_time, limits.max_time_ns)?;
    check("total_write_time", m.total_write_time, limits.max_time_ns)?;
    check("ec2_iops_exceeded", m.ec2_iops_exceeded, limits.max_exceeded)?;
    check(
        "ec2_throughput_exceeded",
        m.ec2_throughput_exceeded,
        limits.max_exceeded,
    )?;
    check("queue_length", m.queue_length, limits.max_queue_length)?;
    check("num_histograms", m.num_histograms, limits.max_histograms)?;
    check("num_bins", m.num_bins, limits.max_bin_count)?;

    consistency_check(m.read_ops, m.write_ops, m.read_bytes, m.write_bytes)?;

    validate_histogram("read_latency", &m.read_latency, limits)?;
    validate_histogram("write_latency", &m.write_latency, limits)?;
    Ok(())
}

/// Validate a latency histogram: bin count ceiling, per-bin value
/// ceilings, and `lower <= upper` for every bin up to the declared count.
pub fn validate_histogram(
    name: &str,
    histogram: &Histogram,
    limits: &ValidationLimits,
) -> Result<()> {
    check("bin_count", histogram.bin_count, limits.max_bin_count)?;

    // Only bins up to the declared count are meaningful; the declared
    // count is clamped to the physical bin array.
    let bin_count = (histogram.bin_count as usize)
        .min(HISTOGRAM_BINS)
        .min(histogram.bins.len());

    for (i, bin) in histogram.bins.iter().take(bin_count).enumerate() {
        for (label, value) in [
            ("lower", bin.lower),
            ("upper", bin.upper),
            ("count", bin.count),
        ] {
            if value > limits.max_bin_value {
                return Err(NvmeError::CorruptedData {
                    detail: format!(
                        "{name} bin {i} {label} value {value} exceeds reasonable maximum {}",
                        limits.max_bin_value
                    ),
                });
            }
        }
        if bin.lower > bin.upper {
            return Err(NvmeError::InvalidBinBounds {
                bin: i,
                lower: bin.lower,
                upper: bin.upper,
            });
        }
    }
    Ok(())
}

fn consistency_check(read_ops: u64, write_ops: u64, read_bytes: u64, write_bytes: u64) -> Result<()> {
    if read_bytes > 0 && read_ops == 0 {
        return Err(NvmeError::CorruptedData {
            detail: format!("read bytes without read operations (read_bytes={read_bytes})"),
        });
    }
    if write_bytes > 0 && write_ops == 0 {
        return Err(NvmeError::CorruptedData {
            detail: format!("write bytes without write operations (write_bytes={write_bytes})"),
        });
    }
    if read_ops > 0 && read_bytes / read_ops > MAX_AVG_IO_SIZE {
        return Err(NvmeError::CorruptedData {
            detail: format!(
                "unusually large average read size ({} bytes per operation)",
                read_bytes / read_ops
            ),
        });
    }
    if write_ops > 0 && write_bytes / write_ops > MAX_AVG_IO_SIZE {
        return Err(NvmeError::CorruptedData {
            detail: format!(
                "unusually large average write size ({} bytes per operation)",
                write_bytes / write_ops
            ),
        });
    }
    Ok(())
}

/// Heuristic cross-field corruption check over the four primary counters,
/// wrapped with the device path for diagnostics. The struct validators run
/// the same checks internally; this entry point serves callers holding raw
/// counter values.
pub fn detect_data_corruption(
    read_ops: u64,
    write_ops: u64,
    read_bytes: u64,
    write_bytes: u64,
    device_path: &str,
) -> Result<()> {
    consistency_check(read_ops, write_ops, read_bytes, write_bytes)
        .map_err(|e| e.wrap("data consistency check", device_path, &[]))
}

/// Validate a single named metric value against its ceiling, selected by
/// metric-name substring. Serves the emission boundary, which holds metric
/// names rather than struct fields.
pub fn validate_metric_bounds(metric_name: &str, value: u64, device_path: &str) -> Result<()> {
    validate_metric_bounds_with_limits(metric_name, value, device_path, &ValidationLimits::default())
}

/// [`validate_metric_bounds`] with deployment-specific ceilings.
pub fn validate_metric_bounds_with_limits(
    metric_name: &str,
    value: u64,
    device_path: &str,
    limits: &ValidationLimits,
) -> Result<()> {
    let max_value = if metric_name.contains("exceeded") {
        limits.max_exceeded
    } else if metric_name.contains("queue") {
        limits.max_queue_length
    } else if metric_name.contains("ops") {
        limits.max_operations
    } else if metric_name.contains("bytes") {
        limits.max_bytes
    } else if metric_name.contains("time") {
        limits.max_time_ns
    } else {
        limits.max_bytes
    };

    if value > max_value {
        let value_str = value.to_string();
        let max_str = max_value.to_string();
        return Err(NvmeError::CorruptedData {
            detail: format!("{metric_name} value {value} exceeds reasonable maximum {max_value}"),
        }
        .wrap(
            "metric validation",
            device_path,
            &[
                ("metric", metric_name),
                ("value", &value_str),
                ("maxValue", &max_str),
            ],
        ));
    }
    Ok(())
}
