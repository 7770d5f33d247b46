//! Binary log-page decoding for EBS and Instance Store devices.
//!
//! Both families expose a 4096-byte vendor log page with a fixed
//! little-endian layout. Field order in the structs below matches byte
//! offset order exactly; this is a hardware wire format, not a
//! self-describing one. Decoding validates the family magic number and
//! always runs the bounds validator before returning.

use crate::error::{NvmeError, Result};
use crate::validate::{self, ValidationLimits};

/// Magic number identifying an EBS log page (0xD0).
pub const EBS_MAGIC_NUMBER: u64 = 0x3C23_B510;
/// Magic number identifying an Instance Store log page (0xC0).
pub const INSTANCE_STORE_MAGIC_NUMBER: u32 = 0xEC2C_0D7E;

/// Log page identifier for EBS devices.
pub const EBS_LOG_PAGE_ID: u8 = 0xD0;
/// Log page identifier for Instance Store devices.
pub const INSTANCE_STORE_LOG_PAGE_ID: u8 = 0xC0;

/// Size of the raw log page returned by the hardware.
pub const LOG_PAGE_SIZE: usize = 4096;
/// Defensive ceiling against buffer-handling bugs upstream of the decoder.
pub const MAX_LOG_PAGE_SIZE: usize = 8192;

/// Number of physical bins in a latency histogram.
pub const HISTOGRAM_BINS: usize = 64;

/// Bytes occupied by one histogram: bin count + 64 {lower, upper, count} triples.
const HISTOGRAM_LAYOUT_SIZE: usize = 8 + HISTOGRAM_BINS * 24;

/// Reserved gap between the EBS counters and the histograms.
const EBS_RESERVED_SIZE: usize = 416;

/// Fixed layout size of the EBS log page up to the end of the write-latency
/// histogram: 12 u64 counters, the reserved area, two histograms.
pub const EBS_LAYOUT_SIZE: usize = 96 + EBS_RESERVED_SIZE + 2 * HISTOGRAM_LAYOUT_SIZE;

/// Fixed layout size of the Instance Store log page: magic + reserved u32s,
/// 11 u64 counters, 3 u64 histogram descriptors, 64 u64 bounds, two
/// histograms. The trailing reserved area is not decoded.
pub const INSTANCE_STORE_LAYOUT_SIZE: usize =
    8 + 88 + 24 + HISTOGRAM_BINS * 8 + 2 * HISTOGRAM_LAYOUT_SIZE;

/// One bin of a latency histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistogramBin {
    pub lower: u64,
    pub upper: u64,
    pub count: u64,
}

/// Latency histogram data carried in a log page. The device declares how
/// many of the 64 physical bins are in use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    pub bin_count: u64,
    pub bins: Vec<HistogramBin>,
}

/// Decoded metrics from the EBS log page 0xD0.
///
/// All counters are cumulative and monotonically non-decreasing across
/// successive reads absent a device reset; callers difference successive
/// reads to obtain deltas. A fresh value is decoded per scrape and never
/// mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EbsMetrics {
    pub magic: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    /// Cumulative read time in nanoseconds.
    pub total_read_time: u64,
    /// Cumulative write time in nanoseconds.
    pub total_write_time: u64,
    pub ebs_iops_exceeded: u64,
    pub ebs_throughput_exceeded: u64,
    pub ec2_iops_exceeded: u64,
    pub ec2_throughput_exceeded: u64,
    /// Current queue length (gauge, not cumulative).
    pub queue_length: u64,
    pub read_latency: Histogram,
    pub write_latency: Histogram,
}

/// Decoded metrics from the Instance Store log page 0xC0.
///
/// The wire layout carries the two EBS-only exceeded counters; they are
/// decoded and ignored (zero-filled on real hardware).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStoreMetrics {
    pub magic: u32,
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub total_read_time: u64,
    pub total_write_time: u64,
    pub ec2_iops_exceeded: u64,
    pub ec2_throughput_exceeded: u64,
    pub queue_length: u64,
    pub num_histograms: u64,
    pub num_bins: u64,
    pub io_size_range: u64,
    pub bounds: Vec<u64>,
    pub read_latency: Histogram,
    pub write_latency: Histogram,
}

/// Little-endian cursor over a raw log-page buffer.
struct LeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(NvmeError::InsufficientData {
            len: self.buf.len(),
            required: usize::MAX,
        })?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(NvmeError::InsufficientData {
                len: self.buf.len(),
                required: end,
            })?;
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(arr))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }
}

fn read_histogram(r: &mut LeReader<'_>) -> Result<Histogram> {
    let bin_count = r.read_u64()?;
    let mut bins = Vec::with_capacity(HISTOGRAM_BINS);
    for _ in 0..HISTOGRAM_BINS {
        bins.push(HistogramBin {
            lower: r.read_u64()?,
            upper: r.read_u64()?,
            count: r.read_u64()?,
        });
    }
    Ok(Histogram { bin_count, bins })
}

/// Structural gates shared by both families. Runs before any byte of the
/// buffer is interpreted.
fn check_buffer_bounds(data: &[u8], layout_size: usize) -> Result<()> {
    if data.len() < layout_size {
        return Err(NvmeError::InsufficientData {
            len: data.len(),
            required: layout_size,
        });
    }
    if data.len() < LOG_PAGE_SIZE {
        return Err(NvmeError::InsufficientData {
            len: data.len(),
            required: LOG_PAGE_SIZE,
        });
    }
    if data.len() > MAX_LOG_PAGE_SIZE {
        return Err(NvmeError::BufferOverflow {
            len: data.len(),
            max: MAX_LOG_PAGE_SIZE,
        });
    }
    Ok(())
}

/// Parse the binary contents of EBS log page 0xD0.
///
/// Validates buffer bounds, decodes the fixed little-endian layout, gates
/// on the EBS magic number, then runs bounds validation. Pure function
/// over its input.
pub fn parse_ebs_log_page(data: &[u8]) -> Result<EbsMetrics> {
    parse_ebs_log_page_with_limits(data, &ValidationLimits::default())
}

/// [`parse_ebs_log_page`] with deployment-specific validation ceilings.
pub fn parse_ebs_log_page_with_limits(
    data: &[u8],
    limits: &ValidationLimits,
) -> Result<EbsMetrics> {
    check_buffer_bounds(data, EBS_LAYOUT_SIZE)?;

    let mut r = LeReader::new(data);
    let metrics = EbsMetrics {
        magic: r.read_u64()?,
        read_ops: r.read_u64()?,
        write_ops: r.read_u64()?,
        read_bytes: r.read_u64()?,
        write_bytes: r.read_u64()?,
        total_read_time: r.read_u64()?,
        total_write_time: r.read_u64()?,
        ebs_iops_exceeded: r.read_u64()?,
        ebs_throughput_exceeded: r.read_u64()?,
        ec2_iops_exceeded: r.read_u64()?,
        ec2_throughput_exceeded: r.read_u64()?,
        queue_length: r.read_u64()?,
        read_latency: {
            r.skip(EBS_RESERVED_SIZE)?;
            read_histogram(&mut r)?
        },
        write_latency: read_histogram(&mut r)?,
    };

    if metrics.magic != EBS_MAGIC_NUMBER {
        return Err(NvmeError::InvalidEbsMagic {
            expected: EBS_MAGIC_NUMBER,
            actual: metrics.magic,
        });
    }

    validate::validate_ebs_metrics(&metrics, limits)?;
    Ok(metrics)
}

/// Parse the binary contents of Instance Store log page 0xC0.
pub fn parse_instance_store_log_page(data: &[u8]) -> Result<InstanceStoreMetrics> {
    parse_instance_store_log_page_with_limits(data, &ValidationLimits::default())
}

/// [`parse_instance_store_log_page`] with deployment-specific ceilings.
pub fn parse_instance_store_log_page_with_limits(
    data: &[u8],
    limits: &ValidationLimits,
) -> Result<InstanceStoreMetrics> {
    check_buffer_bounds(data, INSTANCE_STORE_LAYOUT_SIZE)?;

    let mut r = LeReader::new(data);
    let magic = r.read_u32()?;
    r.skip(4)?; // reserved
    let read_ops = r.read_u64()?;
    let write_ops = r.read_u64()?;
    let read_bytes = r.read_u64()?;
    let write_bytes = r.read_u64()?;
    let total_read_time = r.read_u64()?;
    let total_write_time = r.read_u64()?;
    // EBS-only exceeded counters occupy the next two slots on the wire;
    // zero-filled for Instance Store and not surfaced.
    r.skip(16)?;
    let ec2_iops_exceeded = r.read_u64()?;
    let ec2_throughput_exceeded = r.read_u64()?;
    let queue_length = r.read_u64()?;
    let num_histograms = r.read_u64()?;
    let num_bins = r.read_u64()?;
    let io_size_range = r.read_u64()?;
    let mut bounds = Vec::with_capacity(HISTOGRAM_BINS);
    for _ in 0..HISTOGRAM_BINS {
        bounds.push(r.read_u64()?);
    }
    let read_latency = read_histogram(&mut r)?;
    let write_latency = read_histogram(&mut r)?;

    let metrics = InstanceStoreMetrics {
        magic,
        read_ops,
        write_ops,
        read_bytes,
        write_bytes,
        total_read_time,
        total_write_time,
        ec2_iops_exceeded,
        ec2_throughput_exceeded,
        queue_length,
        num_histograms,
        num_bins,
        io_size_range,
        bounds,
        read_latency,
        write_latency,
    };

    if metrics.magic != INSTANCE_STORE_MAGIC_NUMBER {
        return Err(NvmeError::InvalidInstanceStoreMagic {
            expected: INSTANCE_STORE_MAGIC_NUMBER,
            actual: metrics.magic,
        });
    }

    validate::validate_instance_store_metrics(&metrics, limits)?;
    Ok(metrics)
}

/// Convert an unsigned counter to a signed 64-bit metric value, failing on
/// overflow rather than wrapping.
///
/// # Examples
///
/// ```
/// use nvmon_nvme::logpage::safe_u64_to_i64;
///
/// assert_eq!(safe_u64_to_i64(42).unwrap(), 42);
/// assert!(safe_u64_to_i64(u64::MAX).is_err());
/// ```
pub fn safe_u64_to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| NvmeError::MetricOverflow { value })
}


#[cfg(test)]
mod tests {
    use super::*;

    fn empty_histogram() -> Histogram {
        Histogram {
            bin_count: 0,
            bins: vec![HistogramBin::default(); HISTOGRAM_BINS],
        }
    }

    fn sample_ebs() -> EbsMetrics {
        EbsMetrics {
            magic: EBS_MAGIC_NUMBER,
            read_ops: 100,
            write_ops: 200,
            read_bytes: 1024,
            write_bytes: 2048,
            total_read_time: 5_000_000,
            total_write_time: 7_000_000,
            ebs_iops_exceeded: 1,
            ebs_throughput_exceeded: 2,
            ec2_iops_exceeded: 3,
            ec2_throughput_exceeded: 4,
            queue_length: 3,
            read_latency: empty_histogram(),
            write_latency: empty_histogram(),
        }
    }

    fn sample_instance_store() -> InstanceStoreMetrics {
        InstanceStoreMetrics {
            magic: INSTANCE_STORE_MAGIC_NUMBER,
            read_ops: 10,
            write_ops: 20,
            read_bytes: 4096,
            write_bytes: 8192,
            total_read_time: 111,
            total_write_time: 222,
            ec2_iops_exceeded: 0,
            ec2_throughput_exceeded: 0,
            queue_length: 1,
            num_histograms: 2,
            num_bins: 8,
            io_size_range: 4096,
            bounds: vec![0; HISTOGRAM_BINS],
            read_latency: empty_histogram(),
            write_latency: empty_histogram(),
        }
    }

    #[test]
    fn ebs_round_trip_preserves_all_fields() {
        let original = sample_ebs();
        let buf = encode::ebs_log_page(&original);
        assert_eq!(buf.len(), LOG_PAGE_SIZE);
        let decoded = parse_ebs_log_page(&buf).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn instance_store_round_trip_preserves_all_fields() {
        let original = sample_instance_store();
        let buf = encode::instance_store_log_page(&original);
        let decoded = parse_instance_store_log_page(&buf).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn histogram_bins_survive_round_trip() {
        let mut m = sample_ebs();
        m.read_latency.bin_count = 2;
        m.read_latency.bins[0] = HistogramBin {
            lower: 0,
            upper: 100,
            count: 7,
        };
        m.read_latency.bins[1] = HistogramBin {
            lower: 100,
            upper: 200,
            count: 9,
        };
        let decoded = parse_ebs_log_page(&encode::ebs_log_page(&m)).unwrap();
        assert_eq!(decoded.read_latency.bin_count, 2);
        assert_eq!(decoded.read_latency.bins[0].count, 7);
        assert_eq!(decoded.read_latency.bins[1].upper, 200);
    }

    #[test]
    fn ebs_magic_mismatch_fails_with_both_values() {
        let mut m = sample_ebs();
        m.magic = 0x1234_5678;
        let err = parse_ebs_log_page(&encode::ebs_log_page(&m)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid EBS magic number"), "{msg}");
        assert!(msg.contains("expected 0x3C23B510"), "{msg}");
        assert!(msg.contains("got 0x12345678"), "{msg}");
    }

    #[test]
    fn instance_store_magic_mismatch_fails() {
        let mut m = sample_instance_store();
        m.magic = 0xDEAD_BEEF;
        let err =
            parse_instance_store_log_page(&encode::instance_store_log_page(&m)).unwrap_err();
        assert!(matches!(
            err,
            NvmeError::InvalidInstanceStoreMagic {
                expected: INSTANCE_STORE_MAGIC_NUMBER,
                actual: 0xDEAD_BEEF,
            }
        ));
    }

    #[test]
    fn magic_gate_fires_regardless_of_plausible_fields() {
        // A buffer that is entirely plausible except for the magic number
        // must still be rejected.
        let mut m = sample_ebs();
        m.magic = EBS_MAGIC_NUMBER + 1;
        assert!(matches!(
            parse_ebs_log_page(&encode::ebs_log_page(&m)),
            Err(NvmeError::InvalidEbsMagic { .. })
        ));
    }

    #[test]
    fn empty_buffer_is_insufficient() {
        assert!(matches!(
            parse_ebs_log_page(&[]),
            Err(NvmeError::InsufficientData { len: 0, .. })
        ));
    }

    #[test]
    fn short_buffer_is_insufficient() {
        let buf = vec![0u8; LOG_PAGE_SIZE - 1];
        assert!(matches!(
            parse_ebs_log_page(&buf),
            Err(NvmeError::InsufficientData { .. })
        ));
        assert!(matches!(
            parse_instance_store_log_page(&buf),
            Err(NvmeError::InsufficientData { .. })
        ));
    }

    #[test]
    fn oversized_buffer_is_rejected_before_decode() {
        let buf = vec![0u8; MAX_LOG_PAGE_SIZE + 1];
        assert!(matches!(
            parse_ebs_log_page(&buf),
            Err(NvmeError::BufferOverflow { .. })
        ));
    }

    #[test]
    fn oversized_but_bounded_buffer_decodes() {
        let buf = {
            let mut b = encode::ebs_log_page(&sample_ebs());
            b.resize(MAX_LOG_PAGE_SIZE, 0);
            b
        };
        assert!(parse_ebs_log_page(&buf).is_ok());
    }

    #[test]
    fn layout_sizes_fit_in_one_log_page() {
        assert!(EBS_LAYOUT_SIZE <= LOG_PAGE_SIZE);
        assert!(INSTANCE_STORE_LAYOUT_SIZE <= LOG_PAGE_SIZE);
    }

    #[test]
    fn safe_conversion_boundaries() {
        assert_eq!(safe_u64_to_i64(i64::MAX as u64).unwrap(), i64::MAX);
        let err = safe_u64_to_i64(i64::MAX as u64 + 1).unwrap_err();
        assert!(err.to_string().contains("too large for int64"));
    }
}
