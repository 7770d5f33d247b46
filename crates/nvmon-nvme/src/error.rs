use std::collections::HashMap;

/// Errors produced by the NVMe device metrics subsystem.
///
/// Every failure in discovery, sanitization, log-page retrieval, decoding
/// and validation maps onto one of these variants. The scrape loop never
/// matches on message strings; classification ([`NvmeError::classify`])
/// dispatches on the variant itself.
#[derive(Debug, thiserror::Error)]
pub enum NvmeError {
    /// NVMe log-page retrieval is only available on Linux.
    #[error("NVMe operations are not supported on this platform")]
    PlatformUnsupported,

    /// Device node or sysfs attribute could not be accessed due to permissions.
    #[error("device access denied for {path}: insufficient permissions (CAP_SYS_ADMIN required)")]
    AccessDenied { path: String },

    /// Device node or sysfs attribute does not exist.
    #[error("device not found: {path}")]
    NotFound { path: String },

    /// Device is busy or temporarily unavailable.
    #[error("device {path} is busy or temporarily unavailable")]
    Busy { path: String },

    /// The OS reported a timeout on the device operation.
    #[error("device operation timed out for {path}")]
    Timeout { path: String },

    /// An open/read on the device or sysfs failed for a reason not covered
    /// by a more specific variant.
    #[error("device access failed for {path}: {source}")]
    Access {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The NVMe admin ioctl failed (bad errno or non-zero completion status).
    #[error("ioctl operation failed for {path}: {detail}")]
    Ioctl { path: String, detail: String },

    /// EBS log page did not carry the expected magic number.
    #[error("invalid EBS magic number: expected 0x{expected:X}, got 0x{actual:X}")]
    InvalidEbsMagic { expected: u64, actual: u64 },

    /// Instance Store log page did not carry the expected magic number.
    #[error("invalid Instance Store magic number: expected 0x{expected:X}, got 0x{actual:X}")]
    InvalidInstanceStoreMagic { expected: u32, actual: u32 },

    /// Input buffer is too small for the fixed log-page layout.
    #[error("insufficient data for parsing: got {len} bytes, need at least {required}")]
    InsufficientData { len: usize, required: usize },

    /// Input buffer exceeds the defensive log-page size ceiling.
    #[error("buffer overflow detected: {len} bytes exceeds maximum allowed size {max}")]
    BufferOverflow { len: usize, max: usize },

    /// A decoded field exceeds its plausibility ceiling.
    #[error("{field} value {value} exceeds reasonable maximum {max}")]
    ExceedsMaximum {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// Cross-field consistency check failed (e.g. bytes without operations).
    #[error("corrupted or invalid data detected: {detail}")]
    CorruptedData { detail: String },

    /// A histogram bin's lower bound exceeds its upper bound.
    #[error("bin {bin} has invalid bounds: lower {lower} > upper {upper}")]
    InvalidBinBounds { bin: usize, lower: u64, upper: u64 },

    /// A cumulative counter does not fit in a signed 64-bit metric value.
    #[error("value {value} is too large for int64")]
    MetricOverflow { value: u64 },

    /// Device could not be classified as EBS or Instance Store.
    #[error("device {device} is in an invalid state: {detail}")]
    InvalidDeviceState { device: String, detail: String },

    /// Device name failed sanitization or NVMe pattern validation.
    #[error("invalid device name: {reason}")]
    InvalidDeviceName { reason: String },

    /// Transient condition; the operation may succeed if retried.
    #[error("temporary failure - operation may succeed if retried: {detail}")]
    TemporaryFailure { detail: String },

    /// An error annotated with the failing operation, the device path and a
    /// free-form context map for diagnostics.
    #[error("{operation} failed for device {device}: {source} (context: {context:?})")]
    Wrapped {
        operation: String,
        device: String,
        context: HashMap<String, String>,
        #[source]
        source: Box<NvmeError>,
    },
}

/// Convenience alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, NvmeError>;

/// Coarse category of a failure, used by the scrape loop for monitoring
/// and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Platform,
    Permission,
    Device,
    Data,
    Network,
    Temporary,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Platform => "platform",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Device => "device",
            ErrorCategory::Data => "data",
            ErrorCategory::Network => "network",
            ErrorCategory::Temporary => "temporary",
            ErrorCategory::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Classification metadata attached to a failure.
///
/// Purely advisory: nothing in this crate retries anything. The scrape
/// loop reads `recoverable` and `retry_after_secs` to decide per-device
/// backoff.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub recoverable: bool,
    /// Suggested retry delay in seconds; 0 means "do not retry".
    pub retry_after_secs: u64,
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    fn new(category: ErrorCategory, recoverable: bool, retry_after_secs: u64) -> Self {
        Self {
            category,
            recoverable,
            retry_after_secs,
            context: HashMap::new(),
        }
    }

    fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.context
            .insert("suggestion".to_string(), suggestion.to_string());
        self
    }
}

impl NvmeError {
    /// Wrap this error with the failing operation, device path and extra
    /// diagnostic context.
    pub fn wrap(
        self,
        operation: &str,
        device: &str,
        context: &[(&str, &str)],
    ) -> NvmeError {
        let mut map = HashMap::new();
        for (k, v) in context {
            map.insert((*k).to_string(), (*v).to_string());
        }
        map.insert("operation".to_string(), operation.to_string());
        map.insert("devicePath".to_string(), device.to_string());
        NvmeError::Wrapped {
            operation: operation.to_string(),
            device: device.to_string(),
            context: map,
            source: Box::new(self),
        }
    }

    /// The innermost error, unwound through any [`NvmeError::Wrapped`] layers.
    pub fn root_cause(&self) -> &NvmeError {
        let mut cur = self;
        while let NvmeError::Wrapped { source, .. } = cur {
            cur = source;
        }
        cur
    }

    /// Classify this error into a category, a recoverability flag and a
    /// suggested retry delay.
    ///
    /// Unrecognized failures default to non-recoverable: callers must not
    /// assume it is safe to retry an unknown error.
    pub fn classify(&self) -> ErrorInfo {
        match self.root_cause() {
            NvmeError::PlatformUnsupported => {
                ErrorInfo::new(ErrorCategory::Platform, false, 0)
            }
            NvmeError::AccessDenied { .. } => {
                ErrorInfo::new(ErrorCategory::Permission, true, 30)
                    .with_suggestion("ensure CAP_SYS_ADMIN capability or run as root")
            }
            NvmeError::NotFound { .. } => ErrorInfo::new(ErrorCategory::Device, true, 60),
            NvmeError::Busy { .. } => ErrorInfo::new(ErrorCategory::Device, true, 10)
                .with_suggestion("device may be in use by another process"),
            NvmeError::Timeout { .. } => ErrorInfo::new(ErrorCategory::Device, true, 15),
            NvmeError::Ioctl { .. } => ErrorInfo::new(ErrorCategory::Device, true, 5),
            NvmeError::InvalidEbsMagic { .. }
            | NvmeError::InvalidInstanceStoreMagic { .. }
            | NvmeError::InsufficientData { .. }
            | NvmeError::BufferOverflow { .. }
            | NvmeError::ExceedsMaximum { .. }
            | NvmeError::CorruptedData { .. }
            | NvmeError::InvalidBinBounds { .. } => {
                ErrorInfo::new(ErrorCategory::Data, true, 5)
            }
            NvmeError::MetricOverflow { .. } => {
                ErrorInfo::new(ErrorCategory::Data, false, 0)
                    .with_suggestion("metric value exceeds maximum representable value")
            }
            NvmeError::TemporaryFailure { .. } => {
                ErrorInfo::new(ErrorCategory::Temporary, true, 10)
            }
            NvmeError::Access { .. }
            | NvmeError::InvalidDeviceState { .. }
            | NvmeError::InvalidDeviceName { .. } => {
                ErrorInfo::new(ErrorCategory::Unknown, false, 0)
            }
            // root_cause never returns Wrapped
            NvmeError::Wrapped { .. } => ErrorInfo::new(ErrorCategory::Unknown, false, 0),
        }
    }

    /// Whether the scrape loop may retry the failed operation.
    pub fn is_recoverable(&self) -> bool {
        self.classify().recoverable
    }

    /// Suggested retry delay in seconds; 0 means "do not retry".
    pub fn retry_delay_secs(&self) -> u64 {
        self.classify().retry_after_secs
    }
}
