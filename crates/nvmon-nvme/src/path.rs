//! Device-name sanitization and `/dev` path resolution.
//!
//! Device names originate from directory listings and, transitively, from
//! whatever created the device node. Every name passes through
//! [`device_path`] before it is handed to a privileged open/ioctl call;
//! nothing else in this crate constructs device paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{NvmeError, Result};

/// Base directory NVMe device nodes live under.
pub const DEV_DIRECTORY: &str = "/dev";

/// Longest device name accepted by the sanitizer.
const MAX_DEVICE_NAME_LEN: usize = 32;

/// Resolve a bare device name to a path under [`DEV_DIRECTORY`], or fail.
///
/// Rejected outright: empty names, null bytes, control characters other
/// than tab, `..`, path separators, backslashes, characters outside
/// `[0-9a-z]`, names longer than 32 characters, and names that do not
/// match the NVMe `<controller>n<namespace>[p<partition>]` pattern.
pub fn device_path(device: &str) -> Result<PathBuf> {
    device_path_in(Path::new(DEV_DIRECTORY), device)
}

/// [`device_path`] against an explicit base directory. The injectable base
/// exists for the Linux provider and its tests; production callers use
/// [`device_path`].
pub fn device_path_in(base: &Path, device: &str) -> Result<PathBuf> {
    let device = device.trim();
    if device.is_empty() {
        return Err(invalid("device name cannot be empty"));
    }

    if device.contains('\0') {
        return Err(invalid("device name cannot contain null bytes"));
    }

    for (i, ch) in device.char_indices() {
        if (ch as u32) < 32 && ch != '\t' {
            return Err(NvmeError::InvalidDeviceName {
                reason: format!(
                    "device name contains invalid control character at position {i} (code {})",
                    ch as u32
                ),
            });
        }
    }

    if device.contains("..") || device.contains('/') {
        return Err(invalid(
            "device name cannot contain path separators or traversal sequences",
        ));
    }

    if device.contains('\\') {
        return Err(invalid("device name cannot contain backslashes"));
    }

    for (i, ch) in device.char_indices() {
        if !is_valid_device_name_char(ch) {
            return Err(NvmeError::InvalidDeviceName {
                reason: format!("device name contains invalid character '{ch}' at position {i}"),
            });
        }
    }

    if device.len() > MAX_DEVICE_NAME_LEN {
        return Err(NvmeError::InvalidDeviceName {
            reason: format!(
                "device name exceeds maximum length of {MAX_DEVICE_NAME_LEN} characters (got {})",
                device.len()
            ),
        });
    }

    // Pattern validation works on the portion after the `nvme` prefix;
    // bare pattern-form names (e.g. "0n1") are accepted as-is.
    let pattern = device.strip_prefix(crate::device::NVME_DEVICE_PREFIX).unwrap_or(device);
    parse_name_pattern(pattern)?;

    let full_path = base.join(device);

    // Re-verify containment after construction: a name passing the checks
    // above cannot introduce components, but the resolution must still be
    // proven to stay inside the base directory. Fails closed on mismatch.
    let normalized = normalize_lexically(&full_path)?;
    if !normalized.starts_with(base) {
        return Err(NvmeError::InvalidDeviceName {
            reason: format!(
                "device path escapes {} (resolved to: {})",
                base.display(),
                normalized.display()
            ),
        });
    }
    if normalized != full_path {
        return Err(NvmeError::InvalidDeviceName {
            reason: format!(
                "device path resolution mismatch (expected: {}, resolved: {})",
                full_path.display(),
                normalized.display()
            ),
        });
    }

    Ok(normalized)
}

/// Parse the NVMe name pattern `<controller>n<namespace>[p<partition>]`,
/// returning the numeric components.
pub(crate) fn parse_name_pattern(name: &str) -> Result<(u32, u32, Option<u32>)> {
    if name.len() < 3 {
        return Err(invalid(
            "device name too short for valid NVMe pattern (minimum 3 characters)",
        ));
    }

    let n_count = name.matches('n').count();
    if n_count == 0 {
        return Err(invalid(
            "device name must contain 'n' separator (controller<n>namespace)",
        ));
    }
    if n_count > 1 {
        return Err(invalid("device name contains multiple namespace separators"));
    }

    // Exactly one 'n' is present.
    let (controller_part, remaining) = name.split_once('n').unwrap_or((name, ""));
    if controller_part.is_empty() {
        return Err(invalid("missing controller number"));
    }
    let controller = parse_decimal(controller_part, "controller")?;

    if remaining.is_empty() {
        return Err(invalid("missing namespace number"));
    }

    let p_count = remaining.matches('p').count();
    if p_count > 1 {
        return Err(invalid("device name contains multiple partition separators"));
    }

    match remaining.split_once('p') {
        None => {
            let namespace = parse_decimal(remaining, "namespace")?;
            Ok((controller, namespace, None))
        }
        Some((namespace_part, partition_part)) => {
            if namespace_part.is_empty() {
                return Err(invalid("missing namespace number before partition"));
            }
            let namespace = parse_decimal(namespace_part, "namespace")?;
            if partition_part.is_empty() {
                return Err(invalid("missing partition number after 'p'"));
            }
            let partition = parse_decimal(partition_part, "partition")?;
            Ok((controller, namespace, Some(partition)))
        }
    }
}

fn parse_decimal(part: &str, field: &str) -> Result<u32> {
    if let Some((i, ch)) = part.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        return Err(NvmeError::InvalidDeviceName {
            reason: format!("{field} part contains non-digit character '{ch}' at position {i}"),
        });
    }
    part.parse::<u32>().map_err(|_| NvmeError::InvalidDeviceName {
        reason: format!("{field} number '{part}' is out of range"),
    })
}

fn is_valid_device_name_char(ch: char) -> bool {
    ch.is_ascii_digit() || ch.is_ascii_lowercase()
}

/// Lexical normalization: resolves `.` components and rejects any `..`.
/// Symlinks are deliberately not followed; the device node itself is the
/// target, and a name cannot contain separators by the time this runs.
fn normalize_lexically(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(invalid(
                    "device path cannot contain parent-directory components",
                ));
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    Ok(out)
}

fn invalid(reason: &str) -> NvmeError {
    NvmeError::InvalidDeviceName {
        reason: reason.to_string(),
    }
}
