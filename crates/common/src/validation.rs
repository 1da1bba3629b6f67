//! Input validation utilities to prevent panics and security vulnerabilities
//!
//! This module provides safe validation for all external inputs to prevent:
//! - Panic-induced service crashes
//! - OOM attacks via unbounded strings
//! - Path traversal attacks
//! - Command injection

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for resource IDs (stream ids, etc.)
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for URIs (RTSP, S3, etc.)
pub const MAX_URI_LENGTH: usize = 4096;

/// Maximum length for file paths
pub const MAX_PATH_LENGTH: usize = 4096;

// ============================================================================
// Safe Time Operations
// ============================================================================

/// Get current Unix timestamp in seconds, safely handling clock errors
///
/// Returns the timestamp, or logs a warning and returns 0 on clock issues.
pub fn safe_unix_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "system clock is before UNIX epoch, using timestamp 0"
            );
            0
        }
    }
}

/// Get current Unix timestamp, returning Result for explicit error handling
pub fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .context("system clock is before UNIX epoch")
}

/// Get duration since UNIX epoch, with safe fallback
pub fn safe_unix_duration() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a resource id (stream id, etc.)
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    // Prevent path traversal in IDs
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Validate URI (RTSP, S3, etc.)
pub fn validate_uri(uri: &str, field_name: &str) -> Result<()> {
    validate_non_empty(uri, field_name)?;
    validate_length(uri, MAX_URI_LENGTH, field_name)?;

    // Prevent shell metacharacters (command injection) -- URIs are interpolated
    // into an argument vector for an external process, never a shell string, but
    // rejecting these up front keeps a malformed URI from masquerading as one.
    let dangerous_chars = ['`', '$', ';', '|', '&', '\n', '\r'];
    if uri.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!(
            "{} contains dangerous shell metacharacters",
            field_name
        ));
    }

    Ok(())
}

// ============================================================================
// Path Validation (Prevent Path Traversal)
// ============================================================================

/// Validate a path's components without requiring it to exist, optionally
/// anchoring it inside `base_dir`.
pub fn validate_path_components(
    path: &Path,
    base_dir: Option<&Path>,
    field_name: &str,
) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("{} contains invalid UTF-8", field_name))?;

    validate_length(path_str, MAX_PATH_LENGTH, field_name)?;

    for component in path.components() {
        if component.as_os_str() == ".." {
            return Err(anyhow!(
                "{} contains '..' component (path traversal attempt)",
                field_name
            ));
        }
    }

    if let Some(base) = base_dir {
        let combined = base.join(path);
        if !combined.starts_with(base) {
            return Err(anyhow!("{} attempts to escape base directory", field_name));
        }
        Ok(combined)
    } else {
        Ok(path.to_path_buf())
    }
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate value is within an inclusive range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_unix_timestamp() {
        let ts = safe_unix_timestamp();
        assert!(ts > 1_700_000_000); // after 2023
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("stream-123", "stream_id").is_ok());
        assert!(validate_id("valid_id_with-dashes_123", "id").is_ok());

        assert!(validate_id("", "id").is_err());
        assert!(validate_id("  ", "id").is_err());
        assert!(validate_id("../etc/passwd", "id").is_err());
        assert!(validate_id("path/to/something", "id").is_err());
        assert!(validate_id(&"a".repeat(300), "id").is_err());
    }

    #[test]
    fn test_validate_uri() {
        assert!(validate_uri("rtsp://camera.local/stream", "uri").is_ok());

        assert!(validate_uri("rtsp://cam`whoami`.local", "uri").is_err());
        assert!(validate_uri("rtsp://cam;rm -rf /", "uri").is_err());
        assert!(validate_uri("rtsp://cam$(id).local", "uri").is_err());
        assert!(validate_uri(&"a".repeat(5000), "uri").is_err());
    }

    #[test]
    fn test_validate_path_components() {
        let base = Path::new("/data/live");
        assert!(validate_path_components(Path::new("media123.ts"), Some(base), "segment").is_ok());
        assert!(
            validate_path_components(Path::new("../../etc/passwd"), Some(base), "segment")
                .is_err()
        );
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(50, 0, 100, "value").is_ok());
        assert!(validate_range(-1, 0, 100, "value").is_err());
        assert!(validate_range(101, 0, 100, "value").is_err());
    }
}
