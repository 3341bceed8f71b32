//! Error types for cache and netlink operations.

use std::io;

/// Result type for cache and netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while decoding, caching or changing objects.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A buffer could not be allocated.
    #[error("out of memory")]
    NoMemory,

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Message was truncated.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected message length.
        expected: usize,
        /// Actual bytes received.
        actual: usize,
    },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// An attribute violated its policy.
    #[error("malformed attribute {attr_type}: {reason}")]
    MalformedAttribute {
        /// Attribute type as seen on the wire (flags masked off).
        attr_type: u16,
        /// What was wrong with it.
        reason: String,
    },

    /// A mandatory attribute was absent.
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),

    /// Invalid attribute payload.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// Object not found.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Operation not supported.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// An entry with the same name already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// No cache type is registered under this name.
    #[error("unknown cache type: {0}")]
    UnknownCacheType(String),

    /// A cache was accessed with the wrong object type.
    #[error("cache type mismatch: {name} does not hold {requested}")]
    CacheMismatch {
        /// Name of the cache that was found.
        name: &'static str,
        /// Name of the type that was requested.
        requested: &'static str,
    },

    /// Dump was interrupted by a concurrent change in the kernel.
    #[error("dump interrupted, results may be inconsistent")]
    DumpInterrupted,
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Create a kernel error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::KernelWithContext {
            operation: operation.into(),
            errno: -errno,
            message,
        }
    }

    /// Create a malformed-attribute error.
    pub fn malformed(attr_type: u16, reason: impl Into<String>) -> Self {
        Self::MalformedAttribute {
            attr_type,
            reason: reason.into(),
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, or a lookup miss).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::ENOENT | libc::ENODEV)
            }
            Self::NotFound(_) | Self::UnknownCacheType(_) => true,
            _ => false,
        }
    }

    /// Check if the operation is unsupported (EOPNOTSUPP from the kernel).
    pub fn is_not_supported(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                *errno == libc::EOPNOTSUPP
            }
            Self::NotSupported(_) => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::EPERM | libc::EACCES)
            }
            _ => false,
        }
    }

    /// Check if this is an "already exists" error (EEXIST or a registry clash).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                *errno == libc::EEXIST
            }
            Self::Exists(_) => true,
            _ => false,
        }
    }

    /// Check if the input could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::InvalidMessage(_)
                | Self::MalformedAttribute { .. }
                | Self::MissingAttribute(_)
                | Self::InvalidAttribute(_)
                | Self::Parse(_)
        )
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-libc::EPERM);
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(libc::EPERM));
    }

    #[test]
    fn test_not_supported() {
        let err = Error::from_errno(-libc::EOPNOTSUPP);
        assert!(err.is_not_supported());
        assert!(!err.is_not_found());

        let err = err.with_context("changing bridge vlan on ifindex 4");
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("ifindex 4"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::from_errno(-libc::ENOENT).is_not_found());
        assert!(Error::from_errno(-libc::ENODEV).is_not_found());
        assert!(Error::NotFound("bridge vlan on ifindex 9".into()).is_not_found());
        assert!(Error::UnknownCacheType("route/link".into()).is_not_found());
    }

    #[test]
    fn test_malformed_category() {
        assert!(Error::malformed(1, "too short").is_malformed());
        assert!(Error::MissingAttribute("BRIDGE_VLANDB_ENTRY").is_malformed());
        assert!(!Error::NoMemory.is_malformed());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::malformed(3, "expected at least 1 bytes, got 0").to_string(),
            "malformed attribute 3: expected at least 1 bytes, got 0"
        );
        assert_eq!(
            Error::CacheMismatch {
                name: "route/mdb",
                requested: "route/bridgevlan"
            }
            .to_string(),
            "cache type mismatch: route/mdb does not hold route/bridgevlan"
        );
    }
}
