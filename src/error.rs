//! Error types for the teardown core.
//!
//! Only misuse of the public registry APIs is reported as a [`VmError`].
//! Invariant violations on teardown paths (a permanent outliving-loaders set
//! reaching the free path, a thread deallocated while absent from the live
//! list) are programming errors and panic instead — there is no meaningful
//! fallback once a structure is half freed.

use thiserror::Error;

/// Errors that can occur when driving the registries from outside.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// A module id that is not present in the module pool.
    #[error("unknown module {0}")]
    UnknownModule(u64),
    /// A package id that is not present in the package pool.
    #[error("unknown package {0}")]
    UnknownPackage(u64),
    /// A shared-cache pool token that is already registered.
    #[error("duplicate shared-cache pool token {0}")]
    DuplicateCacheToken(u64),
}

/// Result type for registry operations.
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_readable_messages() {
        let cases = [
            (VmError::UnknownModule(7), "unknown module 7"),
            (VmError::UnknownPackage(9), "unknown package 9"),
            (
                VmError::DuplicateCacheToken(3),
                "duplicate shared-cache pool token 3",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }
}
