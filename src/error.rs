//! Error types for MemHatch

use std::io;
use thiserror::Error;

/// Result type for MemHatch operations
pub type Result<T> = std::result::Result<T, HatchError>;

/// Errors that can occur in MemHatch operations
#[derive(Debug, Error)]
pub enum HatchError {
    /// Owner construction attempted against a name already in use
    #[error("Shared segment '{name}' already exists")]
    SegmentAlreadyExists { name: String },

    /// Attacher construction attempted against a name with no live owner
    #[error("Shared segment '{name}' not found")]
    SegmentNotFound { name: String },

    /// Failed to create the shared segment for a reason other than EEXIST
    #[error("Failed to create shared segment '{name}': {source}")]
    SegmentCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open the shared segment for a reason other than ENOENT
    #[error("Failed to open shared segment '{name}': {source}")]
    SegmentOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to size the shared segment
    #[error("Failed to set shared segment size: {0}")]
    Truncate(#[source] io::Error),

    /// Failed to map the shared segment
    #[error("Failed to map shared segment: {0}")]
    Mmap(#[source] io::Error),

    /// The segment descriptor reports a geometry the object cannot back
    #[error("Segment '{name}' has an invalid descriptor (total size {total_size})")]
    InvalidDescriptor { name: String, total_size: u64 },

    /// The cross-process notifier could not be created or opened
    #[error("Notifier for '{name}' unavailable: {source}")]
    NotifierUnavailable {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Write payload exceeds the segment capacity
    #[error("Payload too large: capacity {capacity} bytes, got {got} bytes")]
    PayloadTooLarge { capacity: usize, got: usize },

    /// Configured capacity is zero or too large for the length prefix
    #[error("Capacity must be nonzero and fit the 4-byte length prefix")]
    InvalidCapacity,

    /// Segment name too long for the OS object namespace
    #[error("Segment name too long: max {max} chars, got {got}")]
    NameTooLong { max: usize, got: usize },

    /// Segment name cannot be encoded as an OS object name
    #[error("'{name}' is not a valid segment name")]
    InvalidName { name: String },

    /// Write attempted on a read-only endpoint
    #[error("Endpoint '{name}' is read-only")]
    ReadOnly { name: String },

    /// Owner endpoints must map the segment read-write
    #[error("Owner endpoint requires read-write access")]
    OwnerReadOnly,

    /// Failed to start the background listener thread
    #[error("Failed to start listener thread: {0}")]
    ListenerSpawn(#[source] io::Error),

    /// Operation attempted on a disposed endpoint
    #[error("Endpoint has been disposed")]
    Disposed,
}
