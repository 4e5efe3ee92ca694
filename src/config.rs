//! Endpoint configuration

use crate::error::{HatchError, Result};

/// Default payload capacity (1 KiB)
pub const DEFAULT_CAPACITY: usize = 1024;

/// How an endpoint maps the shared segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Map read-only; the endpoint can receive but never write
    ReadOnly,
    /// Map read-write
    ReadWrite,
}

/// Configuration for one endpoint
///
/// Immutable once handed to the endpoint. Owners size the segment from
/// `capacity`; attachers learn the real capacity from the segment descriptor
/// and ignore the configured value.
#[derive(Debug, Clone)]
pub struct HatchConfig {
    /// Segment name, also the base of the derived notifier name
    pub name: String,
    /// Payload capacity in bytes
    pub capacity: usize,
    /// How to map the segment
    pub access: AccessMode,
    /// Zero the length prefix as soon as its value has been read
    pub auto_clear: bool,
}

impl HatchConfig {
    /// Configuration for `name` with the default capacity, read-write
    /// access and auto-clear off
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            access: AccessMode::ReadWrite,
            auto_clear: false,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        // The 4-byte length prefix bounds the capacity from above.
        if self.capacity == 0 || u32::try_from(self.capacity).is_err() {
            return Err(HatchError::InvalidCapacity);
        }
        Ok(())
    }
}
