//! Single-slot message framing inside a shared segment
//!
//! The slot is a length prefix followed by the payload region. A zero length
//! means the slot is empty; a writer publishes a message by filling the
//! payload first and storing the length last, so a nonzero length always
//! covers fully written bytes.

use std::sync::atomic::Ordering;

use crate::error::{HatchError, Result};
use crate::segment::{SharedSegment, HEADER_SIZE};

/// Width of the length prefix in bytes
pub const LEN_PREFIX_SIZE: usize = 4;

/// Byte offset of the length prefix, right after the descriptor
pub const LEN_OFFSET: usize = HEADER_SIZE;

/// Byte offset where payload bytes begin
pub const PAYLOAD_OFFSET: usize = LEN_OFFSET + LEN_PREFIX_SIZE;

/// Smallest segment that can hold the descriptor and the length prefix
pub const MIN_TOTAL_SIZE: usize = PAYLOAD_OFFSET;

/// Total segment size needed for a payload capacity of `capacity` bytes
#[inline(always)]
pub const fn total_size(capacity: usize) -> usize {
    PAYLOAD_OFFSET + capacity
}

/// Payload capacity of a mapped segment, derived from its mapped size
#[inline(always)]
pub fn capacity_of(segment: &SharedSegment) -> usize {
    segment.size().saturating_sub(PAYLOAD_OFFSET)
}

/// Publish `payload` into the slot
///
/// Overwrites whatever the slot held; there is no occupancy check, the
/// alternating-turn protocol between the two endpoints is the caller's
/// responsibility. The length is stored with release ordering only after
/// every payload byte is in place.
pub fn encode(segment: &SharedSegment, payload: &[u8]) -> Result<()> {
    let capacity = capacity_of(segment);
    // Capacities are validated at creation, but a foreign segment can be
    // arbitrarily large; the length must also fit the 4-byte prefix.
    if payload.len() > capacity || u32::try_from(payload.len()).is_err() {
        return Err(HatchError::PayloadTooLarge {
            capacity,
            got: payload.len(),
        });
    }

    segment.write_at(PAYLOAD_OFFSET, payload);
    segment
        .atomic_u32_at(LEN_OFFSET)
        .store(payload.len() as u32, Ordering::Release);
    Ok(())
}

/// Take the current message out of the slot, if any
///
/// Returns `None` for an empty slot. With `auto_clear` the length prefix is
/// zeroed as soon as it has been read, before the payload is copied out, so
/// the peer can start its next write at the earliest possible moment. Callers
/// holding a read-only mapping must pass `auto_clear = false`; the slot then
/// keeps its content until the peer overwrites it.
///
/// A length larger than the segment's capacity cannot describe a real
/// message; the slot is treated as garbage, cleared when permitted, and
/// nothing is delivered.
pub fn decode(segment: &SharedSegment, auto_clear: bool) -> Option<Vec<u8>> {
    let len_word = segment.atomic_u32_at(LEN_OFFSET);
    let len = len_word.load(Ordering::Acquire) as usize;
    if len == 0 {
        return None;
    }

    if len > capacity_of(segment) {
        tracing::warn!(
            "segment '{}': length prefix {} exceeds capacity {}, dropping slot",
            segment.name(),
            len,
            capacity_of(segment)
        );
        if auto_clear {
            len_word.store(0, Ordering::Release);
        }
        return None;
    }

    if auto_clear {
        len_word.store(0, Ordering::Release);
    }

    let mut buf = vec![0u8; len];
    segment.read_at(PAYLOAD_OFFSET, &mut buf);
    Some(buf)
}
