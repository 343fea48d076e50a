//! Error types for buffer construction and the item/packet operations.
//!
//! All errors are small `Copy` enums. Operations that fail leave the buffer
//! untouched: a failed `put` writes nothing, a failed `read` consumes
//! nothing, so callers can retry after draining or refilling.

use thiserror::Error;

/// Errors from constructing or attaching a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// Requested a buffer with no storage.
    #[error("buffer size must be nonzero")]
    ZeroSize,

    /// Requested capacity exceeds what the index representation can address.
    #[error("buffer size {requested} exceeds the maximum of {max} bytes")]
    TooLarge { requested: usize, max: usize },

    /// `item_size * item_capacity` overflowed `usize`.
    #[error("item size {item_size} times capacity {item_capacity} overflows")]
    CapacityOverflow {
        item_size: usize,
        item_capacity: usize,
    },

    /// Packet regions hold 32-bit cursors that are accessed in place.
    #[error("packet region must be 4-byte aligned")]
    Misaligned,

    /// The region cannot hold the packet header plus a minimal frame.
    #[error("packet region of {total} bytes is below the minimum of {min}")]
    RegionTooSmall { total: usize, min: usize },

    /// An attached region's stored capacity disagrees with the region size.
    #[error("stored capacity {stored} does not match region data size {expected}")]
    CapacityMismatch { stored: usize, expected: usize },
}

/// Errors from the fixed-item-size queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FifoError {
    /// No room for another item; nothing was written.
    #[error("fifo is full")]
    Full,

    /// No complete item is queued; nothing was read.
    #[error("fifo is empty")]
    Empty,
}

/// Errors from the packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// No packet is queued.
    #[error("packet buffer is empty")]
    Empty,

    /// The frame (dead tail included, when the write must wrap) does not fit
    /// in the free bytes; nothing was written.
    #[error("no room for a {needed} byte frame ({free} bytes free)")]
    NoSpace { needed: usize, free: usize },

    /// Payload exceeds what the 2-byte length prefix can describe.
    #[error("payload of {len} bytes exceeds the {max} byte frame limit")]
    TooLong { len: usize, max: usize },

    /// Zero-length payloads cannot be framed: a zero prefix is the reserved
    /// wrap padding marker.
    #[error("zero-length payloads cannot be framed")]
    ZeroLength,

    /// The destination cannot hold the next payload; nothing was consumed.
    #[error("destination of {capacity} bytes cannot hold the {len} byte payload")]
    TooSmall { len: usize, capacity: usize },
}
