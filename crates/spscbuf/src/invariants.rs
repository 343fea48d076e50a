//! Debug assertion macros for the buffer invariants.
//!
//! These macros provide runtime checks for the structural invariants the
//! buffers maintain. They are only active in debug builds
//! (`#[cfg(debug_assertions)]`), so there is zero overhead in release builds.
//!
//! Used by `RingBuf`, `ItemFifo` and `PacketBuf`.

// =============================================================================
// Cursor bounds
// =============================================================================

/// Assert that a cursor stays inside the storage.
///
/// **Invariant**: `0 <= cursor < capacity`
///
/// Used in: every cursor update in `ring.rs` and `pbuf.rs`
macro_rules! debug_assert_cursor_bounds {
    ($name:literal, $cursor:expr, $capacity:expr) => {
        debug_assert!(
            $cursor < $capacity,
            "cursor invariant violated: {} cursor {} outside capacity {}",
            $name,
            $cursor,
            $capacity
        )
    };
}

// =============================================================================
// Occupancy conservation
// =============================================================================

/// Assert that used and free slots always account for the whole buffer.
///
/// **Invariant**: `len + space == capacity`
///
/// Used in: `ItemFifo` after put/get, where the counts come from separate
/// floor divisions and only item-aligned cursors keep them conserved
macro_rules! debug_assert_occupancy {
    ($len:expr, $space:expr, $capacity:expr) => {
        debug_assert!(
            $len + $space == $capacity,
            "occupancy invariant violated: len {} + space {} != capacity {}",
            $len,
            $space,
            $capacity
        )
    };
}

// =============================================================================
// Full flag consistency
// =============================================================================

/// Assert that the full flag is only ever raised at cursor equality.
///
/// **Invariant**: `full == true` implies `write_index == read_index`
///
/// Used in: `ring.rs` after unpacking the consumer word
macro_rules! debug_assert_full_state {
    ($full:expr, $wr:expr, $rd:expr) => {
        debug_assert!(
            !$full || $wr == $rd,
            "full flag invariant violated: full set with write {} != read {}",
            $wr,
            $rd
        )
    };
}

// =============================================================================
// Frame bounds
// =============================================================================

/// Assert that a located packet frame is sane before it is handed out.
///
/// **Invariant**: `1 <= payload_len` and the whole frame lies inside the data
/// area (a frame may end exactly at the physical end, never past it).
///
/// Used in: `pbuf.rs` after reading a length prefix
macro_rules! debug_assert_frame_bounds {
    ($start:expr, $payload_len:expr, $capacity:expr) => {
        debug_assert!(
            $payload_len >= 1
                && $start + crate::pbuf::PREFIX_LEN + $payload_len <= $capacity,
            "frame invariant violated: frame at {} with payload {} overruns capacity {}",
            $start,
            $payload_len,
            $capacity
        )
    };
}

// =============================================================================
// Re-exports for crate-internal use
// =============================================================================

pub(crate) use debug_assert_cursor_bounds;
pub(crate) use debug_assert_frame_bounds;
pub(crate) use debug_assert_full_state;
pub(crate) use debug_assert_occupancy;
