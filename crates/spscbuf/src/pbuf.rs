//! SPSC packet buffer over a flat memory region.
//!
//! [`PacketBuf`] moves variable-length messages between exactly two
//! execution contexts, typically two cores sharing a stretch of RAM. The
//! whole structure lives inside the caller's region so both sides can reach
//! it; the in-memory layout is the wire contract:
//!
//! ```text
//! ┌──────────────┬───────────┬─────────────┬────────────┬────────────────┐
//! │ capacity u32 │ flags u32 │ write  u32  │ read  u32  │ data area ...  │
//! └──────────────┴───────────┴─────────────┴────────────┴────────────────┘
//!  0              4           8              12           16
//! ```
//!
//! The cursor words are used as atomics in place and are native-endian; the
//! data area holds frames of a 2-byte little-endian length prefix followed
//! by that many payload bytes:
//!
//! ```text
//! ┌─────────┬────────────────┬─────────┬─────────────┬─────────────┐
//! │ len u16 │ payload        │ len u16 │ payload     │ 0x0000 pad  │
//! └─────────┴────────────────┴─────────┴─────────────┴─────────────┘
//! ```
//!
//! A frame is never split across the physical end of the data area. When
//! the contiguous tail under the write cursor cannot hold the next frame,
//! the writer abandons the tail and restarts at offset 0, leaving a zero
//! length prefix as a padding marker when the tail is at least 2 bytes wide.
//! The reader reproduces the decision from shared state alone: a tail too
//! narrow for a prefix, or a zero prefix, means "jump to offset 0". Payload
//! lengths start at 1, so a marker can never be mistaken for a frame.
//!
//! Occupancy comes from the cursors alone and cursor equality always means
//! empty, so the writer keeps one byte of permanent slack: at most
//! `capacity - 1` bytes (abandoned tails included) are ever in flight. The
//! admission check charges an abandoned tail to the write that causes it,
//! which is what keeps the cursors from ever colliding.

use crate::error::{InitError, PacketError};
use crate::invariants::{debug_assert_cursor_bounds, debug_assert_frame_bounds};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

/// Bookkeeping block at the front of the region.
#[repr(C)]
struct Header {
    cap: u32,
    flags: u32,
    wr: AtomicU32,
    rd: AtomicU32,
}

/// Size of the in-region header in bytes.
pub const HEADER_LEN: usize = mem::size_of::<Header>();

/// Width of the per-frame length prefix in bytes.
pub const PREFIX_LEN: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Smallest acceptable region: the header plus a data area wide enough that
/// a minimal frame stays admissible at every cursor position.
pub const MIN_REGION_LEN: usize = HEADER_LEN + 8;

/// Zero length prefix reserved as the wrap padding marker.
const PAD_MARKER: u16 = 0;

const _: () = assert!(HEADER_LEN == 16);

/// Data area size for a region of `total_size` bytes. Use this to size
/// backing storage so that a wanted capacity comes out exactly.
#[must_use]
pub const fn capacity_of(total_size: usize) -> usize {
    total_size.saturating_sub(HEADER_LEN)
}

/// Bytes in flight given a cursor snapshot. Equality means empty.
#[inline]
fn occupied(cap: u32, wr: u32, rd: u32) -> u32 {
    if wr >= rd {
        wr - rd
    } else {
        cap - (rd - wr)
    }
}

/// SPSC variable-length message buffer in caller-supplied memory.
///
/// Create one side with [`PacketBuf::init`] over an exclusively borrowed
/// region; a peer context that shares the memory obtains its endpoint with
/// the unsafe [`PacketBuf::attach`]. Writes and reads are all-or-nothing
/// per message and never block.
///
/// Concurrent use goes through [`PacketBuf::split`]; single-context callers
/// can use the `&mut self` surface directly.
pub struct PacketBuf<'a> {
    hdr: *const Header,
    data: *mut u8,
    /// Copy of the header capacity, kept out of the shared cache line.
    cap: u32,
    _region: PhantomData<&'a mut [u8]>,
}

// SAFETY: the raw pointers target the caller's region; cursor updates are
// atomic and payload bytes have one writer at a time under the cursor
// protocol in the module header.
unsafe impl Send for PacketBuf<'_> {}
unsafe impl Sync for PacketBuf<'_> {}

impl<'a> PacketBuf<'a> {
    /// Lays a fresh packet buffer over `region` and becomes its handle.
    ///
    /// The region must be 4-byte aligned (the cursor words are accessed as
    /// atomics in place) and at least [`MIN_REGION_LEN`] bytes. Usable
    /// message capacity is `region.len() - HEADER_LEN`.
    pub fn init(region: &'a mut [u8], flags: u32) -> Result<Self, InitError> {
        let total = region.len();
        if total < MIN_REGION_LEN {
            return Err(InitError::RegionTooSmall {
                total,
                min: MIN_REGION_LEN,
            });
        }
        let base = region.as_mut_ptr();
        if base.align_offset(mem::align_of::<Header>()) != 0 {
            return Err(InitError::Misaligned);
        }
        let cap = total - HEADER_LEN;
        if cap > u32::MAX as usize {
            return Err(InitError::TooLarge {
                requested: total,
                max: u32::MAX as usize,
            });
        }

        let hdr = base.cast::<Header>();
        // SAFETY: alignment and size were checked and the region is borrowed
        // exclusively for 'a.
        unsafe {
            ptr::write(
                hdr,
                Header {
                    cap: cap as u32,
                    flags,
                    wr: AtomicU32::new(0),
                    rd: AtomicU32::new(0),
                },
            );
        }

        Ok(Self {
            hdr,
            // SAFETY: total >= HEADER_LEN, so the data pointer stays in the
            // allocation.
            data: unsafe { base.add(HEADER_LEN) },
            cap: cap as u32,
            _region: PhantomData,
        })
    }

    /// Adopts a region that a peer context already initialized.
    ///
    /// Validates alignment and that the stored capacity matches
    /// `total_size - HEADER_LEN`, then becomes this side's endpoint.
    ///
    /// # Safety
    ///
    /// - `ptr` must be valid for reads and writes of `total_size` bytes for
    ///   the whole lifetime `'a`, and no other code may touch the region
    ///   except through this crate.
    /// - The region must have been set up by [`PacketBuf::init`] (or a
    ///   layout-identical peer), and that initialization must happen-before
    ///   this call, for example via the notification that hands the region
    ///   over.
    /// - Across all contexts there must be exactly one writing endpoint and
    ///   one reading endpoint.
    pub unsafe fn attach(ptr: *mut u8, total_size: usize) -> Result<Self, InitError> {
        if total_size < MIN_REGION_LEN {
            return Err(InitError::RegionTooSmall {
                total: total_size,
                min: MIN_REGION_LEN,
            });
        }
        if ptr.align_offset(mem::align_of::<Header>()) != 0 {
            return Err(InitError::Misaligned);
        }

        let hdr = ptr.cast::<Header>().cast_const();
        // SAFETY: caller guarantees the region is initialized and live.
        let stored = unsafe { (*hdr).cap } as usize;
        let expected = total_size - HEADER_LEN;
        if stored != expected {
            return Err(InitError::CapacityMismatch { stored, expected });
        }

        Ok(Self {
            hdr,
            // SAFETY: total_size >= HEADER_LEN.
            data: unsafe { ptr.add(HEADER_LEN) },
            cap: stored as u32,
            _region: PhantomData,
        })
    }

    #[inline]
    fn header(&self) -> &Header {
        // SAFETY: hdr points at the initialized header for 'a.
        unsafe { &*self.hdr }
    }

    /// Data area size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap as usize
    }

    /// The opaque flags word stored at init. This crate does not interpret
    /// it; platform ports use it for concerns like cache maintenance mode.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.header().flags
    }

    /// True when no message is queued, from this side's point of view.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let wr = self.header().wr.load(Ordering::Acquire);
        let rd = self.header().rd.load(Ordering::Acquire);
        wr == rd
    }

    // ---------------------------------------------------------------------
    // SINGLE-CONTEXT SURFACE
    // ---------------------------------------------------------------------

    /// Frames `payload` and queues it. All-or-nothing.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        self.write_internal(payload)
    }

    /// Dequeues the next message into `out`; returns the payload length.
    /// A too-small `out` fails without consuming anything.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, PacketError> {
        self.read_internal(out)
    }

    /// Length of the next queued message without consuming it.
    pub fn peek_len(&self) -> Option<usize> {
        self.next_frame().map(|frame| frame.len)
    }

    /// Bytes a write may still claim before any dead-tail charge.
    pub fn free_space(&self) -> usize {
        let wr = self.header().wr.load(Ordering::Relaxed);
        let rd = self.header().rd.load(Ordering::Acquire);
        (self.cap - 1 - occupied(self.cap, wr, rd)) as usize
    }

    /// Discards all queued messages and rewinds both cursors. Storage is
    /// not zeroed; the header capacity and flags survive.
    ///
    /// Exclusive access means no endpoint split from this handle can exist.
    /// A peer holding its own endpoint over the same region via
    /// [`PacketBuf::attach`] must be quiescent for the duration of the call
    /// and must synchronize with it before touching the buffer again, the
    /// same hand-over `attach` itself requires.
    pub fn reset(&mut self) {
        self.header().wr.store(0, Ordering::Release);
        self.header().rd.store(0, Ordering::Release);
    }

    /// Splits the buffer into its SPSC endpoints. The buffer itself is
    /// inaccessible while they live and neither endpoint is Clone.
    pub fn split(&mut self) -> (PacketWriter<'_>, PacketReader<'_>) {
        let pbuf = &*self;
        (PacketWriter { pbuf }, PacketReader { pbuf })
    }

    // ---------------------------------------------------------------------
    // WRITE PATH
    // ---------------------------------------------------------------------

    fn read_prefix(&self, at: u32) -> u16 {
        let mut bytes = [0u8; PREFIX_LEN];
        // SAFETY: callers keep `at + PREFIX_LEN` inside the data area.
        unsafe {
            ptr::copy_nonoverlapping(self.data.add(at as usize), bytes.as_mut_ptr(), PREFIX_LEN);
        }
        u16::from_le_bytes(bytes)
    }

    fn write_prefix(&self, at: u32, value: u16) {
        let bytes = value.to_le_bytes();
        // SAFETY: callers keep `at + PREFIX_LEN` inside the data area.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.data.add(at as usize), PREFIX_LEN);
        }
    }

    /// Admission check and wrap decision for a frame of `payload_len` bytes.
    /// On success the frame start offset is returned and the padding marker,
    /// if one was called for, has been written. Cursors do not move.
    fn reserve_frame(&self, payload_len: usize) -> Result<u32, PacketError> {
        if payload_len == 0 {
            return Err(PacketError::ZeroLength);
        }
        if payload_len > MAX_PAYLOAD {
            return Err(PacketError::TooLong {
                len: payload_len,
                max: MAX_PAYLOAD,
            });
        }
        let needed = payload_len + PREFIX_LEN;

        let wr = self.header().wr.load(Ordering::Relaxed);
        let rd = self.header().rd.load(Ordering::Acquire);
        let free = (self.cap - 1 - occupied(self.cap, wr, rd)) as usize;
        let tail = (self.cap - wr) as usize;

        // A frame that must restart at offset 0 also pays for the tail it
        // abandons; otherwise the write cursor could land on the read
        // cursor and the queued bytes would read back as empty.
        let cost = if tail >= needed { needed } else { tail + needed };
        if cost > free {
            return Err(PacketError::NoSpace { needed, free });
        }

        if tail >= needed {
            Ok(wr)
        } else {
            if tail >= PREFIX_LEN {
                self.write_prefix(wr, PAD_MARKER);
            }
            Ok(0)
        }
    }

    /// Publishes the frame at `start`. The prefix and payload bytes must
    /// already be in place.
    fn publish_frame(&self, start: u32, payload_len: usize) {
        debug_assert_frame_bounds!(start as usize, payload_len, self.cap as usize);
        let mut wr2 = start + (PREFIX_LEN + payload_len) as u32;
        if wr2 == self.cap {
            wr2 = 0;
        }
        debug_assert_cursor_bounds!("write", wr2, self.cap);
        self.header().wr.store(wr2, Ordering::Release);
    }

    fn write_internal(&self, payload: &[u8]) -> Result<(), PacketError> {
        let start = self.reserve_frame(payload.len())?;
        self.write_prefix(start, payload.len() as u16);
        // SAFETY: reserve_frame guarantees the frame fits the data area and
        // the bytes are outside the readable region.
        unsafe {
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.data.add(start as usize + PREFIX_LEN),
                payload.len(),
            );
        }
        self.publish_frame(start, payload.len());
        Ok(())
    }

    fn alloc_internal(&self, len: usize) -> Result<PacketSlot<'_>, PacketError> {
        let start = self.reserve_frame(len)?;
        Ok(PacketSlot {
            pbuf: self.shorten(),
            start,
            len,
        })
    }

    /// Reborrows self with the shorter handle lifetime. Covariance makes
    /// the grant types single-lifetime.
    #[inline]
    fn shorten(&self) -> &PacketBuf<'_> {
        self
    }

    // ---------------------------------------------------------------------
    // READ PATH
    // ---------------------------------------------------------------------

    /// Locates the next frame, reproducing the writer's wrap decision.
    fn next_frame(&self) -> Option<Frame> {
        let rd = self.header().rd.load(Ordering::Relaxed);
        let wr = self.header().wr.load(Ordering::Acquire);
        if rd == wr {
            return None;
        }

        let tail = (self.cap - rd) as usize;
        let start = if tail < PREFIX_LEN || self.read_prefix(rd) == PAD_MARKER {
            0
        } else {
            rd
        };
        debug_assert_cursor_bounds!("frame", start, self.cap);
        debug_assert!(start != wr, "wrap landed on the write cursor");

        let len = self.read_prefix(start) as usize;
        debug_assert_frame_bounds!(start as usize, len, self.cap as usize);

        let mut next = start + (PREFIX_LEN + len) as u32;
        if next == self.cap {
            next = 0;
        }
        Some(Frame { start, len, next })
    }

    fn read_internal(&self, out: &mut [u8]) -> Result<usize, PacketError> {
        let frame = self.next_frame().ok_or(PacketError::Empty)?;
        if out.len() < frame.len {
            return Err(PacketError::TooSmall {
                len: frame.len,
                capacity: out.len(),
            });
        }
        // SAFETY: the frame was published before the write cursor our
        // Acquire load observed; out is long enough (checked above).
        unsafe {
            ptr::copy_nonoverlapping(
                self.data.add(frame.start as usize + PREFIX_LEN),
                out.as_mut_ptr(),
                frame.len,
            );
        }
        self.header().rd.store(frame.next, Ordering::Release);
        Ok(frame.len)
    }
}

impl std::fmt::Debug for PacketBuf<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketBuf")
            .field("capacity", &self.cap)
            .field("flags", &self.flags())
            .field("write", &self.header().wr.load(Ordering::Relaxed))
            .field("read", &self.header().rd.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A located frame: start offset, payload length, cursor value past it.
struct Frame {
    start: u32,
    len: usize,
    next: u32,
}

/// Writer endpoint of a [`PacketBuf`]. Not Clone; exactly one writer exists.
pub struct PacketWriter<'p> {
    pbuf: &'p PacketBuf<'p>,
}

impl<'p> PacketWriter<'p> {
    /// See [`PacketBuf::write`].
    pub fn write(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        self.pbuf.write_internal(payload)
    }

    /// Claims space for a `len` byte payload and hands it out for in-place
    /// filling. The admission rules of [`PacketBuf::write`] apply. Nothing
    /// is visible to the reader until [`PacketSlot::commit`]; dropping the
    /// slot publishes nothing.
    pub fn alloc(&mut self, len: usize) -> Result<PacketSlot<'_>, PacketError> {
        self.pbuf.alloc_internal(len)
    }

    /// See [`PacketBuf::free_space`].
    #[inline]
    pub fn free_space(&self) -> usize {
        self.pbuf.free_space()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pbuf.capacity()
    }
}

/// Claimed, not yet published frame payload. Derefs to the payload bytes.
pub struct PacketSlot<'p> {
    pbuf: &'p PacketBuf<'p>,
    start: u32,
    len: usize,
}

impl PacketSlot<'_> {
    /// Publishes the first `used` bytes of the slot as one message.
    ///
    /// Committing less than was claimed is fine; the admission check was
    /// conservative in that case, never the other way.
    ///
    /// # Panics
    ///
    /// If `used` is zero or exceeds the claimed length.
    pub fn commit(self, used: usize) {
        assert!(used >= 1, "a committed packet cannot be empty");
        assert!(
            used <= self.len,
            "commit of {used} bytes exceeds the {} byte claim",
            self.len
        );
        self.pbuf.write_prefix(self.start, used as u16);
        self.pbuf.publish_frame(self.start, used);
    }
}

impl Deref for PacketSlot<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the claimed bytes sit outside the published region and
        // belong to this writer until commit.
        unsafe {
            slice::from_raw_parts(
                self.pbuf.data.add(self.start as usize + PREFIX_LEN),
                self.len,
            )
        }
    }
}

impl DerefMut for PacketSlot<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for Deref; the slot is the unique owner of these bytes.
        unsafe {
            slice::from_raw_parts_mut(
                self.pbuf.data.add(self.start as usize + PREFIX_LEN),
                self.len,
            )
        }
    }
}

/// Reader endpoint of a [`PacketBuf`]. Not Clone; exactly one reader exists.
pub struct PacketReader<'p> {
    pbuf: &'p PacketBuf<'p>,
}

impl<'p> PacketReader<'p> {
    /// See [`PacketBuf::read`].
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, PacketError> {
        self.pbuf.read_internal(out)
    }

    /// See [`PacketBuf::peek_len`].
    pub fn peek_len(&self) -> Option<usize> {
        self.pbuf.next_frame().map(|frame| frame.len)
    }

    /// Borrows the next message in place. [`Packet::release`] consumes it;
    /// dropping the packet leaves it queued.
    pub fn claim(&mut self) -> Option<Packet<'_>> {
        let frame = self.pbuf.next_frame()?;
        Some(Packet {
            pbuf: self.pbuf.shorten(),
            frame,
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pbuf.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pbuf.capacity()
    }
}

/// A queued message borrowed in place. Derefs to the payload bytes.
pub struct Packet<'p> {
    pbuf: &'p PacketBuf<'p>,
    frame: Frame,
}

impl Packet<'_> {
    /// Consumes the message, freeing its bytes for the writer.
    pub fn release(self) {
        self.pbuf
            .header()
            .rd
            .store(self.frame.next, Ordering::Release);
    }
}

impl Deref for Packet<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: published payload bytes; the writer cannot reclaim them
        // until the read cursor moves in release().
        unsafe {
            slice::from_raw_parts(
                self.pbuf.data.add(self.frame.start as usize + PREFIX_LEN),
                self.frame.len,
            )
        }
    }
}
