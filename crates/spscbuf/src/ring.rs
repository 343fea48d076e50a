use crate::error::InitError;
use crate::invariants::{debug_assert_cursor_bounds, debug_assert_full_state};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This SPSC byte ring keeps its cursors in the storage range [0, capacity)
// and disambiguates cursor equality with an explicit full flag: at
// `write == read` the ring is completely empty when the flag is clear and
// completely full when it is set. There is no occupancy counter.
//
// ## The packed cursor/flag word
//
// The full flag and the read cursor share one 32-bit word (`rdf`), flag in
// bit 31, cursor in bits 0..31. Both sides update the pair with a CAS loop,
// so every load observes an internally consistent (read, full) pair:
// - the producer raises the flag together with the cursor value it compared
//   the new write cursor against
// - the consumer advances the cursor and clears the flag in one step
//
// Keeping the two in separate words would admit a lost flag update (producer
// raises full, consumer's clear lands second and erases it, producer then
// overwrites unread bytes) or a raised flag paired with a stale cursor.
// Packing costs one index bit: capacity tops out at `2^31 - 1` bytes.
//
// ## Memory ordering protocol
//
// **Producer (commit path):**
// 1. Load `wr` with Relaxed (only the producer writes it)
// 2. Load `rdf` with Acquire (synchronizes with the consumer's release)
// 3. Write payload bytes (no ordering needed, protected by the protocol)
// 4. Store `wr` with Release (publishes the payload)
// 5. CAS `rdf` to set `full = (new_wr == read)` with AcqRel
//
// **Consumer (consume path):**
// 1. Load `rdf` with Acquire, then `wr` with Acquire, in that order
// 2. Read payload bytes
// 3. CAS `rdf` to advance the cursor and clear the flag with AcqRel
//
// The producer publishes `wr` before the flag CAS. A consumer that observes
// the raised flag therefore also observes the write cursor that justified
// it (Acquire on `rdf`, then the `wr` load cannot return an older value),
// so a raised flag is always paired with `wr == rd`. In the window between
// steps 4 and 5 of a ring-filling commit the consumer can observe
// `wr == rd` with the flag still clear and concludes "empty"; that view is
// conservative and resolves as soon as the CAS lands.
//
// ## Single-writer invariants
//
// - `wr`: written only by the producer
// - `rdf` cursor bits: advanced only by the consumer (the producer's CAS
//   preserves whatever cursor value it reads)
// - payload bytes in [read, read + len): read only by the consumer
// - payload bytes outside that range: written only by the producer
//
// One `RingProducer` and one `RingConsumer` exist per ring (`split` borrows
// the ring exclusively and neither handle is Clone), so the single-writer
// claims hold by construction.
//
// =============================================================================

/// Full flag, packed into bit 31 of the consumer word.
const FULL_BIT: u32 = 1 << 31;

#[inline]
fn pack(rd: u32, full: bool) -> u32 {
    if full {
        rd | FULL_BIT
    } else {
        rd
    }
}

#[inline]
fn unpack(word: u32) -> (u32, bool) {
    (word & !FULL_BIT, word & FULL_BIT != 0)
}

/// Bytes in flight given a consistent cursor/flag snapshot.
#[inline]
fn occupied(cap: u32, wr: u32, rd: u32, full: bool) -> u32 {
    if full {
        cap
    } else if wr >= rd {
        wr - rd
    } else {
        cap - (rd - wr)
    }
}

/// SPSC circular byte buffer.
///
/// Raw byte transport between exactly two execution contexts, for example an
/// interrupt handler feeding a thread. All operations are lock-free and
/// non-blocking: writes and reads that cannot complete in full return short
/// counts instead of waiting.
///
/// Two access styles are provided:
/// - copying `write`/`read`/`peek` for convenience
/// - `writable`/`commit` and `readable`/`consume` for zero-copy access to
///   the contiguous run at each cursor, the shape DMA engines and `memcpy`
///   batching want
///
/// Concurrent use goes through [`RingBuf::split`], which hands out the
/// single producer and single consumer endpoint. The whole operation set is
/// also available directly on `&mut self` for single-context callers.
pub struct RingBuf {
    // === PRODUCER HOT ===
    /// Write cursor (written by producer, read by consumer).
    wr: CachePadded<AtomicU32>,

    // === CONSUMER HOT ===
    /// Read cursor in bits 0..31, full flag in bit 31. See the module
    /// header for why the pair shares a word.
    rdf: CachePadded<AtomicU32>,

    // === COLD STATE ===
    /// Storage size in bytes, fixed at construction.
    cap: u32,

    /// The byte storage. Boxed slice because the size never changes after
    /// construction; per-byte `UnsafeCell` because the producer writes
    /// through a shared reference while the consumer reads.
    storage: Box<[UnsafeCell<u8>]>,
}

// SAFETY: shared mutation of the storage is governed by the cursor protocol
// in the module header; each byte has exactly one writer at any time.
unsafe impl Send for RingBuf {}
unsafe impl Sync for RingBuf {}

impl RingBuf {
    /// Largest supported capacity in bytes. One bit of the consumer word
    /// holds the full flag, leaving 31 bits of cursor range.
    pub const MAX_CAPACITY: usize = (FULL_BIT - 1) as usize;

    /// Creates a ring with internally allocated, zeroed storage.
    ///
    /// # Errors
    ///
    /// `InitError::ZeroSize` for `size == 0`, `InitError::TooLarge` above
    /// [`RingBuf::MAX_CAPACITY`].
    pub fn new(size: usize) -> Result<Self, InitError> {
        Self::check_size(size)?;
        Self::from_storage(vec![0u8; size].into_boxed_slice())
    }

    /// Creates a ring over caller-allocated storage, taking ownership.
    ///
    /// The ring capacity is exactly `storage.len()`. Existing content is
    /// treated as garbage: the ring starts empty.
    pub fn from_storage(storage: Box<[u8]>) -> Result<Self, InitError> {
        Self::check_size(storage.len())?;
        let cap = storage.len() as u32;

        // SAFETY: UnsafeCell<u8> is repr(transparent) over u8, so the slice
        // layouts match and the allocation can be adopted as-is.
        let cells = unsafe {
            Box::from_raw(Box::into_raw(storage) as *mut [UnsafeCell<u8>])
        };

        Ok(Self {
            wr: CachePadded::new(AtomicU32::new(0)),
            rdf: CachePadded::new(AtomicU32::new(0)),
            cap,
            storage: cells,
        })
    }

    fn check_size(size: usize) -> Result<(), InitError> {
        if size == 0 {
            return Err(InitError::ZeroSize);
        }
        if size > Self::MAX_CAPACITY {
            return Err(InitError::TooLarge {
                requested: size,
                max: Self::MAX_CAPACITY,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // QUERIES
    // ---------------------------------------------------------------------

    /// Storage size in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap as usize
    }

    /// Bytes currently queued. A consistent snapshot; under concurrent use
    /// the value is momentarily stale in the conservative direction for
    /// whichever side reads it.
    #[inline]
    pub fn len(&self) -> usize {
        let (rd, full) = unpack(self.rdf.load(Ordering::Relaxed));
        let wr = self.wr.load(Ordering::Relaxed);
        occupied(self.cap, wr, rd, full) as usize
    }

    /// Bytes that can still be written.
    #[inline]
    pub fn space(&self) -> usize {
        self.capacity() - self.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff every byte of storage is queued. This reports the full flag
    /// itself, not a derived value.
    #[inline]
    pub fn is_full(&self) -> bool {
        unpack(self.rdf.load(Ordering::Relaxed)).1
    }

    // ---------------------------------------------------------------------
    // SINGLE-CONTEXT SURFACE
    // ---------------------------------------------------------------------

    /// The contiguous run that can be written next, starting at the write
    /// cursor: `min(space, capacity - write_cursor)` bytes. Cursors do not
    /// move; call [`RingBuf::commit`] with the number of bytes actually
    /// filled in. The borrow ends at the `commit` call, so the slice cannot
    /// be touched after the cursor has moved past it.
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        // SAFETY: &mut self guarantees no other access to the ring.
        unsafe { self.writable_slice() }
    }

    /// Publishes `appended` bytes previously written into [`RingBuf::writable`].
    ///
    /// # Panics
    ///
    /// If `appended` exceeds the current writable run. That is a calling
    /// discipline violation, not a recoverable condition.
    #[inline]
    pub fn commit(&mut self, appended: usize) {
        self.commit_internal(appended);
    }

    /// Copies as much of `src` as fits; returns the number of bytes taken.
    #[inline]
    pub fn write(&mut self, src: &[u8]) -> usize {
        self.write_internal(src)
    }

    /// The contiguous run that can be read next, starting at the read
    /// cursor: `min(len, capacity - read_cursor)` bytes. Call
    /// [`RingBuf::consume`] to release them.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        self.readable_slice()
    }

    /// Releases `taken` bytes previously obtained from [`RingBuf::readable`].
    ///
    /// # Panics
    ///
    /// If `taken` exceeds the current readable run.
    #[inline]
    pub fn consume(&mut self, taken: usize) {
        self.consume_internal(taken);
    }

    /// Copies up to `dst.len()` queued bytes out; returns the actual count.
    #[inline]
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.read_internal(dst)
    }

    /// Like `read` but leaves the queued bytes in place.
    #[inline]
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        self.peek_internal(dst)
    }

    /// Discards all queued bytes and rewinds both cursors. Storage is not
    /// zeroed. Exclusive access means no endpoint handle can exist, so no
    /// synchronization is needed.
    pub fn reset(&mut self) {
        *self.wr.get_mut() = 0;
        *self.rdf.get_mut() = 0;
    }

    /// Splits the ring into its two SPSC endpoints.
    ///
    /// The ring itself is inaccessible while the handles live, and neither
    /// handle is Clone, so exactly one producer and one consumer exist.
    pub fn split(&mut self) -> (RingProducer<'_>, RingConsumer<'_>) {
        let ring = &*self;
        (RingProducer { ring }, RingConsumer { ring })
    }

    // ---------------------------------------------------------------------
    // SHARED CORE (called from both the &mut surface and the endpoints)
    // ---------------------------------------------------------------------

    /// Raw pointer to the byte at `at`.
    #[inline]
    fn slot(&self, at: u32) -> *mut u8 {
        debug_assert_cursor_bounds!("slot", at, self.cap);
        // SAFETY: `at` is within the allocation (checked above in debug).
        unsafe { UnsafeCell::raw_get(self.storage.as_ptr().add(at as usize)) }
    }

    /// Producer view: write cursor and the length of the writable run.
    #[inline]
    fn producer_run(&self) -> (u32, usize) {
        let wr = self.wr.load(Ordering::Relaxed);
        let (rd, full) = unpack(self.rdf.load(Ordering::Acquire));
        debug_assert_cursor_bounds!("write", wr, self.cap);
        debug_assert_cursor_bounds!("read", rd, self.cap);
        debug_assert_full_state!(full, wr, rd);
        let space = self.cap - occupied(self.cap, wr, rd, full);
        (wr, space.min(self.cap - wr) as usize)
    }

    /// Consumer view: read cursor and the length of the readable run.
    /// `rdf` is loaded before `wr`; the module header explains why the
    /// order matters.
    #[inline]
    fn consumer_run(&self) -> (u32, usize) {
        let (rd, full) = unpack(self.rdf.load(Ordering::Acquire));
        let wr = self.wr.load(Ordering::Acquire);
        debug_assert_cursor_bounds!("read", rd, self.cap);
        debug_assert_full_state!(full, wr, rd);
        let len = occupied(self.cap, wr, rd, full);
        (rd, len.min(self.cap - rd) as usize)
    }

    /// The writable run as a mutable slice.
    ///
    /// # Safety
    ///
    /// The caller must be the unique producer. The slice covers bytes the
    /// consumer never touches (outside the readable region), so handing it
    /// out mutably under a shared ring reference is sound.
    unsafe fn writable_slice(&self) -> &mut [u8] {
        let (wr, run) = self.producer_run();
        unsafe { slice::from_raw_parts_mut(self.slot(wr), run) }
    }

    fn readable_slice(&self) -> &[u8] {
        let (rd, run) = self.consumer_run();
        // SAFETY: [rd, rd + run) was published by the producer before the
        // cursor/flag update our Acquire loads observed.
        unsafe { slice::from_raw_parts(self.slot(rd), run) }
    }

    fn commit_internal(&self, appended: usize) {
        let (wr, run) = self.producer_run();
        assert!(
            appended <= run,
            "commit of {appended} bytes exceeds the writable run of {run}"
        );
        if appended == 0 {
            return;
        }

        let mut wr2 = wr + appended as u32;
        if wr2 == self.cap {
            wr2 = 0;
        }
        debug_assert_cursor_bounds!("write", wr2, self.cap);

        // Publish the payload, then raise the flag against whatever read
        // cursor is current. Order matters: a consumer that observes the
        // raised flag must also observe the new write cursor.
        self.wr.store(wr2, Ordering::Release);
        let mut word = self.rdf.load(Ordering::Acquire);
        loop {
            let (rd, _) = unpack(word);
            match self.rdf.compare_exchange_weak(
                word,
                pack(rd, wr2 == rd),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => word = actual,
            }
        }
    }

    fn consume_internal(&self, taken: usize) {
        let (rd, run) = self.consumer_run();
        assert!(
            taken <= run,
            "consume of {taken} bytes exceeds the readable run of {run}"
        );
        if taken == 0 {
            return;
        }

        let mut rd2 = rd + taken as u32;
        if rd2 == self.cap {
            rd2 = 0;
        }
        debug_assert_cursor_bounds!("read", rd2, self.cap);

        // Advance the cursor and clear the flag in one step. The release
        // half of the CAS keeps our payload reads ordered before the
        // producer's view of the freed space.
        let mut word = self.rdf.load(Ordering::Relaxed);
        loop {
            match self.rdf.compare_exchange_weak(
                word,
                pack(rd2, false),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => word = actual,
            }
        }
    }

    fn write_internal(&self, src: &[u8]) -> usize {
        let mut written = 0;
        while written < src.len() {
            let (wr, run) = self.producer_run();
            if run == 0 {
                break;
            }
            let n = run.min(src.len() - written);
            // SAFETY: [wr, wr + n) is inside the writable region; src range
            // is in bounds by construction.
            unsafe {
                ptr::copy_nonoverlapping(src.as_ptr().add(written), self.slot(wr), n);
            }
            self.commit_internal(n);
            written += n;
        }
        written
    }

    fn read_internal(&self, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let (rd, run) = self.consumer_run();
            if run == 0 {
                break;
            }
            let n = run.min(dst.len() - copied);
            // SAFETY: [rd, rd + n) is published payload; dst range is in
            // bounds by construction.
            unsafe {
                ptr::copy_nonoverlapping(self.slot(rd), dst.as_mut_ptr().add(copied), n);
            }
            self.consume_internal(n);
            copied += n;
        }
        copied
    }

    fn peek_internal(&self, dst: &mut [u8]) -> usize {
        let (rd, full) = unpack(self.rdf.load(Ordering::Acquire));
        let wr = self.wr.load(Ordering::Acquire);
        debug_assert_full_state!(full, wr, rd);
        let mut avail = occupied(self.cap, wr, rd, full) as usize;

        // Walk a local cursor instead of touching the shared one, so the
        // producer never observes a transiently rewound read cursor.
        let mut pos = rd;
        let mut copied = 0;
        while copied < dst.len() && avail > 0 {
            let run = avail.min((self.cap - pos) as usize);
            let n = run.min(dst.len() - copied);
            // SAFETY: [pos, pos + n) stays inside the published region.
            unsafe {
                ptr::copy_nonoverlapping(self.slot(pos), dst.as_mut_ptr().add(copied), n);
            }
            pos += n as u32;
            if pos == self.cap {
                pos = 0;
            }
            copied += n;
            avail -= n;
        }
        copied
    }
}

impl std::fmt::Debug for RingBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (rd, full) = unpack(self.rdf.load(Ordering::Relaxed));
        f.debug_struct("RingBuf")
            .field("capacity", &self.cap)
            .field("write", &self.wr.load(Ordering::Relaxed))
            .field("read", &rd)
            .field("full", &full)
            .finish_non_exhaustive()
    }
}

/// Producer endpoint of a [`RingBuf`].
///
/// `RingProducer` intentionally does NOT implement Clone: the protocol
/// admits exactly one writing context, and the type system holds callers to
/// it. The handle is Send, so the writing context may be another thread.
pub struct RingProducer<'a> {
    ring: &'a RingBuf,
}

impl RingProducer<'_> {
    /// See [`RingBuf::writable`].
    #[inline]
    pub fn writable(&mut self) -> &mut [u8] {
        // SAFETY: this is the unique producer handle and it is borrowed
        // mutably for the lifetime of the slice.
        unsafe { self.ring.writable_slice() }
    }

    /// See [`RingBuf::commit`].
    ///
    /// # Panics
    ///
    /// If `appended` exceeds the current writable run.
    #[inline]
    pub fn commit(&mut self, appended: usize) {
        self.ring.commit_internal(appended);
    }

    /// See [`RingBuf::write`].
    #[inline]
    pub fn write(&mut self, src: &[u8]) -> usize {
        self.ring.write_internal(src)
    }

    /// Free bytes from the producer's point of view (never an overestimate).
    #[inline]
    pub fn space(&self) -> usize {
        let wr = self.ring.wr.load(Ordering::Relaxed);
        let (rd, full) = unpack(self.ring.rdf.load(Ordering::Acquire));
        (self.ring.cap - occupied(self.ring.cap, wr, rd, full)) as usize
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.space() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl std::fmt::Debug for RingProducer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingProducer")
            .field("space", &self.space())
            .finish_non_exhaustive()
    }
}

/// Consumer endpoint of a [`RingBuf`].
///
/// Not Clone for the same reason [`RingProducer`] is not.
pub struct RingConsumer<'a> {
    ring: &'a RingBuf,
}

impl RingConsumer<'_> {
    /// See [`RingBuf::readable`].
    #[inline]
    pub fn readable(&self) -> &[u8] {
        self.ring.readable_slice()
    }

    /// See [`RingBuf::consume`].
    ///
    /// # Panics
    ///
    /// If `taken` exceeds the current readable run.
    #[inline]
    pub fn consume(&mut self, taken: usize) {
        self.ring.consume_internal(taken);
    }

    /// See [`RingBuf::read`].
    #[inline]
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.ring.read_internal(dst)
    }

    /// See [`RingBuf::peek`].
    #[inline]
    pub fn peek(&self, dst: &mut [u8]) -> usize {
        self.ring.peek_internal(dst)
    }

    /// Queued bytes from the consumer's point of view (never an
    /// overestimate).
    #[inline]
    pub fn len(&self) -> usize {
        let (rd, full) = unpack(self.ring.rdf.load(Ordering::Acquire));
        let wr = self.ring.wr.load(Ordering::Acquire);
        occupied(self.ring.cap, wr, rd, full) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl std::fmt::Debug for RingConsumer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingConsumer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
