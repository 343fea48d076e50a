//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Every unsafe path in the crate is exercised here with small buffers:
//! raw-pointer slot access, claimed-run slices, the reinterpreted storage
//! of `from_storage`, the in-region packet header, and the `attach` alias
//! of an initialized region. Two tiny threaded tests let Miri's data-race
//! detector see the cross-thread protocols as well.

use spscbuf::{ItemFifo, PacketBuf, PacketError, RingBuf, HEADER_LEN};
use std::slice;
use std::thread;

/// Aligned backing for a packet region.
fn words(len: usize) -> Vec<u32> {
    vec![0u32; len.div_ceil(4)]
}

fn region(backing: &mut [u32], len: usize) -> &mut [u8] {
    assert!(len <= backing.len() * 4);
    // SAFETY: u32 storage reinterpreted as bytes.
    unsafe { slice::from_raw_parts_mut(backing.as_mut_ptr().cast::<u8>(), len) }
}

/// Copying surface over a wrapping cursor.
#[test]
fn miri_ring_write_read_wrap() {
    let mut rb = RingBuf::new(5).unwrap();
    let mut out = [0u8; 8];

    for round in 0..4u8 {
        let chunk = [round, round + 10, round + 20];
        assert_eq!(rb.write(&chunk), 3);
        assert_eq!(rb.read(&mut out), 3);
        assert_eq!(&out[..3], &chunk);
    }
    assert!(rb.is_empty());
}

/// Claimed-run slices across the wrap boundary.
#[test]
fn miri_ring_claim_commit_consume() {
    let mut rb = RingBuf::new(4).unwrap();

    // Park the cursors at 2 so the next claim stops at the physical end.
    rb.write(&[0, 0]);
    let mut sink = [0u8; 2];
    rb.read(&mut sink);

    let run = rb.writable();
    assert_eq!(run.len(), 2);
    run[0] = 5;
    run[1] = 6;
    rb.commit(2);

    // Second claim wraps to the front.
    let run = rb.writable();
    assert_eq!(run.len(), 2);
    run[0] = 7;
    rb.commit(1);

    assert_eq!(rb.readable(), &[5, 6]);
    rb.consume(2);
    assert_eq!(rb.readable(), &[7]);
    rb.consume(1);
    assert!(rb.is_empty());
}

/// Peek walks published bytes without moving the cursor.
#[test]
fn miri_ring_peek() {
    let mut rb = RingBuf::new(4).unwrap();
    rb.write(&[1, 2, 3]);

    let mut peeked = [0u8; 4];
    assert_eq!(rb.peek(&mut peeked), 3);
    assert_eq!(&peeked[..3], &[1, 2, 3]);
    assert_eq!(rb.len(), 3);
}

/// Caller-provided storage is reinterpreted in place.
#[test]
fn miri_ring_from_storage() {
    let storage = vec![0u8; 6].into_boxed_slice();
    let mut rb = RingBuf::from_storage(storage).unwrap();

    assert_eq!(rb.write(&[9; 6]), 6);
    assert!(rb.is_full());
    rb.reset();
    assert!(rb.is_empty());
    assert_eq!(rb.write(&[3; 2]), 2);
    let mut out = [0u8; 2];
    assert_eq!(rb.read(&mut out), 2);
    assert_eq!(out, [3, 3]);
}

/// Split endpoints share the ring without aliasing violations.
#[test]
fn miri_ring_split_endpoints() {
    let mut rb = RingBuf::new(4).unwrap();
    let (mut tx, mut rx) = rb.split();

    assert_eq!(tx.write(&[1, 2, 3]), 3);
    assert_eq!(rx.readable(), &[1, 2, 3]);
    rx.consume(2);
    assert_eq!(tx.write(&[4, 5]), 2);

    let mut out = [0u8; 4];
    assert_eq!(rx.read(&mut out), 3);
    assert_eq!(&out[..3], &[3, 4, 5]);
}

/// Item queue over the ring, wrapping several times.
#[test]
fn miri_fifo_put_get() {
    let mut fifo = ItemFifo::new(3, 2).unwrap();
    let mut out = [0u8; 3];

    for round in 0..3u8 {
        assert!(fifo.put(&[round, round, round]).is_ok());
        assert!(fifo.put(&[9, 9, round]).is_ok());
        assert!(fifo.is_full());

        assert!(fifo.get(&mut out).is_ok());
        assert_eq!(out, [round, round, round]);
        assert!(fifo.peek(&mut out).is_ok());
        assert_eq!(out, [9, 9, round]);
        assert!(fifo.get(&mut out).is_ok());
    }
    assert!(fifo.is_empty());
}

/// Packet header and frames live inside the shared region.
#[test]
fn miri_packet_write_read() {
    let mut backing = words(40);
    let mut pb = PacketBuf::init(region(&mut backing, 40), 0).unwrap();
    let mut out = [0u8; 24];

    pb.write(&[1, 2, 3]).unwrap();
    pb.write(&[4]).unwrap();
    assert_eq!(pb.peek_len(), Some(3));
    assert_eq!(pb.read(&mut out).unwrap(), 3);
    assert_eq!(&out[..3], &[1, 2, 3]);
    assert_eq!(pb.read(&mut out).unwrap(), 1);
    assert_eq!(out[0], 4);
    assert_eq!(pb.read(&mut out), Err(PacketError::Empty));
}

/// The dead-tail marker path: write, wrap, read through the marker.
#[test]
fn miri_packet_wrap_marker() {
    let mut backing = words(HEADER_LEN + 16);
    let mut pb = PacketBuf::init(region(&mut backing, HEADER_LEN + 16), 0).unwrap();
    let mut out = [0u8; 16];

    // Advance the cursors to 12 of 16.
    pb.write(&[1; 10]).unwrap();
    assert_eq!(pb.read(&mut out).unwrap(), 10);

    // Tail of 4 cannot hold this frame: marker at 12, frame at 0.
    pb.write(&[2; 6]).unwrap();
    assert_eq!(pb.read(&mut out).unwrap(), 6);
    assert_eq!(&out[..6], &[2; 6]);
    assert!(pb.is_empty());
}

/// A slot dropped before commit publishes nothing.
#[test]
fn miri_packet_slot_drop_and_commit() {
    let mut backing = words(40);
    let mut pb = PacketBuf::init(region(&mut backing, 40), 0).unwrap();
    let (mut tx, mut rx) = pb.split();

    {
        let slot = tx.alloc(4).unwrap();
        assert_eq!(slot.len(), 4);
        // Dropped without commit.
    }
    assert!(rx.claim().is_none());

    let mut slot = tx.alloc(4).unwrap();
    slot.copy_from_slice(&[7, 8, 9, 10]);
    slot.commit(3);

    let pkt = rx.claim().unwrap();
    assert_eq!(&pkt[..], &[7, 8, 9]);
    pkt.release();
    assert!(rx.is_empty());
}

/// `attach` aliases an initialized region through a raw pointer. The
/// region is seeded once, then both endpoints run over the same memory.
#[test]
fn miri_packet_attach_alias() {
    let mut backing = words(48);
    let total = 48;

    {
        let seed = region(&mut backing, total);
        PacketBuf::init(seed, 0x11).unwrap();
    }

    let base = backing.as_mut_ptr().cast::<u8>();
    // SAFETY: `base` covers `total` bytes of live, aligned, initialized
    // storage; one endpoint only writes, the other only reads.
    let mut writer = unsafe { PacketBuf::attach(base, total) }.unwrap();
    // SAFETY: as above.
    let mut reader = unsafe { PacketBuf::attach(base, total) }.unwrap();
    assert_eq!(reader.flags(), 0x11);
    assert_eq!(reader.capacity(), total - HEADER_LEN);

    let mut out = [0u8; 16];
    for seq in 0..12u8 {
        writer.write(&[seq; 5]).unwrap();
        assert_eq!(reader.read(&mut out).unwrap(), 5);
        assert_eq!(&out[..5], &[seq; 5]);
    }
}

/// Tiny cross-thread run so Miri's race detector sees the ring protocol.
#[test]
fn miri_ring_two_threads() {
    const TOTAL: usize = 200;

    let mut rb = RingBuf::new(16).unwrap();
    let (mut tx, mut rx) = rb.split();

    thread::scope(|s| {
        s.spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                let chunk = [(sent % 251) as u8; 1];
                if tx.write(&chunk) == 1 {
                    sent += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        s.spawn(move || {
            let mut seen = 0usize;
            let mut out = [0u8; 4];
            while seen < TOTAL {
                let n = rx.read(&mut out);
                if n == 0 {
                    thread::yield_now();
                    continue;
                }
                for &b in &out[..n] {
                    assert_eq!(b, (seen % 251) as u8);
                    seen += 1;
                }
            }
        });
    });
}

/// Tiny cross-thread run over the packet protocol, wrap marker included.
#[test]
fn miri_packet_two_threads() {
    const MESSAGES: u8 = 30;

    let mut backing = words(HEADER_LEN + 16);
    let mut pb = PacketBuf::init(region(&mut backing, HEADER_LEN + 16), 0).unwrap();
    let (mut tx, mut rx) = pb.split();

    thread::scope(|s| {
        s.spawn(move || {
            for seq in 0..MESSAGES {
                let payload = [seq, seq.wrapping_mul(3)];
                loop {
                    match tx.write(&payload) {
                        Ok(()) => break,
                        Err(PacketError::NoSpace { .. }) => thread::yield_now(),
                        Err(other) => panic!("unexpected write error: {other}"),
                    }
                }
            }
        });

        s.spawn(move || {
            let mut out = [0u8; 8];
            for seq in 0..MESSAGES {
                let n = loop {
                    match rx.read(&mut out) {
                        Ok(n) => break n,
                        Err(PacketError::Empty) => thread::yield_now(),
                        Err(other) => panic!("unexpected read error: {other}"),
                    }
                };
                assert_eq!(n, 2);
                assert_eq!(out[..2], [seq, seq.wrapping_mul(3)]);
            }
        });
    });
}
