//! Two-thread stress tests: one producer, one consumer, real concurrency.
//!
//! Every test moves a deterministic data stream across a small buffer so
//! that the cursors wrap many times, and verifies order and integrity on
//! the consuming side. Retry policy is spin-and-yield, as the non-blocking
//! API intends.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spscbuf::{ItemFifo, PacketBuf, PacketError, RingBuf};
use std::slice;
use std::thread;

/// Deterministic byte pattern for stream positions.
fn byte_at(pos: usize) -> u8 {
    ((pos * 31 + 7) % 251) as u8
}

#[test]
fn ring_stream_survives_thousands_of_wraps() {
    const TOTAL: usize = 256 * 1024;

    // Prime-sized ring so chunk boundaries drift over the wrap point.
    let mut rb = RingBuf::new(997).unwrap();
    let (mut tx, mut rx) = rb.split();

    thread::scope(|s| {
        s.spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                let want = (TOTAL - sent).min(sent % 97 + 1);
                let chunk: Vec<u8> = (sent..sent + want).map(byte_at).collect();
                let n = tx.write(&chunk);
                if n == 0 {
                    thread::yield_now();
                }
                sent += n;
            }
        });

        s.spawn(move || {
            let mut seen = 0usize;
            let mut buf = [0u8; 64];
            while seen < TOTAL {
                let n = rx.read(&mut buf);
                if n == 0 {
                    thread::yield_now();
                    continue;
                }
                for &b in &buf[..n] {
                    assert_eq!(b, byte_at(seen), "corrupt byte at stream offset {seen}");
                    seen += 1;
                }
            }
        });
    });
}

#[test]
fn ring_claim_paths_survive_concurrency() {
    const TOTAL: usize = 128 * 1024;

    let mut rb = RingBuf::new(509).unwrap();
    let (mut tx, mut rx) = rb.split();

    thread::scope(|s| {
        s.spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                let run = tx.writable();
                if run.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let n = run.len().min(TOTAL - sent).min(128);
                for (i, slot) in run[..n].iter_mut().enumerate() {
                    *slot = byte_at(sent + i);
                }
                tx.commit(n);
                sent += n;
            }
        });

        s.spawn(move || {
            let mut seen = 0usize;
            while seen < TOTAL {
                let run = rx.readable();
                if run.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let n = run.len().min(100);
                for (i, &b) in run[..n].iter().enumerate() {
                    assert_eq!(b, byte_at(seen + i), "corrupt byte at offset {}", seen + i);
                }
                rx.consume(n);
                seen += n;
            }
        });
    });
}

#[test]
fn fifo_records_arrive_whole_and_in_order() {
    const RECORDS: u64 = 20_000;
    const ITEM: usize = 16;

    let mut fifo = ItemFifo::new(ITEM, 64).unwrap();
    let (mut tx, mut rx) = fifo.split();

    thread::scope(|s| {
        s.spawn(move || {
            for seq in 0..RECORDS {
                let mut item = [0u8; ITEM];
                item[..8].copy_from_slice(&seq.to_le_bytes());
                item[8..].fill((seq % 251) as u8);
                while tx.put(&item).is_err() {
                    thread::yield_now();
                }
            }
        });

        s.spawn(move || {
            let mut item = [0u8; ITEM];
            for seq in 0..RECORDS {
                while rx.get(&mut item).is_err() {
                    thread::yield_now();
                }
                let got = u64::from_le_bytes(item[..8].try_into().unwrap());
                assert_eq!(got, seq, "record out of order");
                assert!(
                    item[8..].iter().all(|&b| b == (seq % 251) as u8),
                    "record {seq} torn"
                );
            }
        });
    });
}

#[test]
fn packet_stream_replays_exactly() {
    const MESSAGES: u32 = 10_000;

    let mut words = vec![0u32; 256]; // 1024 byte region
    // SAFETY: u32 storage reinterpreted as bytes.
    let region =
        unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), words.len() * 4) };
    let mut pb = PacketBuf::init(region, 0).unwrap();
    let (mut tx, mut rx) = pb.split();

    thread::scope(|s| {
        s.spawn(move || {
            // Writer and reader replay the same seeded generator, so the
            // reader knows every expected length and byte.
            let mut rng = StdRng::seed_from_u64(0x5eed);
            for _ in 0..MESSAGES {
                let len = rng.gen_range(1..=48usize);
                let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
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
            let mut rng = StdRng::seed_from_u64(0x5eed);
            let mut out = [0u8; 64];
            for msg in 0..MESSAGES {
                let len = rng.gen_range(1..=48usize);
                let expected: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                let got = loop {
                    match rx.read(&mut out) {
                        Ok(n) => break n,
                        Err(PacketError::Empty) => thread::yield_now(),
                        Err(other) => panic!("unexpected read error: {other}"),
                    }
                };
                assert_eq!(got, len, "message {msg} has the wrong length");
                assert_eq!(&out[..got], &expected[..], "message {msg} corrupted");
            }
        });
    });
}

#[test]
fn packet_zero_copy_paths_survive_concurrency() {
    const MESSAGES: u32 = 5_000;

    let mut words = vec![0u32; 128]; // 512 byte region
    // SAFETY: u32 storage reinterpreted as bytes.
    let region =
        unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), words.len() * 4) };
    let mut pb = PacketBuf::init(region, 0).unwrap();
    let (mut tx, mut rx) = pb.split();

    thread::scope(|s| {
        s.spawn(move || {
            for msg in 0..MESSAGES {
                let len = (msg as usize % 40) + 1;
                let mut slot = loop {
                    match tx.alloc(len) {
                        Ok(slot) => break slot,
                        Err(PacketError::NoSpace { .. }) => {
                            thread::yield_now();
                            continue;
                        }
                        Err(other) => panic!("unexpected alloc error: {other}"),
                    }
                };
                for (i, b) in slot.iter_mut().enumerate() {
                    *b = ((msg as usize + i) % 251) as u8;
                }
                slot.commit(len);
            }
        });

        s.spawn(move || {
            for msg in 0..MESSAGES {
                let len = (msg as usize % 40) + 1;
                let pkt = loop {
                    match rx.claim() {
                        Some(pkt) => break pkt,
                        None => thread::yield_now(),
                    }
                };
                assert_eq!(pkt.len(), len, "message {msg} has the wrong length");
                for (i, &b) in pkt.iter().enumerate() {
                    assert_eq!(b, ((msg as usize + i) % 251) as u8, "message {msg} corrupted");
                }
                pkt.release();
            }
        });
    });
}
