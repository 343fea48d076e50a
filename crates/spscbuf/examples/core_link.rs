//! Message link over a shared region in the shape of an inter-core
//! mailbox: the region is seeded once, then each side attaches its own
//! endpoint and exchanges length-prefixed messages through it.
//!
//! Run with: `cargo run --release --example core_link`

use spscbuf::{PacketBuf, PacketError};
use std::slice;
use std::thread;
use std::time::Instant;

const REGION_WORDS: usize = 1024; // 4 KiB shared region
const MESSAGES: u32 = 500_000;

fn main() {
    println!("spscbuf Core Link Example");
    println!("=========================\n");

    // Stands in for a reserved SRAM window both sides agree on.
    let mut backing = vec![0u32; REGION_WORDS];
    let total = REGION_WORDS * 4;

    // Whoever boots first lays down the header.
    {
        // SAFETY: u32 storage reinterpreted as bytes.
        let region =
            unsafe { slice::from_raw_parts_mut(backing.as_mut_ptr().cast::<u8>(), total) };
        PacketBuf::init(region, 0x4C4B).unwrap();
    }

    let base = backing.as_mut_ptr().cast::<u8>();
    // SAFETY: `base` covers `total` bytes of live, aligned, initialized
    // storage; the two endpoints below are the only writer and reader.
    let mut local = unsafe { PacketBuf::attach(base, total) }.unwrap();
    // SAFETY: as above.
    let mut remote = unsafe { PacketBuf::attach(base, total) }.unwrap();

    println!("Configuration:");
    println!("  Region: {} bytes", total);
    println!("  Usable capacity: {} bytes", local.capacity());
    println!("  Protocol flags: {:#06x}", local.flags());
    println!("  Messages: {}\n", MESSAGES);

    let start = Instant::now();

    let bytes_moved = thread::scope(|s| {
        // Remote core: reads commands, validates the sequence numbers.
        let reader = s.spawn(move || {
            let mut out = [0u8; 64];
            let mut bytes = 0usize;
            for seq in 0..MESSAGES {
                let n = loop {
                    match remote.read(&mut out) {
                        Ok(n) => break n,
                        Err(PacketError::Empty) => thread::yield_now(),
                        Err(e) => panic!("link read failed: {e}"),
                    }
                };
                let got = u32::from_le_bytes([out[0], out[1], out[2], out[3]]);
                assert_eq!(got, seq, "command out of order");
                bytes += n;
            }
            bytes
        });

        // Local core: sends commands with a sequence number and a body
        // whose length cycles through the frame sizes.
        s.spawn(move || {
            for seq in 0..MESSAGES {
                let body_len = (seq as usize % 28) + 4;
                let mut msg = [0u8; 32];
                msg[..4].copy_from_slice(&seq.to_le_bytes());
                for b in &mut msg[4..body_len] {
                    *b = (seq % 251) as u8;
                }
                loop {
                    match local.write(&msg[..body_len]) {
                        Ok(()) => break,
                        Err(PacketError::NoSpace { .. }) => thread::yield_now(),
                        Err(e) => panic!("link write failed: {e}"),
                    }
                }
            }
        });

        reader.join().unwrap()
    });

    let duration = start.elapsed();
    let msgs_per_sec = f64::from(MESSAGES) / duration.as_secs_f64();

    println!("Results:");
    println!("  Messages delivered: {}", MESSAGES);
    println!("  Payload bytes: {}", bytes_moved);
    println!("  Duration: {:.2?}", duration);
    println!(
        "  Throughput: {:.2} million msgs/sec",
        msgs_per_sec / 1_000_000.0
    );
}
