//! Byte-stream pump in the shape of a serial driver: an interrupt-style
//! producer deposits receive bursts straight into claimed ring space, a
//! driver task drains whatever is contiguous.
//!
//! Run with: `cargo run --release --example uart_pump`

use spscbuf::RingBuf;
use std::thread;
use std::time::Instant;

const RING_SIZE: usize = 4096;
const TOTAL_BYTES: usize = 8 * 1024 * 1024;
const BURST: usize = 64; // hardware FIFO depth

fn main() {
    println!("spscbuf UART Pump Example");
    println!("=========================\n");

    println!("Configuration:");
    println!("  Ring size: {} bytes", RING_SIZE);
    println!("  Burst size: {} bytes", BURST);
    println!("  Total transfer: {} MiB\n", TOTAL_BYTES / (1024 * 1024));

    let mut rb = RingBuf::new(RING_SIZE).unwrap();
    let (mut tx, mut rx) = rb.split();

    let start = Instant::now();

    let (sent_sum, seen_sum) = thread::scope(|s| {
        // "ISR" side: claim contiguous space, fill it like a peripheral
        // FIFO drain would, commit. No staging buffer in between.
        let producer = s.spawn(move || {
            let mut sent = 0usize;
            let mut checksum = 0u64;
            while sent < TOTAL_BYTES {
                let run = tx.writable();
                if run.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let n = run.len().min(BURST).min(TOTAL_BYTES - sent);
                for (i, slot) in run[..n].iter_mut().enumerate() {
                    let byte = ((sent + i) % 251) as u8;
                    *slot = byte;
                    checksum = checksum.wrapping_add(u64::from(byte));
                }
                tx.commit(n);
                sent += n;
            }
            checksum
        });

        // Driver side: consume whatever is contiguous, checksum in place.
        let consumer = s.spawn(move || {
            let mut seen = 0usize;
            let mut checksum = 0u64;
            while seen < TOTAL_BYTES {
                let run = rx.readable();
                if run.is_empty() {
                    thread::yield_now();
                    continue;
                }
                let n = run.len();
                for &byte in &run[..n] {
                    checksum = checksum.wrapping_add(u64::from(byte));
                }
                rx.consume(n);
                seen += n;
            }
            checksum
        });

        (producer.join().unwrap(), consumer.join().unwrap())
    });

    let duration = start.elapsed();
    assert_eq!(sent_sum, seen_sum, "stream corrupted in transit");

    let bytes_per_sec = TOTAL_BYTES as f64 / duration.as_secs_f64();
    println!("Results:");
    println!("  Bytes moved: {}", TOTAL_BYTES);
    println!("  Checksum: {:#x} (both sides agree)", seen_sum);
    println!("  Duration: {:.2?}", duration);
    println!("  Throughput: {:.2} MB/sec", bytes_per_sec / 1_000_000.0);
}
