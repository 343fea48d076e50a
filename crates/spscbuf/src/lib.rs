//! spscbuf - Lock-Free SPSC Circular Buffers
//!
//! Three cooperating primitives for moving data between exactly two
//! uncoordinated execution contexts (an interrupt handler and a thread, or
//! two CPU cores over shared memory) without locks:
//!
//! - [`RingBuf`]: circular byte store with zero-copy contiguous-run access,
//!   the shape DMA transfers want
//! - [`ItemFifo`]: queue of fixed-size records layered on the byte ring
//! - [`PacketBuf`]: variable-length message buffer whose in-memory layout is
//!   the wire contract, placeable in memory shared between cores
//!
//! # Key Properties
//!
//! - No operation blocks: what cannot complete returns a short count or an
//!   error immediately, and retry policy stays with the caller
//! - `split()` yields the one producer and one consumer endpoint; endpoints
//!   are Send but not Clone, so the SPSC discipline is type-checked
//! - Zero-copy claim APIs bound their borrows to the commit call, so
//!   touching a claimed region after its cursor moved does not compile
//! - Full/empty disambiguation by explicit flag, not by an occupancy
//!   counter, with the flag packed into the consumer's cursor word
//!
//! # Example
//!
//! ```
//! use spscbuf::{ItemFifo, RingBuf};
//!
//! // Byte stream, for example UART receive data drained by a thread.
//! let mut ring = RingBuf::new(64).unwrap();
//! assert_eq!(ring.write(b"telemetry"), 9);
//! let mut out = [0u8; 9];
//! assert_eq!(ring.read(&mut out), 9);
//! assert_eq!(&out, b"telemetry");
//!
//! // Fixed-size event records.
//! let mut events = ItemFifo::new(4, 8).unwrap();
//! events.put(&[1, 2, 3, 4]).unwrap();
//! let mut event = [0u8; 4];
//! events.get(&mut event).unwrap();
//! assert_eq!(event, [1, 2, 3, 4]);
//! ```

mod error;
mod fifo;
mod invariants;
mod pbuf;
mod ring;

pub use error::{FifoError, InitError, PacketError};
pub use fifo::{FifoConsumer, FifoProducer, ItemFifo};
pub use pbuf::{
    capacity_of, Packet, PacketBuf, PacketReader, PacketSlot, PacketWriter, HEADER_LEN,
    MAX_PAYLOAD, MIN_REGION_LEN, PREFIX_LEN,
};
pub use ring::{RingBuf, RingConsumer, RingProducer};
