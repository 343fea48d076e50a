use crate::error::{FifoError, InitError};
use crate::invariants::debug_assert_occupancy;
use crate::ring::{RingBuf, RingConsumer, RingProducer};

/// SPSC queue of fixed-size items, layered on [`RingBuf`].
///
/// Callers move whole records instead of byte streams: `put` and `get` are
/// all-or-nothing per item and report `Full`/`Empty` instead of short
/// counts. Byte offsets stay item-aligned because the backing ring is sized
/// to an exact multiple of `item_size`.
pub struct ItemFifo {
    rb: RingBuf,
    item_size: usize,
}

impl ItemFifo {
    /// Creates a queue holding up to `item_capacity` items of `item_size`
    /// bytes each.
    ///
    /// # Errors
    ///
    /// `ZeroSize` when either parameter is zero, `CapacityOverflow` when the
    /// product overflows, `TooLarge` when it exceeds [`RingBuf::MAX_CAPACITY`].
    pub fn new(item_size: usize, item_capacity: usize) -> Result<Self, InitError> {
        if item_size == 0 || item_capacity == 0 {
            return Err(InitError::ZeroSize);
        }
        let bytes = item_size
            .checked_mul(item_capacity)
            .ok_or(InitError::CapacityOverflow {
                item_size,
                item_capacity,
            })?;
        Ok(Self {
            rb: RingBuf::new(bytes)?,
            item_size,
        })
    }

    /// Size of one item in bytes.
    #[inline]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Total item slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.rb.capacity() / self.item_size
    }

    /// Complete items currently queued. Bytes of an item whose transfer is
    /// still in flight round down to zero items.
    #[inline]
    pub fn len(&self) -> usize {
        self.rb.len() / self.item_size
    }

    /// Item slots still free.
    #[inline]
    pub fn space(&self) -> usize {
        self.rb.space() / self.item_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.space() == 0
    }

    /// Enqueues one item.
    ///
    /// # Panics
    ///
    /// If `item.len() != item_size`.
    pub fn put(&mut self, item: &[u8]) -> Result<(), FifoError> {
        assert_eq!(
            item.len(),
            self.item_size,
            "item length must equal the fifo item size"
        );
        if self.rb.space() < self.item_size {
            return Err(FifoError::Full);
        }
        let written = self.rb.write(item);
        debug_assert_eq!(written, self.item_size);
        // Item-aligned cursors keep the scaled counts exact.
        debug_assert_occupancy!(self.len(), self.space(), self.capacity());
        Ok(())
    }

    /// Dequeues one item into `out[..item_size]`.
    ///
    /// # Panics
    ///
    /// If `out` is shorter than `item_size`.
    pub fn get(&mut self, out: &mut [u8]) -> Result<(), FifoError> {
        assert!(
            out.len() >= self.item_size,
            "destination must hold at least one item"
        );
        if self.rb.len() < self.item_size {
            return Err(FifoError::Empty);
        }
        let got = self.rb.read(&mut out[..self.item_size]);
        debug_assert_eq!(got, self.item_size);
        debug_assert_occupancy!(self.len(), self.space(), self.capacity());
        Ok(())
    }

    /// Copies the next item without dequeuing it.
    ///
    /// # Panics
    ///
    /// If `out` is shorter than `item_size`.
    pub fn peek(&self, out: &mut [u8]) -> Result<(), FifoError> {
        assert!(
            out.len() >= self.item_size,
            "destination must hold at least one item"
        );
        if self.rb.len() < self.item_size {
            return Err(FifoError::Empty);
        }
        let got = self.rb.peek(&mut out[..self.item_size]);
        debug_assert_eq!(got, self.item_size);
        Ok(())
    }

    /// Discards all queued items.
    pub fn reset(&mut self) {
        self.rb.reset();
    }

    /// Splits the queue into its SPSC endpoints. Same exclusivity rules as
    /// [`RingBuf::split`].
    pub fn split(&mut self) -> (FifoProducer<'_>, FifoConsumer<'_>) {
        let item_size = self.item_size;
        let (tx, rx) = self.rb.split();
        (
            FifoProducer { tx, item_size },
            FifoConsumer { rx, item_size },
        )
    }
}

impl std::fmt::Debug for ItemFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemFifo")
            .field("item_size", &self.item_size)
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// Producer endpoint of an [`ItemFifo`]. Not Clone.
pub struct FifoProducer<'a> {
    tx: RingProducer<'a>,
    item_size: usize,
}

impl FifoProducer<'_> {
    /// See [`ItemFifo::put`].
    ///
    /// # Panics
    ///
    /// If `item.len() != item_size`.
    pub fn put(&mut self, item: &[u8]) -> Result<(), FifoError> {
        assert_eq!(
            item.len(),
            self.item_size,
            "item length must equal the fifo item size"
        );
        if self.tx.space() < self.item_size {
            return Err(FifoError::Full);
        }
        // The consumer only frees space, so the whole item goes through.
        let written = self.tx.write(item);
        debug_assert_eq!(written, self.item_size);
        Ok(())
    }

    /// Free item slots from the producer's point of view.
    #[inline]
    pub fn space(&self) -> usize {
        self.tx.space() / self.item_size
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.space() == 0
    }
}

/// Consumer endpoint of an [`ItemFifo`]. Not Clone.
pub struct FifoConsumer<'a> {
    rx: RingConsumer<'a>,
    item_size: usize,
}

impl FifoConsumer<'_> {
    /// See [`ItemFifo::get`].
    ///
    /// # Panics
    ///
    /// If `out` is shorter than `item_size`.
    pub fn get(&mut self, out: &mut [u8]) -> Result<(), FifoError> {
        assert!(
            out.len() >= self.item_size,
            "destination must hold at least one item"
        );
        if self.rx.len() < self.item_size {
            return Err(FifoError::Empty);
        }
        // The producer only adds bytes, so a complete item stays complete.
        let got = self.rx.read(&mut out[..self.item_size]);
        debug_assert_eq!(got, self.item_size);
        Ok(())
    }

    /// See [`ItemFifo::peek`].
    ///
    /// # Panics
    ///
    /// If `out` is shorter than `item_size`.
    pub fn peek(&self, out: &mut [u8]) -> Result<(), FifoError> {
        assert!(
            out.len() >= self.item_size,
            "destination must hold at least one item"
        );
        if self.rx.len() < self.item_size {
            return Err(FifoError::Empty);
        }
        let got = self.rx.peek(&mut out[..self.item_size]);
        debug_assert_eq!(got, self.item_size);
        Ok(())
    }

    /// Complete items queued, from the consumer's point of view.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len() / self.item_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
