//! Offset arithmetic for a byte ring addressed by logical counters.
//!
//! Counters never index the buffer directly. A logical offset maps to a
//! physical position with `offset % capacity`, and every frame must sit
//! inside a single *cycle* (one pass over the buffer). A side that cannot
//! place or find a whole frame before the end of the buffer moves its counter
//! to the start of the next cycle instead of splitting the frame.
//!
//! # Counter modulus
//!
//! Counters are stored as `u32` and wrap. If the capacity divides `2^32` the
//! wrap is plain wrapping arithmetic. Otherwise the physical position would
//! jump at the wrap point, so counters instead wrap at the largest multiple
//! of the capacity that fits in `u32` (the *modulus*). The wrap point is
//! then always a cycle boundary and `head - tail` stays meaningful.
//!
//! ```text
//! capacity = 1000, modulus = 4_294_967_000
//!
//! offset 4_294_966_500 → pos 500
//! next_cycle(4_294_966_500) = 0        (not 4_294_967_000)
//! used(head = 40, tail = 4_294_966_900) = 140
//! ```

/// Geometry of one ring. Cheap to copy; both halves of a direction compute
/// positions with the same values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    capacity: u32,
    modulus: u64,
}

impl RingGeometry {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let cap = capacity as u64;
        let modulus = (1u64 << 32) / cap * cap;
        Self { capacity, modulus }
    }

    #[inline(always)]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Value at which counters wrap back to zero.
    #[inline(always)]
    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// Physical position of a logical offset.
    #[inline(always)]
    pub fn pos(&self, offset: u32) -> u32 {
        offset % self.capacity
    }

    /// Whether `len` contiguous bytes starting at `offset` stay inside the
    /// current cycle.
    #[inline(always)]
    pub fn fits(&self, offset: u32, len: u32) -> bool {
        self.pos(offset) as u64 + len as u64 <= self.capacity as u64
    }

    /// Bytes between `offset` and the end of its cycle.
    #[inline(always)]
    pub fn remaining_in_cycle(&self, offset: u32) -> u32 {
        self.capacity - self.pos(offset)
    }

    /// Logical offset of the start of the cycle after the one holding `offset`.
    #[inline(always)]
    pub fn next_cycle(&self, offset: u32) -> u32 {
        self.advance(offset, self.remaining_in_cycle(offset))
    }

    /// `offset + n`, wrapped at the modulus.
    #[inline(always)]
    pub fn advance(&self, offset: u32, n: u32) -> u32 {
        ((offset as u64 + n as u64) % self.modulus) as u32
    }

    /// Bytes published but not yet consumed, `head - tail` wrapped at the
    /// modulus.
    #[inline(always)]
    pub fn used(&self, head: u32, tail: u32) -> u32 {
        ((head as u64 + self.modulus - tail as u64 % self.modulus) % self.modulus) as u32
    }
}
