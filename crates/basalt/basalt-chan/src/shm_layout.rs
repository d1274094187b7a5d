//! Shared memory layout of a basalt channel region.
//!
//! Both peers must agree on this layout bit for bit. The peer on the other
//! side of the region is frequently not Rust, so nothing here relies on
//! Rust-specific representation beyond `#[repr(C)]` on the control block.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ ControlBlock (CONTROL_SIZE = 4096 bytes reserved)                │
//! │  ┌──────────┬──────────┬──────────┬──────────┬──────────┬─────┐  │
//! │  │ a_head   │ a_tail   │ b_head   │ b_tail   │ status   │ ... │  │
//! │  │ @0  u32  │ @4  u32  │ @8  u32  │ @12 u32  │ @16 u32  │     │  │
//! │  └──────────┴──────────┴──────────┴──────────┴──────────┴─────┘  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Buffer A: capacity B = (S - CONTROL_SIZE) / 2 bytes (host→guest) │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ Buffer B: capacity B bytes                       (guest→host)    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All counters are little-endian on the wire, whatever the host byte order.
//!
//! Counters wrap at the largest multiple of B that fits in `u32`, not at
//! 2^32. The two agree only when B is a power of two. For the default 16 MiB
//! region B is 8_386_560 and counters wrap at 4_293_918_720, 1 MiB short of
//! 2^32, so a peer that lets its counters overflow naturally will disagree
//! with this one once the counters pass that point.

use crate::error::ChannelError;
use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicU32, Ordering};

/// Bytes reserved for the control block at the start of the region.
pub const CONTROL_SIZE: usize = 0x1000;

pub const A_HEAD_OFFSET: usize = 0;
pub const A_TAIL_OFFSET: usize = 4;
pub const B_HEAD_OFFSET: usize = 8;
pub const B_TAIL_OFFSET: usize = 12;
pub const STATUS_OFFSET: usize = 16;

/// Smallest ring capacity a region may provide.
pub const MIN_CAPACITY: u32 = 64;

/// Largest ring capacity. Keeps the counter modulus at least twice the
/// capacity so that `head - tail` can never alias.
pub const MAX_CAPACITY: u32 = u32::MAX / 2;

/// One of the two independent rings in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host to guest.
    A,
    /// Guest to host.
    B,
}

impl Direction {
    #[inline]
    fn index(self) -> usize {
        match self {
            Direction::A => 0,
            Direction::B => 1,
        }
    }
}

/// Which end of the region this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Reads direction A, writes direction B.
    #[default]
    Guest,
    /// Reads direction B, writes direction A.
    Host,
}

impl Side {
    /// The direction this side consumes.
    pub fn inbound(self) -> Direction {
        match self {
            Side::Guest => Direction::A,
            Side::Host => Direction::B,
        }
    }

    /// The direction this side produces.
    pub fn outbound(self) -> Direction {
        match self {
            Side::Guest => Direction::B,
            Side::Host => Direction::A,
        }
    }

    pub fn peer(self) -> Side {
        match self {
            Side::Guest => Side::Host,
            Side::Host => Side::Guest,
        }
    }
}

/// Control words at offset 0 of the region.
///
/// Counters are logical byte offsets. `head` is advanced only by the
/// producer of a direction and `tail` only by its consumer, so every
/// store here has exactly one writer. Loads use `Acquire` and stores use
/// `Release`: a consumer that observes a new `head` also observes the frame
/// bytes written before it, and a producer that observes a new `tail` may
/// overwrite the bytes released by it.
#[repr(C)]
#[derive(Default)]
pub struct ControlBlock {
    a_head: AtomicU32,
    a_tail: AtomicU32,
    b_head: AtomicU32,
    b_tail: AtomicU32,
    status: AtomicU32,
}

const _: () = {
    assert!(offset_of!(ControlBlock, a_head) == A_HEAD_OFFSET);
    assert!(offset_of!(ControlBlock, a_tail) == A_TAIL_OFFSET);
    assert!(offset_of!(ControlBlock, b_head) == B_HEAD_OFFSET);
    assert!(offset_of!(ControlBlock, b_tail) == B_TAIL_OFFSET);
    assert!(offset_of!(ControlBlock, status) == STATUS_OFFSET);
    assert!(size_of::<ControlBlock>() <= CONTROL_SIZE);
};

impl ControlBlock {
    #[inline(always)]
    fn head_word(&self, dir: Direction) -> &AtomicU32 {
        match dir {
            Direction::A => &self.a_head,
            Direction::B => &self.b_head,
        }
    }

    #[inline(always)]
    fn tail_word(&self, dir: Direction) -> &AtomicU32 {
        match dir {
            Direction::A => &self.a_tail,
            Direction::B => &self.b_tail,
        }
    }

    /// Producer counter: logical offset one past the last published frame.
    #[inline(always)]
    pub fn head(&self, dir: Direction) -> u32 {
        u32::from_le(self.head_word(dir).load(Ordering::Acquire))
    }

    /// Consumer counter: logical offset of the next unread byte.
    #[inline(always)]
    pub fn tail(&self, dir: Direction) -> u32 {
        u32::from_le(self.tail_word(dir).load(Ordering::Acquire))
    }

    /// Publish frames written up to `head`. Producer only.
    #[inline(always)]
    pub fn publish_head(&self, dir: Direction, head: u32) {
        self.head_word(dir).store(head.to_le(), Ordering::Release);
    }

    /// Hand bytes before `tail` back to the producer. Consumer only.
    #[inline(always)]
    pub fn release_tail(&self, dir: Direction, tail: u32) {
        self.tail_word(dir).store(tail.to_le(), Ordering::Release);
    }

    /// Reserved status word. Neither ring reads or writes it.
    pub fn status(&self) -> u32 {
        u32::from_le(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, value: u32) {
        self.status.store(value.to_le(), Ordering::Release);
    }
}

/// Sizes and offsets derived from the total region size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    region_size: usize,
    capacity: u32,
}

impl Layout {
    /// Splits a region of `region_size` bytes into the control block and two
    /// equal rings. An odd remainder byte at the end is left unused.
    pub fn for_region(region_size: usize) -> Result<Self, ChannelError> {
        let min = CONTROL_SIZE + 2 * MIN_CAPACITY as usize;
        if region_size < min {
            return Err(ChannelError::RegionTooSmall {
                size: region_size,
                min,
            });
        }

        let capacity = (region_size - CONTROL_SIZE) / 2;
        let capacity = u32::try_from(capacity)
            .ok()
            .filter(|&c| c <= MAX_CAPACITY)
            .ok_or(ChannelError::RegionTooLarge { size: region_size })?;

        Ok(Self {
            region_size,
            capacity,
        })
    }

    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Capacity `B` of each ring in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Byte offset of the ring for `dir` from the start of the region.
    pub fn buffer_offset(&self, dir: Direction) -> usize {
        CONTROL_SIZE + dir.index() * self.capacity as usize
    }
}
