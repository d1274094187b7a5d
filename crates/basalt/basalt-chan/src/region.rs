//! Owned view of a mapped channel region.
//!
//! `Region` is the only place that turns the mapping's base pointer into
//! anything. The control block is reached through a typed reference of
//! atomics, and ring bytes are only ever copied in or out through
//! bounds-checked offsets, so no slice into shared memory outlives a call.

use crate::error::ChannelError;
use crate::shm_layout::{ControlBlock, Direction, Layout};
use basalt_mmap::SharedMapping;
use std::io;
use std::mem::align_of;
use std::ptr::{self, NonNull};

pub struct Region {
    /// Owns the mmap lifetime; `base` points into it.
    mapping: SharedMapping,
    base: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the mapping is only accessed through the control block atomics and
// through copies into ring ranges that the head/tail protocol hands to exactly
// one side at a time.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    pub fn new(mut mapping: SharedMapping) -> Result<Self, ChannelError> {
        let layout = Layout::for_region(mapping.len())?;
        let base = NonNull::new(mapping.as_mut_ptr()).ok_or(ChannelError::Misaligned)?;
        if base.as_ptr() as usize % align_of::<ControlBlock>() != 0 {
            return Err(ChannelError::Misaligned);
        }

        Ok(Self {
            mapping,
            base,
            layout,
        })
    }

    #[inline(always)]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    #[inline(always)]
    pub fn control(&self) -> &ControlBlock {
        // SAFETY: base is aligned (checked in `new`), the region is at least
        // CONTROL_SIZE bytes, and ControlBlock is plain atomics.
        unsafe { &*(self.base.as_ptr() as *const ControlBlock) }
    }

    #[inline(always)]
    fn ring_ptr(&self, dir: Direction, pos: u32, len: usize) -> *mut u8 {
        let end = pos as usize + len;
        assert!(
            end <= self.layout.capacity() as usize,
            "ring access {pos}..{end} outside capacity {}",
            self.layout.capacity()
        );
        // SAFETY: buffer_offset + capacity <= region size by construction of
        // Layout, and the range was checked above.
        unsafe { self.base.as_ptr().add(self.layout.buffer_offset(dir) + pos as usize) }
    }

    /// Copy `dst.len()` bytes out of the ring for `dir`, starting at physical
    /// position `pos`.
    ///
    /// # Panics
    /// Panics if the range leaves the ring.
    #[inline]
    pub fn read_bytes(&self, dir: Direction, pos: u32, dst: &mut [u8]) {
        let src = self.ring_ptr(dir, pos, dst.len());
        // SAFETY: range checked in ring_ptr; dst is a distinct local buffer.
        unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
    }

    /// Copy `src` into the ring for `dir` at physical position `pos`.
    ///
    /// # Panics
    /// Panics if the range leaves the ring.
    #[inline]
    pub fn write_bytes(&self, dir: Direction, pos: u32, src: &[u8]) {
        let dst = self.ring_ptr(dir, pos, src.len());
        // SAFETY: range checked in ring_ptr; only the producer of `dir` writes
        // these bytes and the consumer does not read them until `head` moves.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), dst, src.len()) };
    }

    pub fn flush(&self) -> io::Result<()> {
        self.mapping.flush()
    }
}
