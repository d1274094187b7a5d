//! Consumer half of one direction.
//!
//! A frame is copied out of shared memory in one step and `tail` is released
//! before any of it reaches the caller. The producer may reuse the bytes as
//! soon as `tail` moves, and callers never hold a view into the region.
//!
//! Stream semantics: a message larger than the caller's buffer is served
//! across several calls from the local copy (`pending`), without touching
//! shared memory again until it is drained.

use crate::backoff::Backoff;
use crate::error::ChannelError;
use crate::frame::{FRAME_HEADER_LEN, PAD_MARKER, decode_header, is_valid_len};
use crate::region::Region;
use crate::ring::RingGeometry;
use crate::shm_layout::Direction;
use crate::stats::ChannelStats;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Outcome of one look at the ring.
enum Step {
    /// Nothing published.
    Empty,
    /// `tail` moved past padding or garbage; look again.
    Skipped,
    /// A whole frame now sits in `pending`.
    Loaded,
}

pub struct RingReader {
    region: Arc<Region>,
    dir: Direction,
    geometry: RingGeometry,
    poll_interval: Duration,
    /// Payload of the message currently being handed out.
    pending: Vec<u8>,
    /// How much of `pending` the caller already has.
    pending_pos: usize,
    stats: ChannelStats,
}

impl RingReader {
    pub(crate) fn new(region: Arc<Region>, dir: Direction, poll_interval: Duration) -> Self {
        let geometry = RingGeometry::new(region.layout().capacity());
        Self {
            region,
            dir,
            geometry,
            poll_interval,
            pending: Vec::new(),
            pending_pos: 0,
            stats: ChannelStats::default(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.dir
    }

    /// Bytes of the current message not yet returned to the caller.
    pub fn pending_len(&self) -> usize {
        self.pending.len() - self.pending_pos
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Blocks until at least one byte is available, then returns as many
    /// bytes of the current message as fit in `buf`.
    ///
    /// Returns 0 only for an empty `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut backoff = Backoff::new(self.poll_interval);
        loop {
            if let Some(n) = self.try_read(buf) {
                return n;
            }
            backoff.snooze();
        }
    }

    /// Like [`read`](Self::read) but gives up after `timeout`.
    pub fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ChannelError> {
        let start = Instant::now();
        let mut backoff = Backoff::new(self.poll_interval);
        loop {
            if let Some(n) = self.try_read(buf) {
                return Ok(n);
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(ChannelError::ReadTimeout { waited });
            }
            backoff.snooze();
        }
    }

    /// Like [`read`](Self::read) but returns `None` once `done` is set.
    /// `done` is checked between poll attempts.
    pub fn read_until(&mut self, buf: &mut [u8], done: &AtomicBool) -> Option<usize> {
        let mut backoff = Backoff::new(self.poll_interval);
        loop {
            if let Some(n) = self.try_read(buf) {
                return Some(n);
            }
            if done.load(Ordering::Acquire) {
                return None;
            }
            backoff.snooze();
        }
    }

    /// Single non-blocking attempt. `None` means nothing is published yet.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Option<usize> {
        if buf.is_empty() {
            return Some(0);
        }
        if self.pending_len() > 0 {
            return Some(self.serve_pending(buf));
        }

        loop {
            match self.poll_frame() {
                Step::Empty => return None,
                Step::Skipped => continue,
                Step::Loaded => return Some(self.serve_pending(buf)),
            }
        }
    }

    fn serve_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending_len());
        buf[..n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;

        if self.pending_pos >= self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        n
    }

    fn poll_frame(&mut self) -> Step {
        let ctl = self.region.control();
        let head = ctl.head(self.dir);
        let tail = ctl.tail(self.dir);
        let capacity = self.geometry.capacity();

        let available = self.geometry.used(head, tail);
        if available == 0 {
            return Step::Empty;
        }
        if available > capacity {
            warn!(
                dir = ?self.dir,
                head,
                tail,
                "counters further apart than capacity, discarding ring"
            );
            self.stats.invalid_frames += 1;
            ctl.release_tail(self.dir, head);
            return Step::Skipped;
        }

        if !self.geometry.fits(tail, FRAME_HEADER_LEN) {
            self.skip_cycle(head, tail, available);
            return Step::Skipped;
        }

        let pos = self.geometry.pos(tail);
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        self.region.read_bytes(self.dir, pos, &mut header);
        let len = decode_header(header);

        if !is_valid_len(len, capacity) {
            if len != PAD_MARKER {
                warn!(dir = ?self.dir, tail, len, "invalid frame length, skipping to next cycle");
                self.stats.invalid_frames += 1;
            }
            self.skip_cycle(head, tail, available);
            return Step::Skipped;
        }

        let frame = FRAME_HEADER_LEN + len;
        if !self.geometry.fits(tail, frame) || frame > available {
            warn!(
                dir = ?self.dir,
                tail,
                len,
                available,
                "frame does not fit, skipping to next cycle"
            );
            self.stats.invalid_frames += 1;
            self.skip_cycle(head, tail, available);
            return Step::Skipped;
        }

        self.pending.resize(len as usize, 0);
        self.pending_pos = 0;
        self.region
            .read_bytes(self.dir, pos + FRAME_HEADER_LEN, &mut self.pending);
        ctl.release_tail(self.dir, self.geometry.advance(tail, frame));

        self.stats.frames_read += 1;
        self.stats.bytes_read += len as u64;
        trace!(dir = ?self.dir, tail, len, "frame read");
        Step::Loaded
    }

    /// Move `tail` to the start of the next cycle, or to `head` if the
    /// boundary lies beyond what has been published.
    fn skip_cycle(&mut self, head: u32, tail: u32, available: u32) {
        let gap = self.geometry.remaining_in_cycle(tail);
        let target = if gap <= available {
            self.geometry.next_cycle(tail)
        } else {
            head
        };
        self.region.control().release_tail(self.dir, target);
        self.stats.cycle_skips += 1;
        debug!(dir = ?self.dir, from = tail, to = target, "consumer skipped cycle tail");
    }
}

impl io::Read for RingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(RingReader::read(self, buf))
    }
}
