//! Producer half of one direction.
//!
//! A write places one whole frame or nothing. The frame is copied into the
//! ring first and `head` moves last, so the consumer never sees a frame that
//! is still being written.
//!
//! # Space accounting
//!
//! ```text
//! used   = head - tail                      (modulo the counter modulus)
//! budget = capacity - safety_margin
//!
//! fits in place:   used + frame        <= budget
//! needs a skip:    used + pad + frame  <= budget,  pad = capacity - pos(head)
//! ```
//!
//! The skip condition is the same as "the consumer has already vacated
//! `frame` bytes at the start of the buffer", expressed on counters.
//!
//! When the skip fits but the frame behind it does not, the skip is published
//! on its own (`head` moves to the next cycle with no frame). The consumer
//! follows it, the start of the buffer drains, and the next attempt places the
//! frame in place. Without this a frame larger than `pos(head) - margin` could
//! never be written after `head` came to rest mid-cycle.

use crate::backoff::Backoff;
use crate::error::ChannelError;
use crate::frame::{FRAME_HEADER_LEN, PAD_MARKER, encode_header, frame_len};
use crate::region::Region;
use crate::ring::RingGeometry;
use crate::shm_layout::Direction;
use crate::stats::ChannelStats;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default safety margin for a ring of `capacity` bytes: about 0.2% of the
/// ring, at least 64 bytes, a multiple of 4, never more than a quarter.
pub fn default_safety_margin(capacity: u32) -> u32 {
    (capacity / 512)
        .max(64)
        .next_multiple_of(4)
        .min(capacity / 4)
}

pub(crate) fn resolve_safety_margin(
    requested: Option<u32>,
    capacity: u32,
) -> Result<u32, ChannelError> {
    let margin = requested.unwrap_or_else(|| default_safety_margin(capacity));
    // At least a one-byte frame must remain possible.
    if margin as u64 + FRAME_HEADER_LEN as u64 + 1 > capacity as u64 {
        return Err(ChannelError::InvalidMargin { margin, capacity });
    }
    Ok(margin)
}

pub struct RingWriter {
    region: Arc<Region>,
    dir: Direction,
    geometry: RingGeometry,
    safety_margin: u32,
    timeout: Duration,
    poll_interval: Duration,
    stats: ChannelStats,
}

impl RingWriter {
    pub(crate) fn new(
        region: Arc<Region>,
        dir: Direction,
        safety_margin: u32,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        let geometry = RingGeometry::new(region.layout().capacity());
        Self {
            region,
            dir,
            geometry,
            safety_margin,
            timeout,
            poll_interval,
            stats: ChannelStats::default(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.dir
    }

    pub fn safety_margin(&self) -> u32 {
        self.safety_margin
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Largest payload a single write can ever enqueue.
    pub fn max_payload(&self) -> usize {
        (self.geometry.capacity() - self.safety_margin - FRAME_HEADER_LEN) as usize
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Enqueues `payload` as one frame, waiting up to the configured timeout
    /// for the consumer to make room.
    ///
    /// An empty payload is a no-op and returns `Ok(0)`.
    ///
    /// # Errors
    /// [`ChannelError::WriteTimeout`] if there was never enough room. Nothing
    /// was written; the call may be retried.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, ChannelError> {
        if payload.is_empty() {
            return Ok(0);
        }
        if payload.len() > self.max_payload() {
            warn!(
                dir = ?self.dir,
                len = payload.len(),
                max = self.max_payload(),
                "payload can never fit in the ring"
            );
        }

        let start = Instant::now();
        let mut backoff = Backoff::new(self.poll_interval);
        loop {
            if self.try_write(payload) {
                return Ok(payload.len());
            }
            let waited = start.elapsed();
            if waited >= self.timeout {
                self.stats.write_timeouts += 1;
                warn!(
                    dir = ?self.dir,
                    len = payload.len(),
                    ?waited,
                    "write timed out, peer not draining"
                );
                return Err(ChannelError::WriteTimeout {
                    len: payload.len(),
                    waited,
                });
            }
            backoff.snooze();
        }
    }

    /// Single attempt. Returns `false` if there is not enough room right now.
    pub fn try_write(&mut self, payload: &[u8]) -> bool {
        if payload.is_empty() {
            return true;
        }
        let Some(frame) = frame_len(payload.len()) else {
            return false;
        };

        let head = self.region.control().head(self.dir);
        let tail = self.region.control().tail(self.dir);
        let capacity = self.geometry.capacity();

        let used = self.geometry.used(head, tail);
        let budget = (capacity - self.safety_margin) as u64;
        if used > capacity || used as u64 + frame as u64 > budget {
            return false;
        }

        let mut at = head;
        if !self.geometry.fits(head, frame) {
            let pad = self.geometry.remaining_in_cycle(head);
            if used as u64 + pad as u64 + frame as u64 > budget {
                // The frame needs the start of the buffer, which only frees up
                // once the consumer has followed `head` past the cycle tail.
                // Publish the skip alone so it can.
                if used as u64 + pad as u64 <= capacity as u64 {
                    self.publish_skip(head, pad);
                }
                return false;
            }
            at = self.skip_to_next_cycle(head, pad);
        }

        let pos = self.geometry.pos(at);
        self.region
            .write_bytes(self.dir, pos + FRAME_HEADER_LEN, payload);
        self.region
            .write_bytes(self.dir, pos, &encode_header(frame - FRAME_HEADER_LEN));
        fence(Ordering::Release);
        self.region
            .control()
            .publish_head(self.dir, self.geometry.advance(at, frame));

        self.stats.frames_written += 1;
        self.stats.bytes_written += payload.len() as u64;
        trace!(dir = ?self.dir, head = at, len = payload.len(), "frame written");
        true
    }

    /// Marks the rest of `head`'s cycle as padding and returns the start of
    /// the next cycle. Nothing is published.
    fn skip_to_next_cycle(&mut self, head: u32, pad: u32) -> u32 {
        if pad >= FRAME_HEADER_LEN {
            let pos = self.geometry.pos(head);
            self.region
                .write_bytes(self.dir, pos, &encode_header(PAD_MARKER));
        }
        let next = self.geometry.next_cycle(head);
        self.stats.cycle_skips += 1;
        debug!(dir = ?self.dir, from = head, to = next, "producer skipped cycle tail");
        next
    }

    /// Publishes a skip with no frame behind it.
    fn publish_skip(&mut self, head: u32, pad: u32) {
        let next = self.skip_to_next_cycle(head, pad);
        fence(Ordering::Release);
        self.region.control().publish_head(self.dir, next);
    }
}

impl io::Write for RingWriter {
    /// Writes at most one frame's worth of `buf`, so `write_all` can push
    /// payloads larger than the ring.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.max_payload());
        Ok(RingWriter::write(self, &buf[..n])?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
