//! Channel endpoint: one side's reader and writer over a shared region.
//!
//! ```text
//!            guest endpoint                      host endpoint
//!   ┌───────────────────────────┐      ┌───────────────────────────┐
//!   │ RingReader  (direction A) │ ◄─── │ RingWriter  (direction A) │
//!   │ RingWriter  (direction B) │ ───► │ RingReader  (direction B) │
//!   └───────────────────────────┘      └───────────────────────────┘
//! ```
//!
//! Each direction has exactly one producer and one consumer. `split` hands
//! the two halves to different threads; neither half is `Clone`, so the
//! single-producer/single-consumer rule is enforced by ownership.

use crate::error::ChannelError;
use crate::reader::RingReader;
use crate::region::Region;
use crate::shm_layout::{ControlBlock, Layout, Side};
use crate::stats::ChannelStats;
use crate::writer::{RingWriter, resolve_safety_margin};
use basalt_mmap::SharedMapping;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::info;

/// Default deadline for a single write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default upper bound on the sleep between poll attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub side: Side,
    /// Ring bytes withheld from the free-space computation. `None` picks
    /// [`default_safety_margin`](crate::default_safety_margin).
    pub safety_margin: Option<u32>,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            side: Side::Guest,
            safety_margin: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ChannelOptions {
    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn safety_margin(mut self, margin: u32) -> Self {
        self.safety_margin = Some(margin);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

pub struct Channel {
    side: Side,
    region: Arc<Region>,
    reader: RingReader,
    writer: RingWriter,
}

impl Channel {
    /// Wraps an established mapping. The region must already be zeroed (or
    /// hold counters left by a peer that is still talking).
    pub fn open(mapping: SharedMapping, options: &ChannelOptions) -> Result<Self, ChannelError> {
        let region = Arc::new(Region::new(mapping)?);
        Self::over(region, options)
    }

    /// Maps an existing region file and opens it.
    pub fn open_file<P: AsRef<Path>>(
        path: P,
        options: &ChannelOptions,
    ) -> Result<Self, ChannelError> {
        let path = path.as_ref();
        let mapping = SharedMapping::open_rw(path).map_err(|source| ChannelError::Map {
            what: path.display().to_string(),
            source,
        })?;
        Self::open(mapping, options)
    }

    /// Maps `size` bytes of a memory device at `phys_addr` and opens them.
    #[cfg(unix)]
    pub fn open_physical<P: AsRef<Path>>(
        device: P,
        phys_addr: u64,
        size: u64,
        options: &ChannelOptions,
    ) -> Result<Self, ChannelError> {
        let device = device.as_ref();
        let mapping = SharedMapping::map_physical(device, phys_addr, size).map_err(|source| {
            ChannelError::Map {
                what: format!("{}@{phys_addr:#x}", device.display()),
                source,
            }
        })?;
        Self::open(mapping, options)
    }

    /// A guest and a host endpoint over one anonymous region, for peers that
    /// live in the same process.
    pub fn pair(
        region_size: usize,
        options: &ChannelOptions,
    ) -> Result<(Channel, Channel), ChannelError> {
        let mapping = SharedMapping::anonymous(region_size).map_err(|source| ChannelError::Map {
            what: "anonymous".into(),
            source,
        })?;
        let region = Arc::new(Region::new(mapping)?);
        let guest = Self::over(region.clone(), &options.clone().side(Side::Guest))?;
        let host = Self::over(region, &options.clone().side(Side::Host))?;
        Ok((guest, host))
    }

    fn over(region: Arc<Region>, options: &ChannelOptions) -> Result<Self, ChannelError> {
        let layout = region.layout();
        let margin = resolve_safety_margin(options.safety_margin, layout.capacity())?;
        let side = options.side;

        let reader = RingReader::new(region.clone(), side.inbound(), options.poll_interval);
        let writer = RingWriter::new(
            region.clone(),
            side.outbound(),
            margin,
            options.write_timeout,
            options.poll_interval,
        );

        info!(
            ?side,
            region_size = layout.region_size(),
            capacity = layout.capacity(),
            safety_margin = margin,
            "channel open"
        );

        Ok(Self {
            side,
            region,
            reader,
            writer,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn layout(&self) -> Layout {
        self.region.layout()
    }

    pub fn control(&self) -> &ControlBlock {
        self.region.control()
    }

    pub fn safety_margin(&self) -> u32 {
        self.writer.safety_margin()
    }

    /// Largest payload a single [`write`](Self::write) can enqueue.
    pub fn max_payload(&self) -> usize {
        self.writer.max_payload()
    }

    /// See [`RingReader::read`].
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.reader.read(buf)
    }

    pub fn try_read(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.reader.try_read(buf)
    }

    pub fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, ChannelError> {
        self.reader.read_timeout(buf, timeout)
    }

    pub fn read_until(&mut self, buf: &mut [u8], done: &AtomicBool) -> Option<usize> {
        self.reader.read_until(buf, done)
    }

    /// See [`RingWriter::write`].
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, ChannelError> {
        self.writer.write(payload)
    }

    pub fn try_write(&mut self, payload: &[u8]) -> bool {
        self.writer.try_write(payload)
    }

    pub fn stats(&self) -> ChannelStats {
        self.reader.stats().merge(self.writer.stats())
    }

    /// Separate the two directions so they can be driven from different
    /// threads.
    pub fn split(self) -> (RingReader, RingWriter) {
        (self.reader, self.writer)
    }

    /// Flushes the region and releases this endpoint's mapping. The mapping
    /// is unmapped once no half or paired endpoint still uses it.
    pub fn close(self) -> Result<(), ChannelError> {
        let Channel {
            side,
            region,
            reader,
            writer,
        } = self;
        let stats = reader.stats().merge(writer.stats());
        drop(reader);
        drop(writer);

        region.flush().map_err(ChannelError::Close)?;
        info!(
            ?side,
            frames_read = stats.frames_read,
            frames_written = stats.frames_written,
            "channel closed"
        );
        Ok(())
    }
}

impl io::Read for Channel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.reader, buf)
    }
}

impl io::Write for Channel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut self.writer, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
