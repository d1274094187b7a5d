//! Message-framed duplex channel over a single shared memory region.
//!
//! Two peers (a guest and a host) share one fixed-size region and nothing
//! else. The region holds a control block of atomic counters and two byte
//! rings, one per direction. Each ring has a single producer and a single
//! consumer which hand bytes to each other by advancing `head` and `tail`.
//! Both sides poll; there is no blocking primitive across the boundary.
//!
//! ```no_run
//! use basalt_chan::{Channel, ChannelOptions};
//!
//! let (mut guest, mut host) = Channel::pair(64 * 1024, &ChannelOptions::default())?;
//! host.write(b"hello")?;
//!
//! let mut buf = [0u8; 2];
//! assert_eq!(guest.read(&mut buf), 2); // "he"
//! # Ok::<(), basalt_chan::ChannelError>(())
//! ```

mod backoff;
mod channel;
mod error;
mod frame;
mod reader;
mod region;
mod ring;
mod shm_layout;
mod stats;
mod writer;

pub use backoff::Backoff;
pub use channel::{Channel, ChannelOptions, DEFAULT_POLL_INTERVAL, DEFAULT_WRITE_TIMEOUT};
pub use error::ChannelError;
pub use frame::{FRAME_HEADER_LEN, PAD_MARKER};
pub use reader::RingReader;
pub use ring::RingGeometry;
pub use shm_layout::{
    A_HEAD_OFFSET, A_TAIL_OFFSET, B_HEAD_OFFSET, B_TAIL_OFFSET, CONTROL_SIZE, ControlBlock,
    Direction, Layout, MIN_CAPACITY, STATUS_OFFSET, Side,
};
pub use stats::ChannelStats;
pub use writer::{RingWriter, default_safety_margin};

pub use basalt_mmap::SharedMapping;
