/// Counters kept by each half of an endpoint. Local to this process; never
/// stored in the shared region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub frames_read: u64,
    pub bytes_read: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    /// Cycle tails skipped by either half (padding written or consumed).
    pub cycle_skips: u64,
    /// Skips caused by a length prefix that could not describe a frame.
    pub invalid_frames: u64,
    pub write_timeouts: u64,
}

impl ChannelStats {
    pub fn merge(self, other: ChannelStats) -> ChannelStats {
        ChannelStats {
            frames_read: self.frames_read + other.frames_read,
            bytes_read: self.bytes_read + other.bytes_read,
            frames_written: self.frames_written + other.frames_written,
            bytes_written: self.bytes_written + other.bytes_written,
            cycle_skips: self.cycle_skips + other.cycle_skips,
            invalid_frames: self.invalid_frames + other.invalid_frames,
            write_timeouts: self.write_timeouts + other.write_timeouts,
        }
    }
}
