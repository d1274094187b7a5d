//! Frame codec: a little-endian `u32` payload length followed by the payload.
//!
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ len: u32 LE  │ payload: len bytes       │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! There is no padding between the prefix and the payload. A length outside
//! `0 < len < capacity` marks the rest of the cycle as padding.

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: u32 = 4;

/// Length value a producer writes where it abandons the rest of a cycle.
pub const PAD_MARKER: u32 = 0;

#[inline(always)]
pub fn encode_header(len: u32) -> [u8; 4] {
    len.to_le_bytes()
}

#[inline(always)]
pub fn decode_header(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

/// Total frame size for a payload, or `None` if it cannot be described by a
/// `u32` length prefix.
#[inline]
pub fn frame_len(payload_len: usize) -> Option<u32> {
    u32::try_from(payload_len)
        .ok()?
        .checked_add(FRAME_HEADER_LEN)
}

/// Whether a decoded length can describe a real frame in a ring of
/// `capacity` bytes.
#[inline(always)]
pub fn is_valid_len(len: u32, capacity: u32) -> bool {
    len > 0 && len < capacity
}
