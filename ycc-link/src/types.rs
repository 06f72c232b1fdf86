//! Link identifiers, attributes and constants

use std::fmt;
use std::time::Duration;

/// Alignment of every pool buffer, and of the chunk size the host negotiates
pub const BUF_ALIGN: usize = 128;

/// Number of accelerators a host can address
pub const MAX_PROCESSORS: u8 = 4;

/// Channel carrying chunks from the host to the accelerator
pub const TO_ACCELERATOR: ChannelId = ChannelId(0);

/// Channel carrying transformed chunks back to the host
pub const FROM_ACCELERATOR: ChannelId = ChannelId(1);

/// Round `size` up to the next multiple of `align`
///
/// `align` must be a power of two.
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Pool identifier, composed of the owning processor and a pool index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u16);

impl PoolId {
    pub fn make(processor: u8, index: u8) -> Self {
        PoolId(((processor as u16) << 8) | index as u16)
    }

    pub fn processor(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn index(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool {}:{}", self.processor(), self.index())
    }
}

/// Channel index; the only addressing a link exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chnl{}", self.0)
    }
}

/// Transfer direction, seen from the endpoint that owns it
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// The endpoint receives buffers filled by its peer
    Inbound = 0,
    /// The endpoint sends filled buffers to its peer
    Outbound = 1,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Inbound => Direction::Outbound,
            Direction::Outbound => Direction::Inbound,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Channel data width
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataWidth {
    Bits8 = 1,
    #[default]
    Bits16 = 2,
    Bits32 = 4,
}

impl DataWidth {
    pub fn bytes(self) -> usize {
        self as usize
    }

    /// Round a byte count up to a whole number of channel words
    pub fn round_up(self, size: usize) -> usize {
        align_up(size, self.bytes())
    }
}

/// Channel creation attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAttrs {
    pub data_width: DataWidth,
    /// Maximum number of requests an endpoint may have in flight
    pub depth: usize,
}

impl Default for ChannelAttrs {
    fn default() -> Self {
        Self {
            data_width: DataWidth::Bits16,
            depth: 1,
        }
    }
}

/// Bound on a blocking reclaim
///
/// The default is `Forever`: the reclaim blocks, uninterruptibly, until the
/// request completes or the channel is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    #[default]
    Forever,
    NoWait,
    After(Duration),
}

impl Timeout {
    /// `None` maps to `Forever`, `Some(0)` to `NoWait`
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            None => Timeout::Forever,
            Some(0) => Timeout::NoWait,
            Some(ms) => Timeout::After(Duration::from_millis(ms)),
        }
    }
}

/// Running counters of a transfer session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub chunks: u64,
    pub bytes: u64,
}

impl TransferStats {
    pub fn record(&mut self, bytes: usize) {
        self.chunks += 1;
        self.bytes += bytes as u64;
    }
}
