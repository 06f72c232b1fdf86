//! Link error type

use crate::buffer_pool::Buffer;
use crate::types::{ChannelId, Direction, PoolId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("zero-size allocation requested from {0}")]
    ZeroSize(PoolId),

    #[error("{pool}: {requested} bytes requested, buffers hold {buffer_size}")]
    TooLarge {
        pool: PoolId,
        requested: usize,
        buffer_size: usize,
    },

    #[error("{0} exhausted")]
    PoolExhausted(PoolId),

    #[error("{0} is already open")]
    PoolInUse(PoolId),

    #[error("{0} is not open")]
    UnknownPool(PoolId),

    #[error("{pool} still has {outstanding} buffer(s) outstanding")]
    PoolBusy { pool: PoolId, outstanding: usize },

    #[error("buffer from {actual} released to {expected}")]
    ForeignBuffer { expected: PoolId, actual: PoolId },

    #[error("invalid pool attributes: {0}")]
    InvalidPoolAttrs(&'static str),

    #[error("{0} already exists")]
    ChannelExists(ChannelId),

    #[error("{0} does not exist")]
    UnknownChannel(ChannelId),

    #[error("{channel}: {direction} end is already open")]
    EndpointInUse {
        channel: ChannelId,
        direction: Direction,
    },

    #[error("{0} is closed")]
    ChannelClosed(ChannelId),

    #[error("{channel}: {depth} request(s) already pending")]
    QueueFull { channel: ChannelId, depth: usize },

    #[error("{channel}: {size} bytes requested from a {capacity}-byte buffer")]
    SizeExceedsBuffer {
        channel: ChannelId,
        size: usize,
        capacity: usize,
    },

    #[error("{channel}: {size} bytes is not a whole number of {width}-byte words")]
    Misaligned {
        channel: ChannelId,
        size: usize,
        width: usize,
    },

    #[error("{0}: reclaim timed out")]
    Timeout(ChannelId),

    #[error("{0}: no request to reclaim")]
    NothingIssued(ChannelId),

    #[error("{0}: completions are delivered to a callback")]
    CallbackMode(ChannelId),

    #[error("{0}: request cancelled")]
    Cancelled(ChannelId),
}

impl LinkError {
    /// Errors raised by a pool rather than a channel
    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            LinkError::ZeroSize(_)
                | LinkError::TooLarge { .. }
                | LinkError::PoolExhausted(_)
                | LinkError::PoolInUse(_)
                | LinkError::UnknownPool(_)
                | LinkError::PoolBusy { .. }
                | LinkError::ForeignBuffer { .. }
                | LinkError::InvalidPoolAttrs(_)
        )
    }
}

/// An issue the channel refused; hands the buffer back to the caller
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    pub error: LinkError,
    pub buffer: Buffer,
}

impl Rejected {
    pub fn into_parts(self) -> (LinkError, Buffer) {
        (self.error, self.buffer)
    }
}

impl From<Rejected> for LinkError {
    fn from(rejected: Rejected) -> Self {
        rejected.error
    }
}
