//! Accelerator-side error type

use thiserror::Error;
use ycc_link::{ChannelId, LinkError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DspError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Link(#[from] LinkError),

    /// The event queue lost every sender before the session finished
    #[error("{0}: completion source went away")]
    Disconnected(ChannelId),

    #[error("no completion within the reclaim timeout")]
    Timeout,

    /// A worker already failed; it resubmits nothing until torn down
    #[error("worker halted after an earlier failure: {0}")]
    Halted(Box<DspError>),
}

impl DspError {
    /// The host tore the channels down; an unbounded session ends this way
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            DspError::Link(LinkError::Cancelled(_) | LinkError::ChannelClosed(_))
                | DspError::Disconnected(_)
        )
    }
}
