//! Host-side error taxonomy

use crate::image_io::ImageError;
use thiserror::Error;
use ycc_link::{LinkError, Rejected};
use ycc_proc::ProcError;

#[derive(Debug, Error)]
pub enum HostError {
    /// Pool exhausted, zero-size request, or a pool that cannot be opened
    #[error("allocation failed: {0}")]
    Allocation(LinkError),

    /// An issue was refused or a reclaim failed or timed out
    #[error("channel failed: {0}")]
    Channel(LinkError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lifecycle failed: {0}")]
    Lifecycle(#[from] ProcError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl From<LinkError> for HostError {
    fn from(err: LinkError) -> Self {
        if err.is_allocation() {
            HostError::Allocation(err)
        } else {
            HostError::Channel(err)
        }
    }
}

impl From<Rejected> for HostError {
    fn from(rejected: Rejected) -> Self {
        rejected.error.into()
    }
}

impl HostError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        HostError::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ycc_link::{ChannelId, PoolId};

    #[test]
    fn test_link_errors_are_classified() {
        let pool = PoolId::make(0, 0);
        assert!(matches!(
            HostError::from(LinkError::PoolExhausted(pool)),
            HostError::Allocation(_)
        ));
        assert!(matches!(
            HostError::from(LinkError::Timeout(ChannelId(0))),
            HostError::Channel(_)
        ));
    }
}
