//! Host transfer configuration

use crate::error::HostError;
use ycc_dsp::{DspConfig, WorkerKind};
use ycc_kernel::EdgePolicy;
use ycc_link::{align_up, ChannelAttrs, Timeout, BUF_ALIGN, MAX_PROCESSORS};

/// Host transfer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub processor_id: u8,
    /// Accelerator executable handed to `load`
    pub executable: String,
    /// Requested chunk size; aligned up to `BUF_ALIGN` when the session opens
    pub buffer_size: usize,
    /// Host pool budget; one outbound and one inbound buffer are taken
    pub num_buffers: usize,
    pub channel_attrs: ChannelAttrs,
    /// Bound on every host reclaim. `Forever` blocks, uninterruptibly, until
    /// the accelerator completes the request or the channel is deleted.
    pub reclaim_timeout: Timeout,
    pub edge_policy: EdgePolicy,
    pub worker: WorkerKind,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            processor_id: 0,
            executable: "ycc-dsp".to_string(),
            buffer_size: 1024,
            num_buffers: 4,
            channel_attrs: ChannelAttrs::default(),
            reclaim_timeout: Timeout::Forever,
            edge_policy: EdgePolicy::Saturate,
            worker: WorkerKind::Blocking,
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), HostError> {
        if self.buffer_size == 0 {
            return Err(HostError::invalid("buffer size must be non-zero"));
        }
        if self.processor_id >= MAX_PROCESSORS {
            return Err(HostError::invalid(format!(
                "processor id {} out of range (max {})",
                self.processor_id,
                MAX_PROCESSORS - 1
            )));
        }
        if self.num_buffers < 2 {
            return Err(HostError::invalid("host pool needs at least 2 buffers"));
        }
        Ok(())
    }

    /// Chunk size actually used on the wire
    pub fn aligned_buffer_size(&self) -> usize {
        align_up(self.buffer_size, BUF_ALIGN)
    }

    /// Accelerator configuration for a run of `iterations` chunks
    ///
    /// The accelerator waits forever between chunks; host teardown is what
    /// wakes it.
    pub fn dsp_config(&self, iterations: u32) -> DspConfig {
        DspConfig {
            buffer_size: self.aligned_buffer_size(),
            iterations,
            worker: self.worker,
            edge_policy: self.edge_policy,
            reclaim_timeout: Timeout::Forever,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reclaim_timeout, Timeout::Forever);
        assert_eq!(config.edge_policy, EdgePolicy::Saturate);
        assert_eq!(config.channel_attrs.depth, 1);
    }

    #[test]
    fn test_buffer_size_is_aligned() {
        let config = TransferConfig {
            buffer_size: 1000,
            ..TransferConfig::default()
        };
        assert_eq!(config.aligned_buffer_size(), 1024);
        assert_eq!(config.dsp_config(7).buffer_size, 1024);
        assert_eq!(config.dsp_config(7).iterations, 7);
    }

    #[test]
    fn test_validation() {
        let zero = TransferConfig {
            buffer_size: 0,
            ..TransferConfig::default()
        };
        assert!(matches!(zero.validate(), Err(HostError::InvalidArgument(_))));

        let far = TransferConfig {
            processor_id: MAX_PROCESSORS,
            ..TransferConfig::default()
        };
        assert!(matches!(far.validate(), Err(HostError::InvalidArgument(_))));
    }
}
