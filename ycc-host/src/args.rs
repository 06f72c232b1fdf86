//! Command line of the `ycc` binary

use crate::config::TransferConfig;
use clap::Parser;
use std::path::PathBuf;
use ycc_dsp::WorkerKind;
use ycc_kernel::EdgePolicy;
use ycc_link::Timeout;

/// Accelerator scheduling model
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum WorkerArg {
    /// One blocking task: read, convert, write
    Blocking,
    /// Completion callbacks drive a double-buffered pipeline
    Event,
}

impl From<WorkerArg> for WorkerKind {
    fn from(arg: WorkerArg) -> Self {
        match arg {
            WorkerArg::Blocking => WorkerKind::Blocking,
            WorkerArg::Event => WorkerKind::EventDriven,
        }
    }
}

/// Out-of-range handling for converted components
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum EdgePolicyArg {
    /// Clamp to 0..=255
    Saturate,
    /// Keep the low 8 bits
    Wrap,
}

impl From<EdgePolicyArg> for EdgePolicy {
    fn from(arg: EdgePolicyArg) -> Self {
        match arg {
            EdgePolicyArg::Saturate => EdgePolicy::Saturate,
            EdgePolicyArg::Wrap => EdgePolicy::Wrap,
        }
    }
}

/// Stream an RGB image through an accelerator and store the YCbCr result.
///
/// Images are binary PPM files. The image is cut into chunks of
/// `BUFFER_SIZE` bytes (rounded up to 128) and each chunk makes one round
/// trip through the accelerator.
///
/// # Example
///
/// ```bash
/// ycc ycc-dsp in.ppm out.ppm 4096 --worker event
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Accelerator executable to load
    pub dsp_executable: String,

    /// Input image (binary PPM)
    pub input: PathBuf,

    /// Output image (binary PPM)
    pub output: PathBuf,

    /// Chunk size in bytes
    pub buffer_size: usize,

    /// Accelerator processor id
    #[arg(default_value = "0")]
    pub processor_id: u8,

    /// Accelerator scheduling model
    #[arg(long, env = "YCC_WORKER", default_value = "blocking", value_enum)]
    pub worker: WorkerArg,

    /// Out-of-range handling for converted components
    #[arg(long, env = "YCC_EDGE_POLICY", default_value = "saturate", value_enum)]
    pub edge_policy: EdgePolicyArg,

    /// Bound on each channel wait in milliseconds; waits forever when absent,
    /// 0 polls once
    #[arg(long, env = "YCC_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            processor_id: self.processor_id,
            executable: self.dsp_executable.clone(),
            buffer_size: self.buffer_size,
            reclaim_timeout: Timeout::from_millis(self.timeout_ms),
            edge_policy: self.edge_policy.into(),
            worker: self.worker.into(),
            ..TransferConfig::default()
        }
    }
}
