//! Accelerator worker interface

use crate::blocking::BlockingWorker;
use crate::config::{DspConfig, WorkerKind};
use crate::error::DspError;
use crate::event::EventWorker;
use ycc_link::{Buffer, BufferPool, Endpoint, TransferStats};

/// One accelerator-side execution model
///
/// Both implementations read chunks from the inbound endpoint, convert them,
/// and write them back on the outbound endpoint, one chunk at a time.
pub trait Worker: Send {
    fn kind(&self) -> WorkerKind;

    /// Run until the configured number of transforms is done, the channels
    /// close, or a channel operation fails
    fn execute(&mut self) -> Result<(), DspError>;

    fn stats(&self) -> TransferStats;

    /// Give back the endpoints and every buffer the worker still holds
    fn into_parts(self: Box<Self>) -> WorkerParts;
}

pub struct WorkerParts {
    pub input: Endpoint,
    pub output: Endpoint,
    pub buffers: Vec<Buffer>,
}

/// Build the worker `config.worker` names, with its buffers from `pool`
pub fn build(
    input: Endpoint,
    output: Endpoint,
    pool: &BufferPool,
    config: &DspConfig,
) -> Result<Box<dyn Worker>, DspError> {
    let size = config.buffer_size;

    Ok(match config.worker {
        WorkerKind::Blocking => Box::new(BlockingWorker::new(
            input,
            output,
            pool.allocate(size)?,
            *config,
        )),
        WorkerKind::EventDriven => Box::new(EventWorker::new(
            input,
            output,
            pool.allocate(size)?,
            pool.allocate(size)?,
            *config,
        )?),
    })
}
