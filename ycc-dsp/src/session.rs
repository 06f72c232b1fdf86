//! Accelerator-side transfer session

use crate::config::DspConfig;
use crate::error::DspError;
use crate::worker::{self, Worker};
use std::sync::Arc;
use ycc_link::{
    BufferPool, Direction, Link, PoolAttrs, PoolId, TransferStats, FROM_ACCELERATOR,
    TO_ACCELERATOR,
};

/// Index of the accelerator's own pool on its processor
pub const DSP_POOL_INDEX: u8 = 1;

/// Both channel ends, the worker's buffers, and the worker itself
///
/// Owned by the accelerator thread from `create` to `delete`; nothing here is
/// shared with other sessions.
pub struct DspSession {
    link: Arc<Link>,
    pool: PoolId,
    config: DspConfig,
    worker: Box<dyn Worker>,
}

impl DspSession {
    /// Open the session pool, take the accelerator ends of both channels and
    /// build the configured worker
    pub fn create(link: Arc<Link>, config: DspConfig) -> Result<Self, DspError> {
        config.validate()?;

        let pool_id = PoolId::make(link.processor(), DSP_POOL_INDEX);
        let pool = link.pools().open(
            pool_id,
            PoolAttrs {
                buffer_size: config.buffer_size,
                num_buffers: config.worker.buffers_needed(),
            },
        )?;

        let worker = match Self::build(&link, &pool, &config) {
            Ok(worker) => worker,
            Err(err) => {
                drop(pool);
                if let Err(e) = link.pools().close(pool_id) {
                    log::warn!("proc {}: {}", link.processor(), e);
                }
                return Err(err);
            }
        };

        log::info!(
            "proc {}: {} worker ready, {} byte chunks, {} iteration(s)",
            link.processor(),
            config.worker,
            config.buffer_size,
            config.iterations
        );

        Ok(Self {
            link,
            pool: pool_id,
            config,
            worker,
        })
    }

    fn build(
        link: &Link,
        pool: &BufferPool,
        config: &DspConfig,
    ) -> Result<Box<dyn Worker>, DspError> {
        let input = link.open_channel(TO_ACCELERATOR, Direction::Inbound)?;
        let output = link.open_channel(FROM_ACCELERATOR, Direction::Outbound)?;
        worker::build(input, output, pool, config)
    }

    pub fn config(&self) -> &DspConfig {
        &self.config
    }

    pub fn stats(&self) -> TransferStats {
        self.worker.stats()
    }

    /// Run the worker to completion
    pub fn execute(&mut self) -> Result<TransferStats, DspError> {
        self.worker.execute()?;
        let stats = self.worker.stats();
        log::info!(
            "proc {}: {} chunk(s), {} bytes transformed",
            self.link.processor(),
            stats.chunks,
            stats.bytes
        );
        Ok(stats)
    }

    /// Release every buffer, close both channel ends and the pool
    ///
    /// Every step runs; the first failure is returned after all of them.
    pub fn delete(self) -> Result<(), DspError> {
        let DspSession {
            link, pool, worker, ..
        } = self;
        let proc_id = link.processor();
        let mut first: Option<DspError> = None;

        let parts = worker.into_parts();
        for buffer in parts.buffers {
            if let Err(e) = link.pools().release(pool, buffer) {
                log::warn!("proc {}: releasing buffer: {}", proc_id, e);
                first.get_or_insert(e.into());
            }
        }

        drop(parts.input);
        drop(parts.output);

        if let Err(e) = link.pools().close(pool) {
            log::warn!("proc {}: {}", proc_id, e);
            first.get_or_insert(e.into());
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Create, execute and delete a session; teardown runs even after a failed
/// execute, whose error wins
pub fn run(link: Arc<Link>, config: DspConfig) -> Result<TransferStats, DspError> {
    let mut session = DspSession::create(link, config)?;
    let result = session.execute();
    let teardown = session.delete();

    let stats = result?;
    teardown?;
    Ok(stats)
}
