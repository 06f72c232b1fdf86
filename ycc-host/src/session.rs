//! Host transfer session
//!
//! `create` brings the accelerator up and builds both channels, `execute`
//! starts it and streams the data, `delete` takes everything down again. A
//! failed step during `create` tears down whatever was already set up.

use crate::config::TransferConfig;
use crate::controller::{ChannelPair, ChunkPlan, TransferController};
use crate::error::HostError;
use std::fmt;
use ycc_link::{
    ChannelId, Direction, PoolAttrs, PoolId, TransferStats, FROM_ACCELERATOR, TO_ACCELERATOR,
};
use ycc_proc::Processor;

/// Index of the host pool on its processor
pub const HOST_POOL_INDEX: u8 = 0;

/// A teardown step that can fail on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    ReleaseBuffer,
    DeleteChannel(ChannelId),
    Stop,
    ClosePool,
    Detach,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownStep::ReleaseBuffer => f.write_str("release buffer"),
            TeardownStep::DeleteChannel(id) => write!(f, "delete {}", id),
            TeardownStep::Stop => f.write_str("stop"),
            TeardownStep::ClosePool => f.write_str("close pool"),
            TeardownStep::Detach => f.write_str("detach"),
        }
    }
}

/// Every teardown step that failed, in the order they ran
#[derive(Debug, Default)]
pub struct TeardownReport {
    pub failures: Vec<(TeardownStep, HostError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, step: TeardownStep, err: impl Into<HostError>) {
        let err = err.into();
        log::warn!("teardown: {} failed: {}", step, err);
        self.failures.push((step, err));
    }
}

pub struct HostSession<P: Processor> {
    processor: P,
    config: TransferConfig,
    pool: PoolId,
    controller: TransferController,
    pair: Option<ChannelPair>,
    attached: bool,
    pool_open: bool,
    started: bool,
    executed: bool,
}

impl<P: Processor> HostSession<P> {
    /// Set up a session for a stream of `data_size` bytes
    ///
    /// Attach, open the host pool, load the accelerator with the chunk size
    /// and iteration count, create the outbound then inbound channel, and
    /// allocate one buffer for each.
    pub fn create(
        processor: P,
        config: TransferConfig,
        data_size: usize,
    ) -> Result<Self, HostError> {
        config.validate()?;
        let plan = ChunkPlan::new(data_size, config.aligned_buffer_size())?;
        if plan.iterations() == 0 {
            return Err(HostError::invalid("iteration count must be non-zero"));
        }
        let iterations = u32::try_from(plan.iterations())
            .map_err(|_| HostError::invalid("too many chunks for one session"))?;
        if processor.id() != config.processor_id {
            return Err(HostError::invalid(format!(
                "configured for processor {}, given processor {}",
                config.processor_id,
                processor.id()
            )));
        }

        if config.aligned_buffer_size() % ycc_kernel::TRIPLE != 0 {
            log::warn!(
                "chunk size {} is not a whole number of pixels; \
                 pixels split across chunks are not converted",
                config.aligned_buffer_size()
            );
        }

        let pool = PoolId::make(processor.id(), HOST_POOL_INDEX);
        let controller = TransferController::new(plan, config.reclaim_timeout);
        let mut session = Self {
            processor,
            config,
            pool,
            controller,
            pair: None,
            attached: false,
            pool_open: false,
            started: false,
            executed: false,
        };

        if let Err(err) = session.setup(iterations) {
            log::error!("proc {}: setup failed: {}", session.processor.id(), err);
            session.teardown();
            return Err(err);
        }

        log::info!(
            "proc {}: session ready, {} bytes in {} chunk(s) of {}",
            session.processor.id(),
            data_size,
            iterations,
            session.config.aligned_buffer_size()
        );
        Ok(session)
    }

    fn setup(&mut self, iterations: u32) -> Result<(), HostError> {
        let buffer_size = self.config.aligned_buffer_size();

        self.processor.attach()?;
        self.attached = true;

        let link = self.processor.link();
        let pool = link.pools().open(
            self.pool,
            PoolAttrs {
                buffer_size,
                num_buffers: self.config.num_buffers,
            },
        )?;
        self.pool_open = true;

        let args = self.config.dsp_config(iterations).to_args();
        self.processor.load(&self.config.executable, &args)?;

        let attrs = self.config.channel_attrs;
        let out = link.create_channel(TO_ACCELERATOR, Direction::Outbound, attrs)?;
        let input = link.create_channel(FROM_ACCELERATOR, Direction::Inbound, attrs)?;

        let out_buffer = pool.allocate(buffer_size)?;
        let in_buffer = pool.allocate(buffer_size)?;
        self.pair = Some(ChannelPair::new(out, input, out_buffer, in_buffer));
        Ok(())
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn plan(&self) -> &ChunkPlan {
        self.controller.plan()
    }

    pub fn stats(&self) -> TransferStats {
        self.controller.stats()
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Start the accelerator and stream `src` into `dst`
    ///
    /// Stops at the first channel error; chunks already written to `dst` stay.
    pub fn execute(&mut self, src: &[u8], dst: &mut [u8]) -> Result<TransferStats, HostError> {
        if self.executed {
            return Err(HostError::invalid("session already executed"));
        }
        self.executed = true;

        let Some(pair) = self.pair.as_mut() else {
            return Err(HostError::invalid("session has no channels"));
        };

        self.processor.start()?;
        self.started = true;

        self.controller.run(pair, src, dst)
    }

    /// Release, in order: buffers, inbound and outbound channel, the
    /// accelerator, the host pool, the attachment
    ///
    /// Every step runs regardless of earlier failures.
    pub fn delete(mut self) -> TeardownReport {
        self.teardown()
    }

    fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let link = self.processor.link();

        let endpoints = self.pair.take().map(|pair| {
            let (out, input, buffers) = pair.into_parts();
            for buffer in buffers {
                if let Err(e) = link.pools().release(self.pool, buffer) {
                    report.record(TeardownStep::ReleaseBuffer, e);
                }
            }
            (out, input)
        });

        let open = link.channel_ids();
        for id in [FROM_ACCELERATOR, TO_ACCELERATOR] {
            if open.contains(&id) {
                if let Err(e) = link.delete_channel(id) {
                    report.record(TeardownStep::DeleteChannel(id), e);
                }
            }
        }
        drop(endpoints);

        if self.started {
            self.started = false;
            if let Err(e) = self.processor.stop() {
                report.record(TeardownStep::Stop, e);
            }
        }

        if self.pool_open {
            self.pool_open = false;
            if let Err(e) = link.pools().close(self.pool) {
                report.record(TeardownStep::ClosePool, e);
            }
        }

        if self.attached {
            self.attached = false;
            if let Err(e) = self.processor.detach() {
                report.record(TeardownStep::Detach, e);
            }
        }

        if report.is_clean() {
            log::info!("proc {}: session deleted", self.processor.id());
        }
        report
    }
}

/// Create, execute and delete a session for `src`
///
/// Returns the first fatal error; teardown failures are logged only.
pub fn run_transfer<P: Processor>(
    processor: P,
    config: &TransferConfig,
    src: &[u8],
    dst: &mut [u8],
) -> Result<TransferStats, HostError> {
    let mut session = HostSession::create(processor, config.clone(), src.len())?;
    let result = session.execute(src, dst);
    let report = session.delete();
    if !report.is_clean() {
        log::warn!("{} teardown step(s) failed", report.failures.len());
    }
    result
}
