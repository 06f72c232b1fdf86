//! Sequential accelerator worker
//!
//! A single task that blocks in every reclaim: read a chunk, convert it in
//! place, write the same buffer back, wait for the write, repeat.

use crate::config::{DspConfig, WorkerKind};
use crate::error::DspError;
use crate::worker::{Worker, WorkerParts};
use ycc_kernel::convert_in_place;
use ycc_link::{Buffer, Endpoint, LinkError, Rejected, TransferStats};

pub struct BlockingWorker {
    input: Endpoint,
    output: Endpoint,
    buffer: Option<Buffer>,
    config: DspConfig,
    stats: TransferStats,
    failed: Option<DspError>,
}

impl BlockingWorker {
    pub fn new(input: Endpoint, output: Endpoint, buffer: Buffer, config: DspConfig) -> Self {
        Self {
            input,
            output,
            buffer: Some(buffer),
            config,
            stats: TransferStats::default(),
            failed: None,
        }
    }

    fn park(&mut self, rejected: Rejected) -> DspError {
        let (error, buffer) = rejected.into_parts();
        self.buffer = Some(buffer);
        error.into()
    }

    /// One read, convert, write round trip
    fn cycle(&mut self) -> Result<(), DspError> {
        let timeout = self.config.reclaim_timeout;
        let buffer = self
            .buffer
            .take()
            .ok_or(LinkError::NothingIssued(self.input.id()))?;

        let size = self.config.buffer_size.min(buffer.capacity());
        self.input
            .issue(buffer, size)
            .map_err(|rejected| self.park(rejected))?;
        let read = self.input.reclaim(timeout)?;

        // Width padding rides along on the wire but is not converted
        let received = read.size;
        let mut buffer = read.buffer;
        convert_in_place(buffer.as_mut_slice(), self.config.edge_policy);

        self.output
            .issue(buffer, received)
            .map_err(|rejected| self.park(rejected))?;
        let written = self.output.reclaim(timeout)?;

        self.stats.record(written.valid);
        self.buffer = Some(written.buffer);
        Ok(())
    }
}

impl Worker for BlockingWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Blocking
    }

    fn execute(&mut self) -> Result<(), DspError> {
        if let Some(err) = &self.failed {
            return Err(DspError::Halted(Box::new(err.clone())));
        }

        let iterations = self.config.iterations;
        let mut done: u32 = 0;
        while iterations == 0 || done < iterations {
            match self.cycle() {
                Ok(()) => done += 1,
                Err(err) if iterations == 0 && err.is_shutdown() => {
                    log::debug!("channels closed after {} chunk(s)", done);
                    return Ok(());
                }
                Err(err) => {
                    log::error!("chunk {}: {}", done, err);
                    self.failed = Some(err.clone());
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn stats(&self) -> TransferStats {
        self.stats
    }

    fn into_parts(self: Box<Self>) -> WorkerParts {
        let BlockingWorker {
            input,
            output,
            buffer,
            ..
        } = *self;

        WorkerParts {
            input,
            output,
            buffers: buffer.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use ycc_kernel::EdgePolicy;
    use ycc_link::{pair, BufferPool, ChannelAttrs, ChannelId, PoolAttrs, PoolId, Timeout};

    /// The host's view of a worker under test
    struct Host {
        pool: BufferPool,
        out: Endpoint,
        input: Endpoint,
    }

    impl Host {
        fn round_trip(&self, data: &[u8]) -> Vec<u8> {
            self.round_trip_sized(data, data.len())
        }

        /// Send `data` in a request of `size` bytes
        fn round_trip_sized(&self, data: &[u8], size: usize) -> Vec<u8> {
            let mut chunk = self.pool.allocate(8).unwrap();
            chunk.fill_from(data);
            self.out.issue(chunk, size).unwrap();
            self.out.reclaim(Timeout::Forever).unwrap();

            self.input.issue(self.pool.allocate(8).unwrap(), 8).unwrap();
            let back = self.input.reclaim(Timeout::Forever).unwrap();
            back.buffer.as_slice().to_vec()
        }
    }

    fn rig(iterations: u32, policy: EdgePolicy) -> (Host, BlockingWorker) {
        let pool = BufferPool::new(
            PoolId::make(0, 0),
            PoolAttrs {
                buffer_size: 8,
                num_buffers: 3,
            },
        )
        .unwrap();
        let (out, dsp_in) = pair(ChannelId(0), ChannelAttrs::default());
        let (dsp_out, input) = pair(ChannelId(1), ChannelAttrs::default());
        let config = DspConfig {
            buffer_size: 8,
            iterations,
            edge_policy: policy,
            ..DspConfig::default()
        };
        let worker = BlockingWorker::new(dsp_in, dsp_out, pool.allocate(8).unwrap(), config);

        (Host { pool, out, input }, worker)
    }

    #[test]
    fn test_runs_configured_iterations() {
        let (host, mut worker) = rig(2, EdgePolicy::Wrap);
        let handle = thread::spawn(move || {
            let result = worker.execute();
            (result, worker.stats())
        });

        assert_eq!(
            host.round_trip(&[255, 255, 255, 0, 0, 0]),
            vec![153, 130, 130, 16, 128, 128]
        );
        // The trailing pair is not a whole triple and comes back unchanged
        assert_eq!(
            host.round_trip(&[0, 1, 0, 0, 0, 0, 9, 9]),
            vec![21, 126, 125, 16, 128, 128, 9, 9]
        );

        let (result, stats) = handle.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.bytes, 14);
    }

    #[test]
    fn test_padded_tail_left_unconverted() {
        let (host, mut worker) = rig(1, EdgePolicy::Saturate);
        let handle = thread::spawn(move || {
            let result = worker.execute();
            (result, worker.stats())
        });

        // Five bytes padded to six: the two after the pixel are not a triple
        assert_eq!(
            host.round_trip_sized(&[0, 1, 0, 9, 9], 6),
            vec![21, 126, 125, 9, 9]
        );

        let (result, stats) = handle.join().unwrap();
        assert!(result.is_ok());
        assert_eq!(stats.bytes, 5);
    }

    #[test]
    fn test_unbounded_stops_when_channels_close() {
        let (host, mut worker) = rig(0, EdgePolicy::Saturate);
        let handle = thread::spawn(move || worker.execute());

        assert_eq!(host.round_trip(&[255, 0, 0, 7]), vec![255, 0, 255, 7]);
        thread::sleep(Duration::from_millis(20));
        drop(host);

        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_timeout_is_fatal_and_sticky() {
        let (_host, mut worker) = rig(1, EdgePolicy::Saturate);
        worker.config.reclaim_timeout = Timeout::After(Duration::from_millis(10));

        assert_eq!(
            worker.execute().unwrap_err(),
            DspError::Link(LinkError::Timeout(ChannelId(0)))
        );
        assert!(matches!(worker.execute(), Err(DspError::Halted(_))));
    }
}
