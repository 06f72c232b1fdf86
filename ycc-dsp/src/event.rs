//! Event-driven accelerator worker
//!
//! Read and write completions arrive independently through channel callbacks.
//! The callbacks only post an [`Event`] to the worker's queue; the worker's
//! `step` consumes events one at a time and runs the convert-and-resubmit unit
//! once neither a read nor a write is outstanding. Steps never overlap, so no
//! state is shared with the callbacks.

use crate::config::{DspConfig, WorkerKind};
use crate::error::DspError;
use crate::worker::{Worker, WorkerParts};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use ycc_kernel::{convert_into, TRIPLE};
use ycc_link::{Buffer, Completion, Endpoint, LinkError, Status, Timeout, TransferStats};

/// A read is outstanding
pub const READ_PENDING: u8 = 0x1;
/// A write is outstanding, or no write has completed yet
pub const WRITE_PENDING: u8 = 0x2;

/// A completion posted by a channel callback
#[derive(Debug)]
pub enum Event {
    Read(Completion),
    Write(Completion),
}

pub struct EventWorker {
    input: Endpoint,
    output: Endpoint,
    events: Receiver<Event>,
    pending: u8,
    in_buffer: Option<Buffer>,
    out_buffer: Option<Buffer>,
    received: usize,
    cycles: u32,
    finished: bool,
    failed: Option<DspError>,
    config: DspConfig,
    stats: TransferStats,
}

impl EventWorker {
    /// Register the completion callbacks and issue the first read
    pub fn new(
        input: Endpoint,
        output: Endpoint,
        in_buffer: Buffer,
        out_buffer: Buffer,
        config: DspConfig,
    ) -> Result<Self, DspError> {
        let (tx, events) = channel::unbounded();

        let reads = tx.clone();
        input.set_callback(move |c| {
            let _ = reads.send(Event::Read(c));
        });
        output.set_callback(move |c| {
            let _ = tx.send(Event::Write(c));
        });

        let mut worker = Self {
            input,
            output,
            events,
            pending: READ_PENDING | WRITE_PENDING,
            in_buffer: None,
            out_buffer: Some(out_buffer),
            received: 0,
            cycles: 0,
            finished: false,
            failed: None,
            config,
            stats: TransferStats::default(),
        };

        worker.read(in_buffer)?;
        // Nothing written yet; the first cycle waits on the read alone
        worker.pending &= !WRITE_PENDING;
        Ok(worker)
    }

    /// Outstanding-request mask, `READ_PENDING | WRITE_PENDING` bits
    pub fn pending(&self) -> u8 {
        self.pending
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn read(&mut self, buffer: Buffer) -> Result<(), DspError> {
        let size = self.config.buffer_size.min(buffer.capacity());
        match self.input.issue(buffer, size) {
            Ok(()) => {
                self.pending |= READ_PENDING;
                Ok(())
            }
            Err(rejected) => {
                let (error, buffer) = rejected.into_parts();
                self.in_buffer = Some(buffer);
                Err(error.into())
            }
        }
    }

    fn write(&mut self, buffer: Buffer, size: usize) -> Result<(), DspError> {
        match self.output.issue(buffer, size) {
            Ok(()) => {
                self.pending |= WRITE_PENDING;
                Ok(())
            }
            Err(rejected) => {
                let (error, buffer) = rejected.into_parts();
                self.out_buffer = Some(buffer);
                Err(error.into())
            }
        }
    }

    /// Consume one completion
    ///
    /// Once both halves of a cycle are in, converts the received chunk and
    /// resubmits. After a failure the worker only collects buffers.
    pub fn step(&mut self, event: Event) -> Result<(), DspError> {
        let absorbed = self.absorb(event);
        if let Some(err) = &self.failed {
            return Err(DspError::Halted(Box::new(err.clone())));
        }

        let result = absorbed.and_then(|()| {
            if self.pending == 0 && !self.finished {
                self.run()
            } else {
                Ok(())
            }
        });
        result.map_err(|err| self.fail(err))
    }

    fn absorb(&mut self, event: Event) -> Result<(), DspError> {
        match event {
            Event::Read(c) => {
                self.in_buffer = Some(c.buffer);
                self.pending &= !READ_PENDING;
                match c.status {
                    Status::Completed => {
                        self.received = c.size;
                        Ok(())
                    }
                    Status::Cancelled => Err(LinkError::Cancelled(self.input.id()).into()),
                }
            }
            Event::Write(c) => {
                self.out_buffer = Some(c.buffer);
                self.pending &= !WRITE_PENDING;
                match c.status {
                    Status::Completed => {
                        self.stats.record(c.valid);
                        let limit = self.config.iterations;
                        if limit != 0 && self.cycles >= limit {
                            self.finished = true;
                        }
                        Ok(())
                    }
                    Status::Cancelled => Err(LinkError::Cancelled(self.output.id()).into()),
                }
            }
        }
    }

    /// Convert the received chunk into the output buffer and resubmit
    fn run(&mut self) -> Result<(), DspError> {
        let (in_buffer, mut out_buffer) = match (self.in_buffer.take(), self.out_buffer.take()) {
            (Some(i), Some(o)) => (i, o),
            (i, o) => {
                self.in_buffer = i;
                self.out_buffer = o;
                return Ok(());
            }
        };

        // Only the valid bytes are converted; width padding is copied as is
        let received = self.received;
        let valid = in_buffer.len();
        let dst = out_buffer.storage_mut();
        let whole = convert_into(in_buffer.as_slice(), dst, self.config.edge_policy) * TRIPLE;
        dst[whole..received].copy_from_slice(&in_buffer.storage()[whole..received]);
        out_buffer.set_len(valid);

        self.cycles += 1;
        let limit = self.config.iterations;
        if limit != 0 && self.cycles >= limit {
            // Last cycle: nothing more to read
            self.in_buffer = Some(in_buffer);
        } else if let Err(err) = self.read(in_buffer) {
            self.out_buffer = Some(out_buffer);
            return Err(err);
        }
        self.write(out_buffer, received)
    }

    fn fail(&mut self, err: DspError) -> DspError {
        if self.failed.is_none() {
            if !(self.config.iterations == 0 && err.is_shutdown()) {
                log::error!("cycle {}: {}", self.cycles, err);
            }
            self.failed = Some(err.clone());
        }
        err
    }

    fn next_event(&self) -> Result<Event, DspError> {
        let gone = DspError::Disconnected(self.input.id());
        match self.config.reclaim_timeout {
            Timeout::Forever => self.events.recv().map_err(|_| gone),
            Timeout::NoWait => self.events.try_recv().map_err(|e| match e {
                TryRecvError::Empty => DspError::Timeout,
                TryRecvError::Disconnected => gone,
            }),
            Timeout::After(d) => self.events.recv_timeout(d).map_err(|e| match e {
                RecvTimeoutError::Timeout => DspError::Timeout,
                RecvTimeoutError::Disconnected => gone,
            }),
        }
    }
}

impl Worker for EventWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::EventDriven
    }

    fn execute(&mut self) -> Result<(), DspError> {
        if let Some(err) = &self.failed {
            return Err(DspError::Halted(Box::new(err.clone())));
        }

        while !self.finished {
            let result = self.next_event().and_then(|event| self.step(event));
            match result {
                Ok(()) => {}
                Err(err) if self.config.iterations == 0 && err.is_shutdown() => {
                    log::debug!("channels closed after {} cycle(s)", self.cycles);
                    return Ok(());
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        Ok(())
    }

    fn stats(&self) -> TransferStats {
        self.stats
    }

    fn into_parts(self: Box<Self>) -> WorkerParts {
        let this = *self;
        // Later cancellations drop their buffers straight back to the pool
        this.input.clear_callback();
        this.output.clear_callback();

        let mut buffers: Vec<Buffer> = this
            .events
            .try_iter()
            .map(|event| match event {
                Event::Read(c) | Event::Write(c) => c.buffer,
            })
            .collect();
        // Completions that landed after the callback went away
        for endpoint in [&this.input, &this.output] {
            loop {
                match endpoint.reclaim(Timeout::NoWait) {
                    Ok(c) => buffers.push(c.buffer),
                    Err(LinkError::Cancelled(_)) => {}
                    Err(_) => break,
                }
            }
        }
        buffers.extend(this.in_buffer);
        buffers.extend(this.out_buffer);

        WorkerParts {
            input: this.input,
            output: this.output,
            buffers,
        }
    }
}
