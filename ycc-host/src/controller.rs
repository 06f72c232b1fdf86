//! Transfer controller
//!
//! Slices the input stream into chunks, drives one round trip per chunk
//! through the channel pair, and writes each returned chunk back at the same
//! offset of the output stream. One chunk is in flight at a time.

use crate::error::HostError;
use std::ops::Range;
use ycc_link::{Buffer, Endpoint, Timeout, TransferStats};

/// How a stream of `data_size` bytes splits into chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    data_size: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(data_size: usize, chunk_size: usize) -> Result<Self, HostError> {
        if chunk_size == 0 {
            return Err(HostError::invalid("chunk size must be non-zero"));
        }
        Ok(Self {
            data_size,
            chunk_size,
        })
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// `ceil(data_size / chunk_size)`
    pub fn iterations(&self) -> usize {
        self.data_size.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index`; only the last one may be short
    pub fn chunk(&self, index: usize) -> Range<usize> {
        let start = (index * self.chunk_size).min(self.data_size);
        let end = (start + self.chunk_size).min(self.data_size);
        start..end
    }

    pub fn chunks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.iterations()).map(move |i| self.chunk(i))
    }
}

/// Host ends of both channels and the two buffers that carry chunks
pub struct ChannelPair {
    pub out: Endpoint,
    pub input: Endpoint,
    out_buffer: Option<Buffer>,
    in_buffer: Option<Buffer>,
}

impl ChannelPair {
    pub fn new(out: Endpoint, input: Endpoint, out_buffer: Buffer, in_buffer: Buffer) -> Self {
        Self {
            out,
            input,
            out_buffer: Some(out_buffer),
            in_buffer: Some(in_buffer),
        }
    }

    /// Send `chunk`, wait for it to be taken, then read the converted chunk
    /// into `dst`
    ///
    /// The send size is rounded up to the channel width. Only the chunk's own
    /// bytes are valid data; the padding is never copied into `dst`. A failed
    /// outbound reclaim returns before the inbound request is issued. Returns
    /// the bytes written to `dst`.
    pub fn round_trip(
        &mut self,
        chunk: &[u8],
        dst: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize, HostError> {
        let len = chunk.len();
        let send = self.out.attrs().data_width.round_up(len);

        let mut buffer = self.out_buffer.take().ok_or_else(|| idle(&self.out))?;
        buffer.fill_from(chunk);
        if let Err(rejected) = self.out.issue(buffer, send) {
            let (err, buffer) = rejected.into_parts();
            self.out_buffer = Some(buffer);
            return Err(err.into());
        }
        let sent = self.out.reclaim(timeout)?;
        self.out_buffer = Some(sent.buffer);

        let buffer = self.in_buffer.take().ok_or_else(|| idle(&self.input))?;
        if let Err(rejected) = self.input.issue(buffer, send) {
            let (err, buffer) = rejected.into_parts();
            self.in_buffer = Some(buffer);
            return Err(err.into());
        }
        let got = self.input.reclaim(timeout)?;

        let n = got.valid.min(len);
        if n < len {
            log::warn!("{}: short read, {} of {} bytes", self.input.id(), n, len);
        }
        dst[..n].copy_from_slice(&got.buffer.as_slice()[..n]);
        self.in_buffer = Some(got.buffer);
        Ok(n)
    }

    /// Hand back the endpoints and whichever buffers are not in a channel
    pub fn into_parts(self) -> (Endpoint, Endpoint, Vec<Buffer>) {
        let buffers = self.out_buffer.into_iter().chain(self.in_buffer).collect();
        (self.out, self.input, buffers)
    }
}

// A buffer is still stuck in a channel from an earlier failed round trip
fn idle(endpoint: &Endpoint) -> HostError {
    HostError::invalid(format!("{}: buffer still in flight", endpoint.id()))
}

pub struct TransferController {
    plan: ChunkPlan,
    timeout: Timeout,
    stats: TransferStats,
}

impl TransferController {
    pub fn new(plan: ChunkPlan, timeout: Timeout) -> Self {
        Self {
            plan,
            timeout,
            stats: TransferStats::default(),
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Stream `src` through the pair into `dst`, stopping at the first error
    ///
    /// Chunks already written to `dst` stay there after a failure.
    pub fn run(
        &mut self,
        pair: &mut ChannelPair,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<TransferStats, HostError> {
        let size = self.plan.data_size();
        if src.len() != size || dst.len() != size {
            return Err(HostError::invalid(format!(
                "stream is {} bytes in, {} out; plan expects {}",
                src.len(),
                dst.len(),
                size
            )));
        }

        for (index, range) in self.plan.chunks().enumerate() {
            let n = pair
                .round_trip(&src[range.clone()], &mut dst[range], self.timeout)
                .map_err(|err| {
                    log::error!("chunk {}: {}", index, err);
                    err
                })?;
            self.stats.record(n);
        }

        log::debug!(
            "{} chunk(s), {} bytes streamed",
            self.stats.chunks,
            self.stats.bytes
        );
        Ok(self.stats)
    }
}
