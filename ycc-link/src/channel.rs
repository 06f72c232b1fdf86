//! Issue/reclaim transfer channels
//!
//! A channel joins two endpoints, one outbound and one inbound. Each endpoint
//! queues up to `depth` requests. A transfer happens when an outbound request
//! meets an inbound one: the sender's valid bytes are copied into the
//! receiver's buffer and both requests complete, in issue order.
//!
//! Completions are collected either by a blocking `reclaim` or, once a
//! callback is registered, delivered to the callback. Callbacks of one
//! endpoint never run concurrently and always see completions in order.

use crate::buffer_pool::Buffer;
use crate::error::{LinkError, Rejected};
use crate::types::{ChannelAttrs, ChannelId, Direction, Timeout};
use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Completed,
    /// The channel was deleted, or the peer dropped, before the transfer
    Cancelled,
}

/// A finished request: the buffer that was issued and the bytes moved
///
/// `size` counts every byte that crossed the wire, width padding included.
/// `valid` is the part of it the sender marked as data; on an inbound
/// completion the buffer's `len()` is set to it.
#[derive(Debug)]
pub struct Completion {
    pub status: Status,
    pub buffer: Buffer,
    pub size: usize,
    pub valid: usize,
}

/// Completion callback of an endpoint in event mode
pub type Callback = Box<dyn FnMut(Completion) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub issued: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub bytes: u64,
}

struct Request {
    buffer: Buffer,
    size: usize,
    valid: usize,
}

struct Side {
    pending: ArrayQueue<Request>,
    done: VecDeque<Completion>,
    // Cancellations not yet reported to a blocking reclaimer
    unreported: usize,
    attached: bool,
    stats: EndpointStats,
}

impl Side {
    fn new(depth: usize) -> Self {
        Side {
            pending: ArrayQueue::new(depth),
            done: VecDeque::new(),
            unreported: 0,
            attached: false,
            stats: EndpointStats::default(),
        }
    }

    fn finish(&mut self, status: Status, buffer: Buffer, size: usize, valid: usize) {
        match status {
            Status::Completed => {
                self.stats.completed += 1;
                self.stats.bytes += size as u64;
            }
            Status::Cancelled => self.stats.cancelled += 1,
        }
        self.done.push_back(Completion {
            status,
            buffer,
            size,
            valid,
        });
    }

    /// Cancel pending requests; with a callback the buffers travel back in
    /// `Cancelled` completions, otherwise they go straight back to their pool
    fn cancel_pending(&mut self, has_callback: bool) {
        while let Some(req) = self.pending.pop() {
            if has_callback {
                self.finish(Status::Cancelled, req.buffer, 0, 0);
            } else {
                self.stats.cancelled += 1;
                self.unreported += 1;
            }
        }
    }
}

struct WireState {
    sides: [Side; 2],
    closed: bool,
}

/// Shared state of one channel
pub(crate) struct Wire {
    id: ChannelId,
    attrs: ChannelAttrs,
    state: Mutex<WireState>,
    ready: [Condvar; 2],
    callbacks: [Mutex<Option<Callback>>; 2],
}

impl Wire {
    pub(crate) fn new(id: ChannelId, attrs: ChannelAttrs) -> Arc<Self> {
        let depth = attrs.depth.max(1);
        Arc::new(Wire {
            id,
            attrs: ChannelAttrs { depth, ..attrs },
            state: Mutex::new(WireState {
                sides: [Side::new(depth), Side::new(depth)],
                closed: false,
            }),
            ready: [Condvar::new(), Condvar::new()],
            callbacks: [Mutex::new(None), Mutex::new(None)],
        })
    }

    /// Claim one end of the wire
    pub(crate) fn attach(self: &Arc<Self>, direction: Direction) -> Result<Endpoint, LinkError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LinkError::ChannelClosed(self.id));
        }
        let side = &mut state.sides[direction.slot()];
        if side.attached {
            return Err(LinkError::EndpointInUse {
                channel: self.id,
                direction,
            });
        }
        side.attached = true;

        Ok(Endpoint {
            wire: self.clone(),
            direction,
        })
    }

    /// Cancel every pending request and refuse new ones
    ///
    /// Both callback slots stay locked until the cancellations are delivered,
    /// so a callback cleared concurrently either receives them or never
    /// existed for them.
    pub(crate) fn close(&self) {
        let mut callbacks = [self.callbacks[0].lock(), self.callbacks[1].lock()];
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            for (side, callback) in state.sides.iter_mut().zip(&callbacks) {
                side.cancel_pending(callback.is_some());
            }
        }
        log::debug!("{} closed", self.id);

        for cv in &self.ready {
            cv.notify_all();
        }
        for (slot, callback) in callbacks.iter_mut().enumerate() {
            if let Some(cb) = &mut **callback {
                self.deliver(slot, cb);
            }
        }
    }

    /// Pair outbound and inbound requests, oldest first
    fn transfer(&self, state: &mut WireState) -> bool {
        let mut moved = false;

        loop {
            let [inbound, outbound] = &mut state.sides;
            if inbound.pending.is_empty() || outbound.pending.is_empty() {
                break;
            }
            let (Some(send), Some(mut recv)) = (outbound.pending.pop(), inbound.pending.pop())
            else {
                break;
            };

            let n = send.size.min(recv.size);
            recv.buffer.storage_mut()[..n].copy_from_slice(&send.buffer.storage()[..n]);
            if n < send.size {
                log::debug!(
                    "{}: receiver took {} of {} bytes",
                    self.id,
                    n,
                    send.size
                );
            }

            let valid = send.valid.min(n);
            recv.buffer.set_len(valid);
            outbound.finish(Status::Completed, send.buffer, n, valid);
            inbound.finish(Status::Completed, recv.buffer, n, valid);
            moved = true;
        }

        moved
    }

    /// Hand queued completions of one end to its callback, if it has one
    fn dispatch(&self, direction: Direction) {
        let slot = direction.slot();
        let mut callback = self.callbacks[slot].lock();
        if let Some(cb) = callback.as_mut() {
            self.deliver(slot, cb);
        }
    }

    // Caller holds the callback lock of `slot`
    fn deliver(&self, slot: usize, cb: &mut Callback) {
        loop {
            let next = self.state.lock().sides[slot].done.pop_front();
            match next {
                Some(completion) => cb(completion),
                None => break,
            }
        }
    }

    fn wait(
        &self,
        state: &mut MutexGuard<'_, WireState>,
        direction: Direction,
        deadline: Option<Instant>,
    ) {
        let cv = &self.ready[direction.slot()];
        match deadline {
            None => cv.wait(state),
            Some(deadline) => {
                cv.wait_until(state, deadline);
            }
        }
    }
}

/// One end of a channel
///
/// An endpoint is owned by exactly one side; dropping it closes the channel so
/// the peer never waits on a partner that is gone.
pub struct Endpoint {
    wire: Arc<Wire>,
    direction: Direction,
}

impl Endpoint {
    pub fn id(&self) -> ChannelId {
        self.wire.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn attrs(&self) -> ChannelAttrs {
        self.wire.attrs
    }

    pub fn stats(&self) -> EndpointStats {
        self.wire.state.lock().sides[self.direction.slot()].stats
    }

    /// Number of requests issued and not yet completed
    pub fn pending(&self) -> usize {
        self.wire.state.lock().sides[self.direction.slot()].pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.wire.state.lock().closed
    }

    /// Submit a buffer for transfer in this endpoint's direction
    ///
    /// Outbound: `size` bytes are sent, of which the buffer's first `len()`
    /// are data and the rest width padding. Inbound: up to `size` bytes may be
    /// received. A refused request hands the buffer straight back.
    pub fn issue(&self, buffer: Buffer, size: usize) -> Result<(), Rejected> {
        let id = self.wire.id;
        let width = self.wire.attrs.data_width.bytes();

        let refusal = if size > buffer.capacity() {
            Some(LinkError::SizeExceedsBuffer {
                channel: id,
                size,
                capacity: buffer.capacity(),
            })
        } else if size % width != 0 {
            Some(LinkError::Misaligned {
                channel: id,
                size,
                width,
            })
        } else {
            None
        };
        if let Some(error) = refusal {
            return Err(Rejected { error, buffer });
        }

        let moved = {
            let mut state = self.wire.state.lock();
            if state.closed {
                return Err(Rejected {
                    error: LinkError::ChannelClosed(id),
                    buffer,
                });
            }

            let valid = match self.direction {
                Direction::Outbound => buffer.len().min(size),
                Direction::Inbound => size,
            };
            let side = &mut state.sides[self.direction.slot()];
            if let Err(req) = side.pending.push(Request {
                buffer,
                size,
                valid,
            }) {
                return Err(Rejected {
                    error: LinkError::QueueFull {
                        channel: id,
                        depth: self.wire.attrs.depth,
                    },
                    buffer: req.buffer,
                });
            }
            side.stats.issued += 1;

            self.wire.transfer(&mut state)
        };

        if moved {
            for cv in &self.wire.ready {
                cv.notify_all();
            }
            self.wire.dispatch(Direction::Inbound);
            self.wire.dispatch(Direction::Outbound);
        }
        Ok(())
    }

    /// Wait for the oldest issued request to complete
    ///
    /// Returns the buffer that was issued and the number of bytes moved, which
    /// may be less than requested when the peer asked for fewer. A request cancelled
    /// by channel deletion is reported as `Cancelled`; its buffer goes back to
    /// its pool.
    pub fn reclaim(&self, timeout: Timeout) -> Result<Completion, LinkError> {
        let id = self.wire.id;
        let slot = self.direction.slot();
        if self.wire.callbacks[slot].lock().is_some() {
            return Err(LinkError::CallbackMode(id));
        }

        let deadline = match timeout {
            Timeout::After(d) => Some(Instant::now() + d),
            _ => None,
        };

        let mut state = self.wire.state.lock();
        loop {
            let side = &mut state.sides[slot];
            if let Some(completion) = side.done.pop_front() {
                return match completion.status {
                    Status::Completed => Ok(completion),
                    Status::Cancelled => Err(LinkError::Cancelled(id)),
                };
            }
            if side.unreported > 0 {
                side.unreported -= 1;
                return Err(LinkError::Cancelled(id));
            }
            if state.sides[slot].pending.is_empty() {
                return Err(if state.closed {
                    LinkError::ChannelClosed(id)
                } else {
                    LinkError::NothingIssued(id)
                });
            }
            let expired = match (timeout, deadline) {
                (Timeout::NoWait, _) => true,
                (_, Some(deadline)) => Instant::now() >= deadline,
                _ => false,
            };
            if expired {
                return Err(LinkError::Timeout(id));
            }
            self.wire.wait(&mut state, self.direction, deadline);
        }
    }

    /// Deliver completions to `callback` instead of `reclaim`
    ///
    /// Completions already waiting are delivered right away. The callback runs
    /// on whichever thread completed the transfer and must not issue on this
    /// channel; post to the owning worker instead.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(Completion) + Send + 'static,
    {
        *self.wire.callbacks[self.direction.slot()].lock() = Some(Box::new(callback));
        self.wire.dispatch(self.direction);
    }

    /// Go back to blocking reclaim
    pub fn clear_callback(&self) {
        *self.wire.callbacks[self.direction.slot()].lock() = None;
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.wire.close();
        // Release any callback so captured senders are dropped with the endpoint.
        self.clear_callback();
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.wire.id)
            .field("direction", &self.direction)
            .field("attrs", &self.wire.attrs)
            .finish()
    }
}

/// A free-standing channel with both ends, outbound first
pub fn pair(id: ChannelId, attrs: ChannelAttrs) -> (Endpoint, Endpoint) {
    let wire = Wire::new(id, attrs);
    let tx = Endpoint {
        wire: wire.clone(),
        direction: Direction::Outbound,
    };
    let rx = Endpoint {
        wire,
        direction: Direction::Inbound,
    };
    {
        let mut state = tx.wire.state.lock();
        state.sides[0].attached = true;
        state.sides[1].attached = true;
    }
    (tx, rx)
}
