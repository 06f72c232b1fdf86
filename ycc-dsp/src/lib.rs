//! Accelerator side of the transfer
//!
//! Key features:
//! - Blocking worker: one sequential read, convert, write loop
//! - Event-driven worker: completions posted as events, consumed by a
//!   single-threaded step function
//! - Worker chosen per session from the `load` arguments
//! - Session owns its pool and both channel ends; teardown aggregates failures

pub mod blocking;
pub mod config;
pub mod error;
pub mod event;
pub mod session;
pub mod worker;

pub use blocking::BlockingWorker;
pub use config::*;
pub use error::*;
pub use event::{Event, EventWorker};
pub use session::*;
pub use worker::*;
