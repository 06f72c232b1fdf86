//! Accelerator processor lifecycle
//!
//! Key features:
//! - `Processor` trait: attach, load, start, stop, detach
//! - `LocalProcessor`: an in-process accelerator running on its own thread
//! - Strict state ordering, with out-of-order calls refused

pub mod error;
pub mod local;

pub use error::*;
pub use local::*;

use std::sync::Arc;
use ycc_link::Link;

/// Lifecycle of one accelerator, driven by the host
///
/// Calls must follow attach, load, start, stop, detach. Teardown may call the
/// later steps after an earlier one failed; each reports its own error.
pub trait Processor {
    fn id(&self) -> u8;

    /// Link shared with the accelerator: pools and channels
    fn link(&self) -> Arc<Link>;

    fn attach(&mut self) -> Result<(), ProcError>;

    /// Load `executable` with the argument vector its session is built from
    fn load(&mut self, executable: &str, args: &[String]) -> Result<(), ProcError>;

    fn start(&mut self) -> Result<(), ProcError>;

    /// Stop the accelerator and collect its outcome
    fn stop(&mut self) -> Result<(), ProcError>;

    fn detach(&mut self) -> Result<(), ProcError>;
}
