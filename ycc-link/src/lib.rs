//! Host/accelerator transfer link
//!
//! Shared plumbing for moving chunks between the host and an attached
//! accelerator:
//! - Fixed-size, fixed-count buffer pools keyed by pool id
//! - Depth-bounded issue/reclaim channels with in-order completion
//! - Completion callbacks for event-driven consumers
//! - A per-processor link object holding both

pub mod buffer_pool;
pub mod channel;
pub mod error;
pub mod link;
pub mod types;

pub use buffer_pool::*;
pub use channel::*;
pub use error::*;
pub use link::*;
pub use types::*;
