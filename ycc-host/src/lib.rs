//! Host side of the YCbCr transfer
//!
//! Key features:
//! - Chunk planning and a fail-fast round-trip loop over a channel pair
//! - Host session: setup in lifecycle order, teardown in reverse with every
//!   failure collected
//! - Binary PPM image store
//! - `ycc` command line front end

pub mod args;
pub mod config;
pub mod controller;
pub mod error;
pub mod image_io;
pub mod session;

pub use args::*;
pub use config::*;
pub use controller::*;
pub use error::*;
pub use image_io::*;
pub use session::*;
