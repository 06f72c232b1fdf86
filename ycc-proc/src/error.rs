//! Processor lifecycle errors

use crate::local::ProcState;
use thiserror::Error;
use ycc_dsp::DspError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcError {
    #[error("processor {0} does not exist")]
    InvalidProcessor(u8),

    #[error("processor {id}: cannot {op} while {state}")]
    InvalidState {
        id: u8,
        op: &'static str,
        state: ProcState,
    },

    #[error("processor {id}: cannot load {executable:?}: {reason}")]
    Load {
        id: u8,
        executable: String,
        reason: String,
    },

    #[error("processor {id}: failed to spawn accelerator thread: {reason}")]
    Spawn { id: u8, reason: String },

    #[error("processor {id}: accelerator failed: {source}")]
    Accelerator { id: u8, source: DspError },

    #[error("processor {0}: accelerator thread panicked")]
    Panicked(u8),
}
