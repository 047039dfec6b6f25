//! Error Module
//!
//! Failures surfaced by the submission core. Encoding never fails; every
//! error here aborts the submission being built and triggers a rollback.

use thiserror::Error;

use crate::catalog::{CommandKind, Generation};

#[derive(Debug, Error)]
pub enum Error {
    #[error("command buffer overflow: {requested} bytes requested, {remaining} remaining")]
    CommandBufferOverflow { requested: usize, remaining: isize },

    #[error("submission backend failure: {0}")]
    Backend(String),

    #[error("unknown resource {0}")]
    UnknownResource(u32),

    #[error("{kind:?} is not available on {generation}")]
    UnsupportedCommand {
        kind: CommandKind,
        generation: Generation,
    },

    #[error("invalid L3 plane {plane} (max {max})")]
    InvalidL3Plane { plane: usize, max: usize },

    #[error("task id {task_id} out of range (max {max})")]
    TaskIdOutOfRange { task_id: u32, max: u32 },

    #[error("no submission in flight")]
    NoSubmissionInFlight,

    #[error("submission for task {0} already in flight")]
    SubmissionInFlight(u32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed command stream at byte {offset}: {reason}")]
    Decode { offset: usize, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
