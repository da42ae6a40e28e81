use crate::protocol::handles::{SlotRef, StoredRef};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unable to load script {path}: {message}")]
    ScriptLoad { path: String, message: String },

    #[error("JavaScript execution error: {0}")]
    JavaScriptExecution(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown slot {0}")]
    UnknownSlot(SlotRef),

    #[error("Slot {0} is already executing")]
    SlotBusy(SlotRef),

    #[error("Handle {handle} does not belong to instance {instance}")]
    ForeignHandle { handle: StoredRef, instance: u64 },

    #[error("Handle {0} is not registered")]
    DanglingHandle(StoredRef),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by the host primitives the bridge calls into.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid lock number {0}")]
    InvalidLock(i64),

    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

pub type HostResult<T> = std::result::Result<T, HostError>;
