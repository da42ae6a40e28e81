pub mod error;
pub mod handles;
pub mod requests;

#[cfg(test)]
mod tests;

pub use error::{BridgeError, HostError, HostResult, Result};
pub use handles::{InstanceId, SlotId, SlotRef, StoredRef, WorkerId};
pub use requests::{AsyncStatus, DispatchOutcome, Request, RequestVar};
