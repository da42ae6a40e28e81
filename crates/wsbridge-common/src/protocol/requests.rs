use serde::{Deserialize, Serialize};

/// A request variable as produced by the host's wire parser.
pub type RequestVar = (Vec<u8>, Vec<u8>);

/// Whether a request is being dispatched for the first time or re-entered
/// after `DispatchOutcome::Again`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AsyncStatus {
    #[default]
    Fresh,
    Again,
}

/// Result of one `dispatch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// The request cycle is complete.
    Ok,
    /// Not finished; re-dispatch this slot once its wait condition fires.
    Again,
    /// The request cycle was aborted.
    Error,
}

/// An incoming request whose variables have already been parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub vars: Vec<RequestVar>,
    /// Size of the wire payload the variables were parsed from.
    pub payload_len: usize,
    pub async_status: AsyncStatus,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable, growing `payload_len` by its encoded size
    /// (two 16-bit length prefixes plus key and value).
    pub fn with_var(mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        self.push_var(key.as_ref().to_vec(), value.as_ref().to_vec());
        self
    }

    pub fn push_var(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.payload_len += 4 + key.len() + value.len();
        self.vars.push((key, value));
    }

    pub fn var(&self, key: &str) -> Option<&[u8]> {
        self.vars
            .iter()
            .find(|(k, _)| k.as_slice() == key.as_bytes())
            .map(|(_, v)| v.as_slice())
    }

    pub fn is_again(&self) -> bool {
        self.async_status == AsyncStatus::Again
    }
}
