//! wsbridge common types
//!
//! This crate holds everything the bridge shares with its host:
//!
//! - [`protocol`] - requests, dispatch outcomes, slot and stored-reference
//!   handles, errors
//! - [`host`] - the traits a host server implements, plus the in-memory
//!   [`host::MemoryHost`]
//! - [`config`] - bridge options and the worker layout
//!
//! # Example
//!
//! ```
//! use wsbridge_common::{Request, AsyncStatus};
//!
//! let request = Request::new()
//!     .with_var("REQUEST_METHOD", "GET")
//!     .with_var("PATH_INFO", "/hello");
//!
//! assert_eq!(request.async_status, AsyncStatus::Fresh);
//! assert!(request.payload_len > 0);
//! ```

pub mod config;
pub mod host;
pub mod protocol;

pub use config::{BridgeConfig, GcMode, OptionSink, WorkerLayout};
pub use host::{AsyncIo, FdInterest, Host, HostServices, MemoryHost, RequestIo, ResponseWriter};
pub use protocol::*;
