//! Host primitives consumed by the bridge
//!
//! The bridge never owns sockets, timers, caches or lock tables itself. It
//! reaches them through the traits below, which a host server implements. All
//! methods take `&self`: the host is shared (`Rc<dyn Host>`) between the
//! dispatcher and every interpreter's bindings, so implementations keep their
//! own interior mutability.
//!
//! Request-scoped primitives take the [`SlotRef`] of the request being served,
//! which the bridge always passes explicitly.
//!
//! - [`ResponseWriter`] - status line, headers, body chunks
//! - [`AsyncIo`] - timeout and fd-readiness registration, fd helpers
//! - [`RequestIo`] - request body and websocket I/O
//! - [`HostServices`] - cache, RPC and signal tables, user locks
//!
//! [`MemoryHost`] implements all of them in memory.

pub mod memory;

pub use memory::MemoryHost;

use crate::protocol::{HostResult, SlotRef, StoredRef};
use std::time::Duration;

/// Readiness a request waits for on a file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdInterest {
    Read,
    Write,
}

pub trait ResponseWriter {
    /// Starts the response with a status line such as `200 OK`.
    fn prepare_status(&self, slot: SlotRef, status: &[u8]) -> HostResult<()>;

    fn add_header(&self, slot: SlotRef, name: &[u8], value: &[u8]) -> HostResult<()>;

    fn write_body(&self, slot: SlotRef, chunk: &[u8]) -> HostResult<()>;
}

pub trait AsyncIo {
    /// Wakes `slot` after `timeout`.
    fn add_timeout(&self, slot: SlotRef, timeout: Duration) -> HostResult<()>;

    /// Wakes `slot` when `fd` becomes ready for `interest`, or after
    /// `timeout` (zero means no timeout).
    fn add_fd_wait(
        &self,
        slot: SlotRef,
        fd: i32,
        interest: FdInterest,
        timeout: Duration,
    ) -> HostResult<()>;

    /// The fd whose readiness woke `slot`, if any.
    fn ready_fd(&self, slot: SlotRef) -> Option<i32>;

    /// The client connection fd of the request on `slot`.
    fn connection_fd(&self, slot: SlotRef) -> i32;

    /// Starts a non-blocking connection and returns its fd.
    fn connect(&self, address: &str) -> HostResult<i32>;

    fn is_connected(&self, fd: i32) -> bool;

    fn close(&self, fd: i32);
}

pub trait RequestIo {
    /// Reads up to `max` bytes of the request body (`0` reads what remains).
    fn read_body(&self, slot: SlotRef, max: usize) -> HostResult<Vec<u8>>;

    fn websocket_handshake(
        &self,
        slot: SlotRef,
        key: Option<&[u8]>,
        origin: Option<&[u8]>,
        proto: Option<&[u8]>,
    ) -> HostResult<()>;

    /// Receives one websocket message; with `nonblocking` an empty message is
    /// returned when nothing is queued.
    fn websocket_recv(&self, slot: SlotRef, nonblocking: bool) -> HostResult<Vec<u8>>;

    fn websocket_send(&self, slot: SlotRef, message: &[u8], binary: bool) -> HostResult<()>;

    /// Sends `len` bytes (`0` means up to the end) of shared area `id`
    /// starting at `pos`.
    fn websocket_send_from_sharedarea(
        &self,
        slot: SlotRef,
        id: i32,
        pos: u64,
        len: u64,
        binary: bool,
    ) -> HostResult<()>;
}

pub trait HostServices {
    fn cache_get(&self, key: &[u8], cache: Option<&str>) -> Option<Vec<u8>>;

    /// Stores `value` under `key`. With `update` an existing entry is
    /// overwritten; without it an existing entry is an error.
    fn cache_set(
        &self,
        key: &[u8],
        value: &[u8],
        expires: u64,
        update: bool,
        cache: Option<&str>,
    ) -> HostResult<()>;

    fn cache_del(&self, key: &[u8], cache: Option<&str>) -> HostResult<()>;

    fn cache_exists(&self, key: &[u8], cache: Option<&str>) -> bool;

    fn cache_clear(&self, cache: Option<&str>) -> HostResult<()>;

    /// Calls `func` on `node` (empty for the local node). An empty result
    /// means "no result".
    fn rpc(&self, node: &str, func: &str, args: &[Vec<u8>]) -> HostResult<Vec<u8>>;

    fn register_rpc(&self, name: &str, handle: StoredRef) -> HostResult<()>;

    /// Handle registered on this node under `name`, if any.
    fn rpc_handle(&self, name: &str) -> Option<StoredRef>;

    fn register_signal(&self, signum: u8, target: &str, handle: StoredRef) -> HostResult<()>;

    /// Number of user locks beyond the default lock 0.
    fn user_locks(&self) -> usize;

    /// The spooler role may not take user locks.
    fn is_spooler(&self) -> bool;

    fn lock(&self, num: usize) -> HostResult<()>;

    fn unlock(&self, num: usize) -> HostResult<()>;
}

/// Everything the bridge needs from its host.
pub trait Host: ResponseWriter + AsyncIo + RequestIo + HostServices {}

impl<T: ResponseWriter + AsyncIo + RequestIo + HostServices> Host for T {}
