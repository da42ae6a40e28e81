//! In-memory host
//!
//! `MemoryHost` implements every host trait without touching the network. It
//! captures each slot's response, serves request bodies and websocket messages
//! from queues, keeps named caches with expiry, user locks, RPC and signal
//! tables, and records every wait registration. The CLI drives requests
//! through it and the test suites use it to observe what the bridge emitted.

use crate::host::{AsyncIo, FdInterest, HostServices, RequestIo, ResponseWriter};
use crate::protocol::{HostError, HostResult, SlotRef, StoredRef};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

const DEFAULT_CACHE: &str = "default";
const FIRST_CONNECT_FD: i32 = 100;

type RpcHandler = Box<dyn Fn(&str, &str, &[Vec<u8>]) -> HostResult<Vec<u8>>>;

/// One response primitive, in the order the bridge called it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Status(Vec<u8>),
    Header(Vec<u8>, Vec<u8>),
    Body(Vec<u8>),
}

/// Everything written for one slot's current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedResponse {
    pub events: Vec<ResponseEvent>,
}

impl CapturedResponse {
    pub fn status(&self) -> Option<&[u8]> {
        self.events.iter().find_map(|e| match e {
            ResponseEvent::Status(s) => Some(s.as_slice()),
            _ => None,
        })
    }

    pub fn headers(&self) -> Vec<(&[u8], &[u8])> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::Header(n, v) => Some((n.as_slice(), v.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// Values of every header called `name`, in emission order.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers()
            .into_iter()
            .filter(|(n, _)| *n == name.as_bytes())
            .map(|(_, v)| String::from_utf8_lossy(v).into_owned())
            .collect()
    }

    pub fn body(&self) -> Vec<u8> {
        self.chunks().concat()
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::Body(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    /// True when no status or header was emitted after the first body chunk.
    pub fn headers_precede_body(&self) -> bool {
        let first_body = self
            .events
            .iter()
            .position(|e| matches!(e, ResponseEvent::Body(_)));
        match first_body {
            Some(pos) => self.events[pos..]
                .iter()
                .all(|e| matches!(e, ResponseEvent::Body(_))),
            None => true,
        }
    }
}

/// A wait condition registered by a suspended request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Timeout(Duration),
    Fd {
        fd: i32,
        interest: FdInterest,
        timeout: Duration,
    },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

pub struct MemoryHost {
    responses: RefCell<HashMap<SlotRef, CapturedResponse>>,
    bodies: RefCell<HashMap<SlotRef, VecDeque<u8>>>,
    closed: RefCell<HashSet<SlotRef>>,
    fail_status: Cell<bool>,

    waits: RefCell<HashMap<SlotRef, Vec<Wait>>>,
    ready: RefCell<HashMap<SlotRef, i32>>,
    connection_fds: RefCell<HashMap<SlotRef, i32>>,
    open_fds: RefCell<HashSet<i32>>,
    next_fd: Cell<i32>,

    handshakes: RefCell<HashSet<SlotRef>>,
    inbox: RefCell<HashMap<SlotRef, VecDeque<Vec<u8>>>>,
    outbox: RefCell<Vec<(SlotRef, Vec<u8>, bool)>>,
    sharedareas: RefCell<HashMap<i32, Vec<u8>>>,

    caches: RefCell<HashMap<String, HashMap<Vec<u8>, CacheEntry>>>,
    rpc_table: RefCell<HashMap<String, StoredRef>>,
    signal_table: RefCell<HashMap<u8, (String, StoredRef)>>,
    rpc_handler: RefCell<Option<RpcHandler>>,
    locks: RefCell<Vec<bool>>,
    spooler: Cell<bool>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Creates a host with only the default user lock (lock 0).
    pub fn new() -> Self {
        Self::with_user_locks(0)
    }

    /// Creates a host with `count` user locks beyond lock 0.
    pub fn with_user_locks(count: usize) -> Self {
        let mut caches = HashMap::new();
        caches.insert(DEFAULT_CACHE.to_string(), HashMap::new());
        Self {
            responses: RefCell::default(),
            bodies: RefCell::default(),
            closed: RefCell::default(),
            fail_status: Cell::new(false),
            waits: RefCell::default(),
            ready: RefCell::default(),
            connection_fds: RefCell::default(),
            open_fds: RefCell::default(),
            next_fd: Cell::new(FIRST_CONNECT_FD),
            handshakes: RefCell::default(),
            inbox: RefCell::default(),
            outbox: RefCell::default(),
            sharedareas: RefCell::default(),
            caches: RefCell::new(caches),
            rpc_table: RefCell::default(),
            signal_table: RefCell::default(),
            rpc_handler: RefCell::new(None),
            locks: RefCell::new(vec![false; count + 1]),
            spooler: Cell::new(false),
        }
    }

    // --- test and driver controls -------------------------------------

    pub fn response(&self, slot: SlotRef) -> CapturedResponse {
        self.responses.borrow().get(&slot).cloned().unwrap_or_default()
    }

    /// Forgets the captured response, body, waits and connection state of a
    /// slot so it can serve an unrelated request.
    pub fn reset_slot(&self, slot: SlotRef) {
        self.responses.borrow_mut().remove(&slot);
        self.bodies.borrow_mut().remove(&slot);
        self.closed.borrow_mut().remove(&slot);
        self.waits.borrow_mut().remove(&slot);
        self.ready.borrow_mut().remove(&slot);
        self.handshakes.borrow_mut().remove(&slot);
        self.inbox.borrow_mut().remove(&slot);
    }

    pub fn set_request_body(&self, slot: SlotRef, body: impl Into<Vec<u8>>) {
        self.bodies
            .borrow_mut()
            .insert(slot, body.into().into_iter().collect());
    }

    pub fn set_connection_fd(&self, slot: SlotRef, fd: i32) {
        self.connection_fds.borrow_mut().insert(slot, fd);
    }

    /// Makes every later body write for `slot` fail as if the client left.
    pub fn close_connection(&self, slot: SlotRef) {
        self.closed.borrow_mut().insert(slot);
    }

    pub fn fail_prepare_status(&self, fail: bool) {
        self.fail_status.set(fail);
    }

    /// Returns and clears the waits registered by `slot`.
    pub fn take_waits(&self, slot: SlotRef) -> Vec<Wait> {
        self.waits.borrow_mut().remove(&slot).unwrap_or_default()
    }

    pub fn mark_ready(&self, slot: SlotRef, fd: i32) {
        self.ready.borrow_mut().insert(slot, fd);
    }

    pub fn push_websocket_message(&self, slot: SlotRef, message: impl Into<Vec<u8>>) {
        self.inbox
            .borrow_mut()
            .entry(slot)
            .or_default()
            .push_back(message.into());
    }

    /// Messages sent through websocket primitives as `(slot, bytes, binary)`.
    pub fn websocket_sent(&self) -> Vec<(SlotRef, Vec<u8>, bool)> {
        self.outbox.borrow().clone()
    }

    pub fn set_sharedarea(&self, id: i32, data: impl Into<Vec<u8>>) {
        self.sharedareas.borrow_mut().insert(id, data.into());
    }

    pub fn set_rpc_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &str, &[Vec<u8>]) -> HostResult<Vec<u8>> + 'static,
    {
        *self.rpc_handler.borrow_mut() = Some(Box::new(handler));
    }

    pub fn registered_rpc(&self, name: &str) -> Option<StoredRef> {
        self.rpc_table.borrow().get(name).copied()
    }

    pub fn registered_signal(&self, signum: u8) -> Option<(String, StoredRef)> {
        self.signal_table.borrow().get(&signum).cloned()
    }

    pub fn set_spooler(&self, spooler: bool) {
        self.spooler.set(spooler);
    }

    pub fn is_locked(&self, num: usize) -> bool {
        self.locks.borrow().get(num).copied().unwrap_or(false)
    }

    pub fn is_open(&self, fd: i32) -> bool {
        self.open_fds.borrow().contains(&fd)
    }

    fn record(&self, slot: SlotRef, event: ResponseEvent) {
        self.responses
            .borrow_mut()
            .entry(slot)
            .or_default()
            .events
            .push(event);
    }

    fn push_wait(&self, slot: SlotRef, wait: Wait) {
        self.waits.borrow_mut().entry(slot).or_default().push(wait);
    }

    fn cache_name(cache: Option<&str>) -> &str {
        cache.unwrap_or(DEFAULT_CACHE)
    }
}

impl ResponseWriter for MemoryHost {
    fn prepare_status(&self, slot: SlotRef, status: &[u8]) -> HostResult<()> {
        if self.fail_status.get() {
            return Err(HostError::Failed("unable to prepare response headers".into()));
        }
        self.record(slot, ResponseEvent::Status(status.to_vec()));
        Ok(())
    }

    fn add_header(&self, slot: SlotRef, name: &[u8], value: &[u8]) -> HostResult<()> {
        self.record(slot, ResponseEvent::Header(name.to_vec(), value.to_vec()));
        Ok(())
    }

    fn write_body(&self, slot: SlotRef, chunk: &[u8]) -> HostResult<()> {
        if self.closed.borrow().contains(&slot) {
            return Err(HostError::Closed);
        }
        self.record(slot, ResponseEvent::Body(chunk.to_vec()));
        Ok(())
    }
}

impl AsyncIo for MemoryHost {
    fn add_timeout(&self, slot: SlotRef, timeout: Duration) -> HostResult<()> {
        self.push_wait(slot, Wait::Timeout(timeout));
        Ok(())
    }

    fn add_fd_wait(
        &self,
        slot: SlotRef,
        fd: i32,
        interest: FdInterest,
        timeout: Duration,
    ) -> HostResult<()> {
        if fd < 0 {
            return Err(HostError::Failed(format!("invalid fd {}", fd)));
        }
        self.push_wait(slot, Wait::Fd { fd, interest, timeout });
        Ok(())
    }

    fn ready_fd(&self, slot: SlotRef) -> Option<i32> {
        self.ready.borrow().get(&slot).copied()
    }

    fn connection_fd(&self, slot: SlotRef) -> i32 {
        self.connection_fds.borrow().get(&slot).copied().unwrap_or(-1)
    }

    fn connect(&self, address: &str) -> HostResult<i32> {
        if address.is_empty() {
            return Err(HostError::Failed("empty address".into()));
        }
        let fd = self.next_fd.get();
        self.next_fd.set(fd + 1);
        self.open_fds.borrow_mut().insert(fd);
        tracing::debug!("memory host connected {} as fd {}", address, fd);
        Ok(fd)
    }

    fn is_connected(&self, fd: i32) -> bool {
        self.open_fds.borrow().contains(&fd)
    }

    fn close(&self, fd: i32) {
        self.open_fds.borrow_mut().remove(&fd);
    }
}

impl RequestIo for MemoryHost {
    fn read_body(&self, slot: SlotRef, max: usize) -> HostResult<Vec<u8>> {
        let mut bodies = self.bodies.borrow_mut();
        let Some(body) = bodies.get_mut(&slot) else {
            return Ok(Vec::new());
        };
        let n = if max == 0 { body.len() } else { max.min(body.len()) };
        Ok(body.drain(..n).collect())
    }

    fn websocket_handshake(
        &self,
        slot: SlotRef,
        key: Option<&[u8]>,
        _origin: Option<&[u8]>,
        _proto: Option<&[u8]>,
    ) -> HostResult<()> {
        match key {
            Some(key) if !key.is_empty() => {
                self.handshakes.borrow_mut().insert(slot);
                Ok(())
            }
            _ => Err(HostError::Failed("missing Sec-WebSocket-Key".into())),
        }
    }

    fn websocket_recv(&self, slot: SlotRef, nonblocking: bool) -> HostResult<Vec<u8>> {
        if !self.handshakes.borrow().contains(&slot) {
            return Err(HostError::Failed("no websocket handshake".into()));
        }
        match self.inbox.borrow_mut().get_mut(&slot).and_then(|q| q.pop_front()) {
            Some(message) => Ok(message),
            None if nonblocking => Ok(Vec::new()),
            None => Err(HostError::Closed),
        }
    }

    fn websocket_send(&self, slot: SlotRef, message: &[u8], binary: bool) -> HostResult<()> {
        if !self.handshakes.borrow().contains(&slot) {
            return Err(HostError::Failed("no websocket handshake".into()));
        }
        self.outbox.borrow_mut().push((slot, message.to_vec(), binary));
        Ok(())
    }

    fn websocket_send_from_sharedarea(
        &self,
        slot: SlotRef,
        id: i32,
        pos: u64,
        len: u64,
        binary: bool,
    ) -> HostResult<()> {
        let message = {
            let areas = self.sharedareas.borrow();
            let area = areas
                .get(&id)
                .ok_or_else(|| HostError::Failed(format!("no sharedarea {}", id)))?;
            let start = usize::try_from(pos)
                .ok()
                .filter(|p| *p <= area.len())
                .ok_or_else(|| HostError::Failed(format!("position {} out of range", pos)))?;
            let end = match len {
                0 => area.len(),
                n => start.saturating_add(n as usize).min(area.len()),
            };
            area[start..end].to_vec()
        };
        self.websocket_send(slot, &message, binary)
    }
}

impl HostServices for MemoryHost {
    fn cache_get(&self, key: &[u8], cache: Option<&str>) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.caches
            .borrow()
            .get(Self::cache_name(cache))?
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    fn cache_set(
        &self,
        key: &[u8],
        value: &[u8],
        expires: u64,
        update: bool,
        cache: Option<&str>,
    ) -> HostResult<()> {
        let now = Instant::now();
        let mut caches = self.caches.borrow_mut();
        let store = caches
            .get_mut(Self::cache_name(cache))
            .ok_or_else(|| HostError::Failed(format!("unknown cache {}", Self::cache_name(cache))))?;
        if !update && store.get(key).is_some_and(|e| e.is_live(now)) {
            return Err(HostError::Failed("key already exists".into()));
        }
        let expires_at = (expires > 0).then(|| now + Duration::from_secs(expires));
        store.insert(key.to_vec(), CacheEntry { value: value.to_vec(), expires_at });
        Ok(())
    }

    fn cache_del(&self, key: &[u8], cache: Option<&str>) -> HostResult<()> {
        self.caches
            .borrow_mut()
            .get_mut(Self::cache_name(cache))
            .and_then(|store| store.remove(key))
            .map(|_| ())
            .ok_or_else(|| HostError::Failed("key not found".into()))
    }

    fn cache_exists(&self, key: &[u8], cache: Option<&str>) -> bool {
        self.cache_get(key, cache).is_some()
    }

    fn cache_clear(&self, cache: Option<&str>) -> HostResult<()> {
        let mut caches = self.caches.borrow_mut();
        let store = caches
            .get_mut(Self::cache_name(cache))
            .ok_or_else(|| HostError::Failed(format!("unknown cache {}", Self::cache_name(cache))))?;
        store.clear();
        Ok(())
    }

    fn rpc(&self, node: &str, func: &str, args: &[Vec<u8>]) -> HostResult<Vec<u8>> {
        match self.rpc_handler.borrow().as_ref() {
            Some(handler) => handler(node, func, args),
            None => Err(HostError::Unsupported("rpc transport")),
        }
    }

    fn register_rpc(&self, name: &str, handle: StoredRef) -> HostResult<()> {
        let mut table = self.rpc_table.borrow_mut();
        if table.contains_key(name) {
            return Err(HostError::Failed(format!("rpc function {} already registered", name)));
        }
        table.insert(name.to_string(), handle);
        Ok(())
    }

    fn rpc_handle(&self, name: &str) -> Option<StoredRef> {
        self.registered_rpc(name)
    }

    fn register_signal(&self, signum: u8, target: &str, handle: StoredRef) -> HostResult<()> {
        self.signal_table
            .borrow_mut()
            .insert(signum, (target.to_string(), handle));
        Ok(())
    }

    fn user_locks(&self) -> usize {
        self.locks.borrow().len() - 1
    }

    fn is_spooler(&self) -> bool {
        self.spooler.get()
    }

    fn lock(&self, num: usize) -> HostResult<()> {
        let mut locks = self.locks.borrow_mut();
        let held = locks
            .get_mut(num)
            .ok_or(HostError::InvalidLock(num as i64))?;
        // single-threaded: blocking on a held lock would never return
        if *held {
            return Err(HostError::Failed(format!("lock {} is already held", num)));
        }
        *held = true;
        Ok(())
    }

    fn unlock(&self, num: usize) -> HostResult<()> {
        let mut locks = self.locks.borrow_mut();
        let held = locks
            .get_mut(num)
            .ok_or(HostError::InvalidLock(num as i64))?;
        *held = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> SlotRef {
        SlotRef::new(1, 0)
    }

    #[test]
    fn test_response_capture_order() {
        let host = MemoryHost::new();
        host.prepare_status(slot(), b"200 OK").unwrap();
        host.add_header(slot(), b"Content-Type", b"text/plain").unwrap();
        host.write_body(slot(), b"hello").unwrap();

        let response = host.response(slot());
        assert_eq!(response.status(), Some(&b"200 OK"[..]));
        assert_eq!(response.header_values("Content-Type"), vec!["text/plain"]);
        assert_eq!(response.body(), b"hello");
        assert!(response.headers_precede_body());
    }

    #[test]
    fn test_headers_after_body_detected() {
        let host = MemoryHost::new();
        host.write_body(slot(), b"x").unwrap();
        host.add_header(slot(), b"X-Late", b"1").unwrap();
        assert!(!host.response(slot()).headers_precede_body());
    }

    #[test]
    fn test_closed_connection_rejects_body() {
        let host = MemoryHost::new();
        host.close_connection(slot());
        assert_eq!(host.write_body(slot(), b"x"), Err(HostError::Closed));
    }

    #[test]
    fn test_read_body_in_pieces() {
        let host = MemoryHost::new();
        host.set_request_body(slot(), "abcdef");
        assert_eq!(host.read_body(slot(), 4).unwrap(), b"abcd");
        assert_eq!(host.read_body(slot(), 0).unwrap(), b"ef");
        assert!(host.read_body(slot(), 0).unwrap().is_empty());
    }

    #[test]
    fn test_cache_set_update_and_clear() {
        let host = MemoryHost::new();
        host.cache_set(b"k", b"v1", 0, false, None).unwrap();
        assert!(host.cache_set(b"k", b"v2", 0, false, None).is_err());
        host.cache_set(b"k", b"v2", 0, true, None).unwrap();
        assert_eq!(host.cache_get(b"k", None), Some(b"v2".to_vec()));
        assert!(host.cache_exists(b"k", None));

        host.cache_clear(None).unwrap();
        assert!(!host.cache_exists(b"k", None));
        assert!(host.cache_get(b"k", Some("missing")).is_none());
    }

    #[test]
    fn test_locks_and_range() {
        let host = MemoryHost::with_user_locks(2);
        assert_eq!(host.user_locks(), 2);
        host.lock(2).unwrap();
        assert!(host.is_locked(2));
        assert!(host.lock(2).is_err());
        host.unlock(2).unwrap();
        assert!(!host.is_locked(2));
        assert_eq!(host.lock(3), Err(HostError::InvalidLock(3)));
    }

    #[test]
    fn test_connect_and_close() {
        let host = MemoryHost::new();
        let fd = host.connect("127.0.0.1:6379").unwrap();
        assert!(host.is_connected(fd));
        host.close(fd);
        assert!(!host.is_connected(fd));
    }

    #[test]
    fn test_websocket_requires_handshake() {
        let host = MemoryHost::new();
        assert!(host.websocket_send(slot(), b"hi", false).is_err());
        host.websocket_handshake(slot(), Some(b"key"), None, None).unwrap();
        host.websocket_send(slot(), b"hi", false).unwrap();
        assert_eq!(host.websocket_sent(), vec![(slot(), b"hi".to_vec(), false)]);

        assert!(host.websocket_recv(slot(), true).unwrap().is_empty());
        assert_eq!(host.websocket_recv(slot(), false), Err(HostError::Closed));
    }

    #[test]
    fn test_sharedarea_slice() {
        let host = MemoryHost::new();
        host.set_sharedarea(0, "0123456789");
        host.websocket_handshake(slot(), Some(b"key"), None, None).unwrap();
        host.websocket_send_from_sharedarea(slot(), 0, 2, 3, true).unwrap();
        host.websocket_send_from_sharedarea(slot(), 0, 8, 0, false).unwrap();
        let sent = host.websocket_sent();
        assert_eq!(sent[0].1, b"234");
        assert!(sent[0].2);
        assert_eq!(sent[1].1, b"89");
        assert!(host.websocket_send_from_sharedarea(slot(), 0, 11, 0, false).is_err());
    }

    #[test]
    fn test_rpc_without_handler_is_unsupported() {
        let host = MemoryHost::new();
        assert_eq!(
            host.rpc("", "hello", &[]),
            Err(HostError::Unsupported("rpc transport"))
        );
        host.set_rpc_handler(|_, func, args| Ok(format!("{}:{}", func, args.len()).into_bytes()));
        assert_eq!(host.rpc("", "hello", &[b"a".to_vec()]).unwrap(), b"hello:1");
    }
}
