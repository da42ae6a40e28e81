//! JavaScript bindings for wsbridge
//!
//! This module provides the native functions exposed to application code
//! under the `wsbridge` global. Every function checks its argument count
//! against a fixed range and throws a `TypeError` such as
//! `wsbridge.cache_get takes 1 to 2 parameters` on mismatch.
//!
//! # JavaScript API
//!
//! - `wsbridge.log(line)`
//! - `wsbridge.cache_get/cache_set/cache_update/cache_del/cache_exists/cache_clear`
//! - `wsbridge.rpc(node, func, ...args)`, `wsbridge.register_rpc(name, fn)`,
//!   `wsbridge.register_signal(num, target, fn)`
//! - `wsbridge.lock([num])`, `wsbridge.unlock([num])`
//! - `wsbridge.async_sleep`, `wait_fd_read`, `wait_fd_write`, `async_connect`,
//!   `is_connected`, `close`, `ready_fd`, `connection_fd`, `async_id_get`
//! - `wsbridge.websocket_*`
//! - `wsbridge.req_input_read([max])`, also reachable as `env.input.read`
//!
//! Plus the fields `version`, `mywid`, `mysid` and `cores`.
//!
//! # Request scope
//!
//! Functions that act on "the current request" read the [`RequestScope`]
//! installed by the dispatcher. Called while no request is being served (at
//! load time, from the debug shell) they throw
//! `wsbridge.<name> called outside of a request`.

use boa_engine::{
    native_function::NativeFunction,
    object::{FunctionObjectBuilder, JsObject},
    property::Attribute,
    value::JsValue,
    Context, JsError, JsNativeError, JsResult, JsString,
};
use boa_gc::{Finalize, Trace};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use wsbridge_common::host::{FdInterest, Host};
use wsbridge_common::protocol::{BridgeError, HostResult, Result, SlotRef};

use crate::callbacks::{register_callback, CallbackKind};
use crate::runtime::conversions::{bytes_to_js, callable_of, to_bytes, to_text};
use crate::runtime::registry::ReferenceRegistry;
use crate::runtime::scope::RequestScope;

/// Name of the global the API is installed under.
pub const NAMESPACE: &str = "wsbridge";

/// State shared by every native function of one interpreter instance.
#[derive(Clone, Trace, Finalize)]
pub(crate) struct HostCaptures {
    #[unsafe_ignore_trace]
    host: Rc<dyn Host>,
    #[unsafe_ignore_trace]
    scope: RequestScope,
    #[unsafe_ignore_trace]
    registry: Rc<RefCell<ReferenceRegistry>>,
}

impl HostCaptures {
    pub(crate) fn new(
        host: Rc<dyn Host>,
        scope: RequestScope,
        registry: Rc<RefCell<ReferenceRegistry>>,
    ) -> Self {
        Self {
            host,
            scope,
            registry,
        }
    }
}

type ApiFn = fn(&JsValue, &[JsValue], &HostCaptures, &mut Context) -> JsResult<JsValue>;

/// `(name, declared length, implementation)`
const API: &[(&str, usize, ApiFn)] = &[
    ("log", 1, api_log),
    ("connection_fd", 0, api_connection_fd),
    ("cache_get", 1, api_cache_get),
    ("cache_set", 2, api_cache_set),
    ("cache_update", 2, api_cache_update),
    ("cache_del", 1, api_cache_del),
    ("cache_exists", 1, api_cache_exists),
    ("cache_clear", 0, api_cache_clear),
    ("register_signal", 3, api_register_signal),
    ("register_rpc", 2, api_register_rpc),
    ("rpc", 2, api_rpc),
    ("websocket_handshake", 0, api_websocket_handshake),
    ("websocket_recv", 0, api_websocket_recv),
    ("websocket_recv_nb", 0, api_websocket_recv_nb),
    ("websocket_send", 1, api_websocket_send),
    ("websocket_send_binary", 1, api_websocket_send_binary),
    ("websocket_send_from_sharedarea", 2, api_websocket_send_from_sharedarea),
    (
        "websocket_send_binary_from_sharedarea",
        2,
        api_websocket_send_binary_from_sharedarea,
    ),
    ("lock", 0, api_lock),
    ("unlock", 0, api_unlock),
    ("async_sleep", 1, api_async_sleep),
    ("async_connect", 1, api_async_connect),
    ("async_id_get", 0, api_async_id_get),
    ("is_connected", 1, api_is_connected),
    ("close", 1, api_close),
    ("wait_fd_read", 1, api_wait_fd_read),
    ("wait_fd_write", 1, api_wait_fd_write),
    ("ready_fd", 0, api_ready_fd),
];

/// Objects created by [`install_bindings`] that the interpreter keeps.
pub(crate) struct InstalledApi {
    /// The `wsbridge` global.
    pub namespace: JsObject,
    /// Shared by `wsbridge.req_input_read` and every request's `input.read`.
    pub input_read: JsObject,
}

/// Install the `wsbridge` global into `ctx`.
///
/// # Arguments
///
/// * `ctx` - the instance's context
/// * `captures` - host, request scope and reference registry of the instance
/// * `worker` - value of `wsbridge.mywid`
/// * `sid` - value of `wsbridge.mysid`
///
/// # Errors
///
/// Returns `BridgeError::JavaScriptExecution` if a property cannot be
/// defined or the global cannot be registered.
pub(crate) fn install_bindings(
    ctx: &mut Context,
    captures: &HostCaptures,
    worker: u16,
    sid: u32,
) -> Result<InstalledApi> {
    let namespace = JsObject::with_object_proto(ctx.intrinsics());

    for (name, length, func) in API {
        let function = build_function(ctx, captures, name, *length, *func);
        define(&namespace, name, function.into(), ctx)?;
    }

    let input_read = build_function(ctx, captures, "req_input_read", 0, api_req_input_read);
    define(&namespace, "req_input_read", input_read.clone().into(), ctx)?;

    define(
        &namespace,
        "version",
        JsString::from(env!("CARGO_PKG_VERSION")).into(),
        ctx,
    )?;
    define(&namespace, "mywid", JsValue::new(i32::from(worker)), ctx)?;
    define(&namespace, "mysid", JsValue::new(f64::from(sid)), ctx)?;
    let cores = JsObject::with_object_proto(ctx.intrinsics());
    define(&namespace, "cores", cores.into(), ctx)?;

    ctx.register_global_property(JsString::from(NAMESPACE), namespace.clone(), Attribute::all())
        .map_err(|e| BridgeError::JavaScriptExecution(e.to_string()))?;

    Ok(InstalledApi {
        namespace,
        input_read,
    })
}

fn build_function(
    ctx: &mut Context,
    captures: &HostCaptures,
    name: &str,
    length: usize,
    func: ApiFn,
) -> JsObject {
    FunctionObjectBuilder::new(
        ctx.realm(),
        NativeFunction::from_copy_closure_with_captures(func, captures.clone()),
    )
    .name(JsString::from(name))
    .length(length)
    .build()
    .into()
}

fn define(target: &JsObject, name: &str, value: JsValue, ctx: &mut Context) -> Result<()> {
    target
        .set(JsString::from(name), value, false, ctx)
        .map(|_| ())
        .map_err(|e| BridgeError::JavaScriptExecution(e.to_string()))
}

// ---------------------------------------------------------------------------
// argument helpers
// ---------------------------------------------------------------------------

fn check_args(name: &str, args: &[JsValue], min: usize, max: Option<usize>) -> JsResult<()> {
    let n = args.len();
    let ok = n >= min && max.map_or(true, |max| n <= max);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(max) if max == min && min == 1 => "1 parameter".to_string(),
        Some(max) if max == min => format!("{} parameters", min),
        Some(max) => format!("{} to {} parameters", min, max),
        None => format!("at least {} parameters", min),
    };
    Err(JsNativeError::typ()
        .with_message(format!("{}.{} takes {}", NAMESPACE, name, expected))
        .into())
}

fn throw(message: impl Into<String>) -> JsError {
    JsNativeError::error().with_message(message.into()).into()
}

fn current_slot(name: &str, captures: &HostCaptures) -> JsResult<SlotRef> {
    captures.scope.current().ok_or_else(|| {
        throw(format!("{}.{} called outside of a request", NAMESPACE, name))
    })
}

fn arg(args: &[JsValue], i: usize) -> Option<&JsValue> {
    args.get(i).filter(|v| !v.is_null_or_undefined())
}

fn arg_bytes(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<Option<Vec<u8>>> {
    match arg(args, i) {
        Some(v) => to_bytes(v, ctx),
        None => Ok(None),
    }
}

fn arg_text(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<Option<String>> {
    match arg(args, i) {
        Some(v) => to_text(v, ctx),
        None => Ok(None),
    }
}

/// Numeric coercion the way JavaScript does it; absent arguments are `None`.
fn arg_number(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<Option<f64>> {
    match arg(args, i) {
        Some(v) => v.to_number(ctx).map(Some),
        None => Ok(None),
    }
}

fn arg_fd(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<i32> {
    Ok(arg_number(args, i, ctx)?
        .filter(|n| n.is_finite())
        .map_or(-1, |n| n as i32))
}

/// Non-negative whole seconds or fractions thereof; negative or non-finite
/// values yield `None`.
fn arg_duration(args: &[JsValue], i: usize, ctx: &mut Context) -> JsResult<Option<Duration>> {
    Ok(arg_number(args, i, ctx)?.and_then(|secs| Duration::try_from_secs_f64(secs).ok()))
}

fn ok_or_null(result: HostResult<()>, what: &str) -> JsValue {
    match result {
        Ok(()) => JsValue::new(true),
        Err(e) => {
            tracing::debug!("{} failed: {}", what, e);
            JsValue::null()
        }
    }
}

// ---------------------------------------------------------------------------
// logging and cache
// ---------------------------------------------------------------------------

fn api_log(_this: &JsValue, args: &[JsValue], _c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("log", args, 1, Some(1))?;
    if let Some(line) = arg_text(args, 0, ctx)? {
        tracing::info!(target: "wsbridge::app", "{}", line);
    }
    Ok(JsValue::undefined())
}

fn api_cache_get(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("cache_get", args, 1, Some(2))?;
    let Some(key) = arg_bytes(args, 0, ctx)? else {
        return Ok(JsValue::null());
    };
    let cache = arg_text(args, 1, ctx)?;
    Ok(c.host
        .cache_get(&key, cache.as_deref())
        .map_or(JsValue::null(), |v| bytes_to_js(&v)))
}

fn cache_store(name: &str, update: bool, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args(name, args, 2, Some(4))?;
    let (Some(key), Some(value)) = (arg_bytes(args, 0, ctx)?, arg_bytes(args, 1, ctx)?) else {
        return Ok(JsValue::null());
    };
    let expires = arg_number(args, 2, ctx)?
        .filter(|n| n.is_finite() && *n > 0.0)
        .map_or(0, |n| n as u64);
    let cache = arg_text(args, 3, ctx)?;
    Ok(ok_or_null(
        c.host.cache_set(&key, &value, expires, update, cache.as_deref()),
        name,
    ))
}

fn api_cache_set(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    cache_store("cache_set", false, args, c, ctx)
}

fn api_cache_update(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    cache_store("cache_update", true, args, c, ctx)
}

fn api_cache_del(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("cache_del", args, 1, Some(2))?;
    let Some(key) = arg_bytes(args, 0, ctx)? else {
        return Ok(JsValue::null());
    };
    let cache = arg_text(args, 1, ctx)?;
    Ok(ok_or_null(c.host.cache_del(&key, cache.as_deref()), "cache_del"))
}

fn api_cache_exists(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("cache_exists", args, 1, Some(2))?;
    let Some(key) = arg_bytes(args, 0, ctx)? else {
        return Ok(JsValue::null());
    };
    let cache = arg_text(args, 1, ctx)?;
    if c.host.cache_exists(&key, cache.as_deref()) {
        Ok(JsValue::new(true))
    } else {
        Ok(JsValue::null())
    }
}

fn api_cache_clear(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("cache_clear", args, 0, Some(1))?;
    let cache = arg_text(args, 0, ctx)?;
    Ok(ok_or_null(c.host.cache_clear(cache.as_deref()), "cache_clear"))
}

// ---------------------------------------------------------------------------
// rpc, signals, locks
// ---------------------------------------------------------------------------

fn api_rpc(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("rpc", args, 2, None)?;
    let node = arg_text(args, 0, ctx)?.unwrap_or_default();
    let Some(func) = arg_text(args, 1, ctx)? else {
        return Ok(JsValue::null());
    };
    let mut call_args = Vec::with_capacity(args.len() - 2);
    for value in &args[2..] {
        call_args.push(to_bytes(value, ctx)?.unwrap_or_default());
    }

    if node.is_empty() {
        if let Some(result) = call_local_rpc(&func, &call_args, c, ctx) {
            return Ok(result);
        }
    }

    match c.host.rpc(&node, &func, &call_args) {
        Ok(result) if !result.is_empty() => Ok(bytes_to_js(&result)),
        Ok(_) => Ok(JsValue::null()),
        Err(e) => {
            tracing::warn!("rpc {}@{} failed: {}", func, node, e);
            Ok(JsValue::null())
        }
    }
}

/// Runs `func` on the calling context when this instance registered it.
/// Returns `None` to leave the call to the host.
fn call_local_rpc(func: &str, args: &[Vec<u8>], c: &HostCaptures, ctx: &mut Context) -> Option<JsValue> {
    let handle = c.host.rpc_handle(func)?;
    let callable = c.registry.borrow().resolve(handle).ok().as_ref().and_then(callable_of)?;
    let js_args: Vec<JsValue> = args.iter().map(|a| bytes_to_js(a)).collect();

    let value = match callable.call(&JsValue::undefined(), &js_args, ctx) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("rpc {} failed: {}", func, e);
            return Some(JsValue::null());
        }
    };
    if value.is_null_or_undefined() {
        return Some(JsValue::null());
    }
    match to_bytes(&value, ctx) {
        Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes_to_js(&bytes)),
        Ok(_) => Some(JsValue::null()),
        Err(e) => {
            tracing::warn!("rpc {} result failed: {}", func, e);
            Some(JsValue::null())
        }
    }
}

fn api_register_rpc(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("register_rpc", args, 2, Some(2))?;
    let Some(name) = arg_text(args, 0, ctx)? else {
        return Ok(JsValue::null());
    };
    let kind = CallbackKind::Rpc { name };
    match register_callback(c.host.as_ref(), &c.registry, &kind, args[1].clone()) {
        Ok(_) => Ok(JsValue::new(true)),
        Err(e) => {
            tracing::warn!("unable to register {}: {}", kind, e);
            Ok(JsValue::null())
        }
    }
}

fn api_register_signal(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("register_signal", args, 3, Some(3))?;
    let signum = arg_number(args, 0, ctx)?
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u8::MAX));
    let target = arg_text(args, 1, ctx)?.unwrap_or_default();
    match signum {
        Some(signum) => {
            let kind = CallbackKind::Signal {
                signum: signum as u8,
                target,
            };
            if let Err(e) = register_callback(c.host.as_ref(), &c.registry, &kind, args[2].clone()) {
                tracing::warn!("unable to register {}: {}", kind, e);
            }
        }
        None => tracing::warn!("register_signal: invalid signal number"),
    }
    Ok(JsValue::null())
}

/// Validates a lock index against the host's lock table (lock 0 is always
/// present, user locks are `1..=user_locks()`).
fn lock_index(name: &str, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<usize> {
    check_args(name, args, 0, Some(1))?;
    if c.host.is_spooler() {
        return Err(throw("The spooler cannot lock/unlock resources"));
    }
    let Some(value) = args.first() else {
        return Ok(0);
    };
    let num = if value.is_number() {
        value.to_number(ctx)?
    } else {
        -1.0
    };
    if num < 0.0 || num.fract() != 0.0 || num > c.host.user_locks() as f64 {
        return Err(throw("Invalid lock number"));
    }
    Ok(num as usize)
}

fn api_lock(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    let num = lock_index("lock", args, c, ctx)?;
    c.host.lock(num).map_err(|e| throw(e.to_string()))?;
    Ok(JsValue::undefined())
}

fn api_unlock(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    let num = lock_index("unlock", args, c, ctx)?;
    c.host.unlock(num).map_err(|e| throw(e.to_string()))?;
    Ok(JsValue::undefined())
}

// ---------------------------------------------------------------------------
// async I/O
// ---------------------------------------------------------------------------

fn api_async_sleep(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("async_sleep", args, 1, Some(1))?;
    let slot = current_slot("async_sleep", c)?;
    if let Some(timeout) = arg_duration(args, 0, ctx)? {
        c.host
            .add_timeout(slot, timeout)
            .map_err(|_| throw("unable to call async_add_timeout()"))?;
    }
    Ok(JsValue::null())
}

fn wait_fd(name: &str, interest: FdInterest, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args(name, args, 1, Some(2))?;
    let slot = current_slot(name, c)?;
    let fd = arg_fd(args, 0, ctx)?;
    let timeout = arg_duration(args, 1, ctx)?.unwrap_or_default();
    if c.host.add_fd_wait(slot, fd, interest, timeout).is_err() {
        let primitive = match interest {
            FdInterest::Read => "async_add_fd_read",
            FdInterest::Write => "async_add_fd_write",
        };
        return Err(throw(format!("unable to call {}()", primitive)));
    }
    Ok(JsValue::null())
}

fn api_wait_fd_read(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    wait_fd("wait_fd_read", FdInterest::Read, args, c, ctx)
}

fn api_wait_fd_write(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    wait_fd("wait_fd_write", FdInterest::Write, args, c, ctx)
}

fn api_async_connect(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("async_connect", args, 1, Some(1))?;
    let address = arg_text(args, 0, ctx)?.unwrap_or_default();
    let fd = c.host.connect(&address).unwrap_or_else(|e| {
        tracing::debug!("async_connect {} failed: {}", address, e);
        -1
    });
    Ok(JsValue::new(fd))
}

fn api_is_connected(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("is_connected", args, 1, Some(1))?;
    let fd = arg_fd(args, 0, ctx)?;
    Ok(JsValue::new(fd >= 0 && c.host.is_connected(fd)))
}

fn api_close(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("close", args, 1, Some(1))?;
    let fd = arg_fd(args, 0, ctx)?;
    if fd >= 0 {
        c.host.close(fd);
    }
    Ok(JsValue::null())
}

fn api_ready_fd(_this: &JsValue, args: &[JsValue], c: &HostCaptures, _ctx: &mut Context) -> JsResult<JsValue> {
    check_args("ready_fd", args, 0, Some(0))?;
    let slot = current_slot("ready_fd", c)?;
    Ok(JsValue::new(c.host.ready_fd(slot).unwrap_or(-1)))
}

fn api_connection_fd(_this: &JsValue, args: &[JsValue], c: &HostCaptures, _ctx: &mut Context) -> JsResult<JsValue> {
    check_args("connection_fd", args, 0, Some(0))?;
    let slot = current_slot("connection_fd", c)?;
    Ok(JsValue::new(c.host.connection_fd(slot)))
}

fn api_async_id_get(_this: &JsValue, args: &[JsValue], c: &HostCaptures, _ctx: &mut Context) -> JsResult<JsValue> {
    check_args("async_id_get", args, 0, Some(0))?;
    let slot = current_slot("async_id_get", c)?;
    Ok(JsValue::new(i32::from(slot.slot)))
}

// ---------------------------------------------------------------------------
// websockets
// ---------------------------------------------------------------------------

fn api_websocket_handshake(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("websocket_handshake", args, 0, Some(3))?;
    let slot = current_slot("websocket_handshake", c)?;
    let key = arg_bytes(args, 0, ctx)?;
    let origin = arg_bytes(args, 1, ctx)?;
    let proto = arg_bytes(args, 2, ctx)?;
    c.host
        .websocket_handshake(slot, key.as_deref(), origin.as_deref(), proto.as_deref())
        .map_err(|_| throw("unable to complete websocket handshake"))?;
    Ok(JsValue::null())
}

fn websocket_recv(name: &str, nonblocking: bool, args: &[JsValue], c: &HostCaptures) -> JsResult<JsValue> {
    check_args(name, args, 0, Some(0))?;
    let slot = current_slot(name, c)?;
    let message = c
        .host
        .websocket_recv(slot, nonblocking)
        .map_err(|_| throw("unable to receive websocket message"))?;
    Ok(bytes_to_js(&message))
}

fn api_websocket_recv(_this: &JsValue, args: &[JsValue], c: &HostCaptures, _ctx: &mut Context) -> JsResult<JsValue> {
    websocket_recv("websocket_recv", false, args, c)
}

fn api_websocket_recv_nb(_this: &JsValue, args: &[JsValue], c: &HostCaptures, _ctx: &mut Context) -> JsResult<JsValue> {
    websocket_recv("websocket_recv_nb", true, args, c)
}

fn websocket_send(name: &str, binary: bool, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args(name, args, 1, Some(1))?;
    let slot = current_slot(name, c)?;
    let failure = if binary {
        "unable to send websocket binary message"
    } else {
        "unable to send websocket message"
    };
    let message = arg_bytes(args, 0, ctx)?.ok_or_else(|| throw(failure))?;
    c.host
        .websocket_send(slot, &message, binary)
        .map_err(|_| throw(failure))?;
    Ok(JsValue::null())
}

fn api_websocket_send(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    websocket_send("websocket_send", false, args, c, ctx)
}

fn api_websocket_send_binary(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    websocket_send("websocket_send_binary", true, args, c, ctx)
}

fn send_from_sharedarea(name: &str, binary: bool, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args(name, args, 2, Some(3))?;
    let slot = current_slot(name, c)?;
    let failure = || throw("unable to send websocket message from sharedarea");
    let id = arg_number(args, 0, ctx)?
        .filter(|n| n.is_finite())
        .ok_or_else(failure)? as i32;
    let pos = arg_number(args, 1, ctx)?
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(failure)? as u64;
    let len = arg_number(args, 2, ctx)?
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map_or(0, |n| n as u64);
    c.host
        .websocket_send_from_sharedarea(slot, id, pos, len, binary)
        .map_err(|_| failure())?;
    Ok(JsValue::null())
}

fn api_websocket_send_from_sharedarea(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    send_from_sharedarea("websocket_send_from_sharedarea", false, args, c, ctx)
}

fn api_websocket_send_binary_from_sharedarea(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    send_from_sharedarea("websocket_send_binary_from_sharedarea", true, args, c, ctx)
}

// ---------------------------------------------------------------------------
// request body
// ---------------------------------------------------------------------------

fn api_req_input_read(_this: &JsValue, args: &[JsValue], c: &HostCaptures, ctx: &mut Context) -> JsResult<JsValue> {
    check_args("req_input_read", args, 0, Some(1))?;
    let slot = current_slot("req_input_read", c)?;
    let max = arg_number(args, 0, ctx)?
        .filter(|n| n.is_finite() && *n > 0.0)
        .map_or(0, |n| n as usize);
    match c.host.read_body(slot, max) {
        Ok(body) => Ok(bytes_to_js(&body)),
        Err(e) => {
            tracing::debug!("request body read failed on slot {}: {}", slot, e);
            Ok(JsValue::null())
        }
    }
}
