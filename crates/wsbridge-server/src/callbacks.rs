//! Signal and RPC callbacks
//!
//! Applications register functions with the host through
//! `wsbridge.register_signal` and `wsbridge.register_rpc`. The function is
//! kept alive in the instance's reference registry and the host only sees
//! the resulting [`StoredRef`]. When the host later fires the callback it
//! names the slot it is running on; the handle is resolved against that
//! slot's instance, never against the registering one.

use boa_engine::value::JsValue;
use std::cell::RefCell;
use std::fmt;
use wsbridge_common::host::Host;
use wsbridge_common::protocol::{BridgeError, Result, SlotRef, StoredRef};

use crate::runtime::conversions::{bytes_to_js, callable_of, to_bytes};
use crate::runtime::registry::ReferenceRegistry;
use crate::runtime::slot_pool::SlotPool;

/// What a callable is being registered as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackKind {
    Signal { signum: u8, target: String },
    Rpc { name: String },
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal { signum, target } => write!(f, "signal {} ({})", signum, target),
            Self::Rpc { name } => write!(f, "rpc function {}", name),
        }
    }
}

/// Store `callable` and register the resulting handle with the host.
///
/// # Errors
///
/// - `BridgeError::InvalidRequest` if `callable` is not a function
/// - `BridgeError::Host` if the host rejects the registration
pub fn register_callback(
    host: &dyn Host,
    registry: &RefCell<ReferenceRegistry>,
    kind: &CallbackKind,
    callable: JsValue,
) -> Result<StoredRef> {
    if callable_of(&callable).is_none() {
        return Err(BridgeError::InvalidRequest(format!(
            "{} needs a function",
            kind
        )));
    }
    let handle = registry.borrow_mut().store(callable);
    let registered = match kind {
        CallbackKind::Signal { signum, target } => host.register_signal(*signum, target, handle),
        CallbackKind::Rpc { name } => host.register_rpc(name, handle),
    };
    if let Err(e) = registered {
        registry.borrow_mut().release(handle);
        return Err(e.into());
    }
    tracing::debug!("registered {} as {}", kind, handle);
    Ok(handle)
}

/// Run a registered signal handler on the instance of `current`, passing the
/// signal number.
///
/// Errors thrown by the handler are logged and reported as
/// `BridgeError::JavaScriptExecution`.
pub fn invoke_signal(
    pool: &SlotPool,
    current: SlotRef,
    handle: StoredRef,
    signum: u8,
) -> Result<()> {
    let instance = pool.instance(current).ok_or(BridgeError::UnknownSlot(current))?;
    let mut interp = instance
        .try_borrow_mut()
        .map_err(|_| BridgeError::SlotBusy(current))?;
    let _scope = interp.scope().enter(current);
    let result = interp.call(handle, &[JsValue::new(i32::from(signum))]);
    if let Err(e) = &result {
        tracing::error!("slot {}: signal {} handler failed: {}", current, signum, e);
    }
    result.map(|_| ())
}

/// Run a registered RPC function on the instance of `current`.
///
/// Arguments arrive as strings. The result is the byte rendering of the
/// return value; `null`, `undefined`, values without a rendering and any
/// failure all produce an empty buffer.
pub fn invoke_rpc(pool: &SlotPool, current: SlotRef, handle: StoredRef, args: &[Vec<u8>]) -> Vec<u8> {
    let Some(instance) = pool.instance(current) else {
        tracing::error!("rpc {}: unknown slot {}", handle, current);
        return Vec::new();
    };
    let Ok(mut interp) = instance.try_borrow_mut() else {
        tracing::error!("rpc {}: slot {} is busy", handle, current);
        return Vec::new();
    };
    let _scope = interp.scope().enter(current);
    let js_args: Vec<JsValue> = args.iter().map(|a| bytes_to_js(a)).collect();

    let value = match interp.call(handle, &js_args) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("slot {}: rpc {} failed: {}", current, handle, e);
            return Vec::new();
        }
    };
    if value.is_null_or_undefined() {
        return Vec::new();
    }
    match to_bytes(&value, interp.context()) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::error!("slot {}: rpc {} result failed: {}", current, handle, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use wsbridge_common::config::{BridgeConfig, WorkerLayout};
    use wsbridge_common::host::MemoryHost;

    fn create_test_script(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn setup(app: &str, workers: u16) -> (SlotPool, Rc<MemoryHost>, NamedTempFile) {
        let script = create_test_script(app);
        let host = Rc::new(MemoryHost::new());
        let layout = WorkerLayout { workers, ..WorkerLayout::default() };
        let mut pool = SlotPool::new(BridgeConfig::new().with_app(script.path()), layout, host.clone()).unwrap();
        pool.initialize_all().unwrap();
        (pool, host, script)
    }

    #[test]
    fn test_register_rejects_non_callable() {
        let host = MemoryHost::new();
        let registry = RefCell::new(ReferenceRegistry::new(1, SlotRef::new(1, 0)));
        let kind = CallbackKind::Rpc { name: "x".into() };
        let result = register_callback(&host, &registry, &kind, JsValue::new(3));
        assert!(matches!(result, Err(BridgeError::InvalidRequest(_))));
        assert!(host.registered_rpc("x").is_none());
    }

    #[test]
    fn test_refused_registration_is_released() {
        let host = MemoryHost::new();
        let registry = RefCell::new(ReferenceRegistry::new(1, SlotRef::new(1, 0)));
        let kind = CallbackKind::Rpc { name: "dup".into() };
        let mut ctx = boa_engine::Context::default();
        let func = ctx
            .eval(boa_engine::Source::from_bytes("(function() {})"))
            .unwrap();

        let first = register_callback(&host, &registry, &kind, func.clone()).unwrap();
        assert!(matches!(
            register_callback(&host, &registry, &kind, func),
            Err(BridgeError::Host(_))
        ));
        assert_eq!(registry.borrow().len(), 1);
        assert_eq!(host.registered_rpc("dup"), Some(first));
    }

    #[test]
    fn test_kind_display() {
        let kind = CallbackKind::Signal { signum: 17, target: "workers".into() };
        assert_eq!(kind.to_string(), "signal 17 (workers)");
    }

    #[test]
    fn test_rpc_roundtrip_through_host_table() {
        let (pool, host, _script) = setup(
            "wsbridge.register_rpc('concat', function(a, b) { return a + '-' + b; });\n\
             (function(env) { return '200 OK'; })",
            1,
        );
        let handle = host.registered_rpc("concat").unwrap();
        let out = invoke_rpc(&pool, SlotRef::new(1, 0), handle, &[b"x".to_vec(), b"y".to_vec()]);
        assert_eq!(out, b"x-y");
    }

    #[test]
    fn test_rpc_null_and_error_give_empty() {
        let (pool, host, _script) = setup(
            "wsbridge.register_rpc('nothing', function() { return null; });\n\
             wsbridge.register_rpc('broken', function() { throw new Error('x'); });\n\
             (function(env) { return '200 OK'; })",
            1,
        );
        let slot = SlotRef::new(1, 0);
        assert!(invoke_rpc(&pool, slot, host.registered_rpc("nothing").unwrap(), &[]).is_empty());
        assert!(invoke_rpc(&pool, slot, host.registered_rpc("broken").unwrap(), &[]).is_empty());
    }

    #[test]
    fn test_handle_from_other_worker_is_rejected() {
        let (pool, host, _script) = setup(
            "if (wsbridge.mywid == 1) wsbridge.register_rpc('one', function() { return 'w1'; });\n\
             (function(env) { return '200 OK'; })",
            2,
        );
        let handle = host.registered_rpc("one").unwrap();
        assert_eq!(invoke_rpc(&pool, SlotRef::new(1, 0), handle, &[]), b"w1");
        assert!(invoke_rpc(&pool, SlotRef::new(2, 0), handle, &[]).is_empty());
    }

    #[test]
    fn test_signal_handler_sees_signum() {
        let (pool, host, _script) = setup(
            "var seen = 0;\n\
             wsbridge.register_signal(17, 'workers', function(n) { seen = n; });\n\
             (function(env) { return String(seen); })",
            1,
        );
        let (target, handle) = host.registered_signal(17).unwrap();
        assert_eq!(target, "workers");
        invoke_signal(&pool, SlotRef::new(1, 0), handle, 17).unwrap();

        let instance = pool.instance(SlotRef::new(1, 0)).unwrap();
        let mut interp = instance.borrow_mut();
        let seen = interp.eval("seen").unwrap();
        assert_eq!(interp.display(&seen), "17");
    }

    #[test]
    fn test_signal_on_unknown_slot() {
        let (pool, host, _script) = setup(
            "wsbridge.register_signal(1, '', function() {});\n(function() {})",
            1,
        );
        let (_, handle) = host.registered_signal(1).unwrap();
        assert!(matches!(
            invoke_signal(&pool, SlotRef::new(9, 0), handle, 1),
            Err(BridgeError::UnknownSlot(_))
        ));
    }
}
