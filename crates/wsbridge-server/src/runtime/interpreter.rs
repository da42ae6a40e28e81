use boa_engine::{js_string, object::JsObject, value::JsValue, Context, JsError, Source};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use wsbridge_common::config::{BridgeConfig, GcMode};
use wsbridge_common::host::Host;
use wsbridge_common::protocol::{
    BridgeError, InstanceId, Request, Result, SlotId, SlotRef, StoredRef,
};

use crate::runtime::bindings::{install_bindings, HostCaptures};
use crate::runtime::conversions::{build_environment, callable_of};
use crate::runtime::entry_point::EntryPoint;
use crate::runtime::registry::ReferenceRegistry;
use crate::runtime::scope::RequestScope;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

pub(crate) fn script_error(e: JsError) -> BridgeError {
    BridgeError::JavaScriptExecution(e.to_string())
}

/// One Boa context with the `wsbridge` bindings, the loaded application and
/// its stored references.
///
/// An interpreter is owned by exactly one slot (or by the cooperative slots
/// of one thread) and never leaves the thread that created it: Boa contexts
/// are not `Send`, and neither is this type.
pub struct Interpreter {
    id: InstanceId,
    owner: SlotRef,
    sid: u32,
    scope: RequestScope,
    registry: Rc<RefCell<ReferenceRegistry>>,
    namespace: JsObject,
    input_read: JsObject,
    entry: EntryPoint,
    ctx: Context,
}

impl Interpreter {
    /// Create a context with the `wsbridge` global installed.
    ///
    /// The entry point starts out as the stub; call [`Interpreter::load`] to
    /// evaluate the application.
    ///
    /// # Arguments
    ///
    /// * `owner` - the slot that owns this instance
    /// * `sid` - process-wide slot number exposed as `wsbridge.mysid`
    /// * `host` - primitives the bindings forward to
    ///
    /// # Errors
    ///
    /// Returns an error if the bindings cannot be installed.
    pub fn new(owner: SlotRef, sid: u32, host: Rc<dyn Host>) -> Result<Self> {
        let id = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let mut ctx = Context::default();
        let scope = RequestScope::default();
        let registry = Rc::new(RefCell::new(ReferenceRegistry::new(id, owner)));

        let captures = HostCaptures::new(host, scope.clone(), registry.clone());
        let api = install_bindings(&mut ctx, &captures, owner.worker, sid)?;

        Ok(Self {
            id,
            owner,
            sid,
            scope,
            registry,
            namespace: api.namespace,
            input_read: api.input_read,
            entry: EntryPoint::Stub,
            ctx,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn owner(&self) -> SlotRef {
        self.owner
    }

    pub fn sid(&self) -> u32 {
        self.sid
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.entry
    }

    pub fn context(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Evaluate the preload files and the application, then cache the entry
    /// point under the reserved registry index.
    ///
    /// Preload failures are logged and skipped. The completion value of the
    /// application is the entry-point candidate; when the application file is
    /// not configured or cannot be read, the completion value of the last
    /// preload that evaluated is used instead. An application that throws, or
    /// a candidate with nothing callable, leaves the stub in place.
    pub fn load(&mut self, config: &BridgeConfig) {
        let mut candidate = JsValue::undefined();
        for file in &config.preload {
            match self.eval_file(file) {
                Ok(value) => candidate = value,
                Err(e) => tracing::error!("unable to load preload file: {}", e),
            }
        }

        let mut app_failed = false;
        if let Some(app) = &config.app {
            match self.eval_file(app) {
                Ok(value) => candidate = value,
                Err(e @ BridgeError::ScriptLoad { .. }) => tracing::error!("{}", e),
                Err(e) => {
                    tracing::error!("application {} failed: {}", app.display(), e);
                    app_failed = true;
                }
            }
        }

        let resolved = if app_failed {
            None
        } else {
            EntryPoint::resolve(&candidate, &mut self.ctx)
        };
        self.entry = resolved.unwrap_or_else(|| {
            tracing::error!(
                "can't find an entry point (no function, nor an object with a callable 'run')"
            );
            EntryPoint::Stub
        });
        self.registry
            .borrow_mut()
            .set_entry_point(self.entry.value());

        tracing::debug!(
            "instance {} for slot {} loaded a {} entry point",
            self.id,
            self.owner,
            self.entry.kind()
        );
    }

    /// Evaluate `source` and return its completion value.
    pub fn eval(&mut self, source: &str) -> Result<JsValue> {
        self.ctx
            .eval(Source::from_bytes(source))
            .map_err(script_error)
    }

    /// Evaluate a file and return its completion value.
    ///
    /// # Errors
    ///
    /// - `BridgeError::ScriptLoad` if the file cannot be read
    /// - `BridgeError::JavaScriptExecution` if evaluation throws
    pub fn eval_file(&mut self, path: &Path) -> Result<JsValue> {
        let source = std::fs::read_to_string(path).map_err(|e| BridgeError::ScriptLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        self.eval(&source)
    }

    /// Build the request environment and call the entry point with it.
    ///
    /// The caller is responsible for entering the request scope first.
    pub fn invoke_entry(&mut self, request: &Request) -> Result<JsValue> {
        let env = build_environment(request, &self.input_read, &mut self.ctx)
            .map_err(script_error)?;
        self.entry
            .invoke(env.into(), &mut self.ctx)
            .map_err(script_error)
    }

    /// Keep `value` alive and return a handle to it.
    pub fn store(&mut self, value: JsValue) -> StoredRef {
        self.registry.borrow_mut().store(value)
    }

    pub fn resolve(&self, handle: StoredRef) -> Result<JsValue> {
        self.registry.borrow().resolve(handle)
    }

    /// Call the stored function behind `handle` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle does not resolve in this instance, if
    /// the stored value is not callable, or if the call throws.
    pub fn call(&mut self, handle: StoredRef, args: &[JsValue]) -> Result<JsValue> {
        let value = self.resolve(handle)?;
        let function = callable_of(&value).ok_or_else(|| {
            BridgeError::InvalidRequest(format!("{} is not callable", handle))
        })?;
        function
            .call(&JsValue::undefined(), args, &mut self.ctx)
            .map_err(script_error)
    }

    /// Record the cooperative slots sharing this instance in
    /// `wsbridge.cores` as `core index -> slot id`.
    pub fn record_cores(&mut self, cores: &[(u16, SlotId)]) -> Result<()> {
        let object = self
            .namespace
            .get(js_string!("cores"), &mut self.ctx)
            .map_err(script_error)?;
        let Some(object) = object.as_object().map(|o| o.clone()) else {
            return Err(BridgeError::JavaScriptExecution(
                "wsbridge.cores is not an object".into(),
            ));
        };
        for (index, slot) in cores {
            object
                .set(usize::from(*index), JsValue::new(i32::from(*slot)), false, &mut self.ctx)
                .map_err(script_error)?;
        }
        Ok(())
    }

    /// Run one collection pass.
    pub fn collect_garbage(&mut self, mode: GcMode) {
        self.ctx.clear_kept_objects();
        if mode == GcMode::Full {
            boa_gc::force_collect();
        }
    }

    /// Render a value for humans (the debug shell).
    pub fn display(&self, value: &JsValue) -> String {
        value.display().to_string()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // registered callbacks would otherwise stay rooted
        self.registry.borrow_mut().clear();
    }
}
