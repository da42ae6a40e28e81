use std::time::Instant;
use wsbridge_common::host::Host;
use wsbridge_common::protocol::{AsyncStatus, DispatchOutcome, Request, Result, SlotRef, StoredRef};

use crate::callbacks;
use crate::gc::GcPolicy;
use crate::response::{emit_head, ResponseTriple};
use crate::runtime::async_engine::{drain, step_once, AsyncState, BodySource};
use crate::runtime::conversions::to_bytes;
use crate::runtime::interpreter::Interpreter;
use crate::runtime::slot_pool::SlotPool;

/// Drives request cycles on the slots of a [`SlotPool`].
///
/// The host calls [`Dispatcher::dispatch`] once per request, and again for
/// every `Again` it was handed back, always on the thread that owns the pool.
pub struct Dispatcher {
    pool: SlotPool,
    gc: GcPolicy,
}

impl Dispatcher {
    pub fn new(pool: SlotPool) -> Self {
        let gc = GcPolicy::from_config(pool.config());
        Self { pool, gc }
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut SlotPool {
        &mut self.pool
    }

    pub fn gc_policy(&self) -> GcPolicy {
        self.gc
    }

    /// Runs one step of the request cycle of `slot`.
    ///
    /// A fresh request invokes the entry point, emits the status line and
    /// headers, then the body. A streamed body in async mode produces
    /// `Again`; the request is marked [`AsyncStatus::Again`] and the host
    /// dispatches it again once its wait fires. Any other result completes
    /// the cycle: the slot goes back to idle, the collection policy runs and
    /// the request is reset to [`AsyncStatus::Fresh`].
    ///
    /// Requests rejected before a cycle starts (unknown or busy slot, empty
    /// payload, `Again` with nothing to resume) return `Error` without
    /// touching the slot's counters.
    ///
    /// # Arguments
    ///
    /// * `slot` - the slot the host picked for this request
    /// * `request` - parsed request variables and async status
    pub fn dispatch(&mut self, slot: SlotRef, request: &mut Request) -> DispatchOutcome {
        let Some(instance) = self.pool.instance(slot) else {
            tracing::error!("dispatch on unknown slot {}", slot);
            return DispatchOutcome::Error;
        };
        let Ok(mut interp) = instance.try_borrow_mut() else {
            tracing::error!("slot {} is already executing", slot);
            return DispatchOutcome::Error;
        };

        let start_time = Instant::now();
        let _scope = interp.scope().enter(slot);

        let outcome = if request.is_again() {
            self.resume(slot, &mut interp)
        } else {
            self.start(slot, request, &mut interp)
        };
        let Some(outcome) = outcome else {
            return DispatchOutcome::Error;
        };

        if outcome == DispatchOutcome::Again {
            request.async_status = AsyncStatus::Again;
            tracing::debug!("slot {} suspended", slot);
            return outcome;
        }

        self.complete(slot, &mut interp);
        request.async_status = AsyncStatus::Fresh;
        tracing::info!(
            "slot {} finished with {:?} in {:?}",
            slot,
            outcome,
            start_time.elapsed()
        );
        outcome
    }

    /// Drops any continuation held by `slot`.
    pub fn recycle(&mut self, slot: SlotRef) -> Result<()> {
        self.pool.recycle(slot)
    }

    /// Fires a registered signal handler on the instance of `current`.
    pub fn invoke_signal(&self, current: SlotRef, handle: StoredRef, signum: u8) -> Result<()> {
        callbacks::invoke_signal(&self.pool, current, handle, signum)
    }

    /// Runs a registered RPC function on the instance of `current`.
    pub fn invoke_rpc(&self, current: SlotRef, handle: StoredRef, args: &[Vec<u8>]) -> Vec<u8> {
        callbacks::invoke_rpc(&self.pool, current, handle, args)
    }

    fn resume(&mut self, slot: SlotRef, interp: &mut Interpreter) -> Option<DispatchOutcome> {
        let host = self.pool.host().clone();
        let source = self.pool.slot_mut(slot)?.state.resume();
        let Some(source) = source else {
            tracing::error!("slot {}: async re-entry without a pending response", slot);
            return None;
        };
        let (state, outcome) = step_once(source, slot, &*host, interp.context());
        self.set_state(slot, state);
        Some(outcome)
    }

    fn start(
        &mut self,
        slot: SlotRef,
        request: &Request,
        interp: &mut Interpreter,
    ) -> Option<DispatchOutcome> {
        if request.payload_len == 0 {
            tracing::error!("slot {}: empty request", slot);
            return None;
        }
        let host = self.pool.host().clone();
        let cell = self.pool.slot_mut(slot)?;
        if cell.is_suspended() {
            tracing::debug!("slot {}: fresh request, dropping the previous response", slot);
        }
        cell.state = AsyncState::Running;

        let value = match interp.invoke_entry(request) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("slot {}: {}", slot, e);
                return Some(DispatchOutcome::Error);
            }
        };
        let triple = match ResponseTriple::from_value(&value, interp.context()) {
            Ok(triple) => triple,
            Err(e) => {
                tracing::error!("slot {}: invalid response: {}", slot, e);
                return Some(DispatchOutcome::Error);
            }
        };
        if let Err(e) = emit_head(&triple, slot, &*host, interp.context()) {
            tracing::error!("slot {}: unable to emit response headers: {}", slot, e);
            return Some(DispatchOutcome::Error);
        }
        Some(self.emit_body(slot, &triple, &*host, interp))
    }

    fn emit_body(
        &mut self,
        slot: SlotRef,
        triple: &ResponseTriple,
        host: &dyn Host,
        interp: &mut Interpreter,
    ) -> DispatchOutcome {
        let ctx = interp.context();
        if let Some(source) = BodySource::from_body(&triple.body, ctx) {
            if !self.pool.layout().async_enabled {
                return drain(&source, slot, host, ctx);
            }
            let (state, outcome) = step_once(source, slot, host, ctx);
            self.set_state(slot, state);
            return outcome;
        }

        if triple.body.is_null_or_undefined() {
            return DispatchOutcome::Ok;
        }
        match to_bytes(&triple.body, ctx) {
            Ok(Some(body)) => match host.write_body(slot, &body) {
                Ok(()) => DispatchOutcome::Ok,
                Err(e) => {
                    tracing::warn!("slot {}: body write failed: {}", slot, e);
                    DispatchOutcome::Error
                }
            },
            Ok(None) => {
                tracing::warn!("slot {}: unsupported response body {}", slot, triple.body.display());
                DispatchOutcome::Ok
            }
            Err(e) => {
                tracing::error!("slot {}: response body failed: {}", slot, e);
                DispatchOutcome::Error
            }
        }
    }

    fn set_state(&mut self, slot: SlotRef, state: AsyncState) {
        if let Some(cell) = self.pool.slot_mut(slot) {
            cell.state = state;
        }
    }

    /// Ends a request cycle: back to idle, then collect if the policy says so.
    fn complete(&mut self, slot: SlotRef, interp: &mut Interpreter) {
        self.set_state(slot, AsyncState::Idle);
        let count = self.pool.complete_cycle(slot);
        if self.gc.should_collect(count) {
            interp.collect_garbage(self.gc.mode());
            self.pool.record_gc(slot);
            tracing::debug!("slot {}: collected after {} request(s)", slot, count);
        }
    }
}
