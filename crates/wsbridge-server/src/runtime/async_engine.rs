//! Async resume engine
//!
//! A streamed response body is a zero-argument function or an iterator
//! object (anything with a callable `next`, generators included). In async
//! mode the body is stepped once per dispatch: each step writes at most one
//! chunk, then the slot is parked in [`AsyncState::Suspended`] holding the
//! body source until the host re-enters it. The continuation is owned by the
//! state value, so dropping the state (recycle, fresh request) is all it
//! takes to abandon it.
//!
//! Step results:
//!
//! | body produced | effect | outcome |
//! |---------------|--------|---------|
//! | string or number | one body chunk, stay suspended | `Again` |
//! | `null` / `undefined` / iterator `done` | nothing written | `Ok` |
//! | any other value | nothing written, stay suspended | `Again` |
//! | thrown error | continuation dropped | `Error` |
//!
//! Without async mode the same source is drained in a loop by [`drain`].

use boa_engine::{js_string, object::JsObject, value::JsValue, Context};
use std::fmt;
use wsbridge_common::host::ResponseWriter;
use wsbridge_common::protocol::{BridgeError, DispatchOutcome, SlotRef};

use crate::runtime::conversions::{callable_of, object_of, to_bytes};
use crate::runtime::interpreter::script_error;

/// Something a streamed body is pulled from.
#[derive(Debug, Clone)]
pub enum BodySource {
    Callable(JsObject),
    Iterator { iterator: JsObject, next: JsObject },
}

/// What one step of a body source produced.
#[derive(Debug)]
pub enum Step {
    Chunk(Vec<u8>),
    /// A value with no byte rendering; nothing to write this time.
    Skip,
    Finished,
    Failed(BridgeError),
}

impl BodySource {
    /// Classifies a response body. Returns `None` for bodies that are not
    /// streamed (strings, numbers, `null`, plain objects).
    pub fn from_body(body: &JsValue, ctx: &mut Context) -> Option<Self> {
        if let Some(callable) = callable_of(body) {
            return Some(Self::Callable(callable));
        }
        let iterator = object_of(body)?;
        let next = iterator.get(js_string!("next"), ctx).ok()?;
        callable_of(&next).map(|next| Self::Iterator { iterator, next })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Callable(_) => "callable",
            Self::Iterator { .. } => "iterator",
        }
    }

    /// Pulls one value from the source.
    pub fn step(&self, ctx: &mut Context) -> Step {
        match self.pull(ctx) {
            Ok(Some(value)) => classify(&value, ctx),
            Ok(None) => Step::Finished,
            Err(e) => Step::Failed(e),
        }
    }

    /// `Ok(None)` once the source is exhausted.
    fn pull(&self, ctx: &mut Context) -> Result<Option<JsValue>, BridgeError> {
        match self {
            Self::Callable(function) => {
                let value = function
                    .call(&JsValue::undefined(), &[], ctx)
                    .map_err(script_error)?;
                Ok((!value.is_null_or_undefined()).then_some(value))
            }
            Self::Iterator { iterator, next } => {
                let result = next
                    .call(&iterator.clone().into(), &[], ctx)
                    .map_err(script_error)?;
                let result = object_of(&result).ok_or_else(|| {
                    BridgeError::JavaScriptExecution(format!(
                        "iterator result {} is not an object",
                        result.display()
                    ))
                })?;
                let done = result
                    .get(js_string!("done"), ctx)
                    .map_err(script_error)?
                    .to_boolean();
                if done {
                    return Ok(None);
                }
                let value = result.get(js_string!("value"), ctx).map_err(script_error)?;
                Ok(Some(value))
            }
        }
    }
}

fn classify(value: &JsValue, ctx: &mut Context) -> Step {
    if value.is_null_or_undefined() {
        return Step::Skip;
    }
    match to_bytes(value, ctx) {
        Ok(Some(bytes)) => Step::Chunk(bytes),
        Ok(None) => Step::Skip,
        Err(e) => Step::Failed(script_error(e)),
    }
}

/// Per-slot position in the async protocol.
#[derive(Debug, Default)]
pub enum AsyncState {
    #[default]
    Idle,
    Running,
    Suspended(BodySource),
    Done,
}

impl AsyncState {
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }

    /// Takes the pending continuation, leaving the slot `Running`. Any other
    /// state is left untouched and `None` is returned.
    pub fn resume(&mut self) -> Option<BodySource> {
        match std::mem::replace(self, Self::Running) {
            Self::Suspended(source) => Some(source),
            other => {
                *self = other;
                None
            }
        }
    }
}

impl fmt::Display for AsyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Suspended(source) => write!(f, "suspended ({})", source.kind()),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Steps `source` once on behalf of `slot`.
///
/// Returns the state the slot moves to and the dispatch outcome.
pub fn step_once(
    source: BodySource,
    slot: SlotRef,
    writer: &(impl ResponseWriter + ?Sized),
    ctx: &mut Context,
) -> (AsyncState, DispatchOutcome) {
    match source.step(ctx) {
        Step::Chunk(chunk) => match writer.write_body(slot, &chunk) {
            Ok(()) => (AsyncState::Suspended(source), DispatchOutcome::Again),
            Err(e) => {
                tracing::warn!("slot {}: body write failed: {}", slot, e);
                (AsyncState::Done, DispatchOutcome::Error)
            }
        },
        Step::Skip => (AsyncState::Suspended(source), DispatchOutcome::Again),
        Step::Finished => (AsyncState::Done, DispatchOutcome::Ok),
        Step::Failed(e) => {
            tracing::error!("slot {}: response body failed: {}", slot, e);
            (AsyncState::Done, DispatchOutcome::Error)
        }
    }
}

/// Consecutive chunks without a rendering after which [`drain`] gives up.
pub const MAX_SKIPPED_CHUNKS: usize = 1024;

/// Pulls `source` to exhaustion, writing every chunk.
pub fn drain(
    source: &BodySource,
    slot: SlotRef,
    writer: &(impl ResponseWriter + ?Sized),
    ctx: &mut Context,
) -> DispatchOutcome {
    let mut skipped = 0;
    loop {
        match source.step(ctx) {
            Step::Chunk(chunk) => {
                skipped = 0;
                if let Err(e) = writer.write_body(slot, &chunk) {
                    tracing::warn!("slot {}: body write failed: {}", slot, e);
                    return DispatchOutcome::Error;
                }
            }
            Step::Skip => {
                skipped += 1;
                if skipped >= MAX_SKIPPED_CHUNKS {
                    tracing::error!(
                        "slot {}: response body produced {} chunks without a rendering",
                        slot, skipped
                    );
                    return DispatchOutcome::Error;
                }
            }
            Step::Finished => return DispatchOutcome::Ok,
            Step::Failed(e) => {
                tracing::error!("slot {}: response body failed: {}", slot, e);
                return DispatchOutcome::Error;
            }
        }
    }
}
