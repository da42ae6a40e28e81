//! Response emission
//!
//! The entry point returns `[status, headers, body]`. A non-array return
//! value is taken as the status alone. Headers are an object mapping a
//! header name to either a value or an array of values (one header line
//! each); the walk of an array stops at the first `null`/`undefined`.

use boa_engine::{value::JsValue, Context, JsResult};
use wsbridge_common::host::ResponseWriter;
use wsbridge_common::protocol::{BridgeError, Result, SlotRef};

use crate::runtime::conversions::{array_elements, object_of, own_entries, to_bytes};
use crate::runtime::interpreter::script_error;

/// The three parts of an entry-point return value.
#[derive(Debug, Clone)]
pub struct ResponseTriple {
    pub status: JsValue,
    pub headers: JsValue,
    pub body: JsValue,
}

impl ResponseTriple {
    pub fn from_value(value: &JsValue, ctx: &mut Context) -> JsResult<Self> {
        let Some(array) = object_of(value).filter(|o| o.is_array()) else {
            return Ok(Self {
                status: value.clone(),
                headers: JsValue::undefined(),
                body: JsValue::undefined(),
            });
        };
        let mut parts = array_elements(&array, ctx)?.into_iter();
        let mut next = || parts.next().unwrap_or_else(JsValue::undefined);
        Ok(Self {
            status: next(),
            headers: next(),
            body: next(),
        })
    }
}

/// Writes the status line and the headers of `triple`.
///
/// A status without a byte rendering is skipped with a warning; so are
/// header values without one. Failing to add a header is logged and the
/// remaining headers are still attempted.
///
/// # Errors
///
/// Returns an error if the host refuses the status line or if reading the
/// headers throws.
pub fn emit_head(
    triple: &ResponseTriple,
    slot: SlotRef,
    writer: &(impl ResponseWriter + ?Sized),
    ctx: &mut Context,
) -> Result<()> {
    match to_bytes(&triple.status, ctx).map_err(script_error)? {
        Some(status) => writer.prepare_status(slot, &status).map_err(BridgeError::Host)?,
        None => tracing::warn!(
            "slot {}: invalid response status {}",
            slot,
            triple.status.display()
        ),
    }

    let Some(headers) = object_of(&triple.headers) else {
        return Ok(());
    };
    for (name, value) in own_entries(&headers, ctx).map_err(script_error)? {
        let values = match object_of(&value).filter(|o| o.is_array()) {
            Some(list) => array_elements(&list, ctx)
                .map_err(script_error)?
                .into_iter()
                .take_while(|v| !v.is_null_or_undefined())
                .collect(),
            None => vec![value],
        };
        for value in values {
            let Some(bytes) = to_bytes(&value, ctx).map_err(script_error)? else {
                tracing::warn!("slot {}: invalid value for header {}", slot, name);
                continue;
            };
            if let Err(e) = writer.add_header(slot, name.as_bytes(), &bytes) {
                tracing::warn!("slot {}: unable to add header {}: {}", slot, name, e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;
    use wsbridge_common::host::MemoryHost;

    fn triple(ctx: &mut Context, src: &str) -> ResponseTriple {
        let value = ctx.eval(Source::from_bytes(src)).unwrap();
        ResponseTriple::from_value(&value, ctx).unwrap()
    }

    fn slot() -> SlotRef {
        SlotRef::new(1, 0)
    }

    #[test]
    fn test_non_array_is_status_only() {
        let mut ctx = Context::default();
        let t = triple(&mut ctx, "'204 No Content'");
        assert!(t.status.is_string());
        assert!(t.headers.is_undefined());
        assert!(t.body.is_undefined());
    }

    #[test]
    fn test_short_array_pads_with_undefined() {
        let mut ctx = Context::default();
        let t = triple(&mut ctx, "['200 OK']");
        assert!(t.headers.is_undefined());
        assert!(t.body.is_undefined());
    }

    #[test]
    fn test_emit_scalar_and_list_headers() {
        let mut ctx = Context::default();
        let host = MemoryHost::new();
        let t = triple(
            &mut ctx,
            "['200 OK', { 'Content-Type': 'text/plain', 'Set-Cookie': ['a=1', 'b=2', null, 'c=3'], 'X-Len': 5 }]",
        );
        emit_head(&t, slot(), &host, &mut ctx).unwrap();

        let response = host.response(slot());
        assert_eq!(response.status(), Some(&b"200 OK"[..]));
        assert_eq!(response.header_values("Content-Type"), vec!["text/plain"]);
        assert_eq!(response.header_values("Set-Cookie"), vec!["a=1", "b=2"]);
        assert_eq!(response.header_values("X-Len"), vec!["5"]);
    }

    #[test]
    fn test_invalid_values_are_skipped() {
        let mut ctx = Context::default();
        let host = MemoryHost::new();
        let t = triple(&mut ctx, "[{}, { 'X-Obj': {}, 'X-Ok': 'yes' }]");
        emit_head(&t, slot(), &host, &mut ctx).unwrap();

        let response = host.response(slot());
        assert!(response.status().is_none());
        assert!(response.header_values("X-Obj").is_empty());
        assert_eq!(response.header_values("X-Ok"), vec!["yes"]);
    }

    #[test]
    fn test_status_refused_by_host() {
        let mut ctx = Context::default();
        let host = MemoryHost::new();
        host.fail_prepare_status(true);
        let t = triple(&mut ctx, "['200 OK', { 'X-A': '1' }]");
        assert!(emit_head(&t, slot(), &host, &mut ctx).is_err());
        assert!(host.response(slot()).header_values("X-A").is_empty());
    }
}
