//! Host <-> JavaScript value conversions
//!
//! Everything that crosses the boundary is a byte string on the host side.
//! This module maps those bytes onto JavaScript strings and back, and builds
//! the per-request environment object handed to the entry point.
//!
//! # Type Mapping
//!
//! | Host | JavaScript |
//! |------|------------|
//! | bytes (UTF-8, lossy) | String |
//! | bytes | Number, rendered the way JavaScript prints it |
//! | absent | `null` / `undefined` |
//!
//! Objects, functions, booleans and symbols have no byte rendering; callers
//! decide whether that is an error, a warning or a skipped value.

use boa_engine::{
    js_string,
    object::{builtins::JsArray, JsObject},
    property::PropertyKey,
    value::JsValue,
    Context, JsResult, JsString,
};
use wsbridge_common::protocol::Request;

/// Renders `value` as bytes if it is a string or a number.
///
/// # Errors
///
/// Propagates the engine error if rendering a number fails.
pub fn to_bytes(value: &JsValue, ctx: &mut Context) -> JsResult<Option<Vec<u8>>> {
    Ok(to_text(value, ctx)?.map(String::into_bytes))
}

/// Renders `value` as a Rust string if it is a string or a number.
pub fn to_text(value: &JsValue, ctx: &mut Context) -> JsResult<Option<String>> {
    if let Some(s) = value.as_string() {
        return Ok(Some(s.to_std_string_escaped()));
    }
    if value.is_number() {
        return Ok(Some(value.to_string(ctx)?.to_std_string_escaped()));
    }
    Ok(None)
}

pub fn text_to_js(text: &str) -> JsValue {
    JsValue::from(JsString::from(text))
}

pub fn bytes_to_js(bytes: &[u8]) -> JsValue {
    text_to_js(&String::from_utf8_lossy(bytes))
}

/// The object behind `value`, if it is one.
pub fn object_of(value: &JsValue) -> Option<JsObject> {
    value.as_object().map(|o| o.clone())
}

/// The object behind `value`, if it is callable.
pub fn callable_of(value: &JsValue) -> Option<JsObject> {
    object_of(value).filter(|o| o.is_callable())
}

/// Elements `0..length` of an array object, holes read as `undefined`.
pub fn array_elements(array: &JsObject, ctx: &mut Context) -> JsResult<Vec<JsValue>> {
    let array = JsArray::from_object(array.clone())?;
    let length = array.length(ctx)? as usize;
    let mut elements = Vec::with_capacity(length);
    for i in 0..length {
        elements.push(array.get(i, ctx)?);
    }
    Ok(elements)
}

/// Own string-keyed properties of `obj` in property order. Symbol keys are
/// skipped.
pub fn own_entries(obj: &JsObject, ctx: &mut Context) -> JsResult<Vec<(String, JsValue)>> {
    let keys = obj.own_property_keys(ctx)?;
    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let name = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let value = obj.get(key, ctx)?;
        entries.push((name, value));
    }
    Ok(entries)
}

/// Builds the environment object for one request.
///
/// `CONTENT_TYPE` defaults to the empty string and is overwritten if the
/// request carries it. Every variable is copied in order (a repeated name
/// keeps the last value), then `input` is added with `read` bound to
/// `input_read`.
pub fn build_environment(
    request: &Request,
    input_read: &JsObject,
    ctx: &mut Context,
) -> JsResult<JsObject> {
    let env = JsObject::with_object_proto(ctx.intrinsics());
    env.create_data_property_or_throw(js_string!("CONTENT_TYPE"), JsString::default(), ctx)?;

    for (key, value) in &request.vars {
        let key = JsString::from(String::from_utf8_lossy(key).as_ref());
        env.create_data_property_or_throw(key, bytes_to_js(value), ctx)?;
    }

    let input = JsObject::with_object_proto(ctx.intrinsics());
    input.create_data_property_or_throw(js_string!("read"), input_read.clone(), ctx)?;
    env.create_data_property_or_throw(js_string!("input"), input, ctx)?;

    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::{NativeFunction, Source};
    use boa_engine::object::FunctionObjectBuilder;

    fn eval(ctx: &mut Context, src: &str) -> JsValue {
        ctx.eval(Source::from_bytes(src)).unwrap()
    }

    #[test]
    fn test_to_bytes_strings_and_numbers() {
        let mut ctx = Context::default();
        let s = eval(&mut ctx, "'héllo'");
        assert_eq!(to_bytes(&s, &mut ctx).unwrap(), Some("héllo".as_bytes().to_vec()));

        let n = eval(&mut ctx, "200");
        assert_eq!(to_bytes(&n, &mut ctx).unwrap(), Some(b"200".to_vec()));

        let f = eval(&mut ctx, "1.5");
        assert_eq!(to_text(&f, &mut ctx).unwrap().as_deref(), Some("1.5"));
    }

    #[test]
    fn test_to_bytes_rejects_other_values() {
        let mut ctx = Context::default();
        for src in ["({})", "[1]", "true", "null", "undefined", "(function(){})"] {
            let v = eval(&mut ctx, src);
            assert_eq!(to_bytes(&v, &mut ctx).unwrap(), None, "{}", src);
        }
    }

    #[test]
    fn test_array_elements_with_holes() {
        let mut ctx = Context::default();
        let v = eval(&mut ctx, "[1, , 'x']");
        let obj = object_of(&v).unwrap();
        let elements = array_elements(&obj, &mut ctx).unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements[1].is_undefined());
        assert_eq!(to_text(&elements[2], &mut ctx).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_own_entries_skip_symbols() {
        let mut ctx = Context::default();
        let v = eval(&mut ctx, "({a: 1, [Symbol('s')]: 2, b: 'two'})");
        let obj = object_of(&v).unwrap();
        let names: Vec<String> = own_entries(&obj, &mut ctx)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_build_environment() {
        let mut ctx = Context::default();
        let read = FunctionObjectBuilder::new(
            ctx.realm(),
            NativeFunction::from_fn_ptr(|_, _, _| Ok(JsValue::undefined())),
        )
        .build();
        let request = Request::new()
            .with_var("REQUEST_METHOD", "GET")
            .with_var("PATH_INFO", "/x");

        let env = build_environment(&request, &read, &mut ctx).unwrap();
        ctx.register_global_property(js_string!("env"), env, boa_engine::property::Attribute::all())
            .unwrap();

        let summary = eval(
            &mut ctx,
            "[env.CONTENT_TYPE, env.REQUEST_METHOD, env.PATH_INFO, typeof env.input.read].join('|')",
        );
        assert_eq!(
            to_text(&summary, &mut ctx).unwrap().as_deref(),
            Some("|GET|/x|function")
        );
    }

    #[test]
    fn test_request_content_type_overrides_default() {
        let mut ctx = Context::default();
        let read = FunctionObjectBuilder::new(
            ctx.realm(),
            NativeFunction::from_fn_ptr(|_, _, _| Ok(JsValue::undefined())),
        )
        .build();
        let request = Request::new().with_var("CONTENT_TYPE", "text/html");
        let env = build_environment(&request, &read, &mut ctx).unwrap();
        let ct = env.get(js_string!("CONTENT_TYPE"), &mut ctx).unwrap();
        assert_eq!(to_text(&ct, &mut ctx).unwrap().as_deref(), Some("text/html"));
    }
}
