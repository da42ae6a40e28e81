//! Configuration scripts
//!
//! A configurator is a JavaScript file evaluated in a bare context (no
//! `wsbridge` bindings) whose completion value describes host options:
//!
//! ```js
//! [
//!   { "js": "app.js", "js-gc-freq": 10 },
//!   { "js-load": ["lib/a.js", "lib/b.js"] }
//! ]
//! ```
//!
//! Each key/value pair becomes one option, in order. Array values repeat the
//! key once per element; nested objects are walked with the parent key.

use boa_engine::{value::JsValue, Context, Source};
use std::path::Path;
use wsbridge_common::config::OptionSink;
use wsbridge_common::protocol::{BridgeError, Result};

use crate::runtime::conversions::{array_elements, object_of, own_entries};

/// Evaluate the configurator at `path` and feed every option to `sink`.
///
/// # Errors
///
/// - `BridgeError::ScriptLoad` if the file cannot be read
/// - `BridgeError::Config` if it throws or does not evaluate to an object or
///   an array
pub fn load_options(path: &Path, sink: &mut dyn OptionSink) -> Result<()> {
    let source = std::fs::read_to_string(path).map_err(|e| BridgeError::ScriptLoad {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    tracing::info!("loading configuration from {}", path.display());

    let mut ctx = Context::default();
    let config_error = |e: boa_engine::JsError| {
        BridgeError::Config(format!("{}: {}", path.display(), e))
    };
    let value = ctx
        .eval(Source::from_bytes(source.as_str()))
        .map_err(config_error)?;

    let Some(root) = object_of(&value) else {
        return Err(BridgeError::Config(format!(
            "{} must evaluate to an object or an array, got {}",
            path.display(),
            value.display()
        )));
    };

    let mappings = if root.is_array() {
        array_elements(&root, &mut ctx).map_err(config_error)?
    } else {
        vec![value]
    };
    for mapping in mappings {
        let Some(mapping) = object_of(&mapping) else {
            tracing::warn!("{}: skipping non-object entry {}", path.display(), mapping.display());
            continue;
        };
        for (key, value) in own_entries(&mapping, &mut ctx).map_err(config_error)? {
            expand(&key, &value, sink, &mut ctx).map_err(config_error)?;
        }
    }
    Ok(())
}

fn expand(
    key: &str,
    value: &JsValue,
    sink: &mut dyn OptionSink,
    ctx: &mut Context,
) -> boa_engine::JsResult<()> {
    if value.is_null_or_undefined() {
        return Ok(());
    }
    if let Some(object) = object_of(value) {
        let nested = if object.is_array() {
            array_elements(&object, ctx)?
        } else {
            own_entries(&object, ctx)?.into_iter().map(|(_, v)| v).collect()
        };
        for item in nested {
            expand(key, &item, sink, ctx)?;
        }
        return Ok(());
    }
    let rendered = if value.is_string() || value.is_number() || value.is_boolean() {
        value.to_string(ctx)?.to_std_string_escaped()
    } else {
        tracing::warn!("option {}: unsupported value {}", key, value.display());
        return Ok(());
    };
    sink.add_option(key.to_string(), rendered);
    Ok(())
}
