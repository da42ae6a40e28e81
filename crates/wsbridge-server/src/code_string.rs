use boa_engine::{object::JsObject, value::JsValue, Context, JsString, Source};
use std::path::PathBuf;
use wsbridge_common::protocol::{BridgeError, Result};

use crate::runtime::conversions::{callable_of, text_to_js, to_text};
use crate::runtime::interpreter::script_error;

/// A named function in a standalone script, called with a key to produce a
/// string. Used by host-side routing.
///
/// The script is evaluated on the first call. If that fails the error is
/// logged and the next call tries again.
pub struct CodeString {
    file: PathBuf,
    func: String,
    state: Option<(Context, JsObject)>,
}

impl CodeString {
    pub fn new(file: impl Into<PathBuf>, func: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            func: func.into(),
            state: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// Calls the function with `key`. Returns `None` when the script cannot
    /// be loaded, the call throws, or the result has no string rendering.
    pub fn call(&mut self, key: &[u8]) -> Option<String> {
        if self.state.is_none() {
            match self.load() {
                Ok(state) => self.state = Some(state),
                Err(e) => {
                    tracing::error!("code string {}:{}: {}", self.file.display(), self.func, e);
                    return None;
                }
            }
        }
        let (ctx, function) = self.state.as_mut()?;
        let arg = text_to_js(&String::from_utf8_lossy(key));
        let result = function
            .call(&JsValue::undefined(), &[arg], ctx)
            .and_then(|value| to_text(&value, ctx));
        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("code string {}: {}", self.func, e);
                None
            }
        }
    }

    fn load(&self) -> Result<(Context, JsObject)> {
        let source = std::fs::read_to_string(&self.file).map_err(|e| BridgeError::ScriptLoad {
            path: self.file.display().to_string(),
            message: e.to_string(),
        })?;
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(source.as_str()))
            .map_err(script_error)?;
        let value = ctx
            .global_object()
            .get(JsString::from(self.func.as_str()), &mut ctx)
            .map_err(script_error)?;
        let function = callable_of(&value).ok_or_else(|| {
            BridgeError::InvalidRequest(format!("{} is not a function", self.func))
        })?;
        tracing::info!("code string {} loaded from {}", self.func, self.file.display());
        Ok((ctx, function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_script(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_route_by_key() {
        let script = create_test_script("function route(key) { return key == 'a' ? 'node1' : 'node2'; }");
        let mut code = CodeString::new(script.path(), "route");
        assert!(!code.is_loaded());
        assert_eq!(code.call(b"a").as_deref(), Some("node1"));
        assert_eq!(code.call(b"b").as_deref(), Some("node2"));
        assert!(code.is_loaded());
    }

    #[test]
    fn test_state_survives_between_calls() {
        let script = create_test_script("var n = 0; function next(key) { n++; return key + n; }");
        let mut code = CodeString::new(script.path(), "next");
        assert_eq!(code.call(b"k").as_deref(), Some("k1"));
        assert_eq!(code.call(b"k").as_deref(), Some("k2"));
    }

    #[test]
    fn test_missing_function_retries() {
        let script = create_test_script("var route = 5;");
        let mut code = CodeString::new(script.path(), "route");
        assert_eq!(code.call(b"a"), None);
        assert!(!code.is_loaded());
        assert_eq!(CodeString::new("/nonexistent.js", "route").call(b"a"), None);
    }

    #[test]
    fn test_non_string_result() {
        let script = create_test_script("function f(key) { return {}; }");
        let mut code = CodeString::new(script.path(), "f");
        assert_eq!(code.call(b"a"), None);
        assert!(code.is_loaded());
    }
}
