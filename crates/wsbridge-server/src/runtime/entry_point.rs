use boa_engine::{js_string, object::JsObject, value::JsValue, Context, JsResult};

use crate::runtime::conversions::{callable_of, object_of, text_to_js};

/// Status reported by the fallback entry point.
pub const STUB_STATUS: &str = "500";

/// The callable an instance runs for every request, resolved once at load.
#[derive(Debug, Clone)]
pub enum EntryPoint {
    /// The application evaluated to a function.
    Function(JsObject),
    /// The application evaluated to an object with a callable `run` field.
    Table { table: JsObject, run: JsObject },
    /// Nothing usable was loaded; every request answers `500` with no
    /// headers and no body.
    Stub,
}

impl EntryPoint {
    /// Resolves a completion value into an entry point.
    ///
    /// Returns `None` when `candidate` is neither callable nor an object with
    /// a callable `run` field. A throwing `run` getter counts as "not found".
    pub fn resolve(candidate: &JsValue, ctx: &mut Context) -> Option<Self> {
        if let Some(function) = callable_of(candidate) {
            return Some(Self::Function(function));
        }
        let table = object_of(candidate)?;
        let run = match table.get(js_string!("run"), ctx) {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!("reading the run field of the application failed: {}", e);
                return None;
            }
        };
        callable_of(&run).map(|run| Self::Table { table, run })
    }

    pub fn is_stub(&self) -> bool {
        matches!(self, Self::Stub)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Table { .. } => "table",
            Self::Stub => "stub",
        }
    }

    /// The value kept under the reserved registry index.
    pub fn value(&self) -> JsValue {
        match self {
            Self::Function(function) => function.clone().into(),
            Self::Table { table, .. } => table.clone().into(),
            Self::Stub => JsValue::undefined(),
        }
    }

    /// Calls the entry point with the request environment as its single
    /// argument. `run` is called with its object as `this`.
    pub fn invoke(&self, env: JsValue, ctx: &mut Context) -> JsResult<JsValue> {
        match self {
            Self::Function(function) => function.call(&JsValue::undefined(), &[env], ctx),
            Self::Table { table, run } => run.call(&table.clone().into(), &[env], ctx),
            Self::Stub => Ok(text_to_js(STUB_STATUS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::conversions::to_text;
    use boa_engine::Source;

    fn resolve(src: &str) -> (Option<EntryPoint>, Context) {
        let mut ctx = Context::default();
        let value = ctx.eval(Source::from_bytes(src)).unwrap();
        (EntryPoint::resolve(&value, &mut ctx), ctx)
    }

    #[test]
    fn test_function_completion_value() {
        let (entry, mut ctx) = resolve("(function(env) { return 'f:' + env; })");
        let entry = entry.unwrap();
        assert_eq!(entry.kind(), "function");
        let out = entry.invoke(text_to_js("x"), &mut ctx).unwrap();
        assert_eq!(to_text(&out, &mut ctx).unwrap().as_deref(), Some("f:x"));
    }

    #[test]
    fn test_table_run_gets_table_as_this() {
        let (entry, mut ctx) = resolve("({ name: 'app', run: function(env) { return this.name + env; } })");
        let entry = entry.unwrap();
        assert_eq!(entry.kind(), "table");
        let out = entry.invoke(text_to_js("!"), &mut ctx).unwrap();
        assert_eq!(to_text(&out, &mut ctx).unwrap().as_deref(), Some("app!"));
    }

    #[test]
    fn test_unusable_values() {
        for src in ["42", "'str'", "undefined", "({ run: 1 })", "({})"] {
            let (entry, _) = resolve(src);
            assert!(entry.is_none(), "{}", src);
        }
        let (entry, _) = resolve("({ get run() { throw new Error('no'); } })");
        assert!(entry.is_none());
    }

    #[test]
    fn test_stub_answers_500() {
        let mut ctx = Context::default();
        let out = EntryPoint::Stub.invoke(JsValue::undefined(), &mut ctx).unwrap();
        assert_eq!(to_text(&out, &mut ctx).unwrap().as_deref(), Some("500"));
        assert!(EntryPoint::Stub.value().is_undefined());
    }
}
