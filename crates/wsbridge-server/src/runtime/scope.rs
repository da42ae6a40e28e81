use std::cell::Cell;
use std::rc::Rc;
use wsbridge_common::protocol::SlotRef;

/// The slot whose request an interpreter is currently serving.
///
/// The dispatcher and the callback bridge install it around every call into
/// the interpreter; request-scoped bindings read it and refuse to run when it
/// is empty (for example while application files are being loaded).
#[derive(Clone, Default)]
pub struct RequestScope(Rc<Cell<Option<SlotRef>>>);

impl RequestScope {
    pub fn current(&self) -> Option<SlotRef> {
        self.0.get()
    }

    /// Makes `slot` current until the returned guard is dropped; the previous
    /// slot (if any) is restored afterwards.
    pub fn enter(&self, slot: SlotRef) -> ScopeGuard {
        let previous = self.0.replace(Some(slot));
        ScopeGuard {
            scope: self.clone(),
            previous,
        }
    }
}

pub struct ScopeGuard {
    scope: RequestScope,
    previous: Option<SlotRef>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.scope.0.set(self.previous);
    }
}
