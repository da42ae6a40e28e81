//! wsbridge Server
//!
//! Runs a JavaScript application (Boa) inside a host request server. The
//! host owns the workers and the wire protocol; this crate owns one
//! interpreter instance per slot and turns each request into calls on the
//! host's response primitives.
//!
//! - [`SlotPool`] builds and owns the interpreter instances
//! - [`Dispatcher`] runs request cycles, including suspended (async) ones
//! - [`callbacks`] bridges host-fired signal and RPC callbacks
//! - [`configurator`] turns a configuration script into host options
//! - [`CodeString`] and [`shell`] are the routing hook and the debug shell

pub mod callbacks;
pub mod code_string;
pub mod configurator;
pub mod dispatcher;
pub mod gc;
pub mod response;
pub mod runtime;
pub mod shell;

pub use callbacks::CallbackKind;
pub use code_string::CodeString;
pub use dispatcher::Dispatcher;
pub use gc::GcPolicy;
pub use runtime::{AsyncState, EntryPoint, Interpreter, SlotPool, SlotStats};
