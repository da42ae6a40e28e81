pub mod async_engine;
pub mod conversions;
pub mod entry_point;
pub mod interpreter;
pub mod registry;
pub mod scope;
pub mod slot_pool;

mod bindings;


pub use async_engine::{AsyncState, BodySource};
pub use bindings::NAMESPACE;
pub use entry_point::EntryPoint;
pub use interpreter::Interpreter;
pub use registry::ReferenceRegistry;
pub use scope::RequestScope;
pub use slot_pool::{Slot, SlotPool, SlotStats};
