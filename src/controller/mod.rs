//! Session control loops and the registry that owns them.

mod engine;
mod registry;

pub use engine::ControllerStatus;
pub use registry::ControllerRegistry;
