//! Pipeline integration - the context discovery/sharing surface an
//! element needs around the memory subsystem.

mod context_binding;

pub use context_binding::ContextBinding;
