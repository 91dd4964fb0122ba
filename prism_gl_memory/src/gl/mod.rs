//! GL abstraction - API identification, the per-context function table,
//! and the context thread dispatcher.
//!
//! No platform GL calls happen in this crate: backends implement
//! [`GlDevice`], and [`GlContext`] guarantees every device call runs on
//! the one thread that owns the context.

mod api;
mod context;
mod device;

pub use api::{
    format_type_n_bytes, BufferTarget, BufferUsage, GlApi, GlFormat, GlType, GlVersion,
    PixelStore, TextureTarget,
};
pub use context::GlContext;
pub use device::{GlDevice, ReadPixelsTarget, TexImageSource};

#[cfg(test)]
pub(crate) mod mock_device;
