//! Video geometry - formats, plane layout, alignment padding, and the
//! multi-plane memory container.
//!
//! Only what the transfer engine needs to size and address a plane lives
//! here; pixel semantics stay out of scope.

mod format;
mod frame;
mod info;

pub use format::{GlTextureType, VideoFormat};
pub use frame::{VideoMemoryBuffer, VideoMeta};
pub use info::{MultiviewMode, VideoAlignment, VideoInfo, MAX_PLANES};
