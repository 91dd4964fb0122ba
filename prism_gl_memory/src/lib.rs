/*!
# PrismGL Memory

GL texture memory for video pipelines, with PBO-backed transfers.

This crate provides the memory layer that lets one plane of a video frame
live simultaneously as a GL texture and as CPU-addressable bytes, with the
two representations reconciled lazily through pixel buffer objects (PBOs).
Graphics calls never leave the thread that owns a context: every GL
operation is funneled through a blocking dispatcher onto the context
thread.

## Architecture

- **GlDevice**: the function table bound to one GL context. Backends
  implement this trait; the crate itself performs no platform GL calls.
- **GlContext**: owns the context thread and the blocking task dispatcher,
  and answers API/version capability queries.
- **GlTextureMemory**: the base texture memory - texture lifetime, plane
  geometry, the dirty-flag pair, and the direct (non-PBO) transfer paths.
- **PboMemory**: the core memory object - staged upload/download through
  an owned staging buffer, with fallback to the direct paths.
- **PboAllocator**: process-wide factory for PBO memory, including the
  wrap variants and the copy/respecify engine.

Backend implementations provide concrete `GlDevice` types; unit tests run
against an in-memory mock device.
*/

// Internal modules
mod error;
pub mod log;
pub mod gl;
pub mod video;
pub mod memory;
pub mod pipeline;

// Main prismgl namespace module
pub mod prismgl {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // GL context sub-module
    pub mod gl {
        pub use crate::gl::*;
    }

    // Video geometry sub-module
    pub mod video {
        pub use crate::video::*;
    }

    // Memory sub-module
    pub mod memory {
        pub use crate::memory::*;
    }

    // Pipeline integration sub-module
    pub mod pipeline {
        pub use crate::pipeline::*;
    }
}
