//! GL memory subsystem - the PBO-backed texture memory object, its
//! allocator, and the copy/respecify engine.
//!
//! Memory variants plug into the pipeline through two small capability
//! traits: [`GlMemory`] (the type-erased memory object) and
//! [`MemoryAllocator`] (the factory slots). One concrete type per
//! variant; no inheritance chain.

use std::any::Any;
use std::sync::{Arc, OnceLock, RwLock};

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::gl::GlContext;
use crate::prism_debug;

mod allocator;
mod buffer;
mod copy;
mod pbo;
mod texture;

pub use allocator::{
    setup_buffer, setup_wrapped, GlVideoAllocationParams, PboAllocator, WrappedResource,
};
pub use buffer::GlStagingBuffer;
pub use pbo::{CpuMapGuard, GlMapGuard, PboMemory};
pub use texture::GlTextureMemory;


/// Registered type name of the PBO memory allocator
pub const GL_MEMORY_PBO_ALLOCATOR_NAME: &str = "GLMemoryPBO";

bitflags! {
    /// Requested access mode for a map operation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapAccess: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
    }
}

impl MapAccess {
    pub const READWRITE: MapAccess = MapAccess::READ.union(MapAccess::WRITE);
}

// ===== CAPABILITY TRAITS =====

/// A memory object as the pipeline sees it.
pub trait GlMemory: Send + Sync {
    /// Type name of the allocator that produced this memory
    fn mem_type(&self) -> &'static str;

    /// Byte size of the backing allocation (padded plane size)
    fn size(&self) -> usize;

    /// The GL context this memory belongs to
    fn context(&self) -> &Arc<GlContext>;

    /// Downcast support for memory-kind predicates
    fn as_any(&self) -> &dyn Any;
}

/// Factory slots implemented by each memory variant's allocator.
pub trait MemoryAllocator: Send + Sync {
    /// Type name this allocator registers under
    fn mem_type(&self) -> &'static str;

    /// Raw size-only allocation. Variants that need video geometry
    /// reject this as a programming error.
    fn alloc(&self, size: usize) -> Result<Arc<dyn GlMemory>>;

    /// Video-aware allocation - the supported factory path. Takes the
    /// parameters by value so wrapped host bytes move in zero-copy.
    fn alloc_video(&self, params: GlVideoAllocationParams) -> Result<Arc<dyn GlMemory>>;
}

// ===== ALLOCATOR REGISTRY =====

static REGISTRY: OnceLock<RwLock<FxHashMap<&'static str, Arc<dyn MemoryAllocator>>>> =
    OnceLock::new();

fn registry() -> &'static RwLock<FxHashMap<&'static str, Arc<dyn MemoryAllocator>>> {
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Register an allocator under its type name.
///
/// The first registration for a name wins; a second one is an error.
pub fn register_allocator(allocator: Arc<dyn MemoryAllocator>) -> Result<()> {
    let mut map = registry()
        .write()
        .map_err(|_| Error::InitializationFailed("allocator registry poisoned".to_string()))?;
    if map.contains_key(allocator.mem_type()) {
        return Err(Error::InitializationFailed(format!(
            "allocator '{}' already registered",
            allocator.mem_type()
        )));
    }
    map.insert(allocator.mem_type(), allocator);
    Ok(())
}

/// Look up a registered allocator by type name
pub fn find_allocator(name: &str) -> Option<Arc<dyn MemoryAllocator>> {
    registry().read().ok()?.get(name).cloned()
}

/// One-time global initialization of the PBO memory allocator.
///
/// Safe to call from any number of threads, any number of times; the
/// first caller performs the registration. Must run before any other
/// entry point of this module (the factory functions call it
/// themselves).
pub fn pbo_memory_init() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        prism_debug!("prismgl::memory", "registering PBO memory allocator");
        // the registry rejects duplicates; first writer wins
        let _ = register_allocator(PboAllocator::instance());
    });
}

/// Whether `memory` is a PBO-backed GL memory object
pub fn is_pbo_memory(memory: &dyn GlMemory) -> bool {
    memory.mem_type() == GL_MEMORY_PBO_ALLOCATOR_NAME
        && memory.as_any().is::<PboMemory>()
}
