/// PboAllocator - process-wide factory for PBO-backed GL memory.
///
/// Construction always goes through the video-aware path: a fresh
/// texture, an adopted GPU handle, or zero-copy wrapped host bytes. The
/// raw size-only allocator slot exists to satisfy the capability
/// interface and rejects every call.

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::gl::{GlContext, TextureTarget};
use crate::memory::buffer::GlStagingBuffer;
use crate::memory::pbo::PboMemory;
use crate::memory::texture::GlTextureMemory;
use crate::memory::{GlMemory, MemoryAllocator, GL_MEMORY_PBO_ALLOCATOR_NAME};
use crate::video::{MultiviewMode, VideoAlignment, VideoInfo, VideoMemoryBuffer, VideoMeta};
use crate::{prism_error, prism_trace, prism_warn};

/// What, if anything, the new memory object adopts from the caller
pub enum WrappedResource {
    /// Fresh allocation - new texture, nothing adopted
    None,
    /// Adopt a caller-owned texture id; it is never deleted here and
    /// the host view starts stale
    GpuHandle(u32),
    /// Adopt caller bytes as the staging backing, zero-copy; the
    /// texture starts stale
    HostData(Vec<u8>),
}

/// Parameters for one video-aware allocation
pub struct GlVideoAllocationParams {
    pub context: Arc<GlContext>,
    pub target: TextureTarget,
    pub info: VideoInfo,
    pub plane: usize,
    pub valign: VideoAlignment,
    pub wrapped: WrappedResource,
}

/// The PBO memory allocator. One process-wide instance, registered
/// under [`GL_MEMORY_PBO_ALLOCATOR_NAME`](crate::memory::GL_MEMORY_PBO_ALLOCATOR_NAME).
pub struct PboAllocator {
    _priv: (),
}

impl PboAllocator {
    /// The process-wide allocator instance (created on first use)
    pub fn instance() -> Arc<PboAllocator> {
        static INSTANCE: OnceLock<Arc<PboAllocator>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(PboAllocator { _priv: () })).clone()
    }

    /// Construct one PBO memory object.
    ///
    /// The staging buffer is allocated here, once, sized to the padded
    /// plane, when the context's API/version supports staged transfers;
    /// otherwise the object uses the direct paths for its whole life.
    pub(crate) fn alloc_pbo(&self, params: GlVideoAllocationParams) -> Result<Arc<PboMemory>> {
        let GlVideoAllocationParams {
            context,
            target,
            info,
            plane,
            valign,
            wrapped,
        } = params;

        if plane >= info.n_planes() {
            return Err(Error::InvalidResource(format!(
                "plane {} out of range for {:?}",
                plane,
                info.format()
            )));
        }

        let base = match &wrapped {
            WrappedResource::GpuHandle(tex_id) => GlTextureMemory::from_wrapped_texture(
                context.clone(),
                *tex_id,
                target,
                &info,
                plane,
                &valign,
            ),
            _ => GlTextureMemory::new(context.clone(), target, &info, plane, &valign)?,
        };

        let pbo = if context.supports_staging_allocation() {
            Some(GlStagingBuffer::new(context.clone(), base.size())?)
        } else {
            None
        };

        let memory = PboMemory::from_parts(base, pbo);

        match wrapped {
            WrappedResource::None => {}
            WrappedResource::GpuHandle(_) => {
                // the caller's texture holds the only valid data
                let mut st = memory.base().state().lock().expect("memory state poisoned");
                st.need_download = true;
            }
            WrappedResource::HostData(data) => {
                if data.len() != memory.base().size() {
                    return Err(Error::InvalidResource(format!(
                        "wrapped data is {} bytes, plane needs {}",
                        data.len(),
                        memory.base().size()
                    )));
                }
                match memory.staging_buffer() {
                    Some(pbo) => {
                        pbo.set_backing(data)?;
                        pbo.mark_need_upload();
                    }
                    None => {
                        let mut st =
                            memory.base().state().lock().expect("memory state poisoned");
                        st.host_data = Some(data);
                    }
                }
                let mut st = memory.base().state().lock().expect("memory state poisoned");
                st.need_upload = true;
            }
        }

        Ok(Arc::new(memory))
    }
}

impl MemoryAllocator for PboAllocator {
    fn mem_type(&self) -> &'static str {
        GL_MEMORY_PBO_ALLOCATOR_NAME
    }

    fn alloc(&self, size: usize) -> Result<Arc<dyn GlMemory>> {
        prism_error!(
            "prismgl::memory",
            "raw alloc of {} bytes rejected: use the video-aware factory functions",
            size
        );
        Err(Error::UnsupportedOperation(
            "PBO memory must be allocated through the video-aware factory".to_string(),
        ))
    }

    fn alloc_video(&self, params: GlVideoAllocationParams) -> Result<Arc<dyn GlMemory>> {
        self.alloc_pbo(params).map(|m| m as Arc<dyn GlMemory>)
    }
}

// ============================================================================
// Factory surface
// ============================================================================

impl PboMemory {
    /// Allocate a fresh plane: new texture, optional staging buffer, no
    /// pending transfers.
    pub fn alloc(
        context: Arc<GlContext>,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
    ) -> Result<Arc<PboMemory>> {
        crate::memory::pbo_memory_init();
        PboAllocator::instance().alloc_pbo(GlVideoAllocationParams {
            context,
            target,
            info: info.clone(),
            plane,
            valign: *valign,
            wrapped: WrappedResource::None,
        })
    }

    /// Wrap a caller-owned texture handle. The first CPU access
    /// downloads; destruction never deletes the handle.
    pub fn wrapped_texture(
        context: Arc<GlContext>,
        texture_id: u32,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
    ) -> Result<Arc<PboMemory>> {
        crate::memory::pbo_memory_init();
        PboAllocator::instance().alloc_pbo(GlVideoAllocationParams {
            context,
            target,
            info: info.clone(),
            plane,
            valign: *valign,
            wrapped: WrappedResource::GpuHandle(texture_id),
        })
    }

    /// Wrap caller-supplied plane bytes zero-copy. The first GPU access
    /// uploads them into the texture.
    pub fn wrapped(
        context: Arc<GlContext>,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
        data: Vec<u8>,
    ) -> Result<Arc<PboMemory>> {
        crate::memory::pbo_memory_init();
        PboAllocator::instance().alloc_pbo(GlVideoAllocationParams {
            context,
            target,
            info: info.clone(),
            plane,
            valign: *valign,
            wrapped: WrappedResource::HostData(data),
        })
    }
}

/// Attach one memory object per plane (and per view, for separated
/// multiview layouts) to `buffer`, in view-major plane-minor order,
/// plus a [`VideoMeta`] per view.
///
/// Fails on the first plane that cannot be allocated; planes attached
/// before the failure stay in the container for the caller to clean up.
pub fn setup_buffer(
    context: Arc<GlContext>,
    target: TextureTarget,
    info: &VideoInfo,
    valign: &VideoAlignment,
    buffer: &mut VideoMemoryBuffer,
) -> Result<()> {
    let views = if info.multiview_mode() == MultiviewMode::Separated {
        info.views()
    } else {
        1
    };

    for view in 0..views {
        for plane in 0..info.n_planes() {
            let memory = match PboMemory::alloc(context.clone(), target, info, plane, valign) {
                Ok(memory) => memory,
                Err(e) => {
                    prism_warn!(
                        "prismgl::memory",
                        "failed to allocate plane {} of view {}: {}",
                        plane,
                        view,
                        e
                    );
                    return Err(e);
                }
            };
            buffer.append_memory(memory);
        }
        buffer.add_meta(VideoMeta::from_info(info, view));
    }

    prism_trace!(
        "prismgl::memory",
        "attached {} plane memories across {} views",
        buffer.n_memories(),
        views
    );
    Ok(())
}

/// Wrap one caller-supplied byte vector per plane. The vectors are
/// adopted zero-copy in plane order.
pub fn setup_wrapped(
    context: Arc<GlContext>,
    target: TextureTarget,
    info: &VideoInfo,
    valign: &VideoAlignment,
    planes: Vec<Vec<u8>>,
) -> Result<Vec<Arc<PboMemory>>> {
    if planes.len() != info.n_planes() {
        return Err(Error::InvalidResource(format!(
            "{} plane buffers supplied, format {:?} has {}",
            planes.len(),
            info.format(),
            info.n_planes()
        )));
    }

    let mut memories = Vec::with_capacity(planes.len());
    for (plane, data) in planes.into_iter().enumerate() {
        memories.push(PboMemory::wrapped(
            context.clone(),
            target,
            info,
            plane,
            valign,
            data,
        )?);
    }
    Ok(memories)
}
