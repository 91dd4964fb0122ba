/// PboMemory - GL texture memory with PBO-staged transfers.
///
/// Wraps the base texture memory plus an optionally owned staging
/// buffer. Mapping picks a transfer path from the dirty flags and the
/// owning context's capabilities: staged through the PBO when the
/// API/version guarantees the entry points, direct readback/upload
/// otherwise. Uploads and downloads happen at most once per access and
/// only when the flags say a representation is stale.
///
/// Lock discipline: the base object's mutex is taken only on caller
/// threads and may be held across a dispatch; dispatched tasks never
/// take it. The staging buffer's own mutex is the inverse - taken only
/// inside tasks (and briefly from unmap bookkeeping), never held while
/// waiting. Two threads racing to map the same object serialize on the
/// object mutex; exactly one performs the transfer and the other finds
/// the flags already clean.

use std::any::Any;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gl::{BufferTarget, GlContext, ReadPixelsTarget, TexImageSource, TextureTarget};
use crate::memory::buffer::GlStagingBuffer;
use crate::memory::copy::{run_copy, CopyRequest};
use crate::memory::texture::{
    copy_teximage, read_into, upload_from, CpuMapPath, GlTextureMemory,
};
use crate::memory::{GlMemory, MapAccess, GL_MEMORY_PBO_ALLOCATOR_NAME};
use crate::video::GlTextureType;
use crate::{prism_error, prism_trace};

/// Raw pointer handed across the dispatch boundary.
///
/// SAFETY: the pointee is a heap allocation owned by the staging buffer
/// (kept alive by the memory object) and is only dereferenced through
/// the map guard while the mapping is live.
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}

/// One video plane as a GL texture with PBO-staged CPU access.
pub struct PboMemory {
    mem: GlTextureMemory,
    pbo: Option<Arc<GlStagingBuffer>>,
}

impl PboMemory {
    pub(crate) fn from_parts(mem: GlTextureMemory, pbo: Option<Arc<GlStagingBuffer>>) -> Self {
        Self { mem, pbo }
    }

    pub fn texture_id(&self) -> u32 {
        self.mem.texture_id()
    }

    pub fn target(&self) -> TextureTarget {
        self.mem.target()
    }

    pub fn texture_type(&self) -> GlTextureType {
        self.mem.texture_type()
    }

    pub fn plane(&self) -> usize {
        self.mem.plane()
    }

    pub fn is_wrapped(&self) -> bool {
        self.mem.is_wrapped()
    }

    /// The staging buffer, when the context supported allocating one
    pub fn staging_buffer(&self) -> Option<&Arc<GlStagingBuffer>> {
        self.pbo.as_ref()
    }

    /// Host data is newer than the texture
    pub fn needs_upload(&self) -> bool {
        self.mem.state().lock().expect("memory state poisoned").need_upload
    }

    /// Texture is newer than host data
    pub fn needs_download(&self) -> bool {
        self.mem.state().lock().expect("memory state poisoned").need_download
    }

    pub(crate) fn base(&self) -> &GlTextureMemory {
        &self.mem
    }

    fn staged_download_usable(&self) -> bool {
        self.pbo.is_some()
            && self.mem.context().supports_pbo_download()
            && !self.mem.texture_type().excluded_from_staged_download()
    }

    // ========================================================================
    // CPU mapping
    // ========================================================================

    /// Map the plane for CPU access.
    ///
    /// A READ map reflects the texture's current contents (downloading
    /// at most once, driven by the dirty flag); the returned guard
    /// covers the whole padded plane allocation. Dropping a WRITE guard
    /// marks the host bytes as the newer representation.
    pub fn map_cpu(&self, access: MapAccess) -> Result<CpuMapGuard<'_>> {
        if self.mem.target().is_external() {
            prism_error!("prismgl::memory", "cannot map external-target textures for CPU access");
            return Err(Error::UnsupportedOperation(
                "external-target textures are GPU-access only".to_string(),
            ));
        }

        let context = self.mem.context().clone();
        let mut st = self.mem.state().lock().expect("memory state poisoned");
        if st.cpu_write || (access.contains(MapAccess::WRITE) && st.cpu_maps > 0) {
            return Err(Error::BackendError(
                "plane is already mapped exclusively".to_string(),
            ));
        }

        let geo = self.mem.geometry();

        if let Some(pbo) = self.pbo.clone() {
            // with a staging buffer present the host side always lives
            // in its backing; only the texture->host transfer method
            // differs with the context's capabilities
            if access.contains(MapAccess::READ) && st.need_download {
                if self.staged_download_usable() {
                    prism_trace!(
                        "prismgl::memory",
                        "download of texture {} using pbo {}",
                        geo.tex_id,
                        pbo.id()
                    );
                    let task_pbo = pbo.clone();
                    let downloaded: Result<()> = context.dispatch(move |dev| {
                        task_pbo.set_target(BufferTarget::PixelPack);
                        task_pbo.map_gl(dev, MapAccess::WRITE)?;
                        dev.bind_buffer(BufferTarget::PixelPack, task_pbo.id());
                        let read =
                            read_into(dev, &geo, ReadPixelsTarget::BoundPbo(geo.plane_start));
                        dev.bind_buffer(BufferTarget::PixelPack, 0);
                        task_pbo.unmap_gl(MapAccess::WRITE);
                        read
                    });
                    downloaded?;
                } else {
                    // staged download unavailable (version gate or a
                    // luminance-class texel type): read straight into
                    // the backing
                    let task_pbo = pbo.clone();
                    let plane_start = geo.plane_start;
                    let downloaded: Result<()> = context.dispatch(move |dev| {
                        task_pbo.fill_backing(|data| {
                            read_into(
                                dev,
                                &geo,
                                ReadPixelsTarget::Host(&mut data[plane_start..]),
                            )
                        })
                    });
                    downloaded?;
                }
                st.need_download = false;
            }

            // pbo -> caller-visible host bytes
            let task_pbo = pbo.clone();
            let mapped: Result<(SendPtr, usize)> = context.dispatch(move |dev| {
                task_pbo.set_target(BufferTarget::PixelPack);
                let (ptr, len) = task_pbo.map_cpu(dev, access)?;
                Ok((SendPtr(ptr), len))
            });
            let (ptr, len) = match mapped {
                Ok((p, l)) => (p, l),
                Err(e) => {
                    prism_error!("prismgl::memory", "failed to map pbo {}: {}", pbo.id(), e);
                    return Err(e);
                }
            };

            st.cpu_maps += 1;
            st.cpu_write = access.contains(MapAccess::WRITE);
            Ok(CpuMapGuard {
                memory: self,
                access,
                ptr: ptr.0,
                len,
                path: CpuMapPath::Staging,
            })
        } else {
            // direct fallback: readback straight into host storage
            if st.host_data.is_none() {
                st.host_data = Some(vec![0; self.mem.size()]);
            }

            if access.contains(MapAccess::READ) && st.need_download {
                let mut data = st.host_data.take().expect("host storage just ensured");
                let plane_start = geo.plane_start;
                let (data, read): (Vec<u8>, Result<()>) = context.dispatch(move |dev| {
                    let r = read_into(
                        dev,
                        &geo,
                        ReadPixelsTarget::Host(&mut data[plane_start..]),
                    );
                    (data, r)
                });
                st.host_data = Some(data);
                read?;
                st.need_download = false;
            }

            let data = st.host_data.as_mut().expect("host storage just ensured");
            let (ptr, len) = (data.as_mut_ptr(), data.len());
            st.cpu_maps += 1;
            st.cpu_write = access.contains(MapAccess::WRITE);
            Ok(CpuMapGuard {
                memory: self,
                access,
                ptr,
                len,
                path: CpuMapPath::Direct,
            })
        }
    }

    fn unmap_cpu(&self, access: MapAccess, path: CpuMapPath) {
        if path == CpuMapPath::Staging {
            if let Some(pbo) = &self.pbo {
                pbo.unmap_cpu(access);
            }
        }
        let mut st = self.mem.state().lock().expect("memory state poisoned");
        debug_assert!(st.cpu_maps > 0, "unbalanced CPU unmap");
        st.cpu_maps = st.cpu_maps.saturating_sub(1);
        if access.contains(MapAccess::WRITE) {
            st.cpu_write = false;
            st.need_upload = true;
            st.need_download = false;
        }
    }

    // ========================================================================
    // GL mapping
    // ========================================================================

    /// Map the plane for GPU access, returning a guard exposing the
    /// texture id.
    ///
    /// A READ map makes the texture reflect pending host writes
    /// (uploading at most once, driven by the dirty flag). External
    /// targets hand back their handle directly - no transfer, ever.
    /// Dropping a WRITE guard marks the texture as the newer
    /// representation.
    pub fn map_gl(&self, access: MapAccess) -> Result<GlMapGuard<'_>> {
        let tex_id = self.mem.texture_id();
        if self.mem.target().is_external() {
            return Ok(GlMapGuard {
                memory: self,
                access,
                tex_id,
            });
        }

        let context = self.mem.context().clone();
        let mut st = self.mem.state().lock().expect("memory state poisoned");

        if access.contains(MapAccess::READ) {
            let geo = self.mem.geometry();
            if self.pbo.is_some() && context.supports_pbo_upload() {
                let pbo = self.pbo.as_ref().expect("staging buffer checked").clone();
                let need_upload = st.need_upload;
                let uploaded: Result<()> = context.dispatch(move |dev| {
                    pbo.set_target(BufferTarget::PixelUnpack);
                    pbo.map_gl(dev, MapAccess::READ)?;
                    let r = if need_upload {
                        dev.bind_buffer(BufferTarget::PixelUnpack, pbo.id());
                        let up = upload_from(dev, &geo, TexImageSource::BoundPbo(geo.plane_start));
                        dev.bind_buffer(BufferTarget::PixelUnpack, 0);
                        up
                    } else {
                        Ok(())
                    };
                    pbo.unmap_gl(MapAccess::READ);
                    r
                });
                uploaded?;
                st.need_upload = false;
            } else if st.need_upload {
                // direct fallback: upload from whatever host bytes exist
                let data = match &self.pbo {
                    Some(pbo) => pbo.backing_snapshot(),
                    None => st.host_data.clone(),
                };
                if let Some(data) = data {
                    let plane_start = geo.plane_start;
                    let uploaded: Result<()> = context.dispatch(move |dev| {
                        upload_from(dev, &geo, TexImageSource::Host(&data[plane_start..]))
                    });
                    uploaded?;
                }
                st.need_upload = false;
            }
        }

        drop(st);
        Ok(GlMapGuard {
            memory: self,
            access,
            tex_id,
        })
    }

    fn unmap_gl(&self, access: MapAccess) {
        if self.mem.target().is_external() {
            return;
        }
        if access.contains(MapAccess::WRITE) {
            let mut st = self.mem.state().lock().expect("memory state poisoned");
            st.need_download = true;
            st.need_upload = false;
        }
    }

    // ========================================================================
    // Explicit transfers (prefetch)
    // ========================================================================

    /// Read the texture back into the staging buffer now instead of at
    /// the next CPU map. No-op when staging downloads are unavailable
    /// for this object.
    pub fn download_transfer(&self) -> Result<()> {
        if !self.staged_download_usable() {
            return Ok(());
        }
        let context = self.mem.context().clone();
        let mut st = self.mem.state().lock().expect("memory state poisoned");
        if !st.need_download {
            return Ok(());
        }

        let geo = self.mem.geometry();
        let pbo = self.pbo.as_ref().expect("staging buffer checked").clone();
        prism_trace!(
            "prismgl::memory",
            "optimistic download of texture {} using pbo {}",
            geo.tex_id,
            pbo.id()
        );
        let downloaded: Result<()> = context.dispatch(move |dev| {
            pbo.set_target(BufferTarget::PixelPack);
            pbo.map_gl(dev, MapAccess::WRITE)?;
            dev.bind_buffer(BufferTarget::PixelPack, pbo.id());
            let read = read_into(dev, &geo, ReadPixelsTarget::BoundPbo(geo.plane_start));
            dev.bind_buffer(BufferTarget::PixelPack, 0);
            pbo.unmap_gl(MapAccess::WRITE);
            read
        });
        downloaded?;
        st.need_download = false;
        Ok(())
    }

    /// Push pending host bytes into the staging buffer's GL data store
    /// now. The texture itself is only written at the next GL map, as
    /// with a plain map. No-op when staging uploads are unavailable.
    pub fn upload_transfer(&self) -> Result<()> {
        let context = self.mem.context().clone();
        if self.pbo.is_none() || !context.supports_pbo_upload() {
            return Ok(());
        }
        let _st = self.mem.state().lock().expect("memory state poisoned");
        let pbo = self.pbo.as_ref().expect("staging buffer checked").clone();
        context.dispatch(move |dev| {
            pbo.set_target(BufferTarget::PixelUnpack);
            pbo.map_gl(dev, MapAccess::READ)?;
            pbo.unmap_gl(MapAccess::READ);
            Ok(())
        })
    }

    // ========================================================================
    // Copies
    // ========================================================================

    /// Copy this plane's texture contents into `tex_id` (0 = create a
    /// texture), either respecifying the raw bytes under a new
    /// format/type or converting per texel through a framebuffer.
    ///
    /// Runs as one task on the owning context - never split across
    /// dispatches. Returns the destination texture id.
    pub fn copy_into_texture(
        &self,
        tex_id: u32,
        target: TextureTarget,
        out_type: GlTextureType,
        width: u32,
        height: u32,
        stride: u32,
        respecify: bool,
    ) -> Result<u32> {
        if self.mem.target().is_external() {
            prism_error!("prismgl::memory", "cannot copy external-target textures");
            return Err(Error::UnsupportedOperation(
                "external-target textures cannot be copied".to_string(),
            ));
        }

        let context = self.mem.context().clone();
        // hold the object lock for the duration: the copy reads the
        // texture and the staging buffer
        let st = self.mem.state().lock().expect("memory state poisoned");

        let request = CopyRequest {
            src: self.mem.geometry(),
            src_pbo: self.pbo.clone(),
            src_need_download: st.need_download,
            tex_id,
            target,
            out_format: out_type.gl_format(),
            out_ty: out_type.gl_type(),
            out_width: width,
            out_height: height,
            out_stride: stride,
            respecify,
            gles2_family: context.is_gles2_family(),
            supports_staged_readback: self.staged_download_usable(),
        };

        let result = context.dispatch(move |dev| run_copy(dev, request));
        drop(st);
        result
    }

    /// Full-object copy into a fresh memory object of the same geometry.
    ///
    /// With pending host writes this is a CPU-side byte copy; otherwise
    /// the texture is copied per texel on the GPU.
    pub fn copy(&self) -> Result<Arc<PboMemory>> {
        use crate::memory::allocator::{GlVideoAllocationParams, WrappedResource};
        use crate::memory::PboAllocator;

        if self.mem.target().is_external() {
            prism_error!("prismgl::memory", "cannot copy external-target textures");
            return Err(Error::UnsupportedOperation(
                "external-target textures cannot be copied".to_string(),
            ));
        }

        let dest = PboAllocator::instance().alloc_pbo(GlVideoAllocationParams {
            context: self.mem.context().clone(),
            target: self.mem.target(),
            info: self.mem.info().clone(),
            plane: self.mem.plane(),
            valign: *self.mem.alignment(),
            wrapped: WrappedResource::None,
        })?;

        let st = self.mem.state().lock().expect("memory state poisoned");
        if st.need_upload {
            // pending host bytes: copy them CPU-side and leave the
            // destination with the same upload pending
            let bytes = match &self.pbo {
                Some(pbo) => pbo.backing_snapshot(),
                None => st.host_data.clone(),
            }
            .ok_or_else(|| {
                Error::InvalidResource("upload pending but no host bytes present".to_string())
            })?;

            let mut dst_state = dest.mem.state().lock().expect("memory state poisoned");
            match &dest.pbo {
                Some(dst_pbo) => {
                    dst_pbo.set_backing(bytes)?;
                    dst_pbo.mark_need_upload();
                }
                None => dst_state.host_data = Some(bytes),
            }
            dst_state.need_upload = true;
        } else {
            let src_geo = self.mem.geometry();
            let dst_geo = dest.mem.geometry();
            let copied: Result<()> = self.mem.context().dispatch(move |dev| {
                copy_teximage(
                    dev,
                    &src_geo,
                    dst_geo.tex_id,
                    dst_geo.target,
                    dst_geo.format,
                    dst_geo.width,
                    dst_geo.height,
                )
            });
            copied?;
            let mut dst_state = dest.mem.state().lock().expect("memory state poisoned");
            dst_state.need_download = true;
        }
        drop(st);
        Ok(dest)
    }
}

impl GlMemory for PboMemory {
    fn mem_type(&self) -> &'static str {
        GL_MEMORY_PBO_ALLOCATOR_NAME
    }

    fn size(&self) -> usize {
        self.mem.size()
    }

    fn context(&self) -> &Arc<GlContext> {
        self.mem.context()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for PboMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PboMemory")
            .field("mem", &self.mem)
            .field("pbo", &self.pbo)
            .finish()
    }
}

// ============================================================================
// Map guards
// ============================================================================

/// CPU mapping of a plane. Derefs to the padded plane bytes; releases
/// the mapping exactly once on drop.
pub struct CpuMapGuard<'a> {
    memory: &'a PboMemory,
    access: MapAccess,
    ptr: *mut u8,
    len: usize,
    path: CpuMapPath,
}

impl Deref for CpuMapGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        // SAFETY: ptr/len describe the mapped backing, which cannot move
        // or shrink while this guard keeps the map count non-zero
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for CpuMapGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        assert!(
            self.access.contains(MapAccess::WRITE),
            "mutable access through a read-only map"
        );
        // SAFETY: WRITE maps are exclusive; see Deref
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for CpuMapGuard<'_> {
    fn drop(&mut self) {
        self.memory.unmap_cpu(self.access, self.path);
    }
}

/// GPU mapping of a plane - exposes the texture id for the caller to
/// bind. No unmap-time transfer; a WRITE guard flips the dirty flags on
/// drop.
pub struct GlMapGuard<'a> {
    memory: &'a PboMemory,
    access: MapAccess,
    tex_id: u32,
}

impl GlMapGuard<'_> {
    pub fn texture_id(&self) -> u32 {
        self.tex_id
    }
}

impl Drop for GlMapGuard<'_> {
    fn drop(&mut self) {
        self.memory.unmap_gl(self.access);
    }
}
