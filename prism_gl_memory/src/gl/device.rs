/// GlDevice trait - the per-context GL function table
///
/// Backend implementations (EGL/GLX/WGL loaders) provide a concrete type;
/// unit tests use the in-memory mock device. Every method is only ever
/// invoked on the thread that owns the context, via `GlContext::dispatch`.

use crate::error::Result;
use crate::gl::api::{
    BufferTarget, BufferUsage, GlFormat, GlType, PixelStore, TextureTarget,
};

/// Source of texel data for a sub-image upload.
///
/// GL overloads the data pointer of `glTexSubImage2D`: with a
/// PIXEL_UNPACK buffer bound it is an offset into that buffer. The two
/// cases are made explicit here.
pub enum TexImageSource<'a> {
    /// Client memory
    Host(&'a [u8]),
    /// Byte offset into the currently bound PIXEL_UNPACK buffer
    BoundPbo(usize),
}

/// Destination of a `read_pixels` readback.
///
/// With a PIXEL_PACK buffer bound, GL writes into that buffer at the
/// given offset instead of client memory.
pub enum ReadPixelsTarget<'a> {
    /// Client memory
    Host(&'a mut [u8]),
    /// Byte offset into the currently bound PIXEL_PACK buffer
    BoundPbo(usize),
}

/// The GL entry points the memory subsystem needs, bound to one context.
pub trait GlDevice: Send {
    // ===== CAPABILITIES =====

    /// Whether framebuffer objects are available (EXT_framebuffer_object
    /// or core). Gates the copy/respecify engine and FBO readbacks.
    fn has_framebuffer_support(&self) -> bool {
        true
    }

    // ===== TEXTURES =====

    fn gen_texture(&mut self) -> u32;
    fn delete_texture(&mut self, id: u32);
    fn bind_texture(&mut self, target: TextureTarget, id: u32);

    /// Allocate texture storage with no initial data (glTexImage2D with a
    /// null pointer). Only valid for 2D and rectangle targets.
    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        format: GlFormat,
        ty: GlType,
        width: u32,
        height: u32,
    ) -> Result<()>;

    /// Full-plane sub-image write into the texture bound to `target`,
    /// honoring the current unpack pixel-store state.
    fn tex_sub_image_2d(
        &mut self,
        target: TextureTarget,
        width: u32,
        height: u32,
        format: GlFormat,
        ty: GlType,
        source: TexImageSource<'_>,
    ) -> Result<()>;

    /// LINEAR min/mag filters and CLAMP_TO_EDGE wrap for the texture
    /// bound to `target`.
    fn tex_parameters_linear_clamp(&mut self, target: TextureTarget);

    /// glCopyTexImage2D - per-texel copy from the bound framebuffer's
    /// color attachment into the texture bound to `target`.
    fn copy_tex_image_2d(
        &mut self,
        target: TextureTarget,
        format: GlFormat,
        width: u32,
        height: u32,
    ) -> Result<()>;

    fn pixel_store(&mut self, param: PixelStore, value: i32);

    // ===== BUFFER OBJECTS =====

    fn gen_buffer(&mut self) -> u32;
    fn delete_buffer(&mut self, id: u32);
    fn bind_buffer(&mut self, target: BufferTarget, id: u32);

    /// Allocate (and optionally fill) the data store of the buffer bound
    /// to `target`.
    fn buffer_data(
        &mut self,
        target: BufferTarget,
        size: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> Result<()>;

    /// Write into the data store of the buffer bound to `target`.
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()>;

    /// Read from the data store of the buffer bound to `target`
    /// (glMapBufferRange + memcpy + unmap collapsed into one call).
    fn get_buffer_sub_data(
        &mut self,
        target: BufferTarget,
        offset: usize,
        data: &mut [u8],
    ) -> Result<()>;

    // ===== FRAMEBUFFERS =====

    fn gen_framebuffer(&mut self) -> u32;
    fn delete_framebuffer(&mut self, id: u32);

    /// Bind `id` as GL_FRAMEBUFFER (0 = default framebuffer)
    fn bind_framebuffer(&mut self, id: u32);

    /// Attach `texture` as COLOR_ATTACHMENT0 of the bound framebuffer
    fn framebuffer_texture_2d(&mut self, target: TextureTarget, texture: u32);

    fn check_framebuffer_complete(&self) -> bool;

    /// Read back a rectangle of the bound framebuffer's color attachment,
    /// honoring the current pack pixel-store state.
    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        format: GlFormat,
        ty: GlType,
        target: ReadPixelsTarget<'_>,
    ) -> Result<()>;
}
