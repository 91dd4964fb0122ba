/// Copy/respecify engine - copies one memory object's texture contents
/// into another texture inside a single dispatched task.
///
/// Respecify reinterprets the raw backing bytes under a new format/type
/// label (requires equal backing byte sizes and a staging buffer);
/// otherwise the copy converts per texel through a framebuffer. Failures
/// release whatever the task acquired and never touch the source
/// object's dirty state.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gl::{BufferTarget, GlDevice, GlFormat, GlType, TexImageSource, TextureTarget};
use crate::memory::buffer::GlStagingBuffer;
use crate::memory::texture::{apply_pack, create_texture, reset_pack, TexGeometry};
use crate::memory::MapAccess;
use crate::{prism_error, prism_trace};

/// Ephemeral description of one copy, alive for the duration of a
/// single dispatched task.
pub(crate) struct CopyRequest {
    pub src: TexGeometry,
    pub src_pbo: Option<Arc<GlStagingBuffer>>,
    pub src_need_download: bool,
    /// Destination texture id; 0 means create one
    pub tex_id: u32,
    pub target: TextureTarget,
    pub out_format: GlFormat,
    pub out_ty: GlType,
    pub out_width: u32,
    pub out_height: u32,
    pub out_stride: u32,
    pub respecify: bool,
    pub gles2_family: bool,
    pub supports_staged_readback: bool,
}

/// Execute the copy on the context thread. Returns the destination
/// texture id (the created one when the request carried 0).
pub(crate) fn run_copy(dev: &mut dyn GlDevice, req: CopyRequest) -> Result<u32> {
    if !dev.has_framebuffer_support() {
        return Err(Error::UnsupportedOperation(
            "framebuffer objects not supported".to_string(),
        ));
    }

    let in_size = req.src.height as usize * req.src.stride as usize;
    let out_size = req.out_height as usize * req.out_stride as usize;
    if req.respecify && in_size != out_size {
        prism_error!(
            "prismgl::memory",
            "cannot copy between textures with backing data of different sizes: input {} output {}",
            in_size,
            out_size
        );
        return Err(Error::SizeMismatch(format!(
            "input {} bytes, output {} bytes",
            in_size, out_size
        )));
    }

    let (tex_id, created) = if req.tex_id == 0 {
        let id = create_texture(
            dev,
            req.target,
            req.out_format,
            req.out_ty,
            req.out_width,
            req.out_height,
        )?;
        (id, true)
    } else {
        (req.tex_id, false)
    };

    prism_trace!(
        "prismgl::memory",
        "copying texture {} into texture {}",
        req.src.tex_id,
        tex_id
    );

    let fbo = dev.gen_framebuffer();
    dev.bind_framebuffer(fbo);
    dev.framebuffer_texture_2d(req.src.target, req.src.tex_id);

    let copied = copy_with_framebuffer(dev, &req, tex_id);

    dev.bind_framebuffer(0);
    dev.delete_framebuffer(fbo);

    match copied {
        Ok(()) => Ok(tex_id),
        Err(e) => {
            if created {
                dev.delete_texture(tex_id);
            }
            Err(e)
        }
    }
}

/// The copy proper, with the scratch framebuffer already bound and the
/// source attached as its color target.
fn copy_with_framebuffer(dev: &mut dyn GlDevice, req: &CopyRequest, tex_id: u32) -> Result<()> {
    if !req.respecify {
        // per-texel conversion/resize through the framebuffer
        dev.bind_texture(req.target, tex_id);
        let copied = dev.copy_tex_image_2d(req.target, req.out_format, req.out_width, req.out_height);
        dev.bind_texture(req.target, 0);
        return copied;
    }

    let pbo = req.src_pbo.as_ref().ok_or_else(|| {
        Error::UnsupportedOperation(
            "cannot reinterpret texture contents without pixel buffer objects".to_string(),
        )
    })?;

    if req.gles2_family
        && (req.src.format != GlFormat::Rgba || req.src.ty != GlType::UnsignedByte)
    {
        return Err(Error::UnsupportedOperation(
            "cannot respecify non RGBA/UNSIGNED_BYTE textures on GLES2".to_string(),
        ));
    }

    // dirty-driven readback of the source into its staging buffer,
    // straight through the already-bound framebuffer
    if req.src_need_download {
        if !req.supports_staged_readback {
            return Err(Error::UnsupportedOperation(
                "staged readback unavailable for respecifying copy".to_string(),
            ));
        }
        pbo.set_target(BufferTarget::PixelPack);
        pbo.map_gl(dev, MapAccess::WRITE)?;
        dev.bind_buffer(BufferTarget::PixelPack, pbo.id());
        apply_pack(dev, &req.src);
        let read = dev.read_pixels(
            req.src.width,
            req.src.height,
            req.src.format,
            req.src.ty,
            crate::gl::ReadPixelsTarget::BoundPbo(req.src.plane_start),
        );
        reset_pack(dev, &req.src);
        dev.bind_buffer(BufferTarget::PixelPack, 0);
        pbo.unmap_gl(MapAccess::WRITE);
        read?;
    }

    // same bytes, new label: write the staging bytes into the
    // destination under the requested format/type
    pbo.set_target(BufferTarget::PixelUnpack);
    pbo.map_gl(dev, MapAccess::READ)?;
    dev.bind_buffer(BufferTarget::PixelUnpack, pbo.id());
    dev.bind_texture(req.target, tex_id);
    let written = dev.tex_sub_image_2d(
        req.target,
        req.out_width,
        req.out_height,
        req.out_format,
        req.out_ty,
        TexImageSource::BoundPbo(0),
    );
    dev.bind_texture(req.target, 0);
    dev.bind_buffer(BufferTarget::PixelUnpack, 0);
    pbo.unmap_gl(MapAccess::READ);
    written
}
