/// GlTextureMemory - the base GL texture memory for one video plane.
///
/// Owns the texture handle and the per-object transfer state (the two
/// dirty booleans plus lazily allocated host storage), and provides the
/// direct transfer paths that the PBO object falls back to when staging
/// is unavailable: framebuffer readback into host memory, sub-image
/// upload from host memory, and the per-texel texture-to-texture copy.

use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::gl::{
    GlContext, GlDevice, GlFormat, GlType, PixelStore, ReadPixelsTarget, TexImageSource,
    TextureTarget,
};
use crate::prism_warn;
use crate::video::{GlTextureType, VideoAlignment, VideoInfo};

// ============================================================================
// Transfer state
// ============================================================================

/// Which storage a CPU map handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CpuMapPath {
    /// Pointer into the staging buffer's host backing
    Staging,
    /// Pointer into the base host storage
    Direct,
}

#[derive(Debug, Default)]
pub(crate) struct TransferState {
    /// Host data is newer than the texture
    pub need_upload: bool,
    /// Texture is newer than host data
    pub need_download: bool,
    /// Direct-path host storage; allocated once, sized to the padded plane
    pub host_data: Option<Vec<u8>>,
    /// Active CPU mappings (storage must not move while > 0)
    pub cpu_maps: usize,
    /// An exclusive write mapping is live
    pub cpu_write: bool,
}

// ============================================================================
// Plane geometry snapshot for dispatched tasks
// ============================================================================

/// Everything a context-thread task needs to address this plane's
/// texture and its padded byte layout. Plain `Copy` data so tasks can
/// capture it by value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TexGeometry {
    pub tex_id: u32,
    pub target: TextureTarget,
    pub format: GlFormat,
    pub ty: GlType,
    /// Plane width in texels (no padding)
    pub width: u32,
    /// Plane height in rows (no padding)
    pub height: u32,
    /// Byte stride of one padded row
    pub stride: u32,
    /// Offset of the first real pixel inside the padded allocation
    pub plane_start: usize,
    /// Padded plane byte size
    pub size: usize,
    /// Row length in pixels for UNPACK/PACK_ROW_LENGTH (0 = inexpressible)
    pub row_length: u32,
    /// Row alignment for the GLES2 UNPACK_ALIGNMENT fallback
    pub alignment: u32,
    /// Express padding via alignment instead of row length (GLES2 < 3.0)
    pub gles2_alignment_mode: bool,
}

fn apply_unpack(dev: &mut dyn GlDevice, geo: &TexGeometry) {
    if geo.gles2_alignment_mode {
        dev.pixel_store(PixelStore::UnpackAlignment, geo.alignment as i32);
    } else {
        dev.pixel_store(PixelStore::UnpackRowLength, geo.row_length as i32);
    }
}

fn reset_unpack(dev: &mut dyn GlDevice, geo: &TexGeometry) {
    if geo.gles2_alignment_mode {
        dev.pixel_store(PixelStore::UnpackAlignment, 4);
    } else {
        dev.pixel_store(PixelStore::UnpackRowLength, 0);
    }
}

pub(crate) fn apply_pack(dev: &mut dyn GlDevice, geo: &TexGeometry) {
    if geo.gles2_alignment_mode {
        dev.pixel_store(PixelStore::PackAlignment, geo.alignment as i32);
    } else {
        dev.pixel_store(PixelStore::PackRowLength, geo.row_length as i32);
    }
}

pub(crate) fn reset_pack(dev: &mut dyn GlDevice, geo: &TexGeometry) {
    if geo.gles2_alignment_mode {
        dev.pixel_store(PixelStore::PackAlignment, 4);
    } else {
        dev.pixel_store(PixelStore::PackRowLength, 0);
    }
}

// ============================================================================
// Context-thread transfer helpers
// ============================================================================

/// Generate and allocate a texture (LINEAR filters, CLAMP_TO_EDGE wrap).
/// External targets get no storage call - their backing is owned by the
/// platform decoder.
pub(crate) fn create_texture(
    dev: &mut dyn GlDevice,
    target: TextureTarget,
    format: GlFormat,
    ty: GlType,
    width: u32,
    height: u32,
) -> Result<u32> {
    let tex_id = dev.gen_texture();
    dev.bind_texture(target, tex_id);
    if matches!(target, TextureTarget::Texture2d | TextureTarget::Rectangle) {
        if let Err(e) = dev.tex_image_2d(target, format, ty, width, height) {
            dev.bind_texture(target, 0);
            dev.delete_texture(tex_id);
            return Err(e);
        }
    }
    dev.tex_parameters_linear_clamp(target);
    dev.bind_texture(target, 0);
    Ok(tex_id)
}

/// Full-plane sub-image upload with the padded-row pixel-store state
/// applied and reset around it. `source` is either host bytes starting
/// at the plane's first real pixel, or the plane-start offset into the
/// bound PIXEL_UNPACK buffer.
pub(crate) fn upload_from(
    dev: &mut dyn GlDevice,
    geo: &TexGeometry,
    source: TexImageSource<'_>,
) -> Result<()> {
    apply_unpack(dev, geo);
    dev.bind_texture(geo.target, geo.tex_id);
    let uploaded = dev.tex_sub_image_2d(geo.target, geo.width, geo.height, geo.format, geo.ty, source);
    dev.bind_texture(geo.target, 0);
    reset_unpack(dev, geo);
    uploaded
}

/// Framebuffer readback of the whole plane. Binds a scratch framebuffer
/// with the texture attached, reads into `dst`, and releases the
/// framebuffer on every path.
pub(crate) fn read_into(
    dev: &mut dyn GlDevice,
    geo: &TexGeometry,
    dst: ReadPixelsTarget<'_>,
) -> Result<()> {
    if !dev.has_framebuffer_support() {
        return Err(Error::UnsupportedOperation(
            "framebuffer objects not supported".to_string(),
        ));
    }

    let fbo = dev.gen_framebuffer();
    dev.bind_framebuffer(fbo);
    dev.framebuffer_texture_2d(geo.target, geo.tex_id);

    let read = if !dev.check_framebuffer_complete() {
        Err(Error::BackendError(
            "framebuffer incomplete for readback".to_string(),
        ))
    } else {
        apply_pack(dev, geo);
        let r = dev.read_pixels(geo.width, geo.height, geo.format, geo.ty, dst);
        reset_pack(dev, geo);
        r
    };

    dev.bind_framebuffer(0);
    dev.delete_framebuffer(fbo);
    read
}

/// Per-texel texture-to-texture copy through a scratch framebuffer with
/// the source attached (format conversion and resize happen in
/// `copy_tex_image_2d`).
pub(crate) fn copy_teximage(
    dev: &mut dyn GlDevice,
    src: &TexGeometry,
    dst_tex: u32,
    dst_target: TextureTarget,
    dst_format: GlFormat,
    width: u32,
    height: u32,
) -> Result<()> {
    if !dev.has_framebuffer_support() {
        return Err(Error::UnsupportedOperation(
            "framebuffer objects not supported".to_string(),
        ));
    }

    let fbo = dev.gen_framebuffer();
    dev.bind_framebuffer(fbo);
    dev.framebuffer_texture_2d(src.target, src.tex_id);

    let copied = if !dev.check_framebuffer_complete() {
        Err(Error::BackendError(
            "framebuffer incomplete for texture copy".to_string(),
        ))
    } else {
        dev.bind_texture(dst_target, dst_tex);
        let r = dev.copy_tex_image_2d(dst_target, dst_format, width, height);
        dev.bind_texture(dst_target, 0);
        r
    };

    dev.bind_framebuffer(0);
    dev.delete_framebuffer(fbo);
    copied
}

// ============================================================================
// Base memory object
// ============================================================================

/// One video plane resident on the GPU: the texture handle, its padded
/// byte geometry, and the dirty-flag pair that drives lazy transfers.
pub struct GlTextureMemory {
    context: Arc<GlContext>,
    tex_id: u32,
    target: TextureTarget,
    tex_type: GlTextureType,
    info: VideoInfo,
    valign: VideoAlignment,
    plane: usize,
    size: usize,
    plane_start: usize,
    row_length: u32,
    alignment: u32,
    texture_wrapped: bool,
    state: Mutex<TransferState>,
}

/// Largest alignment in {8, 4, 2, 1} that reproduces `stride` from a
/// tight row of `row_bytes`
fn stride_alignment(row_bytes: usize, stride: usize) -> u32 {
    for align in [8usize, 4, 2, 1] {
        if row_bytes.div_ceil(align) * align == stride {
            return align as u32;
        }
    }
    1
}

impl GlTextureMemory {
    fn init(
        context: Arc<GlContext>,
        tex_id: u32,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
        texture_wrapped: bool,
    ) -> Self {
        let tex_type = info.format().plane_texture_type(plane);
        let bpp = tex_type.bytes_per_pixel();
        let stride = info.plane_stride(plane) as usize;
        let row_bytes = info.plane_width(plane) as usize * bpp;

        // padding is expressed as a row length when the stride is a
        // whole number of texels, as an alignment otherwise
        let row_length = if stride % bpp == 0 {
            (stride / bpp) as u32
        } else {
            0
        };

        Self {
            tex_id,
            target,
            tex_type,
            size: info.plane_size(plane, valign),
            plane_start: info.plane_start(plane, valign),
            row_length,
            alignment: stride_alignment(row_bytes, stride),
            info: info.clone(),
            valign: *valign,
            plane,
            texture_wrapped,
            context,
            state: Mutex::new(TransferState::default()),
        }
    }

    /// Fresh allocation: creates the texture on the context thread.
    pub(crate) fn new(
        context: Arc<GlContext>,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
    ) -> Result<Self> {
        let tex_type = info.format().plane_texture_type(plane);
        let (format, ty) = (tex_type.gl_format(), tex_type.gl_type());
        let (width, height) = (info.plane_width(plane), info.plane_height(plane));
        let tex_id = context
            .dispatch(move |dev| create_texture(dev, target, format, ty, width, height))?;
        Ok(Self::init(context, tex_id, target, info, plane, valign, false))
    }

    /// Adopt an externally owned texture handle. The handle is never
    /// deleted by this object.
    pub(crate) fn from_wrapped_texture(
        context: Arc<GlContext>,
        tex_id: u32,
        target: TextureTarget,
        info: &VideoInfo,
        plane: usize,
        valign: &VideoAlignment,
    ) -> Self {
        Self::init(context, tex_id, target, info, plane, valign, true)
    }

    pub fn context(&self) -> &Arc<GlContext> {
        &self.context
    }

    pub fn texture_id(&self) -> u32 {
        self.tex_id
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn texture_type(&self) -> GlTextureType {
        self.tex_type
    }

    pub fn plane(&self) -> usize {
        self.plane
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn alignment(&self) -> &VideoAlignment {
        &self.valign
    }

    /// Padded plane byte size
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_wrapped(&self) -> bool {
        self.texture_wrapped
    }

    pub(crate) fn state(&self) -> &Mutex<TransferState> {
        &self.state
    }

    pub(crate) fn geometry(&self) -> TexGeometry {
        TexGeometry {
            tex_id: self.tex_id,
            target: self.target,
            format: self.tex_type.gl_format(),
            ty: self.tex_type.gl_type(),
            width: self.info.plane_width(self.plane),
            height: self.info.plane_height(self.plane),
            stride: self.info.plane_stride(self.plane),
            plane_start: self.plane_start,
            size: self.size,
            row_length: self.row_length,
            alignment: self.alignment,
            gles2_alignment_mode: self.context.uses_gles2_unpack_alignment(),
        }
    }
}

impl Drop for GlTextureMemory {
    fn drop(&mut self) {
        if self.texture_wrapped {
            return;
        }
        let tex_id = self.tex_id;
        if self
            .context
            .try_dispatch(move |dev| dev.delete_texture(tex_id))
            .is_none()
        {
            prism_warn!("prismgl::memory", "leaking texture {}: context is gone", tex_id);
        }
    }
}

impl std::fmt::Debug for GlTextureMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlTextureMemory")
            .field("tex_id", &self.tex_id)
            .field("target", &self.target)
            .field("tex_type", &self.tex_type)
            .field("plane", &self.plane)
            .field("size", &self.size)
            .field("wrapped", &self.texture_wrapped)
            .finish()
    }
}
