/// Video formats and the per-plane GL texel types they map to.

use crate::gl::{format_type_n_bytes, GlFormat, GlType};

/// Video frame formats handled by the memory subsystem.
///
/// Only the geometry of these formats matters here (plane count,
/// subsampling, bytes per texel) - pixel semantics beyond transfer
/// sizing are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// 8-bit RGBA, one plane
    Rgba,
    /// 8-bit BGRA, one plane (uploaded as RGBA-shaped texels)
    Bgra,
    /// 8-bit RGB, one plane
    Rgb,
    /// Packed 5-6-5 RGB, one plane
    Rgb16,
    /// 8-bit grayscale, one plane
    Gray8,
    /// Planar 4:2:0 YUV, three planes
    I420,
    /// Semi-planar 4:2:0 YUV, two planes (chroma interleaved)
    Nv12,
}

impl VideoFormat {
    /// Number of planes in a frame of this format
    pub fn n_planes(&self) -> usize {
        match self {
            VideoFormat::I420 => 3,
            VideoFormat::Nv12 => 2,
            _ => 1,
        }
    }

    /// True for formats with 2x2 chroma subsampling
    pub fn is_yuv(&self) -> bool {
        matches!(self, VideoFormat::I420 | VideoFormat::Nv12)
    }

    /// The GL texel type backing `plane`
    pub fn plane_texture_type(&self, plane: usize) -> GlTextureType {
        match self {
            VideoFormat::Rgba | VideoFormat::Bgra => GlTextureType::Rgba,
            VideoFormat::Rgb => GlTextureType::Rgb,
            VideoFormat::Rgb16 => GlTextureType::Rgb16,
            VideoFormat::Gray8 => GlTextureType::Luminance,
            VideoFormat::I420 => GlTextureType::Luminance,
            VideoFormat::Nv12 => {
                if plane == 0 {
                    GlTextureType::Luminance
                } else {
                    GlTextureType::LuminanceAlpha
                }
            }
        }
    }

    /// Width in samples of `plane` for a frame `width` pixels wide
    pub fn plane_width(&self, plane: usize, width: u32) -> u32 {
        if self.is_yuv() && plane > 0 {
            width.div_ceil(2)
        } else {
            width
        }
    }

    /// Height in rows of `plane` for a frame `height` pixels tall
    pub fn plane_height(&self, plane: usize, height: u32) -> u32 {
        if self.is_yuv() && plane > 0 {
            height.div_ceil(2)
        } else {
            height
        }
    }
}

// ===== GL TEXTURE TYPE =====

/// The texel layout of one video plane as a GL texture.
///
/// This is the unit the transfer engine sizes everything from: each
/// memory object carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlTextureType {
    Rgba,
    Rgb,
    Rgb16,
    Luminance,
    LuminanceAlpha,
    Rg,
    Red,
}

impl GlTextureType {
    /// Client pixel format for transfers of this texel type
    pub fn gl_format(&self) -> GlFormat {
        match self {
            GlTextureType::Rgba => GlFormat::Rgba,
            GlTextureType::Rgb | GlTextureType::Rgb16 => GlFormat::Rgb,
            GlTextureType::Luminance => GlFormat::Luminance,
            GlTextureType::LuminanceAlpha => GlFormat::LuminanceAlpha,
            GlTextureType::Rg => GlFormat::Rg,
            GlTextureType::Red => GlFormat::Red,
        }
    }

    /// Component type for transfers of this texel type
    pub fn gl_type(&self) -> GlType {
        match self {
            GlTextureType::Rgb16 => GlType::UnsignedShort565,
            _ => GlType::UnsignedByte,
        }
    }

    /// Bytes per texel
    pub fn bytes_per_pixel(&self) -> usize {
        format_type_n_bytes(self.gl_format(), self.gl_type())
    }

    /// Luminance-class texel types cannot take the staged download path
    /// (readback of these through a PIXEL_PACK buffer is not portable).
    pub fn excluded_from_staged_download(&self) -> bool {
        matches!(self, GlTextureType::Luminance | GlTextureType::LuminanceAlpha)
    }
}
