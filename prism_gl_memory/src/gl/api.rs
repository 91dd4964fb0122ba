/// GL API identification and the typed subset of GL enums used by the
/// memory subsystem.

use bitflags::bitflags;

bitflags! {
    /// Which GL API family a context implements.
    ///
    /// `OPENGL` is legacy/compatibility desktop GL, `OPENGL3` is a core
    /// profile context, `GLES2` covers the GLES 2.x/3.x family (a GLES 3
    /// context reports `GLES2` with version >= 3.0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlApi: u32 {
        const OPENGL = 1 << 0;
        const OPENGL3 = 1 << 1;
        const GLES2 = 1 << 2;
    }
}

impl GlApi {
    /// Mask matching any API family
    pub const ANY: GlApi = GlApi::all();
}

/// GL version as reported by the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GlVersion {
    pub major: u32,
    pub minor: u32,
}

impl GlVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// True if this version is at least `major.minor`
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        *self >= GlVersion::new(major, minor)
    }
}

// ===== TEXTURE TARGETS =====

/// GL texture target kinds used for video planes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    /// GL_TEXTURE_2D
    Texture2d,
    /// GL_TEXTURE_RECTANGLE
    Rectangle,
    /// GL_TEXTURE_EXTERNAL_OES - platform-decoder-owned, GPU access only
    ExternalOes,
}

impl TextureTarget {
    /// External targets have no client-visible storage and can never be
    /// mapped for CPU access.
    pub fn is_external(&self) -> bool {
        matches!(self, TextureTarget::ExternalOes)
    }
}

// ===== BUFFER OBJECTS =====

/// Pixel buffer binding points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// GL_PIXEL_PACK_BUFFER - GPU writes into the buffer (download)
    PixelPack,
    /// GL_PIXEL_UNPACK_BUFFER - GPU reads from the buffer (upload)
    PixelUnpack,
}

/// Buffer usage hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// GL_STREAM_DRAW
    StreamDraw,
    /// GL_STREAM_READ
    StreamRead,
    /// GL_STREAM_COPY
    StreamCopy,
}

// ===== PIXEL TRANSFER =====

/// Client pixel formats used for texture transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlFormat {
    Rgba,
    Rgb,
    Luminance,
    LuminanceAlpha,
    Rg,
    Red,
}

impl GlFormat {
    /// Number of components per texel
    pub fn n_components(&self) -> usize {
        match self {
            GlFormat::Rgba => 4,
            GlFormat::Rgb => 3,
            GlFormat::LuminanceAlpha | GlFormat::Rg => 2,
            GlFormat::Luminance | GlFormat::Red => 1,
        }
    }
}

/// Component types used for texture transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlType {
    UnsignedByte,
    /// Packed 5-6-5 RGB, one u16 per texel
    UnsignedShort565,
}

/// Bytes per texel for a format/type pair
pub fn format_type_n_bytes(format: GlFormat, ty: GlType) -> usize {
    match ty {
        GlType::UnsignedByte => format.n_components(),
        GlType::UnsignedShort565 => 2,
    }
}

/// Pixel-store parameters the transfer paths touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelStore {
    /// GL_UNPACK_ROW_LENGTH (in pixels)
    UnpackRowLength,
    /// GL_UNPACK_ALIGNMENT (1, 2, 4 or 8)
    UnpackAlignment,
    /// GL_PACK_ROW_LENGTH (in pixels)
    PackRowLength,
    /// GL_PACK_ALIGNMENT
    PackAlignment,
}
