/// Mock GL device for unit tests (no GPU required)
///
/// Implements the full `GlDevice` byte-movement semantics in memory:
/// textures, buffer objects, framebuffer attachments, PBO-offset
/// sources/targets, and pack/unpack row-length handling. A
/// `MockDeviceHandle` shares the device state so tests can seed and
/// inspect GPU-side bytes from the test thread while the device itself
/// lives on the context thread.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::gl::api::{
    format_type_n_bytes, BufferTarget, BufferUsage, GlApi, GlFormat, GlType, GlVersion,
    PixelStore, TextureTarget,
};
use crate::gl::context::GlContext;
use crate::gl::device::{GlDevice, ReadPixelsTarget, TexImageSource};

// ============================================================================
// State
// ============================================================================

#[derive(Debug)]
struct MockTexture {
    target: TextureTarget,
    format: GlFormat,
    ty: GlType,
    width: u32,
    height: u32,
    /// Tightly packed texel rows (stride = width * bpp)
    data: Vec<u8>,
}

#[derive(Debug)]
struct MockBuffer {
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockFramebuffer {
    attachment: Option<u32>,
}

/// Call counters for asserting which transfer path ran
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockCounters {
    pub tex_sub_image_host: usize,
    pub tex_sub_image_pbo: usize,
    pub read_pixels_host: usize,
    pub read_pixels_pbo: usize,
    pub buffer_sub_data: usize,
    pub get_buffer_sub_data: usize,
    pub copy_tex_image: usize,
}

#[derive(Debug)]
struct MockState {
    next_texture: u32,
    next_buffer: u32,
    next_framebuffer: u32,
    textures: FxHashMap<u32, MockTexture>,
    buffers: FxHashMap<u32, MockBuffer>,
    framebuffers: FxHashMap<u32, MockFramebuffer>,
    bound_texture_2d: u32,
    bound_texture_rect: u32,
    bound_texture_external: u32,
    bound_pack: u32,
    bound_unpack: u32,
    bound_framebuffer: u32,
    unpack_row_length: i32,
    unpack_alignment: i32,
    pack_row_length: i32,
    pack_alignment: i32,
    framebuffer_support: bool,
    fail_buffer_reads: bool,
    fail_buffer_writes: bool,
    counters: MockCounters,
}

impl MockState {
    fn new() -> Self {
        Self {
            next_texture: 1,
            next_buffer: 1,
            next_framebuffer: 1,
            textures: FxHashMap::default(),
            buffers: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            bound_texture_2d: 0,
            bound_texture_rect: 0,
            bound_texture_external: 0,
            bound_pack: 0,
            bound_unpack: 0,
            bound_framebuffer: 0,
            unpack_row_length: 0,
            unpack_alignment: 4,
            pack_row_length: 0,
            pack_alignment: 4,
            framebuffer_support: true,
            fail_buffer_reads: false,
            fail_buffer_writes: false,
            counters: MockCounters::default(),
        }
    }

    fn bound_texture(&self, target: TextureTarget) -> u32 {
        match target {
            TextureTarget::Texture2d => self.bound_texture_2d,
            TextureTarget::Rectangle => self.bound_texture_rect,
            TextureTarget::ExternalOes => self.bound_texture_external,
        }
    }

    fn bound_buffer(&self, target: BufferTarget) -> u32 {
        match target {
            BufferTarget::PixelPack => self.bound_pack,
            BufferTarget::PixelUnpack => self.bound_unpack,
        }
    }

    fn align_row(bytes: usize, alignment: i32) -> usize {
        let a = alignment.max(1) as usize;
        bytes.div_ceil(a) * a
    }

    fn unpack_row_stride(&self, width: u32, bpp: usize) -> usize {
        if self.unpack_row_length > 0 {
            self.unpack_row_length as usize * bpp
        } else {
            Self::align_row(width as usize * bpp, self.unpack_alignment)
        }
    }

    fn pack_row_stride(&self, width: u32, bpp: usize) -> usize {
        if self.pack_row_length > 0 {
            self.pack_row_length as usize * bpp
        } else {
            Self::align_row(width as usize * bpp, self.pack_alignment)
        }
    }
}

// ============================================================================
// Texel conversion (per-texel copy path)
// ============================================================================

fn read_texel(data: &[u8], offset: usize, format: GlFormat, ty: GlType) -> [u8; 4] {
    match ty {
        GlType::UnsignedShort565 => {
            let v: u16 = bytemuck::pod_read_unaligned(&data[offset..offset + 2]);
            let r = ((v >> 11) & 0x1f) as u8;
            let g = ((v >> 5) & 0x3f) as u8;
            let b = (v & 0x1f) as u8;
            [r << 3, g << 2, b << 3, 255]
        }
        GlType::UnsignedByte => match format {
            GlFormat::Rgba => [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ],
            GlFormat::Rgb => [data[offset], data[offset + 1], data[offset + 2], 255],
            GlFormat::LuminanceAlpha => {
                let l = data[offset];
                [l, l, l, data[offset + 1]]
            }
            GlFormat::Rg => [data[offset], data[offset + 1], 0, 255],
            GlFormat::Luminance => {
                let l = data[offset];
                [l, l, l, 255]
            }
            GlFormat::Red => [data[offset], 0, 0, 255],
        },
    }
}

fn write_texel(data: &mut [u8], offset: usize, format: GlFormat, ty: GlType, rgba: [u8; 4]) {
    match ty {
        GlType::UnsignedShort565 => {
            let v: u16 = (((rgba[0] >> 3) as u16) << 11)
                | (((rgba[1] >> 2) as u16) << 5)
                | ((rgba[2] >> 3) as u16);
            data[offset..offset + 2].copy_from_slice(bytemuck::bytes_of(&v));
        }
        GlType::UnsignedByte => match format {
            GlFormat::Rgba => data[offset..offset + 4].copy_from_slice(&rgba),
            GlFormat::Rgb => data[offset..offset + 3].copy_from_slice(&rgba[..3]),
            GlFormat::LuminanceAlpha => {
                data[offset] = rgba[0];
                data[offset + 1] = rgba[3];
            }
            GlFormat::Rg => {
                data[offset] = rgba[0];
                data[offset + 1] = rgba[1];
            }
            GlFormat::Luminance | GlFormat::Red => data[offset] = rgba[0],
        },
    }
}

// ============================================================================
// Device
// ============================================================================

pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

/// Shared view of the mock device state for seeding and inspection.
#[derive(Clone)]
pub(crate) struct MockDeviceHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub fn new() -> (Self, MockDeviceHandle) {
        let state = Arc::new(Mutex::new(MockState::new()));
        (
            Self {
                state: state.clone(),
            },
            MockDeviceHandle { state },
        )
    }
}

/// Spawn a context backed by a fresh mock device.
pub(crate) fn mock_context(api: GlApi, version: GlVersion) -> (Arc<GlContext>, MockDeviceHandle) {
    let (device, handle) = MockDevice::new();
    (GlContext::new(Box::new(device), api, version), handle)
}

/// Desktop GL 4.6 context - staged upload and download both available.
pub(crate) fn mock_context_gl46() -> (Arc<GlContext>, MockDeviceHandle) {
    mock_context(GlApi::OPENGL3, GlVersion::new(4, 6))
}

/// Legacy GL 2.1 context - staging buffers allocate and uploads stage,
/// but downloads fall back to the direct path.
pub(crate) fn mock_context_gl21() -> (Arc<GlContext>, MockDeviceHandle) {
    mock_context(GlApi::OPENGL, GlVersion::new(2, 1))
}

/// GLES 2.0 context - no staging buffer at all.
pub(crate) fn mock_context_gles2() -> (Arc<GlContext>, MockDeviceHandle) {
    mock_context(GlApi::GLES2, GlVersion::new(2, 0))
}

/// GLES 3.0 context - staging both ways, but GLES2-family restrictions.
pub(crate) fn mock_context_gles3() -> (Arc<GlContext>, MockDeviceHandle) {
    mock_context(GlApi::GLES2, GlVersion::new(3, 0))
}

impl MockDeviceHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock device state poisoned")
    }

    /// GPU-side bytes of a texture (tightly packed)
    pub fn texture_bytes(&self, id: u32) -> Option<Vec<u8>> {
        self.lock().textures.get(&id).map(|t| t.data.clone())
    }

    /// Overwrite a texture's GPU-side bytes (simulates GPU rendering)
    pub fn set_texture_bytes(&self, id: u32, bytes: &[u8]) {
        let mut st = self.lock();
        let tex = st.textures.get_mut(&id).expect("no such mock texture");
        assert_eq!(tex.data.len(), bytes.len(), "seed size mismatch");
        tex.data.copy_from_slice(bytes);
    }

    /// Create a texture outside the allocator (for wrapped-handle tests)
    pub fn create_texture_raw(
        &self,
        target: TextureTarget,
        format: GlFormat,
        ty: GlType,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> u32 {
        let mut st = self.lock();
        let id = st.next_texture;
        st.next_texture += 1;
        assert_eq!(
            data.len(),
            width as usize * height as usize * format_type_n_bytes(format, ty)
        );
        st.textures.insert(
            id,
            MockTexture {
                target,
                format,
                ty,
                width,
                height,
                data,
            },
        );
        id
    }

    pub fn texture_exists(&self, id: u32) -> bool {
        self.lock().textures.contains_key(&id)
    }

    pub fn buffer_exists(&self, id: u32) -> bool {
        self.lock().buffers.contains_key(&id)
    }

    pub fn buffer_bytes(&self, id: u32) -> Option<Vec<u8>> {
        self.lock().buffers.get(&id).map(|b| b.data.clone())
    }

    pub fn n_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    pub fn n_framebuffers(&self) -> usize {
        self.lock().framebuffers.len()
    }

    pub fn counters(&self) -> MockCounters {
        self.lock().counters
    }

    pub fn set_framebuffer_support(&self, supported: bool) {
        self.lock().framebuffer_support = supported;
    }

    pub fn set_fail_buffer_reads(&self, fail: bool) {
        self.lock().fail_buffer_reads = fail;
    }

    pub fn set_fail_buffer_writes(&self, fail: bool) {
        self.lock().fail_buffer_writes = fail;
    }
}

impl GlDevice for MockDevice {
    fn has_framebuffer_support(&self) -> bool {
        self.state.lock().expect("mock device state poisoned").framebuffer_support
    }

    fn gen_texture(&mut self) -> u32 {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let id = st.next_texture;
        st.next_texture += 1;
        id
    }

    fn delete_texture(&mut self, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        st.textures.remove(&id);
        if st.bound_texture_2d == id {
            st.bound_texture_2d = 0;
        }
        if st.bound_texture_rect == id {
            st.bound_texture_rect = 0;
        }
        if st.bound_texture_external == id {
            st.bound_texture_external = 0;
        }
    }

    fn bind_texture(&mut self, target: TextureTarget, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        match target {
            TextureTarget::Texture2d => st.bound_texture_2d = id,
            TextureTarget::Rectangle => st.bound_texture_rect = id,
            TextureTarget::ExternalOes => st.bound_texture_external = id,
        }
    }

    fn tex_image_2d(
        &mut self,
        target: TextureTarget,
        format: GlFormat,
        ty: GlType,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let id = st.bound_texture(target);
        if id == 0 {
            return Err(Error::BackendError("tex_image_2d with no texture bound".into()));
        }
        let size = width as usize * height as usize * format_type_n_bytes(format, ty);
        st.textures.insert(
            id,
            MockTexture {
                target,
                format,
                ty,
                width,
                height,
                data: vec![0; size],
            },
        );
        Ok(())
    }

    fn tex_sub_image_2d(
        &mut self,
        target: TextureTarget,
        width: u32,
        height: u32,
        format: GlFormat,
        ty: GlType,
        source: TexImageSource<'_>,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let bpp = format_type_n_bytes(format, ty);
        let src_stride = st.unpack_row_stride(width, bpp);
        let row_bytes = width as usize * bpp;

        // resolve the source bytes
        let pbo_bytes;
        let (src, from_pbo): (&[u8], bool) = match source {
            TexImageSource::Host(slice) => (slice, false),
            TexImageSource::BoundPbo(offset) => {
                let buf_id = st.bound_buffer(BufferTarget::PixelUnpack);
                let buf = st
                    .buffers
                    .get(&buf_id)
                    .ok_or_else(|| Error::BackendError("no PIXEL_UNPACK buffer bound".into()))?;
                if offset > buf.data.len() {
                    return Err(Error::BackendError("PBO offset out of range".into()));
                }
                pbo_bytes = buf.data[offset..].to_vec();
                (&pbo_bytes[..], true)
            }
        };

        let needed = if height == 0 {
            0
        } else {
            (height as usize - 1) * src_stride + row_bytes
        };
        if src.len() < needed {
            return Err(Error::BackendError(format!(
                "tex_sub_image_2d source too small: {} < {}",
                src.len(),
                needed
            )));
        }

        let id = st.bound_texture(target);
        let mut rows: Vec<(usize, Vec<u8>)> = Vec::with_capacity(height as usize);
        for row in 0..height as usize {
            rows.push((row, src[row * src_stride..row * src_stride + row_bytes].to_vec()));
        }

        let tex = st
            .textures
            .get_mut(&id)
            .ok_or_else(|| Error::BackendError("tex_sub_image_2d with no texture bound".into()))?;
        if tex.target != target {
            return Err(Error::BackendError(
                "tex_sub_image_2d target does not match texture storage".into(),
            ));
        }
        if tex.format != format || tex.ty != ty {
            return Err(Error::BackendError(
                "tex_sub_image_2d format does not match texture storage".into(),
            ));
        }
        if width != tex.width || height != tex.height {
            return Err(Error::BackendError(
                "tex_sub_image_2d rectangle does not match texture storage".into(),
            ));
        }
        let dst_stride = tex.width as usize * bpp;
        for (row, bytes) in rows {
            tex.data[row * dst_stride..row * dst_stride + row_bytes].copy_from_slice(&bytes);
        }

        if from_pbo {
            st.counters.tex_sub_image_pbo += 1;
        } else {
            st.counters.tex_sub_image_host += 1;
        }
        Ok(())
    }

    fn tex_parameters_linear_clamp(&mut self, _target: TextureTarget) {}

    fn copy_tex_image_2d(
        &mut self,
        target: TextureTarget,
        format: GlFormat,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        if !st.framebuffer_support {
            return Err(Error::BackendError("framebuffer objects not supported".into()));
        }
        let fb = st
            .framebuffers
            .get(&st.bound_framebuffer)
            .ok_or_else(|| Error::BackendError("no framebuffer bound".into()))?;
        let src_id = fb
            .attachment
            .ok_or_else(|| Error::BackendError("framebuffer has no color attachment".into()))?;
        let src = st
            .textures
            .get(&src_id)
            .ok_or_else(|| Error::InvalidResource("attachment texture gone".into()))?;

        // sample the source through an RGBA intermediate
        let src_bpp = format_type_n_bytes(src.format, src.ty);
        let (src_fmt, src_ty, src_w, src_h) = (src.format, src.ty, src.width, src.height);
        let src_data = src.data.clone();

        let dst_id = st.bound_texture(target);
        let dst = st
            .textures
            .get_mut(&dst_id)
            .ok_or_else(|| Error::BackendError("copy_tex_image_2d with no texture bound".into()))?;

        let dst_ty = dst.ty;
        let dst_bpp = format_type_n_bytes(format, dst_ty);
        dst.format = format;
        dst.width = width;
        dst.height = height;
        dst.data = vec![0; width as usize * height as usize * dst_bpp];
        for y in 0..height.min(src_h) as usize {
            for x in 0..width.min(src_w) as usize {
                let texel = read_texel(
                    &src_data,
                    (y * src_w as usize + x) * src_bpp,
                    src_fmt,
                    src_ty,
                );
                write_texel(
                    &mut dst.data,
                    (y * width as usize + x) * dst_bpp,
                    format,
                    dst_ty,
                    texel,
                );
            }
        }

        st.counters.copy_tex_image += 1;
        Ok(())
    }

    fn pixel_store(&mut self, param: PixelStore, value: i32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        match param {
            PixelStore::UnpackRowLength => st.unpack_row_length = value,
            PixelStore::UnpackAlignment => st.unpack_alignment = value,
            PixelStore::PackRowLength => st.pack_row_length = value,
            PixelStore::PackAlignment => st.pack_alignment = value,
        }
    }

    fn gen_buffer(&mut self) -> u32 {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let id = st.next_buffer;
        st.next_buffer += 1;
        id
    }

    fn delete_buffer(&mut self, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        st.buffers.remove(&id);
        if st.bound_pack == id {
            st.bound_pack = 0;
        }
        if st.bound_unpack == id {
            st.bound_unpack = 0;
        }
    }

    fn bind_buffer(&mut self, target: BufferTarget, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        match target {
            BufferTarget::PixelPack => st.bound_pack = id,
            BufferTarget::PixelUnpack => st.bound_unpack = id,
        }
    }

    fn buffer_data(
        &mut self,
        target: BufferTarget,
        size: usize,
        data: Option<&[u8]>,
        _usage: BufferUsage,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let id = st.bound_buffer(target);
        if id == 0 {
            return Err(Error::BackendError("buffer_data with no buffer bound".into()));
        }
        let mut store = vec![0; size];
        if let Some(src) = data {
            store[..src.len().min(size)].copy_from_slice(&src[..src.len().min(size)]);
        }
        st.buffers.insert(id, MockBuffer { data: store });
        Ok(())
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        if st.fail_buffer_writes {
            return Err(Error::BackendError("buffer write failed".into()));
        }
        let id = st.bound_buffer(target);
        st.counters.buffer_sub_data += 1;
        let buf = st
            .buffers
            .get_mut(&id)
            .ok_or_else(|| Error::BackendError("buffer_sub_data with no buffer bound".into()))?;
        if offset + data.len() > buf.data.len() {
            return Err(Error::BackendError("buffer_sub_data out of range".into()));
        }
        buf.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn get_buffer_sub_data(
        &mut self,
        target: BufferTarget,
        offset: usize,
        data: &mut [u8],
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        if st.fail_buffer_reads {
            return Err(Error::BackendError("buffer read failed".into()));
        }
        let id = st.bound_buffer(target);
        st.counters.get_buffer_sub_data += 1;
        let buf = st
            .buffers
            .get(&id)
            .ok_or_else(|| Error::BackendError("get_buffer_sub_data with no buffer bound".into()))?;
        if offset + data.len() > buf.data.len() {
            return Err(Error::BackendError("get_buffer_sub_data out of range".into()));
        }
        data.copy_from_slice(&buf.data[offset..offset + data.len()]);
        Ok(())
    }

    fn gen_framebuffer(&mut self) -> u32 {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let id = st.next_framebuffer;
        st.next_framebuffer += 1;
        st.framebuffers.insert(id, MockFramebuffer::default());
        id
    }

    fn delete_framebuffer(&mut self, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        st.framebuffers.remove(&id);
        if st.bound_framebuffer == id {
            st.bound_framebuffer = 0;
        }
    }

    fn bind_framebuffer(&mut self, id: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        st.bound_framebuffer = id;
    }

    fn framebuffer_texture_2d(&mut self, _target: TextureTarget, texture: u32) {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let bound = st.bound_framebuffer;
        if let Some(fb) = st.framebuffers.get_mut(&bound) {
            fb.attachment = Some(texture);
        }
    }

    fn check_framebuffer_complete(&self) -> bool {
        let st = self.state.lock().expect("mock device state poisoned");
        st.framebuffers
            .get(&st.bound_framebuffer)
            .map(|fb| fb.attachment.is_some())
            .unwrap_or(false)
    }

    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        format: GlFormat,
        ty: GlType,
        target: ReadPixelsTarget<'_>,
    ) -> Result<()> {
        let mut st = self.state.lock().expect("mock device state poisoned");
        let fb = st
            .framebuffers
            .get(&st.bound_framebuffer)
            .ok_or_else(|| Error::BackendError("read_pixels with no framebuffer bound".into()))?;
        let src_id = fb
            .attachment
            .ok_or_else(|| Error::BackendError("framebuffer has no color attachment".into()))?;
        let src = st
            .textures
            .get(&src_id)
            .ok_or_else(|| Error::InvalidResource("attachment texture gone".into()))?;
        if src.format != format || src.ty != ty {
            return Err(Error::BackendError(
                "read_pixels format does not match attachment".into(),
            ));
        }
        if width != src.width || height != src.height {
            return Err(Error::BackendError(
                "read_pixels rectangle does not match attachment".into(),
            ));
        }

        let bpp = format_type_n_bytes(format, ty);
        let row_bytes = width as usize * bpp;
        let src_stride = src.width as usize * bpp;
        let dst_stride = st.pack_row_stride(width, bpp);
        let needed = if height == 0 {
            0
        } else {
            (height as usize - 1) * dst_stride + row_bytes
        };
        let src_data = src.data.clone();

        match target {
            ReadPixelsTarget::Host(dst) => {
                if dst.len() < needed {
                    return Err(Error::BackendError("read_pixels destination too small".into()));
                }
                for row in 0..height as usize {
                    dst[row * dst_stride..row * dst_stride + row_bytes]
                        .copy_from_slice(&src_data[row * src_stride..row * src_stride + row_bytes]);
                }
                st.counters.read_pixels_host += 1;
            }
            ReadPixelsTarget::BoundPbo(offset) => {
                let buf_id = st.bound_buffer(BufferTarget::PixelPack);
                let buf = st
                    .buffers
                    .get_mut(&buf_id)
                    .ok_or_else(|| Error::BackendError("no PIXEL_PACK buffer bound".into()))?;
                if offset + needed > buf.data.len() {
                    return Err(Error::BackendError("read_pixels PBO range too small".into()));
                }
                for row in 0..height as usize {
                    let dst_off = offset + row * dst_stride;
                    buf.data[dst_off..dst_off + row_bytes]
                        .copy_from_slice(&src_data[row * src_stride..row * src_stride + row_bytes]);
                }
                st.counters.read_pixels_pbo += 1;
            }
        }
        Ok(())
    }
}
