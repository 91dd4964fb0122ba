/// GlStagingBuffer - the pixel buffer object used as a transfer
/// intermediate between host memory and a texture.
///
/// The staging buffer is itself a small dirty-tracked memory: its GL
/// data store and its host backing bytes go stale against each other as
/// the two sides are written, and each map reconciles lazily. It is
/// owned exclusively by one PBO memory object and sized exactly to that
/// object's byte size, once, at construction.
///
/// All GL-touching methods take the device and therefore run on the
/// context thread; the owning memory object dispatches around them. The
/// internal mutex is a leaf lock: it is never held while waiting on
/// anything.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::gl::{BufferTarget, BufferUsage, GlContext, GlDevice};
use crate::memory::MapAccess;
use crate::{prism_trace, prism_warn};

#[derive(Debug)]
struct BufferState {
    /// Binding target for the next use (pack = download, unpack = upload)
    target: BufferTarget,
    /// Host bytes are newer than the GL data store
    need_upload: bool,
    /// GL data store is newer than the host bytes
    need_download: bool,
    /// Host backing; lazily allocated, or the caller's buffer moved in
    data: Option<Vec<u8>>,
    /// Active CPU mappings (the backing must not move while > 0)
    cpu_maps: usize,
}

/// A GL pixel buffer object plus its host backing bytes.
pub struct GlStagingBuffer {
    context: Arc<GlContext>,
    id: u32,
    size: usize,
    state: Mutex<BufferState>,
}

impl GlStagingBuffer {
    /// Allocate the GL data store with a streaming-usage hint.
    ///
    /// Runs on the context thread via dispatch; the caller may be on any
    /// thread.
    pub(crate) fn new(context: Arc<GlContext>, size: usize) -> Result<Arc<Self>> {
        let id = context.dispatch(move |dev| -> Result<u32> {
            let id = dev.gen_buffer();
            dev.bind_buffer(BufferTarget::PixelUnpack, id);
            let created =
                dev.buffer_data(BufferTarget::PixelUnpack, size, None, BufferUsage::StreamDraw);
            dev.bind_buffer(BufferTarget::PixelUnpack, 0);
            match created {
                Ok(()) => Ok(id),
                Err(e) => {
                    dev.delete_buffer(id);
                    Err(e)
                }
            }
        })?;

        prism_trace!("prismgl::memory", "generated pbo {} ({} bytes)", id, size);

        Ok(Arc::new(Self {
            context,
            id,
            size,
            state: Mutex::new(BufferState {
                target: BufferTarget::PixelUnpack,
                need_upload: false,
                need_download: false,
                data: None,
                cpu_maps: 0,
            }),
        }))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().expect("staging buffer state poisoned")
    }

    /// Set the binding target for the next use. The same buffer serves
    /// both roles, so this is mutated immediately before each transfer.
    pub(crate) fn set_target(&self, target: BufferTarget) {
        self.lock().target = target;
    }

    /// Adopt caller-supplied bytes as the host backing (zero-copy wrap).
    /// Only valid before the buffer is handed out for mapping.
    pub(crate) fn set_backing(&self, data: Vec<u8>) -> Result<()> {
        if data.len() != self.size {
            return Err(Error::InvalidResource(format!(
                "wrapped data is {} bytes, staging buffer needs {}",
                data.len(),
                self.size
            )));
        }
        let mut st = self.lock();
        st.data = Some(data);
        Ok(())
    }

    /// Mark the host backing as newer than the GL data store
    pub(crate) fn mark_need_upload(&self) {
        self.lock().need_upload = true;
    }

    pub fn needs_upload(&self) -> bool {
        self.lock().need_upload
    }

    pub fn needs_download(&self) -> bool {
        self.lock().need_download
    }

    /// Snapshot of the host backing bytes, if any
    pub(crate) fn backing_snapshot(&self) -> Option<Vec<u8>> {
        self.lock().data.clone()
    }

    /// Map for GL-side use: make the GL data store current and return
    /// the buffer id for binding.
    ///
    /// A READ map pushes pending host bytes into the data store first.
    /// On error the dirty state is left unchanged.
    pub(crate) fn map_gl(&self, dev: &mut dyn GlDevice, access: MapAccess) -> Result<u32> {
        let mut st = self.lock();
        if access.contains(MapAccess::READ) && st.need_upload {
            if let Some(data) = st.data.as_ref() {
                let target = st.target;
                dev.bind_buffer(target, self.id);
                let written = dev.buffer_sub_data(target, 0, data);
                dev.bind_buffer(target, 0);
                written?;
            }
            st.need_upload = false;
        }
        Ok(self.id)
    }

    /// Release a GL-side map. A GL write leaves the data store newer
    /// than the host bytes.
    pub(crate) fn unmap_gl(&self, access: MapAccess) {
        if access.contains(MapAccess::WRITE) {
            let mut st = self.lock();
            st.need_download = true;
            st.need_upload = false;
        }
    }

    /// Map for CPU access: make the host bytes current and return a
    /// pointer/length pair into them.
    ///
    /// A READ map pulls the GL data store into the host backing first.
    /// On error the dirty state is left unchanged and nothing stays
    /// mapped.
    pub(crate) fn map_cpu(
        &self,
        dev: &mut dyn GlDevice,
        access: MapAccess,
    ) -> Result<(*mut u8, usize)> {
        let mut st = self.lock();
        if st.data.is_none() {
            st.data = Some(vec![0; self.size]);
        }
        if access.contains(MapAccess::READ) && st.need_download {
            let target = st.target;
            dev.bind_buffer(target, self.id);
            let read = {
                let data = st.data.as_mut().expect("host backing just ensured");
                dev.get_buffer_sub_data(target, 0, data)
            };
            dev.bind_buffer(target, 0);
            read?;
            st.need_download = false;
        }
        st.cpu_maps += 1;
        let data = st.data.as_mut().expect("host backing just ensured");
        Ok((data.as_mut_ptr(), data.len()))
    }

    /// Run `fill` over the host backing (allocating it if needed). The
    /// direct readback fallback uses this to land texture bytes straight
    /// in the backing, bypassing the GL data store; on success the
    /// backing counts as the current side.
    pub(crate) fn fill_backing<F>(&self, fill: F) -> Result<()>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        let mut st = self.lock();
        if st.data.is_none() {
            st.data = Some(vec![0; self.size]);
        }
        let data = st.data.as_mut().expect("host backing just ensured");
        fill(data)?;
        st.need_download = false;
        Ok(())
    }

    /// Release a CPU map. A CPU write leaves the host bytes newer than
    /// the GL data store.
    pub(crate) fn unmap_cpu(&self, access: MapAccess) {
        let mut st = self.lock();
        debug_assert!(st.cpu_maps > 0, "unbalanced staging buffer unmap");
        st.cpu_maps = st.cpu_maps.saturating_sub(1);
        if access.contains(MapAccess::WRITE) {
            st.need_upload = true;
            st.need_download = false;
        }
    }
}

impl Drop for GlStagingBuffer {
    fn drop(&mut self) {
        let id = self.id;
        if self.context.try_dispatch(move |dev| dev.delete_buffer(id)).is_none() {
            prism_warn!("prismgl::memory", "leaking pbo {}: context is gone", id);
        }
    }
}

impl std::fmt::Debug for GlStagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlStagingBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}
