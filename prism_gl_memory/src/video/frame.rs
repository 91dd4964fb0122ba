/// Multi-plane memory container populated by the allocator.

use std::sync::Arc;

use crate::memory::GlMemory;
use crate::video::format::VideoFormat;
use crate::video::info::{VideoInfo, MAX_PLANES};

/// Per-view description of the planes attached to a buffer.
///
/// One meta is attached for every view of a multiview frame; `n_planes`
/// memories starting at `view * n_planes` belong to it.
#[derive(Debug, Clone)]
pub struct VideoMeta {
    pub view: u32,
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub n_planes: usize,
    pub offset: [usize; MAX_PLANES],
    pub stride: [u32; MAX_PLANES],
}

impl VideoMeta {
    pub fn from_info(info: &VideoInfo, view: u32) -> Self {
        let mut offset = [0usize; MAX_PLANES];
        let mut stride = [0u32; MAX_PLANES];
        for plane in 0..info.n_planes() {
            offset[plane] = info.plane_offset(plane);
            stride[plane] = info.plane_stride(plane);
        }
        Self {
            view,
            format: info.format(),
            width: info.width(),
            height: info.height(),
            n_planes: info.n_planes(),
            offset,
            stride,
        }
    }
}

/// Container for the memories backing one video frame.
///
/// Planes are attached in view-major, plane-minor order by
/// `setup_buffer`. On allocation failure the container keeps whatever
/// was attached so far; cleanup is the caller's responsibility.
#[derive(Default)]
pub struct VideoMemoryBuffer {
    memories: Vec<Arc<dyn GlMemory>>,
    metas: Vec<VideoMeta>,
}

impl VideoMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_memory(&mut self, memory: Arc<dyn GlMemory>) {
        self.memories.push(memory);
    }

    pub fn add_meta(&mut self, meta: VideoMeta) {
        self.metas.push(meta);
    }

    pub fn n_memories(&self) -> usize {
        self.memories.len()
    }

    pub fn memory(&self, index: usize) -> Option<&Arc<dyn GlMemory>> {
        self.memories.get(index)
    }

    pub fn metas(&self) -> &[VideoMeta] {
        &self.metas
    }
}
