/// Video frame geometry: per-plane dimensions, strides, offsets, and
/// alignment padding.

use crate::video::format::VideoFormat;

/// Maximum number of planes in any supported format
pub const MAX_PLANES: usize = 4;

/// Multiview layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiviewMode {
    /// Single view
    #[default]
    Mono,
    /// One full plane set per view, stored separately
    Separated,
}

/// Padding and stride alignment applied to a frame allocation.
///
/// Padding rows/columns surround the real pixels of each plane; chroma
/// planes of subsampled formats take half the padding.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoAlignment {
    pub padding_top: u32,
    pub padding_bottom: u32,
    pub padding_left: u32,
    pub padding_right: u32,
    /// Per-plane stride alignment in bytes (0 = none)
    pub stride_align: [u32; MAX_PLANES],
}

impl VideoAlignment {
    /// Padding applied to `plane`, halved for subsampled chroma planes
    fn plane_padding(&self, format: VideoFormat, plane: usize) -> (u32, u32, u32, u32) {
        if format.is_yuv() && plane > 0 {
            (
                self.padding_top / 2,
                self.padding_bottom / 2,
                self.padding_left / 2,
                self.padding_right / 2,
            )
        } else {
            (
                self.padding_top,
                self.padding_bottom,
                self.padding_left,
                self.padding_right,
            )
        }
    }
}

fn align_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Complete geometry of a video frame: format, dimensions, views, and
/// the per-plane strides/offsets of its (possibly padded) allocation.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    format: VideoFormat,
    width: u32,
    height: u32,
    views: u32,
    multiview_mode: MultiviewMode,
    stride: [u32; MAX_PLANES],
    offset: [usize; MAX_PLANES],
    size: usize,
}

impl VideoInfo {
    /// Geometry for an unpadded frame
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self::with_alignment(format, width, height, &VideoAlignment::default())
    }

    /// Geometry for a frame padded per `valign`
    pub fn with_alignment(
        format: VideoFormat,
        width: u32,
        height: u32,
        valign: &VideoAlignment,
    ) -> Self {
        let mut info = Self {
            format,
            width,
            height,
            views: 1,
            multiview_mode: MultiviewMode::Mono,
            stride: [0; MAX_PLANES],
            offset: [0; MAX_PLANES],
            size: 0,
        };

        let mut offset = 0usize;
        for plane in 0..format.n_planes() {
            let (pad_top, pad_bottom, pad_left, pad_right) =
                valign.plane_padding(format, plane);
            let bpp = format.plane_texture_type(plane).bytes_per_pixel() as u32;
            let row_pixels = format.plane_width(plane, width) + pad_left + pad_right;
            let stride = align_up(row_pixels * bpp, valign.stride_align[plane]);
            let rows = format.plane_height(plane, height) + pad_top + pad_bottom;

            info.stride[plane] = stride;
            info.offset[plane] = offset;
            offset += stride as usize * rows as usize;
        }
        info.size = offset;
        info
    }

    /// Set the number of views and the multiview layout
    pub fn set_multiview(&mut self, mode: MultiviewMode, views: u32) {
        self.multiview_mode = mode;
        self.views = views.max(1);
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn views(&self) -> u32 {
        self.views
    }

    pub fn multiview_mode(&self) -> MultiviewMode {
        self.multiview_mode
    }

    pub fn n_planes(&self) -> usize {
        self.format.n_planes()
    }

    /// Total byte size of one view's allocation (all planes, padded)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Width in samples of `plane` (no padding)
    pub fn plane_width(&self, plane: usize) -> u32 {
        self.format.plane_width(plane, self.width)
    }

    /// Height in rows of `plane` (no padding)
    pub fn plane_height(&self, plane: usize) -> u32 {
        self.format.plane_height(plane, self.height)
    }

    /// Byte stride of `plane`, alignment applied
    pub fn plane_stride(&self, plane: usize) -> u32 {
        self.stride[plane]
    }

    /// Byte offset of `plane` within a full-frame allocation
    pub fn plane_offset(&self, plane: usize) -> usize {
        self.offset[plane]
    }

    /// Byte size of the padded allocation backing `plane`
    pub fn plane_size(&self, plane: usize, valign: &VideoAlignment) -> usize {
        let (pad_top, pad_bottom, _, _) = valign.plane_padding(self.format, plane);
        let rows = self.plane_height(plane) + pad_top + pad_bottom;
        self.stride[plane] as usize * rows as usize
    }

    /// Byte offset of the first real pixel inside the padded allocation
    /// backing `plane` (skips padding rows and left padding columns).
    pub fn plane_start(&self, plane: usize, valign: &VideoAlignment) -> usize {
        let (pad_top, _, pad_left, _) = valign.plane_padding(self.format, plane);
        let bpp = self.format.plane_texture_type(plane).bytes_per_pixel();
        pad_top as usize * self.stride[plane] as usize + pad_left as usize * bpp
    }
}
