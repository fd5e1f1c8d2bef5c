//! Image types and descriptors.

use bitflags::bitflags;

use super::{Extent3d, Offset3d};
use crate::resources::{Handle, Image};

/// Image format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ImageFormat {
    R8Unorm,
    R16Float,
    Rg8Unorm,
    R32Float,
    R32Uint,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth16Unorm,
    Depth24PlusStencil8,
    Depth32Float,
    Depth32FloatStencil8,
}

impl ImageFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::Depth16Unorm
                | Self::Depth24PlusStencil8
                | Self::Depth32Float
                | Self::Depth32FloatStencil8
        )
    }

    /// Returns true if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32FloatStencil8)
    }

    /// Size in bytes per texel.
    pub fn block_size(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float | Self::Rg8Unorm | Self::Depth16Unorm => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Bgra8UnormSrgb
            | Self::Depth24PlusStencil8
            | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Depth32FloatStencil8 => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for images.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        /// Sampled in shaders.
        const SAMPLED = 1 << 2;
        /// Read/written as a storage image.
        const STORAGE = 1 << 3;
        const COLOR_ATTACHMENT = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
    }
}

/// Image dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageDimension {
    D1,
    #[default]
    D2,
    D3,
}

/// Descriptor for creating an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    pub label: Option<String>,
    pub dimension: ImageDimension,
    pub extent: Extent3d,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub format: ImageFormat,
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// Create a new 2D image descriptor with one mip and one layer.
    pub fn new_2d(width: u32, height: u32, format: ImageFormat, usage: ImageUsage) -> Self {
        Self {
            label: None,
            dimension: ImageDimension::D2,
            extent: Extent3d::new_2d(width, height),
            mip_levels: 1,
            array_layers: 1,
            samples: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    /// Set the array layer count.
    pub fn with_array_layers(mut self, count: u32) -> Self {
        self.array_layers = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_samples(mut self, count: u32) -> Self {
        self.samples = count;
        self
    }

    /// Number of (mip, layer) subresources.
    pub fn subresource_count(&self) -> usize {
        (self.mip_levels * self.array_layers) as usize
    }

    /// Range covering every subresource.
    pub fn full_range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange {
            base_mip: 0,
            mip_count: self.mip_levels,
            base_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, ImageFormat::default(), ImageUsage::empty())
    }
}

/// A contiguous block of mips and array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl ImageSubresourceRange {
    /// A single (mip, layer) subresource.
    pub fn single(mip: u32, layer: u32) -> Self {
        Self {
            base_mip: mip,
            mip_count: 1,
            base_layer: layer,
            layer_count: 1,
        }
    }

    /// Every layer of one mip level.
    pub fn mip(mip: u32, layer_count: u32) -> Self {
        Self {
            base_mip: mip,
            mip_count: 1,
            base_layer: 0,
            layer_count,
        }
    }

    /// Iterates `(mip, layer)` pairs, mip-major.
    pub fn iter(self) -> impl Iterator<Item = (u32, u32)> {
        let mips = self.base_mip..self.base_mip.saturating_add(self.mip_count);
        let layers = self.base_layer..self.base_layer.saturating_add(self.layer_count);
        mips.flat_map(move |mip| layers.clone().map(move |layer| (mip, layer)))
    }

    /// Whether this range lies within an image's mips and layers.
    pub fn fits(&self, desc: &ImageDescriptor) -> bool {
        self.mip_count > 0
            && self.layer_count > 0
            && self
                .base_mip
                .checked_add(self.mip_count)
                .is_some_and(|end| end <= desc.mip_levels)
            && self
                .base_layer
                .checked_add(self.layer_count)
                .is_some_and(|end| end <= desc.array_layers)
    }
}

/// How a view reinterprets its image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageViewType {
    D1,
    #[default]
    D2,
    D2Array,
    Cube,
    D3,
}

/// Descriptor for creating an image view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageViewDescriptor {
    pub label: Option<String>,
    pub image: Handle<Image>,
    pub view_type: ImageViewType,
    /// Format override; `None` uses the image's format.
    pub format: Option<ImageFormat>,
    pub range: ImageSubresourceRange,
}

impl ImageViewDescriptor {
    /// A 2D view of the first mip and layer.
    pub fn new(image: Handle<Image>) -> Self {
        Self {
            label: None,
            image,
            view_type: ImageViewType::D2,
            format: None,
            range: ImageSubresourceRange::single(0, 0),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the viewed subresource range.
    pub fn with_range(mut self, range: ImageSubresourceRange) -> Self {
        self.range = range;
        self
    }

    /// Set the view type.
    pub fn with_view_type(mut self, view_type: ImageViewType) -> Self {
        self.view_type = view_type;
        self
    }
}

/// Region of a buffer/image copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferImageCopy {
    pub buffer_offset: u64,
    /// Row length in texels; 0 means tightly packed.
    pub buffer_row_length: u32,
    pub mip_level: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub image_offset: Offset3d,
    pub image_extent: Extent3d,
}

impl BufferImageCopy {
    /// Tightly packed copy of a whole mip level of layer 0.
    pub fn whole_mip(extent: Extent3d, mip_level: u32) -> Self {
        Self {
            buffer_offset: 0,
            buffer_row_length: 0,
            mip_level,
            base_layer: 0,
            layer_count: 1,
            image_offset: Offset3d::default(),
            image_extent: extent.mip(mip_level),
        }
    }

    /// Subresources the copy touches on the image side.
    pub fn range(&self) -> ImageSubresourceRange {
        ImageSubresourceRange {
            base_mip: self.mip_level,
            mip_count: 1,
            base_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }
}

/// Region of an image-to-image copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageCopy {
    pub src: ImageSubresourceRange,
    pub src_offset: Offset3d,
    pub dst: ImageSubresourceRange,
    pub dst_offset: Offset3d,
    pub extent: Extent3d,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_classification() {
        assert!(ImageFormat::Depth32Float.is_depth_stencil());
        assert!(!ImageFormat::Depth32Float.has_stencil());
        assert!(ImageFormat::Depth24PlusStencil8.has_stencil());
        assert!(!ImageFormat::Rgba8Unorm.is_depth_stencil());
        assert_eq!(ImageFormat::Rgba16Float.block_size(), 8);
    }

    #[test]
    fn test_range_iteration_is_mip_major() {
        let range = ImageSubresourceRange {
            base_mip: 1,
            mip_count: 2,
            base_layer: 0,
            layer_count: 2,
        };
        let pairs: Vec<_> = range.iter().collect();
        assert_eq!(pairs, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);
    }

    #[test]
    fn test_range_fits() {
        let desc = ImageDescriptor::new_2d(64, 64, ImageFormat::Rgba8Unorm, ImageUsage::SAMPLED)
            .with_mip_levels(4)
            .with_array_layers(2);
        assert_eq!(desc.subresource_count(), 8);
        assert!(desc.full_range().fits(&desc));
        assert!(ImageSubresourceRange::single(3, 1).fits(&desc));
        assert!(!ImageSubresourceRange::single(4, 0).fits(&desc));
        assert!(!ImageSubresourceRange::mip(0, 3).fits(&desc));
    }

    #[test]
    fn test_fits_rejects_overflowing_ranges() {
        let desc = ImageDescriptor::new_2d(8, 8, ImageFormat::Rgba8Unorm, ImageUsage::SAMPLED)
            .with_mip_levels(4);
        assert!(ImageSubresourceRange::single(3, 0).fits(&desc));
        assert!(!ImageSubresourceRange::single(4, 0).fits(&desc));

        let mut range = ImageSubresourceRange::single(u32::MAX, 0);
        range.mip_count = 2;
        assert!(!range.fits(&desc));

        let mut range = ImageSubresourceRange::single(0, u32::MAX);
        range.layer_count = u32::MAX;
        assert!(!range.fits(&desc));
    }
}
