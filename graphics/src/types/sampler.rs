//! Sampler descriptors.
//!
//! Samplers are immutable once created and usually live in the bindless
//! sampler table for the lifetime of the device.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

/// Depth comparison applied by shadow samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Descriptor for creating a sampler.
///
/// The default samples nearest texels, clamps to the edge and covers every
/// mip level.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor {
    pub label: Option<String>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub compare: Option<CompareFunction>,
    /// 1 disables anisotropic filtering.
    pub anisotropy_clamp: u16,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::filtered(FilterMode::Nearest)
    }
}

impl SamplerDescriptor {
    /// Same filter for magnification, minification and mip selection.
    pub fn filtered(filter: FilterMode) -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: filter,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
        }
    }

    pub fn linear() -> Self {
        Self::filtered(FilterMode::Linear)
    }

    pub fn nearest() -> Self {
        Self::filtered(FilterMode::Nearest)
    }

    /// Linear comparison sampler for percentage-closer shadow lookups.
    pub fn shadow(compare: CompareFunction) -> Self {
        Self {
            compare: Some(compare),
            ..Self::linear()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Applies `mode` to all three coordinates.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    /// Clamped to at least 1.
    pub fn with_anisotropy(mut self, level: u16) -> Self {
        self.anisotropy_clamp = level.max(1);
        self
    }

    /// Whether sampling goes through a depth comparison.
    pub fn is_comparison(&self) -> bool {
        self.compare.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_sets_every_filter() {
        let desc = SamplerDescriptor::linear();
        assert_eq!(desc.mag_filter, FilterMode::Linear);
        assert_eq!(desc.min_filter, FilterMode::Linear);
        assert_eq!(desc.mipmap_filter, FilterMode::Linear);
        assert_eq!(SamplerDescriptor::default(), SamplerDescriptor::nearest());
    }

    #[test]
    fn test_shadow_sampler() {
        let desc = SamplerDescriptor::shadow(CompareFunction::LessEqual)
            .with_address_mode(AddressMode::ClampToBorder);
        assert!(desc.is_comparison());
        assert_eq!(desc.address_mode_w, AddressMode::ClampToBorder);
        assert!(!SamplerDescriptor::linear().is_comparison());
    }

    #[test]
    fn test_anisotropy_floor() {
        assert_eq!(SamplerDescriptor::linear().with_anisotropy(0).anisotropy_clamp, 1);
        assert_eq!(SamplerDescriptor::linear().with_anisotropy(16).anisotropy_clamp, 16);
    }
}
