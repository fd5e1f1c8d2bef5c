//! Conversions between [`NativeHandle`] words and typed Vulkan handles.

use ash::vk::{self, Handle};

use crate::backend::NativeHandle;

pub fn native<T: Handle>(object: T) -> NativeHandle {
    NativeHandle::new(object.as_raw())
}

pub fn buffer(native: NativeHandle) -> vk::Buffer {
    vk::Buffer::from_raw(native.object)
}

pub fn image(native: NativeHandle) -> vk::Image {
    vk::Image::from_raw(native.object)
}

pub fn image_view(native: NativeHandle) -> vk::ImageView {
    vk::ImageView::from_raw(native.object)
}

pub fn sampler(native: NativeHandle) -> vk::Sampler {
    vk::Sampler::from_raw(native.object)
}

pub fn render_pass(native: NativeHandle) -> vk::RenderPass {
    vk::RenderPass::from_raw(native.object)
}

pub fn framebuffer(native: NativeHandle) -> vk::Framebuffer {
    vk::Framebuffer::from_raw(native.object)
}

pub fn pipeline(native: NativeHandle) -> vk::Pipeline {
    vk::Pipeline::from_raw(native.object)
}

/// Pipeline layout stored alongside a pipeline.
pub fn pipeline_layout(native: NativeHandle) -> vk::PipelineLayout {
    vk::PipelineLayout::from_raw(native.aux)
}

pub fn descriptor_set_layout(native: NativeHandle) -> vk::DescriptorSetLayout {
    vk::DescriptorSetLayout::from_raw(native.object)
}

pub fn descriptor_pool(native: NativeHandle) -> vk::DescriptorPool {
    vk::DescriptorPool::from_raw(native.object)
}

pub fn descriptor_set(native: NativeHandle) -> vk::DescriptorSet {
    vk::DescriptorSet::from_raw(native.object)
}
