//! Render passes, pipelines and descriptor objects.

use std::ffi::CStr;

use ash::vk;

use super::conversion::{
    convert_cull_mode, convert_descriptor_type, convert_image_format, convert_load_op,
    convert_sample_count, convert_shader_stages, convert_store_op, convert_topology,
    convert_vertex_format,
};
use crate::error::{GraphicsError, GraphicsResult};
use crate::types::{
    AttachmentDescriptor, DescriptorPoolDescriptor, DescriptorSetLayoutDescriptor,
    GraphicsPipelineDescriptor, RenderPassDescriptor,
};

const ENTRY_POINT: &CStr = c"main";

/// Create a single-subpass render pass.
///
/// Attachments keep their attachment layout on both ends of the pass; the
/// command buffer issues the transitions around it as explicit barriers.
pub fn create_render_pass(
    device: &ash::Device,
    desc: &RenderPassDescriptor,
) -> GraphicsResult<vk::RenderPass> {
    let attachment = |a: &AttachmentDescriptor, layout: vk::ImageLayout| {
        vk::AttachmentDescription::default()
            .format(convert_image_format(a.format))
            .samples(convert_sample_count(a.samples))
            .load_op(convert_load_op(a.load_op))
            .store_op(convert_store_op(a.store_op))
            .stencil_load_op(convert_load_op(a.load_op))
            .stencil_store_op(convert_store_op(a.store_op))
            .initial_layout(layout)
            .final_layout(layout)
    };

    let mut attachments: Vec<vk::AttachmentDescription> = desc
        .color_attachments
        .iter()
        .map(|a| attachment(a, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
        .collect();
    let color_refs: Vec<vk::AttachmentReference> = (0..desc.color_attachments.len())
        .map(|i| vk::AttachmentReference {
            attachment: i as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();

    let depth_ref = desc.depth_attachment.as_ref().map(|depth| {
        attachments.push(attachment(
            depth,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));
        vk::AttachmentReference {
            attachment: desc.color_attachments.len() as u32,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let subpasses = [subpass];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    unsafe { device.create_render_pass(&info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create render pass: {:?}", e))
    })
}

/// Create a descriptor set layout; bindless bindings are partially bound and
/// updatable after bind.
pub fn create_descriptor_set_layout(
    device: &ash::Device,
    desc: &DescriptorSetLayoutDescriptor,
) -> GraphicsResult<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
        .bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.binding)
                .descriptor_type(convert_descriptor_type(b.ty))
                .descriptor_count(b.count)
                .stage_flags(convert_shader_stages(b.stages))
        })
        .collect();

    let binding_flags: Vec<vk::DescriptorBindingFlags> = desc
        .bindings
        .iter()
        .map(|b| {
            if b.bindless {
                vk::DescriptorBindingFlags::PARTIALLY_BOUND
                    | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            } else {
                vk::DescriptorBindingFlags::empty()
            }
        })
        .collect();
    let mut flags_info =
        vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

    let mut info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    if desc.has_bindless() {
        info = info
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .push_next(&mut flags_info);
    }

    unsafe { device.create_descriptor_set_layout(&info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create descriptor set layout: {:?}",
            e
        ))
    })
}

pub fn create_descriptor_pool(
    device: &ash::Device,
    desc: &DescriptorPoolDescriptor,
) -> GraphicsResult<vk::DescriptorPool> {
    let pool_sizes: Vec<vk::DescriptorPoolSize> = desc
        .sizes
        .iter()
        .map(|(ty, count)| vk::DescriptorPoolSize {
            ty: convert_descriptor_type(*ty),
            descriptor_count: *count,
        })
        .collect();

    let mut flags = vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
    if desc.update_after_bind {
        flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
    }

    let info = vk::DescriptorPoolCreateInfo::default()
        .flags(flags)
        .max_sets(desc.max_sets)
        .pool_sizes(&pool_sizes);

    unsafe { device.create_descriptor_pool(&info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create descriptor pool: {:?}", e))
    })
}

/// Create a pipeline layout with one push constant range visible to all stages.
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_size: u32,
) -> GraphicsResult<vk::PipelineLayout> {
    let push_constants = [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::ALL,
        offset: 0,
        size: push_constant_size,
    }];
    let mut info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
    if push_constant_size > 0 {
        info = info.push_constant_ranges(&push_constants);
    }

    unsafe { device.create_pipeline_layout(&info, None) }.map_err(|e| {
        GraphicsError::PipelineCreationFailed(format!("Failed to create pipeline layout: {:?}", e))
    })
}

fn create_shader_module(device: &ash::Device, spirv: &[u32]) -> GraphicsResult<vk::ShaderModule> {
    if spirv.is_empty() {
        return Err(GraphicsError::InvalidParameter("empty SPIR-V module".into()));
    }
    let info = vk::ShaderModuleCreateInfo::default().code(spirv);
    unsafe { device.create_shader_module(&info, None) }.map_err(|e| {
        GraphicsError::PipelineCreationFailed(format!("Failed to create shader module: {:?}", e))
    })
}

/// Create a graphics pipeline for subpass 0 of `render_pass`.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    desc: &GraphicsPipelineDescriptor,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    color_attachment_count: usize,
) -> GraphicsResult<vk::Pipeline> {
    let vertex_module = create_shader_module(device, &desc.vertex_spirv)?;
    let fragment_module = match desc.fragment_spirv.as_deref() {
        Some(spirv) => match create_shader_module(device, spirv) {
            Ok(module) => Some(module),
            Err(e) => {
                unsafe { device.destroy_shader_module(vertex_module, None) };
                return Err(e);
            }
        },
        None => None,
    };

    let mut shader_stages = vec![
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(ENTRY_POINT),
    ];
    if let Some(module) = fragment_module {
        shader_stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(module)
                .name(ENTRY_POINT),
        );
    }

    let binding_descriptions: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_buffers
        .iter()
        .enumerate()
        .map(|(i, buffer)| {
            vk::VertexInputBindingDescription::default()
                .binding(i as u32)
                .stride(buffer.stride)
                .input_rate(if buffer.per_instance {
                    vk::VertexInputRate::INSTANCE
                } else {
                    vk::VertexInputRate::VERTEX
                })
        })
        .collect();

    let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_buffers
        .iter()
        .enumerate()
        .flat_map(|(i, buffer)| {
            buffer.attributes.iter().map(move |attr| {
                vk::VertexInputAttributeDescription::default()
                    .location(attr.location)
                    .binding(i as u32)
                    .format(convert_vertex_format(attr.format))
                    .offset(attr.offset)
            })
        })
        .collect();

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(convert_topology(desc.topology))
        .primitive_restart_enable(false);

    // Viewport and scissor are dynamic
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(convert_cull_mode(desc.cull_mode))
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let blend = if desc.alpha_blend {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    } else {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
    };
    let color_blend_attachments = vec![blend; color_attachment_count];
    let color_blend_state =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let result = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    // Shader modules are baked into the pipeline; destroy them now.
    unsafe {
        device.destroy_shader_module(vertex_module, None);
        if let Some(module) = fragment_module {
            device.destroy_shader_module(module, None);
        }
    }

    let pipelines = result.map_err(|(_, e)| {
        GraphicsError::PipelineCreationFailed(format!(
            "Failed to create graphics pipeline: {:?}",
            e
        ))
    })?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::PipelineCreationFailed("no pipeline returned".into()))
}

pub fn create_compute_pipeline(
    device: &ash::Device,
    spirv: &[u32],
    layout: vk::PipelineLayout,
) -> GraphicsResult<vk::Pipeline> {
    let module = create_shader_module(device, spirv)?;

    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(module)
        .name(ENTRY_POINT);
    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(layout);

    let result = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };
    unsafe { device.destroy_shader_module(module, None) };

    let pipelines = result.map_err(|(_, e)| {
        GraphicsError::PipelineCreationFailed(format!("Failed to create compute pipeline: {:?}", e))
    })?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GraphicsError::PipelineCreationFailed("no pipeline returned".into()))
}
