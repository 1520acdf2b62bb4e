use crate::device::Device;
use crate::error::{Result, VulkanError};
use crate::render_pass::RenderPass;
use crate::shader::ShaderModule;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::ffi::CStr;
use std::mem;

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Stages that see the push-constant block.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// 2D position plus RGB color, matching `layout(location = 0/1)` in the vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: mem::size_of::<[f32; 2]>() as u32,
            },
        ]
    }
}

pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

pub const TRIANGLE_INDICES: [u16; 3] = [0, 1, 2];

/// What the pipeline consumes besides its shaders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineInputs {
    /// Bind [`Vertex`] at binding 0; otherwise the vertex shader generates positions.
    pub vertex_input: bool,
    /// Size of the push-constant block in bytes; 0 for none.
    pub push_constant_size: u32,
}

/// Graphics pipeline for the render-pass path. Viewport and scissor are dynamic.
pub struct GraphicsPipeline<'d> {
    device: &'d Device<'d>,
    layout: vk::PipelineLayout,
    raw: vk::Pipeline,
}

impl<'d> GraphicsPipeline<'d> {
    pub fn new(
        device: &'d Device<'d>,
        render_pass: &RenderPass<'_>,
        vertex_shader: &ShaderModule<'_>,
        fragment_shader: &ShaderModule<'_>,
        inputs: PipelineInputs,
    ) -> Result<Self> {
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader.raw())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader.raw())
                .name(ENTRY_POINT)
                .build(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state_info = if inputs.vertex_input {
            vk::PipelineVertexInputStateCreateInfo::builder()
                .vertex_binding_descriptions(&bindings)
                .vertex_attribute_descriptions(&attributes)
        } else {
            vk::PipelineVertexInputStateCreateInfo::builder()
        };

        let input_assembly_state_info = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the values come from vkCmdSetViewport/vkCmdSetScissor.
        let viewport_state_info = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state_info = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample_state_info = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blend_state_info = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let push_constant_ranges = [vk::PushConstantRange {
            stage_flags: PUSH_CONSTANT_STAGES,
            offset: 0,
            size: inputs.push_constant_size,
        }];
        let layout_create_info = if inputs.push_constant_size > 0 {
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&push_constant_ranges)
        } else {
            vk::PipelineLayoutCreateInfo::builder()
        };
        let layout = unsafe { device.raw().create_pipeline_layout(&layout_create_info, None) }
            .map_err(VulkanError::creation("PipelineLayout"))?;

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_state_info)
            .viewport_state(&viewport_state_info)
            .rasterization_state(&rasterization_state_info)
            .multisample_state(&multisample_state_info)
            .color_blend_state(&color_blend_state_info)
            .dynamic_state(&dynamic_state_info)
            .layout(layout)
            .render_pass(render_pass.raw())
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .raw()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };
        match pipelines {
            Ok(pipelines) if !pipelines.is_empty() => Ok(Self {
                device,
                layout,
                raw: pipelines[0],
            }),
            Ok(_) => {
                unsafe { device.raw().destroy_pipeline_layout(layout, None) };
                Err(VulkanError::creation("GraphicsPipeline")(vk::Result::ERROR_UNKNOWN))
            }
            Err((partial, result)) => unsafe {
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    device.raw().destroy_pipeline(pipeline, None);
                }
                device.raw().destroy_pipeline_layout(layout, None);
                Err(VulkanError::creation("GraphicsPipeline")(result))
            },
        }
    }

    pub fn raw(&self) -> vk::Pipeline {
        self.raw
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_pipeline(self.raw, None);
            self.device.raw().destroy_pipeline_layout(self.layout, None);
        }
    }
}
