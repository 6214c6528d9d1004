/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Wraps a logical device created by the bootstrap layer (Vulkan 1.3 with
/// `dynamicRendering` and `synchronization2` enabled). The device itself is
/// not destroyed here; the bootstrap layer owns its lifetime.

use ash::vk;
use ash::vk::Handle;
use pixelate_engine::pixelate::{Error, Result};
use pixelate_engine::pixelate::device::*;
use pixelate_engine::{engine_debug, engine_err, engine_error};
use std::ffi::CString;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use crate::vulkan_format::*;

const SOURCE: &str = "pixelate::vulkan";

/// Map a failed Vulkan call to an engine error, logging it
fn vk_error(result: vk::Result, context: &str) -> Error {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            engine_error!(SOURCE, "{}: out of memory ({:?})", context, result);
            Error::OutOfMemory
        }
        _ => engine_err!(SOURCE, "{}: {:?}", context, result),
    }
}

pub struct VulkanDevice {
    device: ash::Device,
    queue_family_indices: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    compute_queue: Option<vk::Queue>,
    present_queue: Option<vk::Queue>,
    /// Queues are externally synchronized; graphics, compute and present may alias
    queue_lock: Mutex<()>,
}

impl VulkanDevice {
    /// Wrap an existing logical device
    ///
    /// # Arguments
    ///
    /// * `device` - Logical device with queue 0 of every listed family created
    /// * `queue_family_indices` - Families chosen at device creation; graphics is required
    pub fn new(device: ash::Device, queue_family_indices: QueueFamilyIndices) -> Result<Self> {
        let Some(graphics_family) = queue_family_indices.graphics else {
            engine_error!(SOURCE, "VulkanDevice requires a graphics queue family");
            return Err(Error::InitializationFailed("no graphics queue family".to_string()));
        };

        let (graphics_queue, compute_queue, present_queue) = unsafe {
            (
                device.get_device_queue(graphics_family, 0),
                queue_family_indices.compute.map(|family| device.get_device_queue(family, 0)),
                queue_family_indices.present.map(|family| device.get_device_queue(family, 0)),
            )
        };

        engine_debug!(SOURCE, "VulkanDevice created (graphics family {}, compute {:?}, present {:?})",
            graphics_family, queue_family_indices.compute, queue_family_indices.present);

        Ok(Self {
            device,
            queue_family_indices,
            graphics_queue,
            compute_queue,
            present_queue,
            queue_lock: Mutex::new(()),
        })
    }

    /// Underlying ash device
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub(crate) fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    /// Hold while touching any queue
    pub(crate) fn lock_queues(&self) -> MutexGuard<'_, ()> {
        self.queue_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn queue(&self, queue: QueueType) -> Result<vk::Queue> {
        match queue {
            QueueType::Graphics => Ok(self.graphics_queue),
            QueueType::Compute => self.compute_queue.ok_or_else(|| {
                engine_error!(SOURCE, "Submit to compute queue but no compute family was configured");
                Error::InvalidResource("no compute queue".to_string())
            }),
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    fn queue_family_indices(&self) -> QueueFamilyIndices {
        self.queue_family_indices
    }

    // ===== COMMAND POOLS / BUFFERS =====

    fn create_command_pool(&self, queue_family_index: u32, flags: CommandPoolFlags) -> Result<CommandPoolHandle> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(command_pool_flags_to_vk(flags));

        let pool = unsafe { self.device.create_command_pool(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create command pool"))?;

        Ok(CommandPoolHandle(pool.as_raw()))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device.destroy_command_pool(vk_handle(pool.raw()), None);
        }
    }

    fn allocate_command_buffers(
        &self,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBufferHandle>> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(vk_handle(pool.raw()))
            .level(command_buffer_level_to_vk(level))
            .command_buffer_count(count);

        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| vk_error(e, "Failed to allocate command buffers"))?;

        Ok(buffers.into_iter().map(|cb| CommandBufferHandle(cb.as_raw())).collect())
    }

    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle, release_resources: bool) -> Result<()> {
        let flags = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };

        unsafe { self.device.reset_command_buffer(command_buffer_to_vk(command_buffer), flags) }
            .map_err(|e| vk_error(e, "Failed to reset command buffer"))
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferHandle, usage: CommandBufferUsageFlags) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage_flags_to_vk(usage));

        unsafe { self.device.begin_command_buffer(command_buffer_to_vk(command_buffer), &begin_info) }
            .map_err(|e| vk_error(e, "Failed to begin command buffer"))
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<()> {
        unsafe { self.device.end_command_buffer(command_buffer_to_vk(command_buffer)) }
            .map_err(|e| vk_error(e, "Failed to end command buffer"))
    }

    // ===== FENCES =====

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { self.device.create_fence(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create fence"))?;

        Ok(FenceHandle(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.device.destroy_fence(fence_to_vk(fence), None);
        }
    }

    fn wait_for_fences(&self, fences: &[FenceHandle], timeout_ns: u64) -> Result<()> {
        if fences.is_empty() {
            return Ok(());
        }

        let vk_fences: Vec<vk::Fence> = fences.iter().map(|&fence| fence_to_vk(fence)).collect();

        match unsafe { self.device.wait_for_fences(&vk_fences, true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(Error::Timeout(format!(
                "{} fence(s) not signaled after {} ns",
                fences.len(),
                timeout_ns
            ))),
            Err(e) => Err(vk_error(e, "Failed to wait for fences")),
        }
    }

    fn reset_fences(&self, fences: &[FenceHandle]) -> Result<()> {
        if fences.is_empty() {
            return Ok(());
        }

        let vk_fences: Vec<vk::Fence> = fences.iter().map(|&fence| fence_to_vk(fence)).collect();

        unsafe { self.device.reset_fences(&vk_fences) }
            .map_err(|e| vk_error(e, "Failed to reset fences"))
    }

    // ===== SEMAPHORES =====

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { self.device.create_semaphore(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create semaphore"))?;

        Ok(SemaphoreHandle(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.device.destroy_semaphore(semaphore_to_vk(semaphore), None);
        }
    }

    // ===== PIPELINES =====

    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle> {
        // Re-aligns the byte stream to u32 words
        let words = ash::util::read_spv(&mut Cursor::new(code)).map_err(|e| {
            engine_error!(SOURCE, "Invalid SPIR-V bytecode ({} bytes): {}", code.len(), e);
            Error::ShaderLoadFailed(format!("invalid SPIR-V: {}", e))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        let module = unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create shader module"))?;

        Ok(ShaderModuleHandle(module.as_raw()))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        unsafe {
            self.device.destroy_shader_module(vk_handle(module.raw()), None);
        }
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorSetLayoutBinding]) -> Result<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type))
                    .descriptor_count(binding.count)
                    .stage_flags(shader_stages_to_vk(binding.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create descriptor set layout"))?;

        Ok(DescriptorSetLayoutHandle(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.device.destroy_descriptor_set_layout(vk_handle(layout.raw()), None);
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<PipelineLayoutHandle> {
        let vk_set_layouts: Vec<vk::DescriptorSetLayout> = set_layouts
            .iter()
            .map(|layout| vk_handle(layout.raw()))
            .collect();

        let vk_ranges: Vec<vk::PushConstantRange> = push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: shader_stages_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&vk_set_layouts)
            .push_constant_ranges(&vk_ranges);

        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }
            .map_err(|e| vk_error(e, "Failed to create pipeline layout"))?;

        Ok(PipelineLayoutHandle(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device.destroy_pipeline_layout(vk_handle(layout.raw()), None);
        }
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<PipelineHandle> {
        // Entry point names must outlive the stage infos
        let entry_points = info
            .stages
            .iter()
            .map(|stage| {
                CString::new(stage.entry_point.as_str()).map_err(|_| {
                    engine_error!(SOURCE, "Shader entry point '{}' contains a NUL byte", stage.entry_point);
                    Error::InvalidResource(format!("bad entry point '{}'", stage.entry_point))
                })
            })
            .collect::<Result<Vec<CString>>>()?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = info
            .stages
            .iter()
            .zip(&entry_points)
            .map(|(stage, entry_point)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stages_to_vk(stage.stage))
                    .module(vk_handle(stage.module.raw()))
                    .name(entry_point)
            })
            .collect();

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = info.vertex_layout.bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: vertex_input_rate_to_vk(binding.input_rate),
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = info.vertex_layout.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(info.input_assembly.topology))
            .primitive_restart_enable(info.input_assembly.primitive_restart);

        // Viewport and scissor are dynamic, only the counts matter
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = {
            let mut state = vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(polygon_mode_to_vk(info.rasterization.polygon_mode))
                .line_width(info.rasterization.line_width)
                .cull_mode(cull_mode_to_vk(info.rasterization.cull_mode))
                .front_face(front_face_to_vk(info.rasterization.front_face));
            if let Some(bias) = info.rasterization.depth_bias {
                state = state
                    .depth_bias_enable(true)
                    .depth_bias_constant_factor(bias.constant_factor)
                    .depth_bias_slope_factor(bias.slope_factor)
                    .depth_bias_clamp(bias.clamp);
            }
            state
        };

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(info.depth_stencil.depth_test_enable)
            .depth_write_enable(info.depth_stencil.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(info.depth_stencil.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(info.depth_stencil.stencil_test_enable)
            .front(stencil_op_state_to_vk(&info.depth_stencil.front))
            .back(stencil_op_state_to_vk(&info.depth_stencil.back));

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(sample_count_to_vk(info.multisample.sample_count))
            .alpha_to_coverage_enable(info.multisample.alpha_to_coverage);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = info.color_blend_attachments
            .iter()
            .map(color_blend_attachment_to_vk)
            .collect();

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments)
            .blend_constants(info.color_blend.blend_constants);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        // Dynamic rendering: attachment formats replace the render pass
        let color_formats: Vec<vk::Format> = info.color_formats.iter().map(|&format| format_to_vk(format)).collect();
        let depth_format = info.depth_format.map(format_to_vk).unwrap_or(vk::Format::UNDEFINED);
        let stencil_format = match info.depth_format {
            Some(format) if has_stencil(format) => format_to_vk(format),
            _ => vk::Format::UNDEFINED,
        };
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .stencil_attachment_format(stencil_format);

        let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .depth_stencil_state(&depth_stencil_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(vk_handle(info.layout.raw()));

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(&pipeline_create_info),
                None,
            )
        }
        .map_err(|(_, e)| vk_error(e, "Failed to create graphics pipeline"))?;

        let pipeline = pipelines.first().copied().ok_or_else(|| {
            engine_err!(SOURCE, "vkCreateGraphicsPipelines returned no pipeline")
        })?;

        Ok(PipelineHandle(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.device.destroy_pipeline(vk_handle(pipeline.raw()), None);
        }
    }

    // ===== RECORDING =====

    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = info.color_attachments
            .iter()
            .map(rendering_attachment_to_vk)
            .collect();
        let depth_attachment = info.depth_attachment.as_ref().map(rendering_attachment_to_vk);

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(rect_to_vk(&info.render_area))
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe {
            self.device.cmd_begin_rendering(command_buffer_to_vk(command_buffer), &rendering_info);
        }
    }

    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle) {
        unsafe {
            self.device.cmd_end_rendering(command_buffer_to_vk(command_buffer));
        }
    }

    fn cmd_bind_graphics_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer_to_vk(command_buffer),
                vk::PipelineBindPoint::GRAPHICS,
                vk_handle(pipeline.raw()),
            );
        }
    }

    fn cmd_set_viewport(&self, command_buffer: CommandBufferHandle, viewport: &Viewport) {
        unsafe {
            self.device.cmd_set_viewport(command_buffer_to_vk(command_buffer), 0, &[viewport_to_vk(viewport)]);
        }
    }

    fn cmd_set_scissor(&self, command_buffer: CommandBufferHandle, scissor: &Rect2D) {
        unsafe {
            self.device.cmd_set_scissor(command_buffer_to_vk(command_buffer), 0, &[rect_to_vk(scissor)]);
        }
    }

    fn cmd_draw(
        &self,
        command_buffer: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw(
                command_buffer_to_vk(command_buffer),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    // ===== SUBMISSION =====

    fn queue_submit(&self, queue: QueueType, submit: &SubmitInfo<'_>, fence: Option<FenceHandle>) -> Result<()> {
        let vk_queue = self.queue(queue)?;

        let command_buffers: Vec<vk::CommandBufferSubmitInfo> = submit.command_buffers
            .iter()
            .map(|&cb| vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer_to_vk(cb)))
            .collect();
        let wait_semaphores: Vec<vk::SemaphoreSubmitInfo> = submit.wait_semaphores
            .iter()
            .map(semaphore_submit_to_vk)
            .collect();
        let signal_semaphores: Vec<vk::SemaphoreSubmitInfo> = submit.signal_semaphores
            .iter()
            .map(semaphore_submit_to_vk)
            .collect();

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_semaphores)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal_semaphores);

        let vk_fence = fence.map(fence_to_vk).unwrap_or_else(vk::Fence::null);

        let _queues = self.lock_queues();
        unsafe { self.device.queue_submit2(vk_queue, std::slice::from_ref(&submit_info), vk_fence) }
            .map_err(|e| vk_error(e, "Failed to submit to queue"))
    }

    fn wait_idle(&self) -> Result<()> {
        let _queues = self.lock_queues();
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| vk_error(e, "Failed to wait idle"))
    }
}
