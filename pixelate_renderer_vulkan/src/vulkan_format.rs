/// Engine type to Vulkan type conversions
///
/// Pure mapping functions, no device access. Handles cross the seam as raw
/// `u64` values and are rebuilt with `vk::Handle::from_raw`.

use ash::vk;
use ash::vk::Handle;
use pixelate_engine::pixelate::device::*;

// ===== HANDLES =====

pub(crate) fn vk_handle<H: Handle>(raw: u64) -> H {
    H::from_raw(raw)
}

pub(crate) fn command_buffer_to_vk(handle: CommandBufferHandle) -> vk::CommandBuffer {
    vk_handle(handle.raw())
}

pub(crate) fn fence_to_vk(handle: FenceHandle) -> vk::Fence {
    vk_handle(handle.raw())
}

pub(crate) fn semaphore_to_vk(handle: SemaphoreHandle) -> vk::Semaphore {
    vk_handle(handle.raw())
}

pub(crate) fn image_view_to_vk(handle: ImageViewHandle) -> vk::ImageView {
    vk_handle(handle.raw())
}

// ===== FORMATS =====

pub(crate) fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::Undefined => vk::Format::UNDEFINED,
        Format::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        Format::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        Format::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        Format::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        Format::R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        Format::D16_UNORM => vk::Format::D16_UNORM,
        Format::D32_FLOAT => vk::Format::D32_SFLOAT,
        Format::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        Format::R32_SFLOAT => vk::Format::R32_SFLOAT,
        Format::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// Swapchain surface formats the engine can render to
pub(crate) fn vk_to_format(format: vk::Format) -> Option<Format> {
    match format {
        vk::Format::R8G8B8A8_SRGB => Some(Format::R8G8B8A8_SRGB),
        vk::Format::R8G8B8A8_UNORM => Some(Format::R8G8B8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(Format::B8G8R8A8_SRGB),
        vk::Format::B8G8R8A8_UNORM => Some(Format::B8G8R8A8_UNORM),
        vk::Format::R16G16B16A16_SFLOAT => Some(Format::R16G16B16A16_SFLOAT),
        _ => None,
    }
}

pub(crate) fn has_stencil(format: Format) -> bool {
    format == Format::D24_UNORM_S8_UINT
}

pub(crate) fn extent_to_vk(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D { width: extent.width, height: extent.height }
}

pub(crate) fn rect_to_vk(rect: &Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: rect.offset.x, y: rect.offset.y },
        extent: extent_to_vk(rect.extent),
    }
}

pub(crate) fn viewport_to_vk(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

// ===== COMMANDS / SYNC =====

pub(crate) fn command_pool_flags_to_vk(flags: CommandPoolFlags) -> vk::CommandPoolCreateFlags {
    let mut vk_flags = vk::CommandPoolCreateFlags::empty();
    if flags.contains(CommandPoolFlags::TRANSIENT) {
        vk_flags |= vk::CommandPoolCreateFlags::TRANSIENT;
    }
    if flags.contains(CommandPoolFlags::RESET_COMMAND_BUFFER) {
        vk_flags |= vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
    }
    vk_flags
}

pub(crate) fn command_buffer_level_to_vk(level: CommandBufferLevel) -> vk::CommandBufferLevel {
    match level {
        CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
        CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
    }
}

pub(crate) fn usage_flags_to_vk(flags: CommandBufferUsageFlags) -> vk::CommandBufferUsageFlags {
    let mut vk_flags = vk::CommandBufferUsageFlags::empty();
    if flags.contains(CommandBufferUsageFlags::ONE_TIME_SUBMIT) {
        vk_flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
    }
    if flags.contains(CommandBufferUsageFlags::SIMULTANEOUS_USE) {
        vk_flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
    }
    vk_flags
}

pub(crate) fn pipeline_stages_to_vk(stages: PipelineStageFlags) -> vk::PipelineStageFlags2 {
    const MAPPING: [(PipelineStageFlags, vk::PipelineStageFlags2); 13] = [
        (PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags2::TOP_OF_PIPE),
        (PipelineStageFlags::DRAW_INDIRECT, vk::PipelineStageFlags2::DRAW_INDIRECT),
        (PipelineStageFlags::VERTEX_INPUT, vk::PipelineStageFlags2::VERTEX_INPUT),
        (PipelineStageFlags::VERTEX_SHADER, vk::PipelineStageFlags2::VERTEX_SHADER),
        (PipelineStageFlags::FRAGMENT_SHADER, vk::PipelineStageFlags2::FRAGMENT_SHADER),
        (PipelineStageFlags::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS),
        (PipelineStageFlags::LATE_FRAGMENT_TESTS, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        (PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT),
        (PipelineStageFlags::COMPUTE_SHADER, vk::PipelineStageFlags2::COMPUTE_SHADER),
        (PipelineStageFlags::TRANSFER, vk::PipelineStageFlags2::TRANSFER),
        (PipelineStageFlags::BOTTOM_OF_PIPE, vk::PipelineStageFlags2::BOTTOM_OF_PIPE),
        (PipelineStageFlags::ALL_GRAPHICS, vk::PipelineStageFlags2::ALL_GRAPHICS),
        (PipelineStageFlags::ALL_COMMANDS, vk::PipelineStageFlags2::ALL_COMMANDS),
    ];

    MAPPING
        .iter()
        .filter(|(engine, _)| stages.contains(*engine))
        .fold(vk::PipelineStageFlags2::empty(), |acc, (_, vk_stage)| acc | *vk_stage)
}

pub(crate) fn semaphore_submit_to_vk(info: &SemaphoreSubmitInfo) -> vk::SemaphoreSubmitInfo<'static> {
    vk::SemaphoreSubmitInfo::default()
        .semaphore(semaphore_to_vk(info.semaphore))
        .stage_mask(pipeline_stages_to_vk(info.stage_mask))
        .value(info.value)
        .device_index(info.device_index)
}

// ===== RENDERING =====

pub(crate) fn load_op_to_vk(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub(crate) fn store_op_to_vk(store_op: StoreOp) -> vk::AttachmentStoreOp {
    match store_op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub(crate) fn image_layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub(crate) fn clear_value_to_vk(value: ClearValue) -> vk::ClearValue {
    match value {
        ClearValue::Color(float32) => vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

pub(crate) fn rendering_attachment_to_vk(attachment: &RenderingAttachment) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(image_view_to_vk(attachment.image_view))
        .image_layout(image_layout_to_vk(attachment.layout))
        .load_op(load_op_to_vk(attachment.load_op))
        .store_op(store_op_to_vk(attachment.store_op))
        .clear_value(clear_value_to_vk(attachment.clear_value))
}

// ===== PIPELINE STATE =====

pub(crate) fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) { flags |= vk::ShaderStageFlags::VERTEX; }
    if stages.contains(ShaderStageFlags::FRAGMENT) { flags |= vk::ShaderStageFlags::FRAGMENT; }
    if stages.contains(ShaderStageFlags::COMPUTE) { flags |= vk::ShaderStageFlags::COMPUTE; }
    flags
}

pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
    }
}

pub(crate) fn vertex_input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn polygon_mode_to_vk(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub(crate) fn sample_count_to_vk(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::S1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::S2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::S4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::S8 => vk::SampleCountFlags::TYPE_8,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn stencil_op_to_vk(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub(crate) fn stencil_op_state_to_vk(state: &StencilOpState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op_to_vk(state.fail_op),
        pass_op: stencil_op_to_vk(state.pass_op),
        depth_fail_op: stencil_op_to_vk(state.depth_fail_op),
        compare_op: compare_op_to_vk(state.compare_op),
        compare_mask: state.compare_mask,
        write_mask: state.write_mask,
        reference: state.reference,
    }
}

pub(crate) fn blend_factor_to_vk(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

pub(crate) fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub(crate) fn color_write_mask_to_vk(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::R) { flags |= vk::ColorComponentFlags::R; }
    if mask.contains(ColorWriteMask::G) { flags |= vk::ColorComponentFlags::G; }
    if mask.contains(ColorWriteMask::B) { flags |= vk::ColorComponentFlags::B; }
    if mask.contains(ColorWriteMask::A) { flags |= vk::ColorComponentFlags::A; }
    flags
}

pub(crate) fn color_blend_attachment_to_vk(attachment: &ColorBlendAttachment) -> vk::PipelineColorBlendAttachmentState {
    let mut state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(color_write_mask_to_vk(attachment.color_write_mask))
        .blend_enable(attachment.blend_enable);
    if attachment.blend_enable {
        state = state
            .src_color_blend_factor(blend_factor_to_vk(attachment.src_color_factor))
            .dst_color_blend_factor(blend_factor_to_vk(attachment.dst_color_factor))
            .color_blend_op(blend_op_to_vk(attachment.color_blend_op))
            .src_alpha_blend_factor(blend_factor_to_vk(attachment.src_alpha_factor))
            .dst_alpha_blend_factor(blend_factor_to_vk(attachment.dst_alpha_factor))
            .alpha_blend_op(blend_op_to_vk(attachment.alpha_blend_op));
    }
    state
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
