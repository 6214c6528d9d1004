/// Fixed-function pipeline state blocks
///
/// Every block implements [`ContentHash`] field by field so equal states give
/// equal pipeline cache keys.

use bitflags::bitflags;
use crate::device::types::{Format, ShaderStageFlags};
use crate::hasher::{ContentHash, Hasher};

// ===== VERTEX INPUT =====

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    /// Data is per-vertex
    Vertex,
    /// Data is per-instance
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute location in shader
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    /// Offset in bytes from the start of the vertex
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    /// Stride in bytes between consecutive elements
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Vertex input layout (empty for shaders that generate their own vertices)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl ContentHash for VertexBinding {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u32(self.binding)
            .hash_u32(self.stride)
            .hash_u8(self.input_rate as u8);
    }
}

impl ContentHash for VertexAttribute {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u32(self.location)
            .hash_u32(self.binding)
            .hash_content(&self.format)
            .hash_u32(self.offset);
    }
}

impl ContentHash for VertexLayout {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher.hash_slice(&self.bindings).hash_slice(&self.attributes);
    }
}

// ===== INPUT ASSEMBLY =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart: false,
        }
    }
}

impl ContentHash for InputAssemblyState {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u8(self.topology as u8)
            .hash_bool(self.primitive_restart);
    }
}

// ===== RASTERIZATION =====

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    /// Wireframe
    Line,
    Point,
}

/// Depth bias parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub slope_factor: f32,
    pub clamp: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    /// None = disabled
    pub depth_bias: Option<DepthBias>,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_face: FrontFace::Clockwise,
            polygon_mode: PolygonMode::Fill,
            depth_bias: None,
            line_width: 1.0,
        }
    }
}

impl ContentHash for DepthBias {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_f32(self.constant_factor)
            .hash_f32(self.slope_factor)
            .hash_f32(self.clamp);
    }
}

impl ContentHash for RasterizationState {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u8(self.cull_mode as u8)
            .hash_u8(self.front_face as u8)
            .hash_u8(self.polygon_mode as u8)
            .hash_content(&self.depth_bias)
            .hash_f32(self.line_width);
    }
}

// ===== MULTISAMPLE =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleCount {
    S1,
    S2,
    S4,
    S8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultisampleState {
    pub sample_count: SampleCount,
    pub alpha_to_coverage: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            sample_count: SampleCount::S1,
            alpha_to_coverage: false,
        }
    }
}

impl ContentHash for MultisampleState {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u8(self.sample_count as u8)
            .hash_bool(self.alpha_to_coverage);
    }
}

// ===== DEPTH / STENCIL =====

/// Comparison operator for depth and stencil tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

/// Per-face stencil state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    /// Depth and stencil testing disabled
    fn default() -> Self {
        Self {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Less,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

impl ContentHash for StencilOpState {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u8(self.fail_op as u8)
            .hash_u8(self.pass_op as u8)
            .hash_u8(self.depth_fail_op as u8)
            .hash_u8(self.compare_op as u8)
            .hash_u32(self.compare_mask)
            .hash_u32(self.write_mask)
            .hash_u32(self.reference);
    }
}

impl ContentHash for DepthStencilState {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_bool(self.depth_test_enable)
            .hash_bool(self.depth_write_enable)
            .hash_u8(self.depth_compare_op as u8)
            .hash_bool(self.stencil_test_enable)
            .hash_content(&self.front)
            .hash_content(&self.back);
    }
}

// ===== COLOR BLEND =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    /// src * srcFactor + dst * dstFactor
    Add,
    /// src * srcFactor - dst * dstFactor
    Subtract,
    /// dst * dstFactor - src * srcFactor
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Color channels written by an attachment
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWriteMask: u8 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGBA = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// Blend state of one color attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorWriteMask,
}

impl Default for ColorBlendAttachment {
    /// Blending off, all channels written
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorWriteMask::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard `src.a * src + (1 - src.a) * dst` blending
    pub fn alpha_blending() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: BlendFactor::SrcAlpha,
            dst_color_factor: BlendFactor::OneMinusSrcAlpha,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            ..Self::default()
        }
    }
}

impl ContentHash for ColorBlendAttachment {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_bool(self.blend_enable)
            .hash_u8(self.src_color_factor as u8)
            .hash_u8(self.dst_color_factor as u8)
            .hash_u8(self.color_blend_op as u8)
            .hash_u8(self.src_alpha_factor as u8)
            .hash_u8(self.dst_alpha_factor as u8)
            .hash_u8(self.alpha_blend_op as u8)
            .hash_u8(self.color_write_mask.bits());
    }
}

/// Pipeline-wide color blend settings (per-attachment states come from the pass outputs)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlendState {
    pub blend_constants: [f32; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self { blend_constants: [0.0; 4] }
    }
}

impl ContentHash for ColorBlendState {
    fn content_hash(&self, hasher: &mut Hasher) {
        for constant in self.blend_constants {
            hasher.hash_f32(constant);
        }
    }
}

// ===== LAYOUTS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
}

/// One binding slot of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

impl ContentHash for DescriptorSetLayoutBinding {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_u32(self.binding)
            .hash_u8(self.descriptor_type as u8)
            .hash_u32(self.count)
            .hash_content(&self.stages);
    }
}

impl ContentHash for PushConstantRange {
    fn content_hash(&self, hasher: &mut Hasher) {
        hasher
            .hash_content(&self.stages)
            .hash_u32(self.offset)
            .hash_u32(self.size);
    }
}

#[cfg(test)]
#[path = "pipeline_state_tests.rs"]
mod tests;
