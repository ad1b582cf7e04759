use bytemuck::{Pod, Zeroable};

/// CPU mirror of the `FragviewParams` std140 block injected by the shader wrapper.
///
/// Field order and padding must stay in sync with `UNIFORM_BLOCK` in
/// `compile.rs`: a `mat4` (64 bytes), `vec2` at offset 64, two floats, one int
/// and tail padding up to the 16-byte block alignment.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub model_view_projection: [[f32; 4]; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub _padding: [i32; 3],
}

impl FrameUniforms {
    pub(crate) const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}
