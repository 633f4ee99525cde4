use crate::error::{context, Error, Result};
use gfx_hal::{prelude::*, pso, Backend};
use std::io::Cursor;

// Compiled from src/data by build.rs.
pub const TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
pub const TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

pub fn read_words(bytes: &[u8]) -> Result<Vec<u32>> {
    pso::read_spirv(Cursor::new(bytes)).map_err(context(Error::Shader, "read SPIR-V"))
}

pub fn load<B: Backend>(device: &B::Device, bytes: &[u8]) -> Result<B::ShaderModule> {
    let spirv = read_words(bytes)?;
    unsafe { device.create_shader_module(&spirv) }
        .map_err(context(Error::Shader, "create shader module"))
}
