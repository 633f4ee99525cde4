use crate::error::{context, Error, Result};
use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::buffer::Buffer;

/// A buffer bound to CPU-visible memory holding a copy of its content.
pub struct Memory<'a, B: Backend, T> {
    pub buffer: ManuallyDrop<Buffer<'a, B, T>>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend, T> Memory<'a, B, T> {
    pub fn new(mut buffer: Buffer<'a, B, T>, memory_types: &[MemoryType]) -> Result<Self> {
        let memory = Self::allocate_gpu_memory(&mut buffer, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory: ManuallyDrop::new(memory),
        })
    }

    fn allocate_gpu_memory(
        buffer: &mut Buffer<'a, B, T>,
        memory_types: &[MemoryType],
    ) -> Result<B::Memory> {
        let device = buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type = upload_type(
                memory_types.iter().map(|mem_type| mem_type.properties),
                u64::from(buffer_req.type_mask),
            )
            .ok_or_else(|| Error::Memory("no CPU-visible memory type fits the buffer".into()))?;

            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(context(Error::Memory, "allocate vertex memory"))?;
            if let Err(err) = Self::upload(device, &memory, buffer) {
                device.free_memory(memory);
                return Err(err);
            }
            Ok(memory)
        }
    }

    unsafe fn upload(
        device: &B::Device,
        memory: &B::Memory,
        buffer: &mut Buffer<'a, B, T>,
    ) -> Result<()> {
        device
            .bind_buffer_memory(memory, 0, &mut buffer.buf)
            .map_err(context(Error::Memory, "bind vertex memory"))?;
        let mapping = device
            .map_memory(memory, m::Segment::ALL)
            .map_err(context(Error::Memory, "map vertex memory"))?;
        ptr::copy_nonoverlapping(
            buffer.content.as_ptr() as *const u8,
            mapping,
            buffer.len as usize,
        );
        let flushed = device
            .flush_mapped_memory_ranges(iter::once((memory, m::Segment::ALL)))
            .map_err(context(Error::Memory, "flush vertex memory"));
        device.unmap_memory(memory);
        flushed
    }
}

/// First memory type allowed by `type_mask` that the CPU can write to.
pub fn upload_type<I>(properties: I, type_mask: u64) -> Option<MemoryTypeId>
where
    I: IntoIterator<Item = m::Properties>,
{
    properties
        .into_iter()
        .enumerate()
        .position(|(id, props)| {
            id < 64 && type_mask & (1 << id) != 0 && props.contains(m::Properties::CPU_VISIBLE)
        })
        .map(MemoryTypeId::from)
}

impl<'a, B: Backend, T> Drop for Memory<'a, B, T> {
    fn drop(&mut self) {
        unsafe {
            let device = self.buffer.device;
            ManuallyDrop::drop(&mut self.buffer);
            device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_cpu_visible_allowed_type() {
        let types = vec![
            m::Properties::DEVICE_LOCAL,
            m::Properties::CPU_VISIBLE | m::Properties::COHERENT,
            m::Properties::CPU_VISIBLE,
        ];
        assert_eq!(upload_type(types.clone(), 0b111), Some(MemoryTypeId(1)));
        assert_eq!(upload_type(types, 0b101), Some(MemoryTypeId(2)));
    }

    #[test]
    fn none_when_mask_excludes_visible_types() {
        let types = vec![
            m::Properties::DEVICE_LOCAL,
            m::Properties::CPU_VISIBLE,
        ];
        assert_eq!(upload_type(types.clone(), 0b01), None);
        assert_eq!(upload_type(types, 0), None);
        assert_eq!(upload_type(Vec::new(), !0), None);
    }
}
