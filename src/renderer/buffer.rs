use crate::error::{context, Error, Result};
use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::{self, ManuallyDrop};
use std::ptr;

pub struct Buffer<'a, B: Backend, T> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
    pub content: &'a [T],
    pub len: u64,
}

impl<'a, B: Backend, T: Copy> Buffer<'a, B, T> {
    pub fn new(device: &'a B::Device, content: &'a [T], limits: &Limits) -> Result<Self> {
        let buffer_len = content_len(content)?;
        let memory_size = aligned_size(buffer_len, limits.non_coherent_atom_size as u64);

        let buf = unsafe { device.create_buffer(memory_size, buffer::Usage::VERTEX) }
            .map_err(context(Error::Memory, "create vertex buffer"))?;
        log::debug!(
            "vertex buffer: {} bytes of content, {} bytes allocated",
            buffer_len,
            memory_size
        );

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            content,
            len: buffer_len,
        })
    }
}

/// Byte length of `content`; an empty buffer cannot be created.
pub fn content_len<T>(content: &[T]) -> Result<u64> {
    let len = mem::size_of_val(content) as u64;
    if len == 0 {
        return Err(Error::Memory("vertex buffer content is empty".into()));
    }
    Ok(len)
}

/// Rounds `len` up to a multiple of `atom`, the granularity at which
/// non-coherent memory is flushed.
pub fn aligned_size(len: u64, atom: u64) -> u64 {
    if atom <= 1 {
        return len;
    }
    ((len + atom - 1) / atom) * atom
}

impl<'a, B: Backend, T> Drop for Buffer<'a, B, T> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{aligned_size, content_len};
    use crate::error::Error;

    #[test]
    fn rounds_up_to_atom() {
        assert_eq!(aligned_size(36, 64), 64);
        assert_eq!(aligned_size(64, 64), 64);
        assert_eq!(aligned_size(65, 64), 128);
        assert_eq!(aligned_size(36, 4), 36);
    }

    #[test]
    fn content_len_counts_bytes() {
        let content = [[0.0f32; 3]; 3];
        assert_eq!(content_len(&content).unwrap(), 36);
    }

    #[test]
    fn empty_content_is_rejected() {
        let empty: [[f32; 3]; 0] = [];
        assert!(matches!(content_len(&empty), Err(Error::Memory(_))));
        assert!(matches!(content_len(&[(); 4]), Err(Error::Memory(_))));
    }

    #[test]
    fn zero_or_unit_atom_keeps_len() {
        assert_eq!(aligned_size(36, 0), 36);
        assert_eq!(aligned_size(36, 1), 36);
    }
}
