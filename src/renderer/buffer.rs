use anyhow::{anyhow, ensure, Result};
use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::{self, ManuallyDrop};
use std::ptr;

pub struct Buffer<'a, B: Backend> {
    pub device: &'a B::Device,
    pub buf: ManuallyDrop<B::Buffer>,
    /// Size of the content in bytes, before alignment padding.
    pub len: u64,
}

impl<'a, B: Backend> Buffer<'a, B> {
    pub fn new<T>(
        device: &'a B::Device,
        content: &[T],
        usage: buffer::Usage,
        limits: &Limits,
    ) -> Result<Self> {
        let buffer_stride = mem::size_of::<T>() as u64;
        let buffer_len = content.len() as u64 * buffer_stride;
        let memory_size = padded_size(buffer_len, limits.non_coherent_atom_size as u64)
            .map_err(|err| anyhow!("{:?} buffer: {}", usage, err))?;

        let buf = unsafe { device.create_buffer(memory_size, usage) }
            .map_err(|err| anyhow!("failed to create {:?} buffer: {:?}", usage, err))?;

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            len: buffer_len,
        })
    }
}

/// Rounds `len` bytes up to a whole number of non-coherent atoms.
fn padded_size(len: u64, atom: u64) -> Result<u64> {
    ensure!(len != 0, "refusing to create an empty buffer");
    let atom = atom.max(1);
    Ok(((len + atom - 1) / atom) * atom)
}

impl<'a, B: Backend> Drop for Buffer<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_rejected() {
        let err = padded_size(0, 64).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn exact_multiple_is_unchanged() {
        assert_eq!(padded_size(128, 64).unwrap(), 128);
        // triangle: 3 vertices of 12 bytes
        assert_eq!(padded_size(36, 4).unwrap(), 36);
    }

    #[test]
    fn one_byte_over_takes_another_atom() {
        assert_eq!(padded_size(65, 64).unwrap(), 128);
        assert_eq!(padded_size(1, 256).unwrap(), 256);
    }

    #[test]
    fn zero_atom_means_no_padding() {
        assert_eq!(padded_size(36, 0).unwrap(), 36);
    }
}
