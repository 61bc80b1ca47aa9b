use anyhow::{anyhow, Result};
use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::{self, ManuallyDrop};
use std::ptr;

use super::buffer::Buffer;

/// A buffer together with the host-visible memory backing it.
///
/// The content is copied in once on creation and never touched again.
pub struct Memory<'a, B: Backend> {
    pub buffer: ManuallyDrop<Buffer<'a, B>>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> Memory<'a, B> {
    pub fn new<T: Copy>(
        mut buffer: Buffer<'a, B>,
        content: &[T],
        memory_types: &[MemoryType],
    ) -> Result<Self> {
        let memory = Self::upload(&mut buffer, content, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory,
        })
    }

    fn upload<T: Copy>(
        buffer: &mut Buffer<'a, B>,
        content: &[T],
        memory_types: &[MemoryType],
    ) -> Result<ManuallyDrop<B::Memory>> {
        let device = buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type = Self::upload_type(memory_types, &buffer_req)?;
            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(|err| anyhow!("failed to allocate buffer memory: {:?}", err))?;
            let uploaded = Self::write(device, buffer, &memory, content);
            if let Err(err) = uploaded {
                device.free_memory(memory);
                return Err(err);
            }
            Ok(ManuallyDrop::new(memory))
        }
    }

    unsafe fn write<T: Copy>(
        device: &B::Device,
        buffer: &mut Buffer<'a, B>,
        memory: &B::Memory,
        content: &[T],
    ) -> Result<()> {
        device
            .bind_buffer_memory(memory, 0, &mut buffer.buf)
            .map_err(|err| anyhow!("failed to bind buffer memory: {:?}", err))?;
        let mapping = device
            .map_memory(memory, m::Segment::ALL)
            .map_err(|err| anyhow!("failed to map buffer memory: {:?}", err))?;
        debug_assert_eq!(mem::size_of_val(content) as u64, buffer.len);
        ptr::copy_nonoverlapping(
            content.as_ptr() as *const u8,
            mapping,
            buffer.len as usize,
        );
        let flushed = device
            .flush_mapped_memory_ranges(iter::once((memory, m::Segment::ALL)))
            .map_err(|err| anyhow!("failed to flush buffer memory: {:?}", err));
        device.unmap_memory(memory);
        flushed
    }

    fn upload_type(
        properties: &[MemoryType],
        buffer_req: &m::Requirements,
    ) -> Result<MemoryTypeId> {
        properties
            .iter()
            .enumerate()
            .position(|(id, mem_type)| {
                buffer_req.type_mask & (1 << id) != 0
                    && mem_type.properties.contains(m::Properties::CPU_VISIBLE)
            })
            .map(MemoryTypeId::from)
            .ok_or_else(|| anyhow!("no CPU-visible memory type for buffer upload"))
    }
}

impl<'a, B: Backend> Drop for Memory<'a, B> {
    fn drop(&mut self) {
        let device = self.buffer.device;
        unsafe {
            ManuallyDrop::drop(&mut self.buffer);
            device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}
