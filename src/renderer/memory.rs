use gfx_hal::{adapter::MemoryType, memory as m, prelude::*, Backend, MemoryTypeId};
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use super::buffer::Buffer;
use super::describe;
use crate::device::VertexBuffer;
use crate::error::Error;
use crate::vertex::Fvf;

/// A vertex buffer bound to host-visible memory.
pub struct Memory<B: Backend> {
    pub buffer: ManuallyDrop<Buffer<B>>,
    memory: ManuallyDrop<B::Memory>,
    fvf: Fvf,
    mapped: bool,
}

impl<B: Backend> Memory<B> {
    pub fn new(mut buffer: Buffer<B>, memory_types: &[MemoryType], fvf: Fvf) -> Result<Self, Error> {
        let memory = Self::allocate_gpu_memory(&mut buffer, memory_types)?;
        Ok(Memory {
            buffer: ManuallyDrop::new(buffer),
            memory: ManuallyDrop::new(memory),
            fvf,
            mapped: false,
        })
    }

    fn allocate_gpu_memory(
        buffer: &mut Buffer<B>,
        memory_types: &[MemoryType],
    ) -> Result<B::Memory, Error> {
        let device = &buffer.device;
        unsafe {
            let buffer_req = device.get_buffer_requirements(&buffer.buf);
            let upload_type = Self::upload_type(memory_types, &buffer_req).ok_or_else(|| {
                Error::CreateVertexBuffer("no CPU-visible memory type fits the buffer".into())
            })?;
            let memory = device
                .allocate_memory(upload_type, buffer_req.size)
                .map_err(|err| Error::CreateVertexBuffer(describe(err)))?;
            if let Err(err) = device.bind_buffer_memory(&memory, 0, &mut buffer.buf) {
                device.free_memory(memory);
                return Err(Error::CreateVertexBuffer(describe(err)));
            }
            Ok(memory)
        }
    }

    fn upload_type(properties: &[MemoryType], buffer_req: &m::Requirements) -> Option<MemoryTypeId> {
        properties
            .iter()
            .enumerate()
            .position(|(id, mem_type)| {
                buffer_req.type_mask & (1 << id) != 0
                    && mem_type.properties.contains(m::Properties::CPU_VISIBLE)
            })
            .map(MemoryTypeId::from)
    }
}

unsafe impl<B: Backend> VertexBuffer for Memory<B> {
    fn len(&self) -> u32 {
        self.buffer.len as u32
    }

    fn fvf(&self) -> Fvf {
        self.fvf
    }

    fn lock(&mut self, offset: u32, _size: u32) -> Result<NonNull<u8>, Error> {
        if self.mapped {
            return Err(Error::InvalidCall("vertex buffer already locked"));
        }
        let mapping = unsafe {
            self.buffer
                .device
                .map_memory(&self.memory, m::Segment::ALL)
                .map_err(|err| Error::Lock(describe(err)))?
        };
        self.mapped = true;
        // SAFETY: the whole allocation is mapped and covers the buffer.
        NonNull::new(unsafe { mapping.add(offset as usize) })
            .ok_or_else(|| Error::Lock("null mapping".into()))
    }

    fn unlock(&mut self) {
        if !self.mapped {
            return;
        }
        let device = &self.buffer.device;
        unsafe {
            if let Err(err) =
                device.flush_mapped_memory_ranges(iter::once((&*self.memory, m::Segment::ALL)))
            {
                log::warn!("flushing the vertex buffer failed: {:?}", err);
            }
            device.unmap_memory(&self.memory);
        }
        self.mapped = false;
    }
}

impl<B: Backend> Drop for Memory<B> {
    fn drop(&mut self) {
        // Submitted frames may still read the buffer.
        if let Err(err) = self.buffer.device.wait_idle() {
            log::warn!("wait idle failed: {:?}", err);
        }
        self.unlock();
        unsafe {
            let device = self.buffer.device.clone();
            ManuallyDrop::drop(&mut self.buffer);
            device.free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)))
        }
    }
}
