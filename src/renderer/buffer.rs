use gfx_hal::{buffer, prelude::*, Backend, Limits};
use std::mem::ManuallyDrop;
use std::ptr;
use std::rc::Rc;

use super::describe;
use crate::error::Error;

pub struct Buffer<B: Backend> {
    pub device: Rc<B::Device>,
    pub buf: ManuallyDrop<B::Buffer>,
    pub len: u64,
}

impl<B: Backend> Buffer<B> {
    pub fn new(device: Rc<B::Device>, len: u64, limits: &Limits) -> Result<Self, Error> {
        if len == 0 {
            return Err(Error::CreateVertexBuffer("zero-sized buffer".into()));
        }
        let non_coherent_alignment = (limits.non_coherent_atom_size as u64).max(1);
        let memory_size = ((len + non_coherent_alignment - 1) / non_coherent_alignment)
            * non_coherent_alignment;

        let buf = unsafe { device.create_buffer(memory_size, buffer::Usage::VERTEX) }
            .map_err(|err| Error::CreateVertexBuffer(describe(err)))?;

        Ok(Buffer {
            device,
            buf: ManuallyDrop::new(buf),
            len,
        })
    }
}

impl<B: Backend> Drop for Buffer<B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_buffer(ManuallyDrop::into_inner(ptr::read(&self.buf)))
        }
    }
}
