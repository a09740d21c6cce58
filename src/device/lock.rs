use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use super::VertexBuffer;
use crate::error::Error;

/// A locked range of a vertex buffer, unlocked when dropped.
pub struct BufferLock<'a, V: VertexBuffer> {
    buffer: &'a mut V,
    data: NonNull<u8>,
    len: usize,
}

impl<'a, V: VertexBuffer> BufferLock<'a, V> {
    pub fn new(buffer: &'a mut V, offset: u32, size: u32) -> Result<Self, Error> {
        let end = offset.checked_add(size);
        if end.map_or(true, |end| end > buffer.len()) {
            return Err(Error::InvalidCall("lock range exceeds the vertex buffer"));
        }

        let data = buffer.lock(offset, size)?;
        Ok(BufferLock {
            buffer,
            data,
            len: size as usize,
        })
    }
}

impl<'a, V: VertexBuffer> Deref for BufferLock<'a, V> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `VertexBuffer::lock` hands out `len` exclusive bytes until unlock.
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl<'a, V: VertexBuffer> DerefMut for BufferLock<'a, V> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl<'a, V: VertexBuffer> Drop for BufferLock<'a, V> {
    fn drop(&mut self) {
        self.buffer.unlock();
    }
}

#[cfg(test)]
mod tests {
    use crate::device::VertexBuffer;
    use crate::error::Error;
    use crate::recording::{Call, Recorder};
    use crate::vertex::Vertex;

    #[test]
    fn unlocks_when_dropped() {
        let recorder = Recorder::default();
        let mut buffer = recorder.vertex_buffer(8, Vertex::FVF);
        {
            let mut mapping = buffer.map(2, 4).unwrap();
            assert_eq!(mapping.len(), 4);
            mapping.copy_from_slice(&[1, 2, 3, 4]);
        }
        assert_eq!(buffer.contents(), &[0, 0, 1, 2, 3, 4, 0, 0]);
        assert_eq!(
            recorder.calls(),
            vec![Call::Lock { offset: 2, size: 4 }, Call::Unlock]
        );
    }

    #[test]
    fn unlocks_on_early_return() {
        fn fill(buffer: &mut impl VertexBuffer) -> Result<(), Error> {
            let mut mapping = buffer.map(0, 4)?;
            mapping[0] = 7;
            Err(Error::InvalidCall("bail out while locked"))
        }

        let recorder = Recorder::default();
        let mut buffer = recorder.vertex_buffer(4, Vertex::FVF);
        assert!(fill(&mut buffer).is_err());
        assert_eq!(recorder.calls().last(), Some(&Call::Unlock));
        assert_eq!(buffer.contents()[0], 7);
    }

    #[test]
    fn rejects_out_of_range_lock() {
        let recorder = Recorder::default();
        let mut buffer = recorder.vertex_buffer(4, Vertex::FVF);
        assert!(buffer.map(2, 4).is_err());
        assert!(buffer.map(u32::MAX, 2).is_err());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn failed_lock_is_not_unlocked() {
        let recorder = Recorder::default();
        recorder.fail_lock();
        let mut buffer = recorder.vertex_buffer(4, Vertex::FVF);
        assert!(buffer.map(0, 4).is_err());
        assert_eq!(recorder.calls(), vec![Call::Lock { offset: 0, size: 4 }]);
    }
}
