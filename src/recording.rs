//! A device model that records every call instead of drawing.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::device::{Device, Factory, Pool, PresentParameters, PrimitiveType, VertexBuffer};
use crate::error::Error;
use crate::vertex::{Color, Fvf};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateFactory,
    CreateDevice(PresentParameters),
    CreateVertexBuffer { length: u32, fvf: Fvf, pool: Pool },
    Lock { offset: u32, size: u32 },
    Unlock,
    Clear(Color),
    BeginScene,
    SetStreamSource { stream: u32, offset: u32, stride: u32 },
    SetFvf(Fvf),
    DrawPrimitive {
        primitive: PrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    },
    EndScene,
    Present,
    Reset(PresentParameters),
    WaitIdle,
    ReleaseVertexBuffer,
    ReleaseDevice,
    ReleaseFactory,
}

#[derive(Default, Clone, Copy)]
struct Faults {
    factory: bool,
    device: bool,
    vertex_buffer: bool,
    lock: bool,
    begin_scene: bool,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    faults: Faults,
}

/// Shared call log. Clones observe the same log.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Rc<RefCell<State>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn fail_factory(&self) {
        self.state.borrow_mut().faults.factory = true;
    }

    pub fn fail_device(&self) {
        self.state.borrow_mut().faults.device = true;
    }

    pub fn fail_vertex_buffer(&self) {
        self.state.borrow_mut().faults.vertex_buffer = true;
    }

    pub fn fail_lock(&self) {
        self.state.borrow_mut().faults.lock = true;
    }

    pub fn fail_begin_scene(&self, fail: bool) {
        self.state.borrow_mut().faults.begin_scene = fail;
    }

    pub fn create_factory(&self) -> Result<RecordingFactory, Error> {
        self.record(Call::CreateFactory);
        if self.faults().factory {
            return Err(Error::CreateFactory("injected".into()));
        }
        Ok(RecordingFactory {
            recorder: self.clone(),
        })
    }

    /// A buffer that is not owned by any device.
    pub fn vertex_buffer(&self, length: u32, fvf: Fvf) -> RecordingVertexBuffer {
        RecordingVertexBuffer {
            recorder: self.clone(),
            contents: vec![0; length as usize],
            fvf,
            locked: false,
        }
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn faults(&self) -> Faults {
        self.state.borrow().faults
    }
}

pub struct RecordingFactory {
    recorder: Recorder,
}

impl Factory for RecordingFactory {
    type Window = ();
    type Device = RecordingDevice;

    fn create_device(
        &self,
        _window: &(),
        params: &PresentParameters,
    ) -> Result<RecordingDevice, Error> {
        self.recorder.record(Call::CreateDevice(params.clone()));
        if self.recorder.faults().device {
            return Err(Error::CreateDevice("injected".into()));
        }
        Ok(RecordingDevice {
            recorder: self.recorder.clone(),
            in_scene: false,
        })
    }
}

impl Drop for RecordingFactory {
    fn drop(&mut self) {
        self.recorder.record(Call::ReleaseFactory);
    }
}

pub struct RecordingDevice {
    recorder: Recorder,
    in_scene: bool,
}

impl Device for RecordingDevice {
    type VertexBuffer = RecordingVertexBuffer;

    fn create_vertex_buffer(
        &mut self,
        length: u32,
        fvf: Fvf,
        pool: Pool,
    ) -> Result<RecordingVertexBuffer, Error> {
        self.recorder
            .record(Call::CreateVertexBuffer { length, fvf, pool });
        if self.recorder.faults().vertex_buffer {
            return Err(Error::CreateVertexBuffer("injected".into()));
        }
        Ok(self.recorder.vertex_buffer(length, fvf))
    }

    fn clear(&mut self, color: Color) -> Result<(), Error> {
        self.recorder.record(Call::Clear(color));
        Ok(())
    }

    fn begin_scene(&mut self) -> Result<(), Error> {
        self.recorder.record(Call::BeginScene);
        if self.recorder.faults().begin_scene {
            return Err(Error::Acquire("injected".into()));
        }
        if self.in_scene {
            return Err(Error::InvalidCall("scene already begun"));
        }
        self.in_scene = true;
        Ok(())
    }

    fn set_stream_source(
        &mut self,
        stream: u32,
        _buffer: &RecordingVertexBuffer,
        offset: u32,
        stride: u32,
    ) -> Result<(), Error> {
        self.recorder.record(Call::SetStreamSource {
            stream,
            offset,
            stride,
        });
        Ok(())
    }

    fn set_fvf(&mut self, fvf: Fvf) -> Result<(), Error> {
        self.recorder.record(Call::SetFvf(fvf));
        Ok(())
    }

    fn draw_primitive(
        &mut self,
        primitive: PrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), Error> {
        self.recorder.record(Call::DrawPrimitive {
            primitive,
            start_vertex,
            primitive_count,
        });
        if !self.in_scene {
            return Err(Error::InvalidCall("draw outside of a scene"));
        }
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), Error> {
        self.recorder.record(Call::EndScene);
        if !self.in_scene {
            return Err(Error::InvalidCall("no scene to end"));
        }
        self.in_scene = false;
        Ok(())
    }

    fn present(&mut self) -> Result<(), Error> {
        self.recorder.record(Call::Present);
        Ok(())
    }

    fn reset(&mut self, params: &PresentParameters) -> Result<(), Error> {
        self.recorder.record(Call::Reset(params.clone()));
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), Error> {
        self.recorder.record(Call::WaitIdle);
        Ok(())
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        self.recorder.record(Call::ReleaseDevice);
    }
}

pub struct RecordingVertexBuffer {
    recorder: Recorder,
    contents: Vec<u8>,
    fvf: Fvf,
    locked: bool,
}

impl RecordingVertexBuffer {
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

unsafe impl VertexBuffer for RecordingVertexBuffer {
    fn len(&self) -> u32 {
        self.contents.len() as u32
    }

    fn fvf(&self) -> Fvf {
        self.fvf
    }

    fn lock(&mut self, offset: u32, size: u32) -> Result<NonNull<u8>, Error> {
        self.recorder.record(Call::Lock { offset, size });
        if self.recorder.faults().lock {
            return Err(Error::Lock("injected".into()));
        }
        if self.locked {
            return Err(Error::InvalidCall("vertex buffer already locked"));
        }
        self.locked = true;
        let data = self.contents[offset as usize..].as_mut_ptr();
        NonNull::new(data).ok_or(Error::Lock("null mapping".into()))
    }

    fn unlock(&mut self) {
        self.recorder.record(Call::Unlock);
        self.locked = false;
    }
}

impl Drop for RecordingVertexBuffer {
    fn drop(&mut self) {
        self.recorder.record(Call::ReleaseVertexBuffer);
    }
}
