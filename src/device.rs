//! The device model the sample is written against.
//!
//! A [`Factory`] creates a [`Device`] bound to a window, the device creates
//! [`VertexBuffer`]s and records one scene per frame between
//! [`Device::begin_scene`] and [`Device::end_scene`], and
//! [`Device::present`] shows the back buffer.

use std::ptr::NonNull;

use crate::error::Error;
use crate::vertex::{Color, Fvf};

pub mod lock;

pub use lock::BufferLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapEffect {
    /// The back buffer contents are undefined after present.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackBufferFormat {
    /// Let the device pick a format matching the display.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Hal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexProcessing {
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    TriangleList,
}

impl PrimitiveType {
    /// Vertices consumed by `count` primitives.
    pub fn vertex_count(self, count: u32) -> u32 {
        match self {
            PrimitiveType::TriangleList => count * 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresentParameters {
    pub adapter: u32,
    pub device_type: DeviceType,
    pub vertex_processing: VertexProcessing,
    pub windowed: bool,
    pub swap_effect: SwapEffect,
    pub back_buffer_format: BackBufferFormat,
    /// Zero means "use the window's client area".
    pub back_buffer_width: u32,
    pub back_buffer_height: u32,
}

impl PresentParameters {
    pub fn windowed() -> Self {
        PresentParameters {
            adapter: 0,
            device_type: DeviceType::Hal,
            vertex_processing: VertexProcessing::Software,
            windowed: true,
            swap_effect: SwapEffect::Discard,
            back_buffer_format: BackBufferFormat::Unknown,
            back_buffer_width: 0,
            back_buffer_height: 0,
        }
    }

    pub fn with_extent(mut self, width: u32, height: u32) -> Self {
        self.back_buffer_width = width;
        self.back_buffer_height = height;
        self
    }
}

pub trait Factory: Sized {
    type Window: ?Sized;
    type Device: Device;

    fn create_device(
        &self,
        window: &Self::Window,
        params: &PresentParameters,
    ) -> Result<Self::Device, Error>;
}

/// Dropping a device releases it.
pub trait Device {
    type VertexBuffer: VertexBuffer;

    fn create_vertex_buffer(
        &mut self,
        length: u32,
        fvf: Fvf,
        pool: Pool,
    ) -> Result<Self::VertexBuffer, Error>;

    fn clear(&mut self, color: Color) -> Result<(), Error>;

    fn begin_scene(&mut self) -> Result<(), Error>;

    fn set_stream_source(
        &mut self,
        stream: u32,
        buffer: &Self::VertexBuffer,
        offset: u32,
        stride: u32,
    ) -> Result<(), Error>;

    fn set_fvf(&mut self, fvf: Fvf) -> Result<(), Error>;

    fn draw_primitive(
        &mut self,
        primitive: PrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), Error>;

    fn end_scene(&mut self) -> Result<(), Error>;

    fn present(&mut self) -> Result<(), Error>;

    /// Rebuild the swap chain, e.g. after the window was resized.
    fn reset(&mut self, params: &PresentParameters) -> Result<(), Error>;

    /// Block until submitted frames have finished with their resources.
    fn wait_idle(&self) -> Result<(), Error>;
}

/// A vertex buffer whose memory can be mapped for writing.
///
/// # Safety
///
/// A successful `lock(offset, size)` must return a pointer valid for reads
/// and writes of `size` bytes that nothing else aliases until the matching
/// `unlock`.
pub unsafe trait VertexBuffer {
    /// Length in bytes.
    fn len(&self) -> u32;

    fn fvf(&self) -> Fvf;

    fn lock(&mut self, offset: u32, size: u32) -> Result<NonNull<u8>, Error>;

    fn unlock(&mut self);

    /// Lock `size` bytes at `offset` for the lifetime of the returned guard.
    fn map(&mut self, offset: u32, size: u32) -> Result<BufferLock<'_, Self>, Error>
    where
        Self: Sized,
    {
        BufferLock::new(self, offset, size)
    }
}
