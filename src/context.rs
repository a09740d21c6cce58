use std::mem;

use crate::device::{Device, Factory, Pool, PresentParameters, PrimitiveType, VertexBuffer};
use crate::error::Error;
use crate::vertex::{Color, Vertex, TRIANGLE};

pub const CLEAR_COLOR: Color = Color::xrgb(0, 0, 255);

type VertexBufferOf<F> = <<F as Factory>::Device as Device>::VertexBuffer;

/// Owns the factory, the device and the triangle's vertex buffer.
pub struct Context<F: Factory> {
    // Field order is release order.
    vertex_buffer: Option<VertexBufferOf<F>>,
    device: Option<F::Device>,
    factory: Option<F>,
}

impl<F: Factory> Context<F> {
    pub fn new() -> Self {
        Context {
            vertex_buffer: None,
            device: None,
            factory: None,
        }
    }

    #[cfg(test)]
    pub fn vertex_buffer(&self) -> Option<&VertexBufferOf<F>> {
        self.vertex_buffer.as_ref()
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.device.is_some() && self.vertex_buffer.is_some()
    }

    /// Device and vertex buffer, in that order.
    pub fn init<C>(&mut self, create_factory: C, window: &F::Window) -> Result<(), Error>
    where
        C: FnOnce() -> Result<F, Error>,
    {
        self.init_device(create_factory, window)?;
        self.init_vertex_buffer()
    }

    pub fn init_device<C>(&mut self, create_factory: C, window: &F::Window) -> Result<(), Error>
    where
        C: FnOnce() -> Result<F, Error>,
    {
        if self.factory.is_some() {
            return Err(Error::InvalidCall("device already initialized"));
        }
        let factory = self.factory.insert(create_factory()?);
        let device = factory.create_device(window, &PresentParameters::windowed())?;
        log::info!("graphics device created");
        self.device = Some(device);
        Ok(())
    }

    pub fn init_vertex_buffer(&mut self) -> Result<(), Error> {
        let device = self.device.as_mut().ok_or(Error::NoDevice)?;
        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE[..]);

        let buffer = device.create_vertex_buffer(
            mem::size_of_val(&TRIANGLE) as u32,
            Vertex::FVF,
            Pool::Default,
        )?;
        let buffer = self.vertex_buffer.insert(buffer);

        let mut mapping = buffer.map(0, bytes.len() as u32)?;
        mapping.copy_from_slice(bytes);
        drop(mapping);

        log::info!("vertex buffer filled with {} vertices", TRIANGLE.len());
        Ok(())
    }

    /// Clear, draw the triangle if a scene could be begun, present.
    pub fn render(&mut self) {
        let device = match self.device.as_mut() {
            Some(device) => device,
            None => return,
        };

        if let Err(err) = device.clear(CLEAR_COLOR) {
            log::debug!("clear skipped: {}", err);
        }

        if device.begin_scene().is_ok() {
            if let Some(buffer) = self.vertex_buffer.as_ref() {
                let drawn = device
                    .set_stream_source(0, buffer, 0, Vertex::STRIDE)
                    .and_then(|_| device.set_fvf(Vertex::FVF))
                    .and_then(|_| device.draw_primitive(PrimitiveType::TriangleList, 0, 1));
                if let Err(err) = drawn {
                    log::debug!("draw skipped: {}", err);
                }
            }
            if let Err(err) = device.end_scene() {
                log::debug!("end scene failed: {}", err);
            }
        }

        if let Err(err) = device.present() {
            log::warn!("{}", err);
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(device) = self.device.as_mut() {
            let params = PresentParameters::windowed().with_extent(width, height);
            if let Err(err) = device.reset(&params) {
                log::warn!("reset to {}x{} failed: {}", width, height, err);
            }
        }
    }

    /// Release the vertex buffer, the device and the factory, whichever exist.
    pub fn cleanup(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            if let Some(Err(err)) = self.device.as_ref().map(Device::wait_idle) {
                log::warn!("{}", err);
            }
            drop(buffer);
            log::info!("vertex buffer released");
        }
        if self.device.take().is_some() {
            log::info!("graphics device released");
        }
        if self.factory.take().is_some() {
            log::info!("graphics factory released");
        }
    }
}

impl<F: Factory> Default for Context<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Factory> Drop for Context<F> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Call, Recorder, RecordingFactory};

    fn started(recorder: &Recorder) -> Context<RecordingFactory> {
        let mut context = Context::new();
        context
            .init(|| recorder.create_factory(), &())
            .expect("startup");
        context
    }

    const RELEASES: [Call; 4] = [
        Call::WaitIdle,
        Call::ReleaseVertexBuffer,
        Call::ReleaseDevice,
        Call::ReleaseFactory,
    ];

    #[test]
    fn startup_then_one_frame() {
        let recorder = Recorder::default();
        let mut context = started(&recorder);
        context.render();

        assert_eq!(
            recorder.calls(),
            vec![
                Call::CreateFactory,
                Call::CreateDevice(PresentParameters::windowed()),
                Call::CreateVertexBuffer {
                    length: 60,
                    fvf: Vertex::FVF,
                    pool: Pool::Default,
                },
                Call::Lock {
                    offset: 0,
                    size: 60
                },
                Call::Unlock,
                Call::Clear(Color(0xff0000ff)),
                Call::BeginScene,
                Call::SetStreamSource {
                    stream: 0,
                    offset: 0,
                    stride: 20
                },
                Call::SetFvf(Vertex::FVF),
                Call::DrawPrimitive {
                    primitive: PrimitiveType::TriangleList,
                    start_vertex: 0,
                    primitive_count: 1,
                },
                Call::EndScene,
                Call::Present,
            ]
        );

        let buffer = context.vertex_buffer().unwrap();
        assert_eq!(buffer.contents().len(), 60);
        assert_eq!(buffer.contents(), bytemuck::cast_slice::<_, u8>(&TRIANGLE[..]));
    }

    #[test]
    fn present_without_draw_when_scene_fails() {
        let recorder = Recorder::default();
        let mut context = started(&recorder);
        recorder.clear_calls();

        recorder.fail_begin_scene(true);
        context.render();
        assert_eq!(
            recorder.calls(),
            vec![Call::Clear(CLEAR_COLOR), Call::BeginScene, Call::Present]
        );

        recorder.fail_begin_scene(false);
        recorder.clear_calls();
        context.render();
        context.render();
        assert_eq!(recorder.count(&Call::Present), 2);
        assert_eq!(recorder.count(&Call::EndScene), 2);
    }

    #[test]
    fn render_without_device_does_nothing() {
        let recorder = Recorder::default();
        let mut context = Context::<RecordingFactory>::new();
        context.render();
        context.resize(10, 10);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn cleanup_releases_in_dependency_order() {
        let recorder = Recorder::default();
        let mut context = started(&recorder);
        recorder.clear_calls();

        context.cleanup();
        assert_eq!(recorder.calls(), RELEASES.to_vec());

        context.cleanup();
        drop(context);
        assert_eq!(recorder.calls(), RELEASES.to_vec());
    }

    #[test]
    fn cleanup_with_nothing_created() {
        let recorder = Recorder::default();
        recorder.fail_factory();
        let mut context = Context::new();
        assert!(context.init(|| recorder.create_factory(), &()).is_err());
        context.cleanup();
        assert_eq!(recorder.calls(), vec![Call::CreateFactory]);
    }

    #[test]
    fn cleanup_with_factory_only() {
        let recorder = Recorder::default();
        recorder.fail_device();
        let mut context = Context::new();
        assert!(matches!(
            context.init(|| recorder.create_factory(), &()),
            Err(Error::CreateDevice(_))
        ));
        assert!(!context.is_ready());

        recorder.clear_calls();
        context.cleanup();
        assert_eq!(recorder.calls(), vec![Call::ReleaseFactory]);
    }

    #[test]
    fn cleanup_with_factory_and_device() {
        let recorder = Recorder::default();
        recorder.fail_vertex_buffer();
        let mut context = Context::new();
        assert!(matches!(
            context.init(|| recorder.create_factory(), &()),
            Err(Error::CreateVertexBuffer(_))
        ));

        recorder.clear_calls();
        context.cleanup();
        assert_eq!(recorder.calls(), RELEASES[2..].to_vec());
    }

    #[test]
    fn failed_lock_keeps_buffer_for_cleanup() {
        let recorder = Recorder::default();
        recorder.fail_lock();
        let mut context = Context::new();
        assert!(matches!(
            context.init(|| recorder.create_factory(), &()),
            Err(Error::Lock(_))
        ));
        assert!(context.vertex_buffer().is_some());
        assert_eq!(recorder.count(&Call::Unlock), 0);

        recorder.clear_calls();
        drop(context);
        assert_eq!(recorder.calls(), RELEASES.to_vec());
    }

    #[test]
    fn second_init_keeps_first_factory() {
        let recorder = Recorder::default();
        let mut context = started(&recorder);
        recorder.clear_calls();

        assert!(matches!(
            context.init_device(|| recorder.create_factory(), &()),
            Err(Error::InvalidCall(_))
        ));
        assert!(context.is_ready());
        assert!(recorder.calls().is_empty());

        context.cleanup();
        assert_eq!(recorder.calls(), RELEASES.to_vec());
    }

    #[test]
    fn vertex_buffer_needs_device() {
        let mut context = Context::<RecordingFactory>::new();
        assert!(matches!(context.init_vertex_buffer(), Err(Error::NoDevice)));
    }

    #[test]
    fn resize_resets_device() {
        let recorder = Recorder::default();
        let mut context = started(&recorder);
        recorder.clear_calls();

        context.resize(640, 480);
        assert_eq!(
            recorder.calls(),
            vec![Call::Reset(
                PresentParameters::windowed().with_extent(640, 480)
            )]
        );
    }
}
