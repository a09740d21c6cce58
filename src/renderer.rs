use gfx_hal::{
    adapter::Adapter,
    buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    pso,
    queue::{family::QueueFamilyId, QueueGroup, Submission},
    window::{self, PresentationSurface},
    Backend, Features, Instance,
};

use std::borrow::Borrow;
use std::iter;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::rc::Rc;

mod buffer;
mod memory;
mod pipeline;
mod swapchain;

use crate::device::{self, Pool, PresentParameters, PrimitiveType, VertexBuffer as _};
use crate::error::Error;
use crate::vertex::{Color, Fvf, Vertex};
use buffer::Buffer;
pub use memory::Memory;
use pipeline::Pipeline;
use swapchain::Swapchain;

type SwapchainImage<B> = <<B as Backend>::Surface as PresentationSurface<B>>::SwapchainImage;

/// Backend errors only implement `Debug`.
fn describe(err: impl std::fmt::Debug) -> String {
    format!("{:?}", err)
}

/// Creates gfx-hal devices for winit windows.
pub struct GfxFactory<B: Backend> {
    instance: Rc<B::Instance>,
}

impl<B: Backend> GfxFactory<B> {
    pub fn create(name: &str) -> Result<Self, Error> {
        let instance = <B::Instance as Instance<B>>::create(name, 1)
            .map_err(|err| Error::CreateFactory(describe(err)))?;
        log::info!("graphics factory created");
        Ok(GfxFactory {
            instance: Rc::new(instance),
        })
    }

    fn select_adapter(
        &self,
        surface: &B::Surface,
        params: &PresentParameters,
    ) -> Result<(Adapter<B>, QueueFamilyId), Error> {
        self.instance
            .enumerate_adapters()
            .into_iter()
            .skip(params.adapter as usize)
            .find_map(|adapter| {
                let family = adapter
                    .queue_families
                    .iter()
                    .find(|family| {
                        surface.supports_queue_family(family)
                            && family.queue_type().supports_graphics()
                    })?
                    .id();
                Some((adapter, family))
            })
            .ok_or(Error::NoAdapter)
    }
}

impl<B: Backend> device::Factory for GfxFactory<B> {
    type Window = winit::window::Window;
    type Device = GfxDevice<B>;

    fn create_device(
        &self,
        window: &winit::window::Window,
        params: &PresentParameters,
    ) -> Result<GfxDevice<B>, Error> {
        if !params.windowed {
            return Err(Error::InvalidCall("exclusive fullscreen is not supported"));
        }

        let size = window.inner_size();
        let dims = window::Extent2D {
            width: match params.back_buffer_width {
                0 => size.width,
                width => width,
            },
            height: match params.back_buffer_height {
                0 => size.height,
                height => height,
            },
        };

        let surface = unsafe { self.instance.create_surface(window) }
            .map_err(|err| Error::CreateDevice(describe(err)))?;
        let surface: OwnedSurface<B> = OwnedSurface {
            instance: Rc::clone(&self.instance),
            surface: ManuallyDrop::new(surface),
        };

        let (adapter, family) = self.select_adapter(&surface, params)?;
        log::info!("using {:?} adapter {}", params.device_type, adapter.info.name);
        GfxDevice::new(Rc::clone(&self.instance), surface, adapter, family, dims, params)
    }
}

/// A surface destroyed through its instance when dropped.
struct OwnedSurface<B: Backend> {
    instance: Rc<B::Instance>,
    surface: ManuallyDrop<B::Surface>,
}

impl<B: Backend> Deref for OwnedSurface<B> {
    type Target = B::Surface;

    fn deref(&self) -> &B::Surface {
        &self.surface
    }
}

impl<B: Backend> DerefMut for OwnedSurface<B> {
    fn deref_mut(&mut self) -> &mut B::Surface {
        &mut self.surface
    }
}

impl<B: Backend> Drop for OwnedSurface<B> {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .destroy_surface(ManuallyDrop::into_inner(ptr::read(&self.surface)));
        }
    }
}

struct Scene<B: Backend> {
    image: SwapchainImage<B>,
    frame_idx: usize,
    ended: bool,
}

/// Records one render pass per scene into a rotating set of command buffers.
pub struct GfxDevice<B: Backend> {
    scene: Option<Scene<B>>,
    frame: usize,
    frames_in_flight: usize,
    clear_color: [f32; 4],
    command_buffers: Vec<B::CommandBuffer>,
    framebuffers: Vec<Option<B::Framebuffer>>,
    submission_complete_semaphores: Vec<B::Semaphore>,
    submission_complete_fences: Vec<B::Fence>,
    command_pool: ManuallyDrop<B::CommandPool>,
    pipeline: ManuallyDrop<Pipeline<B>>,
    render_pass: ManuallyDrop<B::RenderPass>,
    swapchain: Swapchain,
    queue_group: QueueGroup<B>,
    adapter: Adapter<B>,
    surface: OwnedSurface<B>,
    device: Rc<B::Device>,
    _instance: Rc<B::Instance>,
}

impl<B: Backend> GfxDevice<B> {
    fn new(
        instance: Rc<B::Instance>,
        mut surface: OwnedSurface<B>,
        adapter: Adapter<B>,
        family: QueueFamilyId,
        dims: window::Extent2D,
        params: &PresentParameters,
    ) -> Result<Self, Error> {
        let mut gpu = {
            let family = adapter
                .queue_families
                .iter()
                .find(|candidate| candidate.id() == family)
                .ok_or(Error::NoAdapter)?;
            unsafe {
                adapter
                    .physical_device
                    .open(&[(family, &[1.0])], Features::empty())
            }
            .map_err(|err| Error::CreateDevice(describe(err)))?
        };

        let queue_group = gpu
            .queue_groups
            .pop()
            .filter(|group| !group.queues.is_empty())
            .ok_or_else(|| Error::CreateDevice("device opened without a queue".into()))?;
        let device = Rc::new(gpu.device);

        let swapchain = Swapchain::new::<B>(
            &device,
            &mut surface,
            &adapter.physical_device,
            dims,
            params.back_buffer_format,
        )?;
        let render_pass = Self::create_render_pass(&device, swapchain.format)?;
        let pipeline = Pipeline::<B>::new(Rc::clone(&device), &render_pass, Vertex::FVF)?;

        let mut command_pool = Self::create_command_pool(&device, queue_group.family)?;
        let frames_in_flight: usize = 2;

        let command_buffers = Self::allocate_command_buffer(&mut command_pool, frames_in_flight);
        let submission_complete_semaphores = Self::create_semaphores(&device, frames_in_flight)?;
        let submission_complete_fences = Self::create_fences(&device, frames_in_flight)?;

        log::info!(
            "device ready: {}x{} {:?}, {:?} swap, {:?} vertex processing",
            swapchain.dims.width,
            swapchain.dims.height,
            swapchain.format,
            params.swap_effect,
            params.vertex_processing,
        );

        Ok(GfxDevice {
            scene: None,
            frame: 0,
            frames_in_flight,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            command_buffers,
            framebuffers: (0..frames_in_flight).map(|_| None).collect(),
            submission_complete_semaphores,
            submission_complete_fences,
            command_pool: ManuallyDrop::new(command_pool),
            pipeline: ManuallyDrop::new(pipeline),
            render_pass: ManuallyDrop::new(render_pass),
            swapchain,
            queue_group,
            adapter,
            surface,
            device,
            _instance: instance,
        })
    }

    /// Index of the frame whose render pass is open.
    fn recording(&self, call: &'static str) -> Result<usize, Error> {
        match &self.scene {
            Some(scene) if !scene.ended => Ok(scene.frame_idx),
            _ => Err(Error::InvalidCall(call)),
        }
    }

    fn recreate_swapchain(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::warn!("wait idle failed: {:?}", err);
        }
        let result = self.swapchain.recreate::<B>(
            &self.device,
            &mut self.surface,
            &self.adapter.physical_device,
        );
        match result {
            Ok(()) => log::debug!(
                "swapchain recreated at {}x{}",
                self.swapchain.dims.width,
                self.swapchain.dims.height
            ),
            Err(err) => log::warn!("{}", err),
        }
    }

    fn create_render_pass(device: &B::Device, format: f::Format) -> Result<B::RenderPass, Error> {
        let attachment = pass::Attachment {
            format: Some(format),
            samples: 1,
            ops: pass::AttachmentOps::new(
                pass::AttachmentLoadOp::Clear,
                pass::AttachmentStoreOp::Store,
            ),
            stencil_ops: pass::AttachmentOps::DONT_CARE,
            layouts: i::Layout::Undefined..i::Layout::Present,
        };

        let subpass = pass::SubpassDesc {
            colors: &[(0, i::Layout::ColorAttachmentOptimal)],
            depth_stencil: None,
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        unsafe { device.create_render_pass(&[attachment], &[subpass], &[]) }
            .map_err(|err| Error::CreateDevice(describe(err)))
    }

    fn create_command_pool(device: &B::Device, family: QueueFamilyId) -> Result<B::CommandPool, Error> {
        unsafe { device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL) }
            .map_err(|err| Error::CreateDevice(describe(err)))
    }

    fn allocate_command_buffer(
        command_pool: &mut B::CommandPool,
        frames_in_flight: usize,
    ) -> Vec<B::CommandBuffer> {
        let mut v = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            v.push(unsafe { command_pool.allocate_one(command::Level::Primary) });
        }
        v
    }

    fn create_semaphores(device: &B::Device, frames_in_flight: usize) -> Result<Vec<B::Semaphore>, Error> {
        (0..frames_in_flight)
            .map(|_| {
                device
                    .create_semaphore()
                    .map_err(|err| Error::CreateDevice(describe(err)))
            })
            .collect()
    }

    fn create_fences(device: &B::Device, frames_in_flight: usize) -> Result<Vec<B::Fence>, Error> {
        (0..frames_in_flight)
            .map(|_| {
                device
                    .create_fence(true)
                    .map_err(|err| Error::CreateDevice(describe(err)))
            })
            .collect()
    }
}

impl<B: Backend> device::Device for GfxDevice<B> {
    type VertexBuffer = Memory<B>;

    fn create_vertex_buffer(&mut self, length: u32, fvf: Fvf, pool: Pool) -> Result<Memory<B>, Error> {
        if fvf.vertex_size() == 0 || length % fvf.vertex_size() != 0 {
            return Err(Error::CreateVertexBuffer(format!(
                "{} bytes do not hold whole {:?} vertices",
                length, fvf
            )));
        }
        log::debug!("vertex buffer of {} bytes in {:?} pool", length, pool);

        let physical_device = &self.adapter.physical_device;
        let buffer = Buffer::<B>::new(Rc::clone(&self.device), length as u64, &physical_device.limits())?;
        Memory::new(buffer, &physical_device.memory_properties().memory_types, fvf)
    }

    fn clear(&mut self, color: Color) -> Result<(), Error> {
        self.clear_color = color.to_rgba();

        // Inside a scene the clear happens now, otherwise at the next begin.
        if let Ok(frame_idx) = self.recording("clear") {
            let rect = self.swapchain.viewport.rect;
            unsafe {
                self.command_buffers[frame_idx].clear_attachments(
                    iter::once(command::AttachmentClear::Color {
                        index: 0,
                        value: command::ClearColor {
                            float32: self.clear_color,
                        },
                    }),
                    iter::once(pso::ClearRect { rect, layers: 0..1 }),
                );
            }
        }
        Ok(())
    }

    fn begin_scene(&mut self) -> Result<(), Error> {
        if self.scene.is_some() {
            return Err(Error::InvalidCall("scene already begun"));
        }

        let surface_image = unsafe {
            match self.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    self.recreate_swapchain();
                    return Err(Error::Acquire(describe(err)));
                }
            }
        };

        let frame_buffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: self.swapchain.dims.width,
                    height: self.swapchain.dims.height,
                    depth: 1,
                },
            )
        }
        .map_err(|err| Error::Acquire(describe(err)))?;

        let frame_idx = self.frame % self.frames_in_flight;

        unsafe {
            let fence = &self.submission_complete_fences[frame_idx];
            if let Err(err) = self.device.wait_for_fence(fence, !0) {
                self.device.destroy_framebuffer(frame_buffer);
                return Err(Error::Acquire(describe(err)));
            }
            if let Some(old) = self.framebuffers[frame_idx].replace(frame_buffer) {
                self.device.destroy_framebuffer(old);
            }
            self.device
                .reset_fence(fence)
                .map_err(|err| Error::Acquire(describe(err)))?;
        }

        let cmd_buffer = &mut self.command_buffers[frame_idx];
        let viewport = &self.swapchain.viewport;
        if let Some(frame_buffer) = &self.framebuffers[frame_idx] {
            unsafe {
                cmd_buffer.reset(false);
                cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
                cmd_buffer.set_viewports(0, &[viewport.clone()]);
                cmd_buffer.set_scissors(0, &[viewport.rect]);
                cmd_buffer.begin_render_pass(
                    &self.render_pass,
                    frame_buffer,
                    viewport.rect,
                    &[command::ClearValue {
                        color: command::ClearColor {
                            float32: self.clear_color,
                        },
                    }],
                    command::SubpassContents::Inline,
                );
            }
        }

        self.scene = Some(Scene {
            image: surface_image,
            frame_idx,
            ended: false,
        });
        Ok(())
    }

    fn set_stream_source(
        &mut self,
        stream: u32,
        buffer: &Memory<B>,
        offset: u32,
        stride: u32,
    ) -> Result<(), Error> {
        let frame_idx = self.recording("set_stream_source outside of a scene")?;
        if stream != 0 {
            return Err(Error::InvalidCall("only stream 0 is bound by the pipeline"));
        }
        if buffer.fvf() != self.pipeline.fvf {
            return Err(Error::UnsupportedFormat(buffer.fvf()));
        }
        if stride != self.pipeline.fvf.vertex_size() {
            return Err(Error::InvalidCall("stride does not match the vertex format"));
        }

        unsafe {
            self.command_buffers[frame_idx].bind_vertex_buffers(
                0,
                iter::once((
                    &*buffer.buffer.buf,
                    b::SubRange {
                        offset: offset as u64,
                        size: None,
                    },
                )),
            );
        }
        Ok(())
    }

    fn set_fvf(&mut self, fvf: Fvf) -> Result<(), Error> {
        let frame_idx = self.recording("set_fvf outside of a scene")?;
        if fvf != self.pipeline.fvf {
            return Err(Error::UnsupportedFormat(fvf));
        }

        let [width, height] = self.swapchain.viewport_size();
        let cmd_buffer = &mut self.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.bind_graphics_pipeline(&self.pipeline.pipeline);
            cmd_buffer.push_graphics_constants(
                &self.pipeline.pipeline_layout,
                pso::ShaderStageFlags::VERTEX,
                pipeline::VIEWPORT_CONSTANTS.start,
                &[width.to_bits(), height.to_bits()],
            );
        }
        Ok(())
    }

    fn draw_primitive(
        &mut self,
        primitive: PrimitiveType,
        start_vertex: u32,
        primitive_count: u32,
    ) -> Result<(), Error> {
        let frame_idx = self.recording("draw outside of a scene")?;
        let vertex_count = primitive.vertex_count(primitive_count);
        unsafe {
            self.command_buffers[frame_idx].draw(start_vertex..start_vertex + vertex_count, 0..1);
        }
        Ok(())
    }

    fn end_scene(&mut self) -> Result<(), Error> {
        let frame_idx = self.recording("no scene to end")?;

        let cmd_buffer = &mut self.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&self.submission_complete_semaphores[frame_idx]),
            };

            self.queue_group.queues[0].submit(
                submission,
                Some(&self.submission_complete_fences[frame_idx]),
            );
        }

        if let Some(scene) = self.scene.as_mut() {
            scene.ended = true;
        }
        Ok(())
    }

    fn present(&mut self) -> Result<(), Error> {
        if self.recording("present").is_ok() {
            self.end_scene()?;
        }
        let scene = match self.scene.take() {
            Some(scene) => scene,
            None => return Ok(()),
        };

        let result = unsafe {
            self.queue_group.queues[0].present_surface(
                &mut self.surface,
                scene.image,
                Some(&self.submission_complete_semaphores[scene.frame_idx]),
            )
        };
        self.frame += 1;

        match result {
            Ok(None) => Ok(()),
            Ok(Some(_suboptimal)) => {
                self.recreate_swapchain();
                Ok(())
            }
            Err(err) => {
                self.recreate_swapchain();
                Err(Error::Present(describe(err)))
            }
        }
    }

    fn reset(&mut self, params: &PresentParameters) -> Result<(), Error> {
        if self.scene.is_some() {
            return Err(Error::InvalidCall("reset during a scene"));
        }
        if params.back_buffer_width != 0 && params.back_buffer_height != 0 {
            self.swapchain.dims = window::Extent2D {
                width: params.back_buffer_width,
                height: params.back_buffer_height,
            };
        }
        self.recreate_swapchain();
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), Error> {
        self.device
            .wait_idle()
            .map_err(|err| Error::WaitIdle(describe(err)))
    }
}

impl<B: Backend> Drop for GfxDevice<B> {
    fn drop(&mut self) {
        let device = &self.device;
        if let Err(err) = device.wait_idle() {
            log::warn!("wait idle failed: {:?}", err);
        }
        self.scene = None;
        unsafe {
            for frame_buffer in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(frame_buffer);
            }
            self.command_pool.free(self.command_buffers.drain(..));
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }

            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }

            ManuallyDrop::drop(&mut self.pipeline);
            device.destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.render_pass)));
            self.surface.unconfigure_swapchain(device);
        }
    }
}
