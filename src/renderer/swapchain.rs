use gfx_hal::{format as f, prelude::*, pso, window, Backend};

use super::describe;
use crate::device::BackBufferFormat;
use crate::error::Error;

pub struct Swapchain {
    pub viewport: pso::Viewport,
    pub dims: window::Extent2D,
    pub format: f::Format,
}

impl Swapchain {
    pub fn new<B: Backend>(
        device: &B::Device,
        surface: &mut B::Surface,
        physical_device: &B::PhysicalDevice,
        dims: window::Extent2D,
        requested: BackBufferFormat,
    ) -> Result<Self, Error> {
        let formats = surface.supported_formats(physical_device);
        let format = Self::choose_format(formats.as_deref(), requested)?;

        let viewport = pso::Viewport {
            rect: pso::Rect {
                x: 0,
                y: 0,
                w: dims.width as _,
                h: dims.height as _,
            },
            depth: 0.0..1.0,
        };

        let mut swapchain = Swapchain {
            viewport,
            format,
            dims,
        };

        swapchain.recreate::<B>(device, surface, physical_device)?;
        Ok(swapchain)
    }

    /// `Unknown` takes the first UNORM format the surface offers, else its first format.
    fn choose_format(
        formats: Option<&[f::Format]>,
        requested: BackBufferFormat,
    ) -> Result<f::Format, Error> {
        match requested {
            BackBufferFormat::Unknown => match formats {
                None => Ok(f::Format::Bgra8Unorm),
                Some(formats) => formats
                    .iter()
                    .find(|format| format.base_format().1 == f::ChannelType::Unorm)
                    .or_else(|| formats.first())
                    .copied()
                    .ok_or_else(|| Error::CreateDevice("surface reports no formats".into())),
            },
        }
    }

    pub fn recreate<B: Backend>(
        &mut self,
        device: &B::Device,
        surface: &mut B::Surface,
        physical_device: &B::PhysicalDevice,
    ) -> Result<(), Error> {
        let caps = surface.capabilities(physical_device);

        let mut swap_config = window::SwapchainConfig::from_caps(&caps, self.format, self.dims);
        swap_config.present_mode = window::PresentMode::FIFO;
        let extent = swap_config.extent;
        unsafe {
            surface
                .configure_swapchain(device, swap_config)
                .map_err(|err| Error::CreateDevice(describe(err)))?;
        }

        self.dims = extent;
        self.viewport.rect.w = extent.width as _;
        self.viewport.rect.h = extent.height as _;
        Ok(())
    }

    pub fn viewport_size(&self) -> [f32; 2] {
        [self.viewport.rect.w as f32, self.viewport.rect.h as f32]
    }
}
