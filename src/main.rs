#[cfg(feature = "dx12")]
use gfx_backend_dx12 as back;

#[cfg(all(feature = "metal", not(feature = "dx12")))]
use gfx_backend_metal as back;

#[cfg(all(feature = "vulkan", not(any(feature = "dx12", feature = "metal"))))]
use gfx_backend_vulkan as back;

#[cfg(not(any(feature = "vulkan", feature = "metal", feature = "dx12")))]
compile_error!("enable one of the `vulkan`, `metal` or `dx12` features");

mod context;
mod device;
mod error;
mod icon;
mod message_loop;
#[cfg(test)]
mod recording;
mod renderer;
mod vertex;

use context::Context;
use message_loop::{Message, MessageLoop, Pump};
use renderer::GfxFactory;
use vertex::TRIANGLE;

use gfx_hal::window;
use winit::dpi::{PhysicalPosition, PhysicalSize, Size};
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

const TITLE: &str = "D3D Tutorial 02: Vertices";

const DIMS: window::Extent2D = window::Extent2D {
    width: 300,
    height: 300,
};

const POSITION: (i32, i32) = (100, 100);

fn main() {
    env_logger::init();
    let mut fps_counter = fps_counter::FPSCounter::new();
    let event_loop = EventLoop::new();
    let wb = winit::window::WindowBuilder::new()
        .with_title(TITLE)
        .with_inner_size(Size::Physical(PhysicalSize::new(DIMS.width, DIMS.height)))
        .with_window_icon(icon::window_icon(&TRIANGLE, DIMS.width as f32))
        .with_visible(false);
    let window = match wb.build(&event_loop) {
        Ok(window) => window,
        Err(err) => {
            log::error!("failed to create window: {}", err);
            return;
        }
    };
    window.set_outer_position(PhysicalPosition::new(POSITION.0, POSITION.1));

    let mut context = Context::new();
    if let Err(err) = context.init(|| GfxFactory::<back::Backend>::create(TITLE), &window) {
        log::error!("startup aborted: {}", err);
        return;
    }
    window.set_visible(true);

    let mut main_loop = MessageLoop::new(context);

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        let pump = match event {
            Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
                WindowEvent::CloseRequested
                | WindowEvent::Destroyed
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                } => main_loop.step(Some(Message::Destroy)),
                WindowEvent::Resized(size) => main_loop.step(Some(Message::Resize {
                    width: size.width,
                    height: size.height,
                })),
                _ => Pump::Continue,
            },
            Event::MainEventsCleared => {
                let pump = main_loop.step(None);
                let fps = fps_counter.tick();
                log::trace!("frame {}: {} fps", main_loop.frames(), fps);
                pump
            }
            Event::LoopDestroyed => main_loop.step(Some(Message::Quit)),
            _ => Pump::Continue,
        };

        if pump == Pump::Exit {
            *control_flow = ControlFlow::Exit;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_matches_tutorial() {
        assert_eq!(TITLE, "D3D Tutorial 02: Vertices");
        assert_eq!((DIMS.width, DIMS.height), (300, 300));
        assert_eq!(POSITION, (100, 100));
    }
}
