#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(feature = "vulkan")]
use gfx_backend_vulkan as back;

use anyhow::{anyhow, Result};
use gfx_hal::{prelude::*, Backend, Features};
use log::{debug, info, trace};
use std::any::Any;
use std::fmt;
use std::panic;
use winit::{
    dpi::{PhysicalSize, Size},
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    platform::desktop::EventLoopExtDesktop,
    window::{Window, WindowBuilder},
};

use crate::renderer::{Mesh, Renderer, Shape};
use crate::{DIMS, FAILURE_EXIT_CODE, TITLE};

type Surface = <back::Backend as Backend>::Surface;
type QueueFamily = <back::Backend as Backend>::QueueFamily;

#[derive(Debug)]
pub enum AppError {
    /// The OS refused to give us a window. Nothing graphics-related has
    /// been touched yet when this is returned.
    WindowCreation(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::WindowCreation(reason) => write!(f, "failed to create window: {}", reason),
        }
    }
}

impl std::error::Error for AppError {}

/// Maps the outcome of [`run`] to a process exit status.
///
/// Every failure maps to [`FAILURE_EXIT_CODE`], not only a missing window:
/// device setup errors and swapchain errors in the middle of the frame loop
/// exit with -1 as well.
pub fn exit_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => FAILURE_EXIT_CODE,
    }
}

/// Opens the window and draws `shape` until the window is asked to close.
pub fn run(shape: Shape) -> Result<()> {
    let (mut event_loop, window) = open_window()?;
    info!("opened {}x{} window {:?}", DIMS.width, DIMS.height, TITLE);

    let instance = back::Instance::create(TITLE, 1)
        .map_err(|err| anyhow!("failed to create an instance of gfx: {:?}", err))?;
    let mut surface = unsafe { instance.create_surface(&window) }
        .map_err(|err| anyhow!("failed to create a surface: {:?}", err))?;

    let mesh = shape.mesh();
    let result = draw_until_closed(&mut event_loop, &instance, &mut surface, &mesh);

    unsafe {
        instance.destroy_surface(surface);
    }
    debug!("surface destroyed");
    result
}

/// Creates the event loop and the fixed-size, non-resizable window.
///
/// winit panics rather than returning an error when neither Wayland nor X11
/// is reachable, so the event loop is created under `catch_unwind`.
fn open_window() -> Result<(EventLoop<()>, Window), AppError> {
    let event_loop = panic::catch_unwind(new_event_loop)
        .map_err(|payload| AppError::WindowCreation(panic_message(&*payload)))?;
    let window = WindowBuilder::new()
        .with_title(TITLE)
        .with_inner_size(Size::Physical(PhysicalSize::new(DIMS.width, DIMS.height)))
        .with_resizable(false)
        .build(&event_loop)
        .map_err(|err| AppError::WindowCreation(err.to_string()))?;
    Ok((event_loop, window))
}

#[cfg(any(
    target_os = "linux",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
))]
fn new_event_loop() -> EventLoop<()> {
    use winit::platform::unix::EventLoopExtUnix;
    // unix is the only platform that allows it off the main thread
    EventLoop::new_any_thread()
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
fn new_event_loop() -> EventLoop<()> {
    EventLoop::new()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "no display backend available".to_string())
}

fn draw_until_closed(
    event_loop: &mut EventLoop<()>,
    instance: &back::Instance,
    surface: &mut Surface,
    mesh: &Mesh,
) -> Result<()> {
    let supports = |family: &QueueFamily| {
        surface.supports_queue_family(family) && family.queue_type().supports_graphics()
    };

    let adapter = instance
        .enumerate_adapters()
        .into_iter()
        .find(|adapter| adapter.queue_families.iter().any(|family| supports(family)))
        .ok_or_else(|| anyhow!("no adapter can draw to the window"))?;
    info!("using adapter {}", adapter.info.name);

    let family = adapter
        .queue_families
        .iter()
        .find(|family| supports(*family))
        .ok_or_else(|| anyhow!("adapter lost its graphics queue family"))?;
    let mut gpu = unsafe {
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(|err| anyhow!("failed to open the device: {:?}", err))?;

    let mut queue_group = gpu
        .queue_groups
        .pop()
        .ok_or_else(|| anyhow!("device opened without a queue group"))?;
    let device = gpu.device;

    let mut renderer = Renderer::new(
        surface,
        &adapter,
        &device,
        queue_group.family,
        DIMS,
        mesh,
    )?;
    let queue = queue_group
        .queues
        .first_mut()
        .ok_or_else(|| anyhow!("queue group has no queues"))?;

    let mut fps_counter = fps_counter::FPSCounter::new();
    let mut should_close = false;
    let mut failure = None;

    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                } => {
                    info!("close requested");
                    should_close = true;
                }
                _ => {}
            },
            Event::MainEventsCleared if !should_close => match renderer.render(queue) {
                Ok(()) => trace!("fps: {}", fps_counter.tick()),
                Err(err) => {
                    failure = Some(err);
                    should_close = true;
                }
            },
            _ => {}
        }
        if should_close {
            *control_flow = ControlFlow::Exit;
        }
    });

    drop(renderer);
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_close_exits_zero() {
        assert_eq!(exit_code(&Ok(())), 0);
    }

    #[test]
    fn window_failure_exits_nonzero() {
        let result: Result<()> = Err(AppError::WindowCreation("no display".into()).into());
        assert_eq!(exit_code(&result), -1);

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::WindowCreation(_))
        ));
        assert_eq!(err.to_string(), "failed to create window: no display");
    }

    #[test]
    #[cfg(any(
        target_os = "linux",
        target_os = "dragonfly",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))]
    fn run_without_display_fails_before_touching_gfx() {
        // neither X11 nor Wayland can connect without these
        std::env::remove_var("DISPLAY");
        std::env::remove_var("WAYLAND_DISPLAY");
        std::env::remove_var("XDG_RUNTIME_DIR");

        let result = run(Shape::Triangle);
        assert_eq!(exit_code(&result), FAILURE_EXIT_CODE);

        // WindowCreation is only produced by `open_window`, which runs
        // before the gfx instance and surface exist
        let err = result.unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<AppError>(),
                Some(AppError::WindowCreation(_))
            ),
            "unexpected error: {:#}",
            err
        );
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = panic::catch_unwind(|| panic!("Failed to initialize any backend!"))
            .unwrap_err();
        assert_eq!(panic_message(&*payload), "Failed to initialize any backend!");

        let payload = panic::catch_unwind(|| panic!("{} backends", 2)).unwrap_err();
        assert_eq!(panic_message(&*payload), "2 backends");
    }

    #[test]
    fn other_setup_failures_exit_nonzero() {
        let result: Result<()> = Err(anyhow!("failed to create a surface"));
        assert_ne!(exit_code(&result), 0);
    }
}
