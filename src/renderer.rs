use anyhow::{anyhow, Result};
use gfx_hal::{
    adapter, buffer as b, command, image as i,
    prelude::*,
    queue::{family::QueueFamilyId, Submission},
    window, Backend, IndexType,
};
use log::{debug, warn};

use std::borrow::Borrow;
use std::iter;

mod buffer;
mod frame;
mod memory;
mod pipeline;
mod render_pass;
mod swapchain;
mod vertex;

use buffer::Buffer;
use frame::Frames;
use memory::Memory;
use pipeline::Pipeline;
use render_pass::RenderPass;
use swapchain::Swapchain;
pub use vertex::{sierpinski, triangle, Mesh, Shape, Vertex};

use crate::{CLEAR_COLOR, FILL_COLOR, FRAMES_IN_FLIGHT};

// Fields drop in declaration order: framebuffers and command buffers go
// before the pass and swapchain they refer to, buffers go last.
pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    draw_count: u32,
    frames: Frames<'a, B>,
    pipeline: Pipeline<'a, B>,
    render_pass: RenderPass<'a, B>,
    swapchain: Swapchain<'a, B>,
    indices: Option<Memory<'a, B>>,
    vertices: Memory<'a, B>,
}

impl<'a, B> Renderer<'a, B>
where
    B: Backend,
{
    pub fn new(
        surface: &'a mut B::Surface,
        adapter: &'a adapter::Adapter<B>,
        device: &'a B::Device,
        family: QueueFamilyId,
        init_dims: window::Extent2D,
        mesh: &Mesh,
    ) -> Result<Self> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();

        let vertex_buffer = Buffer::new(device, &mesh.vertices, b::Usage::VERTEX, &limits)?;
        let vertices = Memory::new(vertex_buffer, &mesh.vertices, &memory_types)?;
        let indices = match &mesh.indices {
            Some(indices) => {
                let index_buffer = Buffer::new(device, indices, b::Usage::INDEX, &limits)?;
                Some(Memory::new(index_buffer, indices, &memory_types)?)
            }
            None => None,
        };

        let swapchain = Swapchain::new(device, surface, adapter, init_dims)?;
        let render_pass = RenderPass::new(device, swapchain.format)?;
        let pipeline = Pipeline::new::<Vertex>(device, &*render_pass.raw, FILL_COLOR)?;
        let frames = Frames::new(device, family, FRAMES_IN_FLIGHT)?;

        debug!(
            "renderer ready: {} vertices, {} elements per draw",
            mesh.vertices.len(),
            mesh.draw_count()
        );

        Ok(Renderer {
            frame: 0,
            device,
            draw_count: mesh.draw_count(),
            frames,
            pipeline,
            render_pass,
            swapchain,
            indices,
            vertices,
        })
    }

    /// Clears, draws the mesh and presents one frame.
    pub fn render(&mut self, queue: &mut B::CommandQueue) -> Result<()> {
        let surface_image = unsafe {
            match self.swapchain.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    warn!("failed to acquire swapchain image: {:?}", err);
                    return self.swapchain.recreate();
                }
            }
        };

        let frame_idx = self.frame % self.frames.in_flight();

        unsafe {
            let fence = &self.frames.submission_complete_fences[frame_idx];
            self.device
                .wait_for_fence(fence, !0)
                .map_err(|err| anyhow!("can't wait for fence: {:?}", err))?;
            self.device
                .reset_fence(fence)
                .map_err(|err| anyhow!("can't reset fence: {:?}", err))?;
            if let Some(old) = self.frames.framebuffers[frame_idx].take() {
                self.device.destroy_framebuffer(old);
            }
            self.frames.command_buffers[frame_idx].reset(false);
        }

        let frame_buffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass.raw,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: self.swapchain.viewport.rect.w as u32,
                    height: self.swapchain.viewport.rect.h as u32,
                    depth: 1,
                },
            )
        }
        .map_err(|err| anyhow!("could not create frame buffer: {:?}", err))?;

        let cmd_buffer = &mut self.frames.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.bind_graphics_pipeline(&self.pipeline.pipeline);
            cmd_buffer.bind_vertex_buffers(
                0,
                iter::once((&*self.vertices.buffer.buf, b::SubRange::WHOLE)),
            );
            if let Some(indices) = &self.indices {
                cmd_buffer.bind_index_buffer(b::IndexBufferView {
                    buffer: &*indices.buffer.buf,
                    range: b::SubRange::WHOLE,
                    index_type: IndexType::U32,
                });
            }
            cmd_buffer.begin_render_pass(
                &self.render_pass.raw,
                &frame_buffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: CLEAR_COLOR,
                    },
                }],
                command::SubpassContents::Inline,
            );
            if self.indices.is_some() {
                cmd_buffer.draw_indexed(0..self.draw_count, 0, 0..1);
            } else {
                cmd_buffer.draw(0..self.draw_count, 0..1);
            }
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(
                    &self.frames.submission_complete_semaphores[frame_idx],
                ),
            };

            queue.submit(
                submission,
                Some(&self.frames.submission_complete_fences[frame_idx]),
            );

            let result = queue.present_surface(
                &mut self.swapchain.surface,
                surface_image,
                Some(&self.frames.submission_complete_semaphores[frame_idx]),
            );

            self.frames.framebuffers[frame_idx] = Some(frame_buffer);
            self.frame += 1;

            if let Err(err) = result {
                warn!("failed to present: {:?}", err);
                self.swapchain.recreate()?;
            }
        }

        Ok(())
    }
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            warn!("device did not go idle before teardown: {:?}", err);
        }
        debug!("tearing down renderer after {} frames", self.frame);
    }
}
