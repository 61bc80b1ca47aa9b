use anyhow::{anyhow, Result};
use gfx_hal::{command, pool, prelude::*, queue::family::QueueFamilyId, Backend};
use std::mem::ManuallyDrop;
use std::ptr;

/// Per-frame-in-flight command buffers, sync objects and framebuffers.
///
/// Everything is destroyed on drop, so a half-built `Frames` cleans up after
/// itself when a later creation step fails.
pub struct Frames<'a, B: Backend> {
    device: &'a B::Device,
    command_pool: ManuallyDrop<B::CommandPool>,
    pub command_buffers: Vec<B::CommandBuffer>,
    pub submission_complete_semaphores: Vec<B::Semaphore>,
    pub submission_complete_fences: Vec<B::Fence>,
    pub framebuffers: Vec<Option<B::Framebuffer>>,
}

impl<'a, B: Backend> Frames<'a, B> {
    pub fn new(device: &'a B::Device, family: QueueFamilyId, count: usize) -> Result<Self> {
        let command_pool = unsafe {
            device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL)
        }
        .map_err(|err| anyhow!("can't create command pool: {:?}", err))?;

        let mut frames: Frames<'a, B> = Frames {
            device,
            command_pool: ManuallyDrop::new(command_pool),
            command_buffers: Vec::with_capacity(count),
            submission_complete_semaphores: Vec::new(),
            submission_complete_fences: Vec::new(),
            framebuffers: (0..count).map(|_| None).collect(),
        };

        for _ in 0..count {
            let cmd_buffer = unsafe { frames.command_pool.allocate_one(command::Level::Primary) };
            frames.command_buffers.push(cmd_buffer);
        }

        frames.submission_complete_semaphores = create_all(
            count,
            || device.create_semaphore(),
            |s| unsafe { device.destroy_semaphore(s) },
        )
        .map_err(|err| anyhow!("could not create semaphore: {:?}", err))?;

        frames.submission_complete_fences = create_all(
            count,
            || device.create_fence(true),
            |f| unsafe { device.destroy_fence(f) },
        )
        .map_err(|err| anyhow!("could not create fence: {:?}", err))?;

        Ok(frames)
    }

    pub fn in_flight(&self) -> usize {
        self.command_buffers.len()
    }
}

impl<'a, B: Backend> Drop for Frames<'a, B> {
    fn drop(&mut self) {
        let device = self.device;
        unsafe {
            for fb in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(fb);
            }
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }
            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }
            self.command_pool.free(self.command_buffers.drain(..));
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));
        }
    }
}

/// Creates `count` objects, or none: on the first failure every object made
/// so far is handed to `destroy` before the error is returned.
fn create_all<T, E>(
    count: usize,
    mut create: impl FnMut() -> Result<T, E>,
    mut destroy: impl FnMut(T),
) -> Result<Vec<T>, E> {
    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        match create() {
            Ok(item) => created.push(item),
            Err(err) => {
                created.into_iter().for_each(&mut destroy);
                return Err(err);
            }
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn creates_every_object() {
        let mut next = 0;
        let made: Result<Vec<u32>, ()> = create_all(
            3,
            || {
                next += 1;
                Ok(next)
            },
            |_| panic!("nothing should be destroyed"),
        );
        assert_eq!(made.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failure_destroys_what_was_already_made() {
        let destroyed = RefCell::new(Vec::new());
        let mut next = 0;
        let made = create_all(
            2,
            || {
                next += 1;
                if next == 2 {
                    Err("out of memory")
                } else {
                    Ok(next)
                }
            },
            |item| destroyed.borrow_mut().push(item),
        );
        assert_eq!(made, Err("out of memory"));
        assert_eq!(*destroyed.borrow(), vec![1]);
    }

    #[test]
    fn first_failure_destroys_nothing() {
        let mut destroyed = 0;
        let made: Result<Vec<u32>, &str> = create_all(2, || Err("lost"), |_| destroyed += 1);
        assert!(made.is_err());
        assert_eq!(destroyed, 0);
    }
}
