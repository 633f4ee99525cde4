use crate::config::ClearColor;
use crate::error::{context, Error, Result};
use gfx_hal::{
    adapter, buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    queue::{family::QueueFamilyId, Submission},
    window, Backend,
};

use std::borrow::Borrow;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

mod buffer;
mod memory;
mod pipeline;
mod shader;
mod swapchain;
mod vertex;

use buffer::Buffer;
use memory::Memory;
use pipeline::Pipeline;
use swapchain::Swapchain;
use vertex::{Vertex, TRIANGLE};

const FRAMES_IN_FLIGHT: usize = 2;

/// What happened to a requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The surface was out of date; the swapchain has been rebuilt and the
    /// frame should be requested again.
    SwapchainRecreated,
}

struct FrameSlot<B: Backend> {
    command_buffer: B::CommandBuffer,
    submission_complete_semaphore: B::Semaphore,
    submission_complete_fence: B::Fence,
    framebuffer: Option<B::Framebuffer>,
}

pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    clear_color: ClearColor,
    slots: Vec<FrameSlot<B>>,
    command_pool: ManuallyDrop<B::CommandPool>,
    memory: ManuallyDrop<Memory<'a, B, Vertex>>,
    swapchain: ManuallyDrop<Swapchain<'a, B>>,
    render_pass: ManuallyDrop<B::RenderPass>,
    pipeline: ManuallyDrop<Pipeline<'a, B>>,
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
        clear_color: ClearColor,
    ) -> Result<Self> {
        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();

        let vertex_buffer = Buffer::new(device, &TRIANGLE, &limits)?;
        let memory = Memory::new(vertex_buffer, &memory_types)?;
        let swapchain = Swapchain::new(device, surface, adapter, init_dims)?;
        let render_pass = Self::create_render_pass(device, swapchain.format)?;
        let linked = Pipeline::new(device, &render_pass).and_then(|pipeline| {
            let (command_pool, slots) = Self::create_frames(device, family)?;
            Ok((pipeline, command_pool, slots))
        });
        let (pipeline, command_pool, slots) = match linked {
            Ok(linked) => linked,
            Err(err) => {
                unsafe { device.destroy_render_pass(render_pass) };
                return Err(err);
            }
        };
        log::info!("renderer ready with {} frames in flight", slots.len());

        Ok(Renderer {
            device,
            clear_color,
            slots,
            command_pool: ManuallyDrop::new(command_pool),
            memory: ManuallyDrop::new(memory),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            pipeline: ManuallyDrop::new(pipeline),
            frame: 0,
        })
    }

    pub fn resize(&mut self, dims: window::Extent2D) -> Result<()> {
        log::debug!("resizing to {}x{}", dims.width, dims.height);
        self.swapchain.resize(dims)
    }

    /// Clears the surface and draws the triangle once.
    pub fn render(&mut self, queue: &mut B::CommandQueue) -> Result<FrameOutcome> {
        let surface_image = match unsafe { self.swapchain.surface.acquire_image(!0) } {
            Ok((image, _)) => image,
            Err(err) => {
                let outcome = acquire_failure(err)?;
                log::warn!("swapchain out of date on acquire, recreating");
                self.swapchain.recreate()?;
                return Ok(outcome);
            }
        };

        let slot_idx = self.frame % self.slots.len();
        let slot = &mut self.slots[slot_idx];
        log::trace!("frame {} on slot {}", self.frame, slot_idx);

        unsafe {
            let fence = &slot.submission_complete_fence;
            self.device
                .wait_for_fence(fence, !0)
                .map_err(context(Error::Frame, "wait for fence"))?;
            self.device
                .reset_fence(fence)
                .map_err(context(Error::Frame, "reset fence"))?;
            if let Some(framebuffer) = slot.framebuffer.take() {
                self.device.destroy_framebuffer(framebuffer);
            }
        }

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
        .map_err(context(Error::Frame, "create framebuffer"))?;
        let frame_buffer = &*slot.framebuffer.get_or_insert(frame_buffer);

        let cmd_buffer = &mut slot.command_buffer;
        let result = unsafe {
            cmd_buffer.reset(false);
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.bind_graphics_pipeline(&self.pipeline.pipeline);
            cmd_buffer.bind_vertex_buffers(
                Vertex::BINDING,
                iter::once((&*self.memory.buffer.buf, b::SubRange::WHOLE)),
            );
            cmd_buffer.begin_render_pass(
                &self.render_pass,
                frame_buffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: self.clear_color.0,
                    },
                }],
                command::SubpassContents::Inline,
            );
            cmd_buffer.draw(0..TRIANGLE.len() as u32, 0..1);
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&slot.submission_complete_semaphore),
            };

            queue.submit(submission, Some(&slot.submission_complete_fence));

            queue.present_surface(
                &mut *self.swapchain.surface,
                surface_image,
                Some(&slot.submission_complete_semaphore),
            )
        };
        self.frame += 1;

        match result {
            Ok(None) => Ok(FrameOutcome::Presented),
            Ok(Some(_)) => {
                log::debug!("swapchain is suboptimal, recreating");
                self.swapchain.recreate()?;
                Ok(FrameOutcome::Presented)
            }
            Err(err) => {
                let outcome = present_failure(err)?;
                log::warn!("swapchain out of date on present, recreating");
                self.swapchain.recreate()?;
                Ok(outcome)
            }
        }
    }

    fn create_render_pass(device: &B::Device, format: f::Format) -> Result<B::RenderPass> {
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
            .map_err(context(Error::Pipeline, "create render pass"))
    }

    /// Command pool plus one slot per frame in flight. Nothing is left
    /// behind on failure.
    fn create_frames(
        device: &B::Device,
        family: QueueFamilyId,
    ) -> Result<(B::CommandPool, Vec<FrameSlot<B>>)> {
        let mut command_pool = unsafe {
            device.create_command_pool(family, pool::CommandPoolCreateFlags::RESET_INDIVIDUAL)
        }
        .map_err(context(Error::Device, "create command pool"))?;

        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            match Self::create_slot(device, &mut command_pool) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    unsafe {
                        for slot in slots.drain(..) {
                            Self::destroy_slot(device, slot);
                        }
                        device.destroy_command_pool(command_pool);
                    }
                    return Err(err);
                }
            }
        }
        Ok((command_pool, slots))
    }

    fn create_slot(device: &B::Device, command_pool: &mut B::CommandPool) -> Result<FrameSlot<B>> {
        let submission_complete_semaphore = device
            .create_semaphore()
            .map_err(context(Error::Device, "create semaphore"))?;
        let submission_complete_fence = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(err) => {
                unsafe { device.destroy_semaphore(submission_complete_semaphore) };
                return Err(context(Error::Device, "create fence")(err));
            }
        };
        Ok(FrameSlot {
            command_buffer: unsafe { command_pool.allocate_one(command::Level::Primary) },
            submission_complete_semaphore,
            submission_complete_fence,
            framebuffer: None,
        })
    }

    /// The slot's command buffer goes with its pool.
    unsafe fn destroy_slot(device: &B::Device, slot: FrameSlot<B>) {
        device.destroy_semaphore(slot.submission_complete_semaphore);
        device.destroy_fence(slot.submission_complete_fence);
        if let Some(framebuffer) = slot.framebuffer {
            device.destroy_framebuffer(framebuffer);
        }
    }
}

/// Splits acquire failures into "rebuild the swapchain" and fatal errors.
pub fn acquire_failure(err: window::AcquireError) -> Result<FrameOutcome> {
    match err {
        window::AcquireError::OutOfDate => Ok(FrameOutcome::SwapchainRecreated),
        err => Err(context(Error::Frame, "acquire swapchain image")(err)),
    }
}

/// Splits present failures into "rebuild the swapchain" and fatal errors.
pub fn present_failure(err: window::PresentError) -> Result<FrameOutcome> {
    match err {
        window::PresentError::OutOfDate => Ok(FrameOutcome::SwapchainRecreated),
        err => Err(context(Error::Frame, "present swapchain image")(err)),
    }
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        let device = &self.device;
        if let Err(err) = device.wait_idle() {
            log::error!("device did not go idle before teardown: {:?}", err);
        }
        unsafe {
            for slot in self.slots.drain(..) {
                Self::destroy_slot(device, slot);
            }
            // frees the command buffers with it
            device.destroy_command_pool(ManuallyDrop::into_inner(ptr::read(&self.command_pool)));

            ManuallyDrop::drop(&mut self.memory);
            ManuallyDrop::drop(&mut self.pipeline);
            device.destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.render_pass)));
            ManuallyDrop::drop(&mut self.swapchain);
        }
        log::debug!("renderer released after {} frames", self.frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfx_hal::device::{DeviceLost, OutOfMemory, SurfaceLost};

    #[test]
    fn only_out_of_date_acquire_rebuilds() {
        assert_eq!(
            acquire_failure(window::AcquireError::OutOfDate).unwrap(),
            FrameOutcome::SwapchainRecreated
        );

        for err in vec![
            window::AcquireError::OutOfMemory(OutOfMemory::Host),
            window::AcquireError::OutOfMemory(OutOfMemory::Device),
            window::AcquireError::NotReady,
            window::AcquireError::Timeout,
            window::AcquireError::SurfaceLost(SurfaceLost),
            window::AcquireError::DeviceLost(DeviceLost),
        ] {
            match acquire_failure(err.clone()) {
                Err(Error::Frame(msg)) => assert!(msg.starts_with("acquire swapchain image")),
                other => panic!("{:?} should be fatal, got {:?}", err, other),
            }
        }
    }

    #[test]
    fn only_out_of_date_present_rebuilds() {
        assert_eq!(
            present_failure(window::PresentError::OutOfDate).unwrap(),
            FrameOutcome::SwapchainRecreated
        );

        for err in vec![
            window::PresentError::OutOfMemory(OutOfMemory::Host),
            window::PresentError::SurfaceLost(SurfaceLost),
            window::PresentError::DeviceLost(DeviceLost),
        ] {
            match present_failure(err.clone()) {
                Err(Error::Frame(msg)) => assert!(msg.starts_with("present swapchain image")),
                other => panic!("{:?} should be fatal, got {:?}", err, other),
            }
        }
    }
}
