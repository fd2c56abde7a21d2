// SPDX-License-Identifier: CEPL-1.0
//! Multi-buffered swapchain with explicit CPU/GPU frame pacing.
//!
//! Per tick the renderer calls [`Swapchain::begin_frame`], records into
//! [`Swapchain::command_buffer`] between [`Swapchain::begin_render_pass`] and
//! [`Swapchain::end_render_pass`], then calls [`Swapchain::end_frame`].
//!
//! Frame slots and presentable images are indexed independently: the frame
//! index walks `0..depth` in order, the image index is whatever the
//! presentation engine hands back from acquire.

use crate::backend::{PresentBackend, Submission, SwapchainDesc};
use crate::error::PresentError;
use crate::frame::FrameSlot;
use crate::image::PresentableImage;
use crate::render_pass::{RenderPassDescriptor, COLOR_FORMAT};
use ash::vk;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One display refresh at 30 Hz.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(33);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwapchainOptions {
    /// Bound on every fence and acquire wait.
    pub wait_timeout: Duration,
    pub clear_color: [f32; 4],
    pub vsync: bool,
}

impl Default for SwapchainOptions {
    fn default() -> Self {
        SwapchainOptions {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    /// No live swapchain: never created, or the last create failed.
    Uninitialized,
    Ready,
    Recording,
    /// Inside `create`.
    Recreating,
    Destroyed,
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// FIFO is the only mode every surface supports.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// `max(desired, surface minimum)`, capped by the surface maximum (0 == none).
pub fn negotiate_depth(desired: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let depth = desired.max(caps.min_image_count).max(1);
    if caps.max_image_count == 0 {
        depth
    } else {
        depth.min(caps.max_image_count)
    }
}

fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

pub struct Swapchain<B: PresentBackend> {
    backend: B,
    render_pass: vk::RenderPass,
    handle: vk::SwapchainKHR,
    images: Vec<PresentableImage>,
    frames: Vec<FrameSlot>,

    extent: vk::Extent2D,
    depth: u32,
    current_frame: usize,
    current_image: u32,
    vsync: bool,
    clear: [f32; 4],
    wait_timeout_ns: u64,
    state: SwapchainState,
}

impl<B: PresentBackend> Swapchain<B> {
    /// Creates the render pass. No swapchain exists until [`Self::create`].
    pub fn new(backend: B, options: SwapchainOptions) -> Result<Self, PresentError> {
        let render_pass = backend
            .create_render_pass(&RenderPassDescriptor::new(COLOR_FORMAT))
            .map_err(PresentError::vulkan("create_render_pass"))?;

        Ok(Swapchain {
            backend,
            render_pass,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            frames: Vec::new(),
            extent: vk::Extent2D::default(),
            depth: 0,
            current_frame: 0,
            current_image: 0,
            vsync: options.vsync,
            clear: options.clear_color,
            wait_timeout_ns: u64::try_from(options.wait_timeout.as_nanos()).unwrap_or(u64::MAX),
            state: SwapchainState::Uninitialized,
        })
    }

    /// (Re)builds the swapchain, its images and frame slots.
    ///
    /// Non-zero `width` and `height` override the surface's current extent.
    /// A zero-area result tears down the previous swapchain and returns
    /// [`PresentError::ZeroExtent`], leaving extents and depth as they were.
    pub fn create(&mut self, desired_depth: u32, width: u32, height: u32) -> Result<(), PresentError> {
        match self.state {
            SwapchainState::Recording => return Err(PresentError::AlreadyRecording),
            SwapchainState::Destroyed => return Err(PresentError::NoSwapchain),
            _ => {}
        }

        self.state = SwapchainState::Recreating;
        let result = self.rebuild(desired_depth, width, height);
        self.state = match result {
            Ok(()) => SwapchainState::Ready,
            Err(_) => SwapchainState::Uninitialized,
        };

        match &result {
            Ok(()) => info!(
                "swapchain ready ({}x{}, depth {}, {})",
                self.extent.width,
                self.extent.height,
                self.depth,
                if self.vsync { "vsync" } else { "no vsync" }
            ),
            Err(e @ PresentError::ZeroExtent { .. }) => debug!("create skipped: {e}"),
            Err(e) => warn!("create failed: {e}"),
        }
        result
    }

    /// `create` with the current depth, after the GPU has drained.
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<(), PresentError> {
        if self.state == SwapchainState::Recording {
            return Err(PresentError::AlreadyRecording);
        }
        self.backend
            .device_wait_idle()
            .map_err(PresentError::vulkan("device_wait_idle"))?;
        self.create(self.depth, width, height)
    }

    fn rebuild(&mut self, desired_depth: u32, width: u32, height: u32) -> Result<(), PresentError> {
        self.backend
            .device_wait_idle()
            .map_err(PresentError::vulkan("device_wait_idle"))?;
        self.release_frame_resources();

        let caps = match self.backend.surface_capabilities() {
            Ok(caps) => caps,
            Err(e) => {
                self.destroy_swapchain();
                return Err(PresentError::vulkan("get_physical_device_surface_capabilities")(e));
            }
        };

        let extent = if width > 0 && height > 0 {
            // No buffer is allocated for the surface yet.
            vk::Extent2D { width, height }
        } else if caps.current_extent.width == u32::MAX {
            // Surface size is whatever the swapchain says; keep the last one.
            self.extent
        } else {
            caps.current_extent
        };

        if is_zero_area(extent) {
            self.destroy_swapchain();
            return Err(PresentError::ZeroExtent {
                width: extent.width,
                height: extent.height,
            });
        }

        let depth = negotiate_depth(desired_depth, &caps);
        let modes = self.backend.surface_present_modes().unwrap_or_default();
        let present_mode = choose_present_mode(&modes, self.vsync);

        let desc = SwapchainDesc {
            min_image_count: depth,
            extent,
            present_mode,
            pre_transform: caps.current_transform,
            old_swapchain: self.handle,
        };
        debug!(
            "creating swapchain: {}x{}, images(min={} desired={} → {}), present_mode {}",
            extent.width,
            extent.height,
            caps.min_image_count,
            desired_depth,
            depth,
            pm_name(present_mode)
        );

        let created = self.backend.create_swapchain(&desc);
        // The old swapchain is retired either way.
        self.destroy_swapchain();
        self.handle = created.map_err(PresentError::vulkan("create_swapchain"))?;

        if let Err(e) = self.build_frame_resources(depth, extent) {
            self.release_frame_resources();
            self.destroy_swapchain();
            return Err(e);
        }

        self.extent = extent;
        self.depth = self.frames.len() as u32;
        self.current_frame = 0;
        self.current_image = 0;

        self.backend
            .device_wait_idle()
            .map_err(PresentError::vulkan("device_wait_idle"))
    }

    fn build_frame_resources(&mut self, depth: u32, extent: vk::Extent2D) -> Result<(), PresentError> {
        let swapchain_images = self
            .backend
            .swapchain_images(self.handle)
            .map_err(PresentError::vulkan("get_swapchain_images"))?;

        // The driver may hand back more images than asked for, and acquire can
        // return any of them, so the larger count wins.
        let depth = depth.max(swapchain_images.len() as u32);

        let command_buffers = self
            .backend
            .allocate_command_buffers(depth)
            .map_err(PresentError::vulkan("allocate_command_buffers"))?;

        for (i, &cmd) in command_buffers.iter().enumerate() {
            match FrameSlot::new(&self.backend, cmd) {
                Ok(slot) => self.frames.push(slot),
                Err(e) => {
                    self.backend.free_command_buffers(&command_buffers[i..]);
                    return Err(e);
                }
            }
        }

        for &image in &swapchain_images {
            let presentable = PresentableImage::new(&self.backend, image, self.render_pass, extent)?;
            self.images.push(presentable);
        }

        Ok(())
    }

    fn release_frame_resources(&mut self) {
        for slot in self.frames.drain(..) {
            slot.destroy(&self.backend);
        }
        for image in self.images.drain(..) {
            image.destroy(&self.backend);
        }
    }

    fn destroy_swapchain(&mut self) {
        if self.handle != vk::SwapchainKHR::null() {
            self.backend.destroy_swapchain(self.handle);
            self.handle = vk::SwapchainKHR::null();
        }
    }

    /// Waits for the current slot, acquires an image and opens the slot's
    /// command buffer.
    ///
    /// A stale surface triggers one recreate at the surface's current size
    /// and one retry. On any error no command buffer is left open.
    pub fn begin_frame(&mut self) -> Result<(), PresentError> {
        let result = self.try_begin_frame(true);
        if let Err(e) = &result {
            debug!("begin_frame: {e}");
        }
        result
    }

    fn try_begin_frame(&mut self, may_recreate: bool) -> Result<(), PresentError> {
        match self.state {
            SwapchainState::Ready => {}
            SwapchainState::Recording => return Err(PresentError::AlreadyRecording),
            _ => return Err(PresentError::NoSwapchain),
        }
        if self.handle == vk::SwapchainKHR::null() || self.frames.is_empty() {
            return Err(PresentError::NoSwapchain);
        }
        if is_zero_area(self.extent) {
            return Err(PresentError::ZeroExtent {
                width: self.extent.width,
                height: self.extent.height,
            });
        }

        let slot = self.frames[self.current_frame];

        match self.backend.wait_for_fence(slot.fence, self.wait_timeout_ns) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                return Err(PresentError::FenceTimeout {
                    frame: self.current_frame,
                })
            }
            Err(e) => return Err(PresentError::vulkan("wait_for_fences")(e)),
        }

        let image_index =
            match self
                .backend
                .acquire_next_image(self.handle, self.wait_timeout_ns, slot.acquire)
            {
                Ok((index, false)) => index,
                Ok((_, true)) if may_recreate => {
                    warn!("swapchain suboptimal, recreating");
                    self.release_acquire(slot)?;
                    self.recreate(0, 0)?;
                    return self.try_begin_frame(false);
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if may_recreate => {
                    warn!("swapchain out of date, recreating");
                    self.recreate(0, 0)?;
                    return self.try_begin_frame(false);
                }
                Ok((_, true)) => {
                    self.release_acquire(slot)?;
                    return Err(PresentError::Suboptimal);
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(PresentError::OutOfDate),
                Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                    return Err(PresentError::AcquireTimeout)
                }
                Err(e) => return Err(PresentError::vulkan("acquire_next_image")(e)),
            };

        // Open before resetting so a failed begin leaves the fence signaled
        // and the slot usable next tick.
        if let Err(e) = self.backend.begin_command_buffer(slot.command_buffer) {
            self.release_acquire(slot)?;
            return Err(PresentError::vulkan("begin_command_buffer")(e));
        }

        if let Err(e) = self.backend.reset_fence(slot.fence) {
            let _ = self.backend.end_command_buffer(slot.command_buffer);
            return Err(PresentError::vulkan("reset_fences")(e));
        }

        self.current_image = image_index;
        self.state = SwapchainState::Recording;
        Ok(())
    }

    /// Consumes the acquire semaphore of an image that will not be drawn.
    ///
    /// The wait rides on the slot's fence, so the next `begin_frame` on this
    /// slot cannot acquire onto the semaphore before the wait has executed.
    /// On failure the fence may never signal again and the swapchain drops
    /// back to uninitialized.
    fn release_acquire(&mut self, slot: FrameSlot) -> Result<(), PresentError> {
        let released = self
            .backend
            .reset_fence(slot.fence)
            .map_err(PresentError::vulkan("reset_fences"))
            .and_then(|()| {
                self.backend
                    .queue_submit(&Submission {
                        wait: Some((slot.acquire, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
                        fence: slot.fence,
                        ..Default::default()
                    })
                    .map_err(PresentError::vulkan("queue_submit"))
            });
        if released.is_err() {
            self.state = SwapchainState::Uninitialized;
        }
        released
    }

    /// Closes recording, submits, presents and advances the frame index.
    ///
    /// `extra_fence` is signaled once this frame's GPU work completes. The
    /// frame index advances even when presentation fails. If the submission
    /// itself fails the swapchain drops back to uninitialized and needs a
    /// `recreate` before the next frame.
    pub fn end_frame(&mut self, extra_fence: Option<vk::Fence>) -> Result<(), PresentError> {
        if self.state != SwapchainState::Recording {
            return Err(PresentError::NotRecording);
        }

        let slot = self.frames[self.current_frame];
        let submitted = self.submit(slot, extra_fence);
        // The slot's fence will never signal if its work never reached the
        // queue; only a rebuild makes it usable again.
        self.state = if submitted.is_ok() {
            SwapchainState::Ready
        } else {
            SwapchainState::Uninitialized
        };
        let result = submitted.and_then(|()| self.present(slot));
        self.current_frame = (self.current_frame + 1) % self.frames.len();

        if let Err(e) = &result {
            if e.is_recoverable() {
                debug!("end_frame: {e}");
            } else {
                warn!("end_frame: {e}");
            }
        }
        result
    }

    fn submit(&self, slot: FrameSlot, extra_fence: Option<vk::Fence>) -> Result<(), PresentError> {
        self.backend
            .end_command_buffer(slot.command_buffer)
            .map_err(PresentError::vulkan("end_command_buffer"))?;

        self.backend
            .queue_submit(&Submission {
                command_buffer: Some(slot.command_buffer),
                wait: Some((slot.acquire, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
                signal: Some(slot.complete),
                fence: slot.fence,
            })
            .map_err(PresentError::vulkan("queue_submit"))?;

        if let Some(fence) = extra_fence {
            // Queue order means this fires after the frame's work.
            self.backend
                .queue_submit(&Submission::fence_only(fence))
                .map_err(PresentError::vulkan("queue_submit"))?;
        }
        Ok(())
    }

    fn present(&self, slot: FrameSlot) -> Result<(), PresentError> {
        match self
            .backend
            .queue_present(self.handle, self.current_image, slot.complete)
        {
            Ok(false) => Ok(()),
            Ok(true) => Err(PresentError::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(PresentError::OutOfDate),
            Err(e) => Err(PresentError::vulkan("queue_present")(e)),
        }
    }

    /// Clears the acquired image and restricts drawing to the current extent.
    pub fn begin_render_pass(&self) -> Result<(), PresentError> {
        if self.state != SwapchainState::Recording {
            return Err(PresentError::NotRecording);
        }
        let slot = &self.frames[self.current_frame];
        let image = &self.images[self.current_image as usize];
        self.backend.cmd_begin_render_pass(
            slot.command_buffer,
            self.render_pass,
            image.framebuffer,
            self.extent,
            self.clear,
        );
        Ok(())
    }

    pub fn end_render_pass(&self) -> Result<(), PresentError> {
        if self.state != SwapchainState::Recording {
            return Err(PresentError::NotRecording);
        }
        self.backend
            .cmd_end_render_pass(self.frames[self.current_frame].command_buffer);
        Ok(())
    }

    /// Bounded wait on frame slot `index`.
    pub fn wait_on_frame(&self, index: usize) -> Result<(), PresentError> {
        let slot = self.frames.get(index).ok_or(PresentError::FrameOutOfRange {
            index,
            depth: self.frames.len(),
        })?;
        match self.backend.wait_for_fence(slot.fence, self.wait_timeout_ns) {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(PresentError::FenceTimeout { frame: index }),
            Err(e) => Err(PresentError::vulkan("wait_for_fences")(e)),
        }
    }

    /// Returns whether the mode changed. Takes effect on the next recreate.
    pub fn set_vsync(&mut self, enabled: bool) -> bool {
        if self.vsync == enabled {
            return false;
        }
        self.vsync = enabled;
        true
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear = rgba;
    }

    /// Framebuffer of the acquired image. Valid until `end_frame`.
    pub fn framebuffer(&self) -> Option<vk::Framebuffer> {
        self.images
            .get(self.current_image as usize)
            .map(|i| i.framebuffer)
    }

    pub fn image(&self) -> Option<vk::Image> {
        self.images.get(self.current_image as usize).map(|i| i.image)
    }

    /// Command buffer of the current frame slot.
    pub fn command_buffer(&self) -> Option<vk::CommandBuffer> {
        self.frames
            .get(self.current_frame)
            .map(|f| f.command_buffer)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    pub fn image_index(&self) -> u32 {
        self.current_image
    }

    pub fn buffering_depth(&self) -> u32 {
        self.depth
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drains the GPU and releases everything this swapchain created.
    pub fn destroy(&mut self) {
        if self.state == SwapchainState::Destroyed {
            return;
        }
        if let Err(e) = self.backend.device_wait_idle() {
            warn!("device_wait_idle during teardown: {e}");
        }
        self.release_frame_resources();
        self.destroy_swapchain();
        self.backend.destroy_render_pass(self.render_pass);
        self.render_pass = vk::RenderPass::null();
        self.state = SwapchainState::Destroyed;
    }
}

impl<B: PresentBackend> Drop for Swapchain<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
