// SPDX-License-Identifier: CEPL-1.0
//! The GPU calls the swapchain manager is allowed to make.
//!
//! Everything goes through [`PresentBackend`] so the frame pacing logic can be
//! driven by [`AshBackend`] against a real device or by a scripted backend in
//! tests. Implementations hand out plain `vk` handles; ownership of what they
//! create stays with the caller, which must destroy it through the same
//! backend.

mod ash_backend;
#[cfg(test)]
pub(crate) mod mock;

pub use ash_backend::AshBackend;

use crate::render_pass::RenderPassDescriptor;
use ash::prelude::VkResult;
use ash::vk;

/// Parameters for one presentation object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub min_image_count: u32,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Retired by the new swapchain; may be null.
    pub old_swapchain: vk::SwapchainKHR,
}

/// One queue submission. All fields are optional so the same shape covers a
/// frame's work and a bare fence signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Submission {
    pub command_buffer: Option<vk::CommandBuffer>,
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
    pub fence: vk::Fence,
}

impl Submission {
    /// Empty submission; `fence` signals once all earlier work on the queue
    /// has completed.
    pub fn fence_only(fence: vk::Fence) -> Self {
        Submission {
            fence,
            ..Default::default()
        }
    }
}

pub trait PresentBackend {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
    fn device_wait_idle(&self) -> VkResult<()>;

    fn create_render_pass(&self, desc: &RenderPassDescriptor) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// `Err(vk::Result::TIMEOUT)` when `timeout_ns` elapses first.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    /// Returns `(image index, suboptimal)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;

    /// Opens `buffer` for a single submission.
    fn begin_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;
    fn queue_submit(&self, submission: &Submission) -> VkResult<()>;
    /// Returns `true` when the surface reported suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;

    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    );
    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);
}
