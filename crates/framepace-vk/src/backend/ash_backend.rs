// SPDX-License-Identifier: CEPL-1.0
use super::{PresentBackend, Submission, SwapchainDesc};
use crate::render_pass::{RenderPassDescriptor, COLOR_FORMAT, COLOR_SPACE};
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::vk;

/// [`PresentBackend`] over a live `ash` device.
///
/// Holds clones of the loaders and raw handles only. The device, surface,
/// queue and command pool belong to whoever built this backend and must
/// outlive it.
pub struct AshBackend {
    device: ash::Device,
    phys: vk::PhysicalDevice,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain_loader: swapchain::Device,
}

impl AshBackend {
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        phys: vk::PhysicalDevice,
        queue: vk::Queue,
        cmd_pool: vk::CommandPool,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Self {
        AshBackend {
            device: device.clone(),
            phys,
            queue,
            cmd_pool,
            surface_loader: surface_loader.clone(),
            surface,
            swapchain_loader: swapchain::Device::new(instance, device),
        }
    }
}

// Every handle passed back into these methods was created by this backend on
// `self.device`, and the caller guarantees it is not in use by the GPU when it
// is destroyed.
impl PresentBackend for AshBackend {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn create_render_pass(&self, desc: &RenderPassDescriptor) -> VkResult<vk::RenderPass> {
        let color_ref = RenderPassDescriptor::color_reference();
        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            ..Default::default()
        };
        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &desc.attachment,
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: desc.dependencies.len() as u32,
            p_dependencies: desc.dependencies.as_ptr(),
            ..Default::default()
        };
        unsafe { self.device.create_render_pass(&rp_info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: desc.min_image_count,
            image_format: COLOR_FORMAT,
            image_color_space: COLOR_SPACE,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: desc.old_swapchain,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.create_swapchain(&swap_info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VkResult<vk::ImageView> {
        let sub = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let iv_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping::default(),
            subresource_range: sub,
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&iv_info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let fb_info = vk::FramebufferCreateInfo {
            s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
            render_pass,
            attachment_count: 1,
            p_attachments: &view,
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        unsafe { self.device.create_framebuffer(&fb_info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&alloc_info) }
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe { self.device.free_command_buffers(self.cmd_pool, buffers) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.create_fence(&fence_ci, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        }
    }

    fn begin_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(buffer, &begin) }
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let wait_sem = submission.wait.map(|(sem, _)| sem);
        let wait_stage = submission.wait.map(|(_, stage)| stage);
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(wait_sem.as_slice())
            .wait_dst_stage_mask(wait_stage.as_slice())
            .command_buffers(submission.command_buffer.as_slice())
            .signal_semaphores(submission.signal.as_slice());
        unsafe {
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), submission.fence)
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        unsafe { self.swapchain_loader.queue_present(self.queue, &present) }
    }

    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    ) {
        let clears = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear },
        }];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe {
            self.device
                .cmd_begin_render_pass(buffer, &rp_begin, vk::SubpassContents::INLINE)
        }
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(buffer) }
    }
}
