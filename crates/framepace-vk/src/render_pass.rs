// SPDX-License-Identifier: CEPL-1.0
//! The single-subpass render pass every presentable image is drawn through.

use ash::vk;

/// Packed 32-bit BGRA, the format every desktop presentation engine offers.
pub const COLOR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// One cleared-and-stored color attachment plus its two external
/// dependencies.
///
/// Dependency 0 orders this subpass's color writes after whatever touched the
/// attachment before (the presentation engine, or the previous frame).
/// Dependency 1 orders a later fragment-shader read of the attachment, such as
/// a post-process pass sampling the frame, after those writes.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDescriptor {
    pub attachment: vk::AttachmentDescription,
    pub dependencies: [vk::SubpassDependency; 2],
}

impl RenderPassDescriptor {
    pub fn new(format: vk::Format) -> Self {
        let attachment = vk::AttachmentDescription {
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        };

        let before_write = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };

        let before_read = vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: vk::SUBPASS_EXTERNAL,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_access_mask: vk::AccessFlags::SHADER_READ,
            ..Default::default()
        };

        RenderPassDescriptor {
            attachment,
            dependencies: [before_write, before_read],
        }
    }

    pub fn color_reference() -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }
}

impl Default for RenderPassDescriptor {
    fn default() -> Self {
        Self::new(COLOR_FORMAT)
    }
}
