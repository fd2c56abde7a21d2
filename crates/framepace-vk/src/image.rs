// SPDX-License-Identifier: CEPL-1.0
use crate::backend::PresentBackend;
use crate::error::PresentError;
use crate::render_pass::COLOR_FORMAT;
use ash::vk;

/// A swapchain image with the view and framebuffer rendering goes through.
///
/// `image` belongs to the swapchain; only `view` and `framebuffer` are
/// destroyed here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

impl PresentableImage {
    pub(crate) fn new<B: PresentBackend>(
        backend: &B,
        image: vk::Image,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> Result<Self, PresentError> {
        let view = backend
            .create_image_view(image, COLOR_FORMAT)
            .map_err(PresentError::vulkan("create_image_view"))?;

        let framebuffer = match backend.create_framebuffer(render_pass, view, extent) {
            Ok(fb) => fb,
            Err(e) => {
                backend.destroy_image_view(view);
                return Err(PresentError::vulkan("create_framebuffer")(e));
            }
        };

        Ok(PresentableImage {
            image,
            view,
            framebuffer,
        })
    }

    pub(crate) fn destroy<B: PresentBackend>(self, backend: &B) {
        backend.destroy_framebuffer(self.framebuffer);
        backend.destroy_image_view(self.view);
    }
}
