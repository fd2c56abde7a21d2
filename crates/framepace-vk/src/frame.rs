// SPDX-License-Identifier: CEPL-1.0
use crate::backend::PresentBackend;
use crate::error::PresentError;
use ash::vk;

/// Per-frame-in-flight resources.
///
/// `fence` gates reuse of `command_buffer`: it is created signaled, reset when
/// the slot starts recording, and signaled again by the submission that ends
/// it. `acquire` and `complete` are only ever used by this slot's own
/// submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
    pub acquire: vk::Semaphore,
    pub complete: vk::Semaphore,
}

impl FrameSlot {
    /// Builds the sync objects around an already allocated command buffer.
    /// On failure the partial objects are destroyed; the command buffer is
    /// left to the caller.
    pub(crate) fn new<B: PresentBackend>(
        backend: &B,
        command_buffer: vk::CommandBuffer,
    ) -> Result<Self, PresentError> {
        let fence = backend
            .create_fence(true)
            .map_err(PresentError::vulkan("create_fence"))?;

        let acquire = match backend.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                backend.destroy_fence(fence);
                return Err(PresentError::vulkan("create_semaphore")(e));
            }
        };

        let complete = match backend.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                backend.destroy_semaphore(acquire);
                backend.destroy_fence(fence);
                return Err(PresentError::vulkan("create_semaphore")(e));
            }
        };

        Ok(FrameSlot {
            command_buffer,
            fence,
            acquire,
            complete,
        })
    }

    pub(crate) fn destroy<B: PresentBackend>(self, backend: &B) {
        backend.destroy_semaphore(self.complete);
        backend.destroy_semaphore(self.acquire);
        backend.destroy_fence(self.fence);
        backend.free_command_buffers(&[self.command_buffer]);
    }
}
