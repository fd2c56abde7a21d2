// SPDX-License-Identifier: CEPL-1.0
//! Vulkan frame presentation: a multi-buffered swapchain with bounded,
//! explicit CPU/GPU synchronization, plus the window bootstrap that feeds it.

pub mod backend;
pub mod context;
pub mod error;
pub mod frame;
pub mod image;
pub mod render_pass;
pub mod renderer;
pub mod swapchain;

pub use backend::{AshBackend, PresentBackend, Submission, SwapchainDesc};
pub use context::VkContext;
pub use error::{ErrorKind, PresentError};
pub use frame::FrameSlot;
pub use image::PresentableImage;
pub use render_pass::{RenderPassDescriptor, COLOR_FORMAT, COLOR_SPACE};
pub use renderer::VkRenderer;
pub use swapchain::{Swapchain, SwapchainOptions, SwapchainState, DEFAULT_WAIT_TIMEOUT};
