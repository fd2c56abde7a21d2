// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Everything that can stop a frame from being created, recorded or shown.
///
/// The render loop is expected to poll these every tick: a recoverable error
/// means "skip this tick and try again next time", anything else means the
/// swapchain needs a successful `create`/`recreate` before the next frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PresentError {
    #[error("surface extent {width}x{height} has zero area (window hidden or minimized)")]
    ZeroExtent { width: u32, height: u32 },
    #[error("no live swapchain")]
    NoSwapchain,
    #[error("timed out waiting on frame {frame} fence, falling behind")]
    FenceTimeout { frame: usize },
    #[error("timed out acquiring a swapchain image, running too slow")]
    AcquireTimeout,
    #[error("swapchain is out of date")]
    OutOfDate,
    #[error("swapchain is suboptimal for the surface")]
    Suboptimal,
    #[error("{op} failed: {result}")]
    Vulkan {
        op: &'static str,
        result: vk::Result,
    },
    #[error("a frame is already being recorded")]
    AlreadyRecording,
    #[error("no frame is being recorded")]
    NotRecording,
    #[error("frame index {index} out of range for buffering depth {depth}")]
    FrameOutOfRange { index: usize, depth: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Surface too small to render into.
    Transient,
    /// Surface no longer matches the swapchain.
    Stale,
    Timeout,
    Fatal,
    /// Called out of order.
    Usage,
}

impl PresentError {
    pub(crate) fn vulkan(op: &'static str) -> impl FnOnce(vk::Result) -> PresentError {
        move |result| PresentError::Vulkan { op, result }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PresentError::ZeroExtent { .. } => ErrorKind::Transient,
            PresentError::OutOfDate | PresentError::Suboptimal => ErrorKind::Stale,
            PresentError::FenceTimeout { .. } | PresentError::AcquireTimeout => ErrorKind::Timeout,
            PresentError::NoSwapchain | PresentError::Vulkan { .. } => ErrorKind::Fatal,
            PresentError::AlreadyRecording
            | PresentError::NotRecording
            | PresentError::FrameOutOfRange { .. } => ErrorKind::Usage,
        }
    }

    /// True when the caller should simply skip the tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::Stale | ErrorKind::Timeout
        )
    }
}
