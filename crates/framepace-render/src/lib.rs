// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn new(width: u32, height: u32) -> Self {
        RenderSize { width, height }
    }

    /// A minimized or hidden window reports a zero-area size.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Presentation settings handed to a backend at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderOptions {
    pub buffering_depth: u32,
    pub vsync: bool,
    pub clear_color: [f32; 4],
    pub wait_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            buffering_depth: 2,
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            wait_timeout: Duration::from_millis(33),
        }
    }
}

/// What a tick of [`Renderer::render`] ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was drawn this tick (minimized, falling behind, stale surface).
    Skipped,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<FrameOutcome>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn set_vsync(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_sizes_are_empty() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(RenderSize::new(800, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }
}
