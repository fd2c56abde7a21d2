// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use framepace_render::{FrameOutcome, RenderOptions, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

use crate::backend::AshBackend;
use crate::context::VkContext;
use crate::error::{ErrorKind, PresentError};
use crate::swapchain::{Swapchain, SwapchainOptions, SwapchainState};

/// Clears the window every tick through the presentation engine.
pub struct VkRenderer {
    // Declared before `_context` so it is dropped while the device still exists.
    swapchain: Swapchain<AshBackend>,
    _context: VkContext,
    size: RenderSize,
    desired_depth: u32,
    paused: bool,
}

impl VkRenderer {
    pub fn swapchain(&self) -> &Swapchain<AshBackend> {
        &self.swapchain
    }

    /// First build uses the configured depth, later ones keep the negotiated one.
    fn rebuild(&mut self) -> Result<(), PresentError> {
        let (w, h) = (self.size.width, self.size.height);
        if self.swapchain.buffering_depth() == 0 {
            self.swapchain.create(self.desired_depth, w, h)
        } else {
            self.swapchain.recreate(w, h)
        }
    }

    /// Swallows errors the loop should ride out, surfaces the rest.
    fn tolerate(&mut self, e: PresentError) -> Result<FrameOutcome> {
        match e.kind() {
            ErrorKind::Transient | ErrorKind::Timeout => Ok(FrameOutcome::Skipped),
            ErrorKind::Stale => {
                // Presentation noticed the resize before we did.
                if let Err(e) = self.rebuild() {
                    warn!("vk: recreate after stale present: {e}");
                }
                Ok(FrameOutcome::Skipped)
            }
            ErrorKind::Fatal | ErrorKind::Usage => Err(e.into()),
        }
    }

    fn draw(&mut self) -> Result<(), PresentError> {
        self.swapchain.begin_render_pass()?;
        self.swapchain.end_render_pass()
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: RenderOptions,
    ) -> Result<Self> {
        let context = VkContext::new(window, display)?;
        let swapchain = Swapchain::new(
            context.backend(),
            SwapchainOptions {
                wait_timeout: options.wait_timeout,
                clear_color: options.clear_color,
                vsync: options.vsync,
            },
        )?;

        let mut r = VkRenderer {
            swapchain,
            _context: context,
            size,
            desired_depth: options.buffering_depth,
            paused: size.is_empty(),
        };

        match r
            .swapchain
            .create(options.buffering_depth, size.width, size.height)
        {
            Ok(()) => {}
            Err(PresentError::ZeroExtent { .. }) => {
                info!("vk: surface has zero area at startup → paused=true");
                r.paused = true;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(r)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.size = size;
        if size.is_empty() {
            if !self.paused {
                info!("vk: resize to 0x0 → paused=true");
            }
            self.paused = true;
            return Ok(());
        }

        if self.paused {
            info!("vk: resize to {}x{} → paused=false", size.width, size.height);
        }
        self.paused = false;

        match self.rebuild() {
            Ok(()) => Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!("vk: recreate on resize: {e}");
                self.paused = matches!(e, PresentError::ZeroExtent { .. });
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.swapchain.set_clear_color(rgba);
    }

    fn set_vsync(&mut self, on: bool) -> Result<()> {
        if !self.swapchain.set_vsync(on) {
            return Ok(());
        }
        info!("vk: vsync={on}");
        if self.paused {
            // Picked up by the next recreate.
            return Ok(());
        }
        match self.rebuild() {
            Err(e) if !e.is_recoverable() => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn render(&mut self) -> Result<FrameOutcome> {
        if self.paused {
            return Ok(FrameOutcome::Skipped);
        }

        if self.swapchain.state() == SwapchainState::Uninitialized {
            // Lost on a failed create or submission; rebuild before drawing.
            if let Err(e) = self.rebuild() {
                return self.tolerate(e);
            }
        }

        if let Err(e) = self.swapchain.begin_frame() {
            return self.tolerate(e);
        }

        let drawn = self.draw();
        let ended = self.swapchain.end_frame(None);
        match drawn.and(ended) {
            Ok(()) => Ok(FrameOutcome::Presented),
            Err(e) => self.tolerate(e),
        }
    }
}
