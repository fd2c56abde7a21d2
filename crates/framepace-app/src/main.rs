// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use clap::Parser;
use framepace_core::{init_tracing, load_config, AppConfig};
use framepace_platform::window_render_size;
use framepace_render::{FrameOutcome, RenderOptions, RenderSize, Renderer};
use framepace_vk::VkRenderer;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use framepace_platform::winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = framepace_core::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Requested swapchain depth (raised to the surface minimum)
    #[arg(long)]
    depth: Option<u32>,
    /// Start with vsync off
    #[arg(long)]
    no_vsync: bool,
}

fn render_options(cfg: &AppConfig, args: &Args) -> RenderOptions {
    let p = &cfg.present;
    RenderOptions {
        buffering_depth: args.depth.unwrap_or(p.buffering_depth),
        vsync: p.vsync && !args.no_vsync,
        clear_color: p.clear_color,
        wait_timeout: Duration::from_millis(p.wait_timeout_ms),
    }
}

struct App {
    options: RenderOptions,
    window: Option<Window>,
    renderer: Option<VkRenderer>,
    render_size: RenderSize,

    exiting: bool,
    paused: bool,
    frames: u32,
    skipped: u32,
    last_fps_instant: Instant,
}

impl App {
    fn toggle_vsync(&mut self) {
        let Some(r) = &mut self.renderer else { return };
        self.options.vsync = !self.options.vsync;
        if let Err(e) = r.set_vsync(self.options.vsync) {
            error!("set_vsync: {e:#}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window = match event_loop
                .create_window(Window::default_attributes().with_title("framepace"))
            {
                Ok(w) => w,
                Err(e) => {
                    error!("create_window: {e}");
                    event_loop.exit();
                    return;
                }
            };

            self.render_size = window_render_size(&window);

            let renderer = match (window.window_handle(), window.display_handle()) {
                (Ok(wh), Ok(dh)) => VkRenderer::new(&wh, &dh, self.render_size, self.options),
                (Err(e), _) | (_, Err(e)) => Err(anyhow::anyhow!("{e}")),
            };

            match renderer {
                Ok(r) => {
                    info!(
                        "renderer ready (depth={} vsync={})",
                        r.swapchain().buffering_depth(),
                        r.swapchain().vsync()
                    );
                    self.renderer = Some(r);
                }
                Err(e) => {
                    error!("vk init failed: {e:#}");
                    event_loop.exit();
                    return;
                }
            }
            self.window = Some(window);
        }

        event_loop.set_control_flow(ControlFlow::Poll);
        self.paused = self.render_size.is_empty();
        info!("resumed → paused={}", self.paused);

        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.exiting = true;
                // Swapchain and device go before the window they present to.
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize::new(new_size.width, new_size.height);
                self.paused = self.render_size.is_empty();
                info!(
                    "Resized → {}x{} (paused={})",
                    self.render_size.width, self.render_size.height, self.paused
                );

                if let Some(r) = &mut self.renderer {
                    if let Err(e) = r.resize(self.render_size) {
                        error!("resize: {e:#}");
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.paused = occluded || self.render_size.is_empty();
                info!("Occluded={} → paused={}", occluded, self.paused);
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match logical_key {
                Key::Character(c) if c.eq_ignore_ascii_case("v") => self.toggle_vsync(),
                Key::Named(NamedKey::Escape) => {
                    self.exiting = true;
                    self.renderer = None;
                    self.window = None;
                    event_loop.exit();
                }
                _ => {}
            },

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }

                if let Some(r) = &mut self.renderer {
                    match r.render() {
                        Ok(FrameOutcome::Presented) => {
                            self.frames = self.frames.saturating_add(1);
                        }
                        Ok(FrameOutcome::Skipped) => {
                            self.skipped = self.skipped.saturating_add(1);
                        }
                        Err(e) => {
                            error!("render error: {e:#}");
                        }
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            // window-size=0 or occluded → sleep
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // Pacing comes from the swapchain's fence and acquire waits.
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {} (skipped {})", self.frames, self.skipped);
            if self.skipped > self.frames {
                warn!("more ticks skipped than presented; GPU is falling behind");
            }
            self.frames = 0;
            self.skipped = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let cfg = match load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("{e}; using defaults");
            AppConfig::default()
        }
    };
    let options = render_options(&cfg, &args);
    info!(
        "config: depth={} vsync={} timeout={:?}",
        options.buffering_depth, options.vsync, options.wait_timeout
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App {
        options,
        window: None,
        renderer: None,
        render_size: RenderSize::new(1, 1),
        exiting: false,
        paused: false,
        frames: 0,
        skipped: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
