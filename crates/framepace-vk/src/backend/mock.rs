// SPDX-License-Identifier: CEPL-1.0
//! Scripted in-memory backend for swapchain tests.
//!
//! Handles are fabricated from a counter. The GPU "finishes" every submission
//! immediately unless `gpu_stalled` is set, in which case fences stay
//! unsignaled and waits on them time out.
//!
//! Binary semaphore signals are tracked from the signaling operation to the
//! wait that consumes them. Misuse is recorded in `violations` rather than
//! failing the call, so tests can assert on it afterwards.

use super::{PresentBackend, Submission, SwapchainDesc};
use crate::render_pass::RenderPassDescriptor;
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

#[derive(Default)]
pub(crate) struct MockState {
    next_handle: u64,

    pub caps: vk::SurfaceCapabilitiesKHR,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Images handed out on top of `min_image_count`.
    pub extra_images: u32,
    pub gpu_stalled: bool,
    pub acquire_script: VecDeque<VkResult<(u32, bool)>>,
    pub present_script: VecDeque<VkResult<bool>>,
    /// One-shot failures keyed by backend method name.
    pub failures: HashMap<&'static str, vk::Result>,

    pub render_passes: HashSet<vk::RenderPass>,
    pub swapchains: HashMap<vk::SwapchainKHR, u32>,
    pub views: HashSet<vk::ImageView>,
    pub framebuffers: HashSet<vk::Framebuffer>,
    pub command_buffers: HashSet<vk::CommandBuffer>,
    pub fences: HashMap<vk::Fence, bool>,
    pub semaphores: HashSet<vk::Semaphore>,
    pub recording: HashSet<vk::CommandBuffer>,
    pub pending_signals: HashSet<vk::Semaphore>,
    pub violations: Vec<&'static str>,

    pub next_image: u32,
    pub swapchains_created: u32,
    pub last_swapchain: Option<SwapchainDesc>,
    pub wait_idle_calls: u32,
    pub submissions: Vec<Submission>,
    pub presents: Vec<u32>,
    pub render_pass_begins: Vec<(vk::Framebuffer, vk::Extent2D, [f32; 4])>,
    pub max_open_recordings: usize,
}

impl MockState {
    fn handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    /// Objects still alive, render passes excluded.
    pub fn live_frame_objects(&self) -> usize {
        self.swapchains.len()
            + self.views.len()
            + self.framebuffers.len()
            + self.command_buffers.len()
            + self.fences.len()
            + self.semaphores.len()
    }

    pub fn fail_next(&mut self, op: &'static str, result: vk::Result) {
        self.failures.insert(op, result);
    }

    fn check(&mut self, op: &'static str) -> VkResult<()> {
        self.failures.remove(op).map_or(Ok(()), Err)
    }

    fn signal(&mut self, semaphore: vk::Semaphore) {
        if !self.pending_signals.insert(semaphore) {
            self.violations.push("signal onto already-signaled semaphore");
        }
    }

    fn consume(&mut self, semaphore: vk::Semaphore) {
        if !self.pending_signals.remove(&semaphore) {
            self.violations.push("wait on semaphore with no pending signal");
        }
    }

    pub fn is_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.get(&fence).copied().unwrap_or(false)
    }
}

pub(crate) struct MockBackend {
    state: Rc<RefCell<MockState>>,
}

impl MockBackend {
    pub fn new(min_image_count: u32, current_extent: vk::Extent2D) -> Self {
        let state = MockState {
            caps: vk::SurfaceCapabilitiesKHR {
                min_image_count,
                max_image_count: 0,
                current_extent,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            present_modes: vec![
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
            ],
            ..Default::default()
        };
        MockBackend {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Shared view of the state that survives the backend being moved or
    /// dropped.
    pub fn shared(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockState> {
        self.state.borrow_mut()
    }
}

impl PresentBackend for MockBackend {
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state().caps)
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state().present_modes.clone())
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        self.state_mut().wait_idle_calls += 1;
        Ok(())
    }

    fn create_render_pass(&self, _desc: &RenderPassDescriptor) -> VkResult<vk::RenderPass> {
        let mut s = self.state_mut();
        let rp = s.handle();
        s.render_passes.insert(rp);
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state_mut().render_passes.remove(&render_pass);
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state_mut();
        s.check("create_swapchain")?;
        let sc = s.handle();
        let count = desc.min_image_count + s.extra_images;
        s.swapchains.insert(sc, count);
        s.swapchains_created += 1;
        s.last_swapchain = Some(*desc);
        s.next_image = 0;
        Ok(sc)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state_mut().swapchains.remove(&swapchain);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut s = self.state_mut();
        s.check("swapchain_images")?;
        let count = *s
            .swapchains
            .get(&swapchain)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        Ok((0..count).map(|_| s.handle()).collect())
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut s = self.state_mut();
        let view = s.handle();
        s.views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state_mut().views.remove(&view);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        _view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut s = self.state_mut();
        let fb = s.handle();
        s.framebuffers.insert(fb);
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state_mut().framebuffers.remove(&framebuffer);
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state_mut();
        s.check("allocate_command_buffers")?;
        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| s.handle()).collect();
        s.command_buffers.extend(buffers.iter().copied());
        Ok(buffers)
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state_mut();
        for cb in buffers {
            s.command_buffers.remove(cb);
            s.recording.remove(cb);
        }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state_mut();
        let fence = s.handle();
        s.fences.insert(fence, signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state_mut().fences.remove(&fence);
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state_mut();
        let sem = s.handle();
        s.semaphores.insert(sem);
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut s = self.state_mut();
        if s.pending_signals.remove(&semaphore) {
            s.violations.push("destroyed semaphore with pending signal");
        }
        s.semaphores.remove(&semaphore);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        match self.state().fences.get(&fence) {
            Some(true) => Ok(()),
            Some(false) => Err(vk::Result::TIMEOUT),
            None => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        match self.state_mut().fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(vk::Result::ERROR_DEVICE_LOST),
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state_mut();
        let count = *s
            .swapchains
            .get(&swapchain)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        let acquired = match s.acquire_script.pop_front() {
            Some(scripted) => scripted?,
            None => {
                let index = s.next_image;
                s.next_image = (index + 1) % count;
                (index, false)
            }
        };
        s.signal(signal);
        Ok(acquired)
    }

    fn begin_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state_mut();
        s.check("begin_command_buffer")?;
        if !s.recording.insert(buffer) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        s.max_open_recordings = s.max_open_recordings.max(s.recording.len());
        Ok(())
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        if self.state_mut().recording.remove(&buffer) {
            Ok(())
        } else {
            Err(vk::Result::ERROR_UNKNOWN)
        }
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let mut s = self.state_mut();
        s.check("queue_submit")?;
        if let Some(cb) = submission.command_buffer {
            if s.recording.contains(&cb) {
                return Err(vk::Result::ERROR_UNKNOWN);
            }
        }
        if let Some((semaphore, _)) = submission.wait {
            s.consume(semaphore);
        }
        if let Some(semaphore) = submission.signal {
            s.signal(semaphore);
        }
        let completes = !s.gpu_stalled;
        if let Some(signaled) = s.fences.get_mut(&submission.fence) {
            *signaled = completes;
        }
        s.submissions.push(*submission);
        Ok(())
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state_mut();
        s.consume(wait);
        s.presents.push(image_index);
        s.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn cmd_begin_render_pass(
        &self,
        _buffer: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    ) {
        self.state_mut()
            .render_pass_begins
            .push((framebuffer, extent, clear));
    }

    fn cmd_end_render_pass(&self, _buffer: vk::CommandBuffer) {}
}
