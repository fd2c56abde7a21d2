// SPDX-License-Identifier: CEPL-1.0
//! Instance, surface, device, queue and command pool for one window.
//!
//! These are the objects the swapchain borrows but never owns. They live
//! here so the swapchain can be torn down and rebuilt without touching them.

use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
#[cfg(debug_assertions)]
use std::ffi::c_void;
use std::ffi::CStr;
use tracing::info;

use crate::backend::AshBackend;

#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;

#[cfg(debug_assertions)]
type DebugState = Option<vk::DebugUtilsMessengerEXT>;
#[cfg(not(debug_assertions))]
type DebugState = ();

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

pub struct VkContext {
    entry: Entry,
    instance: Instance,
    debug: DebugState,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    cmd_pool: vk::CommandPool,
}

// STRICT TEARDOWN ORDER: the swapchain built on this context must already be
// gone. Pool before device, device before surface, instance last.
impl Drop for VkContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_command_pool(self.cmd_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            destroy_debug_messenger(&self.entry, &self.instance, self.debug);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if !data.is_null() {
        let msg = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            tracing::error!(target: "vulkan", "{msg}");
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            tracing::warn!(target: "vulkan", "{msg}");
        } else {
            tracing::trace!(target: "vulkan", "{msg}");
        }
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance, enabled: bool) -> DebugState {
    if !enabled {
        return None;
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    unsafe { loader.create_debug_utils_messenger(&ci, None) }.ok()
}

#[cfg(not(debug_assertions))]
unsafe fn create_debug_messenger(_entry: &Entry, _instance: &Instance, _enabled: bool) -> DebugState {}

#[cfg(debug_assertions)]
unsafe fn destroy_debug_messenger(entry: &Entry, instance: &Instance, dbg: DebugState) {
    if let Some(messenger) = dbg {
        let loader = ext_debug::Instance::new(entry, instance);
        unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
    }
}

#[cfg(not(debug_assertions))]
unsafe fn destroy_debug_messenger(_entry: &Entry, _instance: &Instance, _dbg: DebugState) {
    // no-op
}

fn has_layer(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == name))
}

/// Returns the instance and whether validation ended up enabled.
unsafe fn create_instance(entry: &Entry, display_raw: RawDisplayHandle) -> Result<(Instance, bool)> {
    let app_name = c"framepace";

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: 0,
        p_engine_name: app_name.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let ext_vec = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let validation = cfg!(debug_assertions) && has_layer(entry, VALIDATION_LAYER);
    #[cfg(debug_assertions)]
    let ext_vec = {
        let mut exts = ext_vec;
        if validation {
            exts.push(ext_debug::NAME.as_ptr());
        }
        exts
    };
    let layers = [VALIDATION_LAYER.as_ptr()];
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0, std::ptr::null())
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    let instance = unsafe { entry.create_instance(&create_info, None) }?;
    Ok((instance, validation))
}

unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    for phys in unsafe { instance.enumerate_physical_devices() }? {
        let qprops = unsafe { instance.get_physical_device_queue_family_properties(phys) };
        for (i, q) in qprops.iter().enumerate() {
            let present = unsafe {
                surface_loader.get_physical_device_surface_support(phys, i as u32, surface)
            }
            .unwrap_or(false);
            if q.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present {
                return Ok((phys, i as u32));
            }
        }
    }
    Err(anyhow!("no suitable physical device/queue family"))
}

impl VkContext {
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        unsafe {
            let entry = Entry::load().context("loading the Vulkan library")?;
            let (instance, validation) = create_instance(&entry, dh).context("create_instance")?;
            let debug = create_debug_messenger(&entry, &instance, validation);

            let surface = ash_window::create_surface(&entry, &instance, dh, wh, None)
                .context("create_surface")?;
            let surface_loader = surface::Instance::new(&entry, &instance);

            let (phys, queue_family) = pick_device_and_queue(&instance, &surface_loader, surface)?;

            let priorities = [1.0_f32];
            let qinfo = vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: queue_family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            };

            let device_exts = [swapchain::NAME.as_ptr()];
            let dinfo = vk::DeviceCreateInfo {
                s_type: vk::StructureType::DEVICE_CREATE_INFO,
                queue_create_info_count: 1,
                p_queue_create_infos: &qinfo,
                enabled_extension_count: device_exts.len() as u32,
                pp_enabled_extension_names: device_exts.as_ptr(),
                ..Default::default()
            };

            let device = instance
                .create_device(phys, &dinfo, None)
                .context("create_device")?;
            let queue = device.get_device_queue(queue_family, 0);

            // Frame slots re-record their buffers every frame.
            let pool_info = vk::CommandPoolCreateInfo {
                s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                queue_family_index: queue_family,
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                ..Default::default()
            };
            let cmd_pool = device
                .create_command_pool(&pool_info, None)
                .context("create_command_pool")?;

            let props = instance.get_physical_device_properties(phys);
            info!(
                "vk device: {} (queue family {}, validation={})",
                props.device_name_as_c_str().unwrap_or(c"?").to_string_lossy(),
                queue_family,
                validation
            );

            Ok(VkContext {
                entry,
                instance,
                debug,
                surface_loader,
                surface,
                phys,
                device,
                queue,
                cmd_pool,
            })
        }
    }

    /// A presentation backend borrowing this context's objects.
    pub fn backend(&self) -> AshBackend {
        AshBackend::new(
            &self.instance,
            &self.device,
            self.phys,
            self.queue,
            self.cmd_pool,
            &self.surface_loader,
            self.surface,
        )
    }
}
