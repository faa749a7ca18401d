use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CreateDeviceError;
use crate::signal::RemovalSignal;

/// A live connection to the graphics hardware.
///
/// Becomes invalid exactly once, when the removal signal fires; after that it
/// must never be used again and a replacement context is substituted wherever
/// this one was bound. The signal it is wired to is carried along explicitly
/// so the recovery task can be handed everything it needs at spawn time.
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter: Arc<wgpu::Adapter>,
    adapter_info: wgpu::AdapterInfo,
    generation: u64,
    removal: RemovalSignal,
}

impl GpuContext {
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The adapter this device came from, for surface capability queries.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn device_arc(&self) -> Arc<wgpu::Device> {
        self.device.clone()
    }

    pub fn queue_arc(&self) -> Arc<wgpu::Queue> {
        self.queue.clone()
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Monotonically increasing identity; a replacement context always has a
    /// higher generation than the one it supersedes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The removal signal this context's lost-device callback fires.
    pub fn removal_signal(&self) -> RemovalSignal {
        self.removal.clone()
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("generation", &self.generation)
            .field("adapter", &self.adapter_info.name)
            .finish()
    }
}

/// Source of replacement GPU contexts. The recovery loop is generic over this
/// so its retry behavior can be exercised without real hardware.
pub trait DeviceProvider: Send {
    fn create_context(&self) -> Result<GpuContext, CreateDeviceError>;
}

/// Production provider: picks a hardware adapter compatible with the window
/// surface, falling back to a software adapter when none is available, then
/// wires the device's lost callback to the shared removal signal.
#[derive(Clone)]
pub struct WgpuDeviceProvider {
    instance: Arc<wgpu::Instance>,
    surface: Arc<wgpu::Surface<'static>>,
    removal: RemovalSignal,
    generation: Arc<AtomicU64>,
}

impl WgpuDeviceProvider {
    pub fn new(instance: Arc<wgpu::Instance>, surface: Arc<wgpu::Surface<'static>>) -> Self {
        Self {
            instance,
            surface,
            removal: RemovalSignal::new(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn removal_signal(&self) -> RemovalSignal {
        self.removal.clone()
    }

    fn request_adapter(&self) -> Result<wgpu::Adapter, CreateDeviceError> {
        // Hardware first.
        if let Some(adapter) =
            pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&self.surface),
            }))
        {
            return Ok(adapter);
        }
        // Software fallback.
        log::warn!("no hardware adapter available, trying software fallback");
        pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            force_fallback_adapter: true,
            compatible_surface: Some(&self.surface),
        }))
        .ok_or(CreateDeviceError::NoAdapter)
    }
}

impl DeviceProvider for WgpuDeviceProvider {
    fn create_context(&self) -> Result<GpuContext, CreateDeviceError> {
        let adapter = self.request_adapter()?;
        let adapter_info = adapter.get_info();
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))?;

        // Creation can race into another immediate removal (e.g. a driver
        // stuck in a reset loop). Report it as recoverable so the caller
        // backs off and tries again.
        if self.removal.is_set() {
            return Err(CreateDeviceError::Removed);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let signal = self.removal.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::warn!("device lost (generation {generation}): {reason:?}: {message}");
            signal.set();
        });

        log::info!(
            "created device generation {generation} on {:?} ({:?})",
            adapter_info.name,
            adapter_info.device_type
        );

        Ok(GpuContext {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter: Arc::new(adapter),
            adapter_info,
            generation,
            removal: self.removal.clone(),
        })
    }
}
