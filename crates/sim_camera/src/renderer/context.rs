use crate::error::{Result, SimError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Headless GPU device and queue. Nothing here is tied to a window; all
/// rendering goes to offscreen textures.
pub struct GfxContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    // First error raised outside an error scope, if any.
    device_error: Arc<Mutex<Option<String>>>,
}

impl GfxContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        // Prefer real hardware, fall back to a software adapter.
        let mut adapter = None;
        for force_fallback_adapter in [false, true] {
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter,
                })
                .await;
            if adapter.is_some() {
                break;
            }
        }
        let adapter = adapter.ok_or_else(|| SimError::gpu("Failed to find a suitable GPU adapter"))?;

        let adapter_info = adapter.get_info();
        tracing::info!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "Using GPU adapter"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Sim Camera Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(SimError::gpu)?;

        let device_error = Arc::new(Mutex::new(None::<String>));
        let latch = device_error.clone();
        device.on_uncaptured_error(Box::new(move |err| {
            tracing::error!(error = %err, "Uncaptured GPU error");
            latch.lock().get_or_insert_with(|| err.to_string());
        }));

        Ok(Self {
            device,
            queue,
            device_error,
        })
    }

    /// Runs `f` inside validation and out-of-memory error scopes and turns
    /// any captured error into [`SimError::GpuResource`].
    pub fn scoped<T>(&self, what: &str, f: impl FnOnce() -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            None => Ok(value),
            Some(err) => Err(SimError::GpuResource(format!("{}: {}", what, err))),
        }
    }

    /// Takes the latched uncaptured device error, if one occurred.
    pub fn take_device_error(&self) -> Option<String> {
        self.device_error.lock().take()
    }
}
