//! Headless GPU device initialization.
//!
//! The orrery renders into offscreen targets, so no surface is involved; the
//! windowing layer that would present them lives outside this crate.

/// Error type for device initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Device, queue and adapter description shared by all render systems.
///
/// `wgpu::Device` and `wgpu::Queue` are reference counted, so systems keep
/// their own clones for uploads.
#[derive(Clone, Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Request an adapter and device without a presentation surface.
    pub async fn new_headless() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Ok(adapter) => adapter,
            Err(_) => return Err(GpuContextError::NoAdapter),
        };

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("orrery-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    /// Blocking wrapper around [`new_headless`](Self::new_headless).
    pub fn new_headless_blocking() -> Result<Self, GpuContextError> {
        pollster::block_on(Self::new_headless())
    }

    /// A context if any adapter is available, `None` otherwise.
    ///
    /// Used by tests and by callers that can fall back to CPU-only mode.
    pub fn try_headless() -> Option<Self> {
        match Self::new_headless_blocking() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                log::warn!("GPU unavailable: {e}");
                None
            }
        }
    }

    /// Largest 2D texture edge the device accepts.
    pub fn max_texture_dimension_2d(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Copy `size` bytes of `buffer` into host memory and wait for the result.
    ///
    /// `buffer` must have `COPY_SRC` usage. Returns `None` if mapping fails.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer, size: u64) -> Option<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-staging"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit([encoder.finish()]);
        self.map_read(&staging)
    }

    /// Read the top-left `width x height` texels of a single-layer texture.
    ///
    /// Rows come back tightly packed. `texture` must have `COPY_SRC` usage.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_texel: u32,
    ) -> Option<Vec<u8>> {
        let unpadded = width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture-readback-staging"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        let bytes = self.map_read(&staging)?;
        let mut packed = Vec::with_capacity((unpadded * height) as usize);
        for row in bytes.chunks_exact(padded as usize) {
            packed.extend_from_slice(&row[..unpadded as usize]);
        }
        Some(packed)
    }

    fn map_read(&self, staging: &wgpu::Buffer) -> Option<Vec<u8>> {
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });

        match rx.recv() {
            Ok(Ok(())) => {
                let bytes = slice.get_mapped_range().to_vec();
                staging.unmap();
                Some(bytes)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_context_reports_limits() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        assert!(ctx.max_texture_dimension_2d() >= 2048);
    }

    #[test]
    fn test_read_buffer_round_trips_bytes() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        use wgpu::util::DeviceExt;
        let data: Vec<u8> = (0..64u8).collect();
        let buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("readback-source"),
                contents: &data,
                usage: wgpu::BufferUsages::COPY_SRC,
            });
        let back = ctx.read_buffer(&buffer, 64).unwrap();
        assert_eq!(back, data);
    }
}
