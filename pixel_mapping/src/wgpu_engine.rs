// Copyright 2025 the Vello Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use pixel_mapping_shaders::{
    cpu::CpuTexture, BindType, ComputeShader, DownsampleConfig, GpuPixelRegion, DOWNSAMPLE,
    DOWNSAMPLE_WG,
};
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer, BufferUsages, ComputePipeline,
    Device, Extent3d, Limits, Queue, ShaderStages, Texture, TextureFormat, TextureUsages,
    TextureView, TextureViewDimension,
};

use crate::util::block_on_wgpu;
use crate::{AtlasRect, AtlasSize, Error, LinearColor, Result, SourceTexture};

/// Format of the atlas texture. Must match the storage texture in the shader.
const ATLAS_FORMAT: TextureFormat = TextureFormat::Rgba32Float;
const BYTES_PER_TEXEL: u32 = 16;

/// Most regions one pass can downsample into an atlas bounded by `max` on a device with
/// `limits`.
///
/// Each region needs 64 bytes of the region storage buffer and one invocation of a
/// one-dimensional dispatch, and the rows of the atlas must fit in the readback buffer.
pub(crate) fn device_capacity(limits: &Limits, max: AtlasSize) -> u64 {
    let region_bytes = size_of::<GpuPixelRegion>() as u64;
    let region_buffer = u64::from(limits.max_storage_buffer_binding_size)
        .min(limits.max_buffer_size)
        / region_bytes;
    let dispatch =
        u64::from(limits.max_compute_workgroups_per_dimension) * u64::from(DOWNSAMPLE_WG);
    let padded_row = (u64::from(max.width) * u64::from(BYTES_PER_TEXEL))
        .next_multiple_of(u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT));
    let readback_rows = (limits.max_buffer_size / padded_row.max(1)).min(u64::from(max.height));
    let readback = readback_rows * u64::from(max.width);
    region_buffer
        .min(dispatch)
        .min(readback)
        .min(max.cell_count())
}

/// Atlas storage, reallocated only when the atlas dimensions change.
struct AtlasTarget {
    size: AtlasSize,
    texture: Texture,
    view: TextureView,
    staging: Buffer,
    padded_bytes_per_row: u32,
}

/// A host source texture uploaded to the device.
struct UploadedSource {
    host: Arc<CpuTexture>,
    view: TextureView,
}

pub(crate) struct WgpuEngine {
    device: Device,
    queue: Queue,
    pipeline: ComputePipeline,
    bind_group_layout: BindGroupLayout,
    /// See [`device_capacity`].
    capacity: u64,
    atlas: Option<AtlasTarget>,
    upload: Option<UploadedSource>,
}

impl WgpuEngine {
    pub(crate) fn new(device: &Device, queue: &Queue, capacity: u64) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let (pipeline, bind_group_layout) = create_pipeline(device, &DOWNSAMPLE);
        if let Some(error) = block_on_wgpu(device, device.pop_error_scope())? {
            return Err(error.into());
        }
        log::info!("created {} pipeline", DOWNSAMPLE.name);
        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            pipeline,
            bind_group_layout,
            capacity,
            atlas: None,
            upload: None,
        })
    }

    pub(crate) fn accepts(source: &SourceTexture) -> bool {
        match source {
            SourceTexture::Cpu(_) => true,
            SourceTexture::Gpu(texture) => {
                texture.usage().contains(TextureUsages::TEXTURE_BINDING)
                    && matches!(
                        texture.format().sample_type(None, None),
                        Some(wgpu::TextureSampleType::Float { .. })
                    )
            }
        }
    }

    pub(crate) fn run(
        &mut self,
        source: &SourceTexture,
        regions: &[GpuPixelRegion],
        size: AtlasSize,
    ) -> Result<Vec<LinearColor>> {
        if source.is_empty() || !Self::accepts(source) {
            return Err(Error::SourceUnavailable);
        }
        let n_regions = regions.len() as u32;
        let capacity = size.cell_count().min(self.capacity);
        if regions.len() as u64 > capacity {
            return Err(Error::CapacityExceeded {
                pixel_count: n_regions,
                capacity,
            });
        }
        if n_regions == 0 {
            return Ok(Vec::new());
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = self.downsample(source, regions, size);
        let scope = block_on_wgpu(&self.device, self.device.pop_error_scope())?;
        if let Some(error) = scope {
            return Err(error.into());
        }
        result
    }

    fn downsample(
        &mut self,
        source: &SourceTexture,
        regions: &[GpuPixelRegion],
        size: AtlasSize,
    ) -> Result<Vec<LinearColor>> {
        let source_view = self.source_view(source);
        let target = ensure_atlas(&self.device, &mut self.atlas, size);
        let n_regions = regions.len() as u32;
        let config = DownsampleConfig {
            atlas_width: size.width,
            atlas_height: size.height,
            n_regions,
            source_width: source.width(),
            source_height: source.height(),
            _padding: [0; 3],
        };
        let config_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("downsample config"),
                contents: bytemuck::bytes_of(&config),
                usage: BufferUsages::UNIFORM,
            });
        let region_buf = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("downsample regions"),
                contents: bytemuck::cast_slice(regions),
                usage: BufferUsages::STORAGE,
            });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("downsample"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: config_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: region_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("downsample"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&*DOWNSAMPLE.name),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(config.workgroup_count(), 1, 1);
        }
        let rect = AtlasRect::covering(size, n_regions);
        encoder.copy_texture_to_buffer(
            target.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &target.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: None,
                },
            },
            Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit([encoder.finish()]);

        let buf_slice = target.staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buf_slice.map_async(wgpu::MapMode::Read, move |v| {
            // The receiver only goes away if the wait below failed.
            let _ = sender.send(v);
        });
        match block_on_wgpu(&self.device, receiver.receive())? {
            Some(result) => result?,
            None => return Err(Error::ReadbackChannelClosed),
        }
        let colors = {
            let data = buf_slice.get_mapped_range();
            (0..n_regions)
                .map(|i| {
                    let (x, y) = (i % size.width, i / size.width);
                    let start = (y * target.padded_bytes_per_row + x * BYTES_PER_TEXEL) as usize;
                    let texel: [f32; 4] = bytemuck::pod_read_unaligned(
                        &data[start..start + BYTES_PER_TEXEL as usize],
                    );
                    LinearColor::new(texel)
                })
                .collect()
        };
        target.staging.unmap();
        Ok(colors)
    }

    fn source_view(&mut self, source: &SourceTexture) -> TextureView {
        match source {
            SourceTexture::Gpu(texture) => {
                texture.create_view(&wgpu::TextureViewDescriptor::default())
            }
            SourceTexture::Cpu(host) => {
                if let Some(upload) = &self.upload {
                    if Arc::ptr_eq(&upload.host, host) {
                        return upload.view.clone();
                    }
                }
                let view = self.upload_source(host);
                self.upload = Some(UploadedSource {
                    host: Arc::clone(host),
                    view: view.clone(),
                });
                view
            }
        }
    }

    fn upload_source(&self, host: &CpuTexture) -> TextureView {
        let size = Extent3d {
            width: host.width as u32,
            height: host.height as u32,
            depth_or_array_layers: 1,
        };
        log::debug!("uploading {}x{} source texture", size.width, size.height);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("downsample source"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            texture.as_image_copy(),
            bytemuck::cast_slice(&host.pixels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * BYTES_PER_TEXEL),
                rows_per_image: None,
            },
            size,
        );
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

fn ensure_atlas<'a>(
    device: &Device,
    slot: &'a mut Option<AtlasTarget>,
    size: AtlasSize,
) -> &'a AtlasTarget {
    if let Some(atlas) = slot.take_if(|atlas| atlas.size == size) {
        return slot.insert(atlas);
    }
    log::debug!("allocating {size} atlas texture");
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("downsample atlas"),
        size: Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ATLAS_FORMAT,
        usage: TextureUsages::STORAGE_BINDING | TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let padded_bytes_per_row =
        (size.width * BYTES_PER_TEXEL).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("downsample readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(size.height),
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    slot.insert(AtlasTarget {
        size,
        texture,
        view,
        staging,
        padded_bytes_per_row,
    })
}

fn create_pipeline(
    device: &Device,
    shader: &ComputeShader<'_>,
) -> (ComputePipeline, BindGroupLayout) {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&*shader.name),
        source: wgpu::ShaderSource::Wgsl(shader.wgsl.clone()),
    });
    let entries = shader
        .bindings
        .iter()
        .enumerate()
        .map(|(i, bind_type)| BindGroupLayoutEntry {
            binding: i as u32,
            visibility: ShaderStages::COMPUTE,
            ty: binding_type(*bind_type),
            count: None,
        })
        .collect::<Vec<_>>();
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&*shader.name),
        entries: &entries,
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&*shader.name),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&*shader.name),
        layout: Some(&layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    (pipeline, bind_group_layout)
}

fn binding_type(bind_type: BindType) -> BindingType {
    match bind_type {
        BindType::Uniform => BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        BindType::BufReadOnly => BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        // Sources are read with `textureLoad`, so any float format will do.
        BindType::ImageRead => BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: TextureViewDimension::D2,
            multisampled: false,
        },
        BindType::Image => BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: ATLAS_FORMAT,
            view_dimension: TextureViewDimension::D2,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_ATLAS_SIZE;

    #[test]
    fn default_limits_are_bound_by_the_region_buffer() {
        // 128 MiB of 64 byte regions.
        assert_eq!(
            device_capacity(&Limits::default(), MAX_ATLAS_SIZE),
            2_097_152
        );
    }

    #[test]
    fn each_limit_bounds_the_capacity() {
        let wide = AtlasSize::new(4096, 4096);
        let dispatch = Limits {
            max_compute_workgroups_per_dimension: 10,
            ..Limits::default()
        };
        assert_eq!(device_capacity(&dispatch, wide), 10 * u64::from(DOWNSAMPLE_WG));

        let binding = Limits {
            max_storage_buffer_binding_size: 64 * 1000,
            ..Limits::default()
        };
        assert_eq!(device_capacity(&binding, wide), 1000);

        // The region buffer is bound by the buffer size too.
        let buffer = Limits {
            max_buffer_size: 1 << 20,
            ..Limits::default()
        };
        assert_eq!(device_capacity(&buffer, wide), (1 << 20) / 64);
        // A single column pads every readback row to 256 bytes.
        let column = AtlasSize::new(1, 100_000);
        assert_eq!(device_capacity(&buffer, column), (1 << 20) / 256);
    }

    #[test]
    fn small_atlases_are_bound_by_their_cells() {
        assert_eq!(device_capacity(&Limits::default(), AtlasSize::new(5, 5)), 25);
    }
}
