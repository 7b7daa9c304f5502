//! Compute-shader mip chain generation for texture array layers.

use std::path::Path;

use plutonium_world::{Entity, World};

use crate::pipeline::{ComputePipeline, Shader};
use crate::renderer::{
    BindGroupEntry, BindingResource, ComputeCommand, ComputePipelineId, RenderDevice,
};
use crate::resources::{buffer_layout_entry, Binding, BindingLayout, Buffer};
use crate::texture_array::TextureArray;
use crate::utils::MipmapUniforms;

pub const WORKGROUP_SIZE: u32 = 8;

/// One compute dispatch reducing level `level - 1` into `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipDispatch {
    pub level: u32,
    pub workgroups_x: u32,
    pub workgroups_y: u32,
}

/// Dispatches needed to fill levels `1..mip_sizes.len()`, in increasing level order.
pub fn mip_dispatches(mip_sizes: &[(u32, u32)]) -> Vec<MipDispatch> {
    mip_sizes
        .iter()
        .enumerate()
        .skip(1)
        .map(|(level, (width, height))| MipDispatch {
            level: level as u32,
            workgroups_x: width.div_ceil(WORKGROUP_SIZE),
            workgroups_y: height.div_ceil(WORKGROUP_SIZE),
        })
        .collect()
}

/// World resource holding the mipmap compute state.
pub struct MipmapGenerator {
    /// Entity carrying the compute `Shader` and `ComputePipeline`.
    pub pipeline: Entity,
    pub views_layout: BindingLayout,
    pub uniform_layout: BindingLayout,
    pub uniforms: Buffer,
    pub uniform_binding: Binding,
    /// Compiled pipeline, copied from the pipeline entity before each batch of uploads.
    pub compute: Option<ComputePipelineId>,
}

impl MipmapGenerator {
    pub fn new(world: &mut World, device: &mut dyn RenderDevice, shader: &Path) -> Self {
        let views_layout = BindingLayout::new(
            device,
            "mipmap_views_layout",
            &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba8Unorm,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                    },
                    count: None,
                },
            ],
        );
        let uniform_layout = BindingLayout::new(
            device,
            "mipmap_uniform_layout",
            &[buffer_layout_entry(
                wgpu::ShaderStages::COMPUTE,
                wgpu::BufferBindingType::Uniform,
            )],
        );

        let mut uniforms = Buffer::new("mipmap_uniforms", wgpu::BufferUsages::UNIFORM);
        uniforms.write(device, &MipmapUniforms::new(0));
        let mut uniform_binding = Binding::default();
        uniforms.rebuild_binding(device, &mut uniform_binding, &uniform_layout);

        let layouts = [views_layout.layout, uniform_layout.layout]
            .into_iter()
            .flatten()
            .collect();
        let pipeline = world.spawn();
        world.insert_component(pipeline, Shader::new(shader));
        world.insert_component(pipeline, ComputePipeline::new(layouts));

        Self {
            pipeline,
            views_layout,
            uniform_layout,
            uniforms,
            uniform_binding,
            compute: None,
        }
    }

    pub fn sync_pipeline(&mut self, world: &World) {
        self.compute = world
            .get_component::<ComputePipeline>(self.pipeline)
            .and_then(|compute| compute.pipeline);
    }

    /// Fills mip levels `1..` of `layer` from its level 0 in one compute submission.
    pub fn generate(&mut self, device: &mut dyn RenderDevice, array: &TextureArray, layer: u32) {
        let Some(pipeline) = self.compute else {
            log::warn!("mipmap pipeline unavailable, layer {} keeps only mip 0", layer);
            return;
        };
        let Some(views_layout) = self.views_layout.layout else {
            return;
        };
        let dispatches = mip_dispatches(&array.mip_sizes);
        if dispatches.is_empty() {
            return;
        }

        if self.uniforms.write(device, &MipmapUniforms::new(layer)) {
            self.uniforms
                .rebuild_binding(device, &mut self.uniform_binding, &self.uniform_layout);
        }
        let Some(uniform_group) = self.uniform_binding.group else {
            log::warn!("mipmap uniforms are not bound, layer {} keeps only mip 0", layer);
            return;
        };

        let mut transient = Vec::with_capacity(dispatches.len());
        let mut commands = vec![ComputeCommand::SetPipeline(pipeline)];
        for dispatch in &dispatches {
            let level = dispatch.level as usize;
            let (Some(src), Some(dst)) = (array.mip_views.get(level - 1), array.mip_views.get(level))
            else {
                break;
            };
            let group = device.create_bind_group(
                "mipmap_views",
                views_layout,
                &[
                    BindGroupEntry {
                        binding: 0,
                        resource: BindingResource::TextureView(*src),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: BindingResource::TextureView(*dst),
                    },
                ],
            );
            transient.push(group);
            commands.push(ComputeCommand::SetBindGroup { index: 0, group });
            commands.push(ComputeCommand::SetBindGroup {
                index: 1,
                group: uniform_group,
            });
            commands.push(ComputeCommand::Dispatch {
                x: dispatch.workgroups_x,
                y: dispatch.workgroups_y,
                z: 1,
            });
        }

        device.submit_compute("mipmap", &commands);
        for group in transient {
            device.destroy_bind_group(group);
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        self.uniform_binding.release(device);
        self.uniform_layout.release(device);
        self.views_layout.release(device);
        self.uniforms.release(device);
    }
}
