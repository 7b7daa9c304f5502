//! Texture arrays grouping every loaded image of the same size.
//!
//! Each `(width, height)` gets one 2D array texture with a full mip chain. Layers
//! are handed out in order and never reused; when the array is full its layer
//! capacity doubles and the existing layers are copied over level by level.
//! Growth stops at the device's array layer limit.

use std::collections::HashMap;

use plutonium_world::{Entity, World};

use crate::mipmap::MipmapGenerator;
use crate::renderer::{
    release_with, with_gpu, BindGroupEntry, BindingResource, RenderDevice, SamplerDesc,
    SamplerId, TextureCopy, TextureDesc, TextureId, TextureViewId, ViewDesc,
};
use crate::resources::{Binding, BindingLayout};

pub const ARRAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Levels of a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

pub fn mip_sizes(width: u32, height: u32) -> Vec<(u32, u32)> {
    (0..mip_level_count(width, height))
        .map(|level| ((width >> level).max(1), (height >> level).max(1)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureArrayKey {
    pub width: u32,
    pub height: u32,
}

/// Decoded RGBA8 pixels waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn key(&self) -> TextureArrayKey {
        TextureArrayKey {
            width: self.width,
            height: self.height,
        }
    }

    /// Byte length of tightly packed RGBA8 rows, `None` if it overflows `usize`.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Non-empty, and the pixel buffer matches the size.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.expected_len() == Some(self.pixels.len())
    }
}

/// Relation payload from an image entity to its array entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureArrayIndex {
    pub index: u32,
}

/// Relation marker from a render object to the image entity it shows.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTexture;

/// World resource mapping sizes to array entities.
pub struct TextureArrayCache {
    map: HashMap<TextureArrayKey, Entity>,
    /// Layout of the public bind group: the array view at 0, the sampler at 1.
    pub layout: BindingLayout,
}

impl TextureArrayCache {
    pub fn new(device: &mut dyn RenderDevice) -> Self {
        let layout = BindingLayout::new(
            device,
            "texture_array_layout",
            &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        );
        Self {
            map: HashMap::new(),
            layout,
        }
    }

    pub fn get(&self, key: &TextureArrayKey) -> Option<Entity> {
        self.map.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[derive(Debug)]
pub struct TextureArray {
    pub key: TextureArrayKey,
    pub texture: Option<TextureId>,
    pub view: Option<TextureViewId>,
    pub sampler: Option<SamplerId>,
    pub mip_views: Vec<TextureViewId>,
    pub mip_sizes: Vec<(u32, u32)>,
    /// Layers written so far; only `0..count` are read.
    pub count: u32,
    /// Layers allocated.
    pub capacity: u32,
    pub binding: Binding,
}

impl TextureArray {
    pub fn new(device: &mut dyn RenderDevice, key: TextureArrayKey, layout: &BindingLayout) -> Self {
        let mip_sizes = mip_sizes(key.width, key.height);
        let levels = mip_sizes.len() as u32;
        let texture = create_texture(device, key, 1, levels);
        let sampler = device.create_sampler(&SamplerDesc {
            address_mode: wgpu::AddressMode::ClampToEdge,
            filter: wgpu::FilterMode::Linear,
            lod_max_clamp: levels as f32,
        });

        let mut array = Self {
            key,
            texture: Some(texture),
            view: None,
            sampler: Some(sampler),
            mip_views: Vec::new(),
            mip_sizes,
            count: 0,
            capacity: 1,
            binding: Binding::default(),
        };
        array.rebuild_views(device, layout);
        log::info!(
            "created texture array {}x{} with {} mip levels",
            key.width,
            key.height,
            levels
        );
        array
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_sizes.len() as u32
    }

    /// Doubles the layer capacity, carrying every written layer of every level over.
    ///
    /// Capacity is clamped to the device's array layer limit; an array already at
    /// the limit is left alone.
    pub fn grow(&mut self, device: &mut dyn RenderDevice, layout: &BindingLayout) {
        let max_layers = device.limits().max_texture_array_layers;
        let capacity = self.capacity.saturating_mul(2).min(max_layers);
        if capacity <= self.capacity {
            return;
        }
        let texture = create_texture(device, self.key, capacity, self.mip_levels());

        if let Some(old) = self.texture.take() {
            if self.count > 0 {
                let copies: Vec<TextureCopy> = self
                    .mip_sizes
                    .iter()
                    .enumerate()
                    .map(|(level, (width, height))| TextureCopy {
                        src: old,
                        dst: texture,
                        mip_level: level as u32,
                        width: *width,
                        height: *height,
                        layers: self.count,
                    })
                    .collect();
                device.submit_copies(&copies);
            }
            self.release_views(device);
            device.destroy_texture(old);
        }

        self.texture = Some(texture);
        self.capacity = capacity;
        self.rebuild_views(device, layout);
        log::info!(
            "grew texture array {}x{} to {} layers",
            self.key.width,
            self.key.height,
            capacity
        );
    }

    /// Writes `image` into the next free layer and returns that layer.
    ///
    /// Returns `None` without touching the GPU when the array is full and
    /// already holds as many layers as the device allows.
    pub fn upload_image(
        &mut self,
        device: &mut dyn RenderDevice,
        layout: &BindingLayout,
        mipmaps: Option<&mut MipmapGenerator>,
        image: &ImageData,
    ) -> Option<u32> {
        debug_assert_eq!(image.key(), self.key, "image size does not match its array");

        if self.count == self.capacity {
            self.grow(device, layout);
            if self.count == self.capacity {
                log::error!(
                    "texture array {}x{} is full at {} layers",
                    self.key.width,
                    self.key.height,
                    self.capacity
                );
                return None;
            }
        }

        let layer = self.count;
        if let Some(texture) = self.texture {
            device.write_texture(texture, 0, layer, image.width, image.height, &image.pixels);
        }
        if let Some(mipmaps) = mipmaps {
            mipmaps.generate(device, self, layer);
        }
        self.count += 1;
        Some(layer)
    }

    fn release_views(&mut self, device: &mut dyn RenderDevice) {
        self.binding.release(device);
        for view in self.mip_views.drain(..) {
            device.destroy_texture_view(view);
        }
        if let Some(view) = self.view.take() {
            device.destroy_texture_view(view);
        }
    }

    fn rebuild_views(&mut self, device: &mut dyn RenderDevice, layout: &BindingLayout) {
        self.release_views(device);
        let Some(texture) = self.texture else {
            return;
        };

        let view = device.create_texture_view(
            texture,
            &ViewDesc {
                base_mip: 0,
                mip_count: None,
                dimension: wgpu::TextureViewDimension::D2Array,
            },
        );
        self.view = Some(view);
        self.mip_views = (0..self.mip_levels())
            .map(|level| {
                device.create_texture_view(
                    texture,
                    &ViewDesc {
                        base_mip: level,
                        mip_count: Some(1),
                        dimension: wgpu::TextureViewDimension::D2Array,
                    },
                )
            })
            .collect();

        if let (Some(layout), Some(sampler)) = (layout.layout, self.sampler) {
            self.binding.group = Some(device.create_bind_group(
                "texture_array",
                layout,
                &[
                    BindGroupEntry {
                        binding: 0,
                        resource: BindingResource::TextureView(view),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: BindingResource::Sampler(sampler),
                    },
                ],
            ));
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        self.release_views(device);
        if let Some(texture) = self.texture.take() {
            device.destroy_texture(texture);
        }
        if let Some(sampler) = self.sampler.take() {
            device.destroy_sampler(sampler);
        }
    }
}

fn create_texture(
    device: &mut dyn RenderDevice,
    key: TextureArrayKey,
    layers: u32,
    mip_levels: u32,
) -> TextureId {
    device.create_texture(
        "texture_array",
        &TextureDesc {
            width: key.width,
            height: key.height,
            layers,
            mip_levels,
            format: ARRAY_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        },
    )
}

/// Array entity for `key`, creating an empty one with capacity 1 on first use.
pub fn lookup_or_create(
    world: &mut World,
    device: &mut dyn RenderDevice,
    key: TextureArrayKey,
) -> Entity {
    if let Some(entity) = world
        .get_resource::<TextureArrayCache>()
        .and_then(|cache| cache.get(&key))
    {
        return entity;
    }
    if world.get_resource::<TextureArrayCache>().is_none() {
        let cache = TextureArrayCache::new(device);
        world.insert_resource(cache);
    }

    let layout = world
        .get_resource::<TextureArrayCache>()
        .map(|cache| cache.layout.clone())
        .unwrap_or_default();
    let entity = world.spawn();
    if let Some(cache) = world.get_resource_mut::<TextureArrayCache>() {
        cache.map.insert(key, entity);
    }
    let array = TextureArray::new(device, key, &layout);
    world.insert_component(entity, array);
    entity
}

/// Initialize phase: uploads every image that has no array layer yet.
///
/// The pixel data is dropped once it is on the GPU. Malformed images, images
/// larger than the device's 2D texture limit and images whose array is full are
/// logged and dropped without a layer.
pub fn upload_pending_images(world: &mut World) {
    let pending: Vec<Entity> = world
        .entities_with::<ImageData>()
        .into_iter()
        .filter(|entity| !world.has_any_relation::<TextureArrayIndex>(*entity))
        .collect();
    if pending.is_empty() {
        return;
    }

    with_gpu(world, |device, world| {
        let mut generator = world.remove_resource::<MipmapGenerator>();
        if let Some(generator) = generator.as_mut() {
            generator.sync_pipeline(world);
        }

        let max_dimension = device.limits().max_texture_dimension_2d;
        for entity in pending {
            let Some(image) = world.take_component::<ImageData>(entity) else {
                continue;
            };
            if !image.is_well_formed() {
                log::error!(
                    "dropping image on {:?}: {} bytes for {}x{} RGBA8",
                    entity,
                    image.pixels.len(),
                    image.width,
                    image.height
                );
                continue;
            }
            if image.width > max_dimension || image.height > max_dimension {
                log::error!(
                    "dropping image on {:?}: {}x{} exceeds the {} pixel texture limit",
                    entity,
                    image.width,
                    image.height,
                    max_dimension
                );
                continue;
            }

            let array_entity = lookup_or_create(world, device, image.key());
            let layout = world
                .get_resource::<TextureArrayCache>()
                .map(|cache| cache.layout.clone())
                .unwrap_or_default();
            let Some(array) = world.get_component_mut::<TextureArray>(array_entity) else {
                continue;
            };
            let Some(index) = array.upload_image(device, &layout, generator.as_mut(), &image)
            else {
                continue;
            };
            world.set_relation(entity, array_entity, TextureArrayIndex { index });
            log::debug!("uploaded {:?} into layer {} of {:?}", entity, index, array_entity);
        }

        if let Some(generator) = generator {
            world.insert_resource(generator);
        }
    });
}

pub fn register(world: &mut World) {
    world.register_component::<TextureArray>();
    world.on_remove::<TextureArray>(|world, entity, mut array| {
        if let Some(cache) = world.get_resource_mut::<TextureArrayCache>() {
            cache.map.retain(|_, cached| *cached != entity);
        }
        release_with(world, move |device| array.release(device));
    });
}
