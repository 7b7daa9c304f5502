//! GPU buffers and the bind groups built over them.
//!
//! A [`Buffer`] only ever grows. Writing more data than it can hold releases the
//! old allocation and creates one that fits exactly, which invalidates every
//! [`Binding`] built over it until [`Buffer::rebuild_binding`] runs again.

use plutonium_world::World;

use crate::renderer::{
    release_with, BindGroupEntry, BindGroupId, BindGroupLayoutId, BindingResource, BufferId,
    RenderDevice,
};

#[derive(Debug, Clone)]
pub struct Buffer {
    pub label: &'static str,
    pub usage: wgpu::BufferUsages,
    pub count: usize,
    pub item_size: usize,
    // allocated bytes, zero while unallocated
    pub capacity: u64,
    pub id: Option<BufferId>,
}

impl Buffer {
    pub fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            count: 0,
            item_size: 0,
            capacity: 0,
            id: None,
        }
    }

    /// Creates a buffer already holding `data`, e.g. a static vertex buffer.
    pub fn with_data<T: bytemuck::Pod>(
        device: &mut dyn RenderDevice,
        label: &'static str,
        usage: wgpu::BufferUsages,
        data: &[T],
    ) -> Self {
        let mut buffer = Self::new(label, usage);
        buffer.write_slice(device, data);
        buffer
    }

    /// Bytes covered by the last write.
    pub fn size(&self) -> u64 {
        (self.count * self.item_size) as u64
    }

    pub fn write<T: bytemuck::Pod>(&mut self, device: &mut dyn RenderDevice, value: &T) -> bool {
        self.write_bytes(
            device,
            1,
            std::mem::size_of::<T>(),
            bytemuck::bytes_of(value),
        )
    }

    /// Writes `data` from offset 0. Returns whether the allocation was replaced.
    pub fn write_slice<T: bytemuck::Pod>(
        &mut self,
        device: &mut dyn RenderDevice,
        data: &[T],
    ) -> bool {
        self.write_bytes(
            device,
            data.len(),
            std::mem::size_of::<T>(),
            bytemuck::cast_slice(data),
        )
    }

    fn write_bytes(
        &mut self,
        device: &mut dyn RenderDevice,
        count: usize,
        item_size: usize,
        bytes: &[u8],
    ) -> bool {
        self.count = count;
        self.item_size = item_size;
        let size = bytes.len() as u64;
        if size == 0 {
            return false;
        }

        let reallocated = match self.id {
            Some(_) if self.capacity >= size => false,
            _ => {
                self.release(device);
                self.id = Some(device.create_buffer(self.label, size, self.usage));
                self.capacity = size;
                log::debug!("allocated {} bytes for `{}`", size, self.label);
                true
            }
        };

        if let Some(id) = self.id {
            device.write_buffer(id, 0, bytes);
        }
        reallocated
    }

    /// Replaces the bind group in `binding` with one over the current allocation.
    pub fn rebuild_binding(
        &self,
        device: &mut dyn RenderDevice,
        binding: &mut Binding,
        layout: &BindingLayout,
    ) {
        binding.release(device);
        let (Some(buffer), Some(layout)) = (self.id, layout.layout) else {
            log::warn!("cannot bind `{}` without a buffer and a layout", self.label);
            return;
        };
        binding.group = Some(device.create_bind_group(
            self.label,
            layout,
            &[BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer {
                    buffer,
                    offset: 0,
                    size: self.size(),
                },
            }],
        ));
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(id) = self.id.take() {
            device.destroy_buffer(id);
        }
        self.capacity = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindingLayout {
    pub layout: Option<BindGroupLayoutId>,
}

impl BindingLayout {
    pub fn new(
        device: &mut dyn RenderDevice,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Self {
        Self {
            layout: Some(device.create_bind_group_layout(label, entries)),
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(layout) = self.layout.take() {
            device.destroy_bind_group_layout(layout);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub group: Option<BindGroupId>,
}

impl Binding {
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let Some(group) = self.group.take() {
            device.destroy_bind_group(group);
        }
    }
}

/// Layout entry for a single buffer at binding 0.
pub fn buffer_layout_entry(
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Registers the release hooks for buffers and bindings.
///
/// Columns are registered owner first so a despawn drops the bind group, then
/// the layout, then the buffer.
pub fn register(world: &mut World) {
    world.register_component::<Buffer>();
    world.register_component::<BindingLayout>();
    world.register_component::<Binding>();

    world.on_remove::<Buffer>(|world, _, mut buffer| {
        release_with(world, move |device| buffer.release(device));
    });
    world.on_remove::<BindingLayout>(|world, _, mut layout| {
        release_with(world, move |device| layout.release(device));
    });
    world.on_remove::<Binding>(|world, _, mut binding| {
        release_with(world, move |device| binding.release(device));
    });
}
