use std::ops::{Add, Mul};

// Plain components

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, rotation: 0.0 }
    }
}

impl Add for Position {
    type Output = Position;
    fn add(self, other: Position) -> Position {
        Position {
            x: self.x + other.x,
            y: self.y + other.y,
            rotation: self.rotation + other.rotation,
        }
    }
}

impl Mul<f32> for Position {
    type Output = Position;
    fn mul(self, factor: f32) -> Self::Output {
        Position {
            x: self.x * factor,
            y: self.y * factor,
            rotation: self.rotation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub [f32; 4]);

impl Color {
    pub const WHITE: Color = Color([1.0, 1.0, 1.0, 1.0]);
    pub const BLACK: Color = Color([0.0, 0.0, 0.0, 1.0]);

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Color([r, g, b, a])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quad {
    pub width: f32,
    pub height: f32,
    pub corner_radius: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Circle {
    pub radius: f32,
}

// GPU records

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3], // x, y, z coordinates
}

/// Two triangles covering the unit square in clip space.
pub const QUAD_VERTICES: [Vertex; 6] = [
    Vertex { position: [-1.0, 1.0, 0.0] },
    Vertex { position: [1.0, 1.0, 0.0] },
    Vertex { position: [1.0, -1.0, 0.0] },
    Vertex { position: [1.0, -1.0, 0.0] },
    Vertex { position: [-1.0, -1.0, 0.0] },
    Vertex { position: [-1.0, 1.0, 0.0] },
];

/// Viewport uniform shared by every render pipeline at group 0.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct Uniforms {
    pub viewport: [f32; 2],
    // uniform buffers bind in 16 byte blocks
    pub _padding: [f32; 2],
}

impl Uniforms {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            viewport: [width, height],
            _padding: [0.0; 2],
        }
    }
}

/// Per-instance record of the quad/circle pipeline (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct QuadInstance {
    pub color: [f32; 4],
    pub corner_radius: [f32; 4],
    pub position: [f32; 2],
    pub rotation: f32,
    pub _reserved: f32,
    pub size: [f32; 2],
    pub _padding: [f32; 2],
}

impl QuadInstance {
    pub fn quad(quad: &Quad, position: &Position, color: &Color) -> Self {
        Self {
            color: color.0,
            corner_radius: [quad.corner_radius; 4],
            position: [position.x, position.y],
            rotation: position.rotation,
            _reserved: 0.0,
            size: [quad.width, quad.height],
            _padding: [0.0; 2],
        }
    }

    pub fn circle(circle: &Circle, position: &Position, color: &Color) -> Self {
        let diameter = circle.radius * 2.0;
        Self {
            color: color.0,
            corner_radius: [circle.radius; 4],
            position: [position.x, position.y],
            rotation: position.rotation,
            _reserved: 0.0,
            size: [diameter, diameter],
            _padding: [0.0; 2],
        }
    }
}

/// Per-instance record of the textured quad pipeline (48 bytes).
///
/// `layer` carries the u32 layer index bit-cast into an f32 slot; the shader
/// reads it back with `bitcast<u32>`.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct ImageInstance {
    pub corner_radius: [f32; 4],
    pub position: [f32; 2],
    pub rotation: f32,
    pub layer: f32,
    pub size: [f32; 2],
    pub _padding: [u32; 2],
}

impl ImageInstance {
    pub fn new(quad: &Quad, position: &Position, layer: u32) -> Self {
        Self {
            corner_radius: [quad.corner_radius; 4],
            position: [position.x, position.y],
            rotation: position.rotation,
            layer: f32::from_bits(layer),
            size: [quad.width, quad.height],
            _padding: [0; 2],
        }
    }

    pub fn layer_index(&self) -> u32 {
        self.layer.to_bits()
    }
}

/// Uniform of the mipmap compute shader: the array layer being reduced.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq)]
pub struct MipmapUniforms {
    pub layer: u32,
    pub _padding: [u32; 3],
}

impl MipmapUniforms {
    pub fn new(layer: u32) -> Self {
        Self {
            layer,
            _padding: [0; 3],
        }
    }
}
