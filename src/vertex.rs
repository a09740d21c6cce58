use bytemuck::{Pod, Zeroable};
use std::mem;

/// Packed `0xAARRGGBB` colour.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Color(pub u32);

impl Color {
    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub const fn xrgb(r: u8, g: u8, b: u8) -> Self {
        Self::argb(0xff, r, g, b)
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    pub fn to_rgba(self) -> [f32; 4] {
        [
            self.red() as f32 / 255.0,
            self.green() as f32 / 255.0,
            self.blue() as f32 / 255.0,
            self.alpha() as f32 / 255.0,
        ]
    }
}

bitflags::bitflags! {
    /// Flexible vertex format: which fields a vertex record carries, in order.
    pub struct Fvf: u32 {
        /// Pre-transformed position: x, y, z and reciprocal homogeneous w.
        const XYZRHW = 0x004;
        /// Packed diffuse colour.
        const DIFFUSE = 0x040;
    }
}

impl Fvf {
    /// Size in bytes of a record described by this format.
    pub fn vertex_size(self) -> u32 {
        let mut size = 0;
        if self.contains(Fvf::XYZRHW) {
            size += 4 * mem::size_of::<f32>() as u32;
        }
        if self.contains(Fvf::DIFFUSE) {
            size += mem::size_of::<u32>() as u32;
        }
        size
    }
}

/// A transformed and lit vertex: window coordinates plus its own colour.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// x, y, z, rhw
    pub position: [f32; 4],
    pub color: Color,
}

impl Vertex {
    pub const FVF: Fvf = Fvf::from_bits_truncate(Fvf::XYZRHW.bits() | Fvf::DIFFUSE.bits());

    pub const STRIDE: u32 = mem::size_of::<Vertex>() as u32;
}

pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [150.0, 50.0, 0.5, 1.0],
        color: Color(0xffff0000),
    },
    Vertex {
        position: [250.0, 250.0, 0.5, 1.0],
        color: Color(0xff00ff00),
    },
    Vertex {
        position: [50.0, 250.0, 0.5, 1.0],
        color: Color(0xff00ffff),
    },
];
