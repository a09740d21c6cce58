use image::{Pixel, Rgba, RgbaImage};

use crate::vertex::{Color, Vertex};

pub const ICON_SIZE: u32 = 32;

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

fn channels(color: Color) -> [f32; 4] {
    [
        color.red() as f32,
        color.green() as f32,
        color.blue() as f32,
        color.alpha() as f32,
    ]
}

/// Rasterize `triangle`, given in a `extent`×`extent` window, into a square
/// RGBA image of `size` pixels with Gouraud-blended vertex colours.
pub fn rasterize(triangle: &[Vertex; 3], extent: f32, size: u32) -> RgbaImage {
    let scale = size as f32 / extent;
    let points: Vec<[f32; 2]> = triangle
        .iter()
        .map(|v| [v.position[0] * scale, v.position[1] * scale])
        .collect();
    let area = edge(points[0], points[1], points[2]);

    RgbaImage::from_fn(size, size, |x, y| {
        let p = [x as f32 + 0.5, y as f32 + 0.5];
        let weights = [
            edge(points[1], points[2], p) / area,
            edge(points[2], points[0], p) / area,
            edge(points[0], points[1], p) / area,
        ];
        if area == 0.0 || weights.iter().any(|w| *w < 0.0) {
            return Rgba::from_channels(0, 0, 0, 0);
        }

        let mut blended = [0.0f32; 4];
        for (w, vertex) in weights.iter().zip(triangle.iter()) {
            for (out, c) in blended.iter_mut().zip(channels(vertex.color).iter()) {
                *out += w * c;
            }
        }
        let [r, g, b, a] = blended;
        Rgba::from_channels(r.round() as u8, g.round() as u8, b.round() as u8, a.round() as u8)
    })
}

pub fn window_icon(triangle: &[Vertex; 3], extent: f32) -> Option<winit::window::Icon> {
    let image = rasterize(triangle, extent, ICON_SIZE);
    match winit::window::Icon::from_rgba(image.into_raw(), ICON_SIZE, ICON_SIZE) {
        Ok(icon) => Some(icon),
        Err(err) => {
            log::warn!("window icon rejected: {:?}", err);
            None
        }
    }
}
