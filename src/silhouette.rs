//! Render-side geometry: band amplitudes to filled "mountain" triangles.
//!
//! Runs on already-copied amplitudes, never under the shared lock. Each pair
//! of neighbouring bands becomes a quad split into a cap triangle (along the
//! sloped top) and a base triangle (down to the baseline). Pixel space, y down.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::params::{RenderConfig, Rgba8};
use crate::state::VisualizerLayer;

/// Vertex data for silhouette triangles (pixel position + straight RGBA)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

/// Where and how large one layer is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerGeometry {
    pub width: f32,
    /// Height of a band at amplitude 1.0
    pub height: f32,
    pub position_x: f32,
    /// Baseline y; silhouettes rise upward from here
    pub position_y: f32,
    pub color: Rgba8,
}

impl LayerGeometry {
    /// Stretch `layer` across a window of the given size
    pub fn fit(layer: &VisualizerLayer, window_size: (u32, u32), config: &RenderConfig) -> Self {
        Self {
            width: window_size.0 as f32,
            height: layer.height_px() as f32,
            position_x: 0.0,
            position_y: config.baseline_y(window_size.1),
            color: layer.color(),
        }
    }

    fn top(&self, x: f32, amplitude: f32) -> Vec2 {
        Vec2::new(x, self.position_y - (amplitude * self.height).floor())
    }
}

/// Triangles for one layer, appended to `out` (6 vertices per band interval)
pub fn push_silhouette(geometry: &LayerGeometry, amplitudes: &[f32], out: &mut Vec<Vertex>) {
    if amplitudes.len() < 2 {
        return;
    }

    let step = geometry.width / (amplitudes.len() - 1) as f32;
    let color = geometry.color.to_f32();
    let base_y = geometry.position_y;

    let mut emit = |p: Vec2| {
        out.push(Vertex {
            position: p.to_array(),
            color,
        })
    };

    for (i, pair) in amplitudes.windows(2).enumerate() {
        let x0 = geometry.position_x + step * i as f32;
        let x1 = geometry.position_x + step * (i + 1) as f32;
        let top0 = geometry.top(x0, pair[0]);
        let top1 = geometry.top(x1, pair[1]);

        // Cap
        emit(top1);
        emit(top0);
        emit(Vec2::new(x0, base_y));

        // Base
        emit(top1);
        emit(Vec2::new(x0, base_y));
        emit(Vec2::new(x1, base_y));
    }
}

/// Geometry for every layer, back to front, from a snapshot of amplitudes
pub fn build_silhouettes(
    layers: &[VisualizerLayer],
    snapshot: &[Vec<f32>],
    window_size: (u32, u32),
    config: &RenderConfig,
    out: &mut Vec<Vertex>,
) {
    out.clear();
    for (layer, amplitudes) in layers.iter().zip(snapshot) {
        let geometry = LayerGeometry::fit(layer, window_size, config);
        push_silhouette(&geometry, amplitudes, out);
    }
}
