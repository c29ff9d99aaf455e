//! Solid-color box layer.

use std::sync::Arc;

use crate::layer::{alpha_byte, Layer, LayerCell, LayerList, LayerRef};
use crate::osc::server::OscServer;
use crate::osc::color_arg;
use crate::pixels::fill_box;
use crate::surface::{Color, Rect, Surface};

/// A filled rectangle between two corner coordinates.
///
/// `x2`/`y2` equal to zero extend the box to the target's right/bottom
/// edge at render time, which keeps the "zero means edge" contract even
/// for geometry that never passed through the sentinel expansion.
pub struct BoxLayer {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    color: Color,
    a: u8,
}

impl BoxLayer {
    #[must_use]
    pub fn new(geo: Rect, opacity: f32, color: Color) -> Self {
        let mut layer = Self {
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
            color,
            a: 0,
        };
        layer.geo(geo);
        layer.alpha(opacity);
        layer
    }

    pub fn color(&mut self, color: Color) {
        self.color = color;
    }
}

/// Registers the `box` layer kind: `/layer/new/box` with the
/// kind-specific tail `iii` (r, g, b), plus the per-layer `color` method.
pub fn register(server: &Arc<OscServer>, list: &Arc<LayerList>) {
    server.register_layer(
        "box",
        "iii",
        list,
        Arc::new(|server, name, geo, opacity, tail| {
            let cell = LayerCell::new(name, BoxLayer::new(geo, opacity, color_arg(tail, 0)));

            server.register_layer_defaults(&cell);
            let id = server.register_method(&cell, "color", "iii", |layer: &mut BoxLayer, args| {
                layer.color(color_arg(args, 0));
            });
            cell.push_registration(id);

            let layer: LayerRef = cell;
            layer
        }),
    );
}

impl Layer for BoxLayer {
    fn frame(&mut self, target: &mut Surface) {
        let x2 = if self.x2 == 0 { target.width() as i32 } else { self.x2 };
        let y2 = if self.y2 == 0 { target.height() as i32 } else { self.y2 };
        fill_box(target, self.x1, self.y1, x2, y2, self.color, self.a);
    }

    fn geo(&mut self, geo: Rect) {
        self.x1 = geo.x;
        self.y1 = geo.y;
        self.x2 = geo.x + geo.w as i32;
        self.y2 = geo.y + geo.h as i32;
    }

    fn alpha(&mut self, opacity: f32) {
        self.a = alpha_byte(opacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PixelFormat;

    #[test]
    fn zero_corners_extend_to_target_edges() {
        let mut layer = BoxLayer::new(Rect::ZERO, 1.0, Color::new(255, 0, 0));
        let mut target = Surface::new(8, 8, PixelFormat::Rgba8888);
        target.fill([0, 0, 0, 255]);
        layer.frame(&mut target);
        assert_eq!(target.rgba_at(0, 0), [255, 0, 0, 255]);
        assert_eq!(target.rgba_at(7, 7), [255, 0, 0, 255]);
    }

    #[test]
    fn translucent_box_blends_over_background() {
        let mut layer = BoxLayer::new(Rect::new(0, 0, 2, 2), 0.5, Color::new(255, 255, 255));
        let mut target = Surface::new(2, 2, PixelFormat::Rgba8888);
        target.fill([0, 0, 0, 255]);
        layer.frame(&mut target);
        let px = target.rgba_at(0, 0);
        // alpha_byte(0.5) == 128
        assert_eq!(px[0], 128);
    }
}
