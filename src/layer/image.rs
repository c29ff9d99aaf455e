//! Still-image layer.
//!
//! Keeps up to three cached surfaces: the decoded file, a scaled copy
//! matching the current geometry, and an alpha-composited copy carrying
//! the current opacity. Whichever exists furthest down that chain is the
//! one blitted per frame.

use std::sync::Arc;

use crate::layer::{alpha_byte, Layer, LayerCell, LayerList, LayerRef};
use crate::osc::server::OscServer;
use crate::osc::str_arg;
use crate::pixels::{alpha_multiply_blit, zoom};
use crate::surface::{Rect, Surface, SurfaceAlpha};

pub struct ImageLayer {
    screen: (u32, u32),

    surf: Option<Surface>,        // decoded file
    surf_scaled: Option<Surface>, // zoomed to geometry
    surf_alpha: Option<Surface>,  // with opacity multiplied in

    geov: Rect,
    alphav: f32,
}

impl ImageLayer {
    /// Creates the layer and loads `file` (empty string for no source).
    ///
    /// Setter order matters for cache rebuilds and mirrors the OSC
    /// constructor: alpha, then geometry, then the file.
    #[must_use]
    pub fn new(screen: (u32, u32), geo: Rect, opacity: f32, file: &str) -> Self {
        let mut layer = Self {
            screen,
            surf: None,
            surf_scaled: None,
            surf_alpha: None,
            geov: Rect::ZERO,
            alphav: 1.0,
        };
        layer.alpha(opacity);
        layer.geo(geo);
        layer.file(file);
        layer
    }

    /// Replaces the image source. An empty path clears the layer.
    ///
    /// A file that cannot be decoded is fatal: the configuration is
    /// presumed authored, not user-driven.
    pub fn file(&mut self, path: &str) {
        self.surf_alpha = None;
        self.surf_scaled = None;
        self.surf = None;

        if path.is_empty() {
            return;
        }

        match image::open(path) {
            Ok(img) => self.surf = Some(surface_from_image(&img)),
            Err(err) => {
                log::error!("failed to load image {path:?}: {err}");
                std::process::exit(1);
            }
        }

        self.geo(self.geov);
    }

    #[must_use]
    pub fn source(&self) -> Option<&Surface> {
        self.surf.as_ref()
    }

    #[must_use]
    pub fn scaled(&self) -> Option<&Surface> {
        self.surf_scaled.as_ref()
    }

    #[must_use]
    pub fn alpha_composited(&self) -> Option<&Surface> {
        self.surf_alpha.as_ref()
    }
}

/// Registers the `image` layer kind: `/layer/new/image` with the
/// kind-specific tail `s` (file), plus the per-layer `file` method.
pub fn register(server: &Arc<OscServer>, list: &Arc<LayerList>, screen: (u32, u32)) {
    server.register_layer(
        "image",
        "s",
        list,
        Arc::new(move |server, name, geo, opacity, tail| {
            let cell = LayerCell::new(
                name,
                ImageLayer::new(screen, geo, opacity, str_arg(tail, 0)),
            );

            server.register_layer_defaults(&cell);
            let id = server.register_method(&cell, "file", "s", |layer: &mut ImageLayer, args| {
                layer.file(str_arg(args, 0));
            });
            cell.push_registration(id);

            let layer: LayerRef = cell;
            layer
        }),
    );
}

impl Layer for ImageLayer {
    fn frame(&mut self, target: &mut Surface) {
        if self.surf.is_none() {
            return;
        }
        if let Some(use_surf) = self
            .surf_alpha
            .as_ref()
            .or(self.surf_scaled.as_ref())
            .or(self.surf.as_ref())
        {
            use_surf.blit(target, self.geov.x, self.geov.y);
        }
    }

    fn geo(&mut self, geo: Rect) {
        self.geov = geo.expand_to(self.screen.0, self.screen.1);

        let Some(surf) = self.surf.as_ref() else {
            return;
        };

        if self
            .surf_scaled
            .as_ref()
            .is_some_and(|s| s.size() == (self.geov.w, self.geov.h))
        {
            return;
        }

        self.surf_alpha = None;
        self.surf_scaled = None;

        if surf.size() != (self.geov.w, self.geov.h) {
            self.surf_scaled = Some(zoom(
                surf,
                f64::from(self.geov.w) / f64::from(surf.width()),
                f64::from(self.geov.h) / f64::from(surf.height()),
            ));
        }

        self.alpha(self.alphav);
    }

    fn alpha(&mut self, opacity: f32) {
        self.alphav = opacity;
        let a = alpha_byte(opacity);

        let Some(use_surf) = self.surf_scaled.as_mut().or(self.surf.as_mut()) else {
            return;
        };

        if !use_surf.format().has_alpha() {
            if a == 255 {
                use_surf.set_alpha(None);
            } else {
                use_surf.set_alpha(Some(SurfaceAlpha { value: a, rle: true }));
            }
            return;
        }

        if a == 255 {
            self.surf_alpha = None;
            return;
        }

        if self.surf_alpha.is_none() {
            self.surf_alpha = Some(Surface::new(
                use_surf.width(),
                use_surf.height(),
                use_surf.format(),
            ));
        }
        if let Some(dst) = self.surf_alpha.as_mut() {
            alpha_multiply_blit(use_surf, dst, a);
        }
    }
}

fn surface_from_image(img: &image::DynamicImage) -> Surface {
    if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        Surface::from_rgba8(w, h, rgba.into_raw())
    } else {
        let rgb = img.to_rgb8();
        let (w, h) = rgb.dimensions();
        Surface::from_rgb8(w, h, rgb.into_raw())
    }
}
