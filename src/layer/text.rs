//! Rasterized-text layer.
//!
//! Text is rasterized with a TrueType font at a pixel height equal to the
//! geometry height. Changing the color, text, style or font re-renders the
//! string; a non-zero geometry width additionally squeezes or stretches
//! the rendered line horizontally to that width.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fontdue::layout::{CoordinateSystem, Layout, TextStyle};

use crate::layer::{alpha_byte, Layer, LayerCell, LayerList, LayerRef};
use crate::osc::server::OscServer;
use crate::osc::{color_arg, str_arg};
use crate::pixels::{alpha_multiply_blit, zoom};
use crate::surface::{Color, PixelFormat, Rect, Surface};

/// Style bits applied at rasterization time.
///
/// The rasterizer synthesizes all three: bold as a double-strike, italic
/// as a horizontal shear, underline as a baseline rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl FontStyle {
    /// Parses a style string: any subset of the characters `b`, `i`, `u`.
    /// Unknown characters are ignored.
    #[must_use]
    pub fn parse(chars: &str) -> Self {
        let mut style = Self::default();
        for c in chars.chars() {
            match c {
                'b' => style.bold = true,
                'i' => style.italic = true,
                'u' => style.underline = true,
                _ => {}
            }
        }
        style
    }
}

/// Platform root for relative font paths.
#[must_use]
pub fn font_dir() -> PathBuf {
    #[cfg(windows)]
    {
        let root = std::env::var("SYSTEMROOT").unwrap_or_else(|_| "C:\\Windows".into());
        Path::new(&root).join("fonts")
    }
    #[cfg(not(windows))]
    {
        PathBuf::from("/usr/share/fonts/truetype")
    }
}

/// Resolves a font argument: absolute paths verbatim, relative paths
/// under the platform font directory.
#[must_use]
pub fn resolve_font_path(file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        font_dir().join(path)
    }
}

pub struct TextLayer {
    screen: (u32, u32),

    font: Option<fontdue::Font>,
    font_px: f32,

    surf: Option<Surface>,       // rendered text (possibly width-corrected)
    surf_alpha: Option<Surface>, // with opacity multiplied in

    textv: String,
    filev: Option<PathBuf>,
    colorv: Color,
    stylev: FontStyle,
    geov: Rect,
    alphav: f32,
}

impl TextLayer {
    #[must_use]
    pub fn new(
        screen: (u32, u32),
        geo: Rect,
        opacity: f32,
        color: Color,
        text: &str,
        file: &str,
    ) -> Self {
        let mut layer = Self {
            screen,
            font: None,
            font_px: 0.0,
            surf: None,
            surf_alpha: None,
            textv: String::new(),
            filev: None,
            colorv: color,
            stylev: FontStyle::default(),
            geov: Rect::ZERO,
            alphav: 1.0,
        };
        layer.geo(geo);
        layer.alpha(opacity);
        layer.color(color);
        layer.text(text);
        layer.font(file);
        layer
    }

    /// Installs a new text color and re-renders the string.
    pub fn color(&mut self, color: Color) {
        self.colorv = color;

        let Some(font) = self.font.as_ref() else {
            return;
        };

        self.surf_alpha = None;
        let mut surf = rasterize_text(font, self.font_px, self.stylev, self.colorv, &self.textv);

        if self.geov.w != 0 && surf.width() != self.geov.w {
            surf = zoom(&surf, f64::from(self.geov.w) / f64::from(surf.width()), 1.0);
        }
        self.surf = Some(surf);

        self.alpha(self.alphav);
    }

    /// Replaces the text content and re-renders.
    pub fn text(&mut self, text: &str) {
        self.textv = text.to_owned();
        self.color(self.colorv);
    }

    /// Applies style bits and re-renders.
    pub fn style(&mut self, style: FontStyle) {
        self.stylev = style;
        self.color(self.colorv);
    }

    /// Switches the font file (relative paths resolve under the platform
    /// font directory) and re-renders through the geometry pipeline.
    pub fn font(&mut self, file: &str) {
        if file.is_empty() {
            self.filev = None;
            return;
        }
        self.filev = Some(resolve_font_path(file));

        // force the reload below: a new file never reuses the old handle
        self.font = None;
        self.surf_alpha = None;
        self.surf = None;

        self.geo(self.geov);
    }

    #[must_use]
    pub fn rendered(&self) -> Option<&Surface> {
        self.surf.as_ref()
    }

    fn reload_font(&mut self) {
        let Some(path) = self.filev.as_ref() else {
            return;
        };
        self.font_px = (self.geov.h.max(1)) as f32;

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("failed to read font {}: {err}", path.display());
                self.font = None;
                return;
            }
        };
        let settings = fontdue::FontSettings {
            scale: self.font_px,
            ..fontdue::FontSettings::default()
        };
        match fontdue::Font::from_bytes(bytes, settings) {
            Ok(font) => self.font = Some(font),
            Err(err) => {
                log::warn!("failed to parse font {}: {err}", path.display());
                self.font = None;
            }
        }
    }
}

/// Registers the `text` layer kind: `/layer/new/text` with the
/// kind-specific tail `iii ss` (r, g, b, text, font file), plus the
/// per-layer `color`, `text`, `font` and `style` methods.
pub fn register(server: &Arc<OscServer>, list: &Arc<LayerList>, screen: (u32, u32)) {
    server.register_layer(
        "text",
        "iiiss",
        list,
        Arc::new(move |server, name, geo, opacity, tail| {
            let cell = LayerCell::new(
                name,
                TextLayer::new(
                    screen,
                    geo,
                    opacity,
                    color_arg(tail, 0),
                    str_arg(tail, 3),
                    str_arg(tail, 4),
                ),
            );

            server.register_layer_defaults(&cell);
            let id = server.register_method(&cell, "color", "iii", |layer: &mut TextLayer, args| {
                layer.color(color_arg(args, 0));
            });
            cell.push_registration(id);
            let id = server.register_method(&cell, "text", "s", |layer: &mut TextLayer, args| {
                layer.text(str_arg(args, 0));
            });
            cell.push_registration(id);
            let id = server.register_method(&cell, "font", "s", |layer: &mut TextLayer, args| {
                layer.font(str_arg(args, 0));
            });
            cell.push_registration(id);
            let id = server.register_method(&cell, "style", "s", |layer: &mut TextLayer, args| {
                layer.style(FontStyle::parse(str_arg(args, 0)));
            });
            cell.push_registration(id);

            let layer: LayerRef = cell;
            layer
        }),
    );
}

impl Layer for TextLayer {
    fn frame(&mut self, target: &mut Surface) {
        if let Some(use_surf) = self.surf_alpha.as_ref().or(self.surf.as_ref()) {
            use_surf.blit(target, self.geov.x, self.geov.y);
        }
    }

    fn geo(&mut self, geo: Rect) {
        if geo.is_zero() {
            self.geov = geo.expand_to(self.screen.0, self.screen.1);
        } else {
            self.geov = geo;
            if self.geov.h == 0 {
                self.geov.h = self.screen.1;
            }
        }

        if self.filev.is_none() {
            return;
        }

        // rendered output already matches the requested size
        if self.font.is_some()
            && self.font_px as u32 == self.geov.h
            && self
                .surf
                .as_ref()
                .is_some_and(|s| self.geov.w == 0 || s.width() == self.geov.w)
        {
            return;
        }

        self.reload_font();
        self.color(self.colorv);
    }

    fn alpha(&mut self, opacity: f32) {
        self.alphav = opacity;
        let a = alpha_byte(opacity);

        let Some(surf) = self.surf.as_ref() else {
            return;
        };

        if a == 255 {
            self.surf_alpha = None;
            return;
        }

        if self.surf_alpha.is_none() {
            self.surf_alpha = Some(Surface::new(surf.width(), surf.height(), surf.format()));
        }
        if let Some(dst) = self.surf_alpha.as_mut() {
            alpha_multiply_blit(surf, dst, a);
        }
    }
}

/// Rasterizes `text` into a fresh RGBA surface.
fn rasterize_text(
    font: &fontdue::Font,
    px: f32,
    style: FontStyle,
    color: Color,
    text: &str,
) -> Surface {
    let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.append(&[font], &TextStyle::new(text, px, 0));

    let mut text_width = 0f32;
    for g in layout.glyphs() {
        text_width = text_width.max(g.x + g.width as f32);
    }
    let text_height = layout.height().max(px);

    let shear = if style.italic { 0.21 } else { 0.0 };
    let extra = (text_height * shear).ceil() + if style.bold { 1.0 } else { 0.0 };

    let w = ((text_width + extra).ceil() as u32).max(1);
    let h = (text_height.ceil() as u32).max(1);
    let mut surf = Surface::new(w, h, PixelFormat::Rgba8888);

    let strikes: &[i32] = if style.bold { &[0, 1] } else { &[0] };

    for g in layout.glyphs() {
        let (metrics, coverage) = font.rasterize_config(g.key);
        for row in 0..metrics.height {
            let py = g.y as i32 + row as i32;
            if py < 0 || py as u32 >= h {
                continue;
            }
            let slant = ((h as i32 - 1 - py) as f32 * shear) as i32;
            for col in 0..metrics.width {
                let cov = coverage[row * metrics.width + col];
                if cov == 0 {
                    continue;
                }
                for dx in strikes {
                    let x = g.x as i32 + col as i32 + slant + dx;
                    if x < 0 || x as u32 >= w {
                        continue;
                    }
                    let existing = surf.rgba_at(x as u32, py as u32);
                    let a = cov.max(existing[3]);
                    surf.put_rgba(x as u32, py as u32, [color.r, color.g, color.b, a]);
                }
            }
        }
    }

    if style.underline {
        let baseline = font
            .horizontal_line_metrics(px)
            .map_or(px * 0.8, |m| m.ascent);
        let thickness = ((px / 18.0).ceil() as u32).max(1);
        let y0 = (baseline.round() as u32 + 1).min(h.saturating_sub(thickness));
        for y in y0..(y0 + thickness).min(h) {
            for x in 0..w {
                surf.put_rgba(x, y, [color.r, color.g, color.b, 255]);
            }
        }
    }

    surf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_parse_accepts_any_subset() {
        assert_eq!(FontStyle::parse(""), FontStyle::default());
        let all = FontStyle::parse("biu");
        assert!(all.bold && all.italic && all.underline);
        // unknown characters are ignored
        assert_eq!(FontStyle::parse("xyz"), FontStyle::default());
    }

    #[test]
    fn relative_font_paths_resolve_under_the_platform_root() {
        let resolved = resolve_font_path("DejaVuSans.ttf");
        assert!(resolved.starts_with(font_dir()));
        #[cfg(not(windows))]
        {
            let abs = resolve_font_path("/tmp/f.ttf");
            assert_eq!(abs, PathBuf::from("/tmp/f.ttf"));
        }
    }
}
