//! Blitting and scaling primitives.
//!
//! These are the hot loops of the compositor: the alpha-multiply blit that
//! materializes a translucent copy of an RGBA surface, the bilinear zoom
//! used for geometry scaling, and the filled-box primitive of the box
//! layer. Everything works on [`Surface`] buffers directly.

use crate::surface::{blend_over, Color, PixelFormat, Surface};

/// Copies `src` into `dst`, replacing each pixel's alpha with
/// `a * opacity / 255` while preserving RGB.
///
/// Both surfaces must have identical dimensions and the `Rgba8888` format.
/// With `opacity == 0` the destination is cleared to fully-transparent
/// black in a single fill. Callers must not invoke this with
/// `opacity == 255`; opaque surfaces are never materialized into an
/// alpha-copy buffer.
pub fn alpha_multiply_blit(src: &Surface, dst: &mut Surface, opacity: u8) {
    assert_eq!(src.size(), dst.size());
    assert_eq!(src.format(), PixelFormat::Rgba8888);
    assert_eq!(dst.format(), PixelFormat::Rgba8888);
    debug_assert_ne!(opacity, 255);

    if opacity == 0 {
        dst.fill([0, 0, 0, 0]);
        return;
    }

    let opacity = u16::from(opacity);

    #[inline]
    fn mult(src: &[u8], dst: &mut [u8], opacity: u16) {
        dst[0] = src[0];
        dst[1] = src[1];
        dst[2] = src[2];
        dst[3] = ((u16::from(src[3]) * opacity) / 255) as u8;
    }

    let len = src.pixels().len();
    let s = src.pixels();
    let d = dst.pixels_mut();

    // four pixels per iteration, remainder handled below
    let mut i = 0;
    while i + 16 <= len {
        mult(&s[i..], &mut d[i..], opacity);
        mult(&s[i + 4..], &mut d[i + 4..], opacity);
        mult(&s[i + 8..], &mut d[i + 8..], opacity);
        mult(&s[i + 12..], &mut d[i + 12..], opacity);
        i += 16;
    }
    while i < len {
        mult(&s[i..], &mut d[i..], opacity);
        i += 4;
    }
}

/// Bilinear-smoothed zoom by independent x/y factors.
///
/// Both factors must be greater than zero. Sources with an alpha channel
/// produce an `Rgba8888` result; sources without one produce `Rgb888`, so
/// a per-surface alpha attached afterwards keeps working.
#[must_use]
pub fn zoom(src: &Surface, fx: f64, fy: f64) -> Surface {
    assert!(fx > 0.0 && fy > 0.0);

    let dw = ((f64::from(src.width()) * fx).round() as u32).max(1);
    let dh = ((f64::from(src.height()) * fy).round() as u32).max(1);
    let format = if src.format().has_alpha() {
        PixelFormat::Rgba8888
    } else {
        PixelFormat::Rgb888
    };
    let mut dst = Surface::new(dw, dh, format);

    let sw = src.width();
    let sh = src.height();
    let x_step = f64::from(sw) / f64::from(dw);
    let y_step = f64::from(sh) / f64::from(dh);

    for dy in 0..dh {
        let sy = ((f64::from(dy) + 0.5) * y_step - 0.5).max(0.0);
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(sh - 1);
        let wy = sy - f64::from(y0);

        for dx in 0..dw {
            let sx = ((f64::from(dx) + 0.5) * x_step - 0.5).max(0.0);
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(sw - 1);
            let wx = sx - f64::from(x0);

            let p00 = src.rgba_at(x0, y0);
            let p10 = src.rgba_at(x1, y0);
            let p01 = src.rgba_at(x0, y1);
            let p11 = src.rgba_at(x1, y1);

            let mut out = [0u8; 4];
            for (c, slot) in out.iter_mut().enumerate() {
                let top = f64::from(p00[c]) * (1.0 - wx) + f64::from(p10[c]) * wx;
                let bottom = f64::from(p01[c]) * (1.0 - wx) + f64::from(p11[c]) * wx;
                *slot = (top * (1.0 - wy) + bottom * wy).round() as u8;
            }
            dst.put_rgba(dx, dy, out);
        }
    }

    dst
}

/// Draws a filled, alpha-blended rectangle from (`x1`, `y1`) to
/// (`x2`, `y2`) exclusive, clipped against the target.
pub fn fill_box(target: &mut Surface, x1: i32, y1: i32, x2: i32, y2: i32, color: Color, alpha: u8) {
    if alpha == 0 {
        return;
    }

    let x_start = x1.max(0) as u32;
    let y_start = y1.max(0) as u32;
    let x_end = (x2.max(0) as u32).min(target.width());
    let y_end = (y2.max(0) as u32).min(target.height());

    let src = [color.r, color.g, color.b, alpha];
    for y in y_start..y_end {
        for x in x_start..x_end {
            if alpha == 255 {
                target.put_rgba(x, y, src);
            } else {
                let dst = target.rgba_at(x, y);
                target.put_rgba(x, y, blend_over(src, dst, alpha));
            }
        }
    }
}
