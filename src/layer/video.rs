//! Video-stream layer.
//!
//! The media is decoded by a dedicated thread into a fixed-size RGB565
//! buffer at the video's native resolution, so the decoder never scales.
//! Scaling to the layer geometry happens once per frame on the render
//! thread, which makes the geometry-matches case a plain locked blit.
//!
//! The decoder thread touches the layer only through the decode buffer,
//! and only while holding the decode-buffer lock. If the renderer is
//! slow the decoder overwrites older frames; that is intentional "live"
//! behavior.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use video_rs::decode::Decoder;

use crate::errors::{LumenError, Result};
use crate::layer::{alpha_byte, Layer, LayerCell, LayerList, LayerRef};
use crate::osc::server::OscServer;
use crate::osc::{float_arg, int_arg, str_arg};
use crate::pixels::zoom;
use crate::surface::{PixelFormat, Rect, Surface, SurfaceAlpha};

/// State shared between the layer and its decoder thread.
struct PlayerShared {
    /// The decode buffer. The lock is held whenever the decoder writes a
    /// frame or the renderer reads one.
    buffer: Mutex<Surface>,
    paused: AtomicBool,
    stop: AtomicBool,
    rate: Mutex<f32>,
    /// Requested seek position as a fraction of the media duration.
    seek: Mutex<Option<f32>>,
}

struct VideoPlayer {
    shared: Arc<PlayerShared>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub struct VideoLayer {
    screen: (u32, u32),
    player: Option<VideoPlayer>,

    geov: Rect,
    alphav: f32,
    ratev: f32,
    pausedv: bool,
}

impl VideoLayer {
    #[must_use]
    pub fn new(screen: (u32, u32), geo: Rect, opacity: f32, url: &str) -> Self {
        let mut layer = Self {
            screen,
            player: None,
            geov: Rect::ZERO,
            alphav: 1.0,
            ratev: 1.0,
            pausedv: false,
        };
        layer.geo(geo);
        layer.alpha(opacity);
        layer.rate(1.0);
        layer.paused(true);
        layer.url(url);
        layer
    }

    /// Switches the media source. An empty URL stops playback and drops
    /// the decode buffer. A URL that cannot be opened leaves the layer
    /// without a source; `url` stays retryable.
    pub fn url(&mut self, url: &str) {
        // joins the decoder thread and releases the old buffer
        self.player = None;

        if url.is_empty() {
            return;
        }

        let decoder = match open_decoder(url) {
            Ok(decoder) => decoder,
            Err(err) => {
                log::warn!("cannot open media {url:?}: {err}");
                return;
            }
        };

        // The buffer dimensions cannot change while the decoder runs, so
        // it is sized to the media's native dimensions up front.
        let (width, height) = decoder.size();
        if width == 0 || height == 0 {
            log::warn!("media {url:?} reports no video track dimensions");
            return;
        }
        let shared = Arc::new(PlayerShared {
            buffer: Mutex::new(Surface::new(width, height, PixelFormat::Rgb565)),
            paused: AtomicBool::new(self.pausedv),
            stop: AtomicBool::new(false),
            rate: Mutex::new(self.ratev),
            seek: Mutex::new(None),
        });

        let thread = std::thread::spawn({
            let shared = Arc::clone(&shared);
            move || decode_loop(decoder, &shared)
        });

        self.player = Some(VideoPlayer {
            shared,
            thread: Some(thread),
        });
    }

    /// Sets the playback rate. Cached for reapplication after a `url`
    /// change.
    pub fn rate(&mut self, rate: f32) {
        self.ratev = rate;
        if let Some(player) = &self.player {
            *player.shared.rate.lock() = rate;
        }
    }

    /// Seeks to a position given as a fraction of the duration in
    /// `[0, 1]`.
    pub fn position(&mut self, position: f32) {
        if let Some(player) = &self.player {
            *player.shared.seek.lock() = Some(position);
        }
    }

    /// Caches the paused flag and reconciles the running player with it.
    pub fn paused(&mut self, paused: bool) {
        self.pausedv = paused;
        if let Some(player) = &self.player {
            player.shared.paused.store(paused, Ordering::Relaxed);
        }
    }

    /// Native size of the decode buffer, if a source is open.
    #[must_use]
    pub fn decode_buffer_size(&self) -> Option<(u32, u32)> {
        self.player.as_ref().map(|p| p.shared.buffer.lock().size())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.pausedv
    }

    #[must_use]
    pub fn rate_value(&self) -> f32 {
        self.ratev
    }
}

/// Registers the `video` layer kind: `/layer/new/video` with the
/// kind-specific tail `s` (url), plus the per-layer `url`, `rate`,
/// `position` and `paused` methods.
pub fn register(server: &Arc<OscServer>, list: &Arc<LayerList>, screen: (u32, u32)) {
    server.register_layer(
        "video",
        "s",
        list,
        Arc::new(move |server, name, geo, opacity, tail| {
            let cell = LayerCell::new(
                name,
                VideoLayer::new(screen, geo, opacity, str_arg(tail, 0)),
            );

            server.register_layer_defaults(&cell);
            let id = server.register_method(&cell, "url", "s", |layer: &mut VideoLayer, args| {
                layer.url(str_arg(args, 0));
            });
            cell.push_registration(id);
            let id = server.register_method(&cell, "rate", "f", |layer: &mut VideoLayer, args| {
                layer.rate(float_arg(args, 0));
            });
            cell.push_registration(id);
            let id =
                server.register_method(&cell, "position", "f", |layer: &mut VideoLayer, args| {
                    layer.position(float_arg(args, 0));
                });
            cell.push_registration(id);
            let id = server.register_method(&cell, "paused", "i", |layer: &mut VideoLayer, args| {
                layer.paused(int_arg(args, 0) != 0);
            });
            cell.push_registration(id);

            let layer: LayerRef = cell;
            layer
        }),
    );
}

impl Layer for VideoLayer {
    fn frame(&mut self, target: &mut Surface) {
        let Some(player) = self.player.as_ref() else {
            return;
        };
        if self.geov.w == 0 || self.geov.h == 0 {
            return;
        }
        let a = alpha_byte(self.alphav);

        let mut buffer = player.shared.buffer.lock();
        if buffer.size() == (self.geov.w, self.geov.h) {
            if a == 255 {
                buffer.set_alpha(None);
            } else {
                buffer.set_alpha(Some(SurfaceAlpha { value: a, rle: true }));
            }
            buffer.blit(target, self.geov.x, self.geov.y);
        } else {
            let mut scaled = zoom(
                &buffer,
                f64::from(self.geov.w) / f64::from(buffer.width()),
                f64::from(self.geov.h) / f64::from(buffer.height()),
            );
            drop(buffer);

            if a < 255 {
                scaled.set_alpha(Some(SurfaceAlpha { value: a, rle: true }));
            }
            scaled.blit(target, self.geov.x, self.geov.y);
        }
    }

    fn geo(&mut self, geo: Rect) {
        self.geov = geo.expand_to(self.screen.0, self.screen.1);
    }

    fn alpha(&mut self, opacity: f32) {
        self.alphav = opacity;
    }
}

fn open_decoder(url: &str) -> Result<Decoder> {
    if url.contains("://") {
        let parsed = url
            .parse::<video_rs::Url>()
            .map_err(|err| LumenError::MediaOpenError(err.to_string()))?;
        Ok(Decoder::new(parsed)?)
    } else {
        Ok(Decoder::new(Path::new(url))?)
    }
}

/// The decoder thread body: pulls frames at the media rate scaled by the
/// playback rate, writing each into the decode buffer under the lock.
fn decode_loop(mut decoder: Decoder, shared: &PlayerShared) {
    let fps = decoder.frame_rate();
    let frame_interval = if fps.is_finite() && fps > 0.0 {
        1.0 / f64::from(fps)
    } else {
        1.0 / 25.0
    };

    loop {
        if shared.stop.load(Ordering::Relaxed) {
            break;
        }

        if let Some(fraction) = shared.seek.lock().take() {
            apply_seek(&mut decoder, fraction);
        }

        if shared.paused.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(10));
            continue;
        }

        match decoder.decode() {
            Ok((_ts, frame)) => write_frame(&frame, &shared.buffer),
            Err(err) => {
                // end of stream or a decode hiccup: hold the last frame,
                // a later seek can restart playback
                log::debug!("video decode stalled: {err}");
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        }

        let rate = f64::from(shared.rate.lock().max(0.01));
        std::thread::sleep(Duration::from_secs_f64(frame_interval / rate));
    }
}

fn apply_seek(decoder: &mut Decoder, fraction: f32) {
    let fraction = f64::from(fraction.clamp(0.0, 1.0));
    match decoder.duration() {
        Ok(duration) => {
            let target_ms = (duration.as_secs_f64() * fraction * 1000.0) as i64;
            if let Err(err) = decoder.seek(target_ms) {
                log::warn!("video seek failed: {err}");
            }
        }
        Err(err) => log::warn!("cannot determine media duration for seek: {err}"),
    }
}

/// Writes one decoded RGB frame into the RGB565 decode buffer.
fn write_frame(frame: &ndarray::Array3<u8>, buffer: &Mutex<Surface>) {
    let mut buf = buffer.lock();

    let height = buf.height().min(frame.shape()[0] as u32);
    let width = buf.width().min(frame.shape()[1] as u32);

    for y in 0..height {
        for x in 0..width {
            let r = frame[[y as usize, x as usize, 0]];
            let g = frame[[y as usize, x as usize, 1]];
            let b = frame[[y as usize, x as usize, 2]];
            buf.put_rgba(x, y, [r, g, b, 255]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_leaves_no_player() {
        let mut layer = VideoLayer::new((640, 480), Rect::ZERO, 1.0, "");
        assert!(layer.decode_buffer_size().is_none());
        assert!(layer.is_paused());

        // rate and paused are cached even without a player
        layer.rate(2.0);
        layer.paused(false);
        assert_eq!(layer.rate_value(), 2.0);
        assert!(!layer.is_paused());
    }
}
