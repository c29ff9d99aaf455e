//! Frame recorder.
//!
//! Receives the composed framebuffer once per tick and appends it to a
//! video file. The state machine is `idle -> recording -> idle`; all
//! transitions and `record` itself run under the recorder's own lock,
//! which nothing else in the system takes.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ndarray::Array3;
use parking_lot::Mutex;
use video_rs::encode::{Encoder, Settings};
use video_rs::Time;

use crate::errors::{LumenError, Result};
use crate::osc::server::OscServer;
use crate::osc::{str_arg, Dispatch};
use crate::surface::Surface;

struct Recording {
    encoder: Encoder,
    start_time: Instant,
    last_pts: Option<i64>,
}

pub struct Recorder {
    recording: Mutex<Option<Recording>>,
    width: u32,
    height: u32,
    framerate: u32,
}

impl Recorder {
    /// Creates an idle recorder for a screen of the given size, encoding
    /// with a time base of `1/framerate`.
    #[must_use]
    pub fn new(width: u32, height: u32, framerate: u32) -> Arc<Self> {
        Arc::new(Self {
            recording: Mutex::new(None),
            width,
            height,
            framerate: framerate.max(1),
        })
    }

    /// Installs `/recorder/start` (filename, codec name) and
    /// `/recorder/stop`.
    pub fn register_methods(self: &Arc<Self>, server: &Arc<OscServer>) {
        let recorder = Arc::clone(self);
        server.add_method(
            Some("/recorder/start"),
            Some("ss"),
            Arc::new(move |_path, args| {
                if let Err(err) = recorder.start(str_arg(args, 0), str_arg(args, 1)) {
                    log::error!("recorder start failed: {err}");
                }
                Dispatch::Handled
            }),
        );

        let recorder = Arc::clone(self);
        server.add_method(
            Some("/recorder/stop"),
            Some(""),
            Arc::new(move |_path, _args| {
                recorder.stop();
                Dispatch::Handled
            }),
        );
    }

    /// Opens `filename` for encoding, stopping any in-progress encode
    /// first. The container is guessed from the filename extension by the
    /// muxer; an empty codec name selects the default.
    pub fn start(&self, filename: &str, codec: &str) -> Result<()> {
        let mut recording = self.recording.lock();

        if let Some(old) = recording.take() {
            finish(old);
        }

        // the yuv420p encode path subsamples chroma 2x2
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(LumenError::OddRecorderDimensions {
                width: self.width,
                height: self.height,
            });
        }

        match codec {
            "" | "h264" | "libx264" => {}
            other => return Err(LumenError::UnknownCodec(other.to_owned())),
        }

        let settings =
            Settings::preset_h264_yuv420p(self.width as usize, self.height as usize, false);
        let encoder = Encoder::new(Path::new(filename), settings)
            .map_err(|err| LumenError::RecorderOpenError(err.to_string()))?;

        log::info!("recording to {filename:?} at {} Hz", self.framerate);
        *recording = Some(Recording {
            encoder,
            start_time: Instant::now(),
            last_pts: None,
        });

        Ok(())
    }

    /// Flushes codec buffers and writes the container trailer.
    pub fn stop(&self) {
        if let Some(recording) = self.recording.lock().take() {
            finish(recording);
        }
    }

    /// Encodes one composed frame. A no-op while idle; frames whose
    /// presentation timestamp does not advance past the previous frame's
    /// are dropped.
    pub fn record(&self, surf: &Surface) {
        let mut guard = self.recording.lock();
        let Some(recording) = guard.as_mut() else {
            return;
        };

        let frame_delay_ms = 1000.0 / f64::from(self.framerate);
        let elapsed_ms = recording.start_time.elapsed().as_secs_f64() * 1000.0;
        let pts = (elapsed_ms / frame_delay_ms) as i64;

        if recording.last_pts.is_some_and(|last| pts <= last) {
            return;
        }

        let Some(frame) = rgb_frame(surf) else {
            return;
        };
        let timestamp = Time::from_secs_f64(pts as f64 * frame_delay_ms / 1000.0);
        if let Err(err) = recording.encoder.encode(&frame, timestamp) {
            log::error!("frame encode failed: {err}");
        }
        recording.last_pts = Some(pts);
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    /// The presentation timestamp `record` would assign right now, and
    /// whether it would be dropped as non-advancing.
    #[must_use]
    pub fn next_pts(&self) -> Option<(i64, bool)> {
        let guard = self.recording.lock();
        let recording = guard.as_ref()?;
        let frame_delay_ms = 1000.0 / f64::from(self.framerate);
        let elapsed_ms = recording.start_time.elapsed().as_secs_f64() * 1000.0;
        let pts = (elapsed_ms / frame_delay_ms) as i64;
        Some((pts, recording.last_pts.is_some_and(|last| pts <= last)))
    }
}

fn finish(recording: Recording) {
    let mut recording = recording;
    if let Err(err) = recording.encoder.finish() {
        log::error!("finishing recording failed: {err}");
    }
}

/// Repacks the RGBA screen into the RGB frame layout the encoder takes.
fn rgb_frame(surf: &Surface) -> Option<Array3<u8>> {
    let (w, h) = surf.size();
    let mut data = Vec::with_capacity(w as usize * h as usize * 3);
    for y in 0..h {
        for x in 0..w {
            let px = surf.rgba_at(x, y);
            data.extend_from_slice(&px[..3]);
        }
    }
    Array3::from_shape_vec((h as usize, w as usize, 3), data).ok()
}
