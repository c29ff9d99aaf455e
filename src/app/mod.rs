//! Application context and compositor loop.
//!
//! [`App`] owns every subsystem (the screen surface, the layer stack,
//! the OSC server, the recorder and the runtime flags) and threads them
//! to each other explicitly on construction. The winit event loop drives
//! the fixed-cadence tick: poll input, render the stack, feed the
//! recorder, present the backbuffer, wait for the next tick boundary.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::config::{Settings, DEFAULT_SCREEN_BPP};
use crate::errors::{LumenError, Result};
use crate::layer::{box_layer, image, text, video, LayerList};
use crate::osc::server::OscServer;
use crate::recorder::Recorder;
use crate::surface::{PixelFormat, Surface};

struct Gfx {
    // the context must stay alive for the surface to present
    _context: softbuffer::Context<Arc<Window>>,
    surface: softbuffer::Surface<Arc<Window>, Arc<Window>>,
}

pub struct App {
    settings: Settings,

    screen: Surface,
    layers: Arc<LayerList>,
    server: Arc<OscServer>,
    recorder: Arc<Recorder>,
    dump_osc: Arc<AtomicBool>,

    window: Option<Arc<Window>>,
    gfx: Option<Gfx>,
    fullscreen: bool,
    cursor_visible: bool,
    next_tick: Instant,
    fatal: Option<LumenError>,
}

impl App {
    /// Builds the subsystems. No sockets or windows are created yet;
    /// that happens in [`run`](Self::run).
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        if let Err(err) = video_rs::init() {
            log::warn!("media backend init failed: {err}");
        }

        let dump_osc = Arc::new(AtomicBool::new(false));
        let server = OscServer::new(Arc::clone(&dump_osc));
        let layers = Arc::new(LayerList::new());
        let recorder = Recorder::new(settings.width, settings.height, settings.framerate);
        let screen = Surface::new(settings.width, settings.height, PixelFormat::Rgba8888);

        let fullscreen = settings.fullscreen;
        let cursor_visible = settings.show_cursor;

        Self {
            settings,
            screen,
            layers,
            server,
            recorder,
            dump_osc,
            window: None,
            gfx: None,
            fullscreen,
            cursor_visible,
            next_tick: Instant::now(),
            fatal: None,
        }
    }

    /// Opens the control socket, registers the layer kinds and the
    /// recorder, and runs the compositor loop until exit.
    pub fn run(mut self) -> Result<()> {
        if self.settings.bpp != DEFAULT_SCREEN_BPP {
            log::warn!(
                "only {DEFAULT_SCREEN_BPP} bpp output is supported, ignoring -B {}",
                self.settings.bpp
            );
        }

        self.server.open(&self.settings.port)?;
        log::info!("listening for OSC on port {}", self.settings.port);

        self.recorder.register_methods(&self.server);

        let screen_size = self.settings.screen_size();
        image::register(&self.server, &self.layers, screen_size);
        video::register(&self.server, &self.layers, screen_size);
        box_layer::register(&self.server, &self.layers);
        text::register(&self.server, &self.layers, screen_size);

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        self.next_tick = Instant::now();
        event_loop.run_app(&mut self)?;

        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// One compositor tick: render the stack, feed the recorder, present.
    fn tick(&mut self) {
        self.layers.render(&mut self.screen);
        self.recorder.record(&self.screen);
        self.present();
    }

    fn present(&mut self) {
        let Some(gfx) = self.gfx.as_mut() else {
            return;
        };

        let (width, height) = self.screen.size();
        let (Some(nw), Some(nh)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return;
        };
        if let Err(err) = gfx.surface.resize(nw, nh) {
            log::error!("backbuffer resize failed: {err}");
            return;
        }

        match gfx.surface.buffer_mut() {
            Ok(mut buffer) => {
                for (dst, src) in buffer.iter_mut().zip(self.screen.pixels().chunks_exact(4)) {
                    *dst = (u32::from(src[0]) << 16) | (u32::from(src[1]) << 8) | u32::from(src[2]);
                }
                if let Err(err) = buffer.present() {
                    log::error!("present failed: {err}");
                }
            }
            Err(err) => log::error!("backbuffer unavailable: {err}"),
        }
    }

    fn handle_key(&mut self, code: KeyCode, event_loop: &ActiveEventLoop) {
        match code {
            KeyCode::F11 => {
                self.fullscreen = !self.fullscreen;
                if let Some(window) = &self.window {
                    window.set_fullscreen(
                        self.fullscreen.then(|| Fullscreen::Borderless(None)),
                    );
                }
            }
            KeyCode::F10 => {
                self.cursor_visible = !self.cursor_visible;
                if let Some(window) = &self.window {
                    window.set_cursor_visible(self.cursor_visible);
                }
            }
            KeyCode::F9 => {
                let was = self.dump_osc.fetch_xor(true, Ordering::Relaxed);
                log::info!("OSC dump {}", if was { "off" } else { "on" });
            }
            KeyCode::Escape => event_loop.exit(),
            _ => {}
        }
    }

    fn shutdown(&mut self) {
        self.server.stop();
        self.recorder.stop();
        for layer in self.layers.drain() {
            for id in layer.take_registrations() {
                self.server.del_method(id);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut attrs = Window::default_attributes()
            .with_title("Lumen Compositor")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.settings.width,
                self.settings.height,
            ))
            .with_resizable(false);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fatal = Some(err.into());
                event_loop.exit();
                return;
            }
        };
        window.set_cursor_visible(self.cursor_visible);

        let gfx = softbuffer::Context::new(Arc::clone(&window)).and_then(|context| {
            let surface = softbuffer::Surface::new(&context, Arc::clone(&window))?;
            Ok(Gfx {
                _context: context,
                surface,
            })
        });
        match gfx {
            Ok(gfx) => {
                log::info!(
                    "presenting {}x{} via software backbuffer",
                    self.settings.width,
                    self.settings.height
                );
                self.gfx = Some(gfx);
                self.window = Some(window);
            }
            Err(err) => {
                self.fatal = Some(err.into());
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code, event_loop),
            WindowEvent::RedrawRequested => self.tick(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_tick {
            let delay = self.settings.frame_delay();
            self.next_tick += delay;
            if self.next_tick <= now {
                // a stalled tick does not cause a burst of catch-up frames
                self.next_tick = now + delay;
            }
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_tick));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
