//! The OSC server: socket ownership, receive thread and dispatch.
//!
//! All dispatch runs on the receive thread. Handlers matched against an
//! incoming message are cloned out of the method table before being
//! invoked, so a running handler is free to register and deregister
//! methods; the layer create/delete handlers rely on that.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use rosc::{OscMessage, OscPacket};

use crate::errors::{LumenError, Result};
use crate::layer::{Layer, LayerCell, LayerList, LayerRef};
use crate::osc::{
    float_arg, format_message, int_arg, rect_arg, str_arg, type_tags, Dispatch, Handler, MethodId,
    MethodTable, OscType,
};
use crate::surface::Rect;

/// Default control port.
pub const DEFAULT_PORT: &str = "7770";

/// Common prefix of every layer constructor signature:
/// position, name, geometry, alpha.
pub const NEW_LAYER_TYPES: &str = "isiiiif";

/// A layer-kind constructor invoked by `/layer/new/<kind>`. Receives the
/// server (for method registration), the layer name, geometry, opacity
/// and the kind-specific argument tail.
pub type LayerCtor = Arc<dyn Fn(&Arc<OscServer>, &str, Rect, f32, &[OscType]) -> LayerRef + Send + Sync>;

pub struct OscServer {
    methods: Mutex<MethodTable>,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<std::net::SocketAddr>>,
}

impl OscServer {
    /// Creates the server and installs the generic catch-all handler,
    /// which dumps messages when `dump` is set and always lets dispatch
    /// continue.
    #[must_use]
    pub fn new(dump: Arc<AtomicBool>) -> Arc<Self> {
        let server = Arc::new(Self {
            methods: Mutex::new(MethodTable::new()),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
            local_addr: Mutex::new(None),
        });

        server.add_method(
            None,
            None,
            Arc::new(move |path, args| {
                if dump.load(Ordering::Relaxed) {
                    log::info!("osc: {}", format_message(path, args));
                }
                Dispatch::Continue
            }),
        );

        server
    }

    /// Binds the UDP socket and starts the receive thread. Fails if the
    /// server is already open.
    pub fn open(self: &Arc<Self>, port: &str) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(LumenError::ServerAlreadyOpen);
        }

        let socket = UdpSocket::bind(format!("0.0.0.0:{port}")).map_err(|source| {
            self.running.store(false, Ordering::SeqCst);
            LumenError::SocketBind {
                port: port.to_owned(),
                source,
            }
        })?;
        // bounded blocking so stop() is observed promptly
        if let Err(err) = socket.set_read_timeout(Some(Duration::from_millis(100))) {
            self.running.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        *self.local_addr.lock() = socket.local_addr().ok();

        let thread = std::thread::spawn({
            let server = Arc::clone(self);
            move || server.recv_loop(&socket)
        });
        *self.thread.lock() = Some(thread);

        Ok(())
    }

    /// The bound socket address, once open. Port `0` binds an ephemeral
    /// port, which this reports.
    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        *self.local_addr.lock()
    }

    /// Stops the receive thread and waits for it to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }

    fn recv_loop(&self, socket: &UdpSocket) {
        let mut buf = [0u8; rosc::decoder::MTU];

        while self.running.load(Ordering::Relaxed) {
            match socket.recv_from(&mut buf) {
                Ok((len, _peer)) => match rosc::decoder::decode_udp(&buf[..len]) {
                    Ok((_rest, packet)) => self.dispatch_packet(packet),
                    Err(err) => log::warn!("malformed OSC datagram: {err}"),
                },
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => {
                    log::error!("OSC receive failed: {err}");
                    break;
                }
            }
        }
    }

    fn dispatch_packet(&self, packet: OscPacket) {
        match packet {
            OscPacket::Message(msg) => self.dispatch_message(&msg),
            OscPacket::Bundle(bundle) => {
                for inner in bundle.content {
                    self.dispatch_packet(inner);
                }
            }
        }
    }

    fn dispatch_message(&self, msg: &OscMessage) {
        let types = type_tags(&msg.args);
        // handlers are invoked after the table lock is released
        let handlers = self.methods.lock().matches(&msg.addr, &types);
        for handler in handlers {
            if handler(&msg.addr, &msg.args) == Dispatch::Handled {
                break;
            }
        }
    }

    /// Synchronous dispatch entry, bypassing the socket. Used by tests
    /// and by anything that wants to inject control messages in-process.
    pub fn dispatch(&self, path: &str, args: &[OscType]) {
        self.dispatch_message(&OscMessage {
            addr: path.to_owned(),
            args: args.to_vec(),
        });
    }

    /// Installs a raw handler. `path`/`types` may be `None` to match all.
    pub fn add_method(&self, path: Option<&str>, types: Option<&str>, handler: Handler) -> MethodId {
        self.methods.lock().add_method(path, types, handler)
    }

    /// Removes a handler by id.
    pub fn del_method(&self, id: MethodId) {
        self.methods.lock().del_method(id);
    }

    /// Number of installed methods (including the generic handler).
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.lock().len()
    }

    /// Installs `/layer/<name>/<method>` with a wrapper that locks the
    /// layer around the callback. The returned id is not yet tracked on
    /// the cell; callers push it onto the cell's registration list.
    pub fn register_method<L, F>(
        self: &Arc<Self>,
        cell: &Arc<LayerCell<L>>,
        method: &str,
        types: &str,
        callback: F,
    ) -> MethodId
    where
        L: Layer + 'static,
        F: Fn(&mut L, &[OscType]) + Send + Sync + 'static,
    {
        let path = format!("/layer/{}/{}", cell.name(), method);
        let cell = Arc::clone(cell);
        self.add_method(
            Some(&path),
            Some(types),
            Arc::new(move |_path, args| {
                let mut body = cell.body.lock();
                callback(&mut body, args);
                Dispatch::Handled
            }),
        )
    }

    /// Installs the `geo` and `alpha` methods every layer carries.
    pub fn register_layer_defaults<L: Layer + 'static>(
        self: &Arc<Self>,
        cell: &Arc<LayerCell<L>>,
    ) {
        let id = self.register_method(cell, "geo", "iiii", |layer, args| {
            layer.geo(rect_arg(args, 0));
        });
        cell.push_registration(id);

        let id = self.register_method(cell, "alpha", "f", |layer, args| {
            layer.alpha(float_arg(args, 0));
        });
        cell.push_registration(id);
    }

    /// Installs a layer-kind constructor under `/layer/new/<kind>` with
    /// the full signature `is iiii f <ctor_types>`.
    ///
    /// On receipt the wrapper builds the layer, inserts it into the list
    /// at the requested position and installs `/layer/<name>/delete`,
    /// which unlinks the layer and drops every method it registered.
    pub fn register_layer(
        self: &Arc<Self>,
        kind: &str,
        ctor_types: &str,
        list: &Arc<LayerList>,
        ctor: LayerCtor,
    ) {
        let path = format!("/layer/new/{kind}");
        let types = format!("{NEW_LAYER_TYPES}{ctor_types}");

        let weak = Arc::downgrade(self);
        let list = Arc::clone(list);

        self.add_method(
            Some(&path),
            Some(&types),
            Arc::new(move |_path, args| {
                let Some(server) = weak.upgrade() else {
                    return Dispatch::Handled;
                };

                let pos = int_arg(args, 0).max(0) as usize;
                let name = str_arg(args, 1);
                let geo = rect_arg(args, 2);
                let opacity = float_arg(args, 6);
                let tail = args.get(7..).unwrap_or(&[]);

                if name.is_empty() || name.contains('/') {
                    log::warn!("rejecting layer with invalid name {name:?}");
                    return Dispatch::Handled;
                }
                if list.contains_name(name) {
                    log::warn!("layer {name:?} already exists");
                    return Dispatch::Handled;
                }

                let layer = ctor(&server, name, geo, opacity, tail);
                list.insert(pos, Arc::clone(&layer));
                install_delete_handler(&server, &list, &layer);

                Dispatch::Handled
            }),
        );
    }
}

/// Installs `/layer/<name>/delete`. The handler owns the layer reference
/// exclusively between unlink and teardown, so a deleted layer is gone
/// from the render path before its methods disappear from the table.
fn install_delete_handler(server: &Arc<OscServer>, list: &Arc<LayerList>, layer: &LayerRef) {
    let path = format!("/layer/{}/delete", layer.name());

    let weak = Arc::downgrade(server);
    let list = Arc::clone(list);
    let layer = Arc::clone(layer);

    let id = server.add_method(
        Some(&path),
        Some(""),
        Arc::new(move |_path, _args| {
            let Some(server) = weak.upgrade() else {
                return Dispatch::Handled;
            };
            if list.remove(&layer) {
                for id in layer.take_registrations() {
                    server.del_method(id);
                }
            }
            Dispatch::Handled
        }),
    );
    layer.push_registration(id);
}
