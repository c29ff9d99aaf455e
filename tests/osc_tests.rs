//! OSC Dispatch Integration Tests
//!
//! Tests for:
//! - Layer create / parameter / delete flows through the method table
//! - Stale and unknown messages being dropped without side effects
//! - Name reuse after delete
//! - The loopback UDP receive path

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};

use lumen::layer::box_layer;
use lumen::osc::Dispatch;
use lumen::{LayerList, OscServer, PixelFormat, Surface};

fn new_engine() -> (Arc<OscServer>, Arc<LayerList>, Arc<AtomicBool>) {
    let dump = Arc::new(AtomicBool::new(false));
    let server = OscServer::new(Arc::clone(&dump));
    let list = Arc::new(LayerList::new());
    box_layer::register(&server, &list);
    (server, list, dump)
}

fn new_box_args(pos: i32, name: &str, geo: (i32, i32, i32, i32), rgb: (i32, i32, i32)) -> Vec<OscType> {
    vec![
        OscType::Int(pos),
        OscType::String(name.to_owned()),
        OscType::Int(geo.0),
        OscType::Int(geo.1),
        OscType::Int(geo.2),
        OscType::Int(geo.3),
        OscType::Float(1.0),
        OscType::Int(rgb.0),
        OscType::Int(rgb.1),
        OscType::Int(rgb.2),
    ]
}

// ============================================================================
// Create / parameter / delete
// ============================================================================

#[test]
fn create_inserts_at_the_requested_position() {
    let (server, list, _dump) = new_engine();

    server.dispatch("/layer/new/box", &new_box_args(0, "a", (0, 0, 10, 10), (255, 0, 0)));
    server.dispatch("/layer/new/box", &new_box_args(0, "b", (0, 0, 10, 10), (0, 255, 0)));
    server.dispatch("/layer/new/box", &new_box_args(1, "c", (0, 0, 10, 10), (0, 0, 255)));

    assert_eq!(list.names(), ["b", "c", "a"]);
}

#[test]
fn parameter_changes_are_visible_on_the_next_render() {
    let (server, list, _dump) = new_engine();
    server.dispatch("/layer/new/box", &new_box_args(0, "a", (0, 0, 4, 4), (255, 0, 0)));

    let mut target = Surface::new(4, 4, PixelFormat::Rgba8888);
    list.render(&mut target);
    assert_eq!(target.rgba_at(0, 0), [255, 0, 0, 255]);

    server.dispatch(
        "/layer/a/color",
        &[OscType::Int(0), OscType::Int(255), OscType::Int(0)],
    );
    list.render(&mut target);
    assert_eq!(target.rgba_at(0, 0), [0, 255, 0, 255]);
}

#[test]
fn geo_and_alpha_methods_are_installed_for_every_layer() {
    let (server, list, _dump) = new_engine();
    server.dispatch("/layer/new/box", &new_box_args(0, "a", (0, 0, 2, 2), (255, 255, 255)));

    server.dispatch(
        "/layer/a/geo",
        &[OscType::Int(1), OscType::Int(1), OscType::Int(1), OscType::Int(1)],
    );
    server.dispatch("/layer/a/alpha", &[OscType::Float(0.5)]);

    let mut target = Surface::new(4, 4, PixelFormat::Rgba8888);
    list.render(&mut target);
    assert_eq!(target.rgba_at(0, 0), [0, 0, 0, 255]); // moved away
    assert_eq!(target.rgba_at(1, 1)[0], 128); // alpha 0.5 applied
}

#[test]
fn delete_removes_the_layer_and_its_methods() {
    let (server, list, _dump) = new_engine();

    let baseline = server.method_count();
    server.dispatch("/layer/new/box", &new_box_args(0, "x", (0, 0, 4, 4), (255, 0, 0)));
    assert_eq!(list.len(), 1);
    assert!(server.method_count() > baseline);

    server.dispatch("/layer/x/delete", &[]);
    assert_eq!(list.len(), 0);
    assert_eq!(server.method_count(), baseline);

    // a stale parameter message is silently dropped
    server.dispatch("/layer/x/alpha", &[OscType::Float(0.5)]);

    // the name is free for reuse
    server.dispatch("/layer/new/box", &new_box_args(0, "x", (0, 0, 4, 4), (0, 255, 0)));
    assert_eq!(list.len(), 1);
}

#[test]
fn duplicate_names_are_rejected() {
    let (server, list, _dump) = new_engine();

    server.dispatch("/layer/new/box", &new_box_args(0, "a", (0, 0, 4, 4), (255, 0, 0)));
    server.dispatch("/layer/new/box", &new_box_args(1, "a", (0, 0, 4, 4), (0, 255, 0)));

    assert_eq!(list.len(), 1);

    let mut target = Surface::new(4, 4, PixelFormat::Rgba8888);
    list.render(&mut target);
    assert_eq!(target.rgba_at(0, 0), [255, 0, 0, 255]); // the first one won
}

#[test]
fn mistyped_messages_do_not_reach_handlers() {
    let (server, list, _dump) = new_engine();
    server.dispatch("/layer/new/box", &new_box_args(0, "a", (0, 0, 4, 4), (255, 0, 0)));

    // wrong signature for /alpha: dropped, layer state unchanged
    server.dispatch("/layer/a/alpha", &[OscType::Int(0)]);

    let mut target = Surface::new(4, 4, PixelFormat::Rgba8888);
    list.render(&mut target);
    assert_eq!(target.rgba_at(0, 0), [255, 0, 0, 255]);
}

// ============================================================================
// Generic handler
// ============================================================================

#[test]
fn unknown_paths_are_dropped_and_dispatch_continues() {
    let (server, _list, dump) = new_engine();

    let hits = Arc::new(AtomicUsize::new(0));
    let probe_hits = Arc::clone(&hits);
    server.add_method(
        Some("/probe"),
        Some(""),
        Arc::new(move |_path, _args| {
            probe_hits.fetch_add(1, Ordering::SeqCst);
            Dispatch::Handled
        }),
    );

    // dump off: the unknown path is silently dropped
    server.dispatch("/nothing/here", &[OscType::Int(1)]);
    // dump on: still dropped, and later dispatches keep working
    dump.store(true, Ordering::Relaxed);
    server.dispatch("/nothing/here", &[OscType::Int(1)]);

    server.dispatch("/probe", &[]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ============================================================================
// UDP receive path
// ============================================================================

fn send_udp(port: u16, path: &str, args: Vec<OscType>) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let packet = OscPacket::Message(OscMessage {
        addr: path.to_owned(),
        args,
    });
    let bytes = rosc::encoder::encode(&packet).unwrap();
    socket.send_to(&bytes, ("127.0.0.1", port)).unwrap();
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn datagrams_create_and_delete_layers() {
    let (server, list, _dump) = new_engine();
    server.open("0").unwrap();
    let port = server.local_addr().unwrap().port();

    send_udp(port, "/layer/new/box", new_box_args(0, "net", (0, 0, 8, 8), (1, 2, 3)));
    assert!(wait_for(|| list.len() == 1), "layer was not created");

    send_udp(port, "/layer/net/delete", vec![]);
    assert!(wait_for(|| list.is_empty()), "layer was not deleted");

    // malformed datagrams must not kill the receive thread
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(b"not osc at all", ("127.0.0.1", port)).unwrap();

    send_udp(port, "/layer/new/box", new_box_args(0, "again", (0, 0, 8, 8), (1, 2, 3)));
    assert!(wait_for(|| list.len() == 1), "receive thread died");

    server.stop();
}

#[test]
fn open_twice_is_an_error() {
    let (server, _list, _dump) = new_engine();
    server.open("0").unwrap();
    assert!(server.open("0").is_err());
    server.stop();
}
