//! Layer Stack Integration Tests
//!
//! Tests for:
//! - LayerList: ordering, positional insert, removal by identity
//! - Render accounting: every listed layer drawn exactly once per tick
//! - Box layer z-order compositing
//! - Image layer: sentinel expansion, cache invalidation, setter order

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lumen::{Color, ImageLayer, Layer, LayerCell, LayerList, LayerRef, PixelFormat, Rect, Surface};

struct ProbeLayer {
    tag: &'static str,
    order: Arc<Mutex<Vec<&'static str>>>,
    frames: Arc<AtomicUsize>,
}

impl Layer for ProbeLayer {
    fn frame(&mut self, _target: &mut Surface) {
        self.order.lock().unwrap().push(self.tag);
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn geo(&mut self, _geo: Rect) {}

    fn alpha(&mut self, _opacity: f32) {}
}

fn probe(
    tag: &'static str,
    order: &Arc<Mutex<Vec<&'static str>>>,
) -> (LayerRef, Arc<AtomicUsize>) {
    let frames = Arc::new(AtomicUsize::new(0));
    let cell = LayerCell::new(
        tag,
        ProbeLayer {
            tag,
            order: Arc::clone(order),
            frames: Arc::clone(&frames),
        },
    );
    let layer: LayerRef = cell;
    (layer, frames)
}

fn write_png(dir: &tempfile::TempDir, name: &str, w: u32, h: u32, px: [u8; 4]) -> String {
    let path = dir.path().join(name);
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba(px));
    img.save(&path).unwrap();
    path.to_string_lossy().into_owned()
}

// ============================================================================
// LayerList ordering
// ============================================================================

#[test]
fn positional_insert_matches_sequential_application() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let list = LayerList::new();

    let (a, _) = probe("a", &order);
    let (b, _) = probe("b", &order);
    let (c, _) = probe("c", &order);
    let (d, _) = probe("d", &order);

    list.insert(0, a);
    list.insert(1, b);
    list.insert(1, c);
    list.insert(99, d); // clamps to the tail

    assert_eq!(list.names(), ["a", "c", "b", "d"]);
}

#[test]
fn remove_unlinks_by_identity_not_name() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let list = LayerList::new();

    let (first, _) = probe("x", &order);
    list.insert(0, Arc::clone(&first));
    assert!(list.remove(&first));
    assert!(!list.remove(&first));

    // a different layer under the same name is untouched by the stale ref
    let (second, _) = probe("x", &order);
    list.insert(0, Arc::clone(&second));
    assert!(!list.remove(&first));
    assert_eq!(list.len(), 1);
}

#[test]
fn render_draws_each_layer_exactly_once_in_list_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let list = LayerList::new();

    let (a, frames_a) = probe("a", &order);
    let (b, frames_b) = probe("b", &order);
    list.insert(0, a);
    list.insert(1, b);

    let mut target = Surface::new(8, 8, PixelFormat::Rgba8888);
    list.render(&mut target);
    list.render(&mut target);

    assert_eq!(frames_a.load(Ordering::SeqCst), 2);
    assert_eq!(frames_b.load(Ordering::SeqCst), 2);
    assert_eq!(*order.lock().unwrap(), ["a", "b", "a", "b"]);
}

#[test]
fn render_starts_from_an_opaque_black_target() {
    let list = LayerList::new();
    let mut target = Surface::new(2, 2, PixelFormat::Rgba8888);
    target.fill([99, 99, 99, 99]);
    list.render(&mut target);
    assert_eq!(target.rgba_at(1, 1), [0, 0, 0, 255]);
}

// ============================================================================
// Box layers: z-order
// ============================================================================

#[test]
fn two_boxes_composite_in_stack_order() {
    use lumen::BoxLayer;

    let list = LayerList::new();
    let red: LayerRef = LayerCell::new(
        "a",
        BoxLayer::new(Rect::new(0, 0, 100, 100), 1.0, Color::new(255, 0, 0)),
    );
    let blue: LayerRef = LayerCell::new(
        "b",
        BoxLayer::new(Rect::new(50, 50, 100, 100), 1.0, Color::new(0, 0, 255)),
    );
    list.insert(0, red);
    list.insert(1, blue);

    let mut target = Surface::new(200, 200, PixelFormat::Rgba8888);
    list.render(&mut target);

    assert_eq!(target.rgba_at(25, 25), [255, 0, 0, 255]); // red only
    assert_eq!(target.rgba_at(75, 75), [0, 0, 255, 255]); // blue over red
    assert_eq!(target.rgba_at(25, 75), [255, 0, 0, 255]); // red beside blue
    assert_eq!(target.rgba_at(125, 125), [0, 0, 255, 255]); // blue only
    assert_eq!(target.rgba_at(175, 175), [0, 0, 0, 255]); // background
}

// ============================================================================
// Image layer caches
// ============================================================================

#[test]
fn zero_rect_expands_to_screen_size() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(&dir, "flat.png", 8, 8, [50, 100, 150, 255]);

    let layer = ImageLayer::new((64, 48), Rect::ZERO, 1.0, &file);
    let scaled = layer.scaled().expect("zero rect must scale to screen");
    assert_eq!(scaled.size(), (64, 48));
}

#[test]
fn geometry_scaling_is_cached_and_survives_alpha_changes() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(&dir, "src.png", 200, 200, [10, 20, 30, 255]);

    let mut layer = ImageLayer::new((640, 480), Rect::new(0, 0, 100, 100), 1.0, &file);

    let scaled = layer.scaled().expect("geometry differs from source");
    assert_eq!(scaled.size(), (100, 100));
    assert!(layer.alpha_composited().is_none());
    let scaled_ptr = scaled.pixels().as_ptr();

    // a pure opacity change rebuilds only the alpha-composited copy
    layer.alpha(0.5);
    assert!(layer.alpha_composited().is_some());
    assert_eq!(
        layer.scaled().map(|s| s.pixels().as_ptr()),
        Some(scaled_ptr)
    );

    // matching geometry is a no-op for the caches
    layer.geo(Rect::new(0, 0, 100, 100));
    assert_eq!(
        layer.scaled().map(|s| s.pixels().as_ptr()),
        Some(scaled_ptr)
    );

    // a new geometry invalidates both derived surfaces
    layer.geo(Rect::new(0, 0, 50, 50));
    assert_eq!(layer.scaled().map(Surface::size), Some((50, 50)));
}

#[test]
fn opaque_alpha_drops_the_composited_copy() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(&dir, "src.png", 16, 16, [10, 20, 30, 255]);

    let mut layer = ImageLayer::new((640, 480), Rect::new(0, 0, 8, 8), 0.5, &file);
    assert!(layer.alpha_composited().is_some());

    layer.alpha(1.0);
    assert!(layer.alpha_composited().is_none());
}

#[test]
fn setter_order_does_not_change_the_rendered_output() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(&dir, "src.png", 32, 32, [200, 100, 50, 255]);
    let geo = Rect::new(4, 4, 16, 16);

    let mut forward = ImageLayer::new((64, 64), Rect::ZERO, 1.0, "");
    forward.file(&file);
    forward.geo(geo);
    forward.alpha(0.5);

    let mut reverse = ImageLayer::new((64, 64), Rect::ZERO, 1.0, "");
    reverse.alpha(0.5);
    reverse.geo(geo);
    reverse.file(&file);

    let mut out_a = Surface::new(64, 64, PixelFormat::Rgba8888);
    out_a.fill([0, 0, 0, 255]);
    forward.frame(&mut out_a);

    let mut out_b = Surface::new(64, 64, PixelFormat::Rgba8888);
    out_b.fill([0, 0, 0, 255]);
    reverse.frame(&mut out_b);

    assert_eq!(out_a.pixels(), out_b.pixels());
}

#[test]
fn empty_file_clears_all_caches() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_png(&dir, "src.png", 16, 16, [1, 2, 3, 255]);

    let mut layer = ImageLayer::new((64, 64), Rect::new(0, 0, 8, 8), 0.5, &file);
    assert!(layer.source().is_some());

    layer.file("");
    assert!(layer.source().is_none());
    assert!(layer.scaled().is_none());
    assert!(layer.alpha_composited().is_none());

    // rendering with no source is a no-op
    let mut target = Surface::new(8, 8, PixelFormat::Rgba8888);
    target.fill([7, 7, 7, 255]);
    layer.frame(&mut target);
    assert_eq!(target.rgba_at(0, 0), [7, 7, 7, 255]);
}
