//! The layer stack.
//!
//! A layer is one visible element of the compositing stack. Concrete layer
//! kinds (box, image, text, video) implement [`Layer`] and live inside a
//! [`LayerCell`], which pairs the layer body with its lock and its OSC
//! method registrations. The [`LayerList`] owns the compositing order.
//!
//! Locking discipline: list lock, then layer lock, then (video only) the
//! decode-buffer lock. The render thread takes layer locks only while
//! holding the list lock; OSC parameter handlers take a single layer lock
//! and never the list lock.

pub mod box_layer;
pub mod image;
pub mod text;
pub mod video;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::osc::MethodId;
use crate::surface::{Rect, Surface};

/// The capability set the renderer needs from every layer.
///
/// `frame` is only safe against concurrent parameter changes because the
/// caller holds the layer lock around the call.
pub trait Layer: Send {
    /// Draws the layer into `target`, honoring its current geometry rect
    /// and opacity.
    fn frame(&mut self, target: &mut Surface);

    /// Installs new geometry, expanding the zero-rect sentinel.
    fn geo(&mut self, geo: Rect);

    /// Installs a new opacity in `[0.0, 1.0]`.
    fn alpha(&mut self, opacity: f32);
}

/// Translates a float opacity into the applied alpha byte.
///
/// Uses `ceil`, so the mapping is monotonic with `0.0 -> 0` and
/// `1.0 -> 255`.
#[must_use]
pub fn alpha_byte(opacity: f32) -> u8 {
    (opacity.clamp(0.0, 1.0) * 255.0).ceil() as u8
}

/// A named, lockable cell holding one layer.
///
/// The cell also tracks the layer's OSC method registrations so that the
/// delete path can drop all of them atomically with respect to new
/// dispatches.
pub struct LayerCell<L: Layer + ?Sized> {
    name: String,
    registrations: Mutex<Vec<MethodId>>,
    pub body: Mutex<L>,
}

/// A shared, type-erased layer handle. `Arc` identity doubles as the
/// node identity used for removal.
pub type LayerRef = Arc<LayerCell<dyn Layer>>;

impl<L: Layer> LayerCell<L> {
    pub fn new(name: impl Into<String>, body: L) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            registrations: Mutex::new(Vec::new()),
            body: Mutex::new(body),
        })
    }
}

impl<L: Layer + ?Sized> LayerCell<L> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push_registration(&self, id: MethodId) {
        self.registrations.lock().push(id);
    }

    /// Drains the registration list for deregistration.
    #[must_use]
    pub fn take_registrations(&self) -> Vec<MethodId> {
        std::mem::take(&mut *self.registrations.lock())
    }
}

/// Ordered list of layers with per-element locks and locked iteration.
///
/// The front of the list is drawn first, i.e. it is the bottom of the
/// stack.
#[derive(Default)]
pub struct LayerList {
    layers: Mutex<Vec<LayerRef>>,
}

impl LayerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splices `layer` in `pos` steps from the head, or at the tail if the
    /// list is shorter.
    pub fn insert(&self, pos: usize, layer: LayerRef) {
        let mut layers = self.layers.lock();
        let pos = pos.min(layers.len());
        layers.insert(pos, layer);
    }

    /// Unlinks the node identified by `Arc` identity. Returns whether the
    /// layer was present.
    ///
    /// Once this returns, no future render tick will reference the layer;
    /// the caller owns the reference exclusively and may tear it down.
    pub fn remove(&self, layer: &LayerRef) -> bool {
        let mut layers = self.layers.lock();
        let before = layers.len();
        layers.retain(|l| !Arc::ptr_eq(l, layer));
        layers.len() != before
    }

    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.layers.lock().iter().any(|l| l.name() == name)
    }

    /// Snapshot of the layer names in compositing order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.layers.lock().iter().map(|l| l.name().to_owned()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.lock().is_empty()
    }

    /// Drains the list, returning the removed layers for teardown.
    #[must_use]
    pub fn drain(&self) -> Vec<LayerRef> {
        std::mem::take(&mut *self.layers.lock())
    }

    /// Fills `target` with opaque black, then walks the list head to tail,
    /// locking each layer around its `frame` call.
    pub fn render(&self, target: &mut Surface) {
        target.fill([0, 0, 0, 255]);

        let layers = self.layers.lock();
        for cell in layers.iter() {
            let mut body = cell.body.lock();
            body.frame(target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_byte_endpoints_and_ceil() {
        assert_eq!(alpha_byte(0.0), 0);
        assert_eq!(alpha_byte(1.0), 255);
        // any nonzero opacity maps to a nonzero byte
        assert_eq!(alpha_byte(0.001), 1);
        assert_eq!(alpha_byte(0.5), 128);
    }

    #[test]
    fn alpha_byte_is_monotonic() {
        let mut last = 0;
        for i in 0..=100 {
            let b = alpha_byte(i as f32 / 100.0);
            assert!(b >= last);
            last = b;
        }
    }
}
