//! OSC dispatch engine.
//!
//! The engine is a pattern-addressed method table that is mutated at
//! runtime as layers are created and destroyed: [`MethodTable`] holds the
//! registered handlers, [`server::OscServer`] owns the UDP socket and the
//! background thread that decodes datagrams and dispatches them.

pub mod server;

use std::sync::Arc;

pub use rosc::OscType;

use crate::surface::Rect;

/// Opaque handle to a registered method, used for deregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(u64);

/// Handler outcome: `Handled` stops dispatch, `Continue` lets later
/// matching methods run (the generic dump handler returns `Continue`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Continue,
}

/// A registered message handler. Receives the concrete path and the
/// decoded argument vector.
pub type Handler = Arc<dyn Fn(&str, &[OscType]) -> Dispatch + Send + Sync>;

struct MethodEntry {
    id: MethodId,
    path: Option<String>,
    types: Option<String>,
    handler: Handler,
}

/// The method table: handlers keyed by (path, type-signature) pattern.
///
/// A `None` pattern matches everything, so the generic catch-all handler
/// is registered with `(None, None)`. Dispatch walks entries in
/// registration order, which puts the generic handler (installed first)
/// ahead of every specific method.
#[derive(Default)]
pub struct MethodTable {
    next_id: u64,
    entries: Vec<MethodEntry>,
}

impl MethodTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a handler. `path` and `types` may be `None` to match all.
    pub fn add_method(
        &mut self,
        path: Option<&str>,
        types: Option<&str>,
        handler: Handler,
    ) -> MethodId {
        self.next_id += 1;
        let id = MethodId(self.next_id);
        self.entries.push(MethodEntry {
            id,
            path: path.map(str::to_owned),
            types: types.map(str::to_owned),
            handler,
        });
        id
    }

    /// Removes a previously installed handler. Unknown ids are ignored.
    pub fn del_method(&mut self, id: MethodId) {
        self.entries.retain(|e| e.id != id);
    }

    /// Collects the handlers matching (path, types) in dispatch order.
    ///
    /// The caller invokes them after releasing the table lock, so handlers
    /// are free to register and deregister methods themselves.
    #[must_use]
    pub fn matches(&self, path: &str, types: &str) -> Vec<Handler> {
        self.entries
            .iter()
            .filter(|e| {
                e.path.as_deref().is_none_or(|p| p == path)
                    && e.types.as_deref().is_none_or(|t| t == types)
            })
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The type-tag string of an argument vector (`i`, `f`, `s`, ...).
#[must_use]
pub fn type_tags(args: &[OscType]) -> String {
    args.iter()
        .map(|a| match a {
            OscType::Int(_) => 'i',
            OscType::Float(_) => 'f',
            OscType::String(_) => 's',
            OscType::Long(_) => 'h',
            OscType::Double(_) => 'd',
            OscType::Blob(_) => 'b',
            OscType::Time(_) => 't',
            OscType::Char(_) => 'c',
            OscType::Bool(true) => 'T',
            OscType::Bool(false) => 'F',
            OscType::Nil => 'N',
            OscType::Inf => 'I',
            _ => '?',
        })
        .collect()
}

// ============================================================================
// Argument extraction
// ============================================================================
//
// Handlers are only invoked when the type signature matched, so these
// default to zero values instead of failing.

#[must_use]
pub fn int_arg(args: &[OscType], i: usize) -> i32 {
    match args.get(i) {
        Some(OscType::Int(v)) => *v,
        _ => 0,
    }
}

#[must_use]
pub fn float_arg(args: &[OscType], i: usize) -> f32 {
    match args.get(i) {
        Some(OscType::Float(v)) => *v,
        _ => 0.0,
    }
}

#[must_use]
pub fn str_arg(args: &[OscType], i: usize) -> &str {
    match args.get(i) {
        Some(OscType::String(v)) => v,
        _ => "",
    }
}

/// Reads three consecutive ints starting at `i` as an RGB color.
#[must_use]
pub fn color_arg(args: &[OscType], i: usize) -> crate::surface::Color {
    crate::surface::Color::new(
        int_arg(args, i).clamp(0, 255) as u8,
        int_arg(args, i + 1).clamp(0, 255) as u8,
        int_arg(args, i + 2).clamp(0, 255) as u8,
    )
}

/// Reads four consecutive ints starting at `i` as a geometry rect.
#[must_use]
pub fn rect_arg(args: &[OscType], i: usize) -> Rect {
    Rect::new(
        int_arg(args, i),
        int_arg(args, i + 1),
        int_arg(args, i + 2).max(0) as u32,
        int_arg(args, i + 3).max(0) as u32,
    )
}

/// One-line rendering of a message for the dump handler.
#[must_use]
pub fn format_message(path: &str, args: &[OscType]) -> String {
    use std::fmt::Write;

    let mut out = format!("{path} <{}>", type_tags(args));
    for arg in args {
        match arg {
            OscType::Int(v) => {
                let _ = write!(out, " {v}");
            }
            OscType::Float(v) => {
                let _ = write!(out, " {v}");
            }
            OscType::String(v) => {
                let _ = write!(out, " \"{v}\"");
            }
            other => {
                let _ = write!(out, " {other:?}");
            }
        }
    }
    out
}
