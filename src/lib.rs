#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod app;
pub mod config;
pub mod errors;
pub mod layer;
pub mod osc;
pub mod pixels;
pub mod recorder;
pub mod surface;

pub use app::App;
pub use config::Settings;
pub use errors::{LumenError, Result};
pub use layer::box_layer::BoxLayer;
pub use layer::image::ImageLayer;
pub use layer::text::{FontStyle, TextLayer};
pub use layer::video::VideoLayer;
pub use layer::{alpha_byte, Layer, LayerCell, LayerList, LayerRef};
pub use osc::server::OscServer;
pub use recorder::Recorder;
pub use surface::{Color, PixelFormat, Rect, Surface, SurfaceAlpha};
