//! Error Types
//!
//! This module defines the error types used throughout the compositor.
//!
//! The main error type [`LumenError`] covers all failure modes including:
//! - Control-socket and window-system initialization failures
//! - Media loading and decoding errors
//! - Recorder open/encode errors
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, LumenError>`.

use thiserror::Error;

/// The main error type for the compositor.
#[derive(Error, Debug)]
pub enum LumenError {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// Failed to bind the OSC control socket.
    #[error("Failed to bind OSC socket on port {port}: {source}")]
    SocketBind {
        /// The port string the bind was attempted on
        port: String,
        /// The underlying socket error
        source: std::io::Error,
    },

    /// The OSC server is already listening.
    #[error("OSC server is already open")]
    ServerAlreadyOpen,

    /// Event loop error (winit).
    #[error("Event loop error: {0}")]
    EventLoopError(#[from] winit::error::EventLoopError),

    /// Window creation error.
    #[error("Window system error: {0}")]
    WindowError(#[from] winit::error::OsError),

    /// Software presentation error (softbuffer).
    #[error("Presentation error: {0}")]
    PresentError(String),

    // ========================================================================
    // Media Errors
    // ========================================================================
    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),

    /// A media URL could not be opened for playback.
    #[error("Media open error: {0}")]
    MediaOpenError(String),

    /// Font file could not be loaded or parsed.
    #[error("Font load error: {0}")]
    FontLoadError(String),

    // ========================================================================
    // Recorder Errors
    // ========================================================================
    /// The recorder output could not be opened.
    #[error("Recorder open error: {0}")]
    RecorderOpenError(String),

    /// The requested codec is not supported by the encoder backend.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Screen dimensions the encoder cannot accept.
    #[error("Recorder requires even screen dimensions, got {width}x{height}")]
    OddRecorderDimensions {
        /// Screen width in pixels
        width: u32,
        /// Screen height in pixels
        height: u32,
    },

    // ========================================================================
    // I/O & Protocol Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed OSC datagram.
    #[error("OSC decode error: {0}")]
    OscDecodeError(String),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for LumenError {
    fn from(err: image::ImageError) -> Self {
        LumenError::ImageDecodeError(err.to_string())
    }
}

impl From<video_rs::Error> for LumenError {
    fn from(err: video_rs::Error) -> Self {
        LumenError::MediaOpenError(err.to_string())
    }
}

impl From<rosc::OscError> for LumenError {
    fn from(err: rosc::OscError) -> Self {
        LumenError::OscDecodeError(err.to_string())
    }
}

impl From<softbuffer::SoftBufferError> for LumenError {
    fn from(err: softbuffer::SoftBufferError) -> Self {
        LumenError::PresentError(err.to_string())
    }
}

/// Alias for `Result<T, LumenError>`.
pub type Result<T> = std::result::Result<T, LumenError>;
