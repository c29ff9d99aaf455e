//! Runtime configuration.
//!
//! The compositor is configured once at startup from the command line;
//! the only values that change afterwards (fullscreen, cursor, OSC dump)
//! are toggled through the control surface keys.

use std::time::Duration;

use clap::Parser;

use crate::osc::server::DEFAULT_PORT;

pub const DEFAULT_SCREEN_WIDTH: u32 = 640;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 480;
pub const DEFAULT_SCREEN_BPP: u32 = 32;
pub const DEFAULT_FRAMERATE: u32 = 20; // Hz

/// Command-line flags. Single-dash short options only, matching the
/// classic invocation style of the tool.
#[derive(Debug, Parser)]
#[command(name = "lumen", version, about = "OSC-driven live-graphics compositor")]
pub struct Args {
    /// Listen on this OSC port
    #[arg(short = 'p', default_value = DEFAULT_PORT)]
    pub port: String,

    /// Toggle fullscreen
    #[arg(short = 'f')]
    pub fullscreen: bool,

    /// Toggle cursor displaying
    #[arg(short = 'c')]
    pub cursor: bool,

    /// Screen width in pixels
    #[arg(short = 'W', default_value_t = DEFAULT_SCREEN_WIDTH)]
    pub width: u32,

    /// Screen height in pixels
    #[arg(short = 'H', default_value_t = DEFAULT_SCREEN_HEIGHT)]
    pub height: u32,

    /// Screen bits per pixel
    #[arg(short = 'B', default_value_t = DEFAULT_SCREEN_BPP)]
    pub bpp: u32,

    /// Framerate in Hz
    #[arg(short = 'F', default_value_t = DEFAULT_FRAMERATE)]
    pub framerate: u32,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: String,
    pub fullscreen: bool,
    pub show_cursor: bool,
    pub width: u32,
    pub height: u32,
    pub bpp: u32,
    pub framerate: u32,
}

impl Settings {
    /// Delay between compositor ticks.
    #[must_use]
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(u64::from(1000 / self.framerate.max(1)))
    }

    #[must_use]
    pub fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_owned(),
            fullscreen: false,
            show_cursor: true,
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
            bpp: DEFAULT_SCREEN_BPP,
            framerate: DEFAULT_FRAMERATE,
        }
    }
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        let defaults = Settings::default();
        Self {
            port: args.port,
            // the flags toggle relative to the defaults
            fullscreen: defaults.fullscreen ^ args.fullscreen,
            show_cursor: defaults.show_cursor ^ args.cursor,
            width: args.width.max(1),
            height: args.height.max(1),
            bpp: args.bpp,
            framerate: args.framerate.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_delay_matches_framerate() {
        let settings = Settings::default();
        assert_eq!(settings.frame_delay(), Duration::from_millis(50));
    }

    #[test]
    fn cursor_and_fullscreen_flags_toggle_defaults() {
        let args = Args::parse_from(["lumen", "-f", "-c"]);
        let settings = Settings::from(args);
        assert!(settings.fullscreen);
        assert!(!settings.show_cursor);
    }
}
