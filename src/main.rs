use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use lumen::app::App;
use lumen::config::{Args, Settings};

fn main() -> ExitCode {
    init_logging();

    let settings = Settings::from(Args::parse());
    match App::new(settings).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics carry source-file and line context.
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{}({}): {}: {}",
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();
}
