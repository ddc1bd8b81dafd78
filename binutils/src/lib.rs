//! Shared command line and logging glue for the workspace binaries.

pub use clap;
pub use clap_verbosity_flag as verbose;

use clap::builder::styling::{AnsiColor, Effects, Styles};

/// Clap help styles shared by all binaries.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr in a compact human format, or to `log_file` as JSON
/// lines when one is given.
pub fn logging_setup(max_level: &tracing::Level, log_file: Option<&std::fs::File>) {
    match log_file {
        Some(f) => {
            let f = f.try_clone().expect("cannot clone log file handle");
            tracing_subscriber::fmt()
                .with_max_level(*max_level)
                .json()
                .with_writer(std::sync::Mutex::new(f))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(*max_level)
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
