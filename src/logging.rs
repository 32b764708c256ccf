//! Ambient logging setup (§4.10), gated behind the `devel` feature. This
//! crate only ever calls `log::{debug,info,warn,error}!`; wiring up a
//! concrete logger is left to whatever binary embeds it, via this helper.

#![cfg(feature = "devel")]

use console::style;
use log::{Level, LevelFilter};

fn styled_level(level: Level) -> console::StyledObject<Level> {
    match level {
        Level::Error => style(level).red(),
        Level::Warn => style(level).yellow(),
        Level::Info => style(level).green(),
        Level::Debug | Level::Trace => style(level).black().bright(),
    }
}

/// Installs a `fern` dispatcher writing leveled, colored output to stderr.
/// Call at most once, before any other part of this crate logs.
pub fn install_default_logger(verbosity: LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {}: {}",
                record.target(),
                styled_level(record.level()),
                message
            ))
        })
        .level(verbosity)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
