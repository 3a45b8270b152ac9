//! Logging setup for the generator binary

use log::LevelFilter;

/// Level selected by `-v`/`-q` counts; warnings are always shown unless quieted
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialize the logger at `level`. RUST_LOG, when set, takes precedence.
/// Lines start with `\r` so they stay readable while the terminal is in raw mode.
pub fn init_logger(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "\r[{} {:5} {}] {}",
                buf.timestamp(),
                record.level(),
                record.module_path().unwrap_or("wavegen"),
                record.args()
            )
        })
        .init();
}
