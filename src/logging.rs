use std::io::Write;

use chrono::Local;
use log::LevelFilter;

/// Initializes the global logger.
///
/// `RUST_LOG` takes precedence over `level` when set. Each line carries a local
/// RFC 3339 timestamp, the level and the emitting module.
pub fn init(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        });

    if builder.try_init().is_err() {
        eprintln!("Logger already initialized");
    }
}
