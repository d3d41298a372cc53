use std::io::Write;

use env_logger::Env;

/// Initialize logging for a PACT process.
///
/// Log level defaults to `info` and can be overridden with the standard
/// `RUST_LOG` environment variable.
pub fn setup_logging() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
}
