use log::{info, log};

use crate::error::ErrorSeverity;

/// Environment variable holding the log level for the decoder
pub const LOG_LEVEL_ENV: &str = "STREAM_DECODER_LOG_LEVEL";

/// Initialize logging system with appropriate log level
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            std::thread::current().name().unwrap_or("unnamed"),
            record.args()
        )
    });

    builder.filter_level(parse_level(&log_level));
    builder.try_init()?;

    info!("Stream decoder logging initialized with level: {}", log_level);
    Ok(())
}

/// Map a level name onto a filter, defaulting to `Info`
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Log an error at the level its severity maps to
pub fn report(context: &str, severity: ErrorSeverity, err: &dyn std::fmt::Display) {
    log!(severity.log_level(), "[{}] {}: {}", severity.as_str(), context, err);
}
