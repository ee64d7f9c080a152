use chrono::Utc;
use std::io::Write;

/// Logger setup shared by the binaries
pub struct ChatLogger;

impl ChatLogger {
    /// `RUST_LOG` wins; otherwise `LOG_LEVEL` (default `info`) is used
    pub fn init() {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let env = env_logger::Env::default().default_filter_or(level);
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}:{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init();
    }
}
