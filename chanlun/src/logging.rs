use tracing::Level;

pub fn init_logging() {
    init_logging_at(Level::INFO);
}

/// Installs the fmt subscriber once; later calls are no-ops.
pub fn init_logging_at(level: Level) {
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}
